//! Collection lifecycle: startup decision, rebuild, resync, watching, stop.
//!
//! A `Collection` owns the whole indexing pipeline for one music root. All
//! store mutations flow through the writer thread via the event queue;
//! reads (`count`, `get_track`, `search`) open independent read-only
//! connections and never block on the writer.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;

use crate::config::{CollectionSource, Config};
use crate::domain::track::TrackRecord;
use crate::index::error::IndexError;
use crate::index::event::{self, IndexEvent};
use crate::index::progress::{BulkStatus, StatusFile};
use crate::index::watch::{self, FsWatcher};
use crate::index::writer::Writer;
use crate::search::{self, ParsedTerms, SearchResults};
use crate::storage::fs::collect_files;
use crate::storage::store::Store;

/// Refresh the status file every this many enqueued items.
const STATUS_REFRESH_INTERVAL: usize = 100;

pub struct Collection {
    db_path: PathBuf,
    source: CollectionSource,
    status: StatusFile,
    tx: Mutex<Option<Sender<IndexEvent>>>,
    writer: Mutex<Option<Writer>>,
    watcher: Mutex<Option<FsWatcher>>,
    /// Serializes bulk operations; overlapping resyncs are safe but wasted
    /// work, so the second caller just waits its turn.
    bulk: Mutex<()>,
    stopped: AtomicBool,
}

impl Collection {
    /// Builds the pipeline (schema, queue, writer thread) without scanning
    /// anything. Requires an on-disk database so readers and the writer can
    /// hold independent connections.
    pub fn open(config: &Config) -> Result<Arc<Collection>, IndexError> {
        if config.database.in_memory {
            return Err(IndexError::InMemoryDatabase);
        }
        let db_path = config
            .database
            .path
            .clone()
            .ok_or(IndexError::InMemoryDatabase)?;

        // Short-lived write connection so the schema exists before the
        // first reader shows up.
        Store::new(&config.database)?;

        let (tx, rx) = event::queue();
        let writer = Writer::spawn(config.database.clone(), rx);
        let status = StatusFile::for_root(&config.status_dir(), &config.collection.root);

        Ok(Arc::new(Collection {
            db_path,
            source: config.collection.clone(),
            status,
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            watcher: Mutex::new(None),
            bulk: Mutex::new(()),
            stopped: AtomicBool::new(false),
        }))
    }

    /// Kicks off the startup pass on a background thread, so construction
    /// never blocks on a full scan: an empty store is rebuilt, a non-empty
    /// one resynced (never assume an empty store is intentional), and the
    /// watcher is started afterwards either way.
    pub fn start(self: &Arc<Self>) {
        let collection = Arc::clone(self);
        std::thread::Builder::new()
            .name("tunedex-startup".to_string())
            .spawn(move || {
                let outcome = match collection.count() {
                    Ok(0) => collection.rebuild(),
                    Ok(_) => collection.resync(),
                    Err(e) => {
                        log::error!("startup count failed: {e}");
                        return;
                    }
                };
                if let Err(e) = outcome {
                    log::error!("startup sync failed: {e}");
                }
                if let Err(e) = collection.start_watcher() {
                    log::warn!("failed to start watcher: {e}");
                }
            })
            .expect("failed to spawn startup thread");
    }

    /// Clears the store and re-indexes every supported file under the root.
    pub fn rebuild(&self) -> Result<(), IndexError> {
        let _guard = self.bulk.lock().unwrap();
        log::info!("rebuild of '{}' started", self.source.root.display());

        self.status.set(BulkStatus::Rebuilding, -1, 0)?;
        let outcome = self.run_rebuild();
        // a failed rebuild still clears status; a later resync reconciles
        self.status.clear()?;

        if outcome.is_ok() {
            log::info!("rebuild of '{}' finished", self.source.root.display());
            self.start_watcher()?;
        }
        outcome
    }

    fn run_rebuild(&self) -> Result<(), IndexError> {
        let tx = self.sender()?;
        self.send(&tx, IndexEvent::ClearAll)?;

        let files = collect_files(&self.source);
        let total = files.len();
        self.status.set(BulkStatus::Rebuilding, total as i64, 0)?;

        for (i, path) in files.into_iter().enumerate() {
            self.send(&tx, IndexEvent::IndexFile(path))?;
            let done = i + 1;
            if done % STATUS_REFRESH_INTERVAL == 0 {
                self.status
                    .set(BulkStatus::Rebuilding, total as i64, done as u64)?;
            }
        }

        self.join(&tx, IndexEvent::RebuildComplete)
    }

    /// Diffs the store against the disk and applies the difference:
    /// stale records are deleted, new files indexed. Converges to the
    /// on-disk file set from any starting store state.
    pub fn resync(&self) -> Result<(), IndexError> {
        let _guard = self.bulk.lock().unwrap();
        log::info!("resync of '{}' started", self.source.root.display());

        self.status.set(BulkStatus::Resyncing, -1, 0)?;
        let outcome = self.run_resync();
        self.status.clear()?;

        if outcome.is_ok() {
            log::info!("resync of '{}' finished", self.source.root.display());
            self.start_watcher()?;
        }
        outcome
    }

    fn run_resync(&self) -> Result<(), IndexError> {
        let tx = self.sender()?;

        let on_disk: BTreeSet<PathBuf> = collect_files(&self.source).into_iter().collect();
        let stored: BTreeSet<PathBuf> = self.read_store()?.all_paths()?.into_iter().collect();

        let to_remove: Vec<&PathBuf> = stored.difference(&on_disk).collect();
        let to_add: Vec<&PathBuf> = on_disk.difference(&stored).collect();
        let total = (to_remove.len() + to_add.len()) as i64;
        self.status.set(BulkStatus::Resyncing, total, 0)?;

        let mut done = 0u64;
        // deletes go first so no path is ever in two logical states at once
        for path in to_remove {
            self.send(&tx, IndexEvent::DeleteFile(path.clone()))?;
            done += 1;
            if done % STATUS_REFRESH_INTERVAL as u64 == 0 {
                self.status.set(BulkStatus::Resyncing, total, done)?;
            }
        }
        for path in to_add {
            self.send(&tx, IndexEvent::IndexFile(path.clone()))?;
            done += 1;
            if done % STATUS_REFRESH_INTERVAL as u64 == 0 {
                self.status.set(BulkStatus::Resyncing, total, done)?;
            }
        }

        self.join(&tx, IndexEvent::ResyncComplete)
    }

    /// Starts the filesystem watcher if it is not already running.
    pub fn start_watcher(&self) -> Result<(), IndexError> {
        if self.stopped.load(Ordering::Relaxed) {
            return Ok(());
        }
        let mut watcher = self.watcher.lock().unwrap();
        if watcher.is_none() {
            *watcher = Some(watch::start(&self.source, self.sender()?)?);
        }
        Ok(())
    }

    pub fn count(&self) -> Result<i64, IndexError> {
        Ok(self.read_store()?.count()?)
    }

    pub fn get_track(&self, path: &Path) -> Result<Option<TrackRecord>, IndexError> {
        Ok(self.read_store()?.track_by_path(path)?)
    }

    pub fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<(SearchResults, ParsedTerms), IndexError> {
        let store = self.read_store()?;
        Ok(search::search(store.connection(), query, limit)?)
    }

    /// The current progress-status record, if a bulk operation is running.
    pub fn progress(&self) -> Option<crate::index::progress::StatusRecord> {
        self.status.get()
    }

    /// Stops the watcher, disconnects the queue and joins the writer. The
    /// collection is inert afterwards and must not be reused.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.watcher.lock().unwrap() = None;
        self.tx.lock().unwrap().take();
        if let Some(mut writer) = self.writer.lock().unwrap().take() {
            writer.stop();
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.writer
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(Writer::is_healthy)
    }

    fn read_store(&self) -> Result<Store, IndexError> {
        Ok(Store::open_read_only(&self.db_path)?)
    }

    fn sender(&self) -> Result<Sender<IndexEvent>, IndexError> {
        self.tx
            .lock()
            .unwrap()
            .as_ref()
            .cloned()
            .ok_or(IndexError::WriterStopped)
    }

    fn send(&self, tx: &Sender<IndexEvent>, event: IndexEvent) -> Result<(), IndexError> {
        tx.send(event).map_err(|_| IndexError::WriterStopped)
    }

    fn join(
        &self,
        tx: &Sender<IndexEvent>,
        barrier: fn(Sender<()>) -> IndexEvent,
    ) -> Result<(), IndexError> {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.send(tx, barrier(ack_tx))?;
        ack_rx.recv().map_err(|_| IndexError::WriterStopped)
    }
}

impl Drop for Collection {
    fn drop(&mut self) {
        self.stop();
    }
}
