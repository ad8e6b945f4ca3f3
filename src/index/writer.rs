//! The dedicated writer thread: the only code path in the process that
//! mutates the store.
//!
//! Events arrive in FIFO order over a bounded channel. The writer opens its
//! own write-capable connection when the thread starts and closes it when
//! the loop exits. Applications are grouped into explicit transactions,
//! committed at least every [`COMMIT_INTERVAL`] events and on barriers, so
//! the crash-recovery window stays bounded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::config::Database;
use crate::index::event::IndexEvent;
use crate::storage::error::StorageError;
use crate::storage::store::Store;
use crate::tags;

/// Force a commit at least every this many applied events.
const COMMIT_INTERVAL: usize = 500;

/// How long a dequeue blocks before re-checking the stop flag.
const POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Deadline for draining already-enqueued events after a stop signal.
/// Events are idempotent, so abandoning the tail is safe.
const DRAIN_DEADLINE: Duration = Duration::from_secs(3);

pub struct Writer {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    healthy: Arc<AtomicBool>,
}

impl Writer {
    pub fn spawn(db: Database, rx: Receiver<IndexEvent>) -> Writer {
        let stop = Arc::new(AtomicBool::new(false));
        let healthy = Arc::new(AtomicBool::new(true));

        let thread_stop = Arc::clone(&stop);
        let thread_healthy = Arc::clone(&healthy);

        let handle = std::thread::Builder::new()
            .name("tunedex-writer".to_string())
            .spawn(move || {
                if let Err(e) = run(&db, &rx, &thread_stop) {
                    log::error!("writer stopped on fatal store error: {e}");
                    thread_healthy.store(false, Ordering::Relaxed);
                }
            })
            .expect("failed to spawn writer thread");

        Writer {
            handle: Some(handle),
            stop,
            healthy,
        }
    }

    /// False once the loop has died on a store error. Enqueued events are
    /// not applied after that; the caller decides whether to rebuild the
    /// collection object.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Signals the loop to drain and exit, then joins it.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("writer thread panicked");
            }
        }
    }
}

struct Batch {
    open: bool,
    applied: usize,
}

fn run(db: &Database, rx: &Receiver<IndexEvent>, stop: &AtomicBool) -> Result<(), StorageError> {
    // The write connection lives exactly as long as this thread.
    let store = Store::new(db)?;
    let mut batch = Batch {
        open: false,
        applied: 0,
    };

    loop {
        if stop.load(Ordering::Relaxed) {
            drain(&store, rx, &mut batch)?;
            break;
        }

        match rx.recv_timeout(POLL_TIMEOUT) {
            Ok(event) => {
                apply(&store, event, &mut batch)?;
                if batch.applied >= COMMIT_INTERVAL {
                    commit(&store, &mut batch)?;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // idle; don't hold a transaction open while waiting
                commit(&store, &mut batch)?;
            }
            Err(RecvTimeoutError::Disconnected) => {
                commit(&store, &mut batch)?;
                break;
            }
        }
    }

    Ok(())
}

fn apply(store: &Store, event: IndexEvent, batch: &mut Batch) -> Result<(), StorageError> {
    match event {
        IndexEvent::IndexFile(path) => {
            begin(store, batch)?;
            match tags::extract(&path) {
                Ok(record) => store.upsert_track(&record)?,
                Err(e) => {
                    log::warn!("skipping unreadable file '{}': {e}", path.display());
                }
            }
            batch.applied += 1;
        }
        IndexEvent::DeleteFile(path) => {
            begin(store, batch)?;
            store.delete_track(&path)?;
            batch.applied += 1;
        }
        IndexEvent::ClearAll => {
            begin(store, batch)?;
            store.clear_tracks()?;
            batch.applied += 1;
        }
        IndexEvent::RebuildComplete(ack) | IndexEvent::ResyncComplete(ack) => {
            commit(store, batch)?;
            let _ = ack.send(());
        }
    }
    Ok(())
}

fn begin(store: &Store, batch: &mut Batch) -> Result<(), StorageError> {
    if !batch.open {
        store.begin()?;
        batch.open = true;
    }
    Ok(())
}

fn commit(store: &Store, batch: &mut Batch) -> Result<(), StorageError> {
    if batch.open {
        store.commit()?;
        batch.open = false;
        batch.applied = 0;
    }
    Ok(())
}

fn drain(store: &Store, rx: &Receiver<IndexEvent>, batch: &mut Batch) -> Result<(), StorageError> {
    let deadline = Instant::now() + DRAIN_DEADLINE;

    while Instant::now() < deadline {
        match rx.try_recv() {
            Ok(event) => {
                apply(store, event, batch)?;
                if batch.applied >= COMMIT_INTERVAL {
                    commit(store, batch)?;
                }
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }

    commit(store, batch)
}
