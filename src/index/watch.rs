//! Filesystem watching: translates OS notifications into index events.
//!
//! The watcher only produces events; every store mutation still goes
//! through the writer thread. A move shows up as remove + create from the
//! OS layer, which the FIFO queue applies delete-first.

use std::path::Path;

use crossbeam_channel::Sender;
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};

use crate::config::CollectionSource;
use crate::index::event::IndexEvent;
use crate::storage::fs::is_audio_file;

/// Keeps the OS watch alive; dropping it stops the observer thread.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

pub fn start(source: &CollectionSource, tx: Sender<IndexEvent>) -> Result<FsWatcher, notify::Error> {
    let filter = source.clone();

    let mut watcher = RecommendedWatcher::new(
        move |result: Result<Event, notify::Error>| match result {
            Ok(event) => {
                for index_event in classify(&event, &filter) {
                    if tx.send(index_event).is_err() {
                        // writer is gone, nothing left to feed
                        return;
                    }
                }
            }
            Err(e) => log::warn!("watch error: {e}"),
        },
        NotifyConfig::default(),
    )?;

    watcher.watch(&source.root, RecursiveMode::Recursive)?;
    log::info!("watching '{}' for changes", source.root.display());

    Ok(FsWatcher { _watcher: watcher })
}

/// Pure translation of one OS event into zero or more index events.
/// Directories and unsupported extensions never pass the filter.
fn classify(event: &Event, source: &CollectionSource) -> Vec<IndexEvent> {
    let relevant =
        |path: &std::path::PathBuf| is_audio_file(path) && !is_ignored(path, source);

    match event.kind {
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .iter()
            .filter(|p| relevant(p))
            .map(|p| IndexEvent::IndexFile(p.clone()))
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .filter(|p| relevant(p))
            .map(|p| IndexEvent::DeleteFile(p.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

fn is_ignored(path: &Path, source: &CollectionSource) -> bool {
    source
        .ignored_dirs
        .iter()
        .any(|ignored| path.starts_with(ignored))
}
