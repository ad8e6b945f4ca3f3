//! Typed mutation events consumed exactly once by the writer thread.

use std::path::PathBuf;

use crossbeam_channel::{Receiver, Sender, bounded};

/// Capacity of the index event queue. Bulk enqueues block once the writer
/// falls this far behind, which bounds memory during a rebuild.
pub const QUEUE_CAPACITY: usize = 4096;

#[derive(Debug)]
pub enum IndexEvent {
    /// (Re)extract metadata for the file and upsert its record.
    IndexFile(PathBuf),
    /// Remove the record for the exact path; no-op if absent.
    DeleteFile(PathBuf),
    /// Remove every record. Only used at the start of a full rebuild.
    ClearAll,
    /// Barrier: the ack fires once all prior events are applied and
    /// committed, letting the orchestrator join the queue.
    RebuildComplete(Sender<()>),
    ResyncComplete(Sender<()>),
}

pub fn queue() -> (Sender<IndexEvent>, Receiver<IndexEvent>) {
    bounded(QUEUE_CAPACITY)
}
