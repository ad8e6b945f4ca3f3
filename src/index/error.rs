use thiserror::Error;

use crate::storage::error::StorageError;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("the index writer has stopped")]
    WriterStopped,

    #[error("indexing requires an on-disk database path")]
    InMemoryDatabase,

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),
}
