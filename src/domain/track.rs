use std::path::{Path, PathBuf};

use serde::Serialize;

/// One indexed audio file.
///
/// `path` is the unique key: at most one record exists per absolute path,
/// and a record's presence means the file existed and was readable as of
/// the last successful index event for that path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub path: PathBuf,
    pub filename: String,
    pub artist: String,
    pub album: String,
    pub title: String,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i64>,
    /// Duration in seconds, when the container reports one.
    pub duration: Option<f64>,
    /// Last-modified time of the file, seconds since the unix epoch.
    pub mtime: i64,
}

impl TrackRecord {
    /// The release this track belongs to: the directory containing the file.
    pub fn release_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}
