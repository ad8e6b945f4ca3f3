//! Embedded tag reading for audio files.
//!
//! Files whose container cannot be parsed are an [`Err`] here; the index
//! writer logs and skips them, so one corrupt file never stops a rebuild.

use std::path::Path;

use lofty::error::LoftyError;
use lofty::prelude::{AudioFile, ItemKey, TaggedFileExt};
use thiserror::Error;

use crate::domain::track::TrackRecord;
use crate::storage::db::system_time_to_i64;

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Error)]
pub enum TagError {
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable audio file: {0}")]
    Unreadable(#[from] LoftyError),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Tag values as they appear in the file, before fallbacks are applied.
#[derive(Debug, Default, Clone)]
pub struct RawTags {
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub title: Option<String>,
    pub genre: Option<String>,
    pub year: Option<String>,
    pub duration: Option<f64>,
}

/// Reads the file's embedded tags and derives the canonical track record.
pub fn extract(path: &Path) -> Result<TrackRecord, TagError> {
    let meta = std::fs::metadata(path)?;
    let mtime = system_time_to_i64(meta.modified()?)?;

    let tagged_file = lofty::read_from_path(path)?;
    let properties = tagged_file.properties();

    let mut raw = RawTags::default();

    let duration = properties.duration().as_secs_f64();
    if duration > 0.0 {
        raw.duration = Some(duration);
    }

    if let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        raw.artist = tag.get_string(&ItemKey::TrackArtist).map(str::to_string);
        raw.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(str::to_string);
        raw.album = tag.get_string(&ItemKey::AlbumTitle).map(str::to_string);
        raw.title = tag.get_string(&ItemKey::TrackTitle).map(str::to_string);
        raw.genre = tag.get_string(&ItemKey::Genre).map(str::to_string);
        raw.year = tag.get_string(&ItemKey::Year).map(str::to_string);
    }

    Ok(finalize(path, raw, mtime))
}

/// Applies the fallback rules: artist falls back to the album artist and
/// then to "Unknown", the album to "Unknown", the title to the filename
/// stem and then to "Unknown"; the year keeps its first four digits.
pub fn finalize(path: &Path, raw: RawTags, mtime: i64) -> TrackRecord {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let album_artist = nonempty(raw.album_artist);

    let artist = nonempty(raw.artist)
        .or_else(|| album_artist.clone())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let album = nonempty(raw.album).unwrap_or_else(|| UNKNOWN.to_string());

    let title = nonempty(raw.title)
        .or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| UNKNOWN.to_string());

    TrackRecord {
        path: path.to_path_buf(),
        filename,
        artist,
        album,
        title,
        album_artist,
        genre: nonempty(raw.genre),
        year: raw.year.as_deref().and_then(parse_year),
        duration: raw.duration,
        mtime,
    }
}

fn nonempty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First four digits of the raw year tag, so "2003-05-01" parses as 2003.
fn parse_year(text: &str) -> Option<i64> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() { None } else { digits.parse().ok() }
}
