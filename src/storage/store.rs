use std::path::{Path, PathBuf};

use rusqlite::{Row, params};

use crate::{
    config::Database,
    domain::track::TrackRecord,
    storage::{
        db,
        error::StorageError,
        schema::{columns, tables},
    },
};

use columns::*;
use tables::*;

/// One connection's view of the track table.
///
/// Exactly one write-capable `Store` exists per collection (owned by the
/// writer thread); any number of read-only ones may be opened concurrently.
pub struct Store {
    pub(crate) db: rusqlite::Connection,
}

impl Store {
    /// when called, opens a data base connection and ensures the schema
    pub fn new(config: &Database) -> Result<Self, StorageError> {
        let db = db::open(config)?;
        Ok(Self::from_existing_conn(db))
    }

    pub fn from_existing_conn(db: rusqlite::Connection) -> Self {
        Self { db }
    }

    pub fn open_read_only(path: &Path) -> Result<Self, StorageError> {
        Ok(Self::from_existing_conn(db::open_read_only(path)?))
    }

    pub fn connection(&self) -> &rusqlite::Connection {
        &self.db
    }

    /// Inserts the record, replacing any existing record for the same path.
    /// Replacing is correct because a file's tags may have changed since the
    /// last index event for it. The conflict path is an UPDATE (not a
    /// REPLACE) so the mirror-maintenance trigger fires.
    pub fn upsert_track(&self, track: &TrackRecord) -> Result<(), StorageError> {
        self.db.execute(
            &format!(
                "INSERT INTO {TRACKS}
                 ({PATH}, {FILENAME}, {ARTIST}, {ALBUM}, {TITLE}, {ALBUM_ARTIST}, {GENRE}, {YEAR}, {DURATION}, {MTIME})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT({PATH}) DO UPDATE SET
                     {FILENAME} = excluded.{FILENAME},
                     {ARTIST} = excluded.{ARTIST},
                     {ALBUM} = excluded.{ALBUM},
                     {TITLE} = excluded.{TITLE},
                     {ALBUM_ARTIST} = excluded.{ALBUM_ARTIST},
                     {GENRE} = excluded.{GENRE},
                     {YEAR} = excluded.{YEAR},
                     {DURATION} = excluded.{DURATION},
                     {MTIME} = excluded.{MTIME}"
            ),
            params![
                track.path.to_string_lossy(),
                track.filename,
                track.artist,
                track.album,
                track.title,
                track.album_artist,
                track.genre,
                track.year,
                track.duration,
                track.mtime,
            ],
        )?;
        Ok(())
    }

    /// Removes the record for the exact path. Returns whether one existed.
    pub fn delete_track(&self, path: &Path) -> Result<bool, StorageError> {
        let removed = self.db.execute(
            &format!("DELETE FROM {TRACKS} WHERE {PATH} = ?1"),
            params![path.to_string_lossy()],
        )?;
        Ok(removed > 0)
    }

    /// Removes every record. Only used at the start of a full rebuild.
    pub fn clear_tracks(&self) -> Result<usize, StorageError> {
        Ok(self.db.execute(&format!("DELETE FROM {TRACKS}"), [])?)
    }

    pub fn count(&self) -> Result<i64, StorageError> {
        Ok(self
            .db
            .query_row(&format!("SELECT COUNT(*) FROM {TRACKS}"), [], |row| {
                row.get(0)
            })?)
    }

    pub fn track_by_path(&self, path: &Path) -> Result<Option<TrackRecord>, StorageError> {
        let mut stmt = self.db.prepare(&format!(
            "SELECT {} FROM {TRACKS} WHERE {PATH} = ?1",
            TRACK_COLUMNS
        ))?;

        let mut rows = stmt.query(params![path.to_string_lossy()])?;
        match rows.next()? {
            Some(row) => Ok(Some(track_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// Every path currently in the store, for diffing against the disk.
    pub fn all_paths(&self) -> Result<Vec<PathBuf>, StorageError> {
        let mut stmt = self
            .db
            .prepare(&format!("SELECT {PATH} FROM {TRACKS}"))?;

        let paths = stmt
            .query_map([], |row| Ok(PathBuf::from(row.get::<_, String>(0)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    // Explicit transaction control for the writer's event batching.

    pub(crate) fn begin(&self) -> Result<(), StorageError> {
        self.db.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    pub(crate) fn commit(&self) -> Result<(), StorageError> {
        self.db.execute_batch("COMMIT")?;
        Ok(())
    }
}

pub(crate) const TRACK_COLUMNS: &str =
    "path, filename, artist, album, title, albumartist, genre, year, duration, mtime";

pub(crate) fn track_from_row(row: &Row) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        path: PathBuf::from(row.get::<_, String>(0)?),
        filename: row.get(1)?,
        artist: row.get(2)?,
        album: row.get(3)?,
        title: row.get(4)?,
        album_artist: row.get(5)?,
        genre: row.get(6)?,
        year: row.get(7)?,
        duration: row.get(8)?,
        mtime: row.get(9)?,
    })
}
