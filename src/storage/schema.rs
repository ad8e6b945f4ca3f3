use rusqlite::Connection;

pub mod tables {
    pub const TRACKS: &str = "tracks";
    pub const TRACKS_FTS: &str = "tracks_fts";

    pub const ALL_TABLES: &[&str] = &[TRACKS, TRACKS_FTS];
}

pub mod columns {
    pub const ID: &str = "id";
    pub const PATH: &str = "path";
    pub const FILENAME: &str = "filename";
    pub const ARTIST: &str = "artist";
    pub const ALBUM: &str = "album";
    pub const TITLE: &str = "title";
    pub const ALBUM_ARTIST: &str = "albumartist";
    pub const GENRE: &str = "genre";
    pub const YEAR: &str = "year";
    pub const DURATION: &str = "duration";
    pub const MTIME: &str = "mtime";
}

pub use columns::*;
pub use tables::*;

// The FTS mirror is kept consistent with the tracks table by the three
// triggers below; application code must never write to it directly.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    artist TEXT NOT NULL,
    album TEXT NOT NULL,
    title TEXT NOT NULL,
    albumartist TEXT,
    genre TEXT,
    year INTEGER,
    duration REAL,
    mtime INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS tracks_artist ON tracks (artist COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS tracks_album ON tracks (album COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS tracks_title ON tracks (title COLLATE NOCASE);

CREATE VIRTUAL TABLE IF NOT EXISTS tracks_fts USING fts5(
    artist,
    album,
    title,
    filename,
    content='tracks',
    content_rowid='id',
    tokenize="unicode61 remove_diacritics 2",
    prefix='2 3 4'
);

CREATE TRIGGER IF NOT EXISTS tracks_fts_ai AFTER INSERT ON tracks BEGIN
    INSERT INTO tracks_fts (rowid, artist, album, title, filename)
    VALUES (new.id, new.artist, new.album, new.title, new.filename);
END;

CREATE TRIGGER IF NOT EXISTS tracks_fts_ad AFTER DELETE ON tracks BEGIN
    INSERT INTO tracks_fts (tracks_fts, rowid, artist, album, title, filename)
    VALUES ('delete', old.id, old.artist, old.album, old.title, old.filename);
END;

CREATE TRIGGER IF NOT EXISTS tracks_fts_au AFTER UPDATE ON tracks BEGIN
    INSERT INTO tracks_fts (tracks_fts, rowid, artist, album, title, filename)
    VALUES ('delete', old.id, old.artist, old.album, old.title, old.filename);
    INSERT INTO tracks_fts (rowid, artist, album, title, filename)
    VALUES (new.id, new.artist, new.album, new.title, new.filename);
END;
"#;

pub fn init(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA)
}
