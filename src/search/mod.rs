//! Query execution, result grouping and ranking.
//!
//! Matching runs against the FTS mirror when it is available, with a
//! case-insensitive LIKE fallback against the canonical table otherwise.
//! Matched rows are grouped by containing directory (the release), artists
//! are collected and deduplicated, and section inclusion follows the tags
//! present in the query.

pub mod query;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Serialize;

use crate::domain::track::TrackRecord;
use crate::storage::error::StorageError;
use crate::storage::schema::columns::*;
use crate::storage::schema::tables::*;
use crate::storage::store::track_from_row;

pub use query::ParsedTerms;

/// A release with more distinct artists than this is a compilation.
const COMPILATION_ARTIST_LIMIT: usize = 3;

/// Rows are oversampled by this factor so grouping and deduplication do
/// not starve the final result.
const OVERSAMPLE: usize = 3;

pub const VARIOUS_ARTISTS: &str = "Various Artists";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistResult {
    pub name: String,
    /// Exactly-quoted expression that re-runs the search scoped to this
    /// artist; children are fetched lazily with it.
    pub expand: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlbumResult {
    pub album: String,
    pub artist: String,
    pub directory: PathBuf,
    pub compilation: bool,
    pub expand: String,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SearchResults {
    pub artists: Vec<ArtistResult>,
    pub albums: Vec<AlbumResult>,
    pub tracks: Vec<TrackRecord>,
}

/// Runs a search. Returns the grouped result payload plus the parsed term
/// set (for highlighting). Read-only; safe to call from any thread while
/// the writer is busy.
pub fn search(
    conn: &Connection,
    input: &str,
    limit: usize,
) -> Result<(SearchResults, ParsedTerms), StorageError> {
    let terms = query::parse(input);
    if terms.is_empty() {
        return Ok((SearchResults::default(), terms));
    }

    let fetch_limit = limit.saturating_mul(OVERSAMPLE);
    let rows = if fts_available(conn)? {
        fetch_fts(conn, &terms, fetch_limit)?
    } else {
        fetch_like(conn, &terms, fetch_limit)?
    };

    Ok((group(rows, &terms, limit), terms))
}

/// The mirror is usable when the virtual table exists and holds rows.
fn fts_available(conn: &Connection) -> Result<bool, StorageError> {
    let present: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [TRACKS_FTS],
        |row| row.get(0),
    )?;
    if present == 0 {
        return Ok(false);
    }
    let rows: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {TRACKS_FTS}"), [], |row| {
        row.get(0)
    })?;
    Ok(rows > 0)
}

fn fetch_fts(
    conn: &Connection,
    terms: &ParsedTerms,
    fetch_limit: usize,
) -> Result<Vec<TrackRecord>, StorageError> {
    let expression = fts_expression(terms);

    let mut stmt = conn.prepare(&format!(
        "SELECT {TRACKS}.{PATH}, {TRACKS}.{FILENAME}, {TRACKS}.{ARTIST}, {TRACKS}.{ALBUM},
                {TRACKS}.{TITLE}, {TRACKS}.{ALBUM_ARTIST}, {TRACKS}.{GENRE}, {TRACKS}.{YEAR},
                {TRACKS}.{DURATION}, {TRACKS}.{MTIME}
         FROM {TRACKS}
         JOIN {TRACKS_FTS} ON {TRACKS_FTS}.rowid = {TRACKS}.{ID}
         WHERE {TRACKS_FTS} MATCH ?1
         ORDER BY {TRACKS_FTS}.rank
         LIMIT ?2"
    ))?;

    let rows = stmt
        .query_map(
            rusqlite::params![expression, fetch_limit as i64],
            track_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Builds the FTS5 match expression. Multi-word values become an AND of
/// per-word prefix tokens; multiple values for one tag are ORed; distinct
/// tag groups are ANDed. Without any tag, every term is ORed into a pure
/// free-text search across artist, album and title.
fn fts_expression(terms: &ParsedTerms) -> String {
    let artist_exprs: Vec<String> = terms
        .artists
        .iter()
        .map(|v| column_expr(ARTIST, v))
        .collect();
    let album_exprs: Vec<String> = terms.albums.iter().map(|v| column_expr(ALBUM, v)).collect();
    let track_exprs: Vec<String> = terms.tracks.iter().map(|v| column_expr(TITLE, v)).collect();
    let general_exprs: Vec<String> = terms.general.iter().map(|v| general_expr(v)).collect();

    if terms.has_tags() {
        let mut groups = Vec::new();
        for exprs in [artist_exprs, album_exprs, track_exprs] {
            if !exprs.is_empty() {
                groups.push(or_group(exprs));
            }
        }
        // untagged leftovers must still match somewhere
        groups.extend(general_exprs);
        groups.join(" AND ")
    } else {
        general_exprs.join(" OR ")
    }
}

fn column_expr(column: &str, value: &str) -> String {
    format!("({column} : ({}))", and_tokens(value))
}

fn general_expr(value: &str) -> String {
    format!("({{artist album title}} : ({}))", and_tokens(value))
}

fn and_tokens(value: &str) -> String {
    value
        .split_whitespace()
        .map(prefix_token)
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn prefix_token(word: &str) -> String {
    format!("\"{}\"*", word.replace('"', "\"\""))
}

fn or_group(exprs: Vec<String>) -> String {
    if exprs.len() == 1 {
        exprs.into_iter().next().unwrap_or_default()
    } else {
        format!("({})", exprs.join(" OR "))
    }
}

/// Substring fallback against the canonical table for stores without a
/// usable mirror. Result order is best-effort only: alphabetical by album
/// and title, no relevance ranking.
fn fetch_like(
    conn: &Connection,
    terms: &ParsedTerms,
    fetch_limit: usize,
) -> Result<Vec<TrackRecord>, StorageError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();

    let mut tag_group = |column: &str, values: &[String]| {
        if values.is_empty() {
            return;
        }
        let value_clauses: Vec<String> = values
            .iter()
            .map(|value| {
                let word_clauses: Vec<String> = value
                    .split_whitespace()
                    .map(|word| {
                        params.push(like_pattern(word));
                        format!("{column} LIKE ?{} ESCAPE '\\'", params.len())
                    })
                    .collect();
                format!("({})", word_clauses.join(" AND "))
            })
            .collect();
        clauses.push(format!("({})", value_clauses.join(" OR ")));
    };

    tag_group(ARTIST, &terms.artists);
    tag_group(ALBUM, &terms.albums);
    tag_group(TITLE, &terms.tracks);

    let general_clauses: Vec<String> = terms
        .general
        .iter()
        .map(|value| {
            let word_clauses: Vec<String> = value
                .split_whitespace()
                .map(|word| {
                    params.push(like_pattern(word));
                    let n = params.len();
                    format!(
                        "({ARTIST} LIKE ?{n} ESCAPE '\\' OR {ALBUM} LIKE ?{n} ESCAPE '\\' OR {TITLE} LIKE ?{n} ESCAPE '\\')"
                    )
                })
                .collect();
            format!("({})", word_clauses.join(" AND "))
        })
        .collect();

    let filter = if terms.has_tags() {
        let mut all = clauses;
        all.extend(general_clauses);
        all.join(" AND ")
    } else {
        general_clauses.join(" OR ")
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {PATH}, {FILENAME}, {ARTIST}, {ALBUM}, {TITLE},
                {ALBUM_ARTIST}, {GENRE}, {YEAR}, {DURATION}, {MTIME}
         FROM {TRACKS}
         WHERE {filter}
         ORDER BY {ALBUM} COLLATE NOCASE, {TITLE} COLLATE NOCASE
         LIMIT {fetch_limit}"
    ))?;

    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), track_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn like_pattern(word: &str) -> String {
    let escaped = word
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

struct Release {
    album: String,
    artists: BTreeSet<String>,
    tracks: Vec<TrackRecord>,
}

fn group(rows: Vec<TrackRecord>, terms: &ParsedTerms, limit: usize) -> SearchResults {
    let include_artists = !terms.artists.is_empty() || !terms.has_tags();
    let include_albums = !terms.albums.is_empty() || !terms.has_tags();
    let include_tracks = !terms.tracks.is_empty() || !terms.has_tags();

    let mut releases: BTreeMap<PathBuf, Release> = BTreeMap::new();
    let mut artists: BTreeSet<String> = BTreeSet::new();

    for row in rows {
        artists.insert(row.artist.clone());
        let release = releases.entry(row.release_dir()).or_insert_with(|| Release {
            album: row.album.clone(),
            artists: BTreeSet::new(),
            tracks: Vec::new(),
        });
        release.artists.insert(row.artist.clone());
        release.tracks.push(row);
    }

    let mut results = SearchResults::default();

    if include_artists {
        results.artists = artists
            .iter()
            .take(limit)
            .map(|name| ArtistResult {
                name: name.clone(),
                expand: tag_expr("artist", name),
            })
            .collect();
    }

    let mut sorted_releases: Vec<(PathBuf, Release)> = releases.into_iter().collect();
    sorted_releases.sort_by(|a, b| {
        a.1.album
            .to_lowercase()
            .cmp(&b.1.album.to_lowercase())
            .then_with(|| a.0.cmp(&b.0))
    });

    let listed_artists: BTreeSet<&String> =
        results.artists.iter().map(|a| &a.name).collect();

    if include_albums {
        for (directory, release) in &sorted_releases {
            if results.albums.len() == limit {
                break;
            }
            // already reachable under a listed artist: leave it to the
            // higher-level grouping
            if terms.has_tags()
                && include_artists
                && release.artists.iter().all(|a| listed_artists.contains(a))
            {
                continue;
            }
            let compilation = release.artists.len() > COMPILATION_ARTIST_LIMIT;
            let artist = if compilation {
                VARIOUS_ARTISTS.to_string()
            } else {
                release.artists.iter().next().cloned().unwrap_or_default()
            };
            let expand = if compilation {
                tag_expr("album", &release.album)
            } else {
                format!(
                    "{} {}",
                    tag_expr("artist", &artist),
                    tag_expr("album", &release.album)
                )
            };
            results.albums.push(AlbumResult {
                album: release.album.clone(),
                artist,
                directory: directory.clone(),
                compilation,
                expand,
            });
        }
    }

    if include_tracks {
        let listed_dirs: BTreeSet<&PathBuf> =
            results.albums.iter().map(|a| &a.directory).collect();

        'outer: for (directory, release) in &sorted_releases {
            if terms.has_tags() {
                if include_albums && listed_dirs.contains(directory) {
                    continue;
                }
                if include_artists
                    && release.artists.iter().all(|a| listed_artists.contains(a))
                {
                    continue;
                }
            }
            for track in &release.tracks {
                if results.tracks.len() == limit {
                    break 'outer;
                }
                results.tracks.push(track.clone());
            }
        }
    }

    results
}

/// An exactly-quoted tag expression (`artist:'Exact Name'`) that the parser
/// round-trips, used for lazy expansion of artist/album entries.
fn tag_expr(tag: &str, value: &str) -> String {
    format!(
        "{tag}:'{}'",
        value.replace('\\', "\\\\").replace('\'', "\\'")
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use rusqlite::Connection;

    use crate::domain::track::TrackRecord;
    use crate::search::{search, tag_expr};
    use crate::storage::{schema, store::Store};

    fn track(path: &str, artist: &str, album: &str, title: &str) -> TrackRecord {
        TrackRecord {
            path: path.into(),
            filename: Path::new(path)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned(),
            artist: artist.to_string(),
            album: album.to_string(),
            title: title.to_string(),
            album_artist: None,
            genre: None,
            year: None,
            duration: None,
            mtime: 0,
        }
    }

    fn setup() -> Store {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        let store = Store::from_existing_conn(conn);

        for record in [
            track("/m/radiohead/okc/1.mp3", "Radiohead", "OK Computer", "Airbag"),
            track("/m/radiohead/okc/2.mp3", "Radiohead", "OK Computer", "Let Down"),
            track("/m/radiohead/kid-a/1.mp3", "Radiohead", "Kid A", "Idioteque"),
            track("/m/nina/best/1.mp3", "Nina Simone", "The Best", "Feeling Good"),
            track("/m/various/hits/1.mp3", "Alpha", "Summer Hits", "Down Down"),
            track("/m/various/hits/2.mp3", "Bravo", "Summer Hits", "Upside"),
            track("/m/various/hits/3.mp3", "Charlie", "Summer Hits", "Sideways"),
            track("/m/various/hits/4.mp3", "Delta", "Summer Hits", "Let It Go"),
        ] {
            store.upsert_track(&record).unwrap();
        }
        store
    }

    #[test]
    fn explicit_tags_are_combined_with_and() {
        let store = setup();

        let (results, terms) =
            search(store.connection(), r#"artist:"Radiohead" album:"OK Computer""#, 20).unwrap();

        assert!(terms.has_tags());
        // both sections included; the artist subsumes its albums
        assert_eq!(results.artists.len(), 1);
        assert_eq!(results.artists[0].name, "Radiohead");
        assert!(results.albums.is_empty());
        assert!(results.tracks.is_empty());
    }

    #[test]
    fn tag_conjunction_excludes_non_matching_rows() {
        let store = setup();

        // Kid A does not match the album tag, so only OK Computer rows
        // survive; verify via a track-tag query with the same conjunction
        let (results, _) = search(
            store.connection(),
            r#"album:"OK Computer" song:"Let Down""#,
            20,
        )
        .unwrap();

        assert!(results.artists.is_empty());
        assert_eq!(results.albums.len(), 1);
        assert_eq!(results.albums[0].album, "OK Computer");
        // the matched track lives under the listed album, so it is not
        // repeated in the flat track list
        assert!(results.tracks.is_empty());
    }

    #[test]
    fn free_text_matches_across_artist_album_and_title() {
        let store = setup();

        let (by_artist, _) = search(store.connection(), "nina", 20).unwrap();
        assert_eq!(by_artist.tracks.len(), 1);
        assert_eq!(by_artist.tracks[0].artist, "Nina Simone");

        let (by_album, _) = search(store.connection(), "summer", 20).unwrap();
        assert_eq!(by_album.tracks.len(), 4);

        let (by_title, _) = search(store.connection(), "idioteque", 20).unwrap();
        assert_eq!(by_title.tracks.len(), 1);
        assert_eq!(by_title.tracks[0].title, "Idioteque");
    }

    #[test]
    fn free_text_terms_are_ored() {
        let store = setup();

        let (results, _) = search(store.connection(), "idioteque feeling", 20).unwrap();

        let titles: Vec<&str> = results.tracks.iter().map(|t| t.title.as_str()).collect();
        assert!(titles.contains(&"Idioteque"));
        assert!(titles.contains(&"Feeling Good"));
    }

    #[test]
    fn prefix_matching_works_per_word() {
        let store = setup();

        let (results, _) = search(store.connection(), r#"artist:"Nina Sim""#, 20).unwrap();
        assert_eq!(results.artists.len(), 1);
        assert_eq!(results.artists[0].name, "Nina Simone");
    }

    #[test]
    fn four_artists_make_a_compilation() {
        let store = setup();

        let (results, _) = search(store.connection(), "album:Summer", 20).unwrap();

        assert_eq!(results.albums.len(), 1);
        let album = &results.albums[0];
        assert!(album.compilation);
        assert_eq!(album.artist, super::VARIOUS_ARTISTS);
        assert_eq!(album.expand, "album:'Summer Hits'");
    }

    #[test]
    fn three_artists_are_not_a_compilation() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init(&conn).unwrap();
        let store = Store::from_existing_conn(conn);
        for record in [
            track("/m/trio/ep/1.mp3", "Alpha", "Trio EP", "One"),
            track("/m/trio/ep/2.mp3", "Bravo", "Trio EP", "Two"),
            track("/m/trio/ep/3.mp3", "Charlie", "Trio EP", "Three"),
        ] {
            store.upsert_track(&record).unwrap();
        }

        let (results, _) = search(store.connection(), "album:Trio", 20).unwrap();

        assert_eq!(results.albums.len(), 1);
        assert!(!results.albums[0].compilation);
    }

    #[test]
    fn artist_tag_includes_only_the_artist_section() {
        let store = setup();

        let (results, _) = search(store.connection(), "artist:Radiohead", 20).unwrap();

        assert_eq!(results.artists.len(), 1);
        assert!(results.albums.is_empty());
        assert!(results.tracks.is_empty());
    }

    #[test]
    fn free_text_includes_all_sections() {
        let store = setup();

        let (results, _) = search(store.connection(), "radiohead", 20).unwrap();

        assert_eq!(results.artists.len(), 1);
        assert_eq!(results.albums.len(), 2); // Kid A, OK Computer
        assert_eq!(results.albums[0].album, "Kid A");
        assert_eq!(results.tracks.len(), 3);
    }

    #[test]
    fn expand_expressions_round_trip_through_the_parser() {
        let expr = tag_expr("artist", "It's \"Quoted\" \\ Stuff");
        let terms = crate::search::query::parse(&expr);
        assert_eq!(terms.artists, vec!["It's \"Quoted\" \\ Stuff"]);
    }

    #[test]
    fn limit_caps_each_section() {
        let store = setup();

        let (results, _) = search(store.connection(), "radiohead summer", 2).unwrap();

        assert!(results.artists.len() <= 2);
        assert!(results.albums.len() <= 2);
        assert!(results.tracks.len() <= 2);
    }

    #[test]
    fn empty_query_returns_nothing() {
        let store = setup();

        let (results, terms) = search(store.connection(), "   ", 20).unwrap();
        assert!(terms.is_empty());
        assert!(results.artists.is_empty());
        assert!(results.albums.is_empty());
        assert!(results.tracks.is_empty());
    }

    #[test]
    fn like_fallback_answers_when_the_mirror_is_gone() {
        let store = setup();
        // simulate a store whose mirror never existed
        store
            .connection()
            .execute_batch(
                "DROP TRIGGER tracks_fts_ai;
                 DROP TRIGGER tracks_fts_ad;
                 DROP TRIGGER tracks_fts_au;
                 DROP TABLE tracks_fts;",
            )
            .unwrap();

        let (results, _) = search(store.connection(), "feeling", 20).unwrap();
        assert_eq!(results.tracks.len(), 1);
        assert_eq!(results.tracks[0].title, "Feeling Good");

        let (tagged, _) = search(
            store.connection(),
            r#"album:"OK Computer" song:Airbag"#,
            20,
        )
        .unwrap();
        assert_eq!(tagged.albums.len(), 1);
        assert_eq!(tagged.albums[0].album, "OK Computer");
    }

    #[test]
    fn like_fallback_is_case_insensitive_substring() {
        let store = setup();
        store
            .connection()
            .execute_batch(
                "DROP TRIGGER tracks_fts_ai;
                 DROP TRIGGER tracks_fts_ad;
                 DROP TRIGGER tracks_fts_au;
                 DROP TABLE tracks_fts;",
            )
            .unwrap();

        // substring in the middle of a word, different case
        let (results, _) = search(store.connection(), "DIOTEQ", 20).unwrap();
        assert_eq!(results.tracks.len(), 1);
        assert_eq!(results.tracks[0].title, "Idioteque");
    }
}
