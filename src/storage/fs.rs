//! Enumeration of audio files under the collection root.

use walkdir::WalkDir;

use std::path::{Path, PathBuf};

use crate::config::CollectionSource;

/// Supported audio container/codec extensions. Everything else is ignored
/// by enumeration and by the filesystem watcher alike.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "m4a", "ogg", "aac", "opus", "wma"];

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively collects every supported audio file under the source root.
///
/// Unreadable directory entries are logged and skipped; a missing root
/// yields an empty list (a later resync will reconcile the store with it).
pub fn collect_files(source: &CollectionSource) -> Vec<PathBuf> {
    let root = &source.root;

    WalkDir::new(root)
        .follow_links(source.follow_symlinks)
        .into_iter()
        .filter_entry(|entry| {
            // keep the entry if it's not inside any ignored directory
            !source
                .ignored_dirs
                .iter()
                .any(|ignored| entry.path().starts_with(ignored))
        })
        .filter_map(|e| match e {
            Ok(e) => Some(e),
            Err(err) => {
                log::warn!(
                    "error while scanning '{}', skipping an entry: {err}",
                    root.display()
                );
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| is_audio_file(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::{config::CollectionSource, storage::fs::collect_files};

    fn source_for(root: &std::path::Path) -> CollectionSource {
        CollectionSource {
            root: root.to_path_buf(),
            follow_symlinks: false,
            ignored_dirs: vec![],
        }
    }

    #[test]
    fn collect_finds_audio_files_only() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let song1 = root.join("song1.mp3");
        let song2 = root.join("song2.flac");
        let not_music = root.join("notes.txt");

        std::fs::write(&song1, b"aaa").unwrap();
        std::fs::write(&song2, b"bbb").unwrap();
        std::fs::write(&not_music, b"ccc").unwrap();

        let files = collect_files(&source_for(root));

        assert_eq!(files.len(), 2);
        assert!(files.contains(&song1));
        assert!(files.contains(&song2));
    }

    #[test]
    fn collect_recurses_into_subdirectories() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let album = root.join("Artist").join("Album");
        std::fs::create_dir_all(&album).unwrap();
        let song = album.join("01 - track.ogg");
        std::fs::write(&song, b"audio").unwrap();

        let files = collect_files(&source_for(root));

        assert_eq!(files, vec![song]);
    }

    #[test]
    fn collect_respects_ignored_dirs() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        let song1 = root.join("song1.mp3");
        let ignored_dir = root.join("ignored");
        std::fs::create_dir_all(&ignored_dir).unwrap();
        let ignored_song = ignored_dir.join("ignored_song.mp3");

        std::fs::write(&song1, b"aaa").unwrap();
        std::fs::write(&ignored_song, b"bbb").unwrap();

        let mut source = source_for(root);
        source.ignored_dirs = vec![ignored_dir];

        let files = collect_files(&source);

        assert_eq!(files, vec![song1]);
    }

    #[test]
    fn missing_root_yields_empty_list() {
        let tmp = TempDir::new().unwrap();
        let gone = tmp.path().join("does-not-exist");

        assert!(collect_files(&source_for(&gone)).is_empty());
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        use crate::storage::fs::is_audio_file;

        assert!(is_audio_file(std::path::Path::new("/a/b.MP3")));
        assert!(is_audio_file(std::path::Path::new("/a/b.FlAc")));
        assert!(!is_audio_file(std::path::Path::new("/a/b.txt")));
        assert!(!is_audio_file(std::path::Path::new("/a/noext")));
    }
}
