//! Shared test fixtures: minimal WAV files the tag reader accepts.

use std::path::Path;

use lofty::config::WriteOptions;
use lofty::prelude::{ItemKey, TagExt};
use lofty::tag::{Tag, TagType};

/// Writes a minimal PCM WAV file (mono, 16-bit, 44.1 kHz, 0.1 s of silence).
pub fn write_wav(path: &Path) {
    let sample_rate: u32 = 44_100;
    let samples: u32 = 4_410;
    let data_len = samples * 2;

    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes()); // byte rate
    bytes.extend_from_slice(&2u16.to_le_bytes()); // block align
    bytes.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    bytes.resize(bytes.len() + data_len as usize, 0);

    std::fs::write(path, bytes).unwrap();
}

/// Writes a WAV file carrying RIFF INFO tags.
pub fn write_tagged_wav(path: &Path, artist: &str, album: &str, title: &str) {
    write_wav(path);

    let mut tag = Tag::new(TagType::RiffInfo);
    tag.insert_text(ItemKey::TrackArtist, artist.to_string());
    tag.insert_text(ItemKey::AlbumTitle, album.to_string());
    tag.insert_text(ItemKey::TrackTitle, title.to_string());
    tag.save_to_path(path, WriteOptions::default()).unwrap();
}
