//! Core data models for the USDB sync pipeline.
//!
//! This module contains the song record, category and playlist types shared
//! by the scraper, the orchestrator and the playlist generator, plus the
//! constants of the remote dialect.

use serde::{Deserialize, Serialize};

// ============================================================================
// Dialect Constants
// ============================================================================

/// Base URL of the remote song database.
pub const USDB_BASE_URL: &str = "https://usdb.animux.de";

/// Extension every `MP3` tag must carry.
pub const AUDIO_EXT: &str = ".mp3";

/// Extension of a `VIDEO` tag that names a local file.
pub const VIDEO_EXT: &str = ".mp4";

/// Extension used for derived cover filenames.
pub const COVER_EXT: &str = ".jpg";

/// Extension of the song document written next to the media.
pub const DOCUMENT_EXT: &str = ".txt";

/// Extension of playlist files.
pub const PLAYLIST_EXT: &str = ".ups";

/// Rows per listing page requested from the catalog.
pub const PAGE_SIZE: usize = 30;

/// A song directory holding at least this many files counts as downloaded.
pub const COMPLETE_FILE_COUNT: usize = 3;

/// Watch URL for a video-site identifier.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

// ============================================================================
// Song Records
// ============================================================================

/// One song of the remote catalog, as scraped from a listing page or
/// derived from a song document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongRecord {
    pub id: u32,
    pub title: String,
    pub artist: String,
    pub genre: String,
    pub year: String,
    pub edition: String,
    pub golden_notes: bool,
}

impl SongRecord {
    /// Canonical directory name: `<artist> - <title>`.
    pub fn dir_name(&self) -> String {
        canonical_dir_name(&self.artist, &self.title)
    }

    /// Playlist line: `<artist> : <title>`.
    pub fn playlist_line(&self) -> String {
        format!("{} : {}", self.artist, self.title)
    }

    /// Editions are a `", "`-separated list in a single cell.
    pub fn editions(&self) -> impl Iterator<Item = &str> {
        self.edition.split(", ").filter(|e| !e.is_empty())
    }
}

/// Canonical directory name, also used as the dedup key of the library.
pub fn canonical_dir_name(artist: &str, title: &str) -> String {
    format!("{} - {}", artist, title)
}

// ============================================================================
// Categories and Playlists
// ============================================================================

/// Named group of song ids, mapped 1:1 to a playlist file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub name: String,
    pub songs: Vec<u32>,
}

/// Playlist contents: name plus ordered `artist : title` lines.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Playlist {
    pub name: String,
    pub lines: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(edition: &str) -> SongRecord {
        SongRecord {
            id: 1,
            title: "Take On Me".to_string(),
            artist: "a-ha".to_string(),
            genre: String::new(),
            year: "1985".to_string(),
            edition: edition.to_string(),
            golden_notes: false,
        }
    }

    #[test]
    fn test_dir_name_and_playlist_line() {
        let r = record("");
        assert_eq!(r.dir_name(), "a-ha - Take On Me");
        assert_eq!(r.playlist_line(), "a-ha : Take On Me");
    }

    #[test]
    fn test_editions_split() {
        let r = record("SingStar 80s, [SC]-Songs");
        let editions: Vec<&str> = r.editions().collect();
        assert_eq!(editions, vec!["SingStar 80s", "[SC]-Songs"]);
        assert_eq!(record("").editions().count(), 0);
    }

    #[test]
    fn test_watch_url() {
        assert_eq!(watch_url("abc123"), "https://www.youtube.com/watch?v=abc123");
    }
}
