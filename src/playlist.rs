//! Playlist files.
//!
//! One `.ups` file per category, fully rewritten on every run:
//!
//! ```text
//! #Name: <category>
//! #Songs:
//! <artist> : <title>
//! ```

use crate::error::{Result, SyncError};
use crate::models::{Category, Playlist, SongRecord, PLAYLIST_EXT};
use crate::safety::safe_component;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const NAME_HEADER: &str = "#Name: ";
const SONGS_HEADER: &str = "#Songs:";

/// Resolve song ids to playlist lines, in the given id order.
/// An id without a record is fatal; if an id has several records the last
/// one wins.
pub fn render_playlist(name: &str, song_ids: &[u32], records: &[SongRecord]) -> Result<Playlist> {
    let by_id: FxHashMap<u32, &SongRecord> = records.iter().map(|r| (r.id, r)).collect();

    let lines = song_ids
        .iter()
        .map(|id| {
            by_id
                .get(id)
                .map(|record| record.playlist_line())
                .ok_or_else(|| SyncError::Lookup {
                    playlist: name.to_string(),
                    song: *id,
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Playlist {
        name: name.to_string(),
        lines,
    })
}

/// File contents of a playlist.
pub fn format_playlist(playlist: &Playlist) -> String {
    let mut out = format!("{}{}\n{}\n", NAME_HEADER, playlist.name, SONGS_HEADER);
    for line in &playlist.lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Write (overwrite) `<dir>/<name>.ups`.
pub fn write_playlist(dir: &Path, playlist: &Playlist) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| SyncError::io(dir, e))?;
    let path = dir.join(format!("{}{}", safe_component(&playlist.name)?, PLAYLIST_EXT));
    fs::write(&path, format_playlist(playlist)).map_err(|e| SyncError::io(&path, e))?;
    Ok(path)
}

/// One playlist per category, songs looked up in `records`.
pub fn generate_playlists(dir: &Path, categories: &[Category], records: &[SongRecord]) -> Result<()> {
    for category in categories {
        let playlist = render_playlist(&category.name, &category.songs, records)?;
        let path = write_playlist(dir, &playlist)?;
        info!("Wrote {} songs to {}", playlist.lines.len(), path.display());
    }
    Ok(())
}

// ============================================================================
// Reading
// ============================================================================

pub fn parse_playlist(path: &Path, text: &str) -> Result<Playlist> {
    let format_error = |message: &str| SyncError::PlaylistFormat {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let mut lines = text.lines();
    let name = lines
        .next()
        .and_then(|line| line.strip_prefix(NAME_HEADER))
        .ok_or_else(|| format_error("missing #Name header"))?;
    if lines.next().map(str::trim_end) != Some(SONGS_HEADER) {
        return Err(format_error("missing #Songs marker"));
    }

    Ok(Playlist {
        name: name.trim_end().to_string(),
        lines: lines
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.to_string())
            .collect(),
    })
}

pub fn read_playlist(path: &Path) -> Result<Playlist> {
    let text = fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
    parse_playlist(path, &text)
}

/// Every playlist in `dir`, sorted by file name. Other files are an error.
pub fn list_playlists(dir: &Path) -> Result<Vec<Playlist>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| SyncError::io(dir, e))? {
        let entry = entry.map_err(|e| SyncError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_playlist = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(PLAYLIST_EXT));
        if !is_playlist {
            return Err(SyncError::PlaylistFormat {
                path,
                message: format!("expected a {} file", PLAYLIST_EXT),
            });
        }
        paths.push(path);
    }
    paths.sort();
    paths.iter().map(|p| read_playlist(p)).collect()
}

// ============================================================================
// Editions
// ============================================================================

/// Distinct editions across all records.
pub fn editions(records: &[SongRecord]) -> BTreeSet<String> {
    records
        .iter()
        .flat_map(|r| r.editions())
        .map(|e| e.to_string())
        .collect()
}

/// Ids of the songs belonging to `edition`, in record order.
pub fn songs_in_edition(records: &[SongRecord], edition: &str) -> Vec<u32> {
    let mut seen = FxHashSet::default();
    records
        .iter()
        .filter(|r| r.editions().any(|e| e == edition))
        .filter(|r| seen.insert(r.id))
        .map(|r| r.id)
        .collect()
}

/// Playlist per edition, written to `dir`. Returns how many were written.
pub fn write_edition_playlists(dir: &Path, records: &[SongRecord]) -> Result<usize> {
    let all = editions(records);
    for edition in &all {
        let ids = songs_in_edition(records, edition);
        let playlist = render_playlist(edition, &ids, records)?;
        write_playlist(dir, &playlist)?;
    }
    Ok(all.len())
}
