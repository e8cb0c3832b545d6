//! Per-category download of song packages.
//!
//! For every requested id, in order: fetch the song document, reconcile its
//! tags, record the song, and unless its folder is already complete, write the
//! document and cover and hand off to the media fetcher.
//!
//! Song documents of a category are prefetched on a bounded worker pool; the
//! library check, folder creation and media steps stay sequential.

use crate::error::{DialectError, MediaError, Result, SyncError, TransportError};
use crate::library::LibraryIndex;
use crate::media::MediaFetcher;
use crate::models::{Category, SongRecord, DOCUMENT_EXT};
use crate::playlist;
use crate::progress::{format_duration, StepProgress};
use crate::reconcile::{reconcile, Reconciled};
use crate::safety::safe_component;
use crate::tags::TagDocument;
use crate::transport::Transport;
use crate::usdb::UsdbClient;
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};

/// Result of one category batch.
#[derive(Debug, Default)]
pub struct CategoryOutcome {
    /// Records of every song whose document was found, in request order.
    pub records: Vec<SongRecord>,
    pub downloaded: usize,
    pub skipped: usize,
    /// Requested ids the database did not return.
    pub missing: Vec<u32>,
}

/// Result of a whole run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub records: Vec<SongRecord>,
    pub requested: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub missing: Vec<u32>,
}

/// A reconciled song ready for acquisition.
#[derive(Debug)]
struct Prepared {
    meta: Reconciled,
    dir_name: String,
}

/// Parse and reconcile one song document and check every name it yields.
/// Nothing touches the disk here, so a bad document leaves no partial folder
/// behind.
fn prepare(id: u32, text: &str) -> Result<Prepared> {
    let dialect = |source: DialectError| SyncError::Dialect { song: id, source };
    let document = TagDocument::parse(text).map_err(|e| dialect(e.into()))?;
    let meta = reconcile(document).map_err(dialect)?;
    let dir_name = safe_component(&meta.dir_name)?;
    for file_name in [&meta.cover_file, &meta.audio_file, &meta.video_file] {
        checked_file_name(file_name)?;
    }
    Ok(Prepared { meta, dir_name })
}

/// File names from tags must already be a single path component.
fn checked_file_name(name: &str) -> Result<&str> {
    if safe_component(name)? != name {
        return Err(SyncError::UnsafeName(name.to_string()));
    }
    Ok(name)
}

/// Embedded reference wins over the detail page; a disagreement is only logged.
fn choose_video_id(id: u32, embedded: Option<String>, scraped: Option<String>) -> Result<String> {
    match (embedded, scraped) {
        (Some(embedded), Some(scraped)) => {
            if embedded != scraped {
                warn!(
                    "Song {}: different video ids found, document has {}, detail page has {}",
                    id, embedded, scraped
                );
            }
            Ok(embedded)
        }
        (Some(embedded), None) => Ok(embedded),
        (None, Some(scraped)) => Ok(scraped),
        (None, None) => Err(SyncError::NoVideoId(id)),
    }
}

pub struct Downloader<'a, T, M> {
    client: &'a UsdbClient<T>,
    media: &'a M,
    user: &'a str,
    password: &'a str,
    workers: usize,
}

impl<'a, T: Transport, M: MediaFetcher> Downloader<'a, T, M> {
    pub fn new(client: &'a UsdbClient<T>, media: &'a M, user: &'a str, password: &'a str) -> Self {
        Self {
            client,
            media,
            user,
            password,
            workers: 1,
        }
    }

    /// Number of song documents fetched in parallel per category.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Fetch all song documents of a batch, preserving request order.
    fn prefetch(&self, song_ids: &[u32]) -> Vec<Result<Option<String>, TransportError>> {
        let client = self.client;
        if self.workers > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
                Ok(pool) => {
                    return pool.install(|| {
                        song_ids
                            .par_iter()
                            .map(|&id| client.song_text(id))
                            .collect()
                    })
                }
                Err(e) => warn!("Failed to build prefetch pool, fetching sequentially: {}", e),
            }
        }
        song_ids.iter().map(|&id| client.song_text(id)).collect()
    }

    /// Download one category into `dest`, one folder per song.
    ///
    /// A rejected login fails the whole batch before any song is touched.
    /// Songs the database does not know are logged and reported in `missing`.
    pub fn download_category(&self, dest: &Path, song_ids: &[u32]) -> Result<CategoryOutcome> {
        if !self.client.login(self.user, self.password)? {
            error!("Error logging in to the song database");
            return Err(SyncError::Authentication(self.user.to_string()));
        }

        let mut index = LibraryIndex::scan(dest);
        let documents = self.prefetch(song_ids);
        let mut outcome = CategoryOutcome::default();

        let progress = StepProgress::new("songs", song_ids.len() as u64);
        for (&id, document) in song_ids.iter().zip(documents) {
            progress.step();

            let Some(text) = document? else {
                error!("Song {} not found", id);
                outcome.missing.push(id);
                continue;
            };

            let prepared = prepare(id, &text)?;
            outcome.records.push(prepared.meta.record(id));

            if index.contains(&prepared.dir_name) {
                info!("{} already exists, skipping", prepared.dir_name);
                outcome.skipped += 1;
                continue;
            }

            info!("{} downloading", prepared.dir_name);
            progress.working_on(&prepared.dir_name);
            self.acquire(id, dest, &prepared)?;
            index.insert(prepared.dir_name);
            outcome.downloaded += 1;
        }
        progress.finish(format!(
            "{} downloaded, {} present, {} missing",
            outcome.downloaded,
            outcome.skipped,
            outcome.missing.len()
        ));

        Ok(outcome)
    }

    /// Create the song folder and fill it: document, cover, media.
    fn acquire(&self, id: u32, dest: &Path, prepared: &Prepared) -> Result<()> {
        let meta = &prepared.meta;
        let dir = dest.join(&prepared.dir_name);
        fs::create_dir_all(&dir).map_err(|e| SyncError::io(&dir, e))?;

        let document_path = dir.join(format!("{}{}", prepared.dir_name, DOCUMENT_EXT));
        fs::write(&document_path, meta.document.render())
            .map_err(|e| SyncError::io(&document_path, e))?;

        let cover = self.client.cover(id)?;
        if cover.status != 200 {
            return Err(SyncError::Cover {
                song: id,
                status: cover.status,
            });
        }
        let cover_path = dir.join(&meta.cover_file);
        fs::write(&cover_path, &cover.bytes).map_err(|e| SyncError::io(&cover_path, e))?;

        let scraped = self.client.detail_video_id(id)?;
        let video_id = choose_video_id(id, meta.video_id.clone(), scraped)?;

        self.media
            .fetch(&video_id, &dir, &meta.audio_file, &meta.video_file)
            .map_err(|source: MediaError| SyncError::Media { song: id, source })
    }

    /// Download every category under `songs_root/<category name>`.
    pub fn download_all(&self, songs_root: &Path, categories: &[Category]) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for category in categories {
            info!("Category {}", category.name);
            let dest = songs_root.join(&category.name);
            fs::create_dir_all(&dest).map_err(|e| SyncError::io(&dest, e))?;

            let outcome = self.download_category(&dest, &category.songs)?;
            summary.requested += category.songs.len();
            summary.downloaded += outcome.downloaded;
            summary.skipped += outcome.skipped;
            summary.missing.extend(outcome.missing);
            summary.records.extend(outcome.records);
        }
        Ok(summary)
    }

    /// Download everything, then regenerate one playlist per category.
    ///
    /// Playlists are only written once every requested song was found.
    pub fn sync(&self, songs_root: &Path, playlist_dir: &Path, categories: &[Category]) -> Result<RunSummary> {
        let start = Instant::now();
        let summary = self.download_all(songs_root, categories)?;
        info!(
            "Recorded {}/{} songs ({} downloaded, {} already present) in {}",
            summary.records.len(),
            summary.requested,
            summary.downloaded,
            summary.skipped,
            format_duration(start.elapsed())
        );
        if !summary.missing.is_empty() {
            return Err(SyncError::MissingSongs(summary.missing));
        }

        playlist::generate_playlists(playlist_dir, categories, &summary.records)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_duplicate_tag() {
        let err = prepare(7, "#TITLE:A\n#ARTIST:B\n#TITLE:C\n").unwrap_err();
        assert!(matches!(
            err,
            SyncError::Dialect {
                song: 7,
                source: DialectError::DuplicateKey(_)
            }
        ));
    }

    #[test]
    fn test_prepare_sanitizes_dir_name() {
        let prepared = prepare(1, "#TITLE:T.N.T.\n#ARTIST:AC/DC\n").unwrap();
        assert_eq!(prepared.dir_name, "AC_DC - T.N.T.");
        assert_eq!(prepared.meta.record(1).artist, "AC/DC");
    }

    #[test]
    fn test_prepare_rejects_unsafe_tag_file_names() {
        for header in ["#MP3:../evil.mp3\n", "#COVER:a/b.jpg\n", "#VIDEO:sub/clip.mp4\n"] {
            let text = format!("#TITLE:T\n#ARTIST:A\n{}: 0 1 2 x\nE\n", header);
            assert!(
                matches!(prepare(1, &text), Err(SyncError::UnsafeName(_))),
                "{}",
                header
            );
        }
    }

    #[test]
    fn test_checked_file_name() {
        assert_eq!(checked_file_name("a - b.mp3").unwrap(), "a - b.mp3");
        assert!(checked_file_name("../evil.mp3").is_err());
    }

    #[test]
    fn test_choose_video_id() {
        let s = |v: &str| Some(v.to_string());
        assert_eq!(choose_video_id(1, s("a"), s("b")).unwrap(), "a");
        assert_eq!(choose_video_id(1, s("a"), None).unwrap(), "a");
        assert_eq!(choose_video_id(1, None, s("b")).unwrap(), "b");
        assert!(matches!(choose_video_id(1, None, None), Err(SyncError::NoVideoId(1))));
    }
}
