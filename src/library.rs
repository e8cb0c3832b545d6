//! Index of song folders already present under a destination root.
//!
//! A folder counts as downloaded once it holds at least three files. For
//! folders with exactly three files the audio/video pair is checked, but a
//! missing one is only reported.

use crate::models::{AUDIO_EXT, COMPLETE_FILE_COUNT, VIDEO_EXT};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Default)]
pub struct LibraryIndex {
    root: PathBuf,
    complete: FxHashSet<String>,
}

/// Last three characters, lowercased.
fn ending(file_name: &str) -> String {
    let mut tail: Vec<char> = file_name.chars().rev().take(3).collect();
    tail.reverse();
    tail.into_iter().collect::<String>().to_lowercase()
}

fn files_under(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Error accessing entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect()
}

impl LibraryIndex {
    /// Scan the direct subdirectories of `root`. A missing root is an empty library.
    pub fn scan(root: &Path) -> Self {
        let mut index = Self {
            root: root.to_path_buf(),
            complete: FxHashSet::default(),
        };
        if !root.is_dir() {
            debug!("Library root {} does not exist yet", root.display());
            return index;
        }

        let audio = &AUDIO_EXT[1..];
        let video = &VIDEO_EXT[1..];

        for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Error accessing entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let files = files_under(entry.path());

            if files.len() == COMPLETE_FILE_COUNT {
                let endings: FxHashSet<String> = files.iter().map(|f| ending(f)).collect();
                if !endings.contains(audio) {
                    warn!("{} missing {}", name, audio);
                }
                if !endings.contains(video) {
                    warn!("{} missing {}", name, video);
                }
            }
            if files.len() >= COMPLETE_FILE_COUNT {
                index.complete.insert(name);
            }
        }

        debug!("{} complete songs under {}", index.complete.len(), root.display());
        index
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contains(&self, dir_name: &str) -> bool {
        self.complete.contains(dir_name)
    }

    /// Mark a folder as downloaded during this run.
    pub fn insert(&mut self, dir_name: impl Into<String>) {
        self.complete.insert(dir_name.into());
    }

    pub fn len(&self) -> usize {
        self.complete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.complete.is_empty()
    }
}
