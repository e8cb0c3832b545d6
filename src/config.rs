//! Run configuration.
//!
//! Loaded from a TOML file; the CLI may override individual values before
//! [`Config::validate`] runs.
//!
//! ```toml
//! [account]
//! user = "singer"
//! password = "secret"      # or USDB_PASSWORD
//!
//! [paths]
//! songs = "/games/UltraStar Songs"
//! playlists = "/games/UltraStar Playlists"
//!
//! [download]
//! workers = 4
//!
//! [[category]]
//! name = "Metallica"
//! songs = [3669, 4118, 5076]
//! ```

use crate::models::Category;
use crate::safety::safe_component;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub user: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paths {
    /// One subdirectory per category, one song folder per song.
    pub songs: PathBuf,
    pub playlists: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Parallel song-document prefetches per category.
    pub workers: usize,
    pub ffmpeg: PathBuf,
    pub yt_dlp: PathBuf,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            ffmpeg: PathBuf::from("ffmpeg"),
            yt_dlp: PathBuf::from("yt-dlp"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub account: Account,
    pub paths: Paths,
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default, rename = "category")]
    pub categories: Vec<Category>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Credentials check, enough for catalog-only runs.
    pub fn validate_account(&self) -> Result<(), ConfigError> {
        if self.account.user.trim().is_empty() {
            return Err(ConfigError::Invalid("account.user is empty".to_string()));
        }
        if self.account.password.is_empty() {
            return Err(ConfigError::Invalid(
                "account.password is empty (set it in the file or via USDB_PASSWORD)".to_string(),
            ));
        }
        Ok(())
    }

    /// Full check for a sync run; needs every override applied first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_account()?;
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid("no [[category]] defined".to_string()));
        }

        let mut seen = FxHashSet::default();
        for category in &self.categories {
            let safe = safe_component(&category.name)
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if safe != category.name {
                return Err(ConfigError::Invalid(format!(
                    "category name '{}' contains a path separator",
                    category.name
                )));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "category '{}' defined twice",
                    category.name
                )));
            }
        }
        Ok(())
    }

    /// Total number of song ids across all categories.
    pub fn requested_songs(&self) -> usize {
        self.categories.iter().map(|c| c.songs.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [account]
        user = "singer"
        password = "secret"

        [paths]
        songs = "/tmp/songs"
        playlists = "/tmp/playlists"

        [[category]]
        name = "Metallica"
        songs = [3669, 4118, 5076]

        [[category]]
        name = "Lady Gaga"
        songs = [11052, 23775]
    "#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.account.user, "singer");
        assert_eq!(config.paths.songs, PathBuf::from("/tmp/songs"));
        assert_eq!(config.download.workers, 4);
        assert_eq!(config.download.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.categories.len(), 2);
        assert_eq!(config.categories[0].songs, vec![3669, 4118, 5076]);
        assert_eq!(config.requested_songs(), 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_download_overrides() {
        let text = format!("{}\n[download]\nworkers = 1\nffmpeg = \"/opt/ffmpeg\"\n", SAMPLE);
        let config = Config::from_toml_str(&text).unwrap();
        assert_eq!(config.download.workers, 1);
        assert_eq!(config.download.ffmpeg, PathBuf::from("/opt/ffmpeg"));
        assert_eq!(config.download.yt_dlp, PathBuf::from("yt-dlp"));
    }

    #[test]
    fn test_missing_password_rejected() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.account.password.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_account_only_config() {
        let text = "[account]\nuser = \"u\"\npassword = \"p\"\n[paths]\nsongs = \"s\"\nplaylists = \"p\"\n";
        let config = Config::from_toml_str(text).unwrap();
        config.validate_account().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.categories[1].name = "Metallica".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn test_category_with_separator_rejected() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.categories[0].name = "AC/DC".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            Config::from_toml_str("[account"),
            Err(ConfigError::Parse(_))
        ));
    }
}
