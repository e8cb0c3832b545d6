//! Error types for usdb-sync.
//!
//! Malformed-dialect errors signal that the remote format changed; they are
//! never recovered from. Song-not-found is not an error at this level, it is
//! an `Ok(None)` from the client.

use std::path::PathBuf;
use thiserror::Error;

/// Where a duplicate key was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    /// `#KEY:value` header of a song document
    Tag,
    /// `key=value` list inside a `VIDEO` tag
    VideoParam,
}

impl std::fmt::Display for KeyScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyScope::Tag => write!(f, "tag"),
            KeyScope::VideoParam => write!(f, "video parameter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate {scope} key '{key}'")]
pub struct DuplicateKeyError {
    pub scope: KeyScope,
    pub key: String,
}

/// The remote dialect did not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DialectError {
    #[error(transparent)]
    DuplicateKey(#[from] DuplicateKeyError),

    #[error("tag {tag} value '{value}' does not end in '{expected}'")]
    Extension {
        tag: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("required tag {0} is missing")]
    MissingTag(&'static str),

    #[error("unrecognized markup: {0}")]
    Markup(String),
}

/// Failures of the HTTP session transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("I/O error reading response: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the video backend or the transcoder.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("stream manifest could not be parsed: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("no {0} stream available")]
    NoStream(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("login to the song database failed for user '{0}'")]
    Authentication(String),

    #[error("song {song}: {source}")]
    Dialect {
        song: u32,
        #[source]
        source: DialectError,
    },

    #[error("catalog: {0}")]
    Catalog(#[from] DialectError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("song {song}: cover fetch returned status {status}")]
    Cover { song: u32, status: u16 },

    #[error("song {0}: no video id could be resolved")]
    NoVideoId(u32),

    #[error("song {song}: {source}")]
    Media {
        song: u32,
        #[source]
        source: MediaError,
    },

    #[error("{} requested songs were not found: {:?}", .0.len(), .0)]
    MissingSongs(Vec<u32>),

    #[error("playlist '{playlist}': song {song} has no record")]
    Lookup { playlist: String, song: u32 },

    #[error("{path}: not a playlist file: {message}")]
    PlaylistFormat { path: PathBuf, message: String },

    #[error("unsafe path component '{0}'")]
    UnsafeName(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
