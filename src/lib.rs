//! usdb-sync library - song database scraping, tag reconciliation and
//! local library sync shared by the CLI and the integration tests.

pub mod config;
pub mod error;
pub mod library;
pub mod media;
pub mod models;
pub mod orchestrator;
pub mod playlist;
pub mod progress;
pub mod reconcile;
pub mod safety;
pub mod scrape;
pub mod tags;
pub mod transport;
pub mod usdb;

pub use error::{DialectError, DuplicateKeyError, SyncError};
pub use models::{Category, Playlist, SongRecord};
pub use orchestrator::{Downloader, RunSummary};
pub use tags::TagDocument;
pub use usdb::UsdbClient;
