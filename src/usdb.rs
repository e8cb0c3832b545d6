//! Client for the remote song database.
//!
//! Wraps a [`Transport`] with the endpoints of the database and hands the
//! responses to the pure extractors in [`crate::scrape`].

use crate::error::{SyncError, TransportError};
use crate::models::{SongRecord, PAGE_SIZE, USDB_BASE_URL};
use crate::progress::StepProgress;
use crate::scrape;
use crate::transport::{BinaryResponse, Method, Transport};
use tracing::{debug, info, warn};

/// Search form of the listing endpoint, ordered by id ascending.
fn listing_form(start: Option<usize>) -> Vec<(&'static str, String)> {
    let mut form: Vec<(&'static str, String)> = [
        "interpret", "title", "edition", "language", "genre", "year", "creator",
    ]
    .into_iter()
    .map(|field| (field, String::new()))
    .collect();
    form.push(("order", "id".to_string()));
    form.push(("ud", "asc".to_string()));
    form.push(("limit", PAGE_SIZE.to_string()));
    form.push(("details", "1".to_string()));
    if let Some(start) = start {
        form.push(("start", start.to_string()));
    }
    form
}

pub struct UsdbClient<T> {
    transport: T,
    base_url: String,
}

impl<T: Transport> UsdbClient<T> {
    pub fn new(transport: T) -> Self {
        Self::with_base_url(transport, USDB_BASE_URL)
    }

    pub fn with_base_url(transport: T, base_url: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Log in; the transport keeps the session. Returns false when rejected.
    pub fn login(&self, user: &str, password: &str) -> Result<bool, TransportError> {
        let url = format!("{}/index.php?link=login", self.base_url);
        let form = [("user", user), ("pass", password), ("login", "Login")];
        let response = self.transport.fetch(Method::Post, &url, &form)?;
        Ok(!scrape::is_login_rejected(response.status, &response.body))
    }

    /// Raw song document, or None if the song does not exist.
    pub fn song_text(&self, id: u32) -> Result<Option<String>, TransportError> {
        let url = format!("{}/index.php?link=gettxt&id={}", self.base_url, id);
        let response = self.transport.fetch(Method::Post, &url, &[("wd", "1")])?;
        Ok(scrape::extract_song_text(&response.body))
    }

    pub fn cover(&self, id: u32) -> Result<BinaryResponse, TransportError> {
        let url = format!("{}/data/cover/{}.jpg", self.base_url, id);
        self.transport.fetch_binary(&url)
    }

    /// Video id embedded in the song's detail page.
    pub fn detail_video_id(&self, id: u32) -> Result<Option<String>, TransportError> {
        let url = format!("{}/index.php?link=detail&id={}", self.base_url, id);
        let response = self.transport.fetch(Method::Get, &url, &[])?;
        Ok(scrape::extract_video_id(&response.body))
    }

    /// Every song of the catalog, page by page in fetch order.
    pub fn catalog(&self) -> Result<Vec<SongRecord>, SyncError> {
        let url = format!("{}/?link=list", self.base_url);

        let first = self.fetch_listing(&url, None)?;
        if first.status != 200 {
            return Err(TransportError::Request {
                url,
                message: format!("listing returned status {}", first.status),
            }
            .into());
        }
        let count = scrape::parse_page_count(&first.body)?;
        info!("Catalog reports {} songs on {} pages", count.results, count.pages);

        let mut records = scrape::parse_listing(&first.body)?;
        let progress = StepProgress::new("catalog", count.pages as u64);
        progress.step();

        for page in 1..count.pages {
            let start = page * PAGE_SIZE;
            debug!("Reading page {}/{} (start={})", page + 1, count.pages, start);
            let response = self.fetch_listing(&url, Some(start))?;
            if response.status == 200 {
                records.extend(scrape::parse_listing(&response.body)?);
            } else {
                warn!("Listing page {} returned status {}, skipping", page + 1, response.status);
            }
            progress.step();
        }

        progress.finish(format!("read {} songs", records.len()));
        Ok(records)
    }

    fn fetch_listing(
        &self,
        url: &str,
        start: Option<usize>,
    ) -> Result<crate::transport::Response, TransportError> {
        let form = listing_form(start);
        let pairs: Vec<(&str, &str)> = form.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.transport.fetch(Method::Post, url, &pairs)
    }
}
