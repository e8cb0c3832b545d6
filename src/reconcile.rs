//! Fills the derived media tags of a song document.
//!
//! Rules, in order:
//! 1. missing `MP3` defaults to `<artist> - <title>.mp3`
//! 2. missing `COVER` defaults to `<artist> - <title>.jpg`
//! 3. `MP3` must end in `.mp3`
//! 4. a `VIDEO` value holding a `key=value` list yields the video id (`v`, then `V`)
//! 5. `VIDEO` becomes `<mp3 base>.mp4` unless it already names an `.mp4` file
//!    and carried no video id

use crate::error::{DialectError, DuplicateKeyError, KeyScope};
use crate::models::{canonical_dir_name, SongRecord, AUDIO_EXT, COVER_EXT, VIDEO_EXT};
use crate::tags::TagDocument;

pub const TAG_TITLE: &str = "TITLE";
pub const TAG_ARTIST: &str = "ARTIST";
pub const TAG_MP3: &str = "MP3";
pub const TAG_COVER: &str = "COVER";
pub const TAG_VIDEO: &str = "VIDEO";

const VIDEO_ID_KEYS: [&str; 2] = ["v", "V"];

/// A song document after reconciliation.
#[derive(Clone, Debug)]
pub struct Reconciled {
    pub document: TagDocument,
    pub dir_name: String,
    pub audio_file: String,
    pub video_file: String,
    pub cover_file: String,
    /// Video id embedded in the original `VIDEO` tag, if any.
    pub video_id: Option<String>,
}

impl Reconciled {
    /// Record used by playlists; the golden-notes flag is not in the document.
    pub fn record(&self, id: u32) -> SongRecord {
        let tag = |name: &str| self.document.get(name).unwrap_or_default().to_string();
        SongRecord {
            id,
            title: tag(TAG_TITLE),
            artist: tag(TAG_ARTIST),
            genre: tag("GENRE"),
            year: tag("YEAR"),
            edition: tag("EDITION"),
            golden_notes: false,
        }
    }
}

/// Parse a `key=value,key=value` list. Elements without `=` are ignored.
/// Returns None when no element carried a key.
pub fn parse_video_params(value: &str) -> Result<Option<Vec<(String, String)>>, DuplicateKeyError> {
    let mut params: Vec<(String, String)> = Vec::new();
    for element in value.split(',') {
        let Some(idx) = element.find('=').filter(|&i| i > 0) else {
            continue;
        };
        let key = &element[..idx];
        if params.iter().any(|(k, _)| k == key) {
            return Err(DuplicateKeyError {
                scope: KeyScope::VideoParam,
                key: key.to_string(),
            });
        }
        params.push((key.to_string(), element[idx + 1..].to_string()));
    }
    Ok(if params.is_empty() { None } else { Some(params) })
}

/// A `VIDEO` value is a reference when it has a `=` past its first char.
fn is_video_reference(value: &str) -> bool {
    value.find('=').is_some_and(|i| i > 0)
}

fn embedded_video_id(value: &str) -> Result<Option<String>, DuplicateKeyError> {
    let Some(params) = parse_video_params(value)? else {
        return Ok(None);
    };
    Ok(VIDEO_ID_KEYS.iter().find_map(|key| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }))
}

/// Apply the defaulting rules to a parsed document.
pub fn reconcile(mut document: TagDocument) -> Result<Reconciled, DialectError> {
    let artist = document
        .get(TAG_ARTIST)
        .ok_or(DialectError::MissingTag(TAG_ARTIST))?;
    let title = document
        .get(TAG_TITLE)
        .ok_or(DialectError::MissingTag(TAG_TITLE))?;
    let dir_name = canonical_dir_name(artist, title);
    let file_base = dir_name.replace(['/', '\\'], "_");

    if !document.contains(TAG_MP3) {
        document.set(TAG_MP3, format!("{}{}", file_base, AUDIO_EXT));
    }
    if !document.contains(TAG_COVER) {
        document.set(TAG_COVER, format!("{}{}", file_base, COVER_EXT));
    }

    let audio_file = document.get(TAG_MP3).unwrap_or_default().to_string();
    if !audio_file.ends_with(AUDIO_EXT) {
        return Err(DialectError::Extension {
            tag: TAG_MP3,
            value: audio_file,
            expected: AUDIO_EXT,
        });
    }

    let video_id = match document.get(TAG_VIDEO) {
        Some(value) if is_video_reference(value) => embedded_video_id(value)?,
        _ => None,
    };

    let keeps_video_file = video_id.is_none()
        && document
            .get(TAG_VIDEO)
            .is_some_and(|v| v.ends_with(VIDEO_EXT));
    if !keeps_video_file {
        let base = &audio_file[..audio_file.len() - AUDIO_EXT.len()];
        document.set(TAG_VIDEO, format!("{}{}", base, VIDEO_EXT));
    }

    let video_file = document.get(TAG_VIDEO).unwrap_or_default().to_string();
    let cover_file = document.get(TAG_COVER).unwrap_or_default().to_string();

    Ok(Reconciled {
        document,
        dir_name,
        audio_file,
        video_file,
        cover_file,
        video_id,
    })
}
