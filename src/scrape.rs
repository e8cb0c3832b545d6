//! Markup extraction for the song database pages.
//!
//! The pages are scanned against known literals instead of being parsed as a
//! DOM. Every function here is pure so the dialect can be tested offline
//! against captured fragments; fetching lives in `usdb`.

use crate::error::DialectError;
use crate::models::SongRecord;
use once_cell::sync::Lazy;
use regex::Regex;

// ============================================================================
// Dialect Literals
// ============================================================================

const TEXTAREA_OPEN: &str = "<textarea ";
const TEXTAREA_CLOSE: &str = "</textarea>";

/// Every listing cell starts with this; the `show_detail(<id>)` call is the row key.
const ROW_MARKER: &str = "<td onclick=\"show_detail(";
const ROW_KEY_OFFSET: usize = "<td onclick=\"".len();
const ROW_KEY_END: &str = ")\"";
const CELL_CLOSE: &str = "</td>";
const DETAIL_ANCHOR: &str = "<a href=\"?link=detail&id=";
const ANCHOR_TAG_END: &str = "\">";
const ANCHOR_CLOSE: &str = "</a>";

/// Columns of one listing row.
const COL_ARTIST: usize = 1;
const COL_TITLE_ANCHOR: usize = 2;
const COL_GENRE: usize = 3;
const COL_YEAR: usize = 4;
const COL_EDITION: usize = 5;
const COL_GOLDEN: usize = 6;
const ROW_CELLS: usize = 7;

const EMBED_OPEN: &str = "<iframe ";
const EMBED_CLOSE: &str = "</iframe>";
const EMBED_SRC: &str = " src=\"";
const EMBED_URL_PREFIX: &str = "https://www.youtube.com/embed/";

const LOGIN_REJECTED: &str = "Login or Password invalid";

/// "There are  65  results on  3 page(s)" with tolerant spacing.
static PAGE_COUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"There\s*are\s*(\d+)\s*results\s*on\s*(\d+)\s*page\(s\)").unwrap()
});

// ============================================================================
// Song Document
// ============================================================================

/// Content of the first `<textarea ...>` element, CRLF-normalized.
/// None means the song does not exist.
pub fn extract_song_text(html: &str) -> Option<String> {
    let open = html.find(TEXTAREA_OPEN)?;
    let content_start = open + html[open..].find('>')? + 1;
    let content_end = content_start + html[content_start..].find(TEXTAREA_CLOSE)?;
    Some(html[content_start..content_end].replace("\r\n", "\n"))
}

/// Login responses are rejected on a non-200 status or the error banner.
pub fn is_login_rejected(status: u16, body: &str) -> bool {
    status != 200 || body.contains(LOGIN_REJECTED)
}

// ============================================================================
// Listing Pages
// ============================================================================

/// Result and page totals reported by a listing page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCount {
    pub results: usize,
    pub pages: usize,
}

pub fn parse_page_count(html: &str) -> Result<PageCount, DialectError> {
    let caps = PAGE_COUNT
        .captures(html)
        .ok_or_else(|| DialectError::Markup("listing page has no result count".to_string()))?;
    let number = |i: usize| {
        caps[i]
            .parse::<usize>()
            .map_err(|e| DialectError::Markup(format!("bad page count '{}': {}", &caps[i], e)))
    };
    Ok(PageCount {
        results: number(1)?,
        pages: number(2)?,
    })
}

fn golden_flag(cell: &str) -> bool {
    matches!(
        cell.trim().to_ascii_lowercase().as_str(),
        "yes" | "ja" | "true" | "1"
    )
}

fn record_from_cells(cells: &[&str]) -> Result<SongRecord, DialectError> {
    if cells.len() < ROW_CELLS {
        return Err(DialectError::Markup(format!(
            "listing row has {} cells, expected {}",
            cells.len(),
            ROW_CELLS
        )));
    }

    let anchor = cells[COL_TITLE_ANCHOR].trim_start();
    let rest = anchor.strip_prefix(DETAIL_ANCHOR).ok_or_else(|| {
        DialectError::Markup(format!("title cell has no detail anchor: '{}'", anchor))
    })?;
    let id_end = rest
        .find(ANCHOR_TAG_END)
        .ok_or_else(|| DialectError::Markup(format!("unterminated detail anchor: '{}'", anchor)))?;
    let id = rest[..id_end]
        .parse::<u32>()
        .map_err(|e| DialectError::Markup(format!("bad song id '{}': {}", &rest[..id_end], e)))?;
    let title = rest[id_end + ANCHOR_TAG_END.len()..].trim();
    let title = title.strip_suffix(ANCHOR_CLOSE).unwrap_or(title);

    Ok(SongRecord {
        id,
        title: title.trim().to_string(),
        artist: cells[COL_ARTIST].trim().to_string(),
        genre: cells[COL_GENRE].trim().to_string(),
        year: cells[COL_YEAR].trim().to_string(),
        edition: cells[COL_EDITION].trim().to_string(),
        golden_notes: golden_flag(cells[COL_GOLDEN]),
    })
}

fn unterminated(what: &str, at: usize) -> DialectError {
    DialectError::Markup(format!("unterminated {} at byte {}", what, at))
}

/// Extract the song rows of one listing page, in row order.
///
/// Cells are grouped by their `show_detail(..)` key; a row is emitted when
/// the key changes or the page ends.
pub fn parse_listing(html: &str) -> Result<Vec<SongRecord>, DialectError> {
    let mut records = Vec::new();
    let mut row_key: Option<&str> = None;
    let mut cells: Vec<&str> = Vec::with_capacity(ROW_CELLS);
    let mut pos = 0;

    while let Some(rel) = html[pos..].find(ROW_MARKER) {
        let td = pos + rel;
        let key_end = html[td..]
            .find(ROW_KEY_END)
            .map(|i| td + i + 1)
            .ok_or_else(|| unterminated("row marker", td))?;
        let key = &html[td + ROW_KEY_OFFSET..key_end];

        if row_key != Some(key) {
            if !cells.is_empty() {
                records.push(record_from_cells(&cells)?);
                cells.clear();
            }
            row_key = Some(key);
        }

        let content_start = html[key_end..]
            .find('>')
            .map(|i| key_end + i + 1)
            .ok_or_else(|| unterminated("cell tag", key_end))?;
        let content_end = html[content_start..]
            .find(CELL_CLOSE)
            .map(|i| content_start + i)
            .ok_or_else(|| unterminated("cell", content_start))?;
        cells.push(&html[content_start..content_end]);
        pos = content_end + CELL_CLOSE.len();
    }

    if !cells.is_empty() {
        records.push(record_from_cells(&cells)?);
    }
    Ok(records)
}

// ============================================================================
// Detail Pages
// ============================================================================

/// Video id of the first embed whose source is a video-site embed URL.
///
/// Each `<iframe>` is searched only up to its own closing tag.
pub fn extract_video_id(html: &str) -> Option<String> {
    let mut pos = 0;
    while let Some(rel) = html[pos..].find(EMBED_OPEN) {
        let open = pos + rel;
        let close = open + html[open..].find(EMBED_CLOSE)?;
        let frame = &html[open..close];

        if let Some(src_at) = frame.find(EMBED_SRC) {
            let url_start = src_at + EMBED_SRC.len();
            if let Some(url_len) = frame[url_start..].find('"') {
                let url = &frame[url_start..url_start + url_len];
                if let Some(id) = url.strip_prefix(EMBED_URL_PREFIX) {
                    let id = id.split(['?', '&', '#']).next().unwrap_or_default();
                    if !id.is_empty() {
                        return Some(id.to_string());
                    }
                }
            }
        }
        pos = close + EMBED_CLOSE.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u32, artist: &str, title: &str, edition: &str, golden: &str) -> String {
        let cell = |content: &str| {
            format!(
                "<td onclick=\"show_detail({id})\" class=\"list_cell\">{content}</td>\n"
            )
        };
        [
            cell("<img src=\"cover.jpg\">"),
            cell(artist),
            cell(&format!("<a href=\"?link=detail&id={id}\">{title}</a>")),
            cell("Pop"),
            cell("1985"),
            cell(edition),
            cell(golden),
        ]
        .concat()
    }

    fn page(rows: &[String]) -> String {
        format!(
            "<html><body><br>There are  65  results on  3 page(s)<br><table><tr>{}</tr></table></body></html>",
            rows.join("</tr>\n<tr>")
        )
    }

    #[test]
    fn test_extract_song_text() {
        let html = "<form><textarea name=\"txt\" rows=\"20\">#TITLE:A\r\n#ARTIST:B\r\nE</textarea></form>";
        assert_eq!(extract_song_text(html).as_deref(), Some("#TITLE:A\n#ARTIST:B\nE"));
        assert_eq!(extract_song_text("<p>Song not found</p>"), None);
    }

    #[test]
    fn test_login_rejected() {
        assert!(is_login_rejected(200, "<b>Login or Password invalid</b>"));
        assert!(is_login_rejected(500, ""));
        assert!(!is_login_rejected(200, "Welcome back"));
    }

    #[test]
    fn test_parse_listing_rows_in_order() {
        let html = page(&[
            row(3860, "a-ha", "Take On Me", "SingStar 80s", "Yes"),
            row(4118, "Metallica", "Nothing Else Matters", "", "No"),
            row(25203, "The Jackson 5", "ABC", "[SC]-Songs, SingStar", "No"),
        ]);
        let records = parse_listing(&html).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].id, 3860);
        assert_eq!(records[0].artist, "a-ha");
        assert_eq!(records[0].title, "Take On Me");
        assert_eq!(records[0].year, "1985");
        assert!(records[0].golden_notes);
        assert_eq!(records[1].id, 4118);
        assert!(!records[1].golden_notes);
        assert_eq!(records[2].edition, "[SC]-Songs, SingStar");
    }

    #[test]
    fn test_parse_listing_empty_page() {
        assert!(parse_listing(&page(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_parse_listing_changed_anchor_is_fatal() {
        let html = row(1, "X", "Y", "", "No").replace("?link=detail&id=", "/song/");
        assert!(matches!(parse_listing(&html), Err(DialectError::Markup(_))));
    }

    #[test]
    fn test_parse_listing_short_row_is_fatal() {
        let html = "<td onclick=\"show_detail(1)\">a</td><td onclick=\"show_detail(1)\">b</td>";
        assert!(parse_listing(html).is_err());
    }

    #[test]
    fn test_parse_page_count() {
        let count = parse_page_count(&page(&[])).unwrap();
        assert_eq!(count, PageCount { results: 65, pages: 3 });
        let tight = parse_page_count("Thereare 65 results on 3 page(s)").unwrap();
        assert_eq!(tight.pages, 3);
        assert!(parse_page_count("<html></html>").is_err());
    }

    #[test]
    fn test_extract_video_id() {
        let html = r#"<div><iframe width="560" src="https://www.youtube.com/embed/abc123">x</iframe></div>"#;
        assert_eq!(extract_video_id(html).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_extract_video_id_skips_foreign_embeds() {
        let html = concat!(
            r#"<iframe src="https://player.vimeo.com/video/1"></iframe>"#,
            r#"<iframe class="yt" src="https://www.youtube.com/embed/second?start=5"></iframe>"#
        );
        assert_eq!(extract_video_id(html).as_deref(), Some("second"));
    }

    #[test]
    fn test_extract_video_id_stays_within_embed() {
        // The src attribute after the first closing tag belongs to a script, not the embed.
        let html = concat!(
            r#"<iframe name="ad"></iframe>"#,
            r#"<script src="https://www.youtube.com/embed/leak"></script>"#
        );
        assert_eq!(extract_video_id(html), None);
    }

    #[test]
    fn test_extract_video_id_absent() {
        assert_eq!(extract_video_id("<p>no video</p>"), None);
    }
}
