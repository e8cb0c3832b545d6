//! Song document header parsing.
//!
//! A song document starts with `#KEY:value` lines. The first line that is
//! not a tag ends the header; everything from that line on is the tail and
//! is carried through untouched. Line endings are normalized to `\n`.

use crate::error::{DuplicateKeyError, KeyScope};

const SENTINEL: char = '#';
const SEPARATOR: char = ':';

/// Parsed song document: ordered tags plus the untouched body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagDocument {
    tags: Vec<(String, String)>,
    text: String,
    tail_start: usize,
}

/// Split a header line into (name, value), or None if it is not a tag.
fn parse_tag_line(line: &str) -> Option<(&str, &str)> {
    let rest = line.strip_prefix(SENTINEL)?;
    let idx = rest.find(SEPARATOR)?;
    if idx == 0 {
        return None;
    }
    Some((&rest[..idx], &rest[idx + SEPARATOR.len_utf8()..]))
}

impl TagDocument {
    /// Parse a raw document. Fails if a tag name repeats.
    pub fn parse(raw: &str) -> Result<Self, DuplicateKeyError> {
        let text = raw.replace("\r\n", "\n");
        let mut tags: Vec<(String, String)> = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
            let Some((name, value)) = parse_tag_line(&text[pos..end]) else {
                break;
            };
            if tags.iter().any(|(k, _)| k == name) {
                return Err(DuplicateKeyError {
                    scope: KeyScope::Tag,
                    key: name.to_string(),
                });
            }
            tags.push((name.to_string(), value.to_string()));
            pos = end + 1;
        }

        let tail_start = pos.min(text.len());
        Ok(Self {
            tags,
            text,
            tail_start,
        })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Overwrite a tag in place, or append it to the end of the order.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.tags.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value,
            None => self.tags.push((name.to_string(), value)),
        }
    }

    /// Tag names in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Byte offset (in the normalized text) where the header ends.
    pub fn tail_start(&self) -> usize {
        self.tail_start
    }

    /// Body text following the header.
    pub fn tail(&self) -> &str {
        &self.text[self.tail_start..]
    }

    /// Serialize the current tags in order, followed by the tail.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.text.len() + 64);
        for (name, value) in &self.tags {
            out.push(SENTINEL);
            out.push_str(name);
            out.push(SEPARATOR);
            out.push_str(value);
            out.push('\n');
        }
        out.push_str(self.tail());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "#TITLE:Take On Me\n#ARTIST:a-ha\n#BPM:169,2\n: 0 4 5 Talk\n: 5 2 5 ing\nE\n";

    #[test]
    fn test_parse_order_and_tail() {
        let doc = TagDocument::parse(DOC).unwrap();
        let names: Vec<&str> = doc.names().collect();
        assert_eq!(names, vec!["TITLE", "ARTIST", "BPM"]);
        assert_eq!(doc.get("ARTIST"), Some("a-ha"));
        assert_eq!(doc.tail(), ": 0 4 5 Talk\n: 5 2 5 ing\nE\n");
        assert_eq!(&DOC[doc.tail_start()..], doc.tail());
    }

    #[test]
    fn test_render_round_trip() {
        let doc = TagDocument::parse(DOC).unwrap();
        assert_eq!(doc.render(), DOC);
    }

    #[test]
    fn test_crlf_normalized() {
        let doc = TagDocument::parse("#TITLE:X\r\n#ARTIST:Y\r\nE\r\n").unwrap();
        assert_eq!(doc.get("TITLE"), Some("X"));
        assert_eq!(doc.render(), "#TITLE:X\n#ARTIST:Y\nE\n");
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let err = TagDocument::parse("#TITLE:A\n#TITLE:B\n").unwrap_err();
        assert_eq!(err.scope, KeyScope::Tag);
        assert_eq!(err.key, "TITLE");
    }

    #[test]
    fn test_line_without_separator_ends_header() {
        let doc = TagDocument::parse("#TITLE:A\n#comment\n#ARTIST:B\n").unwrap();
        assert_eq!(doc.len(), 1);
        assert!(!doc.contains("ARTIST"));
        assert_eq!(doc.tail(), "#comment\n#ARTIST:B\n");
    }

    #[test]
    fn test_value_keeps_colons_and_spaces() {
        let doc = TagDocument::parse("#VIDEO:v=abc,co=x:y \n").unwrap();
        assert_eq!(doc.get("VIDEO"), Some("v=abc,co=x:y "));
        assert_eq!(doc.tail(), "");
    }

    #[test]
    fn test_header_without_trailing_newline() {
        let doc = TagDocument::parse("#TITLE:A").unwrap();
        assert_eq!(doc.tail_start(), 8);
        assert_eq!(doc.render(), "#TITLE:A\n");
    }

    #[test]
    fn test_set_updates_in_place_and_appends() {
        let mut doc = TagDocument::parse(DOC).unwrap();
        doc.set("ARTIST", "A-HA");
        doc.set("MP3", "a-ha - Take On Me.mp3");
        let names: Vec<&str> = doc.names().collect();
        assert_eq!(names, vec!["TITLE", "ARTIST", "BPM", "MP3"]);
        assert!(doc.render().starts_with("#TITLE:Take On Me\n#ARTIST:A-HA\n#BPM:169,2\n#MP3:"));
    }

    #[test]
    fn test_no_tags() {
        let doc = TagDocument::parse(": 0 1 2 la\n").unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.tail_start(), 0);
        assert_eq!(doc.render(), ": 0 1 2 la\n");
    }
}
