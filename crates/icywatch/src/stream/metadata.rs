//! Stream metadata types and ICY parsing
//!
//! Pure data types and parsing functions for ICY (Icecast/Shoutcast) metadata
//! segments: `StreamTitle='Artist - Song';StreamUrl='...';` padded with NULs
//! to a multiple of 16 bytes.

use std::collections::BTreeMap;

use serde::Serialize;

/// Key carrying the "now playing" string
pub const STREAM_TITLE: &str = "StreamTitle";

/// Key carrying the station or track URL
pub const STREAM_URL: &str = "StreamUrl";

/// One decoded ICY metadata segment: unique keys mapped to their values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MetadataBlock {
    entries: BTreeMap<String, String>,
}

impl MetadataBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pair. A repeated key keeps its latest value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn stream_title(&self) -> Option<&str> {
        self.get(STREAM_TITLE)
    }

    pub fn stream_url(&self) -> Option<&str> {
        self.get(STREAM_URL).filter(|u| !u.is_empty())
    }

    /// Artist/title split of `StreamTitle`, if present.
    pub fn now_playing(&self) -> Option<StreamMetadata> {
        self.stream_title().map(StreamMetadata::from_icy_title)
    }

    /// True if any key of `self` has a value different from `previous`,
    /// counting keys `previous` lacks. Keys only `previous` has are ignored.
    pub fn differs_from(&self, previous: &MetadataBlock) -> bool {
        self.entries
            .iter()
            .any(|(key, value)| previous.entries.get(key) != Some(value))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MetadataBlock {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut block = MetadataBlock::new();
        for (k, v) in iter {
            block.insert(k, v);
        }
        block
    }
}

/// Parsed "now playing" with artist/title split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
}

impl StreamMetadata {
    /// Create metadata from an ICY title string.
    ///
    /// Splits on first ` - ` separator: "Artist - Title" → artist="Artist", title="Title".
    /// If no separator found, the whole string becomes the title.
    pub fn from_icy_title(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self {
                title: None,
                artist: None,
            };
        }

        match raw.split_once(" - ") {
            Some((artist, title)) => {
                let (artist, title) = (artist.trim(), title.trim());
                Self {
                    title: (!title.is_empty()).then(|| title.to_string()),
                    artist: (!artist.is_empty()).then(|| artist.to_string()),
                }
            }
            None => Self {
                title: Some(raw.to_string()),
                artist: None,
            },
        }
    }
}

/// Decode a complete raw metadata segment (with NUL padding) into a block.
///
/// Text is taken as UTF-8 when valid, otherwise as Latin-1, which is what most
/// Shoutcast servers actually send.
pub fn decode_metadata_segment(raw_block: &[u8]) -> MetadataBlock {
    // Strip NUL padding from the end
    let end = raw_block
        .iter()
        .rposition(|&b| b != 0)
        .map(|p| p + 1)
        .unwrap_or(0);
    let raw = &raw_block[..end];

    let text = match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => raw.iter().map(|&b| b as char).collect(),
    };
    parse_icy_metadata(text.trim_end())
}

/// Parse `key='value';key='value';...` text.
///
/// A pair with no `=` before its terminating `;` is skipped, as is a quoted
/// value that never closes. Inside a quoted value, `\'` and `\\` are escapes,
/// and a bare `'` not followed by `;` or end of text is kept literally
/// (`StreamTitle='It's Alright';`).
pub fn parse_icy_metadata(text: &str) -> MetadataBlock {
    let mut block = MetadataBlock::new();
    let mut rest = text;

    while !rest.is_empty() {
        let eq = rest.find('=');
        let semi = rest.find(';');

        let eq = match (eq, semi) {
            (Some(eq), Some(semi)) if eq < semi => eq,
            (Some(eq), None) => eq,
            (_, Some(semi)) => {
                rest = &rest[semi + 1..];
                continue;
            }
            (None, None) => break,
        };

        let key = rest[..eq].trim();
        let after = &rest[eq + 1..];

        let parsed = match after.strip_prefix('\'') {
            Some(quoted) => parse_quoted(quoted),
            None => {
                let end = after.find(';').unwrap_or(after.len());
                let remaining = after.get(end + 1..).unwrap_or("");
                Some((after[..end].trim().to_string(), remaining))
            }
        };

        match parsed {
            Some((value, remaining)) => {
                if !key.is_empty() {
                    block.insert(key, value);
                }
                rest = remaining;
            }
            None => break,
        }
    }

    block
}

/// Read a single-quoted value (opening quote already consumed). Returns the
/// unescaped value and the text after the closing `';`.
fn parse_quoted(s: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut chars = s.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&(_, next @ ('\'' | '\\'))) => {
                    value.push(next);
                    chars.next();
                }
                _ => value.push('\\'),
            },
            '\'' => {
                let after = &s[i + 1..];
                if after.trim().is_empty() {
                    return Some((value, ""));
                }
                if let Some(remaining) = after.strip_prefix(';') {
                    return Some((value, remaining));
                }
                value.push('\'');
            }
            _ => value.push(c),
        }
    }

    None
}
