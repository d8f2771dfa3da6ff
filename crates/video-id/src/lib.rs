//! Video URL validation and identifier extraction
//!
//! Turns a submitted video URL into the short identifier used as the cache
//! key and filename stem. Two URL forms are recognized:
//!
//! - short host: `https://youtu.be/<id>`
//! - long host with a query parameter: `https://www.youtube.com/watch?v=<id>`
//!
//! Everything here is pure string/URL parsing; nothing touches the network.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

/// Hosts whose `v` query parameter carries the video identifier
pub const LONG_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
];

static URL_SHAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^(http|https)://[^ "]+$"#).unwrap());

static SHORT_FORM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https://youtu\.be/([a-zA-Z0-9_-]+)$").unwrap());

static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());

/// A video identifier.
///
/// Only ever holds `[A-Za-z0-9_-]+`, so it is always safe to use as a
/// filename stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    /// Wrap a raw identifier, rejecting anything outside the URL-safe charset
    pub fn new(raw: &str) -> Option<Self> {
        ID_RE.is_match(raw).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check the coarse URL shape: an http(s) scheme and no spaces or quotes
pub fn is_valid_url(input: &str) -> bool {
    URL_SHAPE_RE.is_match(input)
}

/// Extract the video identifier from a URL.
///
/// Returns `None` when neither the short-host nor the long-host form
/// matches, or when the URL cannot be parsed.
pub fn extract(input: &str) -> Option<VideoId> {
    if let Some(caps) = SHORT_FORM_RE.captures(input) {
        return VideoId::new(&caps[1]);
    }

    let parsed = Url::parse(input).ok()?;
    let host = parsed.host_str()?;
    if !LONG_HOSTS.contains(&host) {
        return None;
    }

    parsed
        .query_pairs()
        .find(|(key, _)| key == "v")
        .and_then(|(_, value)| VideoId::new(&value))
}
