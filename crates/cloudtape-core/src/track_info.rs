//! Tag extraction from conventional download file names.
//!
//! Two naming schemes are recognised:
//!
//! - `Artist - Album - Track - 2001 [id].ext`
//! - `Title - 20240131 [id].ext`
//!
//! Anything else yields no tags; callers fall back to the file name.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::playlist::Track;

static FULL_PATTERN: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^\s*(.+?)\s*-\s*(.+?)\s*-\s*(.+?)\s*-\s*(\d{4})\s*\[[^\]]+\]\.[^.]+$").ok()
});

static SIMPLE_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(.+?)\s*-\s*(\d{8})\s*\[[^\]]+\]\.[^.]+$").ok());

static ID_TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s*\[[^\]]+\]").ok());

/// Tags recovered from a file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTrackInfo {
    /// Performing artist.
    pub artist: Option<String>,
    /// Album name.
    pub album: Option<String>,
    /// Track title.
    pub title: Option<String>,
    /// Four-digit release year.
    pub year: Option<String>,
    /// Upload date as `YYYYMMDD`.
    pub upload_date: Option<String>,
}

impl ParsedTrackInfo {
    /// Copy parsed tags into `track`, leaving fields it already has alone.
    pub fn apply_to(&self, track: &mut Track) {
        fill(&mut track.artist, self.artist.as_ref());
        fill(&mut track.album, self.album.as_ref());
        fill(&mut track.title, self.title.as_ref());
        fill(&mut track.year, self.year.as_ref());
        fill(&mut track.upload_date, self.upload_date.as_ref());
    }
}

fn fill(slot: &mut Option<String>, value: Option<&String>) {
    if slot.is_none() {
        *slot = value.cloned();
    }
}

/// Parse `name` against the known naming schemes.
#[must_use]
pub fn parse_track_name(name: &str) -> Option<ParsedTrackInfo> {
    if let Some(caps) = FULL_PATTERN.as_ref().and_then(|re| re.captures(name)) {
        return Some(ParsedTrackInfo {
            artist: Some(caps[1].trim().to_string()),
            album: Some(caps[2].trim().to_string()),
            title: Some(caps[3].trim().to_string()),
            year: Some(caps[4].to_string()),
            upload_date: None,
        });
    }

    SIMPLE_PATTERN
        .as_ref()
        .and_then(|re| re.captures(name))
        .map(|caps| ParsedTrackInfo {
            title: Some(caps[1].trim().to_string()),
            upload_date: Some(caps[2].to_string()),
            ..ParsedTrackInfo::default()
        })
}

/// `name` without bracketed id tags and without its extension.
#[must_use]
pub fn clean_track_name(name: &str) -> String {
    let stripped = ID_TAG
        .as_ref()
        .map_or_else(|| name.to_string(), |re| re.replace_all(name, "").into_owned());
    let stem = stripped
        .rsplit_once('.')
        .map_or(stripped.as_str(), |(stem, _)| stem);
    stem.trim().to_string()
}
