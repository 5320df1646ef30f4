//! Playlist model and the in-process playlist library.
//!
//! A [`Playlist`] is a plain value: it is built from a remote selection,
//! written to disk as XSPF and later read back as a fresh value. The
//! [`PlaylistLibrary`] holds the playlists the player can choose from and
//! publishes every change to subscribers.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{Error, PlaylistError, Result};

/// A single playlist entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Remote id of the content; empty when unknown.
    #[serde(default)]
    pub id: String,
    /// Relative path of the item in the remote tree.
    pub location: String,
    /// Duration in milliseconds.
    #[serde(default)]
    pub duration: Option<i64>,
    /// Bitrate in kbit/s.
    #[serde(default)]
    pub bitrate: Option<i32>,
    /// Performing artist.
    #[serde(default)]
    pub artist: Option<String>,
    /// Album name.
    #[serde(default)]
    pub album: Option<String>,
    /// Track title.
    #[serde(default)]
    pub title: Option<String>,
    /// Release year.
    #[serde(default)]
    pub year: Option<String>,
    /// Upload date as `YYYYMMDD`.
    #[serde(default)]
    pub upload_date: Option<String>,
}

impl Track {
    /// Create a track with only a location.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Set the remote id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the duration in milliseconds.
    #[must_use]
    pub const fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration = Some(duration_ms);
        self
    }

    /// Set the bitrate in kbit/s.
    #[must_use]
    pub const fn with_bitrate(mut self, bitrate: i32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// Name to show for this track: its title, else the last path segment.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or_else(|| {
            self.location
                .rsplit('/')
                .next()
                .unwrap_or(self.location.as_str())
        })
    }
}

/// An ordered list of tracks with a title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    /// Playlist title.
    pub title: String,
    /// Tracks in play order. The same id may appear more than once.
    pub tracks: Vec<Track>,
}

impl Playlist {
    /// Create a playlist.
    pub fn new(title: impl Into<String>, tracks: Vec<Track>) -> Self {
        Self {
            title: title.into(),
            tracks,
        }
    }

    /// Number of tracks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the playlist has no tracks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Total duration of tracks that declare one, in milliseconds.
    #[must_use]
    pub fn total_duration_ms(&self) -> i64 {
        self.tracks
            .iter()
            .filter_map(|t| t.duration)
            .fold(0, i64::saturating_add)
    }
}

/// Shared, observable list of playlists.
///
/// Cloning yields another handle to the same library. Every mutation
/// publishes a fresh immutable snapshot; readers never see a list change
/// under them.
#[derive(Debug, Clone)]
pub struct PlaylistLibrary {
    sender: Arc<watch::Sender<Arc<Vec<Playlist>>>>,
}

impl Default for PlaylistLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaylistLibrary {
    /// Create an empty library.
    #[must_use]
    pub fn new() -> Self {
        Self::with_playlists(Vec::new())
    }

    /// Create a library holding `playlists`.
    #[must_use]
    pub fn with_playlists(playlists: Vec<Playlist>) -> Self {
        let (sender, _) = watch::channel(Arc::new(playlists));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Current playlists.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Playlist>> {
        Arc::clone(&self.sender.borrow())
    }

    /// Receive a new snapshot after every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Playlist>>> {
        self.sender.subscribe()
    }

    /// Number of playlists.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.borrow().len()
    }

    /// Whether the library is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sender.borrow().is_empty()
    }

    /// Playlist at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Playlist> {
        self.sender.borrow().get(index).cloned()
    }

    /// Append a playlist and return its index.
    pub fn add(&self, playlist: Playlist) -> usize {
        info!(
            "Adding playlist '{}' ({} tracks) to library",
            playlist.title,
            playlist.len()
        );
        let mut index = 0;
        self.update(|list| {
            list.push(playlist);
            index = list.len() - 1;
        });
        index
    }

    /// Remove and return the playlist at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`PlaylistError::NotFound`] if `index` is out of range.
    pub fn remove(&self, index: usize) -> Result<Playlist> {
        self.check_index(index)?;
        let mut removed = None;
        self.update(|list| removed = Some(list.remove(index)));
        let removed = removed.ok_or(Error::Playlist(PlaylistError::NotFound { index }))?;
        info!("Removed playlist '{}' from library", removed.title);
        Ok(removed)
    }

    /// Replace the playlist at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`PlaylistError::NotFound`] if `index` is out of range.
    pub fn replace(&self, index: usize, playlist: Playlist) -> Result<()> {
        self.check_index(index)?;
        debug!("Replacing playlist {} with '{}'", index, playlist.title);
        self.update(|list| list[index] = playlist);
        Ok(())
    }

    /// Remove every playlist.
    pub fn clear(&self) {
        self.update(Vec::clear);
    }

    /// Decode an XSPF file and append it to the library.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a playlist.
    pub async fn import_file(&self, path: &Path) -> Result<usize> {
        let playlist = crate::xspf::import_playlist(path).await?;
        Ok(self.add(playlist))
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.len() {
            Ok(())
        } else {
            Err(Error::Playlist(PlaylistError::NotFound { index }))
        }
    }

    fn update(&self, f: impl FnOnce(&mut Vec<Playlist>)) {
        self.sender.send_modify(|current| {
            let mut list = current.as_ref().clone();
            f(&mut list);
            *current = Arc::new(list);
        });
    }
}
