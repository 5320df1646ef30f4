//! Playback navigation.
//!
//! [`PlaybackController`] owns the current playlist and track indices over a
//! [`PlaylistLibrary`] and drives an external [`MediaEngine`]. Every change
//! publishes a [`PlaybackSnapshot`] that observers read through
//! [`PlaybackController::subscribe`].
//!
//! Selecting a track starts a background load: the track's content is
//! materialized through the [`ContentCache`] and, once local, handed to the
//! engine with `load` followed by `play`. A newer selection supersedes an
//! older load, which is aborted and never reaches the engine.
//!
//! Commands spawn Tokio tasks and must be issued from within a Tokio runtime.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::ContentCache;
use crate::error::{Error, PlaybackError, Result};
use crate::playlist::{Playlist, PlaylistLibrary, Track};

/// The audio output the controller drives.
///
/// Implementations report end-of-track and play-state changes back through
/// [`PlaybackController::on_track_ended`] and
/// [`PlaybackController::on_play_state_changed`]. The controller never holds
/// its state lock while calling into the engine, so those callbacks may be
/// invoked synchronously from inside these methods. Commands are issued one
/// at a time; an engine must not call
/// [`PlaybackController::toggle_play_pause`] from inside a command.
#[cfg_attr(test, mockall::automock)]
pub trait MediaEngine: Send + Sync {
    /// Replace the current media with the file at `path`.
    fn load(&self, path: &Path) -> Result<()>;

    /// Start or resume playback.
    fn play(&self) -> Result<()>;

    /// Pause playback.
    fn pause(&self) -> Result<()>;

    /// Whether the engine is currently playing.
    fn is_playing(&self) -> bool;

    /// Whether media is loaded.
    fn has_media(&self) -> bool;
}

/// What happens when the last track of a playlist ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfPlaylist {
    /// Continue with the first track.
    #[default]
    Loop,
    /// Stay on the last track and stop.
    Stop,
}

/// Playback configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Behaviour at the end of a playlist.
    #[serde(default)]
    pub end_of_playlist: EndOfPlaylist,
}

/// Coarse playback status derived from the controller state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// No current track.
    #[default]
    Idle,
    /// A track is selected but not playing.
    Ready,
    /// The current track's content is being materialized.
    Loading,
    /// The engine is playing.
    Playing,
}

/// Immutable view of the controller state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    /// Index of the current playlist in the library.
    pub playlist_index: usize,
    /// Index of the current track in the current playlist.
    pub track_index: usize,
    /// Whether the engine is playing.
    pub is_playing: bool,
    /// Derived status.
    pub status: PlaybackStatus,
    /// The track at the current indices, if any.
    pub current_track: Option<Track>,
    /// Local file last handed to the engine.
    pub loaded_path: Option<PathBuf>,
    /// Message of the last failed load or engine command.
    pub last_error: Option<String>,
}

#[derive(Default)]
struct PlaybackState {
    playlist_index: usize,
    track_index: usize,
    is_playing: bool,
    loading: bool,
    target: Option<Track>,
    loaded_path: Option<PathBuf>,
    last_error: Option<String>,
    generation: u64,
    load_task: Option<JoinHandle<()>>,
}

impl PlaybackState {
    fn current_track(&self, playlists: &[Playlist]) -> Option<Track> {
        playlists
            .get(self.playlist_index)
            .and_then(|p| p.tracks.get(self.track_index))
            .cloned()
    }

    /// Pull both indices back inside `playlists` and return the current
    /// playlist's length, or `None` when it has no tracks.
    fn clamp_indices(&mut self, playlists: &[Playlist]) -> Option<usize> {
        self.playlist_index = self.playlist_index.min(playlists.len().saturating_sub(1));
        let len = playlists.get(self.playlist_index).map_or(0, Playlist::len);
        self.track_index = self.track_index.min(len.saturating_sub(1));
        (len > 0).then_some(len)
    }

    fn snapshot(&self, playlists: &[Playlist]) -> PlaybackSnapshot {
        let current_track = self.current_track(playlists);
        let status = if current_track.is_none() {
            PlaybackStatus::Idle
        } else if self.loading {
            PlaybackStatus::Loading
        } else if self.is_playing {
            PlaybackStatus::Playing
        } else {
            PlaybackStatus::Ready
        };
        PlaybackSnapshot {
            playlist_index: self.playlist_index,
            track_index: self.track_index,
            is_playing: self.is_playing,
            status,
            current_track,
            loaded_path: self.loaded_path.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Clamp a possibly negative index into `0..len`; `0` for empty collections.
fn clamp_index(index: isize, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    usize::try_from(index).unwrap_or(0).min(len - 1)
}

struct Inner {
    library: PlaylistLibrary,
    cache: ContentCache,
    engine: Arc<dyn MediaEngine>,
    config: PlaybackConfig,
    state: Mutex<PlaybackState>,
    /// Held for every engine command; taken before the state lock.
    engine_commands: Mutex<()>,
    snapshots: watch::Sender<PlaybackSnapshot>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, PlaybackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &PlaybackState, playlists: &[Playlist]) {
        self.snapshots.send_replace(state.snapshot(playlists));
    }

    fn lock_engine(&self) -> MutexGuard<'_, ()> {
        self.engine_commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock_state().generation == generation
    }

    /// Load and play `materialized` unless `generation` has been superseded.
    ///
    /// Returns `None` for a superseded load. The generation is checked with
    /// the engine lock held, so a stale load cannot reach the engine after a
    /// newer one.
    fn start_engine(
        &self,
        generation: u64,
        materialized: Result<PathBuf>,
    ) -> Option<Result<PathBuf>> {
        let _engine = self.lock_engine();
        if !self.is_current(generation) {
            return None;
        }
        Some(materialized.and_then(|path| {
            self.engine.load(&path)?;
            self.engine.play()?;
            Ok(path)
        }))
    }

    async fn load_track(&self, generation: u64, track: Track) {
        let materialized = self.cache.materialize(&track.id).await;
        let Some(outcome) = self.start_engine(generation, materialized) else {
            debug!(id = %track.id, "Discarding superseded load");
            return;
        };

        let playlists = self.library.snapshot();
        let mut state = self.lock_state();
        if state.generation != generation {
            return;
        }
        state.loading = false;
        state.load_task = None;
        match outcome {
            Ok(path) => {
                info!("Playing '{}' from {}", track.display_name(), path.display());
                state.loaded_path = Some(path);
                state.is_playing = true;
            }
            Err(e) => {
                warn!("Failed to load '{}': {}", track.display_name(), e);
                state.last_error = Some(e.to_string());
            }
        }
        self.publish(&state, &playlists);
    }
}

/// State machine over the playlist library and the media engine.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct PlaybackController {
    inner: Arc<Inner>,
}

impl PlaybackController {
    /// Create a controller positioned at the first track of the first
    /// playlist. Nothing is loaded until a command is issued.
    pub fn new(
        library: PlaylistLibrary,
        cache: ContentCache,
        engine: Arc<dyn MediaEngine>,
        config: PlaybackConfig,
    ) -> Self {
        let state = PlaybackState::default();
        let (snapshots, _) = watch::channel(state.snapshot(&library.snapshot()));
        Self {
            inner: Arc::new(Inner {
                library,
                cache,
                engine,
                config,
                state: Mutex::new(state),
                engine_commands: Mutex::new(()),
                snapshots,
            }),
        }
    }

    /// The library this controller plays from.
    #[must_use]
    pub fn library(&self) -> &PlaylistLibrary {
        &self.inner.library
    }

    /// Current state.
    #[must_use]
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Receive a new snapshot after every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Track at explicit indices.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::IndexOutOfRange`] if either index is outside
    /// its collection.
    pub fn track(&self, playlist_index: usize, track_index: usize) -> Result<Track> {
        let playlists = self.inner.library.snapshot();
        let playlist = playlists.get(playlist_index).ok_or(Error::Playback(
            PlaybackError::IndexOutOfRange {
                index: playlist_index,
                len: playlists.len(),
            },
        ))?;
        playlist
            .tracks
            .get(track_index)
            .cloned()
            .ok_or(Error::Playback(PlaybackError::IndexOutOfRange {
                index: track_index,
                len: playlist.len(),
            }))
    }

    /// Start loading the track at the current indices, superseding any load
    /// in flight. With no current track the controller becomes idle.
    fn reload(&self, state: &mut PlaybackState, playlists: &[Playlist]) {
        state.generation = state.generation.wrapping_add(1);
        if let Some(task) = state.load_task.take() {
            task.abort();
        }
        state.target = state.current_track(playlists);
        state.last_error = None;

        let Some(track) = state.target.clone() else {
            state.loading = false;
            return;
        };

        debug!(
            playlist = state.playlist_index,
            track = state.track_index,
            id = %track.id,
            "Loading track"
        );
        state.loading = true;
        let generation = state.generation;
        let inner = Arc::clone(&self.inner);
        state.load_task = Some(tokio::spawn(async move {
            inner.load_track(generation, track).await;
        }));
    }

    /// Apply `f` to the state under the lock, then publish.
    fn transition(&self, f: impl FnOnce(&Self, &mut PlaybackState, &[Playlist])) {
        let playlists = self.inner.library.snapshot();
        let mut state = self.inner.lock_state();
        f(self, &mut state, &playlists);
        self.inner.publish(&state, &playlists);
    }

    /// Select a playlist by index, clamped into range, and load its first
    /// track.
    pub fn select_playlist(&self, index: isize) {
        self.transition(|this, state, playlists| {
            state.playlist_index = clamp_index(index, playlists.len());
            state.track_index = 0;
            info!("Selected playlist {}", state.playlist_index);
            this.reload(state, playlists);
        });
    }

    /// Select a track of the current playlist by index, clamped into range.
    pub fn select_track(&self, index: isize) {
        self.transition(|this, state, playlists| {
            state.clamp_indices(playlists);
            let Some(playlist) = playlists.get(state.playlist_index) else {
                return;
            };
            state.track_index = clamp_index(index, playlist.len());
            this.reload(state, playlists);
        });
    }

    /// Go to the previous track, wrapping to the last one.
    pub fn prev_track(&self) {
        self.transition(|this, state, playlists| {
            let Some(len) = state.clamp_indices(playlists) else {
                return;
            };
            state.track_index = if state.track_index > 0 {
                state.track_index - 1
            } else {
                len - 1
            };
            this.reload(state, playlists);
        });
    }

    /// Go to the next track, wrapping to the first one.
    pub fn next_track(&self) {
        self.transition(|this, state, playlists| {
            let Some(len) = state.clamp_indices(playlists) else {
                return;
            };
            state.track_index = if state.track_index + 1 < len {
                state.track_index + 1
            } else {
                0
            };
            this.reload(state, playlists);
        });
    }

    /// Pause or resume. With nothing loaded in the engine, load the current
    /// track instead.
    pub fn toggle_play_pause(&self) {
        let toggled = {
            let _engine = self.inner.lock_engine();
            let engine = &self.inner.engine;
            if engine.has_media() {
                let was_playing = engine.is_playing();
                let result = if was_playing {
                    engine.pause()
                } else {
                    engine.play()
                };
                Some(result.map(|()| !was_playing))
            } else {
                None
            }
        };

        let Some(result) = toggled else {
            self.transition(|this, state, playlists| this.reload(state, playlists));
            return;
        };
        self.transition(|_, state, _| match result {
            Ok(is_playing) => state.is_playing = is_playing,
            Err(e) => {
                warn!("Media engine command failed: {}", e);
                state.last_error = Some(e.to_string());
            }
        });
    }

    /// Engine notification: the current track finished.
    pub fn on_track_ended(&self) {
        let end_of_playlist = self.inner.config.end_of_playlist;
        self.transition(|this, state, playlists| {
            let Some(len) = state.clamp_indices(playlists) else {
                state.is_playing = false;
                return;
            };
            if state.track_index + 1 < len {
                state.track_index += 1;
            } else if end_of_playlist == EndOfPlaylist::Loop {
                state.track_index = 0;
            } else {
                debug!("Reached end of playlist");
                state.is_playing = false;
                return;
            }
            this.reload(state, playlists);
        });
    }

    /// Engine notification: playback started or stopped.
    pub fn on_play_state_changed(&self, is_playing: bool) {
        self.transition(|_, state, _| state.is_playing = is_playing);
    }

    /// Re-clamp the indices after the library changed, reloading if the
    /// current track is no longer the one last selected.
    pub fn on_library_changed(&self) {
        self.transition(|this, state, playlists| {
            state.clamp_indices(playlists);

            if state.current_track(playlists) != state.target {
                debug!("Current track changed with the library");
                this.reload(state, playlists);
            }
        });
    }

    /// Call [`Self::on_library_changed`] whenever the library changes.
    ///
    /// The returned task runs until aborted.
    #[must_use]
    pub fn watch_library(&self) -> JoinHandle<()> {
        let controller = self.clone();
        let mut changes = self.inner.library.subscribe();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                controller.on_library_changed();
            }
        })
    }

    /// Wait for the load in flight, if any, to finish.
    pub async fn settle(&self) {
        loop {
            let task = self.inner.lock_state().load_task.take();
            match task {
                // An aborted load reports a cancellation, which is expected.
                Some(task) => drop(task.await),
                None => break,
            }
        }
    }
}
