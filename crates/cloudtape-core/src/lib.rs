//! `Cloudtape` Core Library
//!
//! This crate provides the engine behind the `Cloudtape` player:
//! - Remote tree traversal and path resolution over a pluggable [`RemoteStore`]
//! - A content cache that downloads each remote item once, on demand
//! - XSPF playlist encoding, decoding and storage
//! - The playback state machine driving an external [`MediaEngine`]
//! - Application configuration and logging setup
//!
//! Presentation, sign-in and audio decoding live outside this crate. A
//! signed-in remote client is handed in as an `Arc<dyn RemoteStore>`, and the
//! audio output as an `Arc<dyn MediaEngine>`.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cloudtape_core::{
//!     CacheConfig, ContentCache, PlaybackConfig, PlaybackController, PlaylistBuilder,
//!     PlaylistLibrary, RemoteFile,
//! };
//!
//! let playlist = PlaylistBuilder::new(Arc::clone(&store))
//!     .build("Road trip", &[RemoteFile::folder(folder_id, "Road trip")])
//!     .await?;
//!
//! let library = PlaylistLibrary::new();
//! library.add(playlist);
//!
//! let cache = ContentCache::open(store, &CacheConfig::default()).await?;
//! let player = PlaybackController::new(library, cache, engine, PlaybackConfig::default());
//! player.select_playlist(0);
//! ```
//!
//! # Error Handling
//!
//! Every fallible operation returns [`Result`]. See the [`error`] module for
//! the error domains and the [`ErrorKind`] classification.

pub mod browser;
pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub mod local_store;
pub mod logging;
pub mod playback;
pub mod playlist;
pub mod remote;
pub mod resolver;
pub mod track_info;
pub mod walker;
pub mod xspf;

pub use browser::RemoteBrowser;
pub use builder::PlaylistBuilder;
pub use cache::{
    CacheConfig, CacheStats, ContentCache, DEFAULT_MAX_CONCURRENT_FETCHES,
    MAX_CONCURRENT_FETCHES, MIN_CONCURRENT_FETCHES, cache_file_name, default_cache_directory,
};
pub use config::{AppConfig, ConfigManager, default_playlists_directory, validate_storage_directory};
pub use error::{
    CacheError, Error, ErrorKind, FileSystemError, PlaybackError, PlaylistError, RemoteError,
    Result,
};
pub use local_store::LocalFolderStore;
pub use logging::{FileLogConfig, LogRotation, LoggingConfig, LoggingError, LoggingGuard};
pub use playback::{
    EndOfPlaylist, MediaEngine, PlaybackConfig, PlaybackController, PlaybackSnapshot,
    PlaybackStatus,
};
pub use playlist::{Playlist, PlaylistLibrary, Track};
pub use remote::{
    AUDIO_EXTENSIONS, ROOT_ID, RemoteFile, RemoteMetadata, RemoteStore, has_audio_extension,
};
pub use resolver::PathResolver;
pub use track_info::{ParsedTrackInfo, clean_track_name, parse_track_name};
pub use walker::TreeWalker;
pub use xspf::{
    XSPF_CONTENT_TYPE, XSPF_EXTENSION, XSPF_NAMESPACE, export_playlist, export_to_directory,
    import_directory, import_playlist, playlist_file_name,
};
