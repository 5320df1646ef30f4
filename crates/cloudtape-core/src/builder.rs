//! Turns a remote selection into a playlist.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::playlist::{Playlist, Track};
use crate::remote::{RemoteFile, RemoteStore};
use crate::resolver::PathResolver;
use crate::track_info::parse_track_name;
use crate::walker::TreeWalker;

/// Expands selected folders and resolves every leaf into a [`Track`].
#[derive(Clone)]
pub struct PlaylistBuilder {
    walker: TreeWalker,
    resolver: PathResolver,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl PlaylistBuilder {
    /// Create a builder over `store`.
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            walker: TreeWalker::new(Arc::clone(&store)),
            resolver: PathResolver::new(store),
            cancel_flag: None,
        }
    }

    /// Abort the build with [`Error::Cancelled`] once `flag` is raised.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.walker = self.walker.with_cancel_flag(Arc::clone(&flag));
        self.cancel_flag = Some(flag);
        self
    }

    fn check_cancelled(&self) -> Result<()> {
        if self
            .cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return Err(Error::cancelled("playlist build"));
        }
        Ok(())
    }

    /// Build a playlist titled `title` from `selection`.
    ///
    /// Folders contribute their audio files at any depth, in walk order.
    /// Files are kept as selected, even without an audio extension. Each
    /// track's location is the item's path from the store root and its tags
    /// come from the file name when it follows a known naming scheme.
    ///
    /// # Errors
    ///
    /// Any remote failure aborts the build; nothing partial is returned.
    pub async fn build(&self, title: &str, selection: &[RemoteFile]) -> Result<Playlist> {
        info!(
            "Building playlist '{}' from {} selected items",
            title,
            selection.len()
        );

        let mut leaves = Vec::new();
        for item in selection {
            self.check_cancelled()?;
            if item.is_folder {
                leaves.extend(self.walker.list_audio_recursively(&item.id).await?);
            } else {
                leaves.push(item.clone());
            }
        }

        let mut tracks = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            self.check_cancelled()?;
            let location = self.resolver.resolve_relative_path(&leaf.id).await?;
            let mut track = Track::new(location).with_id(leaf.id.as_str());
            if let Some(info) = parse_track_name(&leaf.name) {
                info.apply_to(&mut track);
            }
            debug!(id = %leaf.id, location = %track.location, "Added track");
            tracks.push(track);
        }

        info!("Built playlist '{}' with {} tracks", title, tracks.len());
        Ok(Playlist::new(title, tracks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::remote::ROOT_ID;
    use crate::remote::fake::FakeRemoteStore;

    fn library_store() -> FakeRemoteStore {
        let store = FakeRemoteStore::new();
        store.add_folder("music", "Music", Some(ROOT_ID));
        store.add_folder("jazz", "Jazz", Some("music"));
        store.add_file(
            "t1",
            "Miles Davis - Kind of Blue - So What - 1959 [a1].mp3",
            Some("jazz"),
            b"1",
        );
        store.add_file("t2", "cover.jpg", Some("jazz"), b"2");
        store.add_file("t3", "intro.ogg", Some("music"), b"3");
        store.add_file("t4", "readme.txt", Some(ROOT_ID), b"4");
        store
    }

    #[tokio::test]
    async fn test_build_expands_folders_and_keeps_files() {
        let store = library_store();
        let builder = PlaylistBuilder::new(Arc::new(store.clone()));
        let selection = [
            RemoteFile::folder("music", "Music"),
            RemoteFile::file("t4", "readme.txt"),
        ];

        let playlist = builder.build("Mine", &selection).await.expect("build");
        assert_eq!(playlist.title, "Mine");
        let locations: Vec<_> = playlist.tracks.iter().map(|t| t.location.as_str()).collect();
        assert_eq!(
            locations,
            vec![
                "Music/intro.ogg",
                "Music/Jazz/Miles Davis - Kind of Blue - So What - 1959 [a1].mp3",
                "readme.txt",
            ]
        );
        let ids: Vec<_> = playlist.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t3", "t1", "t4"]);
    }

    #[tokio::test]
    async fn test_build_fills_tags_from_file_names() {
        let store = library_store();
        let builder = PlaylistBuilder::new(Arc::new(store));
        let playlist = builder
            .build("Jazz", &[RemoteFile::folder("jazz", "Jazz")])
            .await
            .expect("build");

        let track = &playlist.tracks[0];
        assert_eq!(track.artist.as_deref(), Some("Miles Davis"));
        assert_eq!(track.title.as_deref(), Some("So What"));
        assert_eq!(track.year.as_deref(), Some("1959"));
    }

    #[tokio::test]
    async fn test_build_fails_on_remote_error() {
        let store = library_store();
        store.fail_on("jazz");
        let builder = PlaylistBuilder::new(Arc::new(store));
        let err = builder
            .build("Broken", &[RemoteFile::folder("music", "Music")])
            .await
            .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
    }

    #[tokio::test]
    async fn test_build_can_be_cancelled() {
        let store = library_store();
        let flag = Arc::new(AtomicBool::new(true));
        let builder = PlaylistBuilder::new(Arc::new(store.clone())).with_cancel_flag(flag);
        let err = builder
            .build("Cancelled", &[RemoteFile::file("t4", "readme.txt")])
            .await
            .expect_err("should be cancelled");
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(store.metadata_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_selection_builds_empty_playlist() {
        let builder = PlaylistBuilder::new(Arc::new(FakeRemoteStore::new()));
        let playlist = builder.build("Empty", &[]).await.expect("build");
        assert!(playlist.is_empty());
    }
}
