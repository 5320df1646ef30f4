//! Remote store boundary.
//!
//! The core never talks to a concrete cloud API. It consumes a [`RemoteStore`]
//! trait object that lists folders, resolves an item's name and parent, and
//! writes an item's bytes to a local path. Authentication happens before a
//! store is handed to the core.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Id used by remote stores for the top of the tree.
pub const ROOT_ID: &str = "root";

/// File extensions recognised as playable audio (lowercase, without dot).
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "mp4", "aac", "flac", "ogg", "oga", "opus", "wav", "wma",
];

/// An item listed by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Opaque remote identifier.
    pub id: String,
    /// Display name, including the extension for files.
    pub name: String,
    /// Whether the item is a folder.
    pub is_folder: bool,
    /// MIME type reported by the store, if any.
    pub mime_type: Option<String>,
}

impl RemoteFile {
    /// Create a plain file entry.
    pub fn file(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_folder: false,
            mime_type: None,
        }
    }

    /// Create a folder entry.
    pub fn folder(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_folder: true,
            mime_type: None,
        }
    }

    /// Set the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Whether this is a non-folder item with a supported audio extension.
    #[must_use]
    pub fn is_supported_audio(&self) -> bool {
        !self.is_folder && has_audio_extension(&self.name)
    }
}

/// Name and first parent of a remote item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMetadata {
    /// Display name.
    pub name: String,
    /// First parent id; `None` for items without parents.
    pub parent_id: Option<String>,
}

/// Check a file name against [`AUDIO_EXTENSIONS`], ignoring case.
#[must_use]
pub fn has_audio_extension(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Read-only access to a hierarchical remote file store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List the direct children of a folder; `None` lists the root.
    async fn list_children(&self, folder_id: Option<&str>) -> Result<Vec<RemoteFile>>;

    /// Fetch an item's display name and first parent.
    async fn metadata(&self, id: &str) -> Result<RemoteMetadata>;

    /// Write the item's bytes to `destination`, creating or truncating it.
    async fn fetch_content(&self, id: &str, destination: &Path) -> Result<()>;
}

#[cfg(test)]
pub mod fake {
    //! In-memory remote store for testing.

    use super::*;
    use crate::error::{Error, RemoteError};
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, RwLock};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct Node {
        name: String,
        parent: Option<String>,
        is_folder: bool,
        content: Vec<u8>,
    }

    /// In-memory remote store with call counters and failure injection.
    #[derive(Debug, Clone, Default)]
    pub struct FakeRemoteStore {
        nodes: Arc<RwLock<HashMap<String, Node>>>,
        children: Arc<RwLock<HashMap<Option<String>, Vec<String>>>>,
        failing: Arc<RwLock<HashSet<String>>>,
        truncating: Arc<RwLock<HashSet<String>>>,
        fetch_delay: Arc<RwLock<Option<Duration>>>,
        list_calls: Arc<AtomicUsize>,
        metadata_calls: Arc<AtomicUsize>,
        fetch_calls: Arc<AtomicUsize>,
    }

    impl FakeRemoteStore {
        /// Create an empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn insert(&self, id: &str, name: &str, parent: Option<&str>, is_folder: bool, content: &[u8]) {
            self.nodes.write().expect("lock poisoned").insert(
                id.to_string(),
                Node {
                    name: name.to_string(),
                    parent: parent.map(str::to_string),
                    is_folder,
                    content: content.to_vec(),
                },
            );
            let key = match parent {
                None | Some(ROOT_ID) => None,
                Some(p) => Some(p.to_string()),
            };
            self.children
                .write()
                .expect("lock poisoned")
                .entry(key)
                .or_default()
                .push(id.to_string());
        }

        /// Add a folder under `parent` (`None` or [`ROOT_ID`] for the root).
        pub fn add_folder(&self, id: &str, name: &str, parent: Option<&str>) {
            self.insert(id, name, parent, true, &[]);
        }

        /// Add a file with content under `parent`.
        pub fn add_file(&self, id: &str, name: &str, parent: Option<&str>, content: &[u8]) {
            self.insert(id, name, parent, false, content);
        }

        /// Make every request touching `id` fail.
        pub fn fail_on(&self, id: &str) {
            self.failing
                .write()
                .expect("lock poisoned")
                .insert(id.to_string());
        }

        /// Make fetches of `id` write half the content and then fail.
        pub fn truncate_on(&self, id: &str) {
            self.truncating
                .write()
                .expect("lock poisoned")
                .insert(id.to_string());
        }

        /// Delay every fetch by `delay`.
        pub fn set_fetch_delay(&self, delay: Duration) {
            *self.fetch_delay.write().expect("lock poisoned") = Some(delay);
        }

        /// Number of `list_children` calls so far.
        pub fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        /// Number of `metadata` calls so far.
        pub fn metadata_calls(&self) -> usize {
            self.metadata_calls.load(Ordering::SeqCst)
        }

        /// Number of `fetch_content` calls so far.
        pub fn fetch_calls(&self) -> usize {
            self.fetch_calls.load(Ordering::SeqCst)
        }

        fn check(&self, operation: &'static str, id: &str) -> Result<()> {
            if self.failing.read().expect("lock poisoned").contains(id) {
                return Err(Error::remote(operation, id, "injected failure"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteStore for FakeRemoteStore {
        async fn list_children(&self, folder_id: Option<&str>) -> Result<Vec<RemoteFile>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            self.check("list", folder_id.unwrap_or(ROOT_ID))?;
            let key = folder_id.filter(|id| *id != ROOT_ID).map(str::to_string);
            let ids = self
                .children
                .read()
                .expect("lock poisoned")
                .get(&key)
                .cloned()
                .unwrap_or_default();
            let nodes = self.nodes.read().expect("lock poisoned");
            Ok(ids
                .into_iter()
                .filter_map(|id| {
                    nodes.get(&id).map(|node| RemoteFile {
                        id: id.clone(),
                        name: node.name.clone(),
                        is_folder: node.is_folder,
                        mime_type: None,
                    })
                })
                .collect())
        }

        async fn metadata(&self, id: &str) -> Result<RemoteMetadata> {
            self.metadata_calls.fetch_add(1, Ordering::SeqCst);
            self.check("metadata", id)?;
            let nodes = self.nodes.read().expect("lock poisoned");
            let node = nodes.get(id).ok_or_else(|| {
                Error::Remote(RemoteError::NotFound { id: id.to_string() })
            })?;
            Ok(RemoteMetadata {
                name: node.name.clone(),
                parent_id: node.parent.clone(),
            })
        }

        async fn fetch_content(&self, id: &str, destination: &Path) -> Result<()> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.fetch_delay.read().expect("lock poisoned");
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.check("fetch", id)?;
            let content = self
                .nodes
                .read()
                .expect("lock poisoned")
                .get(id)
                .map(|node| node.content.clone())
                .ok_or_else(|| Error::Remote(RemoteError::NotFound { id: id.to_string() }))?;

            if self.truncating.read().expect("lock poisoned").contains(id) {
                let half = &content[..content.len() / 2];
                tokio::fs::write(destination, half)
                    .await
                    .map_err(|e| Error::remote("fetch", id, e))?;
                return Err(Error::remote("fetch", id, "connection dropped mid-transfer"));
            }

            tokio::fs::write(destination, &content)
                .await
                .map_err(|e| Error::remote("fetch", id, e))
        }
    }
}
