//! A [`RemoteStore`] backed by a directory on local disk.
//!
//! Item ids are `/`-separated paths relative to the store root, so
//! `Albums/Live/01.mp3` names `<root>/Albums/Live/01.mp3`. The root itself
//! is listed with `None` or an empty id. Hidden entries (names starting with
//! `.`) are not listed.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, RemoteError, Result};
use crate::remote::{RemoteFile, RemoteMetadata, RemoteStore};

/// Directory-backed remote store.
#[derive(Debug, Clone)]
pub struct LocalFolderStore {
    root: PathBuf,
}

impl LocalFolderStore {
    /// Serve the tree below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an id to a path below the root, rejecting ids that would escape it.
    fn resolve(&self, id: &str) -> Result<PathBuf> {
        let relative = Path::new(id);
        let escapes = id.starts_with('/')
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(Error::Remote(RemoteError::NotFound { id: id.to_string() }));
        }
        Ok(self.root.join(relative))
    }
}

fn child_id(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

#[async_trait]
impl RemoteStore for LocalFolderStore {
    async fn list_children(&self, folder_id: Option<&str>) -> Result<Vec<RemoteFile>> {
        let folder_id = folder_id.unwrap_or_default();
        let dir = self.resolve(folder_id)?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::remote("list", folder_id, e))?;

        let mut children = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::remote("list", folder_id, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::remote("list", folder_id, e))?;
            let id = child_id(folder_id, &name);
            children.push(if file_type.is_dir() {
                RemoteFile::folder(id, name)
            } else {
                RemoteFile::file(id, name)
            });
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(
            folder = folder_id,
            count = children.len(),
            "Listed local folder"
        );
        Ok(children)
    }

    async fn metadata(&self, id: &str) -> Result<RemoteMetadata> {
        let path = self.resolve(id)?;
        if id.is_empty() || tokio::fs::metadata(&path).await.is_err() {
            return Err(Error::Remote(RemoteError::NotFound { id: id.to_string() }));
        }

        let (parent_id, name) = match id.rsplit_once('/') {
            Some((parent, name)) => (Some(parent.to_string()), name.to_string()),
            None => (None, id.to_string()),
        };
        Ok(RemoteMetadata { name, parent_id })
    }

    async fn fetch_content(&self, id: &str, destination: &Path) -> Result<()> {
        let source = self.resolve(id)?;
        tokio::fs::copy(&source, destination)
            .await
            .map_err(|e| Error::remote("fetch", id, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, LocalFolderStore) {
        let temp = TempDir::new().expect("temp dir");
        let albums = temp.path().join("Albums").join("Live");
        std::fs::create_dir_all(&albums).expect("create dirs");
        std::fs::write(albums.join("01.mp3"), b"one").expect("write");
        std::fs::write(temp.path().join("b.ogg"), b"b").expect("write");
        std::fs::write(temp.path().join(".hidden"), b"h").expect("write");
        let store = LocalFolderStore::new(temp.path());
        (temp, store)
    }

    #[tokio::test]
    async fn test_list_root_and_nested() {
        let (_temp, store) = fixture();
        let root = store.list_children(None).await.expect("list root");
        assert_eq!(
            root,
            vec![RemoteFile::folder("Albums", "Albums"), RemoteFile::file("b.ogg", "b.ogg")]
        );

        let live = store
            .list_children(Some("Albums/Live"))
            .await
            .expect("list nested");
        assert_eq!(live, vec![RemoteFile::file("Albums/Live/01.mp3", "01.mp3")]);
    }

    #[tokio::test]
    async fn test_metadata_walks_up() {
        let (_temp, store) = fixture();
        let meta = store.metadata("Albums/Live/01.mp3").await.expect("metadata");
        assert_eq!(meta.name, "01.mp3");
        assert_eq!(meta.parent_id.as_deref(), Some("Albums/Live"));

        let top = store.metadata("Albums").await.expect("metadata");
        assert_eq!(top.parent_id, None);
    }

    #[tokio::test]
    async fn test_rejects_escaping_ids() {
        let (_temp, store) = fixture();
        for id in ["../etc", "/etc/passwd", "Albums/../../x", "./b.ogg"] {
            let err = store.metadata(id).await.expect_err(id);
            assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        }
    }

    #[tokio::test]
    async fn test_fetch_copies_content() {
        let (temp, store) = fixture();
        let dest = temp.path().join("copy.bin");
        store
            .fetch_content("Albums/Live/01.mp3", &dest)
            .await
            .expect("fetch");
        assert_eq!(std::fs::read(dest).expect("read"), b"one");
    }

    #[tokio::test]
    async fn test_fetch_missing_is_remote_error() {
        let (temp, store) = fixture();
        let err = store
            .fetch_content("missing.mp3", &temp.path().join("x"))
            .await
            .expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
    }
}
