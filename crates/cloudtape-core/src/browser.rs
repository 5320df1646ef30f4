//! Folder navigation and selection over a remote store.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::remote::{RemoteFile, RemoteStore};

/// Folder-stack browser with a multi-item selection.
///
/// The browser starts at the store root. Entering or leaving a folder
/// clears the selection and reloads the listing.
pub struct RemoteBrowser {
    store: Arc<dyn RemoteStore>,
    folder_stack: Vec<RemoteFile>,
    items: Vec<RemoteFile>,
    selected: Vec<RemoteFile>,
    error: Option<String>,
}

impl RemoteBrowser {
    /// Create a browser positioned at the root. Call [`Self::load`] to list it.
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            folder_stack: Vec::new(),
            items: Vec::new(),
            selected: Vec::new(),
            error: None,
        }
    }

    /// Id of the folder being shown; `None` at the root.
    #[must_use]
    pub fn current_folder_id(&self) -> Option<&str> {
        self.folder_stack.last().map(|f| f.id.as_str())
    }

    /// Reload the current folder.
    ///
    /// Only folders and supported audio files are kept, folders first, each
    /// group sorted by name ignoring case. A listing failure leaves the item
    /// list empty and records the message in [`Self::error`].
    pub async fn load(&mut self) {
        self.error = None;
        let folder_id = self.current_folder_id().map(str::to_string);

        match self.store.list_children(folder_id.as_deref()).await {
            Ok(children) => {
                let mut items: Vec<_> = children
                    .into_iter()
                    .filter(|c| c.is_folder || c.is_supported_audio())
                    .collect();
                items.sort_by_cached_key(|c| (!c.is_folder, c.name.to_lowercase()));
                debug!(
                    folder = folder_id.as_deref().unwrap_or("root"),
                    items = items.len(),
                    "Loaded folder"
                );
                self.items = items;
            }
            Err(e) => {
                warn!("Failed to list folder: {}", e);
                self.items.clear();
                self.error = Some(e.to_string());
            }
        }
    }

    /// Enter `folder`. Non-folders are ignored.
    pub async fn navigate_into(&mut self, folder: &RemoteFile) {
        if !folder.is_folder {
            return;
        }
        self.folder_stack.push(folder.clone());
        self.selected.clear();
        self.load().await;
    }

    /// Return to the parent folder. Returns `false` when already at the root.
    pub async fn navigate_up(&mut self) -> bool {
        if self.folder_stack.pop().is_none() {
            return false;
        }
        self.selected.clear();
        self.load().await;
        true
    }

    /// Add `item` to the selection, or remove it if already selected.
    pub fn toggle_selection(&mut self, item: &RemoteFile) {
        if let Some(pos) = self.selected.iter().position(|s| s.id == item.id) {
            self.selected.remove(pos);
        } else {
            self.selected.push(item.clone());
        }
    }

    /// Deselect everything.
    pub fn clear_selection(&mut self) {
        self.selected.clear();
    }

    /// Whether `item` is selected.
    #[must_use]
    pub fn is_selected(&self, item: &RemoteFile) -> bool {
        self.selected.iter().any(|s| s.id == item.id)
    }

    /// Items in the current folder.
    #[must_use]
    pub fn items(&self) -> &[RemoteFile] {
        &self.items
    }

    /// Selected items, in the order they were selected.
    #[must_use]
    pub fn selected(&self) -> &[RemoteFile] {
        &self.selected
    }

    /// Names of the folders from the root to the current folder.
    #[must_use]
    pub fn breadcrumb(&self) -> Vec<&str> {
        self.folder_stack.iter().map(|f| f.name.as_str()).collect()
    }

    /// Message of the last listing failure, if the current listing failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
