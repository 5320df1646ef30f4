//! Breadth-first traversal of remote folders.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::remote::{RemoteFile, RemoteStore};

/// Collects supported audio leaves below a remote folder.
#[derive(Clone)]
pub struct TreeWalker {
    store: Arc<dyn RemoteStore>,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl TreeWalker {
    /// Create a walker over the given store.
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            cancel_flag: None,
        }
    }

    /// Abort the walk with [`Error::Cancelled`] once `flag` is raised.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// List every supported audio file below `folder_id`, at any depth.
    ///
    /// Folders are expanded in FIFO order; within a folder, children keep the
    /// order the store returned them in. Folders never appear in the output.
    /// A folder reachable through more than one path is expanded once.
    ///
    /// # Errors
    ///
    /// Any listing failure aborts the walk; no partial result is returned.
    pub async fn list_audio_recursively(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        let mut result = Vec::new();
        let mut queue = VecDeque::from([folder_id.to_string()]);
        let mut visited = HashSet::from([folder_id.to_string()]);
        let mut folders_listed = 0usize;

        while let Some(id) = queue.pop_front() {
            if self.is_cancelled() {
                return Err(Error::cancelled("tree walk"));
            }

            let children = self.store.list_children(Some(id.as_str())).await?;
            folders_listed += 1;

            for child in children {
                if child.is_folder {
                    if visited.insert(child.id.clone()) {
                        queue.push_back(child.id);
                    } else {
                        debug!(folder = %child.id, "Skipping already visited folder");
                    }
                } else if child.is_supported_audio() {
                    result.push(child);
                }
            }
        }

        info!(
            root = folder_id,
            folders = folders_listed,
            tracks = result.len(),
            "Finished remote tree walk"
        );
        Ok(result)
    }
}
