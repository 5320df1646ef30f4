//! Human-readable paths for remote items.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, RemoteError, Result};
use crate::remote::{ROOT_ID, RemoteStore};

/// Builds `/`-separated paths by walking an item's parent chain.
#[derive(Clone)]
pub struct PathResolver {
    store: Arc<dyn RemoteStore>,
}

impl PathResolver {
    /// Create a resolver over the given store.
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Resolve the path of `id` relative to the store root.
    ///
    /// The chain is followed through each item's first parent until the root
    /// sentinel or an item without parents. An item without parents resolves
    /// to its own name.
    ///
    /// # Errors
    ///
    /// Fails as a whole if any metadata lookup fails or the chain loops; no
    /// partial path is returned.
    pub async fn resolve_relative_path(&self, id: &str) -> Result<String> {
        let mut parts = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(id.to_string());

        while let Some(current_id) = current.take() {
            if current_id == ROOT_ID {
                break;
            }
            if !visited.insert(current_id.clone()) {
                return Err(Error::Remote(RemoteError::ParentCycle { id: id.to_string() }));
            }

            let metadata = self.store.metadata(&current_id).await.map_err(|e| match e {
                Error::Remote(_) => e,
                other => Error::remote("metadata", current_id.as_str(), other),
            })?;
            parts.push(metadata.name);
            current = metadata.parent_id;
        }

        parts.reverse();
        let path = parts.join("/");
        debug!(id, path = %path, "Resolved relative path");
        Ok(path)
    }
}
