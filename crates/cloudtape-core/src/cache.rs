//! Local content cache for remote items.
//!
//! [`ContentCache::materialize`] turns a remote id into a path on local disk,
//! downloading the content on first access. Entries are never evicted by the
//! cache itself and never revalidated: remote content is treated as immutable
//! for the lifetime of the cache directory.
//!
//! Layout of the cache root:
//!
//! ```text
//! <root>/
//! ├── 1AbC_dEf-23            # id used verbatim as the file name
//! ├── 9f86d08...0f00a08.key  # sha256 of an id that is not filesystem-safe
//! └── .partial/              # staging files for in-progress downloads
//! ```
//!
//! Downloads are written to `.partial/` and renamed into place only once they
//! are complete, so a file at an entry's path is always a whole download.
//! Concurrent requests for the same id share a single download.
//!
//! # Example
//!
//! ```rust,ignore
//! use cloudtape_core::cache::{CacheConfig, ContentCache};
//!
//! let cache = ContentCache::open(store, &CacheConfig::default()).await?;
//! let path = cache.materialize("1AbC_dEf-23").await?;
//! engine.load(&path)?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::error::{CacheError, Error, Result, create_dir_error, read_error};
use crate::remote::RemoteStore;

/// Default number of downloads allowed to run at once.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 2;

/// Minimum allowed concurrent downloads.
pub const MIN_CONCURRENT_FETCHES: usize = 1;

/// Maximum allowed concurrent downloads.
pub const MAX_CONCURRENT_FETCHES: usize = 8;

/// Staging directory for downloads in progress.
const PARTIAL_DIR: &str = ".partial";

/// Suffix of file names derived by hashing the id.
const HASHED_SUFFIX: &str = ".key";

/// Longest id used verbatim as a file name.
const MAX_VERBATIM_KEY_LEN: usize = 128;

/// File names Windows refuses regardless of extension.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Content cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of downloads running at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_fetches: usize,

    /// Custom cache directory path (optional).
    /// If not set, uses default platform-specific location.
    #[serde(default)]
    pub custom_cache_dir: Option<PathBuf>,
}

const fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_FETCHES
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            custom_cache_dir: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, path: PathBuf) -> Self {
        self.custom_cache_dir = Some(path);
        self
    }

    /// Set the download concurrency limit.
    #[must_use]
    pub const fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max;
        self
    }

    /// Clamp `max_concurrent_fetches` into the supported range.
    pub fn validate(&mut self) {
        self.max_concurrent_fetches = self
            .max_concurrent_fetches
            .clamp(MIN_CONCURRENT_FETCHES, MAX_CONCURRENT_FETCHES);
    }

    /// The directory the cache will use.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.custom_cache_dir
            .clone()
            .unwrap_or_else(default_cache_directory)
    }
}

/// Statistics about the current cache contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of materialized entries.
    pub entries: usize,
    /// Total size of materialized entries in bytes.
    pub total_size_bytes: u64,
    /// Number of downloads currently in flight.
    pub in_flight: usize,
}

type SharedFetch = Shared<BoxFuture<'static, Result<PathBuf>>>;

struct CacheInner {
    root: PathBuf,
    partial_dir: PathBuf,
    store: Arc<dyn RemoteStore>,
    permits: Semaphore,
    in_flight: Mutex<HashMap<String, SharedFetch>>,
    staging_counter: AtomicU64,
}

/// Maps remote ids to fully downloaded local files.
///
/// Cloning is cheap; clones share the in-flight map and download permits.
#[derive(Clone)]
pub struct ContentCache {
    inner: Arc<CacheInner>,
}

impl ContentCache {
    /// Open (creating if needed) the cache described by `config`.
    ///
    /// Leftover staging files from an earlier process are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directories cannot be created.
    pub async fn open(store: Arc<dyn RemoteStore>, config: &CacheConfig) -> Result<Self> {
        let mut config = config.clone();
        config.validate();

        let root = config.cache_dir();
        let partial_dir = root.join(PARTIAL_DIR);
        for dir in [&root, &partial_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Cache(CacheError::InitializationFailed {
                    reason: create_dir_error(dir, &e).to_string(),
                })
            })?;
        }

        let purged = purge_directory(&partial_dir).await;
        if purged > 0 {
            warn!("Removed {} stale partial downloads", purged);
        }

        info!(
            "Content cache opened at {} (max {} concurrent fetches)",
            root.display(),
            config.max_concurrent_fetches
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                root,
                partial_dir,
                store,
                permits: Semaphore::new(config.max_concurrent_fetches),
                in_flight: Mutex::new(HashMap::new()),
                staging_counter: AtomicU64::new(0),
            }),
        })
    }

    /// Root directory of the cache.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Deterministic local path for `remote_id`, whether or not it is cached.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidKey`] for blank ids.
    pub fn entry_path(&self, remote_id: &str) -> Result<PathBuf> {
        Ok(self.inner.root.join(cache_file_name(remote_id)?))
    }

    /// Path of a complete cached entry, without fetching.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidKey`] for blank ids.
    pub async fn cached_path(&self, remote_id: &str) -> Result<Option<PathBuf>> {
        let path = self.entry_path(remote_id)?;
        Ok(is_complete_file(&path).await.then_some(path))
    }

    /// Whether a complete entry exists for `remote_id`.
    pub async fn contains(&self, remote_id: &str) -> bool {
        matches!(self.cached_path(remote_id).await, Ok(Some(_)))
    }

    /// Return the local path of `remote_id`, downloading it on a miss.
    ///
    /// Concurrent calls for the same id await one shared download. The
    /// download runs as its own task, so dropping the returned future does not
    /// interrupt it.
    ///
    /// # Errors
    ///
    /// - [`CacheError::InvalidKey`] for blank ids, before any file access
    /// - [`CacheError::Miss`] when the download fails or does not produce a
    ///   non-empty regular file; nothing is left at the entry's path
    pub async fn materialize(&self, remote_id: &str) -> Result<PathBuf> {
        let path = self.entry_path(remote_id)?;

        if is_complete_file(&path).await {
            debug!(id = remote_id, "Cache hit");
            return Ok(path);
        }

        let fetch = {
            let mut in_flight = self.inner.in_flight.lock().await;
            if let Some(existing) = in_flight.get(remote_id) {
                debug!(id = remote_id, "Joining in-flight download");
                existing.clone()
            } else {
                let fetch = self.spawn_fetch(remote_id.to_string(), path);
                in_flight.insert(remote_id.to_string(), fetch.clone());
                fetch
            }
        };

        fetch.await
    }

    /// Start the download task for `key` and wrap it for sharing.
    ///
    /// Must be called with the in-flight map locked; the task removes its own
    /// entry once finished.
    fn spawn_fetch(&self, key: String, path: PathBuf) -> SharedFetch {
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = inner.fetch_into_place(&task_key, &path).await;
            inner.in_flight.lock().await.remove(&task_key);
            result
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Err(Error::cache_miss(key, format!("download task failed: {e}"))))
        }
        .boxed()
        .shared()
    }

    /// Count entries and bytes currently in the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be read.
    pub async fn stats(&self) -> Result<CacheStats> {
        let root = &self.inner.root;
        let mut entries = tokio::fs::read_dir(root)
            .await
            .map_err(|e| read_error(root, &e))?;

        let mut stats = CacheStats::default();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| read_error(root, &e))?
        {
            if let Ok(meta) = entry.metadata().await
                && meta.is_file()
            {
                stats.entries += 1;
                stats.total_size_bytes += meta.len();
            }
        }
        stats.in_flight = self.inner.in_flight.lock().await.len();
        Ok(stats)
    }
}

impl CacheInner {
    async fn fetch_into_place(&self, key: &str, path: &Path) -> Result<PathBuf> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::cache_miss(key, e))?;

        // A download that finished between the caller's check and this task
        // acquiring a permit already produced the entry.
        if is_complete_file(path).await {
            return Ok(path.to_path_buf());
        }

        let staging = self.staging_path(path);
        info!(id = key, "Fetching remote content");

        if let Err(e) = self.store.fetch_content(key, &staging).await {
            remove_quietly(&staging).await;
            warn!(id = key, error = %e, "Remote fetch failed");
            return Err(Error::cache_miss(key, format!("fetch failed: {e}")));
        }

        if !is_complete_file(&staging).await {
            remove_quietly(&staging).await;
            warn!(id = key, "Fetch produced no usable file");
            return Err(Error::cache_miss(key, "fetch produced an empty or non-regular file"));
        }

        if let Err(e) = tokio::fs::rename(&staging, path).await {
            remove_quietly(&staging).await;
            warn!(id = key, error = %e, "Could not move download into place");
            return Err(Error::cache_miss(
                key,
                format!("cannot place download at {}: {e}", path.display()),
            ));
        }

        if is_complete_file(path).await {
            debug!(id = key, path = %path.display(), "Materialized");
            Ok(path.to_path_buf())
        } else {
            Err(Error::cache_miss(key, "cached path is not a regular file"))
        }
    }

    fn staging_path(&self, path: &Path) -> PathBuf {
        let n = self.staging_counter.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.partial_dir.join(format!("{name}.{n}.part"))
    }
}

/// File name used for `key` inside the cache root.
///
/// Ids made only of ASCII letters, digits, `_` and `-` (and not a reserved
/// device name) are used as-is. Anything else is replaced by the hex SHA-256
/// of the id plus a `.key` suffix; verbatim names never contain a dot, so the
/// two forms cannot collide.
///
/// # Errors
///
/// Returns [`CacheError::InvalidKey`] if `key` is blank.
pub fn cache_file_name(key: &str) -> Result<String> {
    if key.trim().is_empty() {
        return Err(Error::Cache(CacheError::InvalidKey {
            key: key.to_string(),
            reason: "key is blank".to_string(),
        }));
    }

    if is_verbatim_safe(key) {
        Ok(key.to_string())
    } else {
        Ok(format!("{:x}{HASHED_SUFFIX}", Sha256::digest(key.as_bytes())))
    }
}

fn is_verbatim_safe(key: &str) -> bool {
    key.len() <= MAX_VERBATIM_KEY_LEN
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        && !RESERVED_NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(key))
}

/// Get the default cache directory.
#[must_use]
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cloudtape")
        .join("content")
}

async fn is_complete_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial download {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial download {}: {}", path.display(), e),
    }
}

/// Remove every file in `dir`, returning how many were removed.
async fn purge_directory(dir: &Path) -> usize {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return 0;
    };
    let mut removed = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if tokio::fs::remove_file(entry.path()).await.is_ok() {
            removed += 1;
        }
    }
    removed
}
