//! Tiered photo cache: bounded memory tier over a disk directory.
//!
//! Lookups walk memory, then disk (backfilling memory), and return None on
//! a full miss - fetching remotely is the caller's job. Each photo lives on
//! disk as `{id}.jpg`; the directory is exclusive to this component. A
//! periodic sweep drops files older than the photo TTL, and a low-memory
//! signal empties the memory tier without touching disk.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, SystemTime};

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::utils::format_bytes;

use super::memory::MemoryCache;

// ============================================================================
// Constants
// ============================================================================

/// Disk entries expire 48 hours after creation, matching the photo TTL.
const CACHE_TTL: Duration = Duration::from_secs(48 * 60 * 60);

/// How often the expiry sweep runs.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Fixed JPEG quality for the disk tier.
const JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encode/decode failed: {0}")]
    Image(#[from] image::ImageError),
}

pub struct PhotoCache {
    dir: PathBuf,
    /// Guards the memory-tier map only - never held across an await.
    memory: StdMutex<MemoryCache>,
    /// Per-photo locks so disk I/O for the same id never interleaves,
    /// while distinct ids proceed concurrently.
    file_locks: StdMutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

impl PhotoCache {
    pub fn new(dir: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            memory: StdMutex::new(MemoryCache::new()),
            file_locks: StdMutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.jpg", id))
    }

    fn memory(&self) -> std::sync::MutexGuard<'_, MemoryCache> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn file_lock(&self, id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .file_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(id).or_default().clone()
    }

    /// Drop the per-id lock entry once no task holds it, so the lock map
    /// does not grow with every photo ever touched.
    fn release_file_lock(&self, id: Uuid) {
        let mut locks = self
            .file_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if locks.get(&id).map_or(false, |l| Arc::strong_count(l) == 1) {
            locks.remove(&id);
        }
    }

    /// Cache a photo in both tiers.
    ///
    /// The memory write always lands; a disk failure is reported but does
    /// not roll it back - the tiers are independently best-effort.
    pub async fn cache_photo(&self, image: DynamicImage, id: Uuid) -> Result<(), CacheError> {
        let image = Arc::new(image);
        self.memory().insert(id, Arc::clone(&image));

        // JPEG has no alpha channel; encode from RGB.
        let mut encoded = Vec::new();
        let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut encoded), JPEG_QUALITY);
        image.to_rgb8().write_with_encoder(encoder)?;

        let lock = self.file_lock(id);
        let _guard = lock.lock().await;
        if let Err(e) = tokio::fs::write(self.path_for(id), &encoded).await {
            warn!(photo = %id, error = %e, "Disk tier write failed, memory entry kept");
            return Err(e.into());
        }
        Ok(())
    }

    /// Look up a photo: memory first, then disk with a memory backfill.
    /// A full miss returns None - fetch remotely and call `cache_photo`.
    pub async fn get_cached_photo(&self, id: Uuid) -> Result<Option<Arc<DynamicImage>>, CacheError> {
        if let Some(image) = self.memory().get(id) {
            return Ok(Some(image));
        }

        let lock = self.file_lock(id);
        let _guard = lock.lock().await;
        let bytes = match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Backfill while still holding the guard: a delete landing between
        // the disk read and this insert would otherwise resurrect a memory
        // entry for a photo the disk tier no longer has.
        let image = Arc::new(image::load_from_memory(&bytes)?);
        self.memory().insert(id, Arc::clone(&image));
        debug!(photo = %id, "Disk tier hit, memory backfilled");
        Ok(Some(image))
    }

    /// Remove a cached photo given its disk path. Both tiers are removed
    /// under the photo's file lock so the delete cannot interleave with an
    /// in-flight read or write for the same id.
    pub async fn delete_cached_photo(&self, path: &Path) -> Result<(), CacheError> {
        let id = id_from_path(path);
        let result = match id {
            Some(id) => {
                let lock = self.file_lock(id);
                let _guard = lock.lock().await;
                self.memory().remove(id);
                remove_file_if_present(path).await
            }
            None => remove_file_if_present(path).await,
        };
        if let Some(id) = id {
            self.release_file_lock(id);
        }
        result
    }

    /// Remove disk entries older than the cache TTL, evicting matching
    /// memory entries. Idempotent; runs hourly via `spawn_expiry_sweep`.
    pub async fn clear_expired_photos(&self) -> Result<usize, CacheError> {
        self.sweep_older_than(CACHE_TTL).await
    }

    /// TTL sweep with an explicit threshold.
    pub async fn sweep_older_than(&self, ttl: Duration) -> Result<usize, CacheError> {
        let now = SystemTime::now();
        let mut removed = 0;

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping unreadable cache entry");
                    continue;
                }
            };
            if !metadata.is_file() {
                continue;
            }
            // Creation time where the filesystem has it, mtime otherwise.
            let created = match metadata.created().or_else(|_| metadata.modified()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping entry without a readable timestamp");
                    continue;
                }
            };
            if !is_stale(created, now, ttl) {
                continue;
            }

            let path = entry.path();
            if let Err(e) = self.delete_cached_photo(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove expired cache entry");
            } else {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, "Expired cache entries swept");
        }
        Ok(removed)
    }

    /// Empty both tiers and recreate the cache directory. Used under low
    /// storage or explicit user action.
    pub async fn clear_all_cache(&self) -> Result<(), CacheError> {
        self.memory().clear();
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        self.file_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(())
    }

    /// Low-memory valve: drop the whole memory tier immediately. The disk
    /// tier is untouched and will repopulate memory on the next read.
    pub fn on_memory_pressure(&self) {
        let mut memory = self.memory();
        let dropped = memory.len();
        memory.clear();
        debug!(dropped, "Memory tier dropped under memory pressure");
    }

    /// Aggregate disk usage in bytes. Diagnostics only - eviction is TTL-
    /// and count/cost-bound, never total-disk-bound.
    pub async fn cache_size(&self) -> Result<u64, CacheError> {
        let mut total = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Ok(metadata) = entry.metadata().await {
                if metadata.is_file() {
                    total += metadata.len();
                }
            }
        }
        Ok(total)
    }

    pub async fn formatted_cache_size(&self) -> Result<String, CacheError> {
        Ok(format_bytes(self.cache_size().await?))
    }

    /// Spawn the hourly expiry sweep. The first tick fires immediately so
    /// stale entries from a previous run are cleaned at startup.
    pub fn spawn_expiry_sweep(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                if let Err(e) = cache.clear_expired_photos().await {
                    warn!(error = %e, "Expiry sweep failed");
                }
            }
        })
    }
}

async fn remove_file_if_present(path: &Path) -> Result<(), CacheError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn id_from_path(path: &Path) -> Option<Uuid> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn is_stale(created: SystemTime, now: SystemTime, ttl: Duration) -> bool {
    now.duration_since(created)
        .map(|age| age > ttl)
        .unwrap_or(false)
}
