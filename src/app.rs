//! Application facade wiring the store, sync engine, photo cache, and
//! progressive fetcher together.
//!
//! This is the composition root: everything below it returns typed errors,
//! while the facade itself composes them with `anyhow` for embedders.

use std::sync::Arc;

use anyhow::{Context, Result};
use image::DynamicImage;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{ApiClient, Connectivity};
use crate::auth::{Session, SessionData};
use crate::cache::PhotoCache;
use crate::config::Config;
use crate::fetch::{ProgressiveFetcher, DEFAULT_MAX_ATTEMPTS};
use crate::models::{Group, Photo};
use crate::store::Store;
use crate::sync::SyncEngine;

pub struct Dayly {
    config: Config,
    session: Session,
    api: ApiClient,
    connectivity: Connectivity,
    engine: SyncEngine,
    cache: Arc<PhotoCache>,
    fetcher: ProgressiveFetcher,
}

impl Dayly {
    /// Build the full client core from persisted configuration: config and
    /// session files under the platform directories, SQLite store, photo
    /// cache, and an API client sharing its connection pool with the
    /// fetcher.
    pub fn new() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;

        let mut session = Session::new(config.data_dir()?);
        session.load().context("Failed to load session")?;

        let mut api = ApiClient::new(&config.api_url())
            .with_context(|| format!("Invalid API base URL: {}", config.api_url()))?;
        if let Some(token) = session.token() {
            api.set_token(token.to_string());
        }

        let store = Arc::new(Store::open(&config.store_path()?)?);
        let connectivity = Connectivity::default();
        let engine = SyncEngine::new(Arc::clone(&store), api.clone(), connectivity.clone());
        let cache = Arc::new(PhotoCache::new(config.cache_dir()?)?);
        let fetcher = ProgressiveFetcher::new(api.http_client());

        info!("Client core initialized");
        Ok(Self {
            config,
            session,
            api,
            connectivity,
            engine,
            cache,
            fetcher,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<PhotoCache> {
        &self.cache
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    // ===== Sign-in =====

    /// Store a sign-in and attach the bearer token to subsequent requests.
    pub fn sign_in(&mut self, data: SessionData) -> Result<()> {
        self.api.set_token(data.token.clone());
        self.session.update(data);
        self.session.save().context("Failed to persist session")
    }

    /// Drop the local session. Server-side device state is cleaned up
    /// separately via `unregister_device`.
    pub fn sign_out(&mut self) -> Result<()> {
        self.session.clear().context("Failed to clear session")
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_signed_in()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.session.user_id()
    }

    // ===== Push registration =====

    pub async fn register_device(&self, device_token: &str) -> Result<()> {
        self.api
            .register_device(device_token)
            .await
            .context("Device registration failed")
    }

    pub async fn unregister_device(&self, device_token: &str) -> Result<()> {
        self.api
            .unregister_device(device_token)
            .await
            .context("Device unregistration failed")
    }

    // ===== Groups and photos =====

    pub async fn fetch_groups(&self) -> Result<Vec<Group>> {
        Ok(self.engine.fetch_groups().await?)
    }

    pub async fn fetch_photos(&self, group_id: Uuid) -> Result<Vec<Photo>> {
        Ok(self.engine.fetch_photos(group_id).await?)
    }

    /// Load a photo's image: cache tiers first, then a streamed download
    /// with retry, writing the result back through the cache.
    ///
    /// `on_progress` receives fractional download progress; cache hits
    /// complete without any progress callbacks.
    pub async fn load_photo(
        &self,
        photo: &Photo,
        on_progress: impl FnMut(f64),
    ) -> Result<Arc<DynamicImage>> {
        if let Some(cached) = self.cache.get_cached_photo(photo.id).await? {
            return Ok(cached);
        }

        let url = photo
            .remote_url
            .as_deref()
            .context("Photo has no remote URL and is not cached")?;

        let image = self
            .fetcher
            .load_image_with_retry(url, DEFAULT_MAX_ATTEMPTS, on_progress)
            .await
            .with_context(|| format!("Failed to download photo {}", photo.id))?;

        // Write-back is best-effort: a cache failure must not lose the
        // image we already hold.
        if let Err(e) = self.cache.cache_photo(image.clone(), photo.id).await {
            warn!(photo = %photo.id, error = %e, "Write-back to cache failed");
        }
        Ok(Arc::new(image))
    }

    // ===== Lifecycle =====

    /// Start the hourly cache expiry sweep.
    pub fn start_expiry_sweep(&self) -> JoinHandle<()> {
        self.cache.spawn_expiry_sweep()
    }

    /// Synchronous low-memory hook: drops the in-memory image tier.
    pub fn on_memory_pressure(&self) {
        self.cache.on_memory_pressure();
    }

    /// Persist config and session state. Called on background/termination
    /// transitions; cheap enough to call eagerly.
    pub fn flush(&self) -> Result<()> {
        self.config.save()?;
        self.session.save()?;
        Ok(())
    }

    /// Background transition: persist state and sweep expired photo rows
    /// and cache files.
    pub async fn on_background(&self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "State flush failed");
        }
        match self.engine.sweep_expired_photos() {
            Ok(removed) if removed > 0 => info!(removed, "Expired photo rows swept"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Photo row sweep failed"),
        }
        if let Err(e) = self.cache.clear_expired_photos().await {
            warn!(error = %e, "Cache sweep failed");
        }
    }
}
