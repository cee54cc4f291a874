//! Application context shared by all route handlers via Axum state.

use std::sync::Arc;
use std::time::Duration;

use rh_av::{Encoder, ToolRegistry};
use rh_core::config::Config;
use rh_core::{Error, ProfileId, Result, TranscodingProfile};
use rh_db::MediaStore;

use crate::rate_limit::RateLimiter;
use crate::scanner::LibraryScanner;
use crate::transcoder::TranscodingManager;

/// Application context shared by all request handlers (via Axum state).
///
/// This is cheaply cloneable because it only holds `Arc`s.
#[derive(Clone)]
pub struct AppContext {
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// Metadata store; `None` runs the server from the in-memory snapshot.
    pub store: Option<Arc<dyn MediaStore>>,
    pub scanner: Arc<LibraryScanner>,
    pub transcoder: Arc<TranscodingManager>,
    /// One manual rescan per interval, process-wide.
    pub scan_limiter: Arc<RateLimiter>,
    /// One progress update per interval per media and client.
    pub playback_limiter: Arc<RateLimiter>,
    /// External tool registry.
    pub tools: Arc<ToolRegistry>,
}

impl AppContext {
    /// Wire up the scanner, transcoder and limiters from `config`.
    pub fn new(
        config: Config,
        store: Option<Arc<dyn MediaStore>>,
        encoder: Arc<dyn Encoder>,
        tools: ToolRegistry,
    ) -> Self {
        let scanner = Arc::new(LibraryScanner::new(&config.library, store.clone()));
        let transcoder = Arc::new(TranscodingManager::new(
            &config.transcoding,
            encoder,
            store.clone(),
        ));
        let scan_limiter = Arc::new(RateLimiter::new(Duration::from_secs(
            config.rate_limits.scan_interval_secs,
        )));
        let playback_limiter = Arc::new(RateLimiter::new(Duration::from_secs(
            config.rate_limits.playback_interval_secs,
        )));
        Self {
            config: Arc::new(config),
            store,
            scanner,
            transcoder,
            scan_limiter,
            playback_limiter,
            tools: Arc::new(tools),
        }
    }

    /// The metadata store, or `Forbidden` when the server runs without one.
    pub fn store(&self) -> Result<&Arc<dyn MediaStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| Error::Forbidden("no metadata store is configured".into()))
    }

    /// Look up a profile, configured profiles first. `None` selects the
    /// default: the first configured profile, else the built-in web profile.
    pub fn profile(&self, id: Option<&str>) -> Result<TranscodingProfile> {
        let configured = &self.config.transcoding.profiles;
        let Some(id) = id.filter(|s| !s.is_empty()) else {
            return Ok(configured
                .first()
                .cloned()
                .unwrap_or_else(TranscodingProfile::web_default));
        };
        if let Some(p) = configured.iter().find(|p| p.id.as_str() == id) {
            return Ok(p.clone());
        }
        if let Some(store) = &self.store {
            if let Some(p) = store.get_profile(&ProfileId::new(id))? {
                return Ok(p);
            }
        }
        if configured.is_empty() && id == TranscodingProfile::web_default().id.as_str() {
            return Ok(TranscodingProfile::web_default());
        }
        Err(Error::not_found("profile", id))
    }

    /// Configured profiles followed by stored ones with distinct IDs.
    pub fn profiles(&self) -> Result<Vec<TranscodingProfile>> {
        let mut out = self.config.transcoding.profiles.clone();
        if out.is_empty() {
            out.push(TranscodingProfile::web_default());
        }
        if let Some(store) = &self.store {
            for p in store.list_profiles()? {
                if !out.iter().any(|o| o.id == p.id) {
                    out.push(p);
                }
            }
        }
        Ok(out)
    }
}
