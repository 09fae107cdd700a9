//! API Configuration Module
//!
//! Configuration is loaded from `INKWELL_*` environment variables with
//! defaults suitable for development.

use std::time::Duration;

use crate::constants::{
    DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_ID_SALT, DEFAULT_PAGE_SIZE, DEFAULT_WS_CAPACITY,
    MAX_PAGE_SIZE,
};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Settings for the dispatch core and its transports.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Paging
    // ========================================================================
    /// Limit applied when a request gives none.
    pub default_page_size: usize,

    /// Upper clamp for any requested limit.
    pub max_page_size: usize,

    // ========================================================================
    // Action cache
    // ========================================================================
    /// Global switch for the action cache.
    pub cache_enabled: bool,

    /// Optional entry lifetime. Entries without one live until invalidated.
    pub cache_ttl: Option<Duration>,

    // ========================================================================
    // Transports and bootstrapping
    // ========================================================================
    /// Capacity of the notification broadcast channel.
    pub ws_capacity: usize,

    /// Salt mixed into every opaque identifier codec.
    pub id_salt: String,

    /// Seed demo content at boot.
    pub seed_demo: bool,

    /// Deployment environment name (`development`, `production`, ...).
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            cache_enabled: true,
            cache_ttl: None,
            ws_capacity: DEFAULT_WS_CAPACITY,
            id_salt: DEFAULT_ID_SALT.to_string(),
            seed_demo: false,
            environment: "development".to_string(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `INKWELL_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `INKWELL_DEFAULT_PAGE_SIZE`: Default limit (default: 10)
    /// - `INKWELL_MAX_PAGE_SIZE`: Limit clamp (default: 100)
    /// - `INKWELL_CACHE_ENABLED`: "true" or "false" (default: true)
    /// - `INKWELL_CACHE_TTL_SECS`: Optional cache entry lifetime
    /// - `INKWELL_WS_CAPACITY`: Notification buffer (default: 1000)
    /// - `INKWELL_ID_SALT`: Opaque identifier salt (default: "inkwell")
    /// - `INKWELL_SEED`: "true" to seed demo content (default: false)
    /// - `INKWELL_ENVIRONMENT`: Environment name (default: development)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("INKWELL_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let default_page_size = env_parse("INKWELL_DEFAULT_PAGE_SIZE")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.default_page_size);

        let max_page_size = env_parse("INKWELL_MAX_PAGE_SIZE")
            .filter(|n: &usize| *n > 0)
            .unwrap_or(defaults.max_page_size)
            .max(default_page_size);

        let cache_enabled = std::env::var("INKWELL_CACHE_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let cache_ttl = env_parse("INKWELL_CACHE_TTL_SECS").map(Duration::from_secs);

        let seed_demo = std::env::var("INKWELL_SEED")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        Self {
            cors_origins,
            cors_max_age_secs: defaults.cors_max_age_secs,
            default_page_size,
            max_page_size,
            cache_enabled,
            cache_ttl,
            ws_capacity: env_parse("INKWELL_WS_CAPACITY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.ws_capacity),
            id_salt: std::env::var("INKWELL_ID_SALT").unwrap_or(defaults.id_salt),
            seed_demo,
            environment: std::env::var("INKWELL_ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }

    /// Development mode prints the route table at startup.
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Clamp a requested page size into `1..=max_page_size`.
    pub fn clamp_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|n| *n > 0)
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // *.example.com matches subdomains over https only
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain
                        .strip_suffix(pattern)
                        .is_some_and(|prefix| prefix.ends_with('.'));
                }
            }
            false
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
