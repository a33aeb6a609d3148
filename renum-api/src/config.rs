//! API Configuration Module
//!
//! CORS, rate limiting, and bind settings, loaded from environment
//! variables with development defaults.

use std::time::Duration;

/// API configuration for CORS, rate limiting, and production hardening.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// Whether rate limiting is enabled.
    pub rate_limit_enabled: bool,

    /// Rate limit for authenticated requests (per tenant, per minute).
    pub rate_limit_per_minute: u32,

    /// Burst capacity beyond the steady rate.
    pub rate_limit_burst: u32,

    /// Window size for rate limiting.
    pub rate_limit_window: Duration,

    /// Optional Redis DSN for shared rate-limit state. Absent means
    /// in-process limiting only.
    pub redis_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(), // Empty = allow all
            cors_max_age_secs: 86400,
            rate_limit_enabled: true,
            rate_limit_per_minute: 300,
            rate_limit_burst: 20,
            rate_limit_window: Duration::from_secs(60),
            redis_url: None,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `RENUM_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `RENUM_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `RENUM_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `RENUM_RATE_LIMIT_PER_MINUTE`: Requests per minute per tenant (default: 300)
    /// - `RENUM_RATE_LIMIT_BURST`: Burst capacity (default: 20)
    /// - `REDIS_URL`: optional shared cache for rate limiting
    pub fn from_env() -> Self {
        let cors_origins = std::env::var("RENUM_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            cors_origins,
            cors_max_age_secs: std::env::var("RENUM_CORS_MAX_AGE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(86400),
            rate_limit_enabled: std::env::var("RENUM_RATE_LIMIT_ENABLED")
                .ok()
                .map(|s| s.to_lowercase() != "false")
                .unwrap_or(true),
            rate_limit_per_minute: std::env::var("RENUM_RATE_LIMIT_PER_MINUTE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            rate_limit_burst: std::env::var("RENUM_RATE_LIMIT_BURST")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            rate_limit_window: Duration::from_secs(60),
            redis_url: std::env::var("REDIS_URL").ok(),
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }
        self.cors_origins.iter().any(|allowed| allowed == origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_per_minute, 300);
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_is_production() {
        let mut config = ApiConfig::default();
        assert!(!config.is_production());

        config.cors_origins = vec!["https://app.renum.app".to_string()];
        assert!(config.is_production());
    }

    #[test]
    fn test_origin_allowed() {
        let mut config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.example"));

        config.cors_origins = vec!["https://app.renum.app".to_string()];
        assert!(config.is_origin_allowed("https://app.renum.app"));
        assert!(!config.is_origin_allowed("https://evil.example"));
    }
}
