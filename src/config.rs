//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with defaults that
//! match a small single-backend deployment. A `.env` file is read when present.
//!
//! # Admission Limits
//!
//! - `REQUESTS_PER_HOUR`: Hourly quota per client (default: 60)
//! - `DDOS_REQUESTS_PER_MINUTE`: Per-minute count above which a client is blocked (default: 20)
//! - `BLOCK_DURATION_MINUTES`: Length of a flood block (default: 60)
//!
//! # Security Configuration
//!
//! - `TRUSTED_PROXIES`: CIDR ranges whose forwarding headers are believed (default: all)
//! - `CORS_ALLOWED_ORIGINS`: Comma-separated list of allowed origins (default: `*`)

use std::env;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::admission::Limits;
use crate::error::{AppError, AppResult};
use crate::gateway::BackendTarget;

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Proxy will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    /// Maximum request body size in bytes (default: 10MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Backend Configuration
    // =========================================================================
    /// Backend base URL, http:// or https:// (default: "https://httpbin.org")
    pub backend_url: String,

    /// How long to wait for the backend's response headers (default: 30s)
    pub backend_timeout: Duration,

    // =========================================================================
    // Admission Configuration
    // =========================================================================
    /// Hourly quota per client (default: 60)
    pub requests_per_hour: u32,

    /// Flood threshold per client per minute (default: 20)
    pub ddos_requests_per_minute: u32,

    /// Flood block length in minutes (default: 60)
    pub block_duration_minutes: u32,

    /// Interval between sweeps of expired admission state (default: 60s)
    pub sweep_interval: Duration,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// Comma-separated list of allowed CORS origins
    /// Use "*" to allow all origins
    pub cors_allowed_origins: Vec<String>,

    /// Trusted proxy CIDR ranges.
    /// Forwarding headers are only believed if the TCP peer falls inside one
    /// of these networks; otherwise the peer address is the client identity.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    /// Default: Empty (trust all sources)
    ///
    /// Common values:
    /// - Kubernetes: "10.0.0.0/8" (pod network)
    /// - Docker: "172.17.0.0/16" (default bridge network)
    /// - Localhost: "127.0.0.0/8,::1/128"
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log filter (e.g., "info", "debug", "info,quota_gate::access=warn")
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable text
    pub log_json: bool,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a value fails to parse or the
    /// result fails [`validate`](Self::validate).
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 8080)?,
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 10 * 1024 * 1024)?, // 10MB

            // Backend
            backend_url: env::var("BACKEND_URL")
                .unwrap_or_else(|_| "https://httpbin.org".to_string()),
            backend_timeout: Duration::from_secs(Self::parse_env("BACKEND_TIMEOUT_SECS", 30)?),

            // Admission
            requests_per_hour: Self::parse_env("REQUESTS_PER_HOUR", 60)?,
            ddos_requests_per_minute: Self::parse_env("DDOS_REQUESTS_PER_MINUTE", 20)?,
            block_duration_minutes: Self::parse_env("BLOCK_DURATION_MINUTES", 60)?,
            sweep_interval: Duration::from_secs(Self::parse_env("SWEEP_INTERVAL_SECS", 60)?),

            // Security
            cors_allowed_origins: Self::parse_cors_origins(),
            trusted_proxies: Self::parse_trusted_proxies(),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_json: Self::parse_log_format()?,
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        self.limits()?;

        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.backend_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "BACKEND_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.sweep_interval.is_zero() {
            return Err(AppError::ConfigError(
                "SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        BackendTarget::parse(&self.backend_url)?;

        Ok(())
    }

    /// Admission limits as non-zero values.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` naming the first limit that is zero.
    pub fn limits(&self) -> AppResult<Limits> {
        Ok(Limits {
            requests_per_hour: Self::non_zero("REQUESTS_PER_HOUR", self.requests_per_hour)?,
            ddos_requests_per_minute: Self::non_zero(
                "DDOS_REQUESTS_PER_MINUTE",
                self.ddos_requests_per_minute,
            )?,
            block_duration_minutes: Self::non_zero(
                "BLOCK_DURATION_MINUTES",
                self.block_duration_minutes,
            )?,
        })
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if trusted proxy validation is enabled.
    pub fn proxy_validation_enabled(&self) -> bool {
        !self.trusted_proxies.is_empty()
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_enabled()
            .then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    fn non_zero(name: &str, value: u32) -> AppResult<NonZeroU32> {
        NonZeroU32::new(value)
            .ok_or_else(|| AppError::ConfigError(format!("{name} must be greater than 0")))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// `LOG_FORMAT`: "text" (default) or "json".
    fn parse_log_format() -> AppResult<bool> {
        match env::var("LOG_FORMAT") {
            Ok(format) => match format.trim().to_ascii_lowercase().as_str() {
                "json" => Ok(true),
                "text" | "" => Ok(false),
                other => Err(AppError::ConfigError(format!(
                    "Invalid LOG_FORMAT: '{other}' (expected 'text' or 'json')"
                ))),
            },
            Err(_) => Ok(false),
        }
    }

    /// Parse CORS allowed origins from environment variable.
    fn parse_cors_origins() -> Vec<String> {
        env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Parse trusted proxy CIDR ranges from environment variable.
    ///
    /// When empty, all forwarding headers are believed, which allows a client
    /// talking to the service directly to choose its own identity.
    fn parse_trusted_proxies() -> Vec<String> {
        env::var("TRUSTED_PROXIES")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_request_body_size: 10 * 1024 * 1024, // 10MB
            // Backend
            backend_url: "https://httpbin.org".to_string(),
            backend_timeout: Duration::from_secs(30),
            // Admission
            requests_per_hour: 60,
            ddos_requests_per_minute: 20,
            block_duration_minutes: 60,
            sweep_interval: Duration::from_secs(60),
            // Security
            cors_allowed_origins: vec!["*".to_string()],
            trusted_proxies: vec![], // Empty = trust all
            // Observability
            log_level: "info".to_string(),
            log_json: false,
            metrics_port: 9090,
        }
    }
}
