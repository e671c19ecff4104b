//! Configuration management for LessonForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values
//!
//! Components never read the environment themselves; each one receives the
//! sub-config it needs at construction.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Generation session policy
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds (plain HTTP routes only)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Postgres role assumed for row-level security
    #[serde(default = "default_rls_role")]
    pub rls_role: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Redis URL; caching is disabled when absent
    pub url: Option<String>,

    /// Default TTL in seconds
    #[serde(default = "default_redis_ttl")]
    pub default_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// API key for the provider; an empty key selects the mock model
    pub api_key: Option<String>,

    /// API base URL (for proxies and tests)
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,

    /// Provider API version header
    #[serde(default = "default_llm_api_version")]
    pub api_version: String,

    /// Model used for content generation
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Smaller/faster model used for quality assessment
    #[serde(default = "default_quality_model")]
    pub quality_model: String,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Attempts made by the retrying client
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,

    /// Base backoff unit in milliseconds; attempt k waits base * 2^k
    #[serde(default = "default_llm_backoff_base")]
    pub backoff_base_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Dispatch a quality check every N relayed chunks
    #[serde(default = "default_quality_interval")]
    pub quality_check_interval: u32,

    /// Characters of accumulated text sent to the quality assessor
    #[serde(default = "default_quality_prefix")]
    pub quality_prefix_chars: usize,

    /// Session idle timeout in seconds
    #[serde(default = "default_idle_secs")]
    pub idle_timeout_secs: u64,

    /// Offline validation auto-approval threshold (1-10 scale)
    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: f64,

    /// Base output token budget
    #[serde(default = "default_base_max_tokens")]
    pub base_max_tokens: u32,

    /// Output token budget used for long section descriptions
    #[serde(default = "default_extended_max_tokens")]
    pub extended_max_tokens: u32,

    /// Description length above which the extended budget applies
    #[serde(default = "default_long_description")]
    pub long_description_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// JWT secret used to verify access tokens
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds (for issued test tokens)
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level / filter directive (debug, info, lessonforge=debug, ...)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Generation requests per second (per user)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How often idle per-user buckets are dropped
    #[serde(default = "default_prune_interval")]
    pub prune_interval_secs: u64,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_rls_role() -> String { "authenticated".to_string() }
fn default_redis_ttl() -> u64 { 600 }
fn default_llm_api_base() -> String { "https://api.anthropic.com".to_string() }
fn default_llm_api_version() -> String { "2023-06-01".to_string() }
fn default_generation_model() -> String { "claude-3-5-sonnet-20241022".to_string() }
fn default_quality_model() -> String { "claude-3-haiku-20240307".to_string() }
fn default_llm_timeout() -> u64 { 120 }
fn default_llm_retries() -> u32 { 3 }
fn default_llm_backoff_base() -> u64 { 1000 }
fn default_quality_interval() -> u32 { 10 }
fn default_quality_prefix() -> usize { 2000 }
fn default_idle_secs() -> u64 { 120 }
fn default_approval_threshold() -> f64 { 8.0 }
fn default_base_max_tokens() -> u32 { 2048 }
fn default_extended_max_tokens() -> u32 { 4096 }
fn default_long_description() -> usize { 500 }
fn default_jwt_expiration() -> u64 { 3600 }
fn default_request_id_header() -> String { "X-Request-ID".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "lessonforge".to_string() }
fn default_rate_limit() -> u32 { 2 }
fn default_burst() -> u32 { 10 }
fn default_enabled() -> bool { true }
fn default_prune_interval() -> u64 { 60 }

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            default_ttl_secs: default_redis_ttl(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_llm_api_base(),
            api_version: default_llm_api_version(),
            model: default_generation_model(),
            quality_model: default_quality_model(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
            backoff_base_ms: default_llm_backoff_base(),
        }
    }
}

impl LlmConfig {
    /// The API key, treating an empty string as absent
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            quality_check_interval: default_quality_interval(),
            quality_prefix_chars: default_quality_prefix(),
            idle_timeout_secs: default_idle_secs(),
            approval_threshold: default_approval_threshold(),
            base_max_tokens: default_base_max_tokens(),
            extended_max_tokens: default_extended_max_tokens(),
            long_description_chars: default_long_description(),
        }
    }
}

impl GenerationConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            jwt_expiration_secs: default_jwt_expiration(),
            request_id_header: default_request_id_header(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
            prune_interval_secs: default_prune_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__LLM__API_KEY=sk-...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Get the rate limiter pruning interval as Duration
    pub fn prune_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit.prune_interval_secs.max(1))
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/lessonforge".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                rls_role: default_rls_role(),
            },
            redis: RedisConfig::default(),
            llm: LlmConfig::default(),
            generation: GenerationConfig::default(),
            auth: AuthConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.max_retries, 3);
        assert_eq!(config.generation.quality_check_interval, 10);
        assert_eq!(config.generation.quality_prefix_chars, 2000);
        assert_eq!(config.generation.approval_threshold, 8.0);
    }

    #[test]
    fn test_blank_api_key_is_absent() {
        let mut llm = LlmConfig::default();
        assert!(llm.api_key().is_none());
        llm.api_key = Some("   ".to_string());
        assert!(llm.api_key().is_none());
        llm.api_key = Some("sk-test".to_string());
        assert_eq!(llm.api_key(), Some("sk-test"));
    }
}
