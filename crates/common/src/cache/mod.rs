//! Redis cache integration
//!
//! Provides:
//! - Connection management
//! - Generic get/set operations with TTL
//! - Key builders and content hashing

use crate::config::RedisConfig;
use crate::errors::{AppError, Result};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Redis cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
    /// Default TTL in seconds
    pub default_ttl_secs: u64,
    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl CacheConfig {
    /// Derive from application config; `None` when Redis is not configured
    pub fn from_redis(config: &RedisConfig) -> Option<Self> {
        config.url.as_ref().filter(|u| !u.is_empty()).map(|url| Self {
            url: url.clone(),
            default_ttl_secs: config.default_ttl_secs,
            key_prefix: "lessonforge".to_string(),
        })
    }
}

/// Redis cache client
pub struct Cache {
    connection: MultiplexedConnection,
    config: CacheConfig,
}

impl Cache {
    /// Create a new cache client
    pub async fn new(config: CacheConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| AppError::CacheError {
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self { connection, config })
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    /// Get a value from cache
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.key(key);
        let mut conn = self.connection.clone();

        let value: Option<String> = conn.get(&full_key).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to get key '{}': {}", full_key, e),
        })?;

        match value {
            Some(json) => {
                let parsed = serde_json::from_str(&json).map_err(|e| AppError::CacheError {
                    message: format!("Failed to parse cached value: {}", e),
                })?;
                debug!(key = %full_key, "Cache hit");
                Ok(Some(parsed))
            }
            None => {
                debug!(key = %full_key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Set a value in cache with default TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.config.default_ttl_secs).await
    }

    /// Set a value in cache with custom TTL
    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let full_key = self.key(key);
        let json = serde_json::to_string(value).map_err(|e| AppError::CacheError {
            message: format!("Failed to serialize value: {}", e),
        })?;

        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(&full_key, &json, ttl_secs)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to set key '{}': {}", full_key, e),
            })?;

        debug!(key = %full_key, ttl_secs, "Cache set");
        Ok(())
    }
}

/// Hex SHA-256 of a text, used to key content-derived entries
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cache key builder helpers
pub mod keys {
    /// Build a quality assessment cache key
    pub fn quality(model: &str, text_hash: &str) -> String {
        format!("quality:{}:{}", model, text_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        let hash = content_hash("Plants convert light into chemical energy.");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, content_hash("Plants convert light into chemical energy."));
        assert!(keys::quality("haiku", &hash).starts_with("quality:haiku:"));
    }

    #[test]
    fn test_cache_disabled_without_url() {
        assert!(CacheConfig::from_redis(&RedisConfig::default()).is_none());

        let config = RedisConfig {
            url: Some("redis://localhost:6379".to_string()),
            ..Default::default()
        };
        let cache = CacheConfig::from_redis(&config).unwrap();
        assert_eq!(cache.key_prefix, "lessonforge");
    }
}
