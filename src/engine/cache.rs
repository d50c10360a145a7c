//! Content-addressed cache of step results.
//!
//! Entries are keyed by a SHA-256 of the target model and the normalized
//! input, so identical calls across runs share one entry.

use moka::future::Cache;
use ring::digest::{digest, SHA256};
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;

/// A cached tool result.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult {
    pub content: Arc<str>,
    pub model: Option<String>,
}

/// Shared result cache. Clones share storage.
#[derive(Clone)]
pub struct ResultCache {
    cache: Cache<String, CachedResult>,
}

impl ResultCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.cache_capacity, config.cache_ttl())
    }

    /// Cache key for a model and input text.
    pub fn key(model: &str, input: &str) -> String {
        let material = format!("{}\0{}", model, normalize(input));
        hex::encode(digest(&SHA256, material.as_bytes()).as_ref())
    }

    pub async fn get(&self, key: &str) -> Option<CachedResult> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: String, result: CachedResult) {
        self.cache.insert(key, result).await;
    }

    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Trim and collapse whitespace runs to a single space.
pub fn normalize(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_whitespace_differences() {
        assert_eq!(
            ResultCache::key("m", "hello   world\n"),
            ResultCache::key("m", " hello world")
        );
        assert_ne!(ResultCache::key("m", "a"), ResultCache::key("n", "a"));
        assert_eq!(ResultCache::key("m", "a").len(), 64);
    }

    #[test]
    fn test_key_separates_model_from_input() {
        assert_ne!(ResultCache::key("ab", "c"), ResultCache::key("a", "bc"));
    }

    #[tokio::test]
    async fn test_insert_get_clear() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        let key = ResultCache::key("m", "input");
        assert!(cache.get(&key).await.is_none());

        let result = CachedResult {
            content: Arc::from("out"),
            model: Some("m".into()),
        };
        cache.insert(key.clone(), result.clone()).await;
        assert_eq!(cache.get(&key).await, Some(result));
        assert_eq!(cache.entry_count().await, 1);

        cache.clear().await;
        assert!(cache.get(&key).await.is_none());
    }
}
