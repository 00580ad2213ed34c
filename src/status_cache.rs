use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::log_cache_event;

#[derive(Debug, Clone)]
struct CachedStatus {
    open: bool,
    cached_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// In-memory cache of survey open/closed status with per-entry TTL.
#[derive(Debug, Clone)]
pub struct StatusCache {
    cache: Arc<RwLock<HashMap<Uuid, CachedStatus>>>,
    max_size: usize,
}

impl StatusCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            max_size,
        }
    }

    /// Store a status until `now + ttl`. Non-positive TTLs are not cached.
    pub async fn store(&self, survey_id: Uuid, open: bool, ttl: Duration, now: DateTime<Utc>) {
        if ttl <= Duration::zero() || self.max_size == 0 {
            return;
        }

        let mut cache = self.cache.write().await;

        Self::cleanup_expired_entries(&mut cache, now);

        if cache.len() >= self.max_size && !cache.contains_key(&survey_id) {
            Self::evict_oldest(&mut cache);
        }

        cache.insert(
            survey_id,
            CachedStatus {
                open,
                cached_at: now,
                expires_at: now + ttl,
            },
        );

        log_cache_event!(store, survey_id = survey_id, ttl_seconds = ttl.num_seconds());
    }

    /// Cached status if present and not expired at `now`.
    pub async fn get(&self, survey_id: Uuid, now: DateTime<Utc>) -> Option<bool> {
        {
            let cache = self.cache.read().await;
            match cache.get(&survey_id) {
                Some(cached) if cached.expires_at > now => {
                    log_cache_event!(hit, survey_id = survey_id);
                    return Some(cached.open);
                }
                Some(_) => {}
                None => {
                    log_cache_event!(miss, survey_id = survey_id);
                    return None;
                }
            }
        }

        // Another task may have stored a fresh entry since the read lock was released.
        let mut cache = self.cache.write().await;
        if let Some(cached) = Self::take_if_expired(&mut cache, survey_id, now) {
            return Some(cached);
        }
        log_cache_event!(miss, survey_id = survey_id);
        None
    }

    /// Drop the entry if it is expired at `now`, otherwise return its status.
    fn take_if_expired(cache: &mut HashMap<Uuid, CachedStatus>, survey_id: Uuid, now: DateTime<Utc>) -> Option<bool> {
        match cache.get(&survey_id) {
            Some(cached) if cached.expires_at > now => return Some(cached.open),
            Some(_) => {}
            None => return None,
        }
        cache.remove(&survey_id);
        None
    }

    pub async fn invalidate(&self, survey_id: Uuid) {
        self.cache.write().await.remove(&survey_id);
        log_cache_event!(invalidate, survey_id = survey_id);
    }

    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    fn cleanup_expired_entries(cache: &mut HashMap<Uuid, CachedStatus>, now: DateTime<Utc>) {
        cache.retain(|_, cached| cached.expires_at > now);
    }

    fn evict_oldest(cache: &mut HashMap<Uuid, CachedStatus>) {
        if let Some(oldest_key) = cache
            .iter()
            .min_by_key(|(_, cached)| cached.cached_at)
            .map(|(key, _)| *key)
        {
            cache.remove(&oldest_key);
        }
    }
}
