//! In-process cache backed by DashMap for lock-free concurrent access.
//! Serves as L1 cache in front of Redis to reduce network round trips.

use linkforty_core::types::Link;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct CacheEntry {
    link: Arc<Link>,
    inserted_at: Instant,
}

/// Lock-free local cache for frequently resolved links, keyed by whatever
/// cache key the caller used to look the link up (`link:{code}` or
/// `link:{slug}:{code}`, see `Link::cache_key_for`/`scoped_cache_key_for`).
/// Returns `Arc<Link>` to avoid cloning on every cache hit.
pub struct LocalCache {
    store: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl LocalCache {
    pub fn new(ttl_secs: u64, max_entries: usize) -> Self {
        Self {
            store: Arc::new(DashMap::with_capacity(max_entries)),
            ttl: Duration::from_secs(ttl_secs),
            max_entries,
        }
    }

    /// Get a link from the local cache, returns None if expired or missing.
    pub fn get(&self, key: &str) -> Option<Arc<Link>> {
        let entry = self.store.get(key)?;
        if entry.inserted_at.elapsed() > self.ttl {
            drop(entry);
            self.store.remove(key);
            return None;
        }
        Some(Arc::clone(&entry.link))
    }

    pub fn put(&self, key: String, link: Link) {
        self.put_arc(key, Arc::new(link));
    }

    /// Insert or update with a pre-wrapped Arc (avoids double-Arc on L2 backfill).
    pub fn put_arc(&self, key: String, link: Arc<Link>) {
        if self.store.len() >= self.max_entries && !self.store.contains_key(&key) {
            self.evict_one_expired();
            if self.store.len() >= self.max_entries {
                return;
            }
        }
        self.store.insert(
            key,
            CacheEntry {
                link,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove a single key, regardless of expiry. Used by `LinkCache::invalidate`
    /// to evict both the bare and slug-scoped keys for a link on update/delete.
    pub fn remove(&self, key: &str) {
        self.store.remove(key);
    }

    fn evict_one_expired(&self) {
        let mut to_remove = None;
        for entry in self.store.iter() {
            if entry.value().inserted_at.elapsed() > self.ttl {
                to_remove = Some(entry.key().clone());
                break;
            }
        }
        if let Some(key) = to_remove {
            self.store.remove(&key);
        }
    }

    /// Remove expired entries. Call this periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let before = self.store.len();
        self.store
            .retain(|_, entry| entry.inserted_at.elapsed() <= self.ttl);
        before - self.store.len()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn sample_link(code: &str) -> Link {
        let now = Utc::now();
        Link {
            id: Uuid::new_v4(),
            short_code: code.to_string(),
            template_id: None,
            owner_id: None,
            origin_url: "https://example.com".into(),
            ios_app_store_url: None,
            android_play_store_url: None,
            web_fallback_url: None,
            ios_universal_link: None,
            android_app_link: None,
            app_scheme: None,
            deep_link_path: None,
            deep_link_parameters: HashMap::new(),
            og_title: None,
            og_description: None,
            og_image_url: None,
            utm_parameters: Default::default(),
            targeting_rules: Default::default(),
            attribution_window_hours: 168,
            is_active: true,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = LocalCache::new(0, 100);
        cache.put("link:abc".into(), sample_link("abc"));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("link:abc").is_none());
    }

    #[test]
    fn remove_evicts_regardless_of_ttl() {
        let cache = LocalCache::new(300, 100);
        cache.put("link:abc".into(), sample_link("abc"));
        assert!(cache.get("link:abc").is_some());
        cache.remove("link:abc");
        assert!(cache.get("link:abc").is_none());
    }
}
