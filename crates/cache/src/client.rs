//! Redis cache client for resolved links.
//! Two-tier caching: LocalCache (L1) -> Redis (L2), TTL 300s.

use crate::local::LocalCache;
use linkforty_core::config::RedisConfig;
use linkforty_core::types::Link;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Redis-backed distributed cache with a local L1 layer in front of it.
///
/// A link may be cached under two keys: the bare `link:{code}` (public
/// redirects with no template) and the slug-scoped `link:{slug}:{code}`
/// (template-scoped redirects). `invalidate` evicts both so an update or
/// delete is never observable through the stale key.
pub struct LinkCache {
    client: redis::Client,
    local: Arc<LocalCache>,
    ttl_secs: u64,
}

impl LinkCache {
    /// Connect to Redis (single node or cluster).
    pub async fn new(config: &RedisConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        info!(url = %url, "Connecting to Redis");

        let client = redis::Client::open(url.as_str())?;

        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(response = %pong, "Redis connection established");

        let local = Arc::new(LocalCache::new(
            config.link_cache_ttl_secs / 2, // L1 TTL is half of L2
            1_000_000,
        ));

        Ok(Self {
            client,
            local,
            ttl_secs: config.link_cache_ttl_secs,
        })
    }

    /// Look up a link by bare short code (`link:{code}`).
    pub async fn get(&self, short_code: &str) -> anyhow::Result<Option<Link>> {
        self.get_by_key(&Link::cache_key_for(short_code)).await
    }

    /// Look up a link by template-scoped short code (`link:{slug}:{code}`).
    pub async fn get_scoped(&self, slug: &str, short_code: &str) -> anyhow::Result<Option<Link>> {
        self.get_by_key(&Link::scoped_cache_key_for(slug, short_code))
            .await
    }

    async fn get_by_key(&self, key: &str) -> anyhow::Result<Option<Link>> {
        if let Some(link) = self.local.get(key) {
            metrics::counter!("cache.l1.hit").increment(1);
            return Ok(Some((*link).clone()));
        }
        metrics::counter!("cache.l1.miss").increment(1);

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let data: Option<String> = conn.get(key).await?;

        match data {
            Some(json) => {
                let link: Link = serde_json::from_str(&json)?;
                self.local.put(key.to_string(), link.clone());
                metrics::counter!("cache.l2.hit").increment(1);
                Ok(Some(link))
            }
            None => {
                metrics::counter!("cache.l2.miss").increment(1);
                debug!(key, "cache miss for link");
                Ok(None)
            }
        }
    }

    /// Store a link under its bare key, and additionally under its
    /// slug-scoped key when `slug` is known at the call site.
    pub async fn put(&self, link: &Link, slug: Option<&str>) -> anyhow::Result<()> {
        let json = serde_json::to_string(link)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let bare_key = link.cache_key();
        conn.set_ex::<_, _, ()>(&bare_key, &json, self.ttl_secs)
            .await?;
        self.local.put(bare_key, link.clone());

        if let Some(slug) = slug {
            let scoped_key = Link::scoped_cache_key_for(slug, &link.short_code);
            conn.set_ex::<_, _, ()>(&scoped_key, &json, self.ttl_secs)
                .await?;
            self.local.put(scoped_key, link.clone());
        }

        Ok(())
    }

    /// Evict a link from both tiers under both possible keys. Must be
    /// called on every update and delete: a write that only clears
    /// `link:{code}` leaves the slug-scoped entry (or vice versa) serving
    /// stale data until its TTL expires.
    pub async fn invalidate(&self, short_code: &str, slug: Option<&str>) -> anyhow::Result<()> {
        let bare_key = Link::cache_key_for(short_code);
        self.local.remove(&bare_key);

        let scoped_key = slug.map(|slug| Link::scoped_cache_key_for(slug, short_code));
        if let Some(scoped_key) = &scoped_key {
            self.local.remove(scoped_key);
        }

        match self.client.get_multiplexed_async_connection().await {
            Ok(mut conn) => {
                let _: Result<(), _> = conn.del(&bare_key).await;
                if let Some(scoped_key) = &scoped_key {
                    let _: Result<(), _> = conn.del(scoped_key).await;
                }
            }
            Err(err) => {
                // Cache failures are warnings, not errors: the store
                // remains the source of truth and the TTL bounds staleness.
                warn!(error = %err, "redis unavailable during cache invalidation");
            }
        }

        Ok(())
    }

    /// Run periodic maintenance (L1 eviction).
    pub async fn maintenance(&self) {
        let evicted = self.local.evict_expired();
        if evicted > 0 {
            debug!(evicted = evicted, "local cache eviction complete");
        }
    }

    pub fn local_cache_size(&self) -> usize {
        self.local.len()
    }
}
