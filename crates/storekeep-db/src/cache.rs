//! # Low-Stock Cache
//!
//! Derived copy of the low-stock product list. Never authoritative: every
//! inventory or catalog write invalidates it after commit, and a disabled
//! cache must give the same answers.
//!
//! ```text
//! get_low_stock ──► cache hit? ──yes──► cached list
//!                        │
//!                        no
//!                        ▼
//!              generation g = current
//!              query SQLite
//!              store(g, rows)  ── dropped if a write bumped the generation
//!                                 while the query ran
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use storekeep_core::Product;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug)]
struct CacheEntry {
    products: Vec<Product>,
    stored_at: Instant,
}

#[derive(Debug)]
struct Inner {
    enabled: bool,
    ttl: Duration,
    generation: AtomicU64,
    entry: RwLock<Option<CacheEntry>>,
}

/// Shared handle; clones see the same cache.
#[derive(Debug, Clone)]
pub struct LowStockCache {
    inner: Arc<Inner>,
}

impl LowStockCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        LowStockCache {
            inner: Arc::new(Inner {
                enabled,
                ttl,
                generation: AtomicU64::new(0),
                entry: RwLock::new(None),
            }),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    /// Current generation. Take it before querying, pass it to [`store`].
    ///
    /// [`store`]: LowStockCache::store
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub async fn get(&self) -> Option<Vec<Product>> {
        if !self.inner.enabled {
            return None;
        }
        let entry = self.inner.entry.read().await;
        match entry.as_ref() {
            Some(e) if e.stored_at.elapsed() <= self.inner.ttl => {
                debug!(count = e.products.len(), "Low-stock cache hit");
                Some(e.products.clone())
            }
            _ => None,
        }
    }

    /// Stores a freshly queried list unless a write happened since
    /// `generation` was read.
    pub async fn store(&self, generation: u64, products: Vec<Product>) {
        if !self.inner.enabled {
            return;
        }
        let mut entry = self.inner.entry.write().await;
        if self.generation() != generation {
            debug!("Discarding low-stock list computed before a write");
            return;
        }
        *entry = Some(CacheEntry {
            products,
            stored_at: Instant::now(),
        });
    }

    /// Drops the cached list. Called after every committed stock or
    /// catalog write.
    pub async fn invalidate(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        if self.inner.enabled {
            *self.inner.entry.write().await = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(sku: &str) -> Product {
        let now = Utc::now();
        Product {
            id: sku.to_lowercase(),
            sku: sku.to_string(),
            barcode: None,
            name: sku.to_string(),
            description: None,
            price_cents: 100,
            cost_cents: 50,
            min_stock_level: 5,
            is_active: true,
            current_stock: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_store_and_invalidate() {
        let cache = LowStockCache::new(true, Duration::from_secs(60));
        assert!(cache.get().await.is_none());

        cache.store(cache.generation(), vec![product("TEA")]).await;
        assert_eq!(cache.get().await.unwrap().len(), 1);

        cache.invalidate().await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_stale_store_is_dropped() {
        let cache = LowStockCache::new(true, Duration::from_secs(60));
        let before = cache.generation();
        cache.invalidate().await;

        cache.store(before, vec![product("TEA")]).await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = LowStockCache::disabled();
        cache.store(cache.generation(), vec![product("TEA")]).await;
        assert!(cache.get().await.is_none());
    }
}
