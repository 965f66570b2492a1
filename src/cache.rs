// =============================================================================
// CACHE MODULE
// =============================================================================
// Optional Redis read-through cache for single vendor lookups.
//
// The cache is best effort: every Redis failure is logged and treated as a
// miss, so a broken cache never fails a request.
// =============================================================================

use std::time::Instant;

use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use crate::metrics;
use crate::models::Vendor;

/// Result of a cache read.
#[derive(Debug, PartialEq)]
pub enum CacheLookup {
    Hit(Vendor),
    /// `generation` is the vendor's current invalidation counter, or `None`
    /// when Redis could not be read and the entry must not be written back.
    Miss { generation: Option<u64> },
}

/// Stored entry: the vendor plus the invalidation generation it was read
/// under. Entries from an older generation are treated as misses.
#[derive(Debug, Serialize, Deserialize)]
struct CachedVendor {
    generation: u64,
    vendor: Vendor,
}

#[derive(Clone)]
pub struct VendorCache {
    conn: ConnectionManager,
    ttl_seconds: u64,
}

impl VendorCache {
    /// Connect to Redis. `ConnectionManager` reconnects on its own after this.
    pub async fn connect(redis_url: &str, ttl_seconds: u64) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, ttl_seconds })
    }

    fn key(vendor_id: i64) -> String {
        format!("vendor:{vendor_id}")
    }

    fn generation_key(vendor_id: i64) -> String {
        format!("vendor:{vendor_id}:generation")
    }

    pub async fn get(&self, vendor_id: i64) -> CacheLookup {
        let start = Instant::now();
        let cached: Result<(Option<String>, Option<u64>), _> = redis::cmd("MGET")
            .arg(Self::key(vendor_id))
            .arg(Self::generation_key(vendor_id))
            .query_async(&mut self.conn.clone())
            .await;
        metrics::record_cache_operation("get", start.elapsed().as_secs_f64());

        match cached {
            Ok((entry, generation)) => lookup(entry.as_deref(), generation.unwrap_or(0)),
            Err(e) => {
                tracing::warn!(vendor_id, error = %e, "Vendor cache read failed");
                CacheLookup::Miss { generation: None }
            }
        }
    }

    /// Store `vendor` as read under `generation` (from a prior `get`).
    pub async fn put(&self, vendor: &Vendor, generation: u64) {
        let entry = CachedVendor {
            generation,
            vendor: vendor.clone(),
        };
        let Ok(json) = serde_json::to_string(&entry) else {
            return;
        };

        let start = Instant::now();
        let result: Result<(), _> = redis::cmd("SETEX")
            .arg(Self::key(vendor.id))
            .arg(self.ttl_seconds)
            .arg(json)
            .query_async(&mut self.conn.clone())
            .await;
        metrics::record_cache_operation("set", start.elapsed().as_secs_f64());

        if let Err(e) = result {
            tracing::warn!(vendor_id = vendor.id, error = %e, "Vendor cache write failed");
        }
    }

    /// Bump the vendor's generation and drop its entry in one transaction.
    pub async fn invalidate(&self, vendor_id: i64) {
        let start = Instant::now();
        let result: Result<(), _> = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(Self::generation_key(vendor_id))
            .ignore()
            .cmd("DEL")
            .arg(Self::key(vendor_id))
            .ignore()
            .query_async(&mut self.conn.clone())
            .await;
        metrics::record_cache_operation("delete", start.elapsed().as_secs_f64());

        if let Err(e) = result {
            tracing::warn!(vendor_id, error = %e, "Vendor cache invalidation failed");
        }
    }

    pub async fn ping(&self) -> bool {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn.clone())
            .await
            .is_ok()
    }
}

fn lookup(entry: Option<&str>, generation: u64) -> CacheLookup {
    match entry.and_then(|json| serde_json::from_str::<CachedVendor>(json).ok()) {
        Some(cached) if cached.generation == generation => CacheLookup::Hit(cached.vendor),
        _ => CacheLookup::Miss {
            generation: Some(generation),
        },
    }
}
