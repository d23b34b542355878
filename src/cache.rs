//! Two-tier registry-record cache, grounded on the teacher's `src/cache.rs`
//! / `cache_key.rs` / `cache_ttl.rs` L1 (in-process LRU) + L2 (Redis)
//! pattern, scoped here to `RegistryRecord` (spec §4.2).

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use deadpool_redis::Pool as RedisPool;
use lru::LruCache;
use parking_lot::Mutex;

use crate::models::RegistryRecord;

fn cache_key(registration_id: &str) -> String {
    format!("registry:record:{registration_id}")
}

fn negative_cache_key(registration_id: &str) -> String {
    format!("registry:not_found:{registration_id}")
}

/// Outcome of a cache lookup, distinguishing a cached miss (negative cache,
/// spec §4.2: 404 cached for a shorter TTL) from no cache entry at all.
pub enum CacheLookup {
    Hit(RegistryRecord),
    NegativeHit,
    Miss,
}

pub struct RegistryCache {
    l1: Mutex<LruCache<String, RegistryRecord>>,
    l1_negative: Mutex<LruCache<String, ()>>,
    redis: Option<RedisPool>,
    ttl: ChronoDuration,
    negative_ttl: ChronoDuration,
}

impl RegistryCache {
    pub fn new(max_entries: usize, ttl_seconds: i64, negative_ttl_seconds: i64, redis: Option<RedisPool>) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).unwrap();
        Self {
            l1: Mutex::new(LruCache::new(capacity)),
            l1_negative: Mutex::new(LruCache::new(capacity)),
            redis,
            ttl: ChronoDuration::seconds(ttl_seconds),
            negative_ttl: ChronoDuration::seconds(negative_ttl_seconds),
        }
    }

    pub async fn get(&self, registration_id: &str) -> CacheLookup {
        if let Some(record) = self.l1.lock().get(registration_id).cloned() {
            if !record.is_expired(self.ttl) {
                return CacheLookup::Hit(record);
            }
        }
        if self.l1_negative.lock().get(registration_id).is_some() {
            return CacheLookup::NegativeHit;
        }

        if let Some(pool) = &self.redis {
            if let Ok(mut conn) = pool.get().await {
                use redis::AsyncCommands;
                let key = cache_key(registration_id);
                if let Ok(Some(bytes)) = conn.get::<_, Option<Vec<u8>>>(&key).await {
                    if let Ok(record) = bincode::deserialize::<RegistryRecord>(&bytes) {
                        self.l1.lock().put(registration_id.to_string(), record.clone());
                        return CacheLookup::Hit(record);
                    }
                }
                let neg_key = negative_cache_key(registration_id);
                if let Ok(true) = conn.exists::<_, bool>(&neg_key).await {
                    self.l1_negative.lock().put(registration_id.to_string(), ());
                    return CacheLookup::NegativeHit;
                }
            }
        }

        CacheLookup::Miss
    }

    pub async fn put(&self, registration_id: &str, record: RegistryRecord) {
        self.l1.lock().put(registration_id.to_string(), record.clone());
        if let Some(pool) = &self.redis {
            if let Ok(mut conn) = pool.get().await {
                use redis::AsyncCommands;
                if let Ok(bytes) = bincode::serialize(&record) {
                    let _: Result<(), _> = conn
                        .set_ex(cache_key(registration_id), bytes, self.ttl.num_seconds().max(1) as u64)
                        .await;
                }
            }
        }
    }

    pub async fn put_negative(&self, registration_id: &str) {
        self.l1_negative.lock().put(registration_id.to_string(), ());
        if let Some(pool) = &self.redis {
            if let Ok(mut conn) = pool.get().await {
                use redis::AsyncCommands;
                let _: Result<(), _> = conn
                    .set_ex(negative_cache_key(registration_id), b"1".to_vec(), self.negative_ttl.num_seconds().max(1) as u64)
                    .await;
            }
        }
    }
}

pub type SharedRegistryCache = Arc<RegistryCache>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn l1_hit_short_circuits_without_redis() {
        let cache = RegistryCache::new(10, 3600, 600, None);
        let record = RegistryRecord {
            registration_id: "12345678".into(),
            name: Some("ABC s.r.o.".into()),
            tax_id: None,
            address: None,
            active: true,
            tax_registered: true,
            fetched_at: chrono::Utc::now(),
        };
        cache.put("12345678", record).await;
        match cache.get("12345678").await {
            CacheLookup::Hit(r) => assert_eq!(r.registration_id, "12345678"),
            _ => panic!("expected cache hit"),
        }
    }

    #[tokio::test]
    async fn negative_cache_short_circuits_repeat_lookups() {
        let cache = RegistryCache::new(10, 3600, 600, None);
        cache.put_negative("00000000").await;
        assert!(matches!(cache.get("00000000").await, CacheLookup::NegativeHit));
    }
}
