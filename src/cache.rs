// Short-lived cache of flag definitions so evaluation does not hit the store on
// every request. Entries only leave through expiry, capacity eviction or an
// explicit invalidate.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use moka::Expiry;

use crate::store::FlagDefinition;

/// What the store said about a key the last time it was asked.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedFlag {
    Present(Arc<FlagDefinition>),
    Absent,
}

impl CachedFlag {
    pub fn definition(&self) -> Option<&FlagDefinition> {
        match self {
            CachedFlag::Present(flag) => Some(flag),
            CachedFlag::Absent => None,
        }
    }
}

impl From<Option<FlagDefinition>> for CachedFlag {
    fn from(flag: Option<FlagDefinition>) -> Self {
        match flag {
            Some(flag) => CachedFlag::Present(Arc::new(flag)),
            None => CachedFlag::Absent,
        }
    }
}

#[derive(Clone)]
struct Entry {
    flag: CachedFlag,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

pub struct FlagCache {
    // None when the default TTL is zero: every call passes through to the store.
    cache: Option<Cache<String, Entry>>,
    default_ttl: Duration,
    // Bumped by every invalidate, before the entry is removed.
    generation: AtomicU64,
}

impl FlagCache {
    pub fn new(capacity: u64, default_ttl: Duration) -> Self {
        let cache = (!default_ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(capacity)
                .expire_after(PerEntryTtl)
                .build()
        });

        FlagCache {
            cache,
            default_ttl,
            generation: AtomicU64::new(0),
        }
    }

    /// A cache that never holds anything.
    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    /// `None` is a miss: either never cached or expired.
    pub fn get(&self, key: &str) -> Option<CachedFlag> {
        self.cache.as_ref()?.get(key).map(|entry| entry.flag)
    }

    pub fn insert(&self, key: &str, flag: CachedFlag) {
        self.put(key, flag, self.default_ttl);
    }

    pub fn put(&self, key: &str, flag: CachedFlag, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        if let Some(cache) = &self.cache {
            cache.insert(key.to_string(), Entry { flag, ttl });
        }
    }

    /// Read this before going to the store and pass it to
    /// [`FlagCache::insert_unless_invalidated`] with the result.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Inserts `flag` only if nothing was invalidated since `generation` was
    /// read, so a fetch that raced an invalidate cannot put the old
    /// definition back for a full TTL.
    pub fn insert_unless_invalidated(&self, key: &str, flag: CachedFlag, generation: u64) {
        let Some(cache) = &self.cache else {
            return;
        };
        if self.generation() != generation {
            return;
        }
        self.insert(key, flag);
        // An invalidate may have landed between the check and the insert.
        if self.generation() != generation {
            cache.invalidate(key);
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(cache) = &self.cache {
            cache.invalidate(key);
        }
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }
}
