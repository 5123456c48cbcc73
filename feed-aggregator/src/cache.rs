use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub inserted_at: Instant,
    pub last_accessed_at: Instant,
    // Monotonic access counter; orders entries even when two accesses share an instant.
    access_seq: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) > ttl
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
    pub evictions: u64,
}

/// Expiring cache bounded by entry count. Entries live for `ttl` from their
/// last `set`; once over `max_size`, expired entries go first and then the
/// least recently accessed ones.
pub struct TtlLruCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    max_size: usize,
    ttl: Duration,
    next_seq: u64,
    stats: CacheStats,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            max_size,
            ttl,
            next_seq: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let ttl = self.ttl;
        let seq = self.bump_seq();

        match self.entries.get_mut(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) if !entry.is_expired(now, ttl) => {
                entry.last_accessed_at = now;
                entry.access_seq = seq;
                self.stats.hits += 1;
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        // Present but past its TTL.
        self.entries.remove(key);
        self.stats.expirations += 1;
        self.stats.misses += 1;
        None
    }

    pub fn set(&mut self, key: K, value: V) {
        let now = Instant::now();
        let seq = self.bump_seq();

        // Replacing a key counts as a fresh insertion.
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                last_accessed_at: now,
                access_seq: seq,
            },
        );

        self.purge_expired(now);
        while self.entries.len() > self.max_size {
            if !self.evict_least_recent() {
                break;
            }
        }
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).map(|entry| entry.value)
    }

    pub fn clear(&mut self) {
        debug!("Clearing cache ({} entries)", self.entries.len());
        self.entries.clear();
    }

    /// Stored entries, including any that expired but haven't been purged yet.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        let purged = before - self.entries.len();
        if purged > 0 {
            self.stats.expirations += purged as u64;
        }
    }

    fn evict_least_recent(&mut self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.access_seq)
            .map(|(key, _)| key.clone());

        match oldest {
            Some(key) => {
                self.entries.remove(&key);
                self.stats.evictions += 1;
                true
            }
            None => false,
        }
    }
}
