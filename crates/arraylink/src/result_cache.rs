//! Bounded reverse-lookup cache with SIEVE eviction.
//!
//! Maps a key to the id of whatever owns it (a snapshot to the client group
//! it is mapped into, say). Entries are hints: callers check a hit against
//! the array before trusting it and drop it when the check fails.
//!
//! # Eviction
//!
//! SIEVE keeps a `visited` bit per slot and a hand that sweeps the slots in
//! order:
//!
//! - a hit sets the slot's bit;
//! - when a new key arrives and the cache is full, the hand clears set bits
//!   as it passes them and evicts the first slot whose bit is already clear.
//!
//! Eviction is deterministic for a given sequence of operations and every
//! operation is O(1) amortized.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Thread-safe bounded cache; last write wins per key.
#[derive(Debug)]
pub struct ResultCache<K, V> {
    inner: Mutex<Sieve<K, V>>,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + PartialEq,
{
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(Sieve::new(capacity)),
        }
    }

    /// Returns the cached value for `key`.
    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    /// Caches `value` for `key`, evicting another entry if full.
    pub fn put(&self, key: K, value: V) {
        self.lock().insert(key, value);
    }

    /// Drops `key`, returning what was cached.
    pub fn invalidate(&self, key: &K) -> Option<V> {
        self.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().slots.len()
    }

    /// Looks `key` up, trusting a cached value only if `verify` confirms it.
    ///
    /// A cached value that fails verification is invalidated. On a miss (or
    /// after invalidating) `scan` finds the value the slow way; whatever it
    /// finds is cached.
    pub async fn resolve<Verify, VerifyFut, Scan, ScanFut, E>(
        &self,
        key: &K,
        verify: Verify,
        scan: Scan,
    ) -> Result<Option<V>, E>
    where
        Verify: FnOnce(V) -> VerifyFut,
        VerifyFut: Future<Output = Result<bool, E>>,
        Scan: FnOnce() -> ScanFut,
        ScanFut: Future<Output = Result<Option<V>, E>>,
    {
        if let Some(cached) = self.get(key) {
            if verify(cached.clone()).await? {
                debug!("cache hit");
                return Ok(Some(cached));
            }
            debug!("cached entry is stale; invalidating");
            self.invalidate_if(key, &cached);
        } else {
            debug!("cache miss");
        }

        let found = scan().await?;
        if let Some(value) = &found {
            self.put(key.clone(), value.clone());
        }
        Ok(found)
    }

    /// Drops `key` only if it still maps to `stale`, so a fresher concurrent
    /// write survives.
    fn invalidate_if(&self, key: &K, stale: &V) {
        let mut inner = self.lock();
        if inner.peek(key) == Some(stale) {
            inner.remove(key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Sieve<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct Slot<K, V> {
    key: K,
    value: V,
    visited: bool,
}

#[derive(Debug)]
struct Sieve<K, V> {
    slots: Vec<Option<Slot<K, V>>>,
    index: HashMap<K, usize>,
    /// Slots emptied by `remove`, reused before any eviction.
    free: Vec<usize>,
    hand: usize,
    len: usize,
}

impl<K, V> Sieve<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new(capacity: NonZeroUsize) -> Self {
        let capacity = capacity.get();
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            index: HashMap::with_capacity(capacity),
            free: (0..capacity).rev().collect(),
            hand: 0,
            len: 0,
        }
    }

    fn get(&mut self, key: &K) -> Option<&V> {
        let &at = self.index.get(key)?;
        let slot = self.slots[at].as_mut()?;
        slot.visited = true;
        Some(&slot.value)
    }

    fn peek(&self, key: &K) -> Option<&V> {
        let &at = self.index.get(key)?;
        self.slots[at].as_ref().map(|slot| &slot.value)
    }

    fn insert(&mut self, key: K, value: V) {
        if let Some(&at) = self.index.get(&key) {
            if let Some(slot) = self.slots[at].as_mut() {
                slot.value = value;
                slot.visited = true;
                return;
            }
        }

        let at = match self.free.pop() {
            Some(at) => {
                self.len += 1;
                at
            }
            None => self.evict(),
        };

        self.index.insert(key.clone(), at);
        self.slots[at] = Some(Slot {
            key,
            value,
            visited: false,
        });
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let at = self.index.remove(key)?;
        let slot = self.slots[at].take()?;
        self.free.push(at);
        self.len -= 1;
        Some(slot.value)
    }

    /// Frees the slot under the hand's first clear bit and returns it.
    /// Only called when every slot is occupied.
    fn evict(&mut self) -> usize {
        let capacity = self.slots.len();
        loop {
            let at = self.hand;
            self.hand = (self.hand + 1) % capacity;

            match self.slots[at].as_mut() {
                Some(slot) if slot.visited => slot.visited = false,
                Some(slot) => {
                    self.index.remove(&slot.key);
                    self.slots[at] = None;
                    return at;
                }
                None => return at,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cache(capacity: usize) -> ResultCache<&'static str, u32> {
        ResultCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn put_get_invalidate() {
        let cache = cache(3);
        cache.put("snap-1", 10);

        assert_eq!(cache.get(&"snap-1"), Some(10));
        assert_eq!(cache.invalidate(&"snap-1"), Some(10));
        assert_eq!(cache.get(&"snap-1"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn last_write_wins() {
        let cache = cache(2);
        cache.put("snap-1", 1);
        cache.put("snap-1", 2);

        assert_eq!(cache.get(&"snap-1"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn eviction_spares_visited_entries() {
        let cache = cache(3);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);
        cache.get(&"a");
        cache.get(&"c");

        cache.put("d", 4);

        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"c"), Some(3));
        assert_eq!(cache.get(&"d"), Some(4));
    }

    #[test]
    fn all_visited_still_evicts_one() {
        let cache = cache(2);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.get(&"a");
        cache.get(&"b");

        cache.put("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn removed_slot_is_reused_before_evicting() {
        let cache = cache(2);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.invalidate(&"a");

        cache.put("c", 3);

        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[tokio::test]
    async fn resolve_trusts_verified_hit() {
        let cache = cache(4);
        cache.put("snap-1", 7);

        let found = cache
            .resolve(
                &"snap-1",
                |owner| async move { Ok::<_, ()>(owner == 7) },
                || async { Err(()) },
            )
            .await;

        assert_eq!(found, Ok(Some(7)));
    }

    #[tokio::test]
    async fn resolve_replaces_stale_hit() {
        let cache = cache(4);
        cache.put("snap-1", 7);

        let found = cache
            .resolve(
                &"snap-1",
                |_| async { Ok::<_, ()>(false) },
                || async { Ok(Some(9)) },
            )
            .await;

        assert_eq!(found, Ok(Some(9)));
        assert_eq!(cache.get(&"snap-1"), Some(9));
    }

    #[tokio::test]
    async fn resolve_miss_without_result_caches_nothing() {
        let cache = cache(4);
        cache.put("snap-1", 7);

        let found = cache
            .resolve(
                &"snap-1",
                |_| async { Ok::<_, ()>(false) },
                || async { Ok(None) },
            )
            .await;

        assert_eq!(found, Ok(None));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn resolve_propagates_scan_errors() {
        let cache = cache(4);

        let found = cache
            .resolve(
                &"snap-1",
                |_| async { Ok(true) },
                || async { Err("array unreachable") },
            )
            .await;

        assert_eq!(found, Err("array unreachable"));
        assert!(cache.is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Put(u8, u32),
        Get(u8),
        Invalidate(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..16, any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
            (0u8..16).prop_map(Op::Get),
            (0u8..16).prop_map(Op::Invalidate),
        ]
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity_and_put_is_readable(
            capacity in 1usize..8,
            ops in prop::collection::vec(op(), 0..200),
        ) {
            let cache: ResultCache<u8, u32> =
                ResultCache::new(NonZeroUsize::new(capacity).unwrap());

            for op in ops {
                match op {
                    Op::Put(k, v) => {
                        cache.put(k, v);
                        prop_assert_eq!(cache.get(&k), Some(v));
                    }
                    Op::Get(k) => {
                        cache.get(&k);
                    }
                    Op::Invalidate(k) => {
                        cache.invalidate(&k);
                        prop_assert_eq!(cache.get(&k), None);
                    }
                }
                prop_assert!(cache.len() <= capacity);
            }
        }
    }
}
