//! TTL-aware, capacity-bounded cache built on top of [`BCache`].
//!
//! `FlexCache` adds everything `BCache` deliberately doesn't know about:
//! expiry, item/byte limits, pluggable eviction, and the copy/free/on-delete
//! hooks a host can use to track its own resources (refcounts, external
//! allocations) as entries move through the cache.

use hkv_common::{Clock, HkvError, HkvResult};

use crate::bcache::BCache;
use crate::entry::Entry;
use crate::policy::Policy;

/// Host-supplied copy/free pair for keys.
///
/// `copy` is called once per insert to produce the bytes the cache will own;
/// returning `None` aborts the insert (see [`HkvError::HookRejected`]).
/// `free` is called exactly once, when the corresponding node leaves the
/// cache via delete, eviction, expiry, or `destroy`.
pub struct KeyHooks {
    pub copy: Box<dyn FnMut(&[u8]) -> Option<Vec<u8>>>,
    pub free: Box<dyn FnMut(Vec<u8>)>,
}

/// Host-supplied copy/free pair for values. See [`KeyHooks`].
pub struct ValueHooks<V> {
    pub copy: Box<dyn FnMut(&V) -> Option<V>>,
    pub free: Box<dyn FnMut(V)>,
}

type OnDeleteFn<V> = Box<dyn FnMut(&[u8], &V, i64)>;

/// Builder for a [`FlexCache`].
///
/// Every field has a zero-ish default matching an unbounded, unmanaged
/// cache: no item or byte ceiling, no sweep, no hooks, no policy (which, per
/// [`FlexCache::enforce_limits`], means limits configured without a policy
/// are silently unenforceable rather than a panic).
pub struct FlexCacheConfig<V, C: Clock> {
    clock: C,
    item_max: usize,
    byte_max: i64,
    scan_interval_ms: u64,
    key_hooks: Option<KeyHooks>,
    value_hooks: Option<ValueHooks<V>>,
    on_delete: Option<OnDeleteFn<V>>,
    policy: Option<Box<dyn Policy<Entry<V>>>>,
}

impl<V, C: Clock> FlexCacheConfig<V, C> {
    pub fn new(clock: C) -> Self {
        FlexCacheConfig {
            clock,
            item_max: 0,
            byte_max: 0,
            scan_interval_ms: 0,
            key_hooks: None,
            value_hooks: None,
            on_delete: None,
            policy: None,
        }
    }

    /// Maximum number of items to retain. `0` means unbounded.
    pub fn item_max(mut self, item_max: usize) -> Self {
        self.item_max = item_max;
        self
    }

    /// Maximum total byte size to retain, summed from the `byte_size` given
    /// to each insert. `0` means unbounded.
    pub fn byte_max(mut self, byte_max: i64) -> Self {
        self.byte_max = byte_max;
        self
    }

    /// Minimum spacing between automatic sweeps triggered through
    /// [`FlexCache::maybe_scan_and_clean`]. `0` means every call sweeps.
    pub fn scan_interval_ms(mut self, scan_interval_ms: u64) -> Self {
        self.scan_interval_ms = scan_interval_ms;
        self
    }

    pub fn key_hooks(mut self, hooks: KeyHooks) -> Self {
        self.key_hooks = Some(hooks);
        self
    }

    pub fn value_hooks(mut self, hooks: ValueHooks<V>) -> Self {
        self.value_hooks = Some(hooks);
        self
    }

    /// Registers a callback fired once per node, after the node is chosen
    /// for removal but before it is detached — see
    /// [`FlexCache::delete_node`] for the exact ordering guarantee.
    pub fn on_delete(mut self, on_delete: impl FnMut(&[u8], &V, i64) + 'static) -> Self {
        self.on_delete = Some(Box::new(on_delete));
        self
    }

    pub fn policy(mut self, policy: impl Policy<Entry<V>> + 'static) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    pub fn build(self) -> FlexCache<V, C> {
        FlexCache {
            base: BCache::new(),
            clock: self.clock,
            item_max: self.item_max,
            byte_max: self.byte_max,
            scan_interval_ms: self.scan_interval_ms,
            last_scan_ms: 0,
            key_hooks: self.key_hooks,
            value_hooks: self.value_hooks,
            on_delete: self.on_delete,
            policy: self.policy,
        }
    }
}

/// TTL-aware cache with optional item/byte limits and pluggable eviction.
pub struct FlexCache<V, C: Clock> {
    base: BCache<Entry<V>>,
    clock: C,
    item_max: usize,
    byte_max: i64,
    scan_interval_ms: u64,
    last_scan_ms: u64,
    key_hooks: Option<KeyHooks>,
    value_hooks: Option<ValueHooks<V>>,
    on_delete: Option<OnDeleteFn<V>>,
    policy: Option<Box<dyn Policy<Entry<V>>>>,
}

impl<V, C: Clock> FlexCache<V, C> {
    /// Inserts `key` -> `value`. `byte_size` is an opaque accounting weight
    /// the caller chooses (it need not equal `value`'s actual size); it only
    /// feeds the byte-limit check.
    ///
    /// `ttl_ms` and `expires_at_ms` are mutually exclusive: if `ttl_ms` is
    /// nonzero the entry expires `ttl_ms` milliseconds from now (saturating,
    /// never wrapping); otherwise if `expires_at_ms` is nonzero it is taken
    /// as an absolute expiry; otherwise the entry never expires.
    pub fn insert(
        &mut self,
        key: &[u8],
        value: V,
        byte_size: i64,
        ttl_ms: u64,
        expires_at_ms: u64,
    ) -> HkvResult<()> {
        if key.is_empty() {
            return Err(HkvError::InvalidArgument { reason: "empty key" });
        }
        if byte_size < 0 {
            return Err(HkvError::InvalidArgument {
                reason: "negative byte size",
            });
        }

        let now_ms = self.clock.now_ms();
        let expires_at = compute_expiry(now_ms, ttl_ms, expires_at_ms);

        let stored_key = match self.key_hooks.as_mut() {
            Some(hooks) => match (hooks.copy)(key) {
                Some(k) => k,
                None => return Err(HkvError::HookRejected),
            },
            None => key.to_vec(),
        };

        let stored_value = match self.value_hooks.as_mut() {
            Some(hooks) => match (hooks.copy)(&value) {
                Some(v) => v,
                None => {
                    if let Some(hooks) = self.key_hooks.as_mut() {
                        (hooks.free)(stored_key);
                    }
                    return Err(HkvError::HookRejected);
                }
            },
            None => value,
        };

        let entry = Entry {
            value: stored_value,
            expires_at,
        };

        match self.base.insert(stored_key, entry, byte_size) {
            Ok(_idx) => {
                self.enforce_limits();
                Ok(())
            }
            Err((k, e)) => {
                tracing::trace!(key_len = k.len(), "insert rejected: duplicate key");
                if let Some(hooks) = self.key_hooks.as_mut() {
                    (hooks.free)(k);
                }
                if let Some(hooks) = self.value_hooks.as_mut() {
                    (hooks.free)(e.value);
                }
                Err(HkvError::Duplicate)
            }
        }
    }

    /// Looks up `key`, returning `None` if absent or expired. A hit moves
    /// the node according to the active policy's `touch`.
    pub fn get(&mut self, key: &[u8]) -> Option<&V> {
        let idx = self.base.get(key)?;
        let now_ms = self.clock.now_ms();
        let expired = self
            .base
            .value(idx)
            .map(|e| e.is_expired(now_ms))
            .unwrap_or(false);

        if expired {
            self.delete_node(idx);
            return None;
        }

        if let Some(policy) = self.policy.as_mut() {
            policy.touch(&mut self.base, idx);
        }

        self.base.value(idx).map(|e| &e.value)
    }

    /// Removes `key` through the full deletion pipeline. Returns `false` if
    /// the key was absent.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.base.get(key) {
            Some(idx) => {
                self.delete_node(idx);
                true
            }
            None => false,
        }
    }

    /// Unconditionally sweeps expired entries, then enforces limits.
    pub fn scan_and_clean(&mut self) {
        let now_ms = self.clock.now_ms();
        self.sweep(now_ms);
        self.enforce_limits();
    }

    /// Sweeps only if `scan_interval_ms` has elapsed since the last sweep
    /// (or on the very first call, or whenever `scan_interval_ms` is `0`).
    pub fn maybe_scan_and_clean(&mut self) {
        let now_ms = self.clock.now_ms();
        let due = self.scan_interval_ms == 0
            || self.last_scan_ms == 0
            || now_ms.saturating_sub(self.last_scan_ms) >= self.scan_interval_ms;

        if due {
            self.last_scan_ms = now_ms;
            self.sweep(now_ms);
            self.enforce_limits();
        }
    }

    /// Replaces the active eviction policy. Existing node order is left
    /// untouched; the new policy simply starts picking victims from it.
    pub fn set_policy(&mut self, policy: impl Policy<Entry<V>> + 'static) {
        self.policy = Some(Box::new(policy));
    }

    pub fn item_count(&self) -> usize {
        self.base.item_count()
    }

    pub fn total_bytes(&self) -> i64 {
        self.base.total_bytes()
    }

    /// Iterates all live entries head-to-tail, oldest-touched first for
    /// policies (like LRU) that reorder on access.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &V)> {
        self.base.iter().map(|(k, e)| (k, &e.value))
    }

    /// Removes every entry through the deletion pipeline (on-delete fires
    /// for each), leaving the cache empty.
    pub fn destroy(&mut self) {
        while let Some(idx) = self.base.head_index() {
            self.delete_node(idx);
        }
    }

    fn sweep(&mut self, now_ms: u64) {
        let mut current = self.base.head_index();
        let mut removed = 0usize;

        while let Some(idx) = current {
            let next = self.base.next_index(idx);
            let expired = self
                .base
                .value(idx)
                .map(|e| e.is_expired(now_ms))
                .unwrap_or(false);

            if expired {
                self.delete_node(idx);
                removed += 1;
            }

            current = next;
        }

        if removed > 0 {
            tracing::debug!(removed, "sweep removed expired entries");
        }
    }

    fn enforce_limits(&mut self) {
        loop {
            let over_items = self.item_max != 0 && self.base.item_count() > self.item_max;
            let over_bytes = self.byte_max != 0 && self.base.total_bytes() > self.byte_max;
            if !over_items && !over_bytes {
                break;
            }

            let victim = match self.policy.as_mut() {
                Some(policy) => policy.pop(&self.base),
                None => None,
            };

            match victim {
                Some(idx) => self.delete_node(idx),
                None => {
                    tracing::warn!(
                        item_count = self.base.item_count(),
                        total_bytes = self.base.total_bytes(),
                        "capacity exceeded but no policy victim is available; stopping"
                    );
                    break;
                }
            }
        }
    }

    /// The deletion pipeline: on-delete fires while the node is still fully
    /// resident, then the node is detached from the container, then the
    /// key/value free hooks run on the pieces that come back. This ordering
    /// is load-bearing — an `on_delete` callback that re-reads the cache
    /// must still see the node it was just told about.
    fn delete_node(&mut self, idx: usize) {
        if let Some(on_delete) = self.on_delete.as_mut() {
            if let (Some(key), Some(entry), Some(byte_size)) = (
                self.base.key(idx),
                self.base.value(idx),
                self.base.byte_size(idx),
            ) {
                on_delete(key, &entry.value, byte_size);
            }
        }

        if let Some(removed) = self.base.remove(idx) {
            if let Some(hooks) = self.key_hooks.as_mut() {
                (hooks.free)(removed.key);
            }
            if let Some(hooks) = self.value_hooks.as_mut() {
                (hooks.free)(removed.value.value);
            }
        }
    }
}

/// Computes an absolute expiry timestamp, saturating instead of wrapping on
/// overflow. `ttl_ms` takes priority over `expires_at_ms`; `0` for both
/// means "never expires".
fn compute_expiry(now_ms: u64, ttl_ms: u64, expires_at_ms: u64) -> u64 {
    if ttl_ms > 0 {
        now_ms.saturating_add(ttl_ms)
    } else {
        expires_at_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Fifo, Lru, Random};
    use hkv_common::MockClock;

    fn cache_with_policy<P: Policy<Entry<i32>> + 'static>(
        clock: MockClock,
        policy: P,
    ) -> FlexCache<i32, MockClock> {
        FlexCacheConfig::new(clock).policy(policy).build()
    }

    #[test]
    fn insert_then_get_round_trips() {
        let clock = MockClock::new(0);
        let mut cache = cache_with_policy(clock, Lru);
        cache.insert(b"a", 42, 1, 0, 0).unwrap();
        assert_eq!(cache.get(b"a"), Some(&42));
        assert_eq!(cache.item_count(), 1);
    }

    #[test]
    fn insert_rejects_empty_key() {
        let clock = MockClock::new(0);
        let mut cache = cache_with_policy(clock, Lru);
        let err = cache.insert(b"", 1, 1, 0, 0).unwrap_err();
        assert_eq!(err, HkvError::InvalidArgument { reason: "empty key" });
    }

    #[test]
    fn insert_rejects_negative_byte_size() {
        let clock = MockClock::new(0);
        let mut cache = cache_with_policy(clock, Lru);
        let err = cache.insert(b"a", 1, -1, 0, 0).unwrap_err();
        assert_eq!(
            err,
            HkvError::InvalidArgument {
                reason: "negative byte size"
            }
        );
    }

    #[test]
    fn insert_rejects_duplicate_key() {
        let clock = MockClock::new(0);
        let mut cache = cache_with_policy(clock, Lru);
        cache.insert(b"a", 1, 1, 0, 0).unwrap();
        let err = cache.insert(b"a", 2, 1, 0, 0).unwrap_err();
        assert_eq!(err, HkvError::Duplicate);
        assert_eq!(cache.get(b"a"), Some(&1));
    }

    #[test]
    fn ttl_entries_expire_on_get() {
        let clock = MockClock::new(1_000);
        let mut cache = cache_with_policy(clock.clone(), Lru);
        cache.insert(b"a", 1, 1, 500, 0).unwrap();
        assert_eq!(cache.get(b"a"), Some(&1));
        clock.advance(500);
        assert_eq!(cache.get(b"a"), None);
        assert_eq!(cache.item_count(), 0);
    }

    #[test]
    fn absolute_expiry_is_honored() {
        let clock = MockClock::new(100);
        let mut cache = cache_with_policy(clock.clone(), Lru);
        cache.insert(b"a", 1, 1, 0, 150).unwrap();
        clock.advance(49);
        assert_eq!(cache.get(b"a"), Some(&1));
        clock.advance(1);
        assert_eq!(cache.get(b"a"), None);
    }

    #[test]
    fn scan_and_clean_sweeps_expired_entries_without_a_get() {
        let clock = MockClock::new(0);
        let mut cache = cache_with_policy(clock.clone(), Lru);
        cache.insert(b"a", 1, 1, 10, 0).unwrap();
        cache.insert(b"b", 2, 1, 0, 0).unwrap();
        clock.advance(11);
        cache.scan_and_clean();
        assert_eq!(cache.item_count(), 1);
        assert_eq!(cache.get(b"b"), Some(&2));
    }

    #[test]
    fn maybe_scan_and_clean_respects_interval() {
        let clock = MockClock::new(0);
        let mut cache: FlexCache<i32, MockClock> = FlexCacheConfig::new(clock.clone())
            .policy(Lru)
            .scan_interval_ms(100)
            .build();
        cache.insert(b"a", 1, 1, 10, 0).unwrap();

        clock.advance(11);
        cache.maybe_scan_and_clean();
        assert_eq!(cache.item_count(), 1, "sweep should not have run yet");

        clock.advance(100);
        cache.maybe_scan_and_clean();
        assert_eq!(cache.item_count(), 0);
    }

    #[test]
    fn lru_evicts_least_recently_used_on_item_limit() {
        let clock = MockClock::new(0);
        let mut cache: FlexCache<i32, MockClock> = FlexCacheConfig::new(clock)
            .policy(Lru)
            .item_max(2)
            .build();

        cache.insert(b"a", 1, 1, 0, 0).unwrap();
        cache.insert(b"b", 2, 1, 0, 0).unwrap();
        cache.get(b"a");
        cache.insert(b"c", 3, 1, 0, 0).unwrap();

        assert_eq!(cache.item_count(), 2);
        assert_eq!(cache.get(b"b"), None);
        assert_eq!(cache.get(b"a"), Some(&1));
        assert_eq!(cache.get(b"c"), Some(&3));
    }

    #[test]
    fn fifo_evicts_oldest_regardless_of_access() {
        let clock = MockClock::new(0);
        let mut cache: FlexCache<i32, MockClock> = FlexCacheConfig::new(clock)
            .policy(Fifo)
            .item_max(2)
            .build();

        cache.insert(b"a", 1, 1, 0, 0).unwrap();
        cache.insert(b"b", 2, 1, 0, 0).unwrap();
        cache.get(b"a");
        cache.insert(b"c", 3, 1, 0, 0).unwrap();

        assert_eq!(cache.item_count(), 2);
        assert_eq!(cache.get(b"a"), None);
    }

    #[test]
    fn byte_limit_is_enforced_independently_of_item_count() {
        let clock = MockClock::new(0);
        let mut cache: FlexCache<i32, MockClock> = FlexCacheConfig::new(clock)
            .policy(Fifo)
            .byte_max(10)
            .build();

        cache.insert(b"a", 1, 6, 0, 0).unwrap();
        cache.insert(b"b", 2, 6, 0, 0).unwrap();

        assert_eq!(cache.item_count(), 1);
        assert!(cache.total_bytes() <= 10);
        assert_eq!(cache.get(b"b"), Some(&2));
    }

    #[test]
    fn limits_without_a_policy_are_silently_unenforced() {
        let clock = MockClock::new(0);
        let mut cache: FlexCache<i32, MockClock> =
            FlexCacheConfig::new(clock).item_max(1).build();

        cache.insert(b"a", 1, 1, 0, 0).unwrap();
        cache.insert(b"b", 2, 1, 0, 0).unwrap();

        assert_eq!(cache.item_count(), 2);
    }

    #[test]
    fn random_policy_honors_injected_source() {
        let clock = MockClock::new(0);
        let mut cache: FlexCache<i32, MockClock> = FlexCacheConfig::new(clock)
            .policy(Random::new(|| 0))
            .item_max(2)
            .build();

        cache.insert(b"a", 1, 1, 0, 0).unwrap();
        cache.insert(b"b", 2, 1, 0, 0).unwrap();
        cache.insert(b"c", 3, 1, 0, 0).unwrap();

        assert_eq!(cache.item_count(), 2);
        assert_eq!(cache.get(b"a"), None);
    }

    #[test]
    fn delete_fires_on_delete_before_value_free() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let clock = MockClock::new(0);
        let on_delete_seen: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));
        let freed: Rc<RefCell<Vec<i32>>> = Rc::new(RefCell::new(Vec::new()));

        let on_delete_log = Rc::clone(&on_delete_seen);
        let freed_log = Rc::clone(&freed);

        let mut cache: FlexCache<i32, MockClock> = FlexCacheConfig::new(clock)
            .policy(Lru)
            .on_delete(move |_key, value, _byte_size| {
                on_delete_log.borrow_mut().push(*value);
            })
            .value_hooks(ValueHooks {
                copy: Box::new(|v: &i32| Some(*v)),
                free: Box::new(move |v| freed_log.borrow_mut().push(v)),
            })
            .build();

        cache.insert(b"a", 7, 1, 0, 0).unwrap();
        assert!(cache.delete(b"a"));

        assert_eq!(*on_delete_seen.borrow(), vec![7]);
        assert_eq!(*freed.borrow(), vec![7]);
    }

    #[test]
    fn duplicate_insert_frees_the_rejected_copy_exactly_once() {
        use std::cell::Cell;
        use std::rc::Rc;

        let clock = MockClock::new(0);
        let copies = Rc::new(Cell::new(0));
        let frees = Rc::new(Cell::new(0));
        let copies_log = Rc::clone(&copies);
        let frees_log = Rc::clone(&frees);

        let mut cache: FlexCache<i32, MockClock> = FlexCacheConfig::new(clock)
            .policy(Lru)
            .value_hooks(ValueHooks {
                copy: Box::new(move |v: &i32| {
                    copies_log.set(copies_log.get() + 1);
                    Some(*v)
                }),
                free: Box::new(move |_v| frees_log.set(frees_log.get() + 1)),
            })
            .build();

        cache.insert(b"a", 1, 1, 0, 0).unwrap();
        assert_eq!(cache.insert(b"a", 2, 1, 0, 0), Err(HkvError::Duplicate));

        assert_eq!(copies.get(), 2);
        assert_eq!(frees.get(), 1, "the rejected duplicate's copy must be freed");
    }

    #[test]
    fn destroy_empties_the_cache_and_fires_on_delete_for_every_entry() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let clock = MockClock::new(0);
        let seen: Rc<RefCell<Vec<Vec<u8>>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_log = Rc::clone(&seen);

        let mut cache: FlexCache<i32, MockClock> = FlexCacheConfig::new(clock)
            .policy(Lru)
            .on_delete(move |key, _value, _byte_size| {
                seen_log.borrow_mut().push(key.to_vec());
            })
            .build();

        cache.insert(b"a", 1, 1, 0, 0).unwrap();
        cache.insert(b"b", 2, 1, 0, 0).unwrap();
        cache.insert(b"c", 3, 1, 0, 0).unwrap();

        cache.destroy();

        assert_eq!(cache.item_count(), 0);
        assert_eq!(cache.total_bytes(), 0);
        assert_eq!(
            *seen.borrow(),
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]
        );
    }

    #[test]
    fn iter_walks_head_to_tail() {
        let clock = MockClock::new(0);
        let mut cache = cache_with_policy(clock, Fifo);
        cache.insert(b"a", 1, 1, 0, 0).unwrap();
        cache.insert(b"b", 2, 1, 0, 0).unwrap();
        cache.insert(b"c", 3, 1, 0, 0).unwrap();

        let collected: Vec<_> = cache.iter().map(|(k, v)| (k.to_vec(), *v)).collect();
        assert_eq!(
            collected,
            vec![(b"a".to_vec(), 1), (b"b".to_vec(), 2), (b"c".to_vec(), 3)]
        );
    }
}
