//! Arena-backed, hash-indexed doubly linked list.
//!
//! `BCache<T>` is the node container every eviction policy and the TTL
//! sweep walk operate on. It owns no time, policy, or free-hook concerns of
//! its own; it just keeps a key -> node index map in sync with a head-to-tail
//! list and hands indices back to the caller. Nodes live in a `Vec<Option<Node<T>>>`
//! slab with a free list, so removal never shifts other nodes' indices and
//! never touches a raw pointer.

use std::rc::Rc;

use ahash::RandomState;
use hashbrown::HashMap;

struct Node<T> {
    key: Rc<[u8]>,
    value: T,
    byte_size: i64,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ownership handed back to the caller when a node leaves the container.
pub struct RemovedNode<T> {
    pub key: Vec<u8>,
    pub value: T,
    pub byte_size: i64,
}

/// Hash-indexed doubly linked list of `T` keyed by an opaque byte string.
pub struct BCache<T> {
    map: HashMap<Rc<[u8]>, usize, RandomState>,
    nodes: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    item_count: usize,
    total_bytes: i64,
}

impl<T> BCache<T> {
    pub fn new() -> Self {
        BCache {
            map: HashMap::with_hasher(RandomState::new()),
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            item_count: 0,
            total_bytes: 0,
        }
    }

    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn total_bytes(&self) -> i64 {
        self.total_bytes
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    pub fn get(&self, key: &[u8]) -> Option<usize> {
        self.map.get(key).copied()
    }

    pub fn key(&self, idx: usize) -> Option<&[u8]> {
        self.nodes.get(idx)?.as_ref().map(|n| n.key.as_ref())
    }

    pub fn value(&self, idx: usize) -> Option<&T> {
        self.nodes.get(idx)?.as_ref().map(|n| &n.value)
    }

    pub fn value_mut(&mut self, idx: usize) -> Option<&mut T> {
        self.nodes.get_mut(idx)?.as_mut().map(|n| &mut n.value)
    }

    pub fn byte_size(&self, idx: usize) -> Option<i64> {
        self.nodes.get(idx)?.as_ref().map(|n| n.byte_size)
    }

    pub fn head_index(&self) -> Option<usize> {
        self.head
    }

    pub fn tail_index(&self) -> Option<usize> {
        self.tail
    }

    pub fn next_index(&self, idx: usize) -> Option<usize> {
        self.nodes.get(idx)?.as_ref().and_then(|n| n.next)
    }

    pub fn prev_index(&self, idx: usize) -> Option<usize> {
        self.nodes.get(idx)?.as_ref().and_then(|n| n.prev)
    }

    /// Inserts a new node at the tail. Fails, returning the key and value
    /// back to the caller, if the key is already present.
    pub fn insert(&mut self, key: Vec<u8>, value: T, byte_size: i64) -> Result<usize, (Vec<u8>, T)> {
        if self.map.contains_key(key.as_slice()) {
            return Err((key, value));
        }

        let key: Rc<[u8]> = Rc::from(key.into_boxed_slice());
        let idx = self.alloc_slot(Node {
            key: Rc::clone(&key),
            value,
            byte_size,
            prev: None,
            next: None,
        });

        self.link_back(idx);
        self.map.insert(key, idx);
        self.item_count += 1;
        self.total_bytes += byte_size;
        Ok(idx)
    }

    /// Detaches and returns the node at `idx`, if any.
    pub fn remove(&mut self, idx: usize) -> Option<RemovedNode<T>> {
        let node = self.nodes.get_mut(idx)?.take()?;
        self.unlink(idx, node.prev, node.next);
        self.map.remove(node.key.as_ref());
        self.free.push(idx);
        self.item_count -= 1;
        self.total_bytes -= node.byte_size;
        let key = Rc::try_unwrap(node.key)
            .map(Vec::from)
            .unwrap_or_else(|rc| rc.to_vec());
        Some(RemovedNode {
            key,
            value: node.value,
            byte_size: node.byte_size,
        })
    }

    pub fn remove_by_key(&mut self, key: &[u8]) -> Option<RemovedNode<T>> {
        let idx = self.get(key)?;
        self.remove(idx)
    }

    pub fn pop_front(&mut self) -> Option<RemovedNode<T>> {
        let idx = self.head?;
        self.remove(idx)
    }

    pub fn pop_back(&mut self) -> Option<RemovedNode<T>> {
        let idx = self.tail?;
        self.remove(idx)
    }

    /// Moves `idx` to the tail (most-recently-used end) without touching its
    /// value or counters.
    pub fn move_back(&mut self, idx: usize) {
        let Some((prev, next)) = self.nodes.get(idx).and_then(|n| n.as_ref()).map(|n| (n.prev, n.next)) else {
            return;
        };
        if self.tail == Some(idx) {
            return;
        }
        self.unlink(idx, prev, next);
        self.link_back(idx);
    }

    /// Moves `idx` to the head, mirroring `move_back` for policies that
    /// evict from the opposite end of their own choosing.
    pub fn move_front(&mut self, idx: usize) {
        let Some((prev, next)) = self.nodes.get(idx).and_then(|n| n.as_ref()).map(|n| (n.prev, n.next)) else {
            return;
        };
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx, prev, next);
        self.link_front(idx);
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.map.clear();
        self.head = None;
        self.tail = None;
        self.item_count = 0;
        self.total_bytes = 0;
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            base: self,
            next: self.head,
        }
    }

    fn alloc_slot(&mut self, node: Node<T>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn unlink(&mut self, idx: usize, prev: Option<usize>, next: Option<usize>) {
        match prev {
            Some(p) => self.nodes[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
    }

    fn link_back(&mut self, idx: usize) {
        let old_tail = self.tail;
        if let Some(node) = self.nodes[idx].as_mut() {
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail {
            Some(t) => self.nodes[t].as_mut().unwrap().next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    fn link_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.nodes[idx].as_mut() {
            node.next = old_head;
            node.prev = None;
        }
        match old_head {
            Some(h) => self.nodes[h].as_mut().unwrap().prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }
}

impl<T> Default for BCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, T> {
    base: &'a BCache<T>,
    next: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (&'a [u8], &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.next?;
        let node = self.base.nodes[idx].as_ref()?;
        self.next = node.next;
        Some((node.key.as_ref(), &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let mut cache: BCache<i32> = BCache::new();
        let idx = cache.insert(b"a".to_vec(), 1, 10).unwrap();
        assert_eq!(cache.value(idx), Some(&1));
        assert_eq!(cache.item_count(), 1);
        assert_eq!(cache.total_bytes(), 10);
    }

    #[test]
    fn duplicate_insert_returns_ownership() {
        let mut cache: BCache<i32> = BCache::new();
        cache.insert(b"a".to_vec(), 1, 10).unwrap();
        let err = cache.insert(b"a".to_vec(), 2, 20).unwrap_err();
        assert_eq!(err.0, b"a".to_vec());
        assert_eq!(err.1, 2);
        assert_eq!(cache.item_count(), 1);
    }

    #[test]
    fn remove_detaches_and_reindexes() {
        let mut cache: BCache<i32> = BCache::new();
        cache.insert(b"a".to_vec(), 1, 1).unwrap();
        let idx_b = cache.insert(b"b".to_vec(), 2, 1).unwrap();
        cache.insert(b"c".to_vec(), 3, 1).unwrap();

        let removed = cache.remove(idx_b).unwrap();
        assert_eq!(removed.key, b"b".to_vec());
        assert_eq!(removed.value, 2);
        assert!(!cache.contains_key(b"b"));
        assert_eq!(cache.item_count(), 2);

        let order: Vec<_> = cache.iter().map(|(k, _)| k.to_vec()).collect();
        assert_eq!(order, vec![b"a".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn freed_slots_are_reused() {
        let mut cache: BCache<i32> = BCache::new();
        let idx_a = cache.insert(b"a".to_vec(), 1, 1).unwrap();
        cache.remove(idx_a).unwrap();
        let idx_b = cache.insert(b"b".to_vec(), 2, 1).unwrap();
        assert_eq!(idx_a, idx_b);
    }

    #[test]
    fn move_back_reorders_without_changing_counts() {
        let mut cache: BCache<i32> = BCache::new();
        let idx_a = cache.insert(b"a".to_vec(), 1, 1).unwrap();
        cache.insert(b"b".to_vec(), 2, 1).unwrap();
        cache.move_back(idx_a);
        let order: Vec<_> = cache.iter().map(|(k, _)| k.to_vec()).collect();
        assert_eq!(order, vec![b"b".to_vec(), b"a".to_vec()]);
        assert_eq!(cache.item_count(), 2);
    }

    #[test]
    fn pop_front_and_back_follow_list_order() {
        let mut cache: BCache<i32> = BCache::new();
        cache.insert(b"a".to_vec(), 1, 1).unwrap();
        cache.insert(b"b".to_vec(), 2, 1).unwrap();
        cache.insert(b"c".to_vec(), 3, 1).unwrap();

        let front = cache.pop_front().unwrap();
        assert_eq!(front.key, b"a".to_vec());
        let back = cache.pop_back().unwrap();
        assert_eq!(back.key, b"c".to_vec());
        assert_eq!(cache.item_count(), 1);
    }
}
