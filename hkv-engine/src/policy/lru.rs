use crate::bcache::BCache;
use crate::policy::Policy;

/// Evicts the least recently used node; `touch` moves the accessed node to
/// the tail, so the head is always the coldest entry.
#[derive(Debug, Default)]
pub struct Lru;

impl<T> Policy<T> for Lru {
    fn touch(&mut self, base: &mut BCache<T>, idx: usize) {
        base.move_back(idx);
    }

    fn pop(&mut self, base: &BCache<T>) -> Option<usize> {
        base.head_index()
    }
}
