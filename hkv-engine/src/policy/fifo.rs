use crate::bcache::BCache;
use crate::policy::Policy;

/// Evicts nodes in insertion order; access never changes eviction order.
#[derive(Debug, Default)]
pub struct Fifo;

impl<T> Policy<T> for Fifo {
    fn touch(&mut self, _base: &mut BCache<T>, _idx: usize) {}

    fn pop(&mut self, base: &BCache<T>) -> Option<usize> {
        base.head_index()
    }
}
