use crate::bcache::BCache;
use crate::policy::Policy;

/// Evicts a uniformly random node, walking the list by an index drawn from
/// a host-supplied generator. The generator is boxed so any source — a
/// `rand` RNG, a fixed test sequence, a hardware counter — can back it.
pub struct Random {
    rng: Box<dyn FnMut() -> u32>,
}

impl Random {
    pub fn new(rng: impl FnMut() -> u32 + 'static) -> Self {
        Random { rng: Box::new(rng) }
    }
}

impl<T> Policy<T> for Random {
    fn touch(&mut self, _base: &mut BCache<T>, _idx: usize) {}

    fn pop(&mut self, base: &BCache<T>) -> Option<usize> {
        let count = base.item_count();
        if count == 0 {
            return None;
        }

        let mut steps = (self.rng)() as usize % count;
        let mut cur = base.head_index();
        while steps > 0 {
            cur = cur.and_then(|idx| base.next_index(idx));
            steps -= 1;
        }
        cur
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_the_node_at_the_drawn_offset() {
        let mut base: BCache<i32> = BCache::new();
        base.insert(b"a".to_vec(), 1, 1).unwrap();
        base.insert(b"b".to_vec(), 2, 1).unwrap();
        base.insert(b"c".to_vec(), 3, 1).unwrap();

        let mut policy = Random::new(|| 2);
        let idx = Policy::<i32>::pop(&mut policy, &base).unwrap();
        assert_eq!(base.key(idx), Some(b"c".as_slice()));
    }

    #[test]
    fn empty_container_has_no_victim() {
        let base: BCache<i32> = BCache::new();
        let mut policy = Random::new(|| 0);
        assert!(Policy::<i32>::pop(&mut policy, &base).is_none());
    }
}
