use std::collections::{HashSet, VecDeque};

/// Bounded LRU set of request IDs this node has already handled or relayed.
///
/// Dropping duplicates here is what keeps a flooded query from circulating
/// forever in a topology with a cycle.
pub struct SeenRequests {
    capacity: usize,
    order: VecDeque<u64>,
    set: HashSet<u64>,
}

impl SeenRequests {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            set: HashSet::new(),
        }
    }

    /// Record `id`. Returns false if it was already present (a duplicate
    /// that must be dropped instead of re-relayed).
    pub fn insert(&mut self, id: u64) -> bool {
        if !self.set.insert(id) {
            return false;
        }
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }

    pub fn contains(&self, id: u64) -> bool {
        self.set.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_insert_accepts_duplicate_rejects() {
        let mut seen = SeenRequests::new(16);
        assert!(seen.insert(42));
        assert!(!seen.insert(42));
        assert!(seen.contains(42));
    }

    #[test]
    fn eviction_keeps_the_set_bounded() {
        let mut seen = SeenRequests::new(4);
        for id in 0..10u64 {
            assert!(seen.insert(id));
        }
        assert_eq!(seen.len(), 4);
        // Oldest entries were evicted, newest survive.
        assert!(!seen.contains(0));
        assert!(seen.contains(9));
        // An evicted id can be re-inserted.
        assert!(seen.insert(0));
    }
}
