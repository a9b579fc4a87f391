use std::io::Cursor;

use log::debug;

/// Fixed-capacity bloom filter over file names.
///
/// No false negatives: once a key is added, `check` returns true for it
/// forever. Absence is probabilistic; the false-positive rate grows with the
/// number of keys added relative to `size` and is an accepted trade-off.
/// There is no removal and no resize.
pub struct BloomFilter {
    size: usize,
    hash_count: u32,
    bits: Vec<u64>,
}

impl BloomFilter {
    /// Create a filter with `size` bits and `hash_count` probe functions.
    pub fn new(size: usize, hash_count: u32) -> Self {
        let size = size.max(1);
        let words = size.div_ceil(64);
        Self {
            size,
            hash_count: hash_count.max(1),
            bits: vec![0u64; words],
        }
    }

    /// Probe position for hash function `i`, seeded murmur3 like the
    /// classic `hash(key, i) mod size` construction.
    fn position(&self, key: &str, i: u32) -> usize {
        let mut cursor = Cursor::new(key.as_bytes());
        let hash = murmur3::murmur3_x64_128(&mut cursor, i).unwrap_or(0);
        (hash % self.size as u128) as usize
    }

    pub fn add(&mut self, key: &str) {
        for i in 0..self.hash_count {
            let pos = self.position(key, i);
            self.bits[pos / 64] |= 1u64 << (pos % 64);
        }
        debug!("Indexed key in bloom filter: {}", key);
    }

    pub fn check(&self, key: &str) -> bool {
        (0..self.hash_count).all(|i| {
            let pos = self.position(key, i);
            self.bits[pos / 64] & (1u64 << (pos % 64)) != 0
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    /// Analytic false-positive estimate after `items` insertions:
    /// (1 - e^(-k*n/m))^k. Used for logging at seed time.
    pub fn false_positive_rate(&self, items: usize) -> f64 {
        let k = self.hash_count as f64;
        let exponent = -k * items as f64 / self.size as f64;
        (1.0 - exponent.exp()).powf(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_keys_are_always_present() {
        let mut filter = BloomFilter::new(5000, 7);
        let keys: Vec<String> = (0..200).map(|i| format!("file_{}.txt", i)).collect();

        for key in &keys {
            filter.add(key);
        }
        for key in &keys {
            assert!(filter.check(key), "no false negatives allowed: {}", key);
        }
    }

    #[test]
    fn empty_filter_reports_nothing() {
        let filter = BloomFilter::new(5000, 7);
        assert!(!filter.check("anything.txt"));
    }

    #[test]
    fn false_positive_rate_is_bounded() {
        let mut filter = BloomFilter::new(5000, 7);
        for i in 0..100 {
            filter.add(&format!("present_{}", i));
        }

        let trials = 10_000;
        let hits = (0..trials)
            .filter(|i| filter.check(&format!("absent_{}", i)))
            .count();
        let observed = hits as f64 / trials as f64;
        let expected = filter.false_positive_rate(100);

        // Loose statistical bound: observed rate within 5x of the estimate
        // plus a small absolute floor.
        assert!(
            observed <= expected * 5.0 + 0.01,
            "observed fp rate {} far above estimate {}",
            observed,
            expected
        );
    }

    #[test]
    fn probes_are_deterministic() {
        let mut a = BloomFilter::new(1024, 4);
        let mut b = BloomFilter::new(1024, 4);
        a.add("same.txt");
        b.add("same.txt");
        assert_eq!(a.bits, b.bits);
    }

    #[test]
    fn estimate_grows_with_load() {
        let filter = BloomFilter::new(5000, 7);
        assert!(filter.false_positive_rate(100) < filter.false_positive_rate(1000));
    }
}
