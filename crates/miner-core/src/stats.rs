//! Live mining statistics.

use alloc::string::String;

use crate::hash::hash_to_display_hex;
use crate::pow::PowResult;

/// Cumulative statistics for the active template.
///
/// Counters only grow; they are zeroed on address change, network change or
/// template rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Total hashes computed.
    pub total_hashes: u64,
    /// Number of shares found (blocks included).
    pub shares_found: u32,
    /// Leading zero bits of the best hash so far.
    pub best_leading_zeros: u8,
    /// Best hash so far, internal byte order.
    pub best_hash: Option<[u8; 32]>,
    /// Last swung nonce, or the auto-mining cursor.
    pub current_nonce: u32,
    /// Set once the auto-mining cursor has wrapped past `u32::MAX`.
    pub nonce_space_exhausted: bool,
    /// Full passes over the nonce space.
    pub cycles_completed: u32,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a search result into the counters.
    pub(crate) fn record(&mut self, result: &PowResult) {
        self.total_hashes += result.hashes_computed;
        if result.share_found() {
            self.shares_found += 1;
        }
        if result.hashes_computed == 0 {
            return;
        }

        let improves = match self.best_hash {
            None => true,
            Some(_) => result.leading_zero_bits > self.best_leading_zeros,
        };
        if improves {
            self.best_hash = Some(result.hash);
            self.best_leading_zeros = result.leading_zero_bits;
        }
    }

    /// Best hash in display order.
    pub fn best_hash_hex(&self) -> Option<String> {
        self.best_hash.as_ref().map(hash_to_display_hex)
    }
}

/// Format a hash rate for display, e.g. "1.23 MH/s".
pub fn format_hash_rate(hashes_per_second: f64) -> String {
    if hashes_per_second >= 1e9 {
        alloc::format!("{:.2} GH/s", hashes_per_second / 1e9)
    } else if hashes_per_second >= 1e6 {
        alloc::format!("{:.2} MH/s", hashes_per_second / 1e6)
    } else if hashes_per_second >= 1e3 {
        alloc::format!("{:.2} KH/s", hashes_per_second / 1e3)
    } else {
        alloc::format!("{:.2} H/s", hashes_per_second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::Classification;

    fn result(zeros: u8, classification: Classification, hashes: u64) -> PowResult {
        let mut hash = [0xffu8; 32];
        hash[31] = 0xff >> zeros.min(7);
        PowResult {
            hash,
            nonce: 0,
            leading_zero_bits: zeros,
            classification,
            hashes_computed: hashes,
        }
    }

    #[test]
    fn test_record_accumulates() {
        let mut stats = Stats::new();
        stats.record(&result(2, Classification::None, 100));
        stats.record(&result(9, Classification::Share, 50));
        stats.record(&result(4, Classification::None, 10));

        assert_eq!(stats.total_hashes, 160);
        assert_eq!(stats.shares_found, 1);
        assert_eq!(stats.best_leading_zeros, 9);
    }

    #[test]
    fn test_first_result_sets_best() {
        let mut stats = Stats::new();
        stats.record(&result(0, Classification::None, 1));
        assert!(stats.best_hash.is_some());
        assert_eq!(stats.best_hash_hex().unwrap().len(), 64);
    }

    #[test]
    fn test_empty_batch_does_not_set_best() {
        let mut stats = Stats::new();
        stats.record(&result(0, Classification::None, 0));
        assert!(stats.best_hash.is_none());
    }

    #[test]
    fn test_format_hash_rate() {
        assert_eq!(format_hash_rate(12.0), "12.00 H/s");
        assert_eq!(format_hash_rate(1_500.0), "1.50 KH/s");
        assert_eq!(format_hash_rate(2_340_000.0), "2.34 MH/s");
        assert_eq!(format_hash_rate(5e9), "5.00 GH/s");
    }
}
