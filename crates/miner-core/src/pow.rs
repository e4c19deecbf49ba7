//! Nonce search over a block template.
//!
//! Every entry point is pure and bounded: the same `(template, nonce)` always
//! produces the same [`PowResult`].

use crate::block::BlockTemplate;
use crate::difficulty::{leading_zero_bits, SHARE_THRESHOLD_BITS};
use crate::hash::double_sha256;

/// Terminal classification of a search. A result carries exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Classification {
    None,
    Share,
    Block,
}

/// Outcome of a single hash or a batch.
///
/// For a batch, `hash`/`nonce` identify the reported candidate: the first
/// block, otherwise the best share, otherwise the best hash seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowResult {
    pub hash: [u8; 32],
    pub nonce: u32,
    pub leading_zero_bits: u8,
    pub classification: Classification,
    pub hashes_computed: u64,
}

impl PowResult {
    /// A block implies a share.
    pub fn share_found(&self) -> bool {
        self.classification >= Classification::Share
    }

    pub fn block_found(&self) -> bool {
        self.classification == Classification::Block
    }
}

/// Double-SHA256 of the template's header at `nonce`.
pub fn hash_at(template: &BlockTemplate, nonce: u32) -> [u8; 32] {
    double_sha256(&template.header(nonce).serialize())
}

/// Hash and classify a single nonce.
pub fn search_one(template: &BlockTemplate, nonce: u32) -> PowResult {
    classify(template, hash_at(template, nonce), nonce, 1)
}

/// Search `count` nonces starting at `start_nonce` in increasing order.
///
/// Returns the first block-level result if any, else the best share, else the
/// best non-qualifying hash. The batch stops early after nonce `u32::MAX`;
/// `hashes_computed` reports how many nonces were actually hashed.
pub fn search_batch(template: &BlockTemplate, start_nonce: u32, count: u32) -> PowResult {
    let mut header = [0u8; 80];
    header[..76].copy_from_slice(&template.header(start_nonce).serialize_without_nonce());

    let mut best: Option<PowResult> = None;
    let mut hashed: u64 = 0;

    let end = start_nonce as u64 + count as u64;
    for nonce in (start_nonce as u64..end.min(1u64 << 32)).map(|n| n as u32) {
        header[76..].copy_from_slice(&nonce.to_le_bytes());
        let hash = double_sha256(&header);
        hashed += 1;

        let candidate = classify(template, hash, nonce, 0);
        if candidate.block_found() {
            return PowResult { hashes_computed: hashed, ..candidate };
        }

        let better = match &best {
            None => true,
            Some(current) => candidate.leading_zero_bits > current.leading_zero_bits,
        };
        if better {
            best = Some(candidate);
        }
    }

    match best {
        Some(result) => PowResult { hashes_computed: hashed, ..result },
        // count was zero
        None => PowResult {
            hash: [0xff; 32],
            nonce: start_nonce,
            leading_zero_bits: 0,
            classification: Classification::None,
            hashes_computed: 0,
        },
    }
}

fn classify(template: &BlockTemplate, hash: [u8; 32], nonce: u32, hashes_computed: u64) -> PowResult {
    let zeros = leading_zero_bits(&hash);
    let classification = if template.target.is_met_by(&hash) {
        Classification::Block
    } else if zeros >= SHARE_THRESHOLD_BITS {
        Classification::Share
    } else {
        Classification::None
    };

    PowResult {
        hash,
        nonce,
        leading_zero_bits: zeros,
        classification,
        hashes_computed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{build_template, ChainTip};
    use crate::network::Network;

    /// Target with exactly eight leading zero bits: roughly 1 in 256 hashes
    /// is a block.
    const EASY_BITS: u32 = 0x2000ffff;
    const MAINNET_BITS: u32 = 0x17034219;

    fn template(bits: u32) -> BlockTemplate {
        let tip = ChainTip { hash: [0x5a; 32], height: 100 };
        build_template(Network::Testnet4, &tip, bits, 1_700_000_000).unwrap()
    }

    #[test]
    fn test_search_one_is_deterministic() {
        let template = template(MAINNET_BITS);
        let first = search_one(&template, 12345);
        let second = search_one(&template, 12345);

        assert_eq!(first, second);
        assert_eq!(first.hashes_computed, 1);
        assert_eq!(first.hash, template.header(12345).hash());
    }

    #[test]
    fn test_different_nonces_differ() {
        let template = template(MAINNET_BITS);
        assert_ne!(hash_at(&template, 1), hash_at(&template, 2));
    }

    #[test]
    fn test_batch_of_one_matches_single() {
        let template = template(EASY_BITS);
        for nonce in [0u32, 7, 1_000, u32::MAX] {
            let single = search_one(&template, nonce);
            let batch = search_batch(&template, nonce, 1);
            assert_eq!(single, batch, "nonce {nonce}");
        }
    }

    #[test]
    fn test_classification_consistency() {
        let template = template(EASY_BITS);
        for nonce in 0..2_000u32 {
            let result = search_one(&template, nonce);
            if result.block_found() {
                assert!(result.leading_zero_bits >= SHARE_THRESHOLD_BITS);
                assert!(template.target.is_met_by(&result.hash));
                assert!(result.share_found());
            }
            if result.classification == Classification::None {
                assert!(result.leading_zero_bits < SHARE_THRESHOLD_BITS);
            }
        }
    }

    #[test]
    fn test_batch_returns_first_block() {
        let template = template(EASY_BITS);
        let result = search_batch(&template, 0, 8_192);

        assert!(result.block_found());
        assert_eq!(result.hashes_computed, result.nonce as u64 + 1);
        for nonce in 0..result.nonce {
            assert!(!search_one(&template, nonce).block_found());
        }
    }

    #[test]
    fn test_batch_reports_best_share() {
        let template = template(MAINNET_BITS);
        let result = search_batch(&template, 0, 4_096);

        assert_eq!(result.hashes_computed, 4_096);
        assert!(!result.block_found());
        let best = (0..4_096u32)
            .map(|n| search_one(&template, n).leading_zero_bits)
            .max()
            .unwrap();
        assert_eq!(result.leading_zero_bits, best);
        assert_eq!(result.share_found(), best >= SHARE_THRESHOLD_BITS);
        assert_eq!(search_one(&template, result.nonce).hash, result.hash);
    }

    #[test]
    fn test_batch_stops_at_nonce_space_end() {
        let template = template(MAINNET_BITS);
        let result = search_batch(&template, u32::MAX - 9, 100);
        assert_eq!(result.hashes_computed, 10);
        assert!(result.nonce >= u32::MAX - 9);
    }

    #[test]
    fn test_empty_batch() {
        let template = template(MAINNET_BITS);
        let result = search_batch(&template, 5, 0);
        assert_eq!(result.hashes_computed, 0);
        assert_eq!(result.classification, Classification::None);
    }
}
