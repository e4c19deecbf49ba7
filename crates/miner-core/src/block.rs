//! Block header serialization and block template assembly.
//!
//! A [`BlockTemplate`] is built from chain-tip data by [`TemplateBuilder`]
//! and is immutable afterwards. A tip advance produces a new template.

use alloc::string::String;
use alloc::vec::Vec;

use thiserror::Error;

use crate::address::Address;
use crate::coinbase::{CoinbaseBuilder, CoinbaseTransaction};
use crate::difficulty::{subsidy_for_height, Target, SHARE_THRESHOLD_BITS};
use crate::hash::{double_sha256, hash_from_display_hex, hash_to_display_hex};
use crate::network::{Network, BLOCK_HEADER_SIZE, BLOCK_VERSION};

/// Errors from malformed chain-tip data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("tip hash must be 32 bytes of hex")]
    InvalidTipHash,
    #[error("tip height {0} has no successor")]
    HeightOverflow(u32),
    #[error("bits {0:#010x} do not encode a usable target")]
    InvalidBits(u32),
    #[error("bits {0:#010x} encode a target easier than the share threshold")]
    TargetTooEasy(u32),
    #[error("template has no coinbase to serialize")]
    MissingCoinbase,
    #[error("template is for {found}, session is on {expected}")]
    NetworkMismatch { expected: Network, found: Network },
}

/// The chain tip a template builds on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTip {
    /// Tip block hash, internal byte order.
    pub hash: [u8; 32],
    pub height: u32,
}

impl ChainTip {
    /// Parse a tip hash in display order, as block explorers return it.
    pub fn from_display_hex(hash_hex: &str, height: u32) -> Result<Self, TemplateError> {
        let hash = hash_from_display_hex(hash_hex).ok_or(TemplateError::InvalidTipHash)?;
        Ok(ChainTip { hash, height })
    }

    /// Build from raw bytes in internal order; any other length is rejected.
    pub fn from_bytes(hash: &[u8], height: u32) -> Result<Self, TemplateError> {
        let hash: [u8; 32] = hash.try_into().map_err(|_| TemplateError::InvalidTipHash)?;
        Ok(ChainTip { hash, height })
    }

    pub fn display_hash(&self) -> String {
        hash_to_display_hex(&self.hash)
    }
}

/// A Bitcoin block header (80 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block version with BIP9 versionbits.
    pub version: i32,
    /// Hash of the previous block (internal byte order).
    pub prev_block_hash: [u8; 32],
    /// Merkle root of all transactions.
    pub merkle_root: [u8; 32],
    /// Block timestamp (Unix time).
    pub timestamp: u32,
    /// Difficulty target in compact "bits" format.
    pub bits: u32,
    /// Nonce for proof of work.
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialize the block header to 80 bytes.
    pub fn serialize(&self) -> [u8; BLOCK_HEADER_SIZE] {
        let mut header = [0u8; BLOCK_HEADER_SIZE];
        header[..76].copy_from_slice(&self.serialize_without_nonce());
        header[76..].copy_from_slice(&self.nonce.to_le_bytes());
        header
    }

    /// Serialize the header without the nonce (76 bytes).
    /// Used for mining where only the nonce changes.
    pub fn serialize_without_nonce(&self) -> [u8; 76] {
        let mut header = [0u8; 76];
        header[0..4].copy_from_slice(&self.version.to_le_bytes());
        header[4..36].copy_from_slice(&self.prev_block_hash);
        header[36..68].copy_from_slice(&self.merkle_root);
        header[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        header[72..76].copy_from_slice(&self.bits.to_le_bytes());
        header
    }

    /// Compute the block hash (double SHA256).
    pub fn hash(&self) -> [u8; 32] {
        double_sha256(&self.serialize())
    }
}

/// Everything needed to hash candidate headers for the next block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTemplate {
    pub network: Network,
    /// Height of the block being mined (tip height + 1).
    pub height: u32,
    /// Tip hash, internal byte order.
    pub prev_hash: [u8; 32],
    pub bits: u32,
    pub target: Target,
    pub timestamp: u32,
    pub reward_sats: u64,
    /// Coinbase txid, or zeros when the template has no payout.
    pub merkle_root: [u8; 32],
    pub coinbase: Option<CoinbaseTransaction>,
}

impl BlockTemplate {
    /// The header with the given nonce filled in.
    pub fn header(&self, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: BLOCK_VERSION,
            prev_block_hash: self.prev_hash,
            merkle_root: self.merkle_root,
            timestamp: self.timestamp,
            bits: self.bits,
            nonce,
        }
    }

    /// Tip hash in display order.
    pub fn prev_hash_hex(&self) -> String {
        hash_to_display_hex(&self.prev_hash)
    }

    /// Serialize the complete block with the given nonce.
    pub fn serialize_block(&self, nonce: u32) -> Result<Vec<u8>, TemplateError> {
        let coinbase = self.coinbase.as_ref().ok_or(TemplateError::MissingCoinbase)?;

        let mut block = Vec::with_capacity(BLOCK_HEADER_SIZE + 1 + coinbase.raw_tx_with_witness.len());
        block.extend_from_slice(&self.header(nonce).serialize());
        // Transaction count: just the coinbase
        block.push(0x01);
        block.extend_from_slice(&coinbase.raw_tx_with_witness);
        Ok(block)
    }

    /// Get the block as hex string for submission.
    pub fn serialize_block_hex(&self, nonce: u32) -> Result<String, TemplateError> {
        self.serialize_block(nonce).map(hex::encode)
    }
}

/// Assembles templates from chain-tip inputs.
///
/// This is pure assembly; every call returns a fresh template.
#[derive(Debug, Clone)]
pub struct TemplateBuilder<'a> {
    network: Network,
    payout: Option<&'a Address>,
}

impl<'a> TemplateBuilder<'a> {
    pub fn new(network: Network) -> Self {
        TemplateBuilder { network, payout: None }
    }

    /// Pay the reward to `address`, committing a coinbase into the merkle root.
    pub fn payout(mut self, address: &'a Address) -> Self {
        self.payout = Some(address);
        self
    }

    /// Build the template for the block after `tip`.
    pub fn build(&self, tip: &ChainTip, bits: u32, timestamp: u32) -> Result<BlockTemplate, TemplateError> {
        if let Some(address) = self.payout {
            if address.network() != self.network {
                return Err(TemplateError::NetworkMismatch {
                    expected: self.network,
                    found: address.network(),
                });
            }
        }

        let target = Target::from_bits(bits);
        if target.is_zero() {
            return Err(TemplateError::InvalidBits(bits));
        }
        if target.leading_zero_bits() < SHARE_THRESHOLD_BITS as u32 {
            return Err(TemplateError::TargetTooEasy(bits));
        }

        let height = tip.height.checked_add(1).ok_or(TemplateError::HeightOverflow(tip.height))?;
        let reward_sats = subsidy_for_height(height);

        let coinbase = self.payout.map(|address| CoinbaseBuilder::new(height, address).build(reward_sats));
        let merkle_root = coinbase.as_ref().map(|cb| cb.txid).unwrap_or([0u8; 32]);

        Ok(BlockTemplate {
            network: self.network,
            height,
            prev_hash: tip.hash,
            bits,
            target,
            timestamp,
            reward_sats,
            merkle_root,
            coinbase,
        })
    }
}

/// Build a template for `network` on top of `tip` without a payout.
pub fn build_template(
    network: Network,
    tip: &ChainTip,
    bits: u32,
    timestamp: u32,
) -> Result<BlockTemplate, TemplateError> {
    TemplateBuilder::new(network).build(tip, bits, timestamp)
}
