//! Interfaces to the services the engine depends on.
//!
//! Block explorers, pool statistics and block submission are external. The
//! engine only talks to them through these traits so it stays testable
//! without a network.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::block::ChainTip;
use crate::difficulty::expected_hashes;

/// A transient failure talking to an external service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service} unavailable: {message}")]
pub struct ProviderError {
    pub service: &'static str,
    pub message: String,
}

impl ProviderError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        ProviderError {
            service,
            message: message.into(),
        }
    }
}

/// Block submission failed; the solution is kept for a retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("block rejected: {0}")]
    Rejected(String),
    #[error("submission failed: {0}")]
    Transport(String),
}

/// Identifier returned by the submission sink.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TxId(pub String);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of the current chain tip.
pub trait ChainTipProvider {
    /// Tip hash, internal byte order.
    fn tip_hash(&self) -> Result<[u8; 32], ProviderError>;

    fn tip_height(&self) -> Result<u32, ProviderError>;
}

/// A tip snapshot fetched elsewhere serves as its own provider.
impl ChainTipProvider for ChainTip {
    fn tip_hash(&self) -> Result<[u8; 32], ProviderError> {
        Ok(self.hash)
    }

    fn tip_height(&self) -> Result<u32, ProviderError> {
        Ok(self.height)
    }
}

/// Receives serialized blocks.
pub trait BlockSink {
    fn submit(&mut self, block: &[u8]) -> Result<TxId, SubmitError>;
}

/// Share of recent blocks mined by one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolShare {
    pub name: String,
    pub block_count: u32,
}

/// Informational network figures for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Network hash rate in H/s.
    pub hashrate: f64,
    pub pools: Vec<PoolShare>,
}

impl NetworkStats {
    /// Fraction of recent blocks found by `pool`, if it is listed.
    pub fn pool_fraction(&self, pool: &str) -> Option<f64> {
        let total: u64 = self.pools.iter().map(|p| p.block_count as u64).sum();
        if total == 0 {
            return None;
        }
        self.pools
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(pool))
            .map(|p| p.block_count as f64 / total as f64)
    }
}

/// Source of network statistics.
pub trait NetworkStatsProvider {
    fn network_stats(&self) -> Result<NetworkStats, ProviderError>;
}

/// Stats fetched elsewhere serve as their own provider.
impl NetworkStatsProvider for NetworkStats {
    fn network_stats(&self) -> Result<NetworkStats, ProviderError> {
        Ok(self.clone())
    }
}

/// How a local hash rate compares to the network.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkOutlook {
    /// Local fraction of the network hash rate.
    pub hashrate_share: f64,
    /// Expected seconds until the local miner finds a block.
    pub expected_seconds_to_block: f64,
}

/// Compare `local_hashrate` against the network.
///
/// Failures only log; mining state never depends on this.
pub fn network_outlook<P: NetworkStatsProvider + ?Sized>(
    provider: &P,
    local_hashrate: f64,
    bits: u32,
) -> Option<NetworkOutlook> {
    let stats = match provider.network_stats() {
        Ok(stats) => stats,
        Err(err) => {
            warn!(error = %err, "Network stats unavailable");
            return None;
        }
    };

    let hashrate_share = if stats.hashrate > 0.0 {
        local_hashrate / stats.hashrate
    } else {
        0.0
    };
    let expected_seconds_to_block = if local_hashrate > 0.0 {
        expected_hashes(bits) / local_hashrate
    } else {
        f64::INFINITY
    };

    Some(NetworkOutlook {
        hashrate_share,
        expected_seconds_to_block,
    })
}
