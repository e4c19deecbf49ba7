//! Supported networks and their per-network parameters.

use core::fmt;

use serde::{Deserialize, Serialize};

/// The chain a session mines on.
///
/// A session is bound to exactly one network; switching networks replaces the
/// address and template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet4,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::Mainnet, Network::Testnet4];

    /// Prefixes checked before an address is decoded. Multi-character
    /// prefixes are Bech32 and match case-insensitively.
    pub fn address_prefixes(&self) -> &'static [&'static str] {
        match self {
            Network::Mainnet => &["bc1", "1", "3"],
            Network::Testnet4 => &["tb1", "m", "n", "2"],
        }
    }

    pub fn bech32_hrp(&self) -> &'static str {
        match self {
            Network::Mainnet => "bc",
            Network::Testnet4 => "tb",
        }
    }

    /// Base58Check version byte of P2PKH addresses.
    pub fn p2pkh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet4 => 0x6f,
        }
    }

    /// Base58Check version byte of P2SH addresses.
    pub fn p2sh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet4 => 0xc4,
        }
    }

    /// Compact target used when no difficulty data is available.
    pub fn default_bits(&self) -> u32 {
        match self {
            Network::Mainnet => 0x17034219,
            Network::Testnet4 => 0x1d00ffff,
        }
    }

    /// Tip height assumed for subsidy purposes when the real height is unknown.
    pub fn fallback_tip_height(&self) -> u32 {
        match self {
            Network::Mainnet => 870_000,
            Network::Testnet4 => 60_000,
        }
    }

    /// Block explorer REST endpoint.
    pub fn mempool_api_url(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://mempool.space/api",
            Network::Testnet4 => "https://mempool.space/testnet4/api",
        }
    }

    /// Accepts the canonical name and a few aliases, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Some(Network::Mainnet),
            "testnet4" | "testnet" | "test" => Some(Network::Testnet4),
            _ => None,
        }
    }

    /// Canonical lowercase name, as used by [`Network::parse`] and serde.
    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet4 => "testnet4",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Network::Mainnet => "Bitcoin Mainnet",
            Network::Testnet4 => "Bitcoin Testnet4",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Header version: BIP9 versionbits with no deployments signalled.
pub const BLOCK_VERSION: i32 = 0x20000000;

pub const BLOCK_HEADER_SIZE: usize = 80;

/// Tag written into every coinbase scriptSig.
pub const MINER_TAG: &[u8] = b"/ScratchOffMiner/";
