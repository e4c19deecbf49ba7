//! Core Bitcoin mining logic for the scratch-off miner application.
//!
//! This crate provides pure Rust implementations of:
//! - Network-aware address validation (P2PKH, P2SH, P2WPKH, P2WSH, P2TR)
//! - Difficulty target conversion, subsidy schedule and hash ranking
//! - Block template construction from chain-tip data
//! - Nonce search with share and block detection
//! - The mining session state machine and chain tip watching
//!
//! The engine never schedules itself. Hosts drive it with explicit calls and
//! talk to block explorers through the traits in [`provider`]. Diagnostics are
//! emitted as `tracing` events; installing a subscriber is up to the host.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod address;
pub mod block;
pub mod coinbase;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod hash;
pub mod network;
pub mod pow;
pub mod provider;
pub mod session;
pub mod stats;
pub mod watcher;
#[cfg(feature = "std")]
pub mod worker;

pub use address::{validate_address, Address, AddressType, InvalidAddressError, InvalidAddressReason};
pub use block::{build_template, BlockHeader, BlockTemplate, ChainTip, TemplateBuilder, TemplateError};
pub use config::SessionConfig;
pub use difficulty::{
    difficulty_display, leading_zero_bits, subsidy_for_height, target_from_bits, Target, SHARE_THRESHOLD_BITS,
};
pub use error::MinerError;
pub use hash::double_sha256;
pub use network::Network;
pub use pow::{hash_at, search_batch, search_one, Classification, PowResult};
pub use provider::{
    network_outlook, BlockSink, ChainTipProvider, NetworkOutlook, NetworkStats, NetworkStatsProvider, PoolShare,
    ProviderError, SubmitError, TxId,
};
pub use session::{BatchJob, BatchOutcome, MiningSession, SessionState, SessionStateError, Solution, TipAction};
pub use stats::Stats;
pub use watcher::{TemplateWatcher, TipChange};
#[cfg(feature = "std")]
pub use worker::BatchWorker;
