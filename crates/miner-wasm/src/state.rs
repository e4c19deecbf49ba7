//! Serializable views of session state for the UI.

use miner_core::difficulty::{bits_to_difficulty, difficulty_display};
use miner_core::hash::hash_to_display_hex;
use miner_core::stats::format_hash_rate;
use miner_core::{Address, BlockTemplate, PowResult, Stats};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

const SATS_PER_BTC: f64 = 100_000_000.0;

/// Mining statistics plus wall-clock rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsView {
    pub total_hashes: u64,
    /// Hashes per second since auto-mining started.
    pub hash_rate: f64,
    pub hash_rate_display: String,
    pub shares_found: u32,
    pub block_found: bool,
    pub current_nonce: u32,
    pub elapsed_ms: f64,
    /// Best hash found, display order.
    pub best_hash: Option<String>,
    pub best_leading_zeros: u8,
    pub nonce_space_exhausted: bool,
    pub cycles_completed: u32,
    pub state: String,
}

impl StatsView {
    pub fn new(stats: &Stats, state: &str, block_found: bool, elapsed_ms: f64) -> Self {
        let hash_rate = if elapsed_ms > 0.0 {
            stats.total_hashes as f64 / (elapsed_ms / 1000.0)
        } else {
            0.0
        };

        StatsView {
            total_hashes: stats.total_hashes,
            hash_rate,
            hash_rate_display: format_hash_rate(hash_rate),
            shares_found: stats.shares_found,
            block_found,
            current_nonce: stats.current_nonce,
            elapsed_ms,
            best_hash: stats.best_hash_hex(),
            best_leading_zeros: stats.best_leading_zeros,
            nonce_space_exhausted: stats.nonce_space_exhausted,
            cycles_completed: stats.cycles_completed,
            state: state.to_string(),
        }
    }

    pub fn to_js(&self) -> Result<JsValue, JsValue> {
        to_js_value(self)
    }
}

/// Block template information for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub height: u32,
    /// Previous block hash, display order.
    pub prev_hash: String,
    pub bits: u32,
    pub difficulty: f64,
    pub difficulty_display: String,
    pub reward: u64,
    pub reward_btc: f64,
    pub merkle_root: String,
    pub timestamp: u32,
    pub network: String,
    pub address: String,
}

impl TemplateInfo {
    pub fn new(template: &BlockTemplate, address: &Address) -> Self {
        TemplateInfo {
            height: template.height,
            prev_hash: template.prev_hash_hex(),
            bits: template.bits,
            difficulty: bits_to_difficulty(template.bits),
            difficulty_display: difficulty_display(template.bits),
            reward: template.reward_sats,
            reward_btc: template.reward_sats as f64 / SATS_PER_BTC,
            merkle_root: hash_to_display_hex(&template.merkle_root),
            timestamp: template.timestamp,
            network: template.network.display_name().to_string(),
            address: address.to_string(),
        }
    }

    pub fn to_js(&self) -> Result<JsValue, JsValue> {
        to_js_value(self)
    }
}

/// Result of one swing or batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningResultInfo {
    pub share_found: bool,
    pub block_found: bool,
    pub nonce: u32,
    /// Display order.
    pub hash: String,
    pub leading_zeros: u8,
    pub hashes_computed: u64,
    /// False when the session had moved on and the batch was dropped.
    pub applied: bool,
}

impl MiningResultInfo {
    pub fn new(result: &PowResult) -> Self {
        MiningResultInfo {
            share_found: result.share_found(),
            block_found: result.block_found(),
            nonce: result.nonce,
            hash: hash_to_display_hex(&result.hash),
            leading_zeros: result.leading_zero_bits,
            hashes_computed: result.hashes_computed,
            applied: true,
        }
    }

    pub fn discarded() -> Self {
        MiningResultInfo {
            share_found: false,
            block_found: false,
            nonce: 0,
            hash: String::new(),
            leading_zeros: 0,
            hashes_computed: 0,
            applied: false,
        }
    }

    pub fn to_js(&self) -> Result<JsValue, JsValue> {
        to_js_value(self)
    }
}

fn to_js_value<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}
