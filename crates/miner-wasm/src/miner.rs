//! Mining controller for the WASM miner.
//!
//! Wraps a [`MiningSession`] and a [`TemplateWatcher`]. JavaScript owns the
//! event loop: it fetches chain data with [`crate::BlockchainApi`], feeds it in
//! here, and calls `mine_batch` from a timer while auto-mining.

use core::fmt::Display;
use core::time::Duration;

use miner_core::provider::network_outlook;
use miner_core::{
    validate_address, BatchOutcome, ChainTip, MiningSession, Network, NetworkStats, SessionConfig, TemplateWatcher,
    TipAction,
};
use wasm_bindgen::prelude::*;

use crate::state::{MiningResultInfo, StatsView, TemplateInfo};

/// The main mining controller.
#[wasm_bindgen]
pub struct Miner {
    session: MiningSession,
    watcher: TemplateWatcher,
    /// When auto-mining first started on the current template (ms since epoch).
    start_time: Option<f64>,
}

#[wasm_bindgen]
impl Miner {
    /// Create a miner paying `address` on `network`.
    ///
    /// `config` is an optional object with any of `batch_size`,
    /// `min_batch_size`, `max_batch_size` and `batch_budget_ms`.
    #[wasm_bindgen(constructor)]
    pub fn new(address: &str, network: &str, config: JsValue) -> Result<Miner, JsValue> {
        let network = parse_network(network)?;
        let config = if config.is_undefined() || config.is_null() {
            SessionConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config).map_err(|e| js_error("Invalid config", e))?
        };

        let session = MiningSession::with_address(address, network, config)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(Miner {
            session,
            watcher: TemplateWatcher::new(),
            start_time: None,
        })
    }

    /// Validate a Bitcoin address for a network without creating a miner.
    pub fn validate_address(address: &str, network: &str) -> Result<bool, JsValue> {
        let network = parse_network(network)?;
        validate_address(address, network)
            .map(|_| true)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Build a template on top of the given tip.
    ///
    /// `tip_height` falls back to a recent height for the network, `bits` to
    /// the network default, and a zero `timestamp` to the current time.
    pub fn build_template(
        &mut self,
        tip_hash: &str,
        tip_height: Option<u32>,
        bits: Option<u32>,
        timestamp: u32,
    ) -> Result<JsValue, JsValue> {
        let network = self.session.network();
        let tip = ChainTip::from_display_hex(tip_hash, tip_height_or_fallback(tip_height, network))
            .map_err(|e| js_error("Invalid tip", e))?;
        let timestamp = if timestamp > 0 { timestamp } else { now_secs() };

        self.session
            .build_template(&tip, resolve_bits(bits, network), timestamp)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.watcher.acknowledge(tip.height);
        self.start_time = None;

        self.template_info()
    }

    /// Current template, or `null` if none is loaded.
    pub fn get_template(&self) -> Result<JsValue, JsValue> {
        match self.session.template() {
            Some(_) => self.template_info(),
            None => Ok(JsValue::NULL),
        }
    }

    /// Hash one nonce. A random nonce is used when none is given.
    pub fn swing(&mut self, nonce: Option<u32>) -> Result<JsValue, JsValue> {
        let nonce = match nonce {
            Some(nonce) => nonce,
            None => random_nonce()?,
        };
        let result = self.session.swing(nonce).map_err(|e| JsValue::from_str(&e.to_string()))?;
        if result.block_found() {
            console_log(&format!("Block found with nonce {}", nonce));
        }
        MiningResultInfo::new(&result).to_js()
    }

    /// Start auto-mining; drive it with `mine_batch`.
    pub fn start_mining(&mut self) -> Result<(), JsValue> {
        self.session.start_auto().map_err(|e| JsValue::from_str(&e.to_string()))?;
        if self.start_time.is_none() {
            self.start_time = Some(js_sys::Date::now());
        }
        Ok(())
    }

    pub fn stop_mining(&mut self) -> Result<(), JsValue> {
        self.session.stop_auto().map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Run one auto-mining batch and calibrate the batch size from its
    /// wall-clock time.
    pub fn mine_batch(&mut self) -> Result<JsValue, JsValue> {
        let started = js_sys::Date::now();
        let outcome = self.session.tick().map_err(|e| JsValue::from_str(&e.to_string()))?;
        let elapsed_ms = (js_sys::Date::now() - started).max(0.0);

        match outcome {
            BatchOutcome::Applied(result) => {
                self.session
                    .observe_batch_time(result.hashes_computed, Duration::from_micros((elapsed_ms * 1000.0) as u64));
                if result.block_found() {
                    console_log(&format!("Block found with nonce {}", result.nonce));
                }
                MiningResultInfo::new(&result).to_js()
            }
            BatchOutcome::Discarded => MiningResultInfo::discarded().to_js(),
        }
    }

    /// Report the tip the explorer currently shows.
    ///
    /// Returns what happened: "none", "rebuilt", "interrupted", "stopped" or
    /// "deferred". A stopped or deferred tip is reported again on the next call.
    pub fn observe_tip(&mut self, tip_hash: &str, tip_height: u32) -> Result<String, JsValue> {
        let tip = ChainTip::from_display_hex(tip_hash, tip_height).map_err(|e| js_error("Invalid tip", e))?;
        let Some(change) = self.watcher.poll(&tip) else {
            return Ok(tip_action_name(None).to_string());
        };

        let action = self
            .session
            .handle_tip_change(&change, now_secs())
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        if action.is_applied() {
            self.watcher.acknowledge(change.tip.height);
            self.start_time = None;
            console_log(&format!("New template at height {}", change.tip.height + 1));
        }
        Ok(tip_action_name(Some(action)).to_string())
    }

    /// Current statistics.
    pub fn get_stats(&self) -> Result<JsValue, JsValue> {
        self.stats_view().to_js()
    }

    pub fn get_hash_rate_display(&self) -> String {
        self.stats_view().hash_rate_display
    }

    /// Serialized winning block, if a block was found.
    pub fn get_block_hex(&self) -> Option<String> {
        self.session.block_hex().ok()
    }

    /// Compare the local hash rate against network stats fetched with
    /// `BlockchainApi::get_network_stats`. Returns `null` if unavailable.
    pub fn network_outlook(&self, stats: JsValue) -> Result<JsValue, JsValue> {
        let stats: NetworkStats = serde_wasm_bindgen::from_value(stats).map_err(|e| js_error("Invalid stats", e))?;
        let bits = match self.session.template() {
            Some(template) => template.bits,
            None => self.session.network().default_bits(),
        };

        match network_outlook(&stats, self.stats_view().hash_rate, bits) {
            Some(outlook) => {
                serde_wasm_bindgen::to_value(&outlook).map_err(|e| js_error("Serialization error", e))
            }
            None => Ok(JsValue::NULL),
        }
    }

    /// Replace the reward address. The template must be rebuilt afterwards.
    pub fn set_address(&mut self, address: &str) -> Result<(), JsValue> {
        self.session.set_address(address).map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.start_time = None;
        Ok(())
    }

    /// Switch networks. A new address must be set afterwards.
    pub fn set_network(&mut self, network: &str) -> Result<(), JsValue> {
        let network = parse_network(network)?;
        self.session.set_network(network).map_err(|e| JsValue::from_str(&e.to_string()))?;
        self.watcher = TemplateWatcher::new();
        self.start_time = None;
        Ok(())
    }

    #[wasm_bindgen(getter)]
    pub fn is_mining(&self) -> bool {
        self.session.is_auto_running()
    }

    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        self.session.state().name().to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn batch_size(&self) -> u32 {
        self.session.batch_size()
    }

    #[wasm_bindgen(getter)]
    pub fn network(&self) -> String {
        self.session.network().name().to_string()
    }

    /// The reward address, or an empty string after a network switch.
    #[wasm_bindgen(getter)]
    pub fn address(&self) -> String {
        self.session.address().map(|a| a.to_string()).unwrap_or_default()
    }
}

impl Miner {
    fn template_info(&self) -> Result<JsValue, JsValue> {
        let template = self.session.template().ok_or_else(|| JsValue::from_str("No template built"))?;
        let address = self.session.address().ok_or_else(|| JsValue::from_str("No address set"))?;
        TemplateInfo::new(template, address).to_js()
    }

    fn stats_view(&self) -> StatsView {
        let elapsed_ms = self.start_time.map_or(0.0, |start| js_sys::Date::now() - start);
        let session = &self.session;
        StatsView::new(session.stats(), session.state().name(), session.solution().is_some(), elapsed_ms)
    }
}

/// Log to the browser console.
#[wasm_bindgen]
pub fn console_log(message: &str) {
    web_sys::console::log_1(&JsValue::from_str(message));
}

fn parse_network(network: &str) -> Result<Network, JsValue> {
    Network::parse(network).ok_or_else(|| JsValue::from_str("Invalid network"))
}

fn js_error(context: &str, err: impl Display) -> JsValue {
    JsValue::from_str(&format!("{}: {}", context, err))
}

fn now_secs() -> u32 {
    (js_sys::Date::now() / 1000.0) as u32
}

fn random_nonce() -> Result<u32, JsValue> {
    let mut bytes = [0u8; 4];
    getrandom::getrandom(&mut bytes).map_err(|e| js_error("Random nonce unavailable", e))?;
    Ok(u32::from_le_bytes(bytes))
}

fn tip_height_or_fallback(tip_height: Option<u32>, network: Network) -> u32 {
    tip_height.unwrap_or_else(|| network.fallback_tip_height())
}

/// Zero counts as unset, as does a missing value.
fn resolve_bits(bits: Option<u32>, network: Network) -> u32 {
    match bits {
        Some(bits) if bits != 0 => bits,
        _ => network.default_bits(),
    }
}

fn tip_action_name(action: Option<TipAction>) -> &'static str {
    match action {
        None => "none",
        Some(TipAction::Rebuilt) => "rebuilt",
        Some(TipAction::Interrupted) => "interrupted",
        Some(TipAction::Stopped) => "stopped",
        Some(TipAction::Deferred) => "deferred",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_fallback() {
        assert_eq!(resolve_bits(None, Network::Mainnet), 0x17034219);
        assert_eq!(resolve_bits(Some(0), Network::Testnet4), 0x1d00ffff);
        assert_eq!(resolve_bits(Some(0x1d00ffff), Network::Mainnet), 0x1d00ffff);
    }

    #[test]
    fn test_tip_height_fallback() {
        assert_eq!(tip_height_or_fallback(Some(5), Network::Mainnet), 5);
        assert_eq!(tip_height_or_fallback(None, Network::Testnet4), 60_000);
    }

    #[test]
    fn test_tip_action_names() {
        assert_eq!(tip_action_name(None), "none");
        assert_eq!(tip_action_name(Some(TipAction::Interrupted)), "interrupted");
        assert_eq!(tip_action_name(Some(TipAction::Stopped)), "stopped");
        assert_eq!(tip_action_name(Some(TipAction::Deferred)), "deferred");
    }

    #[test]
    fn test_random_nonce_varies() {
        let nonces: Vec<u32> = (0..8).map(|_| random_nonce().unwrap()).collect();
        assert!(nonces.iter().any(|&n| n != nonces[0]));
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    const ADDRESS: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
    const TIP: &str = "00000000000000000002a7c4c1e48d76c5a37902165a270156b7a8d72728a054";

    fn miner() -> Miner {
        let mut miner = Miner::new(ADDRESS, "mainnet", JsValue::UNDEFINED).unwrap();
        miner.build_template(TIP, Some(874_999), None, 1_700_000_000).unwrap();
        miner
    }

    #[wasm_bindgen_test]
    fn test_rejects_wrong_network_address() {
        assert!(Miner::new(ADDRESS, "testnet4", JsValue::UNDEFINED).is_err());
        assert!(Miner::validate_address(ADDRESS, "mainnet").unwrap());
    }

    #[wasm_bindgen_test]
    fn test_swing_and_batch() {
        let mut miner = miner();
        miner.swing(Some(7)).unwrap();
        miner.swing(None).unwrap();

        miner.start_mining().unwrap();
        assert!(miner.is_mining());
        miner.mine_batch().unwrap();
        miner.stop_mining().unwrap();

        assert_eq!(miner.state(), "ready");
        assert!(miner.get_block_hex().is_none());
    }

    #[wasm_bindgen_test]
    fn test_observe_tip_rebuilds_when_idle() {
        let mut miner = miner();
        assert_eq!(miner.observe_tip(TIP, 874_999).unwrap(), "none");
        assert_eq!(miner.observe_tip(TIP, 875_000).unwrap(), "rebuilt");
    }

    #[wasm_bindgen_test]
    fn test_observe_tip_interrupts_auto_mining() {
        let mut miner = miner();
        miner.start_mining().unwrap();

        assert_eq!(miner.observe_tip(TIP, 875_000).unwrap(), "deferred");
        assert!(miner.is_mining());
        assert_eq!(miner.observe_tip(TIP, 875_000).unwrap(), "interrupted");
        assert!(!miner.is_mining());
    }
}
