//! WebAssembly bindings for the Bitcoin scratch-off miner.
//!
//! This crate provides JavaScript-accessible APIs for:
//! - Fetching chain tips, network stats and submitting blocks via mempool.space
//! - Driving a mining session: templates, swings and auto-mining batches
//! - Reacting to chain tip changes

use wasm_bindgen::prelude::*;

pub mod api;
pub mod miner;
pub mod state;

// Re-export main types for JS access
pub use api::BlockchainApi;
pub use miner::{console_log, Miner};

/// Initialize the WASM module with better panic messages.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get the library version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
