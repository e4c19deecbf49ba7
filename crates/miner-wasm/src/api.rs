//! Block explorer client (mempool.space REST API).

use miner_core::hash::hash_from_display_hex;
use miner_core::provider::PoolShare;
use miner_core::{Network, NetworkStats, SubmitError, TxId};
use serde::Deserialize;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

/// Blockchain API client for fetching chain data.
#[wasm_bindgen]
pub struct BlockchainApi {
    network: Network,
    submit_url: Option<String>,
}

#[wasm_bindgen]
impl BlockchainApi {
    /// Create a client for `network` ("mainnet" or "testnet4").
    #[wasm_bindgen(constructor)]
    pub fn new(network: &str) -> Result<BlockchainApi, JsValue> {
        let network = Network::parse(network).ok_or_else(|| JsValue::from_str("Invalid network"))?;
        Ok(BlockchainApi {
            network,
            submit_url: None,
        })
    }

    /// Current tip hash, display order.
    pub async fn get_tip_hash(&self) -> Result<String, JsValue> {
        let text = self.get("/blocks/tip/hash").await?;
        parse_tip_hash(&text).map_err(|e| JsValue::from_str(&e))
    }

    pub async fn get_tip_height(&self) -> Result<u32, JsValue> {
        let text = self.get("/blocks/tip/height").await?;
        parse_tip_height(&text).map_err(|e| JsValue::from_str(&e))
    }

    /// Network hash rate and recent pool distribution.
    pub async fn get_network_stats(&self) -> Result<JsValue, JsValue> {
        let hashrate = self.get("/v1/mining/hashrate/3d").await?;
        let pools = self.get("/v1/mining/pools/1w").await?;
        let stats = parse_network_stats(&hashrate, &pools).map_err(|e| JsValue::from_str(&e))?;
        serde_wasm_bindgen::to_value(&stats).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Submit a serialized block. Resolves to the identifier the endpoint
    /// returns.
    ///
    /// Without a submit URL this is best-effort: the explorer's `/tx`
    /// endpoint only relays transactions and rejects whole blocks. Set a
    /// block relay with [`BlockchainApi::set_submit_url`] to actually publish.
    pub async fn submit_block(&self, block_hex: &str) -> Result<String, JsValue> {
        let url = submit_endpoint(self.network, self.submit_url.as_deref());
        let response = send("POST", &url, Some(block_hex)).await?;
        let status = response.status();
        let body = read_text(&response).await?;

        submit_response(status, &body)
            .map(|txid| txid.0)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen(getter)]
    pub fn network(&self) -> String {
        self.network.name().to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn base_url(&self) -> String {
        self.network.mempool_api_url().to_string()
    }

    /// Endpoint that receives `submit_block` POSTs. `undefined` or an empty
    /// string restores the explorer default.
    pub fn set_submit_url(&mut self, url: Option<String>) {
        self.submit_url = url.filter(|u| !u.trim().is_empty());
    }

    #[wasm_bindgen(getter)]
    pub fn submit_url(&self) -> String {
        submit_endpoint(self.network, self.submit_url.as_deref())
    }
}

/// Fraction of recent blocks found by `pool` in stats from
/// `get_network_stats`, or `undefined` if it is not listed.
#[wasm_bindgen]
pub fn pool_fraction(stats: JsValue, pool: &str) -> Result<Option<f64>, JsValue> {
    let stats: NetworkStats =
        serde_wasm_bindgen::from_value(stats).map_err(|e| JsValue::from_str(&format!("Invalid stats: {}", e)))?;
    Ok(stats.pool_fraction(pool))
}

impl BlockchainApi {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.network.mempool_api_url(), path)
    }

    async fn get(&self, path: &str) -> Result<String, JsValue> {
        let response = send("GET", &self.url(path), None).await?;
        if !response.ok() {
            return Err(JsValue::from_str(&format!("HTTP error: {}", response.status())));
        }
        read_text(&response).await
    }
}

async fn send(method: &str, url: &str, body: Option<&str>) -> Result<Response, JsValue> {
    let opts = RequestInit::new();
    opts.set_method(method);
    opts.set_mode(RequestMode::Cors);
    if let Some(body) = body {
        opts.set_body(&JsValue::from_str(body));
    }

    let request = Request::new_with_str_and_init(url, &opts)?;
    if body.is_some() {
        request.headers().set("Content-Type", "text/plain")?;
    }

    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
    let response = JsFuture::from(window.fetch_with_request(&request)).await?;
    response.dyn_into()
}

async fn read_text(response: &Response) -> Result<String, JsValue> {
    let text = JsFuture::from(response.text()?).await?;
    text.as_string().ok_or_else(|| JsValue::from_str("Response is not a string"))
}

/// Where blocks are POSTed: the configured URL, else the explorer's `/tx`.
pub fn submit_endpoint(network: Network, configured: Option<&str>) -> String {
    match configured {
        Some(url) => url.trim().to_string(),
        None => format!("{}/tx", network.mempool_api_url()),
    }
}

/// Validate a tip hash response, returning it trimmed.
pub fn parse_tip_hash(text: &str) -> Result<String, String> {
    let hash = text.trim();
    hash_from_display_hex(hash)
        .map(|_| hash.to_string())
        .ok_or_else(|| format!("Invalid tip hash: {:?}", hash))
}

pub fn parse_tip_height(text: &str) -> Result<u32, String> {
    text.trim()
        .parse::<u32>()
        .map_err(|e| format!("Failed to parse height: {}", e))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HashrateResponse {
    current_hashrate: f64,
}

#[derive(Deserialize)]
struct PoolsResponse {
    pools: Vec<PoolEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolEntry {
    name: String,
    block_count: u32,
}

/// Combine the hash rate and pool ranking responses.
pub fn parse_network_stats(hashrate_json: &str, pools_json: &str) -> Result<NetworkStats, String> {
    let hashrate: HashrateResponse =
        serde_json::from_str(hashrate_json).map_err(|e| format!("Failed to parse hashrate: {}", e))?;
    let pools: PoolsResponse = serde_json::from_str(pools_json).map_err(|e| format!("Failed to parse pools: {}", e))?;

    Ok(NetworkStats {
        hashrate: hashrate.current_hashrate,
        pools: pools
            .pools
            .into_iter()
            .map(|p| PoolShare {
                name: p.name,
                block_count: p.block_count,
            })
            .collect(),
    })
}

/// Interpret a submission response. The explorer answers with the id on
/// success and an error message otherwise.
pub fn submit_response(status: u16, body: &str) -> Result<TxId, SubmitError> {
    let body = body.trim();
    match status {
        200..=299 if !body.is_empty() => Ok(TxId(body.to_string())),
        200..=299 => Err(SubmitError::Transport("empty response".to_string())),
        400..=499 => Err(SubmitError::Rejected(body.to_string())),
        _ => Err(SubmitError::Transport(format!("HTTP {}: {}", status, body))),
    }
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    #[wasm_bindgen_test]
    fn test_pool_fraction_from_js() {
        let stats = NetworkStats {
            hashrate: 1.0,
            pools: vec![
                PoolShare { name: "Foundry USA".into(), block_count: 3 },
                PoolShare { name: "AntPool".into(), block_count: 1 },
            ],
        };
        let value = serde_wasm_bindgen::to_value(&stats).unwrap();

        assert_eq!(pool_fraction(value.clone(), "antpool").unwrap(), Some(0.25));
        assert_eq!(pool_fraction(value, "unknown").unwrap(), None);
        assert!(pool_fraction(JsValue::from_str("nope"), "antpool").is_err());
    }

    #[wasm_bindgen_test]
    fn test_submit_url_override() {
        let mut api = BlockchainApi::new("mainnet").unwrap();
        assert_eq!(api.submit_url(), "https://mempool.space/api/tx");
        api.set_submit_url(Some("https://relay.example/block".into()));
        assert_eq!(api.submit_url(), "https://relay.example/block");
        api.set_submit_url(Some("  ".into()));
        assert_eq!(api.submit_url(), "https://mempool.space/api/tx");
    }
}
