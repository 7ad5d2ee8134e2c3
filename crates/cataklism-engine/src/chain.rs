//! Blockchain node access over JSON-RPC.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::FetchError;

/// Header fields of the latest block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view of one network's node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Network name, e.g. `ethereum`.
    fn network(&self) -> &str;

    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<u128, FetchError>;

    async fn latest_block(&self) -> Result<BlockHeader, FetchError>;

    /// Deployed bytecode at `address` as a hex string. `0x` when empty.
    async fn code_at(&self, address: &str) -> Result<String, FetchError>;
}

/// [`ChainClient`] speaking Ethereum JSON-RPC over HTTP.
pub struct JsonRpcClient {
    network: String,
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Create a new client with a per-request timeout.
    pub fn new(
        network: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Unreachable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            network: network.into(),
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, FetchError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(network = %self.network, method, "JSON-RPC call");

        let response = self.client.post(&self.url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Unreachable(format!(
                "{} returned HTTP {}",
                self.network,
                response.status()
            )));
        }

        let mut body: Value = response.json().await?;
        if let Some(err) = body.get("error") {
            return Err(FetchError::Unreachable(format!("{} node error: {}", self.network, err)));
        }
        match body.get_mut("result").map(Value::take) {
            Some(Value::Null) | None => Err(FetchError::MalformedResponse(format!(
                "{} returned no result for {}",
                self.network, method
            ))),
            Some(result) => Ok(result),
        }
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &Value) -> Result<u128, FetchError> {
    let text = value
        .as_str()
        .ok_or_else(|| FetchError::MalformedResponse(format!("expected hex string, got {}", value)))?;
    let digits = text.strip_prefix("0x").unwrap_or(text);
    u128::from_str_radix(digits, 16)
        .map_err(|e| FetchError::MalformedResponse(format!("invalid quantity '{}': {}", text, e)))
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    fn network(&self) -> &str {
        &self.network
    }

    async fn gas_price(&self) -> Result<u128, FetchError> {
        let result = self.call("eth_gasPrice", json!([])).await?;
        parse_quantity(&result)
    }

    async fn latest_block(&self) -> Result<BlockHeader, FetchError> {
        let block = self
            .call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let field = |name: &str| {
            block
                .get(name)
                .ok_or_else(|| FetchError::MalformedResponse(format!("block is missing '{}'", name)))
                .and_then(parse_quantity)
        };

        let number = u64::try_from(field("number")?)
            .map_err(|_| FetchError::MalformedResponse("block number out of range".to_string()))?;
        let secs = i64::try_from(field("timestamp")?)
            .map_err(|_| FetchError::MalformedResponse("block timestamp out of range".to_string()))?;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| FetchError::MalformedResponse(format!("invalid block timestamp {}", secs)))?;

        Ok(BlockHeader { number, timestamp })
    }

    async fn code_at(&self, address: &str) -> Result<String, FetchError> {
        let result = self.call("eth_getCode", json!([address, "latest"])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| FetchError::MalformedResponse(format!("expected hex code, got {}", result)))
    }
}
