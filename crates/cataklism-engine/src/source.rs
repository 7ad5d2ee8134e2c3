//! Metric sources.
//!
//! A source performs one fetch and turns the result into a [`Snapshot`].
//! Fetches are cancelled by dropping the future; the scheduler does that on
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::chain::ChainClient;
use crate::error::FetchError;
use crate::snapshot::Snapshot;

/// Produces snapshots on demand.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Source identifier, stamped on every snapshot.
    fn name(&self) -> &str;

    /// Fetch one snapshot.
    async fn fetch(&self) -> Result<Snapshot, FetchError>;
}

/// Numeric fields of the protocol stats payload, with their snapshot names.
const PROTOCOL_FIELDS: &[(&str, &str)] = &[
    ("tvl", "total_value_locked"),
    ("total_stakers", "total_stakers"),
    ("active_pools", "active_pools"),
    ("avg_apy", "average_apy"),
    ("token_price", "token_price"),
    ("market_cap", "market_cap"),
    ("vault_tvl", "vault_tvl"),
    ("vault_apy", "vault_apy"),
    ("gas_price", "gas_price"),
    ("block_number", "block_number"),
];

/// Protocol statistics from the Cataklism HTTP API.
pub struct ProtocolApiSource {
    url: String,
    client: reqwest::Client,
}

impl ProtocolApiSource {
    pub const NAME: &'static str = "protocol";

    /// Create a new source for `base_url + stats_path`.
    pub fn new(base_url: &str, stats_path: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Unreachable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: format!("{}{}", base_url.trim_end_matches('/'), stats_path),
            client,
        })
    }

    /// Build a snapshot from a stats payload. Every field is required.
    pub fn parse(body: &Value) -> Result<Snapshot, FetchError> {
        let mut builder = Snapshot::builder(Self::NAME, Utc::now());
        for (key, name) in PROTOCOL_FIELDS {
            builder = builder.field(*name, number_field(body, key)?);
        }
        let health = match body.get("network_health") {
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(FetchError::MalformedResponse(format!(
                    "network_health is not a boolean: {}",
                    other
                )));
            }
            None => return Err(missing("network_health")),
        };
        Ok(builder.field("network_health", health).build())
    }
}

fn missing(field: &str) -> FetchError {
    FetchError::MalformedResponse(format!("missing field '{}'", field))
}

/// Numeric field that may arrive as a JSON number or a numeric string.
fn number_field(body: &Value, key: &str) -> Result<f64, FetchError> {
    let value = body.get(key).ok_or_else(|| missing(key))?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| FetchError::MalformedResponse(format!("field '{}' is not numeric: {}", key, value)))
}

#[async_trait]
impl MetricSource for ProtocolApiSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let response = self.client.get(&self.url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Unreachable(format!(
                "{} returned HTTP {}",
                self.url,
                response.status()
            )));
        }
        let body: Value = response.json().await?;
        Self::parse(&body)
    }
}

/// Gas price of one network, in gwei.
pub struct GasPriceSource {
    name: String,
    chain: Arc<dyn ChainClient>,
}

impl GasPriceSource {
    /// Create a new gas price source for the client's network.
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self {
            name: format!("gas:{}", chain.network()),
            chain,
        }
    }
}

#[async_trait]
impl MetricSource for GasPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Snapshot, FetchError> {
        let wei = self.chain.gas_price().await?;
        let gwei = wei as f64 / 1e9;
        Ok(Snapshot::builder(self.name.clone(), Utc::now())
            .field("gas_price_gwei", gwei)
            .build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::BlockHeader;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn stats() -> Value {
        json!({
            "tvl": 1000000.0,
            "total_stakers": 1200,
            "active_pools": 8,
            "avg_apy": "12.5",
            "token_price": 2.4,
            "market_cap": 24000000,
            "vault_tvl": 400000,
            "vault_apy": 9.1,
            "gas_price": 30,
            "block_number": 19000000,
            "network_health": true
        })
    }

    #[test]
    fn test_parse_complete_payload() {
        let snapshot = ProtocolApiSource::parse(&stats()).unwrap();
        assert_eq!(snapshot.source(), "protocol");
        assert_eq!(snapshot.get("total_value_locked"), Some(1_000_000.0));
        assert_eq!(snapshot.get("average_apy"), Some(12.5));
        assert_eq!(snapshot.get("network_health"), Some(1.0));
        assert_eq!(snapshot.fields().len(), 11);
    }

    #[test]
    fn test_parse_missing_field() {
        let mut body = stats();
        body.as_object_mut().unwrap().remove("vault_apy");
        let err = ProtocolApiSource::parse(&body).unwrap_err();
        assert_eq!(err, FetchError::MalformedResponse("missing field 'vault_apy'".to_string()));
    }

    #[test]
    fn test_parse_non_numeric_field() {
        let mut body = stats();
        body["tvl"] = json!("lots");
        assert!(matches!(
            ProtocolApiSource::parse(&body),
            Err(FetchError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_from_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/protocol/stats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stats()))
            .mount(&server)
            .await;

        let source =
            ProtocolApiSource::new(&server.uri(), "/api/protocol/stats", Duration::from_secs(5)).unwrap();
        let snapshot = source.fetch().await.unwrap();
        assert_eq!(snapshot.get("total_stakers"), Some(1200.0));
    }

    #[tokio::test]
    async fn test_fetch_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = ProtocolApiSource::new(&server.uri(), "/stats", Duration::from_secs(5)).unwrap();
        assert!(matches!(source.fetch().await, Err(FetchError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_fetch_invalid_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let source = ProtocolApiSource::new(&server.uri(), "/stats", Duration::from_secs(5)).unwrap();
        assert!(matches!(source.fetch().await, Err(FetchError::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let source =
            ProtocolApiSource::new(&server.uri(), "/stats", Duration::from_millis(100)).unwrap();
        assert_eq!(source.fetch().await.unwrap_err(), FetchError::Timeout);
    }

    struct FixedChain;

    #[async_trait]
    impl ChainClient for FixedChain {
        fn network(&self) -> &str {
            "ethereum"
        }

        async fn gas_price(&self) -> Result<u128, FetchError> {
            Ok(120_000_000_000)
        }

        async fn latest_block(&self) -> Result<BlockHeader, FetchError> {
            Err(FetchError::Timeout)
        }

        async fn code_at(&self, _address: &str) -> Result<String, FetchError> {
            Ok("0x".to_string())
        }
    }

    #[tokio::test]
    async fn test_gas_source_converts_to_gwei() {
        let source = GasPriceSource::new(Arc::new(FixedChain));
        assert_eq!(source.name(), "gas:ethereum");
        let snapshot = source.fetch().await.unwrap();
        assert_eq!(snapshot.get("gas_price_gwei"), Some(120.0));
    }
}
