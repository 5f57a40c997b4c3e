//! HTTP JSON-RPC client and the per-network HTTP Connection Cache
//!
//! One lazily-built client per network, reused for the process lifetime.
//! Transient failures (timeouts, connect errors, HTTP 429) are retried with
//! exponential backoff plus jitter; anything else surfaces on the first try.
//! A broken handle is never evicted: callers see a per-call error.

use alloy_primitives::{Address, Bytes, B256, U256};
use dashmap::DashMap;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::{AppError, AppResult, ErrorCode, NetworkConfig, PendingTxEvent};
use crate::providers::registry::EndpointRegistry;
use crate::utils::constants::{mask_url, USER_AGENT as USER_AGENT_CONST};

// ============================================
// RETRY CONSTANTS
// ============================================

/// Attempts per call, first try included
pub const MAX_ATTEMPTS: u32 = 3;

/// Delay before the first retry (doubles each time)
pub const BASE_RETRY_MS: u64 = 250;

/// Ceiling for a single backoff step
pub const MAX_RETRY_MS: u64 = 4_000;

/// ±jitter applied to each backoff step
pub const RETRY_JITTER_PERCENT: u64 = 20;

/// Backoff before retry number `attempt` (1-based)
pub fn backoff_delay(attempt: u32) -> Duration {
    let base = BASE_RETRY_MS.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
    let capped = base.min(MAX_RETRY_MS);
    let jitter_range = (capped * RETRY_JITTER_PERCENT) / 100;
    let jitter: i64 = rand::thread_rng().gen_range(-(jitter_range as i64)..=(jitter_range as i64));
    Duration::from_millis((capped as i64 + jitter).max(50) as u64)
}

fn is_transient(code: ErrorCode) -> bool {
    matches!(
        code,
        ErrorCode::RpcTimeout | ErrorCode::RpcRateLimited | ErrorCode::RpcConnectionFailed
    )
}

// ============================================
// HEX QUANTITY PARSING
// ============================================

/// Strict `0x`-prefixed hex quantity to u64
pub fn parse_quantity_u64(raw: &str) -> AppResult<u64> {
    let digits = raw
        .strip_prefix("0x")
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::invalid_response(format!("Not a hex quantity: {:?}", raw)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| AppError::invalid_response(format!("Not a hex quantity: {:?}", raw)))
}

/// Strict `0x`-prefixed hex quantity to U256
pub fn parse_quantity_u256(raw: &str) -> AppResult<U256> {
    if !raw.starts_with("0x") || raw.len() < 3 {
        return Err(AppError::invalid_response(format!("Not a hex quantity: {:?}", raw)));
    }
    U256::from_str(raw).map_err(|_| AppError::invalid_response(format!("Not a hex quantity: {:?}", raw)))
}

// ============================================
// WIRE TYPES
// ============================================

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl RpcErrorObject {
    /// Providers report throttling as -32005 or in the message
    pub fn is_rate_limit(&self) -> bool {
        self.code == -32005 || self.message.to_lowercase().contains("rate limit")
    }
}

/// `eth_getTransactionByHash` reply, only the fields the gateway reads
#[derive(Debug, Clone, Deserialize)]
pub struct RpcTransaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: String,
    #[serde(default)]
    pub input: Bytes,
    pub gas: String,
}

impl RpcTransaction {
    pub fn into_event(self) -> AppResult<PendingTxEvent> {
        Ok(PendingTxEvent {
            hash: self.hash,
            from: self.from,
            to: self.to,
            value: parse_quantity_u256(&self.value)?,
            input: self.input,
            gas_limit: parse_quantity_u64(&self.gas)?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockHeader {
    number: String,
    base_fee_per_gas: Option<String>,
}

// ============================================
// HTTP CLIENT
// ============================================

/// JSON-RPC over HTTP for one network
#[derive(Debug)]
pub struct HttpRpcClient {
    network: Arc<NetworkConfig>,
    client: reqwest::Client,
    request_id: AtomicU64,
}

impl HttpRpcClient {
    pub fn new(network: Arc<NetworkConfig>, timeout: Duration) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| AppError::with_source(ErrorCode::RpcConnectionFailed, "Failed to build HTTP client", e))?;

        Ok(Self {
            network,
            client,
            request_id: AtomicU64::new(1),
        })
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Endpoint URL with any key segment hidden
    pub fn masked_url(&self) -> String {
        mask_url(&self.network.http_url)
    }

    /// JSON-RPC call with bounded retries on transient failures
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> AppResult<T> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
        });

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute::<T>(&payload).await {
                Ok(value) => return Ok(value),
                Err(e) if is_transient(e.code) && attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        network = %self.network.id,
                        method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "⏳ Transient RPC failure, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    debug!(network = %self.network.id, method, "RPC call failed: {}", e);
                    return Err(e);
                }
            }
        }
    }

    /// Like `call`, but a JSON `null` result is `Ok(None)`
    async fn call_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> AppResult<Option<T>> {
        self.call::<Option<T>>(method, params).await
    }

    async fn execute<T: DeserializeOwned>(&self, payload: &serde_json::Value) -> AppResult<T> {
        let response = self
            .client
            .post(&self.network.http_url)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AppError::rpc_rate_limited());
        }
        if !status.is_success() {
            return Err(AppError::rpc_error(format!("HTTP error: {}", status)));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| AppError::with_source(ErrorCode::RpcInvalidResponse, "Failed to parse response", e))?;

        if let Some(error) = body.error {
            if error.is_rate_limit() {
                return Err(AppError::rpc_rate_limited());
            }
            return Err(AppError::rpc_error(format!("RPC error: {} (code: {})", error.message, error.code)));
        }

        match body.result {
            Some(result) => Ok(result),
            // `null` results are valid for Option<T>; retry deserializing from null
            None => serde_json::from_value(serde_json::Value::Null)
                .map_err(|_| AppError::invalid_response("No result in response")),
        }
    }

    pub async fn chain_id(&self) -> AppResult<u64> {
        let raw: String = self.call("eth_chainId", serde_json::json!([])).await?;
        parse_quantity_u64(&raw)
    }

    pub async fn block_number(&self) -> AppResult<u64> {
        let raw: String = self.call("eth_blockNumber", serde_json::json!([])).await?;
        parse_quantity_u64(&raw)
    }

    pub async fn balance(&self, address: Address) -> AppResult<U256> {
        let raw: String = self
            .call("eth_getBalance", serde_json::json!([address, "latest"]))
            .await?;
        parse_quantity_u256(&raw)
    }

    /// Account nonce
    pub async fn transaction_count(&self, address: Address) -> AppResult<u64> {
        let raw: String = self
            .call("eth_getTransactionCount", serde_json::json!([address, "latest"]))
            .await?;
        parse_quantity_u64(&raw)
    }

    pub async fn code(&self, address: Address) -> AppResult<Bytes> {
        self.call("eth_getCode", serde_json::json!([address, "latest"])).await
    }

    pub async fn gas_price(&self) -> AppResult<U256> {
        let raw: String = self.call("eth_gasPrice", serde_json::json!([])).await?;
        parse_quantity_u256(&raw)
    }

    /// Latest block number and base fee (`None` on pre-London chains)
    pub async fn latest_base_fee(&self) -> AppResult<(u64, Option<U256>)> {
        let header: Option<BlockHeader> = self
            .call_optional("eth_getBlockByNumber", serde_json::json!(["latest", false]))
            .await?;
        let header = header.ok_or_else(|| AppError::invalid_response("Latest block missing"))?;
        let number = parse_quantity_u64(&header.number)?;
        let base_fee = header
            .base_fee_per_gas
            .as_deref()
            .map(parse_quantity_u256)
            .transpose()?;
        Ok((number, base_fee))
    }

    /// `None` when the node does not know the hash (mined-and-pruned or dropped)
    pub async fn transaction_by_hash(&self, hash: B256) -> AppResult<Option<PendingTxEvent>> {
        let tx: Option<RpcTransaction> = self
            .call_optional("eth_getTransactionByHash", serde_json::json!([hash]))
            .await?;
        tx.map(RpcTransaction::into_event).transpose()
    }
}

// ============================================
// CONNECTION CACHE
// ============================================

/// One HTTP client per network id, created on first use
pub struct HttpConnectionCache {
    registry: Arc<EndpointRegistry>,
    timeout: Duration,
    clients: DashMap<String, Arc<HttpRpcClient>>,
}

impl HttpConnectionCache {
    pub fn new(registry: Arc<EndpointRegistry>, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
            clients: DashMap::new(),
        }
    }

    /// Same handle for every call with the same (resolved) network id
    pub fn get_http_connection(&self, network_id: &str) -> AppResult<Arc<HttpRpcClient>> {
        let network = self.registry.resolve(network_id);

        if let Some(existing) = self.clients.get(&network.id) {
            return Ok(existing.value().clone());
        }

        let entry = self
            .clients
            .entry(network.id.clone())
            .or_try_insert_with(|| {
                let client = HttpRpcClient::new(network.clone(), self.timeout)?;
                info!(network = %network.id, endpoint = %client.masked_url(), "✅ HTTP RPC client created");
                Ok::<_, AppError>(Arc::new(client))
            })?;
        Ok(entry.value().clone())
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
