//! API Request Handlers

use alloy_primitives::{Address, Bytes, B256, U256};
use axum::{
    body::Body,
    extract::{Extension, Json, Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use super::types::*;
use crate::core::{classify, ApiKeyGateway, SessionManager, SessionSettings, ValidatedKey};
use crate::models::{AppError, ErrorCode, GatewayConfig, PendingTxEvent, TxEventData};
use crate::providers::{
    EndpointRegistry, HttpConnectionCache, SimulationBridge, SimulationOutcome, SimulationRequest, WsConnector,
    WsSessionFactory,
};
use crate::storage::QuotaStore;
use crate::utils::constants::{format_native, known_contract_label, selector_hex, wei_to_gwei};
use crate::utils::telemetry::GatewayTelemetry;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Shared application state
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<EndpointRegistry>,
    pub http_cache: Arc<HttpConnectionCache>,
    pub factory: Arc<WsSessionFactory>,
    pub sessions: Arc<SessionManager>,
    pub gateway: Arc<ApiKeyGateway>,
    pub simulator: Arc<dyn SimulationBridge>,
    pub telemetry: Arc<GatewayTelemetry>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<GatewayConfig>,
        registry: Arc<EndpointRegistry>,
        connector: Arc<dyn WsConnector>,
        store: Arc<dyn QuotaStore>,
        simulator: Arc<dyn SimulationBridge>,
    ) -> Self {
        let telemetry = Arc::new(GatewayTelemetry::new());
        let http_cache = Arc::new(HttpConnectionCache::new(registry.clone(), config.rpc_timeout));
        let factory = Arc::new(WsSessionFactory::new(
            registry.clone(),
            connector,
            config.heartbeat_interval,
        ));
        let sessions = Arc::new(SessionManager::new(
            factory.clone(),
            telemetry.clone(),
            SessionSettings::from_config(&config),
        ));
        let gateway = Arc::new(ApiKeyGateway::new(store, telemetry.clone()));

        Self {
            config,
            registry,
            http_cache,
            factory,
            sessions,
            gateway,
            simulator,
            telemetry,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn parse_address(raw: &str, field: &str, start: Instant) -> Result<Address, ApiFailure> {
    Address::from_str(raw.trim())
        .map_err(|_| failure(&AppError::bad_request(format!("Invalid {} address: {}", field, raw)), elapsed_ms(start)))
}

/// Decimal or 0x-hex wei; missing means zero
fn parse_wei(raw: Option<&str>, start: Instant) -> Result<U256, ApiFailure> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(U256::ZERO),
        Some(v) => U256::from_str(v)
            .map_err(|_| failure(&AppError::bad_request(format!("Invalid value: {}", v)), elapsed_ms(start))),
    }
}

fn parse_calldata(raw: Option<&str>, start: Instant) -> Result<Bytes, ApiFailure> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(Bytes::new()),
        Some(v) => Bytes::from_str(v)
            .map_err(|_| failure(&AppError::bad_request("Calldata must be hex"), elapsed_ms(start))),
    }
}

// ============================================
// Health Check
// ============================================

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<HealthData>> {
    let start = Instant::now();

    let data = HealthData {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        active_sessions: state.sessions.active_sessions(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}

// ============================================
// Discovery
// ============================================

pub async fn list_networks(State(state): State<Arc<AppState>>) -> Json<ApiResponse<NetworksData>> {
    let start = Instant::now();

    let data = NetworksData {
        default_network: state.registry.default_network().id.clone(),
        networks: state.sessions.list_networks(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}

// ============================================
// Live Feed
// ============================================

/// NDJSON feed; the session lives exactly as long as the response body
pub async fn stream_network(State(state): State<Arc<AppState>>, Path(network): Path<String>) -> Response {
    let (handle, rx) = match state.sessions.subscribe(&network).await {
        Ok(opened) => opened,
        Err(e) => {
            warn!(network = %network, "Stream subscription refused: {}", e);
            return e.into_response();
        }
    };

    info!(session = %handle.id(), network = %handle.network().id, "📺 Client attached to live feed");

    // shutdown ends the body, which drops the handle and with it the session
    let stop = state.sessions.shutdown_notice();
    let lines = futures_util::stream::unfold((rx, handle, stop), |(mut rx, handle, mut stop)| async move {
        tokio::select! {
            event = rx.recv() => {
                let event = event?;
                Some((Ok::<_, Infallible>(event.to_line()), (rx, handle, stop)))
            }
            _ = &mut stop => {
                info!(session = %handle.id(), "Live feed ended by shutdown");
                None
            }
        }
    });

    (
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response()
}

// ============================================
// Statistics
// ============================================

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StatsData>> {
    let start = Instant::now();

    let data = StatsData {
        telemetry: state.telemetry.get_stats(),
        live_heartbeats: state.factory.live_heartbeats(),
        sessions: state.sessions.sessions(),
        http_clients: state.http_cache.len(),
    };

    Json(ApiResponse::success(data, elapsed_ms(start)))
}

// ============================================
// Classification
// ============================================

pub async fn classify_tx(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ClassifyRequest>,
) -> HandlerResult<ClassifyData> {
    let start = Instant::now();

    let from = parse_address(&req.from, "from", start)?;
    let to = match req.to.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(raw) => Some(parse_address(raw, "to", start)?),
        None => None,
    };
    let tx = PendingTxEvent {
        hash: B256::ZERO,
        from,
        to,
        value: parse_wei(req.value.as_deref(), start)?,
        input: parse_calldata(req.data.as_deref(), start)?,
        gas_limit: req.gas_limit,
    };

    let network = state.registry.resolve(req.network.as_deref().unwrap_or_default());
    let risk = classify(&tx);

    let data = ClassifyData {
        network: network.id.clone(),
        risk_score: risk.score,
        risk_level: risk.level,
        risk_reasons: risk.reasons,
        known_contract: to
            .and_then(|to| known_contract_label(network.chain_id, &to))
            .map(str::to_string),
        calldata_prefix: selector_hex(&tx.input),
    };

    Ok(Json(ApiResponse::success(data, elapsed_ms(start))))
}

// ============================================
// Simulation
// ============================================

pub async fn simulate(
    State(state): State<Arc<AppState>>,
    Extension(key): Extension<ValidatedKey>,
    Json(req): Json<SimulateBody>,
) -> HandlerResult<SimulationOutcome> {
    let start = Instant::now();

    let sender = parse_address(&req.from, "from", start)?;
    let to = parse_address(&req.to, "to", start)?;
    let value = parse_wei(req.value.as_deref(), start)?;
    let data = parse_calldata(req.data.as_deref(), start)?;
    let network = state.registry.resolve(req.network.as_deref().unwrap_or_default());

    let request = SimulationRequest {
        sender: sender.to_checksum(None),
        to: to.to_checksum(None),
        value_wei: value.to_string(),
        data: format!("0x{}", hex::encode(&data)),
        gas_limit: req.gas_limit,
        network: network.id.clone(),
        rpc_url: Some(network.http_url.clone()),
    };

    info!(network = %network.id, key_prefix = %key.record.prefix, plan = key.plan.id, "🧪 Simulation requested");

    match state.simulator.simulate(&request).await {
        Ok(outcome) => {
            info!(
                network = %network.id,
                steps = outcome.steps,
                elapsed_ms = outcome.elapsed_ms,
                "✅ Simulation finished"
            );
            Ok(Json(ApiResponse::success(outcome, elapsed_ms(start))))
        }
        Err(e) => {
            warn!(network = %network.id, code = e.code_str(), "❌ Simulation failed: {}", e.message);
            Err(failure(&e, elapsed_ms(start)))
        }
    }
}

// ============================================
// Network State
// ============================================

pub async fn address_info(
    State(state): State<Arc<AppState>>,
    Path((network, address)): Path<(String, String)>,
) -> HandlerResult<AddressInfoData> {
    let start = Instant::now();

    let address = parse_address(&address, "account", start)?;
    let client = state
        .http_cache
        .get_http_connection(&network)
        .map_err(|e| failure(&e, elapsed_ms(start)))?;

    let (balance, nonce, code) = tokio::try_join!(
        client.balance(address),
        client.transaction_count(address),
        client.code(address),
    )
    .map_err(|e| failure(&e, elapsed_ms(start)))?;

    let net = client.network();
    let data = AddressInfoData {
        network: net.id.clone(),
        chain_id: net.chain_id,
        address: address.to_checksum(None),
        balance_wei: balance.to_string(),
        balance_native: format_native(balance),
        symbol: net.symbol.clone(),
        nonce,
        is_contract: !code.is_empty(),
        code_size: code.len(),
        explorer_url: format!("{}/address/{}", net.explorer, address.to_checksum(None)),
    };

    Ok(Json(ApiResponse::success(data, elapsed_ms(start))))
}

pub async fn gas_info(
    State(state): State<Arc<AppState>>,
    Path(network): Path<String>,
) -> HandlerResult<GasData> {
    let start = Instant::now();

    let client = state
        .http_cache
        .get_http_connection(&network)
        .map_err(|e| failure(&e, elapsed_ms(start)))?;

    let (chain_id, gas_price, (block_number, base_fee)) =
        tokio::try_join!(client.chain_id(), client.gas_price(), client.latest_base_fee())
            .map_err(|e| failure(&e, elapsed_ms(start)))?;

    let net = client.network();
    if chain_id != net.chain_id {
        warn!(network = %net.id, expected = net.chain_id, reported = chain_id, "⚠️ Upstream reports a different chain id");
    }
    let data = GasData {
        network: net.id.clone(),
        chain_id,
        block_number,
        gas_price_wei: gas_price.to_string(),
        gas_price_gwei: wei_to_gwei(gas_price),
        base_fee_wei: base_fee.map(|fee| fee.to_string()),
        base_fee_gwei: base_fee.map(wei_to_gwei),
    };

    Ok(Json(ApiResponse::success(data, elapsed_ms(start))))
}

/// Look up a transaction by hash and classify it
pub async fn tx_info(
    State(state): State<Arc<AppState>>,
    Path((network, hash)): Path<(String, String)>,
) -> HandlerResult<TxEventData> {
    let start = Instant::now();

    let hash = B256::from_str(hash.trim())
        .map_err(|_| failure(&AppError::bad_request(format!("Invalid transaction hash: {}", hash)), elapsed_ms(start)))?;
    let client = state
        .http_cache
        .get_http_connection(&network)
        .map_err(|e| failure(&e, elapsed_ms(start)))?;

    let tx = client
        .transaction_by_hash(hash)
        .await
        .map_err(|e| failure(&e, elapsed_ms(start)))?
        .ok_or_else(|| {
            failure(
                &AppError::new(ErrorCode::ApiNotFound, format!("Transaction {:#x} not found", hash)),
                elapsed_ms(start),
            )
        })?;

    let net = client.network();
    let risk = classify(&tx);
    let label = tx
        .to
        .and_then(|to| known_contract_label(net.chain_id, &to))
        .map(str::to_string);

    Ok(Json(ApiResponse::success(
        TxEventData::new(&tx, risk, &net.id, label),
        elapsed_ms(start),
    )))
}

/// Fallback for unmatched routes
pub async fn not_found() -> Response {
    AppError::new(ErrorCode::ApiNotFound, "No such route").into_response()
}
