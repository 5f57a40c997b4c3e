//! API Request/Response Types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::core::{Rejection, SessionInfo};
use crate::models::{AppError, RiskLevel};
use crate::providers::NetworkSummary;
use crate::utils::telemetry::TelemetryStats;

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub latency_ms: f64,
    pub timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, latency_ms: f64) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(error: ApiError, latency_ms: f64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            latency_ms,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// API Error
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&AppError> for ApiError {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code_str().to_string(),
            message: err.message.clone(),
            details: None,
        }
    }
}

impl From<&Rejection> for ApiError {
    fn from(rejection: &Rejection) -> Self {
        let details = match rejection {
            Rejection::LimitReached { limit, .. } => Some(format!("limit: {}", limit)),
            Rejection::AccountInactive(status) => Some(format!("account_status: {}", status.as_str())),
            _ => None,
        };
        Self {
            code: rejection.code().as_str().to_string(),
            message: rejection.message(),
            details,
        }
    }
}

/// Handler error: status plus the standard envelope
pub type ApiFailure = (StatusCode, Json<ApiResponse<()>>);

pub type HandlerResult<T> = Result<Json<ApiResponse<T>>, ApiFailure>;

pub fn failure(err: &AppError, latency_ms: f64) -> ApiFailure {
    let status = StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ApiResponse::error(ApiError::from(err), latency_ms)))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        failure(&self, 0.0).into_response()
    }
}

// ============================================
// Health / Discovery / Stats
// ============================================

#[derive(Debug, Serialize)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct NetworksData {
    pub default_network: String,
    pub networks: Vec<NetworkSummary>,
}

#[derive(Debug, Serialize)]
pub struct StatsData {
    #[serde(flatten)]
    pub telemetry: TelemetryStats,
    pub live_heartbeats: usize,
    pub http_clients: usize,
    pub sessions: Vec<SessionInfo>,
}

// ============================================
// Network state
// ============================================

#[derive(Debug, Serialize)]
pub struct AddressInfoData {
    pub network: String,
    pub chain_id: u64,
    pub address: String,
    pub balance_wei: String,
    pub balance_native: String,
    pub symbol: String,
    pub nonce: u64,
    pub is_contract: bool,
    pub code_size: usize,
    pub explorer_url: String,
}

#[derive(Debug, Serialize)]
pub struct GasData {
    pub network: String,
    pub chain_id: u64,
    pub block_number: u64,
    pub gas_price_wei: String,
    pub gas_price_gwei: f64,
    pub base_fee_wei: Option<String>,
    pub base_fee_gwei: Option<f64>,
}

// ============================================
// Classification
// ============================================

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    /// Wei, decimal or 0x-hex
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    #[serde(default)]
    pub network: Option<String>,
}

fn default_gas_limit() -> u64 {
    21_000
}

#[derive(Debug, Serialize)]
pub struct ClassifyData {
    pub network: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub risk_reasons: Vec<String>,
    pub known_contract: Option<String>,
    pub calldata_prefix: String,
}

// ============================================
// Simulation
// ============================================

#[derive(Debug, Deserialize)]
pub struct SimulateBody {
    pub from: String,
    pub to: String,
    /// Wei, decimal or 0x-hex
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default = "default_sim_gas")]
    pub gas_limit: u64,
    #[serde(default)]
    pub network: Option<String>,
}

fn default_sim_gas() -> u64 {
    500_000
}
