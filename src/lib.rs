//! ShadowGuard Library
//!
//! Real-time chain-event gateway:
//! - Live mempool feeds per network over rotating WebSocket endpoints
//! - Rule-based risk classification of every pending transaction
//! - API-key gating with per-plan request quotas
//! - Cached HTTP JSON-RPC access and an external simulation engine bridge
//!
//! ## Module Structure
//!
//! - `api/` - axum HTTP surface
//! - `core/` - risk classifier, stream sessions, key gateway
//! - `models/` - configuration, errors, plans, wire types
//! - `providers/` - endpoint registry, RPC cache, WebSocket factory, simulation bridge
//! - `storage/` - quota store and key issuance
//! - `utils/` - constants and telemetry

pub mod api;
pub mod core;
pub mod models;
pub mod providers;
pub mod storage;
pub mod utils;

pub use crate::core::{classify, ApiKeyGateway, Rejection, SessionHandle, SessionManager, ValidatedKey, Verdict};
pub use models::{
    AppError, AppResult, ErrorCode, GatewayConfig, NetworkConfig, PendingTxEvent, Plan, RiskClassification,
    RiskLevel, StreamEvent,
};
pub use providers::{EndpointRegistry, HttpConnectionCache, WsSessionFactory};
pub use storage::{InMemoryQuotaStore, QuotaStore};
pub use utils::telemetry::{GatewayTelemetry, TelemetryStats};
