//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so logs and API responses can be
//! correlated without parsing messages.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - RPC_xxx: HTTP JSON-RPC errors
//! - WS_xxx: WebSocket session errors
//! - AUTH_xxx / QUOTA_xxx: API key gateway verdicts
//! - API_xxx: HTTP surface errors
//! - SIM_xxx: External simulation engine errors
//! - STORE_xxx: Quota store errors

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // RPC Errors
    // ============================================
    /// RPC connection failed
    RpcConnectionFailed,
    /// RPC request timeout
    RpcTimeout,
    /// RPC rate limited (HTTP 429)
    RpcRateLimited,
    /// RPC returned error response
    RpcError,
    /// Invalid RPC response
    RpcInvalidResponse,

    // ============================================
    // WebSocket Session Errors
    // ============================================
    /// Opening the upstream socket failed
    WsConnectFailed,
    /// Subscription request rejected or failed
    WsSubscribeFailed,
    /// Upstream subscription stream ended
    WsStreamClosed,
    /// Transient error on an open subscription
    WsTransient,

    // ============================================
    // Gateway Verdicts
    // ============================================
    /// No key material presented
    AuthKeyRequired,
    /// Key unknown, revoked or inactive
    AuthInvalidKey,
    /// Owning account is not active
    AuthAccountInactive,
    /// Plan quota exhausted
    QuotaLimitReached,

    // ============================================
    // API Errors
    // ============================================
    /// Invalid request format
    ApiBadRequest,
    /// Internal server error
    ApiInternalError,
    /// Resource not found
    ApiNotFound,
    /// Gateway is shutting down
    ApiUnavailable,

    // ============================================
    // Simulation Engine Errors
    // ============================================
    /// Engine process failed or returned garbage
    SimulationFailed,
    /// Engine did not answer in time
    SimulationTimeout,

    // ============================================
    // Storage / Configuration Errors
    // ============================================
    /// Unique constraint violated (duplicate key hash)
    StoreConflict,
    /// Invalid configuration value
    ConfigInvalidValue,

    // ============================================
    // Generic Errors
    // ============================================
    /// Unknown error
    Unknown,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RpcConnectionFailed => "RPC_CONNECTION_FAILED",
            Self::RpcTimeout => "RPC_TIMEOUT",
            Self::RpcRateLimited => "RPC_RATE_LIMITED",
            Self::RpcError => "RPC_ERROR",
            Self::RpcInvalidResponse => "RPC_INVALID_RESPONSE",

            Self::WsConnectFailed => "WS_CONNECT_FAILED",
            Self::WsSubscribeFailed => "WS_SUBSCRIBE_FAILED",
            Self::WsStreamClosed => "WS_STREAM_CLOSED",
            Self::WsTransient => "WS_TRANSIENT",

            Self::AuthKeyRequired => "AUTH_KEY_REQUIRED",
            Self::AuthInvalidKey => "AUTH_INVALID_KEY",
            Self::AuthAccountInactive => "AUTH_ACCOUNT_INACTIVE",
            Self::QuotaLimitReached => "QUOTA_LIMIT_REACHED",

            Self::ApiBadRequest => "API_BAD_REQUEST",
            Self::ApiInternalError => "API_INTERNAL_ERROR",
            Self::ApiNotFound => "API_NOT_FOUND",
            Self::ApiUnavailable => "API_UNAVAILABLE",

            Self::SimulationFailed => "SIM_FAILED",
            Self::SimulationTimeout => "SIM_TIMEOUT",

            Self::StoreConflict => "STORE_CONFLICT",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ApiBadRequest | Self::ConfigInvalidValue => 400,
            Self::AuthKeyRequired | Self::AuthInvalidKey | Self::AuthAccountInactive => 401,
            Self::ApiNotFound => 404,
            Self::StoreConflict => 409,
            Self::QuotaLimitReached | Self::RpcRateLimited => 429,
            Self::RpcConnectionFailed
            | Self::RpcError
            | Self::RpcInvalidResponse
            | Self::WsConnectFailed
            | Self::WsSubscribeFailed
            | Self::SimulationFailed => 502,
            Self::ApiUnavailable => 503,
            Self::RpcTimeout | Self::SimulationTimeout => 504,
            _ => 500,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RpcTimeout
                | Self::RpcRateLimited
                | Self::RpcConnectionFailed
                | Self::WsTransient
                | Self::QuotaLimitReached
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    /// RPC connection failed
    pub fn rpc_connection_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcConnectionFailed, msg)
    }

    /// RPC timeout
    pub fn rpc_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcTimeout, msg)
    }

    /// RPC rate limited
    pub fn rpc_rate_limited() -> Self {
        Self::new(ErrorCode::RpcRateLimited, "Rate limited (HTTP 429)")
    }

    /// Upstream returned a JSON-RPC error object
    pub fn rpc_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcError, msg)
    }

    /// Upstream reply could not be decoded
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcInvalidResponse, msg)
    }

    /// WebSocket open failed
    pub fn ws_connect_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::WsConnectFailed, msg)
    }

    /// Upstream subscription ended
    pub fn ws_stream_closed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::WsStreamClosed, msg)
    }

    /// Transient error on an open subscription
    pub fn ws_transient(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::WsTransient, msg)
    }

    /// Simulation failed
    pub fn simulation_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SimulationFailed, msg)
    }

    /// API bad request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiBadRequest, msg)
    }

    /// API internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiInternalError, msg)
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::Unknown, "IO error", err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::RpcTimeout, "Request timeout")
        } else if err.is_connect() {
            Self::new(ErrorCode::RpcConnectionFailed, "Connection failed")
        } else if err.status().map(|s| s.as_u16()) == Some(429) {
            Self::rpc_rate_limited()
        } else {
            Self::new(ErrorCode::RpcError, err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::RpcInvalidResponse, "JSON parse error", err)
    }
}

impl From<alloy::transports::TransportError> for AppError {
    fn from(err: alloy::transports::TransportError) -> Self {
        Self::new(ErrorCode::WsTransient, err.to_string())
    }
}
