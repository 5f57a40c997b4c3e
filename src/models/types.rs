//! Type definitions for the chain-event gateway
//! Pending transactions, risk verdicts and the client stream wire format

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::constants::{format_native, selector_hex};

/// Risk level classification for pending transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Score below 30
    Low,
    /// Score 30..=49
    Medium,
    /// Score 50..=69
    High,
    /// Score 70 and above
    Critical,
}

impl RiskLevel {
    /// Map a capped score to its level
    pub fn from_score(score: u8) -> Self {
        match score {
            70..=u8::MAX => RiskLevel::Critical,
            50..=69 => RiskLevel::High,
            30..=49 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            RiskLevel::Low => "✅",
            RiskLevel::Medium => "🟠",
            RiskLevel::High => "🔴",
            RiskLevel::Critical => "💀",
        }
    }
}

/// A transaction observed in the mempool, resolved to full fields.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTxEvent {
    pub hash: B256,
    pub from: Address,
    /// `None` means contract creation
    pub to: Option<Address>,
    /// Native-unit integer (wei)
    pub value: U256,
    #[serde(default)]
    pub input: Bytes,
    pub gas_limit: u64,
}

impl PendingTxEvent {
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// Derived verdict of the risk classifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskClassification {
    /// Capped at 100
    pub score: u8,
    /// Ordered, one per triggered rule that names itself
    pub reasons: Vec<String>,
    pub level: RiskLevel,
}

// ============================================
// Client stream events
// ============================================

/// Classified transaction as pushed to a stream client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxEventData {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    /// Wei as decimal string
    pub value: String,
    /// Human decimal in native units
    pub value_native: String,
    pub calldata_prefix: String,
    pub calldata_len: usize,
    pub gas_limit: u64,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub risk_reasons: Vec<String>,
    pub network: String,
    pub known_contract: Option<String>,
    /// Unix milliseconds
    pub timestamp: i64,
}

impl TxEventData {
    pub fn new(
        tx: &PendingTxEvent,
        risk: RiskClassification,
        network: &str,
        known_contract: Option<String>,
    ) -> Self {
        Self {
            hash: format!("{:#x}", tx.hash),
            from: tx.from.to_checksum(None),
            to: tx.to.map(|to| to.to_checksum(None)),
            value: tx.value.to_string(),
            value_native: format_native(tx.value),
            calldata_prefix: selector_hex(&tx.input),
            calldata_len: tx.input.len(),
            gas_limit: tx.gas_limit,
            risk_score: risk.score,
            risk_level: risk.level,
            risk_reasons: risk.reasons,
            network: network.to_string(),
            known_contract,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// One line of the live feed, discriminated by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Connected {
        session_id: Uuid,
        network: String,
        chain_id: u64,
        endpoint_index: usize,
        message: String,
    },
    Tx(Box<TxEventData>),
    Error {
        network: String,
        code: String,
        message: String,
    },
}

impl StreamEvent {
    /// Serialize as a single NDJSON line (trailing newline included)
    pub fn to_line(&self) -> String {
        match serde_json::to_string(self) {
            Ok(mut line) => {
                line.push('\n');
                line
            }
            Err(e) => format!(
                "{{\"type\":\"error\",\"network\":\"\",\"code\":\"API_INTERNAL_ERROR\",\"message\":\"{}\"}}\n",
                e
            ),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Connected { .. } => "connected",
            StreamEvent::Tx(_) => "tx",
            StreamEvent::Error { .. } => "error",
        }
    }
}
