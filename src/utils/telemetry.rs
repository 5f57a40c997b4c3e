//! Telemetry Module
//!
//! Process-wide counters for sessions, stream events and gateway verdicts.
//! No addresses, hashes or key material are recorded.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::models::RiskLevel;

/// Why the gateway turned a call away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    KeyRequired,
    InvalidKey,
    AccountInactive,
    LimitReached,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryStats {
    pub uptime_secs: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub sessions_active: u64,
    pub session_open_failures: u64,
    pub tx_emitted: u64,
    pub tx_dropped_by_cap: u64,
    pub resolution_misses: u64,
    pub stream_errors: u64,
    pub level_low: u64,
    pub level_medium: u64,
    pub level_high: u64,
    pub level_critical: u64,
    pub validations_accepted: u64,
    pub rejected_key_required: u64,
    pub rejected_invalid_key: u64,
    pub rejected_account_inactive: u64,
    pub rejected_limit_reached: u64,
}

/// Lock-free counters shared by every component
#[derive(Debug)]
pub struct GatewayTelemetry {
    started: Instant,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    session_open_failures: AtomicU64,
    tx_emitted: AtomicU64,
    tx_dropped_by_cap: AtomicU64,
    resolution_misses: AtomicU64,
    stream_errors: AtomicU64,
    levels: [AtomicU64; 4],
    validations_accepted: AtomicU64,
    rejections: [AtomicU64; 4],
}

impl GatewayTelemetry {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            session_open_failures: AtomicU64::new(0),
            tx_emitted: AtomicU64::new(0),
            tx_dropped_by_cap: AtomicU64::new(0),
            resolution_misses: AtomicU64::new(0),
            stream_errors: AtomicU64::new(0),
            levels: Default::default(),
            validations_accepted: AtomicU64::new(0),
            rejections: Default::default(),
        }
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_open_failure(&self) {
        self.session_open_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx(&self, level: RiskLevel) {
        self.tx_emitted.fetch_add(1, Ordering::Relaxed);
        let slot = match level {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
            RiskLevel::Critical => 3,
        };
        self.levels[slot].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_by_cap(&self) {
        self.tx_dropped_by_cap.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolution_miss(&self) {
        self.resolution_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stream_error(&self) {
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_accepted(&self) {
        self.validations_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, kind: RejectionKind) {
        let slot = match kind {
            RejectionKind::KeyRequired => 0,
            RejectionKind::InvalidKey => 1,
            RejectionKind::AccountInactive => 2,
            RejectionKind::LimitReached => 3,
        };
        self.rejections[slot].fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot all counters
    pub fn get_stats(&self) -> TelemetryStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let opened = load(&self.sessions_opened);
        let closed = load(&self.sessions_closed);

        TelemetryStats {
            uptime_secs: self.started.elapsed().as_secs(),
            sessions_opened: opened,
            sessions_closed: closed,
            sessions_active: opened.saturating_sub(closed),
            session_open_failures: load(&self.session_open_failures),
            tx_emitted: load(&self.tx_emitted),
            tx_dropped_by_cap: load(&self.tx_dropped_by_cap),
            resolution_misses: load(&self.resolution_misses),
            stream_errors: load(&self.stream_errors),
            level_low: load(&self.levels[0]),
            level_medium: load(&self.levels[1]),
            level_high: load(&self.levels[2]),
            level_critical: load(&self.levels[3]),
            validations_accepted: load(&self.validations_accepted),
            rejected_key_required: load(&self.rejections[0]),
            rejected_invalid_key: load(&self.rejections[1]),
            rejected_account_inactive: load(&self.rejections[2]),
            rejected_limit_reached: load(&self.rejections[3]),
        }
    }
}

impl Default for GatewayTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let telemetry = GatewayTelemetry::new();
        telemetry.record_session_opened();
        telemetry.record_session_opened();
        telemetry.record_session_closed();
        telemetry.record_tx(RiskLevel::Critical);
        telemetry.record_tx(RiskLevel::Low);
        telemetry.record_rejected(RejectionKind::LimitReached);

        let stats = telemetry.get_stats();
        assert_eq!(stats.sessions_active, 1);
        assert_eq!(stats.tx_emitted, 2);
        assert_eq!(stats.level_critical, 1);
        assert_eq!(stats.level_low, 1);
        assert_eq!(stats.rejected_limit_reached, 1);
        assert_eq!(stats.rejected_invalid_key, 0);
    }
}
