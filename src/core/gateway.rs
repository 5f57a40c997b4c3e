//! API Key Gateway
//!
//! Resolves a presented raw key to its stored record, checks account state and
//! plan quota, then charges the call. Verdicts are return values; the only
//! `Err` is a quota-store failure.
//!
//! The limit check and the usage increment are two separate store calls
//! (check-then-act). Concurrent calls against a key sitting at `limit - 1` may
//! both pass, allowing a small overrun. A rejected call is never charged.

use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{resolve_plan, AppResult, ErrorCode, Plan, Remaining, RequestLimit};
use crate::storage::{hash_key, normalize_key, AccountStatus, ApiKeyRecord, QuotaStore};
use crate::utils::telemetry::{GatewayTelemetry, RejectionKind};

/// Why a key was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Nothing was presented
    KeyRequired,
    /// Hash matches no active record
    InvalidOrRevoked,
    /// Key is fine but the owning account is not active
    AccountInactive(AccountStatus),
    /// Finite plan exhausted; callers map this to a throttling status
    LimitReached { limit: u64, usage: u64 },
}

impl Rejection {
    pub fn code(&self) -> ErrorCode {
        match self {
            Rejection::KeyRequired => ErrorCode::AuthKeyRequired,
            Rejection::InvalidOrRevoked => ErrorCode::AuthInvalidKey,
            Rejection::AccountInactive(_) => ErrorCode::AuthAccountInactive,
            Rejection::LimitReached { .. } => ErrorCode::QuotaLimitReached,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Rejection::KeyRequired => {
                "API key required. Send it in the X-API-Key header or the api_key query parameter".to_string()
            }
            Rejection::InvalidOrRevoked => "Invalid or revoked API key".to_string(),
            Rejection::AccountInactive(status) => {
                format!("Account is {}. Contact support to reactivate it", status.as_str())
            }
            Rejection::LimitReached { limit, usage } => {
                format!("Plan limit reached ({} of {} requests used)", usage, limit)
            }
        }
    }

    fn kind(&self) -> RejectionKind {
        match self {
            Rejection::KeyRequired => RejectionKind::KeyRequired,
            Rejection::InvalidOrRevoked => RejectionKind::InvalidKey,
            Rejection::AccountInactive(_) => RejectionKind::AccountInactive,
            Rejection::LimitReached { .. } => RejectionKind::LimitReached,
        }
    }
}

/// Accepted key. `record` is the snapshot read before the charge.
#[derive(Debug, Clone)]
pub struct ValidatedKey {
    pub record: ApiKeyRecord,
    pub plan: Plan,
    /// Usage after this call was charged
    pub usage_after: u64,
}

impl ValidatedKey {
    /// `max(0, limit - usage - 1)` from the pre-charge usage, or unlimited
    pub fn remaining(&self) -> Remaining {
        self.plan.limit.remaining_after(self.record.usage)
    }

    /// (limit, remaining, plan label) response headers
    pub fn rate_limit_headers(&self) -> [(&'static str, String); 3] {
        [
            ("x-ratelimit-limit", self.plan.limit.header_value()),
            ("x-ratelimit-remaining", self.remaining().to_string()),
            ("x-ratelimit-plan", self.plan.label.to_string()),
        ]
    }
}

#[derive(Debug, Clone)]
pub enum Verdict {
    Valid(ValidatedKey),
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid(_))
    }
}

pub struct ApiKeyGateway {
    store: Arc<dyn QuotaStore>,
    telemetry: Arc<GatewayTelemetry>,
}

impl ApiKeyGateway {
    pub fn new(store: Arc<dyn QuotaStore>, telemetry: Arc<GatewayTelemetry>) -> Self {
        Self { store, telemetry }
    }

    pub fn store(&self) -> &Arc<dyn QuotaStore> {
        &self.store
    }

    pub async fn validate(&self, raw_key: Option<&str>) -> AppResult<Verdict> {
        let verdict = self.evaluate(raw_key).await?;
        match &verdict {
            Verdict::Valid(key) => {
                self.telemetry.record_accepted();
                debug!(key_prefix = %key.record.prefix, usage = key.usage_after, "API key accepted");
            }
            Verdict::Rejected(rejection) => {
                self.telemetry.record_rejected(rejection.kind());
                info!(code = rejection.code().as_str(), "🚫 API key rejected");
            }
        }
        Ok(verdict)
    }

    async fn evaluate(&self, raw_key: Option<&str>) -> AppResult<Verdict> {
        let raw_key = match raw_key.and_then(normalize_key) {
            Some(key) => key,
            None => return Ok(Verdict::Rejected(Rejection::KeyRequired)),
        };

        let found = self.store.find_active_by_hash(&hash_key(raw_key)).await?;
        let Some(found) = found else {
            return Ok(Verdict::Rejected(Rejection::InvalidOrRevoked));
        };

        if !found.account.status.is_active() {
            return Ok(Verdict::Rejected(Rejection::AccountInactive(found.account.status)));
        }

        let plan = resolve_plan(&found.key.plan_id);
        if plan.limit.is_exhausted(found.key.usage) {
            let limit = match plan.limit {
                RequestLimit::Finite(limit) => limit,
                RequestLimit::Unlimited => u64::MAX,
            };
            return Ok(Verdict::Rejected(Rejection::LimitReached {
                limit,
                usage: found.key.usage,
            }));
        }

        let usage_after = self.store.increment_usage(found.key.id).await?;

        Ok(Verdict::Valid(ValidatedKey {
            record: found.key,
            plan,
            usage_after,
        }))
    }
}
