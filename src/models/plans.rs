//! Plan Registry
//!
//! Static plan table. Unknown plan ids resolve to the demo tier.

use serde::{Serialize, Serializer};

/// Request allowance of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestLimit {
    Finite(u64),
    Unlimited,
}

impl RequestLimit {
    /// True when `usage` already consumed the allowance
    pub fn is_exhausted(&self, usage: u64) -> bool {
        match self {
            RequestLimit::Finite(limit) => usage >= *limit,
            RequestLimit::Unlimited => false,
        }
    }

    /// Header value for the limit
    pub fn header_value(&self) -> String {
        match self {
            RequestLimit::Finite(limit) => limit.to_string(),
            RequestLimit::Unlimited => "unlimited".to_string(),
        }
    }

    /// Calls left after the one being charged now: `max(0, limit - usage - 1)`
    pub fn remaining_after(&self, usage_before: u64) -> Remaining {
        match self {
            RequestLimit::Finite(limit) => {
                Remaining::Count(limit.saturating_sub(usage_before).saturating_sub(1))
            }
            RequestLimit::Unlimited => Remaining::Unlimited,
        }
    }
}

impl Serialize for RequestLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RequestLimit::Finite(limit) => serializer.serialize_u64(*limit),
            RequestLimit::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

/// Informational remaining-quota value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Count(u64),
    Unlimited,
}

impl std::fmt::Display for Remaining {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Remaining::Count(n) => write!(f, "{}", n),
            Remaining::Unlimited => f.write_str("unlimited"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub id: &'static str,
    pub label: &'static str,
    pub limit: RequestLimit,
}

pub const DEMO: Plan = Plan {
    id: "demo",
    label: "Demo",
    limit: RequestLimit::Finite(100),
};

pub const STARTER: Plan = Plan {
    id: "starter",
    label: "Starter",
    limit: RequestLimit::Finite(1000),
};

pub const PRO: Plan = Plan {
    id: "pro",
    label: "Pro",
    limit: RequestLimit::Finite(50_000),
};

pub const ENTERPRISE: Plan = Plan {
    id: "enterprise",
    label: "Enterprise",
    limit: RequestLimit::Unlimited,
};

/// Lowest tier first
pub const PLANS: [Plan; 4] = [DEMO, STARTER, PRO, ENTERPRISE];

/// Resolve a plan id, case-insensitive; unknown ids get the demo tier
pub fn resolve_plan(plan_id: &str) -> Plan {
    let wanted = plan_id.trim();
    PLANS
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(wanted))
        .copied()
        .unwrap_or(DEMO)
}
