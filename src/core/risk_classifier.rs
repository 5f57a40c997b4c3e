//! Risk Classifier
//! Heuristic 0-100 score for a pending transaction
//!
//! Pure and deterministic: no I/O, no hidden state. Rules are independent and
//! additive, the total is capped at 100 before the level is derived.

use alloy_primitives::U256;

use crate::models::{PendingTxEvent, RiskClassification, RiskLevel};
use crate::utils::constants::{native_units, RISKY_SELECTORS};

/// Hard ceiling for the summed score
pub const MAX_SCORE: u16 = 100;

/// Calldata size above which a payload counts as large (bytes)
pub const LARGE_CALLDATA_BYTES: usize = 1000;

/// Gas limit thresholds
pub const HIGH_GAS_LIMIT: u64 = 500_000;
pub const ELEVATED_GAS_LIMIT: u64 = 200_000;

/// Single rule hit. `reason` is `None` for rules that only move the score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    pub points: u16,
    pub reason: Option<String>,
}

impl RuleHit {
    fn named(points: u16, reason: impl Into<String>) -> Self {
        Self {
            points,
            reason: Some(reason.into()),
        }
    }

    fn silent(points: u16) -> Self {
        Self { points, reason: None }
    }
}

/// Value bands compare exactly in wei (strictly greater than N whole units)
fn value_rule(value: U256) -> Option<RuleHit> {
    if value > native_units(100) {
        Some(RuleHit::named(40, "High value transfer"))
    } else if value > native_units(10) {
        Some(RuleHit::named(20, "Large value"))
    } else if value > native_units(1) {
        Some(RuleHit::silent(10))
    } else {
        None
    }
}

fn selector_rule(input: &[u8]) -> Option<RuleHit> {
    let selector: [u8; 4] = input.get(..4)?.try_into().ok()?;
    RISKY_SELECTORS
        .get(&selector)
        .map(|name| RuleHit::named(25, format!("Risky function call: {}", name)))
}

fn calldata_rule(input: &[u8]) -> Option<RuleHit> {
    (input.len() > LARGE_CALLDATA_BYTES).then(|| RuleHit::named(10, "Large calldata payload"))
}

fn gas_rule(gas_limit: u64) -> Option<RuleHit> {
    if gas_limit > HIGH_GAS_LIMIT {
        Some(RuleHit::named(15, "High gas limit"))
    } else if gas_limit > ELEVATED_GAS_LIMIT {
        Some(RuleHit::silent(5))
    } else {
        None
    }
}

fn creation_rule(tx: &PendingTxEvent) -> Option<RuleHit> {
    tx.is_contract_creation()
        .then(|| RuleHit::named(30, "Contract creation"))
}

/// Every rule that fired, in evaluation order
pub fn rule_hits(tx: &PendingTxEvent) -> Vec<RuleHit> {
    [
        value_rule(tx.value),
        selector_rule(&tx.input),
        calldata_rule(&tx.input),
        gas_rule(tx.gas_limit),
        creation_rule(tx),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Score, reasons and level for one transaction
pub fn classify(tx: &PendingTxEvent) -> RiskClassification {
    let hits = rule_hits(tx);
    let total: u16 = hits.iter().map(|h| h.points).sum();
    let score = total.min(MAX_SCORE) as u8;

    RiskClassification {
        score,
        reasons: hits.into_iter().filter_map(|h| h.reason).collect(),
        level: RiskLevel::from_score(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes, B256};

    fn tx() -> PendingTxEvent {
        PendingTxEvent {
            hash: B256::ZERO,
            from: Address::repeat_byte(0x01),
            to: Some(Address::repeat_byte(0x02)),
            value: U256::ZERO,
            input: Bytes::new(),
            gas_limit: 21_000,
        }
    }

    #[test]
    fn test_plain_transfer_is_low() {
        let result = classify(&tx());
        assert_eq!(result.score, 0);
        assert!(result.reasons.is_empty());
        assert_eq!(result.level, RiskLevel::Low);
    }

    #[test]
    fn test_contract_creation_scores_30() {
        let mut t = tx();
        t.to = None;
        let result = classify(&t);
        assert_eq!(result.score, 30);
        assert_eq!(result.level, RiskLevel::Medium);
        assert_eq!(result.reasons, vec!["Contract creation"]);
    }

    #[test]
    fn test_value_bands_are_exclusive_at_boundaries() {
        let mut t = tx();
        t.value = native_units(1);
        assert_eq!(classify(&t).score, 0);

        t.value = native_units(1) + U256::from(1);
        assert_eq!(classify(&t).score, 10);
        assert!(classify(&t).reasons.is_empty());

        t.value = native_units(10);
        assert_eq!(classify(&t).score, 10);

        t.value = native_units(100);
        let result = classify(&t);
        assert_eq!(result.score, 20);
        assert_eq!(result.reasons, vec!["Large value"]);

        t.value = native_units(101);
        let result = classify(&t);
        assert_eq!(result.score, 40);
        assert_eq!(result.reasons, vec!["High value transfer"]);
    }

    #[test]
    fn test_risky_selector_names_function() {
        let mut t = tx();
        t.input = Bytes::from(vec![0x09, 0x5e, 0xa7, 0xb3, 0, 0, 0]);
        let result = classify(&t);
        assert_eq!(result.score, 25);
        assert_eq!(result.reasons, vec!["Risky function call: approve"]);

        // three bytes cannot match
        t.input = Bytes::from(vec![0x09, 0x5e, 0xa7]);
        assert_eq!(classify(&t).score, 0);
    }

    #[test]
    fn test_gas_bands() {
        let mut t = tx();
        t.gas_limit = 200_000;
        assert_eq!(classify(&t).score, 0);
        t.gas_limit = 200_001;
        assert_eq!(classify(&t).score, 5);
        t.gas_limit = 500_000;
        assert_eq!(classify(&t).score, 5);
        t.gas_limit = 500_001;
        let result = classify(&t);
        assert_eq!(result.score, 15);
        assert_eq!(result.reasons, vec!["High gas limit"]);
    }

    #[test]
    fn test_score_is_capped() {
        let mut input = vec![0xa9, 0x05, 0x9c, 0xbb];
        input.resize(2000, 0);
        let t = PendingTxEvent {
            to: None,
            value: native_units(500),
            input: Bytes::from(input),
            gas_limit: 1_000_000,
            ..tx()
        };
        let result = classify(&t);
        // 40 + 25 + 10 + 15 + 30 = 120
        assert_eq!(result.score, 100);
        assert_eq!(result.level, RiskLevel::Critical);
        assert_eq!(
            result.reasons,
            vec![
                "High value transfer",
                "Risky function call: transfer",
                "Large calldata payload",
                "High gas limit",
                "Contract creation",
            ]
        );
    }

    #[test]
    fn test_deterministic() {
        let mut t = tx();
        t.value = native_units(50);
        t.gas_limit = 300_000;
        assert_eq!(classify(&t), classify(&t));
        assert_eq!(classify(&t).score, 25);
    }
}
