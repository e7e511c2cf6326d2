// Copyright (c) 2025 - Cowboy AI, LLC.

//! Budget threshold alerting, grounded on
//! `original_source/core/token_manager.py::_check_budget_alerts` /
//! `_send_budget_alert`.

use crate::value_objects::{AlertLevel, BudgetAlert};
use chrono::Utc;

/// Thresholds checked high-to-low so only the single highest-crossed
/// threshold fires per call (spec.md §4.5 "Alerts": highest-crossed-only,
/// resolving the Python original's ascending-break ordering - see
/// DESIGN.md).
const THRESHOLDS: [f64; 5] = [1.0, 0.95, 0.90, 0.80, 0.50];

/// The single highest threshold crossed by `utilization`, if any.
pub fn highest_crossed(utilization: f64) -> Option<f64> {
    THRESHOLDS.iter().copied().find(|t| utilization >= *t)
}

pub fn build_alert(tenant_id: &str, user_id: &str, threshold: f64, utilization: f64) -> BudgetAlert {
    BudgetAlert {
        tenant_id: tenant_id.to_string(),
        user_id: user_id.to_string(),
        threshold,
        level: AlertLevel::for_threshold(threshold),
        utilization,
        fired_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_highest_crossed_threshold_only() {
        assert_eq!(highest_crossed(0.92), Some(0.90));
        assert_eq!(highest_crossed(1.5), Some(1.0));
        assert_eq!(highest_crossed(0.3), None);
    }

    #[test]
    fn build_alert_classifies_level_from_threshold() {
        let alert = build_alert("t", "u", 0.95, 0.96);
        assert_eq!(alert.level, AlertLevel::LimitReached);
    }
}
