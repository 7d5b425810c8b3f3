//! Recovery-time estimation.
//!
//! Once water quality has slipped below the farm's target, managers
//! want a rough horizon for getting back: with active intervention
//! (aeration, water exchange, feed reduction) WQI recovers at a fairly
//! steady rate, so the estimate is the score gap divided by that rate,
//! rounded up to whole hours.

use aquamon_core::{RecoveryEstimate, RecoveryOutlook, SensorSnapshot, WqiResult};
use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use crate::thresholds::ThresholdRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// WQI score the pond should recover to.
    pub target_score: u8,
    /// Typical WQI points regained per hour with active management.
    pub points_per_hour: f64,
    /// Scores below this call for a partial water exchange on top of
    /// parameter-specific actions.
    pub exchange_below_score: u8,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            target_score: 75,
            points_per_hour: 2.5,
            exchange_below_score: 40,
        }
    }
}

/// Estimate how long the pond needs to get back to the target WQI.
pub fn estimate_recovery(
    wqi: &WqiResult,
    snapshot: &SensorSnapshot,
    registry: &ThresholdRegistry,
    config: &RecoveryConfig,
) -> RecoveryEstimate {
    if wqi.score >= config.target_score {
        return RecoveryEstimate {
            current_score: wqi.score,
            target_score: config.target_score,
            outlook: RecoveryOutlook::AtTarget,
        };
    }

    let gap = f64::from(config.target_score - wqi.score);
    let rate = config.points_per_hour.max(f64::MIN_POSITIVE);
    let hours = (gap / rate).ceil().max(1.0) as i64;

    let mut actions: Vec<Box<str>> = Vec::new();
    if let (Some(value), Some(band)) = (snapshot.value("DO"), registry.band("DO"))
        && value < band.optimal_min
    {
        actions.push("Run all aerators until oxygen is back in range".into());
    }
    if wqi.score < config.exchange_below_score {
        actions.push("Perform a 30% water exchange".into());
    }
    if let (Some(value), Some(band)) = (snapshot.value("Ammonia"), registry.band("Ammonia"))
        && band.violated_edge(value).is_some()
    {
        actions.push("Reduce feeding by half until ammonia falls".into());
    }

    RecoveryEstimate {
        current_score: wqi.score,
        target_score: config.target_score,
        outlook: RecoveryOutlook::Recoverable {
            estimated: SignedDuration::from_hours(hours),
            actions: actions.into_boxed_slice(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use aquamon_core::{PondId, WqiClass};
    use jiff::Timestamp;
    use ordered_float::NotNan;

    use super::*;

    fn snapshot(values: &[(&str, f64)]) -> SensorSnapshot {
        SensorSnapshot {
            pond_id: PondId("pond-1".into()),
            timestamp: Timestamp::UNIX_EPOCH,
            values: values
                .iter()
                .map(|(k, v)| ((*k).into(), NotNan::new(*v).unwrap()))
                .collect(),
        }
    }

    fn wqi(score: u8) -> WqiResult {
        WqiResult {
            score,
            class: WqiClass::Fair,
            sub_scores: BTreeMap::new(),
            excluded: Box::new([]),
        }
    }

    #[test]
    fn at_or_above_target_needs_no_recovery() {
        let registry = ThresholdRegistry::defaults();
        let estimate = estimate_recovery(
            &wqi(82),
            &snapshot(&[("DO", 6.5)]),
            &registry,
            &RecoveryConfig::default(),
        );
        assert_eq!(estimate.outlook, RecoveryOutlook::AtTarget);
    }

    #[test]
    fn gap_divided_by_rate_rounded_up() {
        let registry = ThresholdRegistry::defaults();
        // 25 points short at 2.5 points/hour: 10 hours.
        let estimate = estimate_recovery(
            &wqi(50),
            &snapshot(&[("DO", 6.5)]),
            &registry,
            &RecoveryConfig::default(),
        );
        match estimate.outlook {
            RecoveryOutlook::Recoverable { estimated, .. } => {
                assert_eq!(estimated, SignedDuration::from_hours(10));
            }
            other => panic!("expected recoverable, got {other:?}"),
        }
    }

    #[test]
    fn actions_follow_the_offending_parameters() {
        let registry = ThresholdRegistry::defaults();
        let estimate = estimate_recovery(
            &wqi(30),
            &snapshot(&[("DO", 4.2), ("Ammonia", 0.3)]),
            &registry,
            &RecoveryConfig::default(),
        );
        match estimate.outlook {
            RecoveryOutlook::Recoverable { actions, .. } => {
                assert_eq!(actions.len(), 3);
                assert!(actions[0].contains("aerators"));
                assert!(actions[1].contains("water exchange"));
                assert!(actions[2].contains("feeding"));
            }
            other => panic!("expected recoverable, got {other:?}"),
        }
    }

    #[test]
    fn healthy_parameters_yield_no_actions() {
        let registry = ThresholdRegistry::defaults();
        let estimate = estimate_recovery(
            &wqi(70),
            &snapshot(&[("DO", 6.5), ("Ammonia", 0.03)]),
            &registry,
            &RecoveryConfig::default(),
        );
        match estimate.outlook {
            RecoveryOutlook::Recoverable { actions, estimated } => {
                assert!(actions.is_empty());
                assert_eq!(estimated, SignedDuration::from_hours(2));
            }
            other => panic!("expected recoverable, got {other:?}"),
        }
    }
}
