//! Overnight dissolved-oxygen safety check.
//!
//! DO sags at night when photosynthesis stops while respiration keeps
//! consuming oxygen; most overnight fish kills happen in the hours
//! before dawn. During configured night hours this module grades the
//! risk that DO goes critical before sunrise.

use aquamon_core::{BandEdge, DangerStatus, NightRisk, NightSafety, SensorSnapshot, TimeToDanger};
use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use crate::forecast::HorizonForecast;
use crate::thresholds::ThresholdRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightConfig {
    /// Local hour night starts (inclusive).
    pub night_start_hour: u8,
    /// Local hour night ends, i.e. dawn (exclusive).
    pub night_end_hour: u8,
    /// Parameter name of dissolved oxygen in the registry.
    pub oxygen_parameter: Box<str>,
}

impl Default for NightConfig {
    fn default() -> Self {
        Self {
            night_start_hour: 19,
            night_end_hour: 6,
            oxygen_parameter: "DO".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NightAnalyzer {
    config: NightConfig,
}

impl NightAnalyzer {
    pub fn new(config: NightConfig) -> Self {
        Self { config }
    }

    pub fn is_night(&self, local_hour: u8) -> bool {
        let c = &self.config;
        if c.night_start_hour > c.night_end_hour {
            // Night wraps midnight, the common case.
            local_hour >= c.night_start_hour || local_hour < c.night_end_hour
        } else {
            local_hour >= c.night_start_hour && local_hour < c.night_end_hour
        }
    }

    fn hours_until_dawn(&self, local_hour: u8) -> u32 {
        u32::from((24 + self.config.night_end_hour - local_hour) % 24)
    }

    /// Grade overnight oxygen risk from the current reading, the
    /// forecasts, and the oxygen time-to-danger. Daytime calls are
    /// always `Safe`. The oxygen parameter name comes from the config,
    /// so the lookup follows a renamed parameter everywhere.
    pub fn analyze(
        &self,
        local_hour: u8,
        snapshot: &SensorSnapshot,
        forecasts: &[HorizonForecast],
        time_to_danger: &[TimeToDanger],
        registry: &ThresholdRegistry,
    ) -> NightSafety {
        if !self.is_night(local_hour) {
            return NightSafety {
                is_night: false,
                risk: NightRisk::Safe,
                message: "Daytime; overnight oxygen check inactive".into(),
            };
        }

        let dawn_hours = self.hours_until_dawn(local_hour);
        let do_param = self.config.oxygen_parameter.as_ref();
        let band = registry.band(do_param);
        let current_do = snapshot.value(do_param);

        let do_ttd = time_to_danger
            .iter()
            .find(|ttd| ttd.parameter.as_ref() == do_param)
            .map(|ttd| ttd.status);

        // Worst projected DO among horizons that end before dawn.
        let mut pre_dawn_low: Option<f64> = None;
        for hf in forecasts {
            if hf.forecast.horizon.hours() > dawn_hours {
                continue;
            }
            if let Some(v) = hf.forecast.values.get(do_param) {
                let v = v.into_inner();
                pre_dawn_low = Some(pre_dawn_low.map_or(v, |low: f64| low.min(v)));
            }
        }

        let dawn = SignedDuration::from_hours(i64::from(dawn_hours));

        let danger = match do_ttd {
            Some(DangerStatus::AlreadyViolated { edge: BandEdge::Low }) => true,
            Some(DangerStatus::Crossing { edge: BandEdge::Low, eta }) => eta <= dawn,
            _ => false,
        } || matches!(
            (current_do, band.and_then(|b| b.critical_min)),
            (Some(v), Some(critical)) if v <= critical
        ) || matches!(
            (pre_dawn_low, band.and_then(|b| b.critical_min)),
            (Some(v), Some(critical)) if v <= critical
        );

        if danger {
            return NightSafety {
                is_night: true,
                risk: NightRisk::Danger,
                message: format!(
                    "Oxygen projected to reach critical levels before dawn ({dawn_hours}h away); start aeration now",
                )
                .into(),
            };
        }

        let watch = matches!(
            do_ttd,
            Some(DangerStatus::Crossing { edge: BandEdge::Low, .. })
        ) || matches!(
            (pre_dawn_low, band.and_then(|b| b.acceptable_low())),
            (Some(v), Some(floor)) if v < floor
        );

        if watch {
            return NightSafety {
                is_night: true,
                risk: NightRisk::Watch,
                message: format!(
                    "Oxygen trending down overnight; recheck before dawn ({dawn_hours}h away)",
                )
                .into(),
            };
        }

        NightSafety {
            is_night: true,
            risk: NightRisk::Safe,
            message: "Oxygen stable through the night".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use aquamon_core::{PondId, SensorSnapshot};
    use jiff::Timestamp;
    use ordered_float::NotNan;

    use crate::forecast::{ForecastAdapter, ForecastConfig, NoopModel};
    use crate::thresholds::ThresholdBand;

    use super::*;

    fn do_snapshot(do_value: f64) -> SensorSnapshot {
        SensorSnapshot {
            pond_id: PondId("pond-1".into()),
            timestamp: Timestamp::UNIX_EPOCH + SignedDuration::from_hours(1),
            values: [("DO".into(), NotNan::new(do_value).unwrap())].into_iter().collect(),
        }
    }

    fn forecasts_for(do_now: f64, do_prev: Option<f64>) -> Vec<HorizonForecast> {
        let registry = ThresholdRegistry::defaults();
        let adapter = ForecastAdapter::new(Arc::new(NoopModel), ForecastConfig::default());
        let t1 = Timestamp::UNIX_EPOCH + SignedDuration::from_hours(1);
        let current = SensorSnapshot {
            pond_id: PondId("pond-1".into()),
            timestamp: t1,
            values: [("DO".into(), NotNan::new(do_now).unwrap())].into_iter().collect(),
        };
        let previous = do_prev.map(|v| SensorSnapshot {
            pond_id: PondId("pond-1".into()),
            timestamp: Timestamp::UNIX_EPOCH,
            values: [("DO".into(), NotNan::new(v).unwrap())].into_iter().collect(),
        });
        adapter.forecast(&current, previous.as_ref(), &registry)
    }

    fn crossing(eta_hours: i64) -> Vec<TimeToDanger> {
        vec![TimeToDanger {
            parameter: "DO".into(),
            status: DangerStatus::Crossing {
                edge: BandEdge::Low,
                eta: SignedDuration::from_hours(eta_hours),
            },
        }]
    }

    #[test]
    fn daytime_is_always_safe() {
        let registry = ThresholdRegistry::defaults();
        let analyzer = NightAnalyzer::new(NightConfig::default());
        let safety = analyzer.analyze(12, &do_snapshot(3.0), &forecasts_for(3.0, None), &crossing(1), &registry);
        assert!(!safety.is_night);
        assert_eq!(safety.risk, NightRisk::Safe);
    }

    #[test]
    fn night_window_wraps_midnight() {
        let analyzer = NightAnalyzer::new(NightConfig::default());
        assert!(analyzer.is_night(19));
        assert!(analyzer.is_night(23));
        assert!(analyzer.is_night(0));
        assert!(analyzer.is_night(5));
        assert!(!analyzer.is_night(6));
        assert!(!analyzer.is_night(18));
    }

    #[test]
    fn crossing_before_dawn_is_danger() {
        let registry = ThresholdRegistry::defaults();
        let analyzer = NightAnalyzer::new(NightConfig::default());
        // 22:00, dawn in 8h, DO crossing the floor in 3h.
        let safety = analyzer.analyze(22, &do_snapshot(5.0), &forecasts_for(5.0, None), &crossing(3), &registry);
        assert!(safety.is_night);
        assert_eq!(safety.risk, NightRisk::Danger);
    }

    #[test]
    fn crossing_after_dawn_is_watch() {
        let registry = ThresholdRegistry::defaults();
        let analyzer = NightAnalyzer::new(NightConfig::default());
        // 02:00, dawn in 4h, crossing projected in 10h.
        let safety = analyzer.analyze(2, &do_snapshot(5.0), &forecasts_for(5.0, None), &crossing(10), &registry);
        assert_eq!(safety.risk, NightRisk::Watch);
    }

    #[test]
    fn falling_forecast_below_floor_is_watch() {
        let registry = ThresholdRegistry::defaults();
        let analyzer = NightAnalyzer::new(NightConfig::default());
        // 22:00, DO falling 0.5/h from 5.5. The 6h fallback projection
        // dips under the 4.0 acceptable floor without a TTD crossing
        // entry.
        let forecasts = forecasts_for(5.5, Some(6.0));
        let safety = analyzer.analyze(22, &do_snapshot(5.5), &forecasts, &[], &registry);
        assert_eq!(safety.risk, NightRisk::Watch);
    }

    #[test]
    fn stable_oxygen_at_night_is_safe() {
        let registry = ThresholdRegistry::defaults();
        let analyzer = NightAnalyzer::new(NightConfig::default());
        let safety = analyzer.analyze(22, &do_snapshot(6.5), &forecasts_for(6.5, Some(6.5)), &[], &registry);
        assert!(safety.is_night);
        assert_eq!(safety.risk, NightRisk::Safe);
    }

    #[test]
    fn current_do_at_critical_is_danger() {
        let registry = ThresholdRegistry::defaults();
        let analyzer = NightAnalyzer::new(NightConfig::default());
        let safety = analyzer.analyze(22, &do_snapshot(2.8), &forecasts_for(2.8, None), &[], &registry);
        assert_eq!(safety.risk, NightRisk::Danger);
    }

    #[test]
    fn missing_band_degrades_to_trend_only() {
        let bands = [(
            "pH".into(),
            ThresholdBand {
                critical_min: Some(6.5),
                acceptable_min: Some(7.0),
                optimal_min: 7.5,
                optimal_max: 8.5,
                acceptable_max: Some(9.0),
                critical_max: Some(9.5),
                plausible_min: None,
                plausible_max: None,
            },
        )]
        .into_iter()
        .collect();
        let registry = ThresholdRegistry::new(bands).unwrap();
        let analyzer = NightAnalyzer::new(NightConfig::default());
        let safety = analyzer.analyze(22, &do_snapshot(6.0), &[], &crossing(2), &registry);
        assert_eq!(safety.risk, NightRisk::Danger, "TTD alone still grades");
    }

    #[test]
    fn renamed_oxygen_parameter_is_honored_everywhere() {
        let bands = [(
            "DissolvedOxygen".into(),
            ThresholdBand {
                critical_min: Some(3.0),
                acceptable_min: Some(4.0),
                optimal_min: 5.0,
                optimal_max: 8.0,
                acceptable_max: Some(10.0),
                critical_max: Some(15.0),
                plausible_min: Some(0.0),
                plausible_max: Some(20.0),
            },
        )]
        .into_iter()
        .collect();
        let registry = ThresholdRegistry::new(bands).unwrap();
        let analyzer = NightAnalyzer::new(NightConfig {
            oxygen_parameter: "DissolvedOxygen".into(),
            ..NightConfig::default()
        });

        // Exactly on the critical floor, no trend data at all: only the
        // current-reading check can catch this, and it must use the
        // configured name.
        let snapshot = SensorSnapshot {
            pond_id: PondId("pond-1".into()),
            timestamp: Timestamp::UNIX_EPOCH,
            values: [("DissolvedOxygen".into(), NotNan::new(3.0).unwrap())]
                .into_iter()
                .collect(),
        };
        let safety = analyzer.analyze(22, &snapshot, &[], &[], &registry);
        assert_eq!(safety.risk, NightRisk::Danger);
    }
}
