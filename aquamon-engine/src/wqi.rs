//! Water Quality Index scoring.
//!
//! Each parameter maps to a sub-score in [0, 100] by piecewise-linear
//! interpolation against its threshold band: 100 at the optimal center,
//! degrading linearly to 0 at (or beyond) the critical bound on the
//! side the value sits on. The aggregate is a weighted mean of the
//! sub-scores, rounded half-to-even so the reported integer score is
//! reproducible.

use std::collections::{BTreeMap, HashMap};

use aquamon_core::{SensorSnapshot, WqiClass, WqiResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, EngineError};
use crate::thresholds::{ThresholdBand, ThresholdRegistry};

/// Score breakpoints mapping [0, 100] onto the five classes. Must be
/// strictly decreasing so the classes partition the range without gaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassBreakpoints {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub poor: f64,
}

impl Default for ClassBreakpoints {
    fn default() -> Self {
        Self {
            excellent: 90.0,
            good: 70.0,
            fair: 50.0,
            poor: 30.0,
        }
    }
}

impl ClassBreakpoints {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = self.excellent > self.good
            && self.good > self.fair
            && self.fair > self.poor
            && self.poor > 0.0
            && self.excellent <= 100.0;
        if !ordered {
            return Err(ConfigError::InvalidBreakpoints(
                format!(
                    "expected 0 < poor < fair < good < excellent <= 100, got {} {} {} {}",
                    self.poor, self.fair, self.good, self.excellent,
                )
                .into(),
            ));
        }
        Ok(())
    }

    pub fn classify(&self, score: f64) -> WqiClass {
        if score >= self.excellent {
            WqiClass::Excellent
        } else if score >= self.good {
            WqiClass::Good
        } else if score >= self.fair {
            WqiClass::Fair
        } else if score >= self.poor {
            WqiClass::Poor
        } else {
            WqiClass::Critical
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WqiConfig {
    #[serde(default)]
    pub breakpoints: ClassBreakpoints,
    /// Per-parameter weights; parameters not listed weigh 1.0. Empty
    /// means equal weights.
    #[serde(default)]
    pub weights: HashMap<Box<str>, f64>,
}

#[derive(Debug, Clone)]
pub struct WqiEngine {
    config: WqiConfig,
}

impl WqiEngine {
    pub fn new(config: WqiConfig) -> Result<Self, ConfigError> {
        config.breakpoints.validate()?;
        Ok(Self { config })
    }

    /// Score one snapshot against the registry.
    ///
    /// Parameters without a configured band are excluded from the
    /// aggregate (not defaulted) and listed in `excluded`. A snapshot
    /// with nothing scorable is structurally invalid.
    pub fn score(
        &self,
        snapshot: &SensorSnapshot,
        registry: &ThresholdRegistry,
    ) -> Result<WqiResult, EngineError> {
        let mut sub_scores: BTreeMap<Box<str>, f64> = BTreeMap::new();
        let mut excluded: Vec<Box<str>> = Vec::new();

        for (parameter, value) in &snapshot.values {
            match registry.band(parameter) {
                Some(band) => {
                    sub_scores.insert(parameter.clone(), sub_score(value.into_inner(), band));
                }
                None => {
                    warn!(pond = %snapshot.pond_id.0, %parameter, "parameter not in threshold registry; excluded from WQI");
                    excluded.push(parameter.clone());
                }
            }
        }

        if sub_scores.is_empty() {
            return Err(EngineError::InvalidSnapshot(
                "no parameter in the snapshot has a configured threshold band".into(),
            ));
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (parameter, score) in &sub_scores {
            let weight = self
                .config
                .weights
                .get(parameter)
                .copied()
                .unwrap_or(1.0)
                .max(0.0);
            weighted_sum += score * weight;
            weight_total += weight;
        }

        let aggregate = if weight_total > 0.0 {
            weighted_sum / weight_total
        } else {
            0.0
        };

        let score = aggregate.round_ties_even().clamp(0.0, 100.0) as u8;

        Ok(WqiResult {
            score,
            class: self.config.breakpoints.classify(f64::from(score)),
            sub_scores,
            excluded: excluded.into_boxed_slice(),
        })
    }
}

/// Piecewise-linear sub-score: 100 at the optimal center, 0 at or
/// beyond the critical bound on the side of the value. A side without a
/// critical bound never degrades.
fn sub_score(value: f64, band: &ThresholdBand) -> f64 {
    let center = band.optimal_center();

    let (bound, distance) = if value < center {
        (band.critical_min, center - value)
    } else {
        (band.critical_max, value - center)
    };

    match bound {
        Some(critical) => {
            let span = (critical - center).abs();
            if span == 0.0 || distance >= span {
                0.0
            } else {
                (100.0 * (1.0 - distance / span)).clamp(0.0, 100.0)
            }
        }
        None => 100.0,
    }
}
