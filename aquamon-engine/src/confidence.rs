//! Forecast confidence estimation.
//!
//! Confidence is a product of independent penalty factors, one per
//! signal: horizon distance, snapshot staleness, and model/fallback
//! disagreement. Each factor lives in (0, 1], so adding a penalty can
//! only lower the score, and the result clamps into [0, 1].

use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use aquamon_core::{ConfidenceLabel, ConfidenceScore, Horizon};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceConfig {
    /// Label cutoffs: >= high is High, >= medium is Medium, else Low.
    pub high: f64,
    pub medium: f64,
    /// Hours at which the horizon penalty halves the score.
    pub horizon_scale_hours: f64,
    /// Hours of snapshot age at which staleness halves the score.
    pub staleness_scale_hours: f64,
    /// How strongly normalized model disagreement is penalized.
    pub disagreement_weight: f64,
    /// Agreement factor used when no model covered any parameter and
    /// disagreement is unmeasurable.
    pub unmeasured_agreement: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            high: 0.75,
            medium: 0.4,
            horizon_scale_hours: 24.0,
            staleness_scale_hours: 6.0,
            disagreement_weight: 2.0,
            unmeasured_agreement: 0.85,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfidenceEstimator {
    config: ConfidenceConfig,
}

impl ConfidenceEstimator {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    /// Score one horizon's forecast.
    ///
    /// `snapshot_age` is how old the underlying reading was when the
    /// forecast was made; negative ages (clock skew) count as fresh.
    /// `disagreement` is the normalized model-vs-fallback spread, or
    /// `None` when nothing measured it.
    pub fn estimate(
        &self,
        horizon: Horizon,
        snapshot_age: SignedDuration,
        disagreement: Option<f64>,
    ) -> ConfidenceScore {
        let c = &self.config;

        let horizon_factor = 1.0 / (1.0 + f64::from(horizon.hours()) / c.horizon_scale_hours);

        let age_hours = (snapshot_age.as_secs_f64() / 3600.0).max(0.0);
        let staleness_factor = 1.0 / (1.0 + age_hours / c.staleness_scale_hours);

        let agreement_factor = match disagreement {
            Some(d) => 1.0 / (1.0 + c.disagreement_weight * d.max(0.0)),
            None => c.unmeasured_agreement,
        };

        let value = (horizon_factor * staleness_factor * agreement_factor).clamp(0.0, 1.0);

        ConfidenceScore {
            value,
            label: self.label(value),
        }
    }

    fn label(&self, value: f64) -> ConfidenceLabel {
        if value >= self.config.high {
            ConfidenceLabel::High
        } else if value >= self.config.medium {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }
}
