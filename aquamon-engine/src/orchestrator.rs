//! Per-request pipeline: WQI, forecasts, confidence, time-to-danger,
//! night safety, alerts, and trigger evaluation, composed into one
//! `PredictionResult`.
//!
//! The predictor owns no clock. Callers pass `now` and the pond's local
//! hour explicitly, which keeps every evaluation replayable.

use std::collections::HashMap;
use std::sync::Arc;

use aquamon_core::{
    AlertSeverity, CurrentConditions, HorizonOutlook, NightRisk, PondOutcome, PredictionResult,
    SensorSnapshot, TimeToDanger, TriggerRule, Urgency,
};
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::alerts::AlertGenerator;
use crate::confidence::{ConfidenceConfig, ConfidenceEstimator};
use crate::danger::time_to_danger;
use crate::error::{ConfigError, EngineError};
use crate::forecast::{
    Features, ForecastAdapter, ForecastConfig, ForecastModel, HorizonForecast, hourly_slope,
};
use crate::night::{NightAnalyzer, NightConfig};
use crate::recovery::{RecoveryConfig, estimate_recovery};
use crate::thresholds::{ThresholdBand, ThresholdRegistry};
use crate::trigger::TriggerController;
use crate::wqi::{WqiConfig, WqiEngine};

/// Everything the predictor needs, in one deserializable bundle.
/// An empty `bands` table selects the built-in shrimp-pond defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub bands: HashMap<Box<str>, ThresholdBand>,
    pub wqi: WqiConfig,
    pub forecast: ForecastConfig,
    pub confidence: ConfidenceConfig,
    pub night: NightConfig,
    pub recovery: RecoveryConfig,
    pub trigger_rules: Vec<TriggerRule>,
    pub danger_window_hours: DangerWindow,
}

/// Extrapolation window in hours for time-to-danger. Newtype so the
/// 24h default survives a derived `EngineSettings::default()`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DangerWindow(pub f64);

impl Default for DangerWindow {
    fn default() -> Self {
        Self(24.0)
    }
}

/// One pond's evaluation input: the fresh snapshot plus, when the
/// caller has it, the previous one for trend estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub snapshot: SensorSnapshot,
    #[serde(default)]
    pub previous: Option<SensorSnapshot>,
}

pub struct Predictor {
    registry: Arc<ThresholdRegistry>,
    wqi: WqiEngine,
    adapter: ForecastAdapter,
    confidence: ConfidenceEstimator,
    night: NightAnalyzer,
    recovery: RecoveryConfig,
    triggers: TriggerController,
    danger_window_hours: f64,
}

impl Predictor {
    pub fn new(
        settings: EngineSettings,
        model: Arc<dyn ForecastModel>,
    ) -> Result<Self, ConfigError> {
        let registry = if settings.bands.is_empty() {
            ThresholdRegistry::defaults()
        } else {
            ThresholdRegistry::new(settings.bands)?
        };

        Ok(Self {
            registry: Arc::new(registry),
            wqi: WqiEngine::new(settings.wqi)?,
            adapter: ForecastAdapter::new(model, settings.forecast),
            confidence: ConfidenceEstimator::new(settings.confidence),
            night: NightAnalyzer::new(settings.night),
            recovery: settings.recovery,
            triggers: TriggerController::new(settings.trigger_rules)?,
            danger_window_hours: settings.danger_window_hours.0,
        })
    }

    pub fn registry(&self) -> &ThresholdRegistry {
        &self.registry
    }

    pub fn triggers(&self) -> &TriggerController {
        &self.triggers
    }

    /// Evaluate one pond. `local_hour` is the pond's local wall-clock
    /// hour in [0, 24), used only by the night-safety check.
    pub fn predict(
        &self,
        request: &PredictionRequest,
        now: Timestamp,
        local_hour: u8,
    ) -> Result<PredictionResult, EngineError> {
        let snapshot = &request.snapshot;
        validate(snapshot)?;

        let previous = request
            .previous
            .as_ref()
            .filter(|p| p.timestamp < snapshot.timestamp);

        let current_wqi = self.wqi.score(snapshot, &self.registry)?;
        let classification = self.adapter.classify(snapshot, previous, current_wqi.class);

        let forecasts = self
            .adapter
            .forecast(snapshot, previous, &self.registry);

        let snapshot_age = now.duration_since(snapshot.timestamp);
        let horizons = self.horizon_outlooks(snapshot, &forecasts, snapshot_age)?;

        let ttd = self.danger_estimates(snapshot, previous);

        let night_safety =
            self.night
                .analyze(local_hour, snapshot, &forecasts, &ttd, &self.registry);

        let recovery = estimate_recovery(&current_wqi, snapshot, &self.registry, &self.recovery);

        let (alerts, recommendations) =
            AlertGenerator::generate(snapshot, &current_wqi, &forecasts, &self.registry);

        let trigger_events = self.triggers.evaluate(snapshot, now)?;

        let urgency = roll_up_urgency(&alerts, &night_safety.risk);

        debug!(
            pond = %snapshot.pond_id.0,
            wqi = current_wqi.score,
            alerts = alerts.len(),
            triggers = trigger_events.len(),
            "prediction complete",
        );

        Ok(PredictionResult {
            pond_id: snapshot.pond_id.clone(),
            generated_at: now,
            current: CurrentConditions {
                snapshot: snapshot.clone(),
                wqi: current_wqi,
            },
            classification,
            horizons: horizons.into_boxed_slice(),
            time_to_danger: ttd.into_boxed_slice(),
            night_safety,
            recovery,
            alerts: alerts.into_boxed_slice(),
            recommendations: recommendations.into_boxed_slice(),
            urgency,
            trigger_events: trigger_events.into_boxed_slice(),
        })
    }

    /// Evaluate many ponds. One pond's failure never aborts the batch;
    /// it is recorded on that pond's outcome and the rest proceed.
    pub fn predict_batch(
        &self,
        requests: &[PredictionRequest],
        now: Timestamp,
        local_hour: u8,
    ) -> Vec<PondOutcome> {
        requests
            .iter()
            .map(|request| {
                let pond_id = request.snapshot.pond_id.clone();
                match self.predict(request, now, local_hour) {
                    Ok(result) => PondOutcome {
                        pond_id,
                        result: Some(result),
                        error: None,
                    },
                    Err(err) => {
                        error!(pond = %pond_id.0, %err, "pond evaluation failed");
                        PondOutcome {
                            pond_id,
                            result: None,
                            error: Some(err.to_string().into()),
                        }
                    }
                }
            })
            .collect()
    }

    fn horizon_outlooks(
        &self,
        snapshot: &SensorSnapshot,
        forecasts: &[HorizonForecast],
        snapshot_age: SignedDuration,
    ) -> Result<Vec<HorizonOutlook>, EngineError> {
        forecasts
            .iter()
            .map(|hf| {
                let horizon = hf.forecast.horizon;
                let projected = SensorSnapshot {
                    pond_id: snapshot.pond_id.clone(),
                    timestamp: snapshot.timestamp
                        + SignedDuration::from_hours(i64::from(horizon.hours())),
                    values: hf.forecast.values.clone(),
                };
                let predicted_wqi = self.wqi.score(&projected, &self.registry)?;
                let confidence =
                    self.confidence
                        .estimate(horizon, snapshot_age, hf.disagreement);

                Ok(HorizonOutlook {
                    horizon,
                    forecast: hf.forecast.clone(),
                    predicted_wqi,
                    confidence,
                })
            })
            .collect()
    }

    fn danger_estimates(
        &self,
        snapshot: &SensorSnapshot,
        previous: Option<&SensorSnapshot>,
    ) -> Vec<TimeToDanger> {
        let features = Features {
            current: snapshot,
            previous,
        };

        snapshot
            .values
            .iter()
            .filter_map(|(parameter, value)| {
                let band: &ThresholdBand = self.registry.band(parameter)?;
                let current = value.into_inner();
                let slope = hourly_slope(&features, parameter, current);
                Some(time_to_danger(
                    parameter,
                    band,
                    current,
                    slope,
                    self.danger_window_hours,
                ))
            })
            .collect()
    }
}

fn validate(snapshot: &SensorSnapshot) -> Result<(), EngineError> {
    if snapshot.pond_id.0.is_empty() {
        return Err(EngineError::InvalidSnapshot("empty pond id".into()));
    }
    if snapshot.values.is_empty() {
        return Err(EngineError::InvalidSnapshot(
            "snapshot carries no values".into(),
        ));
    }
    Ok(())
}

fn roll_up_urgency(alerts: &[aquamon_core::Alert], night_risk: &NightRisk) -> Urgency {
    let worst_alert = alerts.iter().map(|a| a.severity).max();

    if worst_alert == Some(AlertSeverity::Critical) || *night_risk == NightRisk::Danger {
        Urgency::Critical
    } else if worst_alert == Some(AlertSeverity::Warning) || *night_risk == NightRisk::Watch {
        Urgency::Warning
    } else {
        Urgency::Normal
    }
}
