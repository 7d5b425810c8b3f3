//! Horizon forecasts over a pluggable model backend.
//!
//! The adapter asks the backend for each (parameter, horizon) pair and
//! fills every gap, whether a missing model or a backend error, with a
//! persistence-plus-drift projection derived from the last two readings.
//! Callers always get a full forecast per horizon.

use std::collections::BTreeMap;
use std::sync::Arc;

use aquamon_core::{Classification, Forecast, Horizon, SensorSnapshot, WqiClass};
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ModelError;
use crate::thresholds::ThresholdRegistry;

/// Inputs available to a model backend for one pond.
#[derive(Debug, Clone)]
pub struct Features<'a> {
    pub current: &'a SensorSnapshot,
    pub previous: Option<&'a SensorSnapshot>,
}

/// A trained model backend with two halves: per-parameter time-series
/// forecasts and an overall water-quality classifier. Implementations
/// declare what they cover; everything else falls back to the
/// rule-based path.
pub trait ForecastModel: Send + Sync {
    fn id(&self) -> &str;

    fn has_model(&self, parameter: &str, horizon: Horizon) -> bool;

    /// Only called for pairs `has_model` claimed. An error here demotes
    /// the pair to the fallback, it never fails the request.
    fn predict(
        &self,
        features: &Features<'_>,
        parameter: &str,
        horizon: Horizon,
    ) -> Result<f64, ModelError>;

    /// Whether a trained classifier is available for overall class
    /// labels.
    fn has_classifier(&self) -> bool {
        false
    }

    /// Only called when `has_classifier` claimed coverage. An error
    /// demotes the label to the WQI-breakpoint fallback.
    fn predict_class(&self, _features: &Features<'_>) -> Result<WqiClass, ModelError> {
        Err(ModelError::Backend("no classifier".into()))
    }
}

/// Backend with no trained models; every parameter takes the fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopModel;

impl ForecastModel for NoopModel {
    fn id(&self) -> &str {
        "noop"
    }

    fn has_model(&self, _parameter: &str, _horizon: Horizon) -> bool {
        false
    }

    fn predict(
        &self,
        _features: &Features<'_>,
        parameter: &str,
        _horizon: Horizon,
    ) -> Result<f64, ModelError> {
        Err(ModelError::Backend(
            format!("no model for {parameter}").into(),
        ))
    }
}

pub const FALLBACK_MODEL_ID: &str = "persistence-drift";
pub const FALLBACK_CLASSIFIER_ID: &str = "wqi-breakpoints";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Per-hour geometric damping applied to the observed drift. Must
    /// be in (0, 1); 1.0 would extrapolate linearly forever.
    pub damping: f64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self { damping: 0.9 }
    }
}

/// One horizon's forecast plus the mean model-vs-fallback disagreement,
/// normalized by band width. `None` when no parameter had a model.
#[derive(Debug, Clone)]
pub struct HorizonForecast {
    pub forecast: Forecast,
    pub disagreement: Option<f64>,
}

pub struct ForecastAdapter {
    model: Arc<dyn ForecastModel>,
    config: ForecastConfig,
}

impl ForecastAdapter {
    pub fn new(model: Arc<dyn ForecastModel>, config: ForecastConfig) -> Self {
        Self { model, config }
    }

    /// Project every banded parameter of the snapshot across all
    /// horizons. Infallible: gaps in model coverage take the fallback.
    pub fn forecast(
        &self,
        current: &SensorSnapshot,
        previous: Option<&SensorSnapshot>,
        registry: &ThresholdRegistry,
    ) -> Vec<HorizonForecast> {
        let features = Features { current, previous };

        Horizon::ALL
            .iter()
            .map(|&horizon| self.forecast_one(&features, horizon, registry))
            .collect()
    }

    /// Label the current conditions with the trained classifier.
    /// Falls back to the caller's breakpoint-derived class when the
    /// backend has no classifier or errors.
    pub fn classify(
        &self,
        current: &SensorSnapshot,
        previous: Option<&SensorSnapshot>,
        fallback: WqiClass,
    ) -> Classification {
        if self.model.has_classifier() {
            let features = Features { current, previous };
            match self.model.predict_class(&features) {
                Ok(class) => {
                    return Classification {
                        class,
                        model_id: self.model.id().into(),
                    };
                }
                Err(err) => {
                    warn!(pond = %current.pond_id.0, %err, "classifier backend failed; using WQI breakpoint label");
                }
            }
        }

        Classification {
            class: fallback,
            model_id: FALLBACK_CLASSIFIER_ID.into(),
        }
    }

    fn forecast_one(
        &self,
        features: &Features<'_>,
        horizon: Horizon,
        registry: &ThresholdRegistry,
    ) -> HorizonForecast {
        let current = features.current;
        let mut values: BTreeMap<Box<str>, NotNan<f64>> = BTreeMap::new();
        let mut fallback_parameters: Vec<Box<str>> = Vec::new();
        let mut disagreements: Vec<f64> = Vec::new();
        let mut model_covered = false;

        for (parameter, reading) in &current.values {
            let Some(band) = registry.band(parameter) else {
                continue;
            };

            let fallback = band.clamp_plausible(self.project(
                features,
                parameter,
                reading.into_inner(),
                horizon,
            ));

            let projected = if self.model.has_model(parameter, horizon) {
                match self.model.predict(features, parameter, horizon) {
                    Ok(v) => {
                        model_covered = true;
                        let v = band.clamp_plausible(v);
                        if let (Some(low), Some(high)) = (band.critical_min, band.critical_max)
                            && high > low
                        {
                            disagreements.push((v - fallback).abs() / (high - low));
                        }
                        v
                    }
                    Err(err) => {
                        warn!(pond = %current.pond_id.0, %parameter, horizon = horizon.label(), %err, "model backend failed; using persistence-drift fallback");
                        fallback_parameters.push(parameter.clone());
                        fallback
                    }
                }
            } else {
                fallback_parameters.push(parameter.clone());
                fallback
            };

            // Plausible clamping keeps projections finite, so NotNan
            // cannot fail here; degrade to the current reading if the
            // backend still produced a NaN.
            let value = NotNan::new(projected).unwrap_or(*reading);
            values.insert(parameter.clone(), value);
        }

        let model_id: Box<str> = if model_covered {
            self.model.id().into()
        } else {
            FALLBACK_MODEL_ID.into()
        };

        let disagreement = if disagreements.is_empty() {
            None
        } else {
            Some(disagreements.iter().sum::<f64>() / disagreements.len() as f64)
        };

        debug!(
            pond = %current.pond_id.0,
            horizon = horizon.label(),
            model = %model_id,
            fallbacks = fallback_parameters.len(),
            "horizon forecast built",
        );

        HorizonForecast {
            forecast: Forecast {
                horizon,
                values,
                model_id,
                fallback_parameters: fallback_parameters.into_boxed_slice(),
            },
            disagreement,
        }
    }

    /// Persistence plus damped drift. The per-hour slope from the last
    /// two readings is extended with geometrically shrinking steps, so
    /// the projection levels off instead of extrapolating a straight
    /// line into implausible territory.
    fn project(
        &self,
        features: &Features<'_>,
        parameter: &str,
        current: f64,
        horizon: Horizon,
    ) -> f64 {
        let Some(slope) = hourly_slope(features, parameter, current) else {
            return current;
        };

        let d = self.config.damping;
        let h = f64::from(horizon.hours());
        // Sum of d^1 .. d^h.
        let damped_hours = if (d - 1.0).abs() < f64::EPSILON {
            h
        } else {
            d * (1.0 - d.powf(h)) / (1.0 - d)
        };

        current + slope * damped_hours
    }
}

pub(crate) fn hourly_slope(
    features: &Features<'_>,
    parameter: &str,
    current: f64,
) -> Option<f64> {
    let previous = features.previous?;
    let prior = previous.value(parameter)?;

    let elapsed = features
        .current
        .timestamp
        .duration_since(previous.timestamp);
    let hours = elapsed.as_secs_f64() / 3600.0;
    if hours <= 0.0 {
        return None;
    }

    Some((current - prior) / hours)
}
