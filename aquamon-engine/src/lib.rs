//! Water-quality prediction and decision engine.
//!
//! Pure domain logic over [`aquamon_core`] types: threshold bands, WQI
//! scoring, horizon forecasting with a rule-based fallback, confidence
//! estimation, time-to-danger extrapolation, overnight oxygen checks,
//! alert generation, and actuator auto-triggering. No I/O and no
//! ambient clock; timestamps come in through the API.

pub mod alerts;
pub mod confidence;
pub mod danger;
pub mod error;
pub mod forecast;
pub mod night;
pub mod orchestrator;
pub mod recovery;
pub mod thresholds;
pub mod trigger;
pub mod wqi;

pub use error::{ConfigError, EngineError, ModelError};
pub use forecast::{ForecastModel, NoopModel};
pub use orchestrator::{EngineSettings, PredictionRequest, Predictor};
pub use recovery::RecoveryConfig;
pub use thresholds::{ThresholdBand, ThresholdRegistry};
