//! HTTP surface for the prediction pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use aquamon_core::{PondId, PondOutcome, SensorSnapshot, Urgency};
use aquamon_engine::{EngineError, Predictor};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use jiff::{Timestamp, tz::TimeZone};
use ordered_float::NotNan;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::history::SnapshotHistory;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub predictor: Arc<Predictor>,
    pub history: SnapshotHistory,
    pub timezone: TimeZone,
}

impl ApiState {
    fn local_hour(&self, now: Timestamp) -> u8 {
        now.to_zoned(self.timezone.clone()).hour() as u8
    }
}

/// Create the full API router with all endpoints.
pub fn api_router(predictor: Arc<Predictor>, history: SnapshotHistory, timezone: TimeZone) -> Router {
    let state = ApiState {
        predictor,
        history,
        timezone,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/predict", post(predict))
        .route("/api/predict/batch", post(predict_batch))
        .route("/api/thresholds", get(thresholds))
        .route("/api/simulate", get(simulate))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// Request body for a single pond evaluation.
#[derive(Debug, Serialize, Deserialize)]
pub struct PredictRequest {
    pub pond_id: String,
    /// Parameter readings, keyed by name ("pH", "DO", ...).
    pub values: BTreeMap<String, f64>,
    /// When the reading was taken. Defaults to the request time.
    pub timestamp: Option<Timestamp>,
}

/// Request body for a whole-farm evaluation.
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchPredictRequest {
    pub ponds: Vec<PredictRequest>,
}

/// Per-urgency counts over a batch.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FarmSummary {
    pub total: usize,
    pub critical: usize,
    pub warning: usize,
    pub normal: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchPredictResponse {
    /// Worst ponds first.
    pub ponds: Vec<PondOutcome>,
    pub summary: FarmSummary,
}

fn to_snapshot(request: PredictRequest, now: Timestamp) -> Result<SensorSnapshot, String> {
    let mut values = BTreeMap::new();
    for (parameter, value) in request.values {
        let value = NotNan::new(value).map_err(|_| format!("{parameter} is NaN"))?;
        values.insert(parameter.into_boxed_str(), value);
    }
    Ok(SensorSnapshot {
        pond_id: PondId(request.pond_id.into_boxed_str()),
        timestamp: request.timestamp.unwrap_or(now),
        values,
    })
}

fn error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::UnknownParameter(_) | EngineError::InvalidSnapshot(_) => {
            StatusCode::BAD_REQUEST
        }
        EngineError::TriggerStateConflict => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Evaluate one pond.
///
/// POST /api/predict
async fn predict(
    State(state): State<ApiState>,
    Json(request): Json<PredictRequest>,
) -> impl IntoResponse {
    let now = Timestamp::now();

    let snapshot = match to_snapshot(request, now) {
        Ok(snapshot) => snapshot,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };

    let previous = state.history.record(snapshot.clone()).await;
    let request = aquamon_engine::PredictionRequest { snapshot, previous };

    match state.predictor.predict(&request, now, state.local_hour(now)) {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, pond = %request.snapshot.pond_id.0, "prediction failed");
            (error_status(&e), e.to_string()).into_response()
        }
    }
}

/// Evaluate every pond of a farm in one call. Failed ponds are reported
/// inline, never aborting the batch.
///
/// POST /api/predict/batch
async fn predict_batch(
    State(state): State<ApiState>,
    Json(request): Json<BatchPredictRequest>,
) -> impl IntoResponse {
    let now = Timestamp::now();
    let local_hour = state.local_hour(now);

    let mut requests = Vec::with_capacity(request.ponds.len());
    for pond in request.ponds {
        let snapshot = match to_snapshot(pond, now) {
            Ok(snapshot) => snapshot,
            Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
        };
        let previous = state.history.record(snapshot.clone()).await;
        requests.push(aquamon_engine::PredictionRequest { snapshot, previous });
    }

    let mut ponds = state.predictor.predict_batch(&requests, now, local_hour);
    sort_worst_first(&mut ponds);

    let summary = summarize(&ponds);
    (StatusCode::OK, Json(BatchPredictResponse { ponds, summary })).into_response()
}

/// Dump the configured threshold bands.
///
/// GET /api/thresholds
async fn thresholds(State(state): State<ApiState>) -> impl IntoResponse {
    let bands: BTreeMap<String, _> = state
        .predictor
        .registry()
        .iter()
        .map(|(parameter, band)| (parameter.to_string(), *band))
        .collect();
    Json(bands)
}

/// Evaluate one synthetic pond with randomized readings. Demo and
/// smoke-test endpoint; does not touch the history store.
///
/// GET /api/simulate
async fn simulate(State(state): State<ApiState>) -> impl IntoResponse {
    let now = Timestamp::now();
    let mut rng = rand::rng();

    let mut values = BTreeMap::new();
    for (parameter, band) in state.predictor.registry().iter() {
        let low = band.acceptable_low().unwrap_or(band.optimal_min);
        let high = band.acceptable_high().unwrap_or(band.optimal_max);
        // Overshoot the band on both sides so simulated ponds sometimes
        // violate and exercise the alerting path.
        let span = high - low;
        let value = rng.random_range((low - 0.2 * span)..(high + 0.2 * span));
        if let Ok(value) = NotNan::new(band.clamp_plausible(value)) {
            values.insert(parameter.into(), value);
        }
    }

    let request = aquamon_engine::PredictionRequest {
        snapshot: SensorSnapshot {
            pond_id: PondId("sim-pond".into()),
            timestamp: now,
            values,
        },
        previous: None,
    };

    match state.predictor.predict(&request, now, state.local_hour(now)) {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "simulation failed");
            (error_status(&e), e.to_string()).into_response()
        }
    }
}

fn urgency_rank(outcome: &PondOutcome) -> u8 {
    match outcome.result.as_ref().map(|r| r.urgency) {
        None => 3, // failed ponds float to the top for attention
        Some(Urgency::Critical) => 2,
        Some(Urgency::Warning) => 1,
        Some(Urgency::Normal) => 0,
    }
}

fn critical_alerts(outcome: &PondOutcome) -> usize {
    outcome.result.as_ref().map_or(0, |r| {
        r.alerts
            .iter()
            .filter(|a| a.severity == aquamon_core::AlertSeverity::Critical)
            .count()
    })
}

fn sort_worst_first(ponds: &mut [PondOutcome]) {
    ponds.sort_by(|a, b| {
        urgency_rank(b)
            .cmp(&urgency_rank(a))
            .then_with(|| critical_alerts(b).cmp(&critical_alerts(a)))
            .then_with(|| a.pond_id.cmp(&b.pond_id))
    });
}

fn summarize(ponds: &[PondOutcome]) -> FarmSummary {
    let mut summary = FarmSummary {
        total: ponds.len(),
        ..FarmSummary::default()
    };
    for outcome in ponds {
        match outcome.result.as_ref().map(|r| r.urgency) {
            None => summary.failed += 1,
            Some(Urgency::Critical) => summary.critical += 1,
            Some(Urgency::Warning) => summary.warning += 1,
            Some(Urgency::Normal) => summary.normal += 1,
        }
    }
    summary
}
