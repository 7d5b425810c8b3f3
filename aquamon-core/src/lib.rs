//! Shared domain model for the aquamon water-quality pipeline.
//!
//! This crate defines the types exchanged between the engine and the
//! surrounding service. It contains no logic, no I/O, and no clocks.

use std::collections::BTreeMap;

use jiff::{SignedDuration, Timestamp};
use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

type BoxStr = Box<str>;
type BoxList<T> = Box<[T]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PondId(pub BoxStr);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActuatorId(pub BoxStr);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Ulid);

/// One reading of a pond's sensors at a single instant.
///
/// Values are keyed by parameter name ("pH", "DO", "Temperature", ...)
/// and are `NotNan` so malformed readings are rejected at the boundary,
/// not deep inside the pipeline. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub pond_id: PondId,
    pub timestamp: Timestamp,
    pub values: BTreeMap<BoxStr, NotNan<f64>>,
}

impl SensorSnapshot {
    pub fn value(&self, parameter: &str) -> Option<f64> {
        self.values.get(parameter).map(|v| v.into_inner())
    }

    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_ref())
    }
}

/// Forecast horizons the time-series models are trained for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    H6,
    H12,
    H24,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::H6, Horizon::H12, Horizon::H24];

    pub fn hours(self) -> u32 {
        match self {
            Horizon::H6 => 6,
            Horizon::H12 => 12,
            Horizon::H24 => 24,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Horizon::H6 => "6h",
            Horizon::H12 => "12h",
            Horizon::H24 => "24h",
        }
    }
}

/// The window an alert pertains to: the current reading or a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertHorizon {
    Now,
    H6,
    H12,
    H24,
}

impl From<Horizon> for AlertHorizon {
    fn from(h: Horizon) -> Self {
        match h {
            Horizon::H6 => AlertHorizon::H6,
            Horizon::H12 => AlertHorizon::H12,
            Horizon::H24 => AlertHorizon::H24,
        }
    }
}

/// Water-quality classes, ordered worst to best so `Ord` agrees with the
/// underlying score (a higher class is a higher score).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WqiClass {
    Critical,
    Poor,
    Fair,
    Good,
    Excellent,
}

/// Water Quality Index for one snapshot. Derived data only, never
/// stored apart from the snapshot that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WqiResult {
    /// Aggregate score in [0, 100], rounded half-to-even.
    pub score: u8,
    pub class: WqiClass,
    /// Per-parameter sub-scores that went into the aggregate.
    pub sub_scores: BTreeMap<BoxStr, f64>,
    /// Parameters present in the snapshot but absent from the registry;
    /// excluded from the aggregate and surfaced here as a warning.
    pub excluded: BoxList<BoxStr>,
}

/// Overall class label for the current reading, with provenance: a
/// trained classifier when one is wired in, the WQI breakpoints
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub class: WqiClass,
    /// Identifier of the classifier that produced the label.
    pub model_id: BoxStr,
}

/// A snapshot-shaped projection of sensor values at one horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub horizon: Horizon,
    pub values: BTreeMap<BoxStr, NotNan<f64>>,
    /// Identifier of the model that produced the projection.
    pub model_id: BoxStr,
    /// Parameters this model had no coverage for, projected by the
    /// persistence-plus-drift rule instead.
    pub fallback_parameters: BoxList<BoxStr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceLabel {
    Low,
    Medium,
    High,
}

/// Forecast reliability for one horizon, in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub value: f64,
    pub label: ConfidenceLabel,
}

/// Which edge of the acceptable band a parameter is heading for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BandEdge {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DangerStatus {
    /// Flat or receding trend, or no crossing inside the window.
    None,
    /// The current value is already outside the acceptable band.
    AlreadyViolated { edge: BandEdge },
    /// A crossing of the acceptable band is projected.
    Crossing { edge: BandEdge, eta: SignedDuration },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeToDanger {
    pub parameter: BoxStr,
    pub status: DangerStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// What an alert or recommendation refers to: a single parameter or the
/// pond's overall condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertScope {
    Parameter(BoxStr),
    Overall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub scope: AlertScope,
    pub horizon: AlertHorizon,
    pub message: BoxStr,
}

/// Advisory remediation text tied to one or more alerts. No state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub scope: AlertScope,
    pub action: BoxStr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TriggerPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// Direction of a trigger rule's threshold test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdKind {
    /// Violates when the reading drops below the threshold.
    Below,
    /// Violates when the reading rises above the threshold.
    Above,
}

/// A configured hardware actuation rule. Immutable at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRule {
    pub actuator: ActuatorId,
    pub parameter: BoxStr,
    pub kind: ThresholdKind,
    pub threshold: NotNan<f64>,
    /// Consecutive violating readings required before firing.
    pub confirmations: u32,
    /// No re-fire window after the actuator disengages.
    pub cooldown: SignedDuration,
    /// How long the actuator stays engaged before automatic shutoff.
    pub auto_shutoff: SignedDuration,
    pub priority: TriggerPriority,
}

impl TriggerRule {
    pub fn violates(&self, value: f64) -> bool {
        match self.kind {
            ThresholdKind::Below => value < self.threshold.into_inner(),
            ThresholdKind::Above => value > self.threshold.into_inner(),
        }
    }
}

/// Emitted when a trigger rule transitions into Active. Consumed by the
/// external hardware-command dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub id: EventId,
    pub pond_id: PondId,
    pub actuator: ActuatorId,
    pub priority: TriggerPriority,
    pub reason: BoxStr,
    pub fired_at: Timestamp,
}

/// Estimated path back to the target WQI with active intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecoveryOutlook {
    /// Already at or above the target; no action needed.
    AtTarget,
    /// Recoverable with the listed interventions.
    Recoverable {
        estimated: SignedDuration,
        actions: BoxList<BoxStr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryEstimate {
    pub current_score: u8,
    pub target_score: u8,
    pub outlook: RecoveryOutlook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NightRisk {
    Safe,
    Watch,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightSafety {
    pub is_night: bool,
    pub risk: NightRisk,
    pub message: BoxStr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Urgency {
    Normal,
    Warning,
    Critical,
}

/// Current WQI plus the snapshot it was scored from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub snapshot: SensorSnapshot,
    pub wqi: WqiResult,
}

/// One horizon's forecast, its predicted WQI, and its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonOutlook {
    pub horizon: Horizon,
    pub forecast: Forecast,
    pub predicted_wqi: WqiResult,
    pub confidence: ConfidenceScore,
}

/// The externally consumed prediction contract. Field names and nesting
/// are serialized as-is by the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub pond_id: PondId,
    pub generated_at: Timestamp,
    pub current: CurrentConditions,
    pub classification: Classification,
    pub horizons: BoxList<HorizonOutlook>,
    pub time_to_danger: BoxList<TimeToDanger>,
    pub night_safety: NightSafety,
    pub recovery: RecoveryEstimate,
    pub alerts: BoxList<Alert>,
    pub recommendations: BoxList<Recommendation>,
    pub urgency: Urgency,
    pub trigger_events: BoxList<TriggerEvent>,
}

/// Per-pond entry of a batch evaluation. A failed pond carries its error
/// marker without aborting the rest of the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PondOutcome {
    pub pond_id: PondId,
    pub result: Option<PredictionResult>,
    pub error: Option<BoxStr>,
}
