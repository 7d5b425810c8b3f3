/// Errors that can arise while evaluating a prediction request.
///
/// Local recovery is preferred wherever a safe default exists: unknown
/// parameters are excluded from aggregation and surfaced as warnings,
/// and a missing model selects the persistence-plus-drift fallback
/// rather than erroring. Only structurally invalid input fails the
/// whole request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// A snapshot or trigger rule references a parameter absent from
    /// the threshold registry.
    #[error("unknown parameter: {0}")]
    UnknownParameter(Box<str>),

    /// The snapshot is missing required identifying fields or carries
    /// no usable values. The whole request fails, no partial result.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(Box<str>),

    /// The trigger state lock stayed poisoned after one internal
    /// recovery attempt. Transient; the caller may retry.
    #[error("trigger state conflict")]
    TriggerStateConflict,
}

/// Configuration problems detected at construction time. These are
/// startup errors, never runtime ones.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("threshold band for {parameter} is not ordered: {reason}")]
    InvalidBand {
        parameter: Box<str>,
        reason: Box<str>,
    },

    #[error("WQI class breakpoints do not partition [0, 100]: {0}")]
    InvalidBreakpoints(Box<str>),

    #[error("trigger rule for {actuator} is invalid: {reason}")]
    InvalidTriggerRule {
        actuator: Box<str>,
        reason: Box<str>,
    },
}

/// Error from the underlying forecast/classification model interface.
///
/// Never surfaced to callers: the adapter treats any model error as
/// "model unavailable" and falls back to the rule-based path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("model backend error: {0}")]
    Backend(Box<str>),
}
