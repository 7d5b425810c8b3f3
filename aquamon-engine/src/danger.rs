//! Time-to-danger: linear extrapolation of the current trend to the
//! nearest acceptable-band edge in the direction of travel.

use aquamon_core::{BandEdge, DangerStatus, TimeToDanger};
use jiff::SignedDuration;

use crate::thresholds::ThresholdBand;

/// Slopes below this magnitude (units per hour) are treated as flat.
const FLAT_SLOPE: f64 = 1e-6;

/// Estimate when `parameter` leaves the acceptable band.
///
/// A value already outside reports `AlreadyViolated` with no countdown.
/// A flat or receding trend, or a crossing beyond `window_hours`,
/// reports `None`. Anything else reports the projected crossing edge
/// and a strictly positive eta.
pub fn time_to_danger(
    parameter: &str,
    band: &ThresholdBand,
    current: f64,
    slope_per_hour: Option<f64>,
    window_hours: f64,
) -> TimeToDanger {
    let status = danger_status(band, current, slope_per_hour, window_hours);
    TimeToDanger {
        parameter: parameter.into(),
        status,
    }
}

fn danger_status(
    band: &ThresholdBand,
    current: f64,
    slope_per_hour: Option<f64>,
    window_hours: f64,
) -> DangerStatus {
    if let Some(edge) = band.violated_edge(current) {
        return DangerStatus::AlreadyViolated { edge };
    }

    let Some(slope) = slope_per_hour else {
        return DangerStatus::None;
    };
    if slope.abs() < FLAT_SLOPE {
        return DangerStatus::None;
    }

    let (edge, target) = if slope < 0.0 {
        match band.acceptable_low() {
            Some(low) => (BandEdge::Low, low),
            None => return DangerStatus::None,
        }
    } else {
        match band.acceptable_high() {
            Some(high) => (BandEdge::High, high),
            None => return DangerStatus::None,
        }
    };

    let eta_hours = (target - current) / slope;
    if eta_hours <= 0.0 || eta_hours > window_hours {
        return DangerStatus::None;
    }

    DangerStatus::Crossing {
        edge,
        eta: SignedDuration::from_secs_f64(eta_hours * 3600.0),
    }
}
