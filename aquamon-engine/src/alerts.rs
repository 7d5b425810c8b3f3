//! Alert and recommendation generation.
//!
//! Alerts are derived fresh from each evaluation; nothing here carries
//! state between requests. Duplicate suppression keeps one alert per
//! (parameter, edge), preferring the nearest horizon, so a violation
//! seen now does not also spam its 6h/12h/24h echoes.

use std::collections::{HashMap, HashSet};

use aquamon_core::{
    Alert, AlertHorizon, AlertScope, AlertSeverity, BandEdge, Recommendation, SensorSnapshot,
    WqiClass, WqiResult,
};

use crate::forecast::HorizonForecast;
use crate::thresholds::ThresholdRegistry;

pub struct AlertGenerator;

impl AlertGenerator {
    /// Build the alert and recommendation lists for one evaluation.
    pub fn generate(
        snapshot: &SensorSnapshot,
        current_wqi: &WqiResult,
        forecasts: &[HorizonForecast],
        registry: &ThresholdRegistry,
    ) -> (Vec<Alert>, Vec<Recommendation>) {
        let mut alerts: Vec<Alert> = Vec::new();
        // Nearest horizon seen per (parameter, edge); later (farther)
        // duplicates are dropped.
        let mut seen: HashMap<(Box<str>, BandEdge), AlertHorizon> = HashMap::new();

        for (parameter, value) in &snapshot.values {
            let Some(band) = registry.band(parameter) else {
                continue;
            };
            if let Some(edge) = band.violated_edge(value.into_inner()) {
                seen.insert((parameter.clone(), edge), AlertHorizon::Now);
                alerts.push(Alert {
                    severity: AlertSeverity::Critical,
                    scope: AlertScope::Parameter(parameter.clone()),
                    horizon: AlertHorizon::Now,
                    message: violation_message(parameter, edge, value.into_inner(), "is"),
                });
            }
        }

        for hf in forecasts {
            let horizon = AlertHorizon::from(hf.forecast.horizon);
            for (parameter, value) in &hf.forecast.values {
                let Some(band) = registry.band(parameter) else {
                    continue;
                };
                let Some(edge) = band.violated_edge(value.into_inner()) else {
                    continue;
                };
                let key = (parameter.clone(), edge);
                if seen.contains_key(&key) {
                    continue;
                }
                seen.insert(key, horizon);
                alerts.push(Alert {
                    severity: AlertSeverity::Warning,
                    scope: AlertScope::Parameter(parameter.clone()),
                    horizon,
                    message: violation_message(
                        parameter,
                        edge,
                        value.into_inner(),
                        projection_verb(horizon),
                    ),
                });
            }
        }

        if current_wqi.class <= WqiClass::Poor {
            alerts.push(Alert {
                severity: AlertSeverity::Critical,
                scope: AlertScope::Overall,
                horizon: AlertHorizon::Now,
                message: format!(
                    "Overall water quality is {} (WQI {})",
                    class_label(current_wqi.class),
                    current_wqi.score,
                )
                .into(),
            });
        }

        for parameter in &current_wqi.excluded {
            alerts.push(Alert {
                severity: AlertSeverity::Warning,
                scope: AlertScope::Parameter(parameter.clone()),
                horizon: AlertHorizon::Now,
                message: format!("{parameter} has no configured thresholds and was not scored")
                    .into(),
            });
        }

        let recommendations = recommendations_for(&seen, current_wqi);

        (alerts, recommendations)
    }
}

fn recommendations_for(
    seen: &HashMap<(Box<str>, BandEdge), AlertHorizon>,
    current_wqi: &WqiResult,
) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = Vec::new();
    let mut emitted: HashSet<(AlertScope, Box<str>)> = HashSet::new();

    let mut keys: Vec<&(Box<str>, BandEdge)> = seen.keys().collect();
    keys.sort();

    for (parameter, edge) in keys {
        let action = remedial_action(parameter, *edge);
        let scope = AlertScope::Parameter(parameter.clone());
        if emitted.insert((scope.clone(), action.clone())) {
            recommendations.push(Recommendation { scope, action });
        }
    }

    if current_wqi.class <= WqiClass::Poor {
        recommendations.push(Recommendation {
            scope: AlertScope::Overall,
            action: "Perform a partial water exchange and re-test all parameters within the hour"
                .into(),
        });
    }

    recommendations
}

fn violation_message(parameter: &str, edge: BandEdge, value: f64, verb: &str) -> Box<str> {
    let direction = match edge {
        BandEdge::Low => "below",
        BandEdge::High => "above",
    };
    format!("{parameter} {verb} {direction} the acceptable range ({value:.2})").into()
}

fn projection_verb(horizon: AlertHorizon) -> &'static str {
    match horizon {
        AlertHorizon::Now => "is",
        AlertHorizon::H6 => "is projected within 6h to go",
        AlertHorizon::H12 => "is projected within 12h to go",
        AlertHorizon::H24 => "is projected within 24h to go",
    }
}

fn class_label(class: WqiClass) -> &'static str {
    match class {
        WqiClass::Critical => "Critical",
        WqiClass::Poor => "Poor",
        WqiClass::Fair => "Fair",
        WqiClass::Good => "Good",
        WqiClass::Excellent => "Excellent",
    }
}

/// Remediation playbook per parameter and direction, from the farm
/// operations handbook the deployment shipped with.
fn remedial_action(parameter: &str, edge: BandEdge) -> Box<str> {
    let action = match (parameter, edge) {
        ("DO", BandEdge::Low) => "Increase aeration: run paddlewheels or air blowers at full capacity",
        ("DO", BandEdge::High) => "Reduce aeration and check for algal bloom supersaturation",
        ("pH", BandEdge::Low) => "Apply agricultural lime to raise pH gradually",
        ("pH", BandEdge::High) => "Exchange 10-20% of water and suspend liming",
        ("Temperature", BandEdge::High) => "Add shade cover or exchange with cooler source water",
        ("Temperature", BandEdge::Low) => "Reduce water exchange and feed during the warmest hours",
        ("Ammonia", BandEdge::High) => "Stop feeding immediately and exchange 20-30% of water",
        ("Nitrite", BandEdge::High) => "Add salt to 0.3% and reduce feeding until nitrite falls",
        ("Salinity", BandEdge::Low) => "Top up with brine or reduce freshwater inflow",
        ("Salinity", BandEdge::High) => "Dilute with freshwater gradually over several hours",
        ("Turbidity", BandEdge::Low) => "Fertilize to restore plankton density",
        ("Turbidity", BandEdge::High) => "Reduce feeding and settle solids with a water exchange",
        _ => {
            return format!("Monitor {parameter} closely and re-test within the hour").into();
        }
    };
    action.into()
}
