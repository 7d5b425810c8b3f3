//! Static per-parameter threshold bands.
//!
//! The registry is built once at startup from configuration, validated,
//! and then only read. Reconfiguration means constructing a new registry
//! and swapping it atomically; nothing here mutates after construction.

use std::collections::HashMap;

use aquamon_core::BandEdge;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, EngineError};

/// Ordered bounds for one water-quality parameter.
///
/// Invariant, checked at construction:
///   critical_min ≤ acceptable_min ≤ optimal_min ≤ optimal_max
///   ≤ acceptable_max ≤ critical_max (where present).
///
/// `plausible_min`/`plausible_max` bound what a forecast may physically
/// project (e.g. pH in [0, 14]); they are not quality thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdBand {
    pub critical_min: Option<f64>,
    pub acceptable_min: Option<f64>,
    pub optimal_min: f64,
    pub optimal_max: f64,
    pub acceptable_max: Option<f64>,
    pub critical_max: Option<f64>,
    #[serde(default)]
    pub plausible_min: Option<f64>,
    #[serde(default)]
    pub plausible_max: Option<f64>,
}

impl ThresholdBand {
    fn validate(&self, parameter: &str) -> Result<(), ConfigError> {
        let ordered = [
            self.critical_min,
            self.acceptable_min,
            Some(self.optimal_min),
            Some(self.optimal_max),
            self.acceptable_max,
            self.critical_max,
        ];

        let mut prev: Option<f64> = None;
        for bound in ordered.into_iter().flatten() {
            if !bound.is_finite() {
                return Err(ConfigError::InvalidBand {
                    parameter: parameter.into(),
                    reason: "non-finite bound".into(),
                });
            }
            if let Some(p) = prev
                && bound < p
            {
                return Err(ConfigError::InvalidBand {
                    parameter: parameter.into(),
                    reason: format!("{bound} follows {p}").into(),
                });
            }
            prev = Some(bound);
        }

        Ok(())
    }

    pub fn optimal_center(&self) -> f64 {
        (self.optimal_min + self.optimal_max) / 2.0
    }

    /// Lower acceptable edge, falling back to the critical bound when
    /// the acceptable one is absent on that side.
    pub fn acceptable_low(&self) -> Option<f64> {
        self.acceptable_min.or(self.critical_min)
    }

    pub fn acceptable_high(&self) -> Option<f64> {
        self.acceptable_max.or(self.critical_max)
    }

    /// Which acceptable edge the value sits outside of, if any.
    pub fn violated_edge(&self, value: f64) -> Option<BandEdge> {
        if let Some(low) = self.acceptable_low()
            && value < low
        {
            return Some(BandEdge::Low);
        }
        if let Some(high) = self.acceptable_high()
            && value > high
        {
            return Some(BandEdge::High);
        }
        None
    }

    pub fn within_acceptable(&self, value: f64) -> bool {
        self.violated_edge(value).is_none()
    }

    /// Clamp a projected value to the physically plausible range.
    pub fn clamp_plausible(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(min) = self.plausible_min {
            v = v.max(min);
        }
        if let Some(max) = self.plausible_max {
            v = v.min(max);
        }
        v
    }
}

/// Read-only lookup of threshold bands by parameter name. Safe for
/// concurrent reads from any number of callers.
#[derive(Debug, Clone)]
pub struct ThresholdRegistry {
    bands: HashMap<Box<str>, ThresholdBand>,
}

impl ThresholdRegistry {
    pub fn new(bands: HashMap<Box<str>, ThresholdBand>) -> Result<Self, ConfigError> {
        for (parameter, band) in &bands {
            band.validate(parameter)?;
        }
        Ok(Self { bands })
    }

    pub fn band_for(&self, parameter: &str) -> Result<&ThresholdBand, EngineError> {
        self.bands
            .get(parameter)
            .ok_or_else(|| EngineError::UnknownParameter(parameter.into()))
    }

    /// Non-failing lookup for callers that treat missing bands as
    /// "skip this parameter".
    pub fn band(&self, parameter: &str) -> Option<&ThresholdBand> {
        self.bands.get(parameter)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ThresholdBand)> {
        self.bands.iter().map(|(k, v)| (k.as_ref(), v))
    }

    /// Shrimp-pond bands from the hatchery operations handbook.
    pub fn defaults() -> Self {
        let band = |cmin, amin, omin, omax, amax, cmax, pmin, pmax| ThresholdBand {
            critical_min: Some(cmin),
            acceptable_min: Some(amin),
            optimal_min: omin,
            optimal_max: omax,
            acceptable_max: Some(amax),
            critical_max: Some(cmax),
            plausible_min: Some(pmin),
            plausible_max: Some(pmax),
        };

        let bands: HashMap<Box<str>, ThresholdBand> = [
            ("DO", band(3.0, 4.0, 5.0, 8.0, 10.0, 15.0, 0.0, 20.0)),
            ("pH", band(6.5, 7.0, 7.5, 8.5, 9.0, 9.5, 0.0, 14.0)),
            ("Temperature", band(20.0, 24.0, 26.0, 30.0, 32.0, 35.0, 10.0, 45.0)),
            ("Salinity", band(5.0, 10.0, 15.0, 25.0, 30.0, 40.0, 0.0, 50.0)),
            ("Ammonia", band(0.0, 0.0, 0.0, 0.05, 0.1, 0.5, 0.0, 5.0)),
            ("Nitrite", band(0.0, 0.0, 0.0, 0.25, 0.5, 1.0, 0.0, 5.0)),
            ("Turbidity", band(10.0, 20.0, 25.0, 40.0, 50.0, 80.0, 0.0, 200.0)),
        ]
        .into_iter()
        .map(|(k, v)| (k.into(), v))
        .collect();

        Self::new(bands).expect("default bands are ordered")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_resolves_all_seven_parameters() {
        let registry = ThresholdRegistry::defaults();
        for parameter in ["pH", "Temperature", "DO", "Salinity", "Ammonia", "Nitrite", "Turbidity"]
        {
            assert!(registry.band_for(parameter).is_ok(), "missing {parameter}");
        }
    }

    #[test]
    fn unknown_parameter_is_an_error() {
        let registry = ThresholdRegistry::defaults();
        assert_eq!(
            registry.band_for("Chlorophyll"),
            Err(EngineError::UnknownParameter("Chlorophyll".into())),
        );
    }

    #[test]
    fn misordered_band_is_a_startup_error() {
        let band = ThresholdBand {
            critical_min: Some(5.0),
            acceptable_min: Some(4.0), // below critical_min
            optimal_min: 6.0,
            optimal_max: 8.0,
            acceptable_max: Some(9.0),
            critical_max: Some(10.0),
            plausible_min: None,
            plausible_max: None,
        };
        let bands = [("DO".into(), band)].into_iter().collect();
        assert!(matches!(
            ThresholdRegistry::new(bands),
            Err(ConfigError::InvalidBand { .. })
        ));
    }

    #[test]
    fn one_sided_band_is_valid() {
        let band = ThresholdBand {
            critical_min: None,
            acceptable_min: None,
            optimal_min: 0.0,
            optimal_max: 0.05,
            acceptable_max: Some(0.1),
            critical_max: Some(0.5),
            plausible_min: Some(0.0),
            plausible_max: None,
        };
        let bands = [("Ammonia".into(), band)].into_iter().collect();
        let registry = ThresholdRegistry::new(bands).unwrap();
        let band = registry.band_for("Ammonia").unwrap();
        assert_eq!(band.acceptable_low(), None);
        assert_eq!(band.acceptable_high(), Some(0.1));
        assert_eq!(band.violated_edge(0.2), Some(BandEdge::High));
        assert_eq!(band.violated_edge(0.0), None);
    }

    #[test]
    fn violated_edge_is_strictly_outside() {
        let registry = ThresholdRegistry::defaults();
        let band = registry.band_for("DO").unwrap();
        assert_eq!(band.violated_edge(4.0), None, "on the edge is inside");
        assert_eq!(band.violated_edge(3.9), Some(BandEdge::Low));
        assert_eq!(band.violated_edge(10.1), Some(BandEdge::High));
    }

    #[test]
    fn plausible_clamp_bounds_projections() {
        let registry = ThresholdRegistry::defaults();
        let ph = registry.band_for("pH").unwrap();
        assert_eq!(ph.clamp_plausible(-0.3), 0.0);
        assert_eq!(ph.clamp_plausible(14.7), 14.0);
        assert_eq!(ph.clamp_plausible(7.2), 7.2);
    }
}
