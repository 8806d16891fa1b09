//! Regime classifier
//!
//! Decides whether erosion over the grid is limited by the detachment of
//! soil or by the transport capacity of the flow, from the first-order
//! reaction term
//!
//! ```text
//! τ = ρw·g·h·sin(β)
//! σ = 0                                if τ ≤ τc or Kt = 0
//! σ = (Kd / Kt)·(τ − τc) / τ^1.5       otherwise
//! ```
//!
//! averaged over the valid cells and compared against a tunable threshold.

use serde::{Deserialize, Serialize};
use terraflux_core::Raster;
use tracing::{debug, warn};

use crate::config::{RegimeComparison, SimulationParameters};
use crate::error::Result;
use crate::model::ModelKind;

/// Density of water (kg/m³)
pub const WATER_DENSITY: f64 = 1000.0;
/// Gravitational acceleration (m/s²)
pub const GRAVITY: f64 = 9.81;

/// Bed shear stress (Pa) of a water column of `depth` metres on a slope of
/// `slope` radians.
#[inline]
pub fn shear_stress(depth: f64, slope: f64) -> f64 {
    WATER_DENSITY * GRAVITY * depth * slope.sin()
}

/// First-order reaction term for shear stress `tau` and critical shear
/// stress `critical`.
#[inline]
pub fn sigma(tau: f64, detachment: f64, transport: f64, critical: f64) -> f64 {
    if tau <= critical || transport == 0.0 {
        0.0
    } else {
        (detachment / transport) * (tau - critical) / tau.powf(1.5)
    }
}

/// Rate-limiting process of the erosion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    DetachmentLimited,
    TransportLimited,
}

impl Regime {
    /// Physical model that handles this regime
    pub fn model(self) -> ModelKind {
        match self {
            Regime::DetachmentLimited => ModelKind::DetachmentFlux,
            Regime::TransportLimited => ModelKind::ErosionDeposition,
        }
    }
}

/// Fields the classifier reads, all on one grid
#[derive(Debug, Clone, Copy)]
pub struct RegimeInput<'a> {
    /// Water depth (m)
    pub depth: &'a Raster<f64>,
    /// Slope (radians)
    pub slope: &'a Raster<f64>,
    pub detachment: &'a Raster<f64>,
    pub transport: &'a Raster<f64>,
    pub shearstress: &'a Raster<f64>,
}

/// Outcome of [`RegimeClassifier::classify`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeDecision {
    pub regime: Regime,
    pub mean_sigma: f64,
    pub valid_cells: usize,
}

/// Threshold test on the mean reaction term
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeClassifier {
    pub threshold: f64,
    pub comparison: RegimeComparison,
}

impl Default for RegimeClassifier {
    fn default() -> Self {
        Self {
            threshold: 1e-3,
            comparison: RegimeComparison::Greater,
        }
    }
}

impl RegimeClassifier {
    pub fn from_params(params: &SimulationParameters) -> Self {
        Self {
            threshold: params.regime_threshold,
            comparison: params.regime_comparison,
        }
    }

    /// σ for every cell; NoData where any input is NoData.
    pub fn sigma_field(&self, input: &RegimeInput<'_>) -> Result<Raster<f64>> {
        let (rows, cols) = input.depth.shape();
        for other in [input.slope, input.detachment, input.transport, input.shearstress] {
            if other.shape() != (rows, cols) {
                return Err(terraflux_core::Error::SizeMismatch {
                    er: rows,
                    ec: cols,
                    ar: other.rows(),
                    ac: other.cols(),
                }
                .into());
            }
        }

        let mut out = input.depth.like(f64::NAN);
        out.set_nodata(Some(f64::NAN));
        let fields = [
            input.depth,
            input.slope,
            input.detachment,
            input.transport,
            input.shearstress,
        ];
        for ((row, col), value) in out.data_mut().indexed_iter_mut() {
            let mut v = [0.0; 5];
            let mut valid = true;
            for (slot, field) in v.iter_mut().zip(fields) {
                let x = field.data()[(row, col)];
                if field.is_nodata(x) {
                    valid = false;
                    break;
                }
                *slot = x;
            }
            if valid {
                let [depth, slope, kd, kt, tc] = v;
                *value = sigma(shear_stress(depth, slope), kd, kt, tc);
            }
        }
        Ok(out)
    }

    /// Classify the grid from the mean σ over valid cells.
    ///
    /// A grid with no valid cell has mean σ 0 and is transport limited.
    pub fn classify(&self, input: &RegimeInput<'_>) -> Result<RegimeDecision> {
        let field = self.sigma_field(input)?;
        let stats = field.statistics();
        let mean_sigma = stats.mean.unwrap_or(0.0);
        if stats.valid_count == 0 {
            warn!("regime classification over a grid without valid cells");
        }

        let regime = if self.comparison.holds(mean_sigma, self.threshold) {
            Regime::DetachmentLimited
        } else {
            Regime::TransportLimited
        };
        debug!(mean_sigma, threshold = self.threshold, ?regime, "classified erosion regime");

        Ok(RegimeDecision {
            regime,
            mean_sigma,
            valid_cells: stats.valid_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn uniform(v: f64) -> Raster<f64> {
        let mut r = Raster::filled(4, 4, v);
        r.set_nodata(Some(f64::NAN));
        r
    }

    #[test]
    fn test_sigma_cases() {
        assert_eq!(sigma(0.0, 0.01, 0.01, 0.0), 0.0);
        assert_eq!(sigma(5.0, 0.01, 0.0, 0.0), 0.0, "zero transport gives no reaction");
        assert_eq!(sigma(5.0, 0.01, 0.01, 5.0), 0.0, "at critical stress");
        assert_relative_eq!(sigma(4.0, 0.02, 0.01, 0.0), 2.0 * 4.0 / 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shear_stress() {
        let slope = std::f64::consts::FRAC_PI_6;
        assert_relative_eq!(shear_stress(0.01, slope), 1000.0 * 9.81 * 0.01 * 0.5, epsilon = 1e-9);
        assert_eq!(shear_stress(0.5, 0.0), 0.0);
    }

    #[test]
    fn test_flat_grid_is_transport_limited() {
        let (depth, slope) = (uniform(0.02), uniform(0.0));
        let (kd, kt, tc) = (uniform(0.01), uniform(0.01), uniform(0.0));
        let input = RegimeInput {
            depth: &depth,
            slope: &slope,
            detachment: &kd,
            transport: &kt,
            shearstress: &tc,
        };
        let decision = RegimeClassifier::default().classify(&input).unwrap();
        assert_eq!(decision.regime, Regime::TransportLimited);
        assert_eq!(decision.mean_sigma, 0.0);
        assert_eq!(decision.regime.model(), ModelKind::ErosionDeposition);
    }

    #[test]
    fn test_threshold_and_comparison() {
        // τ = 1000·9.81·0.001·sin(0.1) ≈ 0.979; σ = τ^-0.5 ≈ 1.01
        let (depth, slope) = (uniform(0.001), uniform(0.1));
        let (kd, kt, tc) = (uniform(0.01), uniform(0.01), uniform(0.0));
        let input = RegimeInput {
            depth: &depth,
            slope: &slope,
            detachment: &kd,
            transport: &kt,
            shearstress: &tc,
        };
        let decision = RegimeClassifier::default().classify(&input).unwrap();
        assert_eq!(decision.regime, Regime::DetachmentLimited);

        let at_threshold = RegimeClassifier {
            threshold: decision.mean_sigma,
            comparison: RegimeComparison::Greater,
        };
        assert_eq!(at_threshold.classify(&input).unwrap().regime, Regime::TransportLimited);
        let inclusive = RegimeClassifier {
            comparison: RegimeComparison::GreaterOrEqual,
            ..at_threshold
        };
        assert_eq!(inclusive.classify(&input).unwrap().regime, Regime::DetachmentLimited);
    }

    #[test]
    fn test_nodata_cells_are_skipped() {
        let mut depth = uniform(0.001);
        depth.set(0, 0, f64::NAN).unwrap();
        let slope = uniform(0.1);
        let (kd, kt, tc) = (uniform(0.01), uniform(0.01), uniform(0.0));
        let input = RegimeInput {
            depth: &depth,
            slope: &slope,
            detachment: &kd,
            transport: &kt,
            shearstress: &tc,
        };
        let classifier = RegimeClassifier::default();
        let sigma = classifier.sigma_field(&input).unwrap();
        assert!(sigma.get(0, 0).unwrap().is_nan());
        assert_eq!(classifier.classify(&input).unwrap().valid_cells, 15);
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        let depth = uniform(0.001);
        let slope = Raster::filled(3, 3, 0.1);
        let k = uniform(0.01);
        let input = RegimeInput {
            depth: &depth,
            slope: &slope,
            detachment: &k,
            transport: &k,
            shearstress: &k,
        };
        assert!(RegimeClassifier::default().classify(&input).is_err());
    }
}
