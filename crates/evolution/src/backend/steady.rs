//! Deterministic steady-state water and sediment solvers
//!
//! Rainfall excess is routed downslope along D8 flow directions and the
//! flow depth follows from Manning's equation for the accumulated
//! discharge. Sediment flux approaches the transport capacity of that flow
//! with a first-order detachment term, and erosion-deposition is the
//! negative divergence of the flux vector.
//!
//! ```text
//! Q  = Σ upslope (rain · cell area)          m³/s
//! h  = min((Q/w · n / √S)^(3/5), Q·t / A)    m
//! Tc = Kt · τ^1.5                            kg/ms
//! qs = Tc · (1 − exp(−σ·L))                  kg/ms
//! ed = −(∂qsx/∂x + ∂qsy/∂y)                  kg/m²s
//! ```
//!
//! The walker budget is validated but does not change the result.

use ndarray::Array2;
use terraflux_algorithms::hydrology::{flow_direction, weighted_flow_accumulation};
use terraflux_algorithms::terrain::DerivativeParams;
use terraflux_core::raster::d8;
use terraflux_core::{AnalysisRegion, Raster};
use tracing::debug;

use super::{
    check_finite, check_walkers, HydrologyInput, HydrologySimulator, SedimentInput,
    SedimentOutput, SedimentSimulator,
};
use crate::error::Result;
use crate::model::scaffold::divergence;
use crate::regime::{shear_stress, sigma};

const MM_PER_HOUR_TO_M_PER_SECOND: f64 = 1.0 / 3_600_000.0;

fn nan_field(like: &Raster<f64>, data: Array2<f64>) -> Result<Raster<f64>> {
    let mut out = like.with_data(data)?;
    out.set_nodata(Some(f64::NAN));
    Ok(out)
}

fn valid(field: &Raster<f64>, row: usize, col: usize) -> Option<f64> {
    let v = field.data()[(row, col)];
    (!field.is_nodata(v)).then_some(v)
}

/// Steady-state Manning flow depth
#[derive(Debug, Clone, Default)]
pub struct SteadyStateWater;

impl HydrologySimulator for SteadyStateWater {
    fn name(&self) -> &'static str {
        "steady-state water"
    }

    fn simulate(&mut self, input: &HydrologyInput<'_>) -> Result<Raster<f64>> {
        check_walkers(self.name(), input.walkers)?;
        let elevation = input.elevation;
        let region = AnalysisRegion::of(elevation)?;
        for field in [input.dx, input.dy, input.rain, input.mannings] {
            region.ensure_matches(field)?;
        }

        let width = region.cell_size();
        let area = region.cell_area();
        let seconds = input.duration.num_milliseconds() as f64 / 1000.0;

        let fdir = flow_direction(elevation)?;
        let inflow = terraflux_algorithms::algebra::map(input.rain, |r| {
            r.max(0.0) * MM_PER_HOUR_TO_M_PER_SECOND * area
        })?;
        let discharge = weighted_flow_accumulation(&fdir, &inflow)?;

        let (rows, cols) = region.shape();
        let mut depth = Array2::from_elem((rows, cols), f64::NAN);
        for ((row, col), h) in depth.indexed_iter_mut() {
            let (Some(_), Some(q), Some(dx), Some(dy), Some(n)) = (
                valid(elevation, row, col),
                valid(&discharge, row, col),
                valid(input.dx, row, col),
                valid(input.dy, row, col),
                valid(input.mannings, row, col),
            ) else {
                continue;
            };

            let ponded = q * seconds / area;
            let slope = dx.hypot(dy);
            *h = if slope > 0.0 {
                ((q / width) * n / slope.sqrt()).powf(0.6).min(ponded)
            } else {
                ponded
            };
        }

        let depth = nan_field(elevation, depth)?;
        check_finite(self.name(), "water depth", &depth, elevation)?;
        debug!(
            max_depth = depth.statistics().max.unwrap_or(0.0),
            "steady-state water depth"
        );
        Ok(depth)
    }
}

/// Steady-state sediment flux and erosion-deposition
#[derive(Debug, Clone, Default)]
pub struct SteadyStateSediment {
    /// Operator for the flux divergence
    pub derivatives: DerivativeParams,
}

impl SedimentSimulator for SteadyStateSediment {
    fn name(&self) -> &'static str {
        "steady-state sediment"
    }

    fn simulate(&mut self, input: &SedimentInput<'_>) -> Result<SedimentOutput> {
        check_walkers(self.name(), input.walkers)?;
        let elevation = input.elevation;
        let region = AnalysisRegion::of(elevation)?;
        for field in [
            input.depth,
            input.dx,
            input.dy,
            input.detachment,
            input.transport,
            input.shearstress,
        ] {
            region.ensure_matches(field)?;
        }

        let width = region.cell_size();
        let fdir = flow_direction(elevation)?;
        let (rows, cols) = region.shape();
        let mut flux = Array2::from_elem((rows, cols), f64::NAN);
        let mut qsx = Array2::from_elem((rows, cols), f64::NAN);
        let mut qsy = Array2::from_elem((rows, cols), f64::NAN);

        for row in 0..rows {
            for col in 0..cols {
                let (Some(h), Some(dx), Some(dy), Some(kd), Some(kt), Some(tc)) = (
                    valid(input.depth, row, col),
                    valid(input.dx, row, col),
                    valid(input.dy, row, col),
                    valid(input.detachment, row, col),
                    valid(input.transport, row, col),
                    valid(input.shearstress, row, col),
                ) else {
                    continue;
                };

                let gradient = dx.hypot(dy);
                let tau = shear_stress(h, gradient.atan());
                let capacity = kt * tau.max(0.0).powf(1.5);
                let reaction = sigma(tau, kd, kt, tc);

                let code = fdir.data()[(row, col)] as usize;
                let length = match d8::DISTANCES.get(code) {
                    Some(&d) if code != 0 => d * width,
                    _ => width,
                };

                let qs = capacity * (1.0 - (-reaction * length).exp());
                let theta = if gradient > 0.0 { (-dy).atan2(-dx) } else { 0.0 };
                flux[(row, col)] = qs;
                qsx[(row, col)] = qs * theta.cos();
                qsy[(row, col)] = qs * theta.sin();
            }
        }

        let flux = nan_field(elevation, flux)?;
        let qsx = nan_field(elevation, qsx)?;
        let qsy = nan_field(elevation, qsy)?;

        let div = divergence(&region, self.derivatives, &qsx, &qsy)?;
        let erosion_deposition = terraflux_algorithms::algebra::map(&div, |d| -d)?;

        check_finite(self.name(), "sediment flux", &flux, input.depth)?;
        check_finite(
            self.name(),
            "erosion-deposition",
            &erosion_deposition,
            &flux,
        )?;
        debug!(
            max_flux = flux.statistics().max.unwrap_or(0.0),
            "steady-state sediment transport"
        );

        Ok(SedimentOutput {
            erosion_deposition,
            flux,
        })
    }
}
