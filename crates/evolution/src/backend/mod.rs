//! Hydrology and sediment-transport backends
//!
//! The physical models hand the water and sediment sub-simulations to
//! implementations of [`HydrologySimulator`] and [`SedimentSimulator`]. A
//! backend may run its own internal parallelism, but one call must finish
//! before the next time step starts. Any error it returns aborts the run.

mod steady;

pub use steady::{SteadyStateSediment, SteadyStateWater};

use chrono::TimeDelta;
use terraflux_core::Raster;

use crate::config::MAX_WALKERS;
use crate::error::{EvolutionError, Result};

/// Inputs of one water-flow simulation
#[derive(Debug, Clone, Copy)]
pub struct HydrologyInput<'a> {
    pub elevation: &'a Raster<f64>,
    /// ∂z/∂x, grown over the whole region
    pub dx: &'a Raster<f64>,
    /// ∂z/∂y (north positive), grown over the whole region
    pub dy: &'a Raster<f64>,
    /// Rainfall excess rate (mm/h)
    pub rain: &'a Raster<f64>,
    pub mannings: &'a Raster<f64>,
    pub walkers: u64,
    pub duration: TimeDelta,
}

/// Inputs of one sediment-transport simulation
#[derive(Debug, Clone, Copy)]
pub struct SedimentInput<'a> {
    pub elevation: &'a Raster<f64>,
    /// Water depth (m) from the hydrology pass
    pub depth: &'a Raster<f64>,
    pub dx: &'a Raster<f64>,
    pub dy: &'a Raster<f64>,
    pub detachment: &'a Raster<f64>,
    pub transport: &'a Raster<f64>,
    pub shearstress: &'a Raster<f64>,
    pub mannings: &'a Raster<f64>,
    pub walkers: u64,
    pub duration: TimeDelta,
}

/// Fields produced by a sediment simulation
#[derive(Debug, Clone)]
pub struct SedimentOutput {
    /// Net erosion (negative) or deposition (positive), kg/m²s
    pub erosion_deposition: Raster<f64>,
    /// Sediment flux, kg/ms
    pub flux: Raster<f64>,
}

/// Water depth solver
pub trait HydrologySimulator: Send {
    fn name(&self) -> &'static str;

    /// Water depth (m) after `input.duration`.
    fn simulate(&mut self, input: &HydrologyInput<'_>) -> Result<Raster<f64>>;
}

/// Sediment transport solver
pub trait SedimentSimulator: Send {
    fn name(&self) -> &'static str;

    fn simulate(&mut self, input: &SedimentInput<'_>) -> Result<SedimentOutput>;
}

/// Reject walker budgets outside what the particle solvers accept.
pub fn check_walkers(backend: &'static str, walkers: u64) -> Result<()> {
    if walkers == 0 || walkers > MAX_WALKERS {
        return Err(EvolutionError::backend(
            backend,
            format!("walker budget {walkers} outside 1..={MAX_WALKERS}"),
        ));
    }
    Ok(())
}

/// Fail with a numerical divergence when `output` is non-finite where
/// `reference` is valid.
pub fn check_finite(
    backend: &'static str,
    what: &str,
    output: &Raster<f64>,
    reference: &Raster<f64>,
) -> Result<()> {
    let diverged = output
        .data()
        .iter()
        .zip(reference.data().iter())
        .filter(|&(&v, &r)| !reference.is_nodata(r) && !v.is_finite())
        .count();
    if diverged > 0 {
        return Err(EvolutionError::backend(
            backend,
            format!("{what} diverged at {diverged} cells"),
        ));
    }
    Ok(())
}
