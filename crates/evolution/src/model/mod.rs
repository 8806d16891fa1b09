//! Physical models
//!
//! Every model turns the elevation at the start of a step into the
//! elevation at its end, sharing one scaffold:
//!
//! 1. derivatives of the elevation, grown over the border halo
//! 2. a raw erosion-deposition or flux field (SIMWE backends, or the
//!    USPED/RUSLE transport capacity)
//! 3. outlier clamp
//! 4. elevation update over the interval
//! 5. smoothing and gravitational diffusion
//! 6. patching of missing cells from the previous elevation
//!
//! Models differ only in step 2 and in the field that drives step 4.

pub(crate) mod scaffold;
mod simwe;
mod usped;

use std::fmt;

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use terraflux_core::{AnalysisRegion, Raster};
use tracing::debug;

use crate::backend::{HydrologySimulator, SedimentSimulator};
use crate::config::{Coefficients, SimulationParameters};
use crate::error::Result;

/// Physical model of one time step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Transport-limited SIMWE: net erosion-deposition over sediment density
    ErosionDeposition,
    /// Detachment-limited SIMWE: sediment flux over mass per area
    DetachmentFlux,
    /// Unit stream power erosion-deposition
    Usped,
    /// RUSLE3D length-slope form of USPED
    Rusle,
}

impl ModelKind {
    pub fn name(self) -> &'static str {
        match self {
            ModelKind::ErosionDeposition => "erosion-deposition",
            ModelKind::DetachmentFlux => "detachment-flux",
            ModelKind::Usped => "usped",
            ModelKind::Rusle => "rusle",
        }
    }

    /// Whether the model runs a hydrology pass and reports water depth
    pub fn produces_depth(self) -> bool {
        matches!(self, ModelKind::ErosionDeposition | ModelKind::DetachmentFlux)
    }

    /// Run one time step.
    pub fn run(
        self,
        ctx: &mut ModelContext<'_>,
        elevation: &Raster<f64>,
        forcing: &StepForcing,
    ) -> Result<ModelOutput> {
        ctx.region.ensure_matches(elevation)?;
        ctx.region.ensure_matches(&forcing.intensity)?;
        debug!(model = self.name(), start = %forcing.start, "running physical model");

        match self {
            ModelKind::ErosionDeposition => simwe::erosion_deposition(ctx, elevation, forcing),
            ModelKind::DetachmentFlux => simwe::detachment_flux(ctx, elevation, forcing),
            ModelKind::Usped => usped::run(ctx, elevation, forcing, usped::TopographicFactor::Usped),
            ModelKind::Rusle => usped::run(ctx, elevation, forcing, usped::TopographicFactor::Rusle),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a model needs besides the elevation: the grid, run parameters,
/// coefficient fields and the backends.
pub struct ModelContext<'a> {
    pub region: &'a AnalysisRegion,
    pub params: &'a SimulationParameters,
    pub coefficients: &'a Coefficients,
    pub hydrology: &'a mut dyn HydrologySimulator,
    pub sediment: &'a mut dyn SedimentSimulator,
}

/// Forcing of one step
#[derive(Debug, Clone)]
pub struct StepForcing {
    pub start: NaiveDateTime,
    pub interval: TimeDelta,
    /// Rainfall intensity (mm/h), including any retained-water feedback
    pub intensity: Raster<f64>,
}

impl StepForcing {
    pub fn end(&self) -> Result<NaiveDateTime> {
        crate::rainfall::step_end(self.start, self.interval)
    }

    pub fn seconds(&self) -> f64 {
        self.interval.num_milliseconds() as f64 / 1000.0
    }

    pub fn minutes(&self) -> f64 {
        crate::rainfall::as_minutes(self.interval)
    }
}

/// Fields produced by one step, stamped with the step end
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub evolved_elevation: Raster<f64>,
    /// Water depth (m); USPED and RUSLE have none
    pub depth: Option<Raster<f64>>,
    pub erosion_deposition: Raster<f64>,
    pub flux: Raster<f64>,
    /// Previous elevation minus evolved elevation
    pub difference: Raster<f64>,
    pub timestamp: NaiveDateTime,
    /// Cells still NoData after patching
    pub missing_cells: usize,
}
