//! # TerraFlux Evolution
//!
//! Rainfall-driven landscape evolution on a DEM.
//!
//! A run steps an elevation field through time. Each step takes the rainfall
//! of one interval, simulates water and sediment flow with one of four
//! physical models, clamps the resulting erosion-deposition or flux,
//! updates and stabilizes the surface, and registers the produced fields
//! under the end timestamp of the step.
//!
//! - [`config`]: run parameters and coefficient fields
//! - [`rainfall`]: event subdivision and precipitation log replay
//! - [`regime`]: detachment- vs transport-limited classification
//! - [`model`]: erosion-deposition, detachment-flux, USPED and RUSLE
//! - [`backend`]: hydrology and sediment solver traits with a built-in
//!   steady-state solver
//! - [`registry`]: output time series
//! - [`simulation`]: the time-stepping loop
//! - [`batch`]: independent runs in parallel

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod model;
pub mod rainfall;
pub mod regime;
pub mod registry;
pub mod simulation;

pub use batch::{run_batch, BatchJob, BatchOutcome, BatchRun, ProcessingMode};
pub use config::{CoefficientFields, Coefficients, Mode, RegimeComparison, SimulationParameters};
pub use error::{EvolutionError, Result};
pub use model::{ModelKind, ModelOutput};
pub use rainfall::{parse_precipitation, parse_timestamp, RainfallDriver, RainfallRecord, SeriesInterval};
pub use regime::{Regime, RegimeClassifier, RegimeDecision};
pub use registry::{InMemoryRegistry, SeriesName, TemporalRegistry};
pub use simulation::{run, EvolutionState, Phase, RunKind, RunSummary, Simulation};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::{HydrologySimulator, SedimentSimulator};
    pub use crate::{
        CoefficientFields, EvolutionError, InMemoryRegistry, Mode, ModelKind, Result, RunKind,
        RunSummary, SeriesName, Simulation, SimulationParameters, TemporalRegistry,
    };
    pub use terraflux_core::prelude::*;
}
