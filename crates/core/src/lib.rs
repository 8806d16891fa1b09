//! # TerraFlux Core
//!
//! Core types for the TerraFlux terrain evolution workspace.
//!
//! This crate provides:
//! - `Raster<T>`: Generic raster grid type with NoData cells
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `AnalysisRegion`: The active analysis extent and resolution, with
//!   scoped halo expansion for moving-window operators
//! - Algorithm trait for consistent API

pub mod error;
pub mod raster;
pub mod region;

pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use region::{AnalysisRegion, HaloScope};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::region::{AnalysisRegion, HaloScope};
    pub use crate::Algorithm;
}

/// Core trait for raster algorithms in TerraFlux.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
