//! # TerraFlux Algorithms
//!
//! Raster engines used by the terrain evolution loop.
//!
//! ## Available Algorithm Categories
//!
//! - **algebra**: element-wise band math, conditional select, outlier clamp
//! - **terrain**: slope, aspect and partial derivatives over a search window
//! - **hydrology**: D8 flow direction, (weighted) flow accumulation,
//!   upslope contributing area
//! - **statistics**: focal mean smoothing
//! - **edge**: nearest-value growing, halo expand/restore, patching

pub mod algebra;
pub mod edge;
pub mod hydrology;
pub(crate) mod maybe_rayon;
pub mod statistics;
pub mod terrain;

use terraflux_core::raster::Raster;
use terraflux_core::{Error, Result};

/// Build a NaN-NoData field on the grid of `like` from row-major values.
pub(crate) fn assemble(like: &Raster<f64>, values: Vec<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = like.shape();
    let mut output = like.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = ndarray::Array2::from_shape_vec((rows, cols), values)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::algebra::{binary, clamp, map, scalar, select, zip, BinaryOp, Clamp, ClampParams};
    pub use crate::edge::{expand, grow, patch, restore, Grow, Patched};
    pub use crate::hydrology::{
        flow_accumulation, flow_direction, upslope_area, weighted_flow_accumulation,
        FlowAccumulation, FlowDirection,
    };
    pub use crate::statistics::{focal_mean, focal_statistics, FocalParams, FocalStatistic};
    pub use crate::terrain::{
        partial_derivatives, DerivativeMethod, DerivativeParams, PartialDerivatives,
        TerrainDerivatives,
    };
    pub use terraflux_core::prelude::*;
}
