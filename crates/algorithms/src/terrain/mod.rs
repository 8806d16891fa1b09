//! Terrain derivative engine
//!
//! - 3×3 point formulas (Evans-Young, Zevenbergen-Thorne, Horn)
//! - whole-field slope, aspect and partial derivatives over a search window

pub mod derivatives;
mod partials;

pub use derivatives::{Derivatives, evans_young, horn, zevenbergen_thorne};
pub use partials::{
    partial_derivatives, DerivativeMethod, DerivativeParams, PartialDerivatives,
    TerrainDerivatives,
};
