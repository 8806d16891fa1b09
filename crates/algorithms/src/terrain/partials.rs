//! Terrain derivative fields
//!
//! Slope, aspect and first/second-order partial derivatives of a whole
//! elevation field. Cells whose window leaves the grid or touches NoData
//! come out as NoData, which is the border halo the edge correction later
//! grows over.

use super::derivatives::{evans_young, extract_window, horn, zevenbergen_thorne, Derivatives};
use crate::maybe_rayon::*;
use terraflux_core::raster::Raster;
use terraflux_core::{Algorithm, Error, Result};

/// Finite-difference scheme for the 3×3 window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DerivativeMethod {
    #[default]
    EvansYoung,
    ZevenbergenThorne,
    /// First order only; second derivatives are reported as 0
    Horn,
}

/// Parameters for [`partial_derivatives`]
#[derive(Debug, Clone, Copy)]
pub struct DerivativeParams {
    pub method: DerivativeMethod,
    /// Odd search window size in cells. Windows larger than 3 sample the
    /// 3×3 stencil at a stride of `window / 2` cells.
    pub window: usize,
}

impl Default for DerivativeParams {
    fn default() -> Self {
        Self {
            method: DerivativeMethod::EvansYoung,
            window: 3,
        }
    }
}

impl DerivativeParams {
    /// Cells of NoData halo the operator leaves on each border
    pub fn halo(&self) -> usize {
        self.window / 2
    }
}

/// Derivative fields of one surface
#[derive(Debug, Clone)]
pub struct TerrainDerivatives {
    /// Slope angle in radians
    pub slope: Raster<f64>,
    /// Downslope direction in radians, counter-clockwise from east
    pub aspect: Raster<f64>,
    /// ∂z/∂x
    pub dx: Raster<f64>,
    /// ∂z/∂y, positive northward
    pub dy: Raster<f64>,
    pub dxx: Raster<f64>,
    pub dyy: Raster<f64>,
    pub dxy: Raster<f64>,
}

/// Terrain derivative algorithm
#[derive(Debug, Clone, Default)]
pub struct PartialDerivatives;

impl Algorithm for PartialDerivatives {
    type Input = Raster<f64>;
    type Output = TerrainDerivatives;
    type Params = DerivativeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Partial Derivatives"
    }

    fn description(&self) -> &'static str {
        "Slope, aspect and partial derivatives of a surface over a square search window"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        partial_derivatives(&input, params)
    }
}

/// Compute every derivative field of `surface` in one pass.
pub fn partial_derivatives(
    surface: &Raster<f64>,
    params: DerivativeParams,
) -> Result<TerrainDerivatives> {
    if params.window < 3 || params.window % 2 == 0 {
        return Err(Error::InvalidParameter {
            name: "window",
            value: params.window.to_string(),
            reason: "search window must be odd and at least 3".into(),
        });
    }

    let (rows, cols) = surface.shape();
    let step = params.halo();
    let spacing = surface.cell_size() * step as f64;
    let data = surface.data();

    let solve = match params.method {
        DerivativeMethod::EvansYoung => evans_young,
        DerivativeMethod::ZevenbergenThorne => zevenbergen_thorne,
        DerivativeMethod::Horn => horn,
    };

    let cells: Vec<Option<Derivatives>> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| extract_window(data, row, col, step).map(|z| solve(z, spacing)))
                .collect::<Vec<_>>()
        })
        .collect();

    let field = |f: fn(&Derivatives) -> f64| -> Result<Raster<f64>> {
        let values = cells.iter().map(|d| d.as_ref().map_or(f64::NAN, f)).collect();
        crate::assemble(surface, values)
    };

    Ok(TerrainDerivatives {
        slope: field(Derivatives::slope_angle)?,
        aspect: field(Derivatives::downslope_aspect)?,
        dx: field(|d| d.p)?,
        dy: field(|d| d.q)?,
        dxx: field(|d| d.r)?,
        dyy: field(|d| d.t)?,
        dxy: field(|d| d.s)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use terraflux_core::GeoTransform;

    fn plane(rows: usize, cols: usize, east: f64, north: f64) -> Raster<f64> {
        let mut dem = Raster::new(rows, cols);
        dem.set_transform(GeoTransform::new(0.0, rows as f64 * 10.0, 10.0, -10.0));
        for row in 0..rows {
            for col in 0..cols {
                // row index grows southward
                let z = 100.0 + east * col as f64 * 10.0 - north * row as f64 * 10.0;
                dem.set(row, col, z).unwrap();
            }
        }
        dem
    }

    #[test]
    fn test_plane_gradients() {
        let dem = plane(7, 7, 0.2, 0.1);
        let d = partial_derivatives(&dem, DerivativeParams::default()).unwrap();

        assert_relative_eq!(d.dx.get(3, 3).unwrap(), 0.2, epsilon = 1e-10);
        assert_relative_eq!(d.dy.get(3, 3).unwrap(), 0.1, epsilon = 1e-10);
        assert_relative_eq!(d.dxx.get(3, 3).unwrap(), 0.0, epsilon = 1e-10);
        assert_relative_eq!(
            d.slope.get(3, 3).unwrap(),
            (0.2_f64.hypot(0.1)).atan(),
            epsilon = 1e-10
        );
        // Downhill is south-west
        let aspect = d.aspect.get(3, 3).unwrap();
        assert!(aspect > std::f64::consts::PI && aspect < 1.5 * std::f64::consts::PI);
    }

    #[test]
    fn test_border_halo_is_nodata() {
        let dem = plane(6, 6, 0.1, 0.0);
        let d = partial_derivatives(&dem, DerivativeParams::default()).unwrap();
        assert!(d.slope.get(0, 3).unwrap().is_nan());
        assert!(d.dx.get(5, 5).unwrap().is_nan());
        assert!(!d.dx.get(1, 1).unwrap().is_nan());

        let wide = DerivativeParams { window: 5, ..Default::default() };
        let d = partial_derivatives(&dem, wide).unwrap();
        assert!(d.dx.get(1, 1).unwrap().is_nan(), "5x5 window leaves a 2-cell halo");
        assert_relative_eq!(d.dx.get(2, 2).unwrap(), 0.1, epsilon = 1e-10);
    }

    #[test]
    fn test_nodata_spreads_to_window() {
        let mut dem = plane(5, 5, 0.1, 0.1);
        dem.set(2, 2, f64::NAN).unwrap();
        let d = partial_derivatives(&dem, DerivativeParams::default()).unwrap();
        assert!(d.dx.get(1, 1).unwrap().is_nan());
        assert!(d.dy.get(3, 3).unwrap().is_nan());
    }

    #[test]
    fn test_bowl_divergence_positive() {
        let mut dem = Raster::new(5, 5);
        for row in 0..5 {
            for col in 0..5 {
                let (x, y) = (col as f64 - 2.0, row as f64 - 2.0);
                dem.set(row, col, x * x + y * y).unwrap();
            }
        }
        let d = partial_derivatives(&dem, DerivativeParams::default()).unwrap();
        let div = d.dxx.get(2, 2).unwrap() + d.dyy.get(2, 2).unwrap();
        assert_relative_eq!(div, 4.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rejects_even_window() {
        let dem = plane(5, 5, 0.0, 0.0);
        let params = DerivativeParams { window: 4, ..Default::default() };
        assert!(PartialDerivatives.execute(dem, params).is_err());
    }
}
