//! Steps shared by every physical model

use ndarray::Zip;
use terraflux_algorithms::algebra::{self, BinaryOp};
use terraflux_algorithms::edge::{self, Patched};
use terraflux_algorithms::statistics::focal_mean;
use terraflux_algorithms::terrain::{partial_derivatives, DerivativeParams, TerrainDerivatives};
use terraflux_core::{AnalysisRegion, Raster};
use tracing::debug;

use super::{ModelContext, ModelOutput, StepForcing};
use crate::backend::HydrologyInput;
use crate::error::Result;

/// Derivative fields of `surface` over the whole region.
///
/// The surface is grown over a halo before the moving window runs, the
/// fields are cut back to the region and grown again so no cell is NoData.
pub(crate) fn derivatives(
    region: &AnalysisRegion,
    surface: &Raster<f64>,
    params: DerivativeParams,
) -> Result<TerrainDerivatives> {
    let halo = region.expand(params.halo());
    let grown = edge::expand(surface, &halo)?;
    let d = partial_derivatives(&grown, params)?;

    let settle = |field: &Raster<f64>| -> Result<Raster<f64>> {
        Ok(edge::grow(&edge::restore(field, &halo)?)?)
    };

    Ok(TerrainDerivatives {
        slope: settle(&d.slope)?,
        aspect: settle(&d.aspect)?,
        dx: settle(&d.dx)?,
        dy: settle(&d.dy)?,
        dxx: settle(&d.dxx)?,
        dyy: settle(&d.dyy)?,
        dxy: settle(&d.dxy)?,
    })
}

/// ∂qx/∂x + ∂qy/∂y, NoData where either component is NoData.
pub(crate) fn divergence(
    region: &AnalysisRegion,
    params: DerivativeParams,
    qx: &Raster<f64>,
    qy: &Raster<f64>,
) -> Result<Raster<f64>> {
    let halo = region.expand(params.halo());
    let dqx = partial_derivatives(&edge::expand(qx, &halo)?, params)?;
    let dqy = partial_derivatives(&edge::expand(qy, &halo)?, params)?;
    let ddx = edge::restore(&dqx.dx, &halo)?;
    let ddy = edge::restore(&dqy.dy, &halo)?;
    drop(halo);

    let sum = algebra::binary(&ddx, &ddy, BinaryOp::Add)?;
    let mask = algebra::binary(qx, qy, BinaryOp::Add)?;
    Ok(algebra::zip(&sum, &mask, |d, _| d)?)
}

/// Cell-wise `f(a, b, c)`; NoData if any input is NoData.
pub(crate) fn combine3<F>(
    a: &Raster<f64>,
    b: &Raster<f64>,
    c: &Raster<f64>,
    f: F,
) -> Result<Raster<f64>>
where
    F: Fn(f64, f64, f64) -> f64,
{
    for other in [b, c] {
        if other.shape() != a.shape() {
            return Err(terraflux_core::Error::SizeMismatch {
                er: a.rows(),
                ec: a.cols(),
                ar: other.rows(),
                ac: other.cols(),
            }
            .into());
        }
    }

    let mut out = a.like(f64::NAN);
    out.set_nodata(Some(f64::NAN));
    Zip::from(out.data_mut())
        .and(a.data())
        .and(b.data())
        .and(c.data())
        .for_each(|o, &x, &y, &z| {
            if !(a.is_nodata(x) || b.is_nodata(y) || c.is_nodata(z)) {
                *o = f(x, y, z);
            }
        });
    Ok(out)
}

/// Run the hydrology backend on the rainfall excess of this step.
pub(crate) fn surface_flow(
    ctx: &mut ModelContext<'_>,
    elevation: &Raster<f64>,
    derivs: &TerrainDerivatives,
    forcing: &StepForcing,
) -> Result<Raster<f64>> {
    let rain = algebra::binary(&forcing.intensity, &ctx.coefficients.runoff, BinaryOp::Multiply)?;
    let input = HydrologyInput {
        elevation,
        dx: &derivs.dx,
        dy: &derivs.dy,
        rain: &rain,
        mannings: &ctx.coefficients.mannings,
        walkers: ctx.params.walkers,
        duration: forcing.interval,
    };
    let depth = ctx.hydrology.simulate(&input)?;
    ctx.region.ensure_matches(&depth)?;
    debug!(backend = ctx.hydrology.name(), "simulated water depth");
    Ok(depth)
}

/// `elevation + sign · seconds · rate / scale`
pub(crate) fn update(
    elevation: &Raster<f64>,
    rate: &Raster<f64>,
    scale: &Raster<f64>,
    seconds: f64,
    sign: f64,
) -> Result<Raster<f64>> {
    combine3(elevation, rate, scale, |z, r, s| z + sign * seconds * r / s)
}

/// Smooth `evolved`, then apply the gravitational diffusion correction
/// `z − t/ρ · κ · (∂²z/∂x² + ∂²z/∂y²)` on the smoothed surface.
pub(crate) fn stabilize(
    ctx: &ModelContext<'_>,
    evolved: &Raster<f64>,
    seconds: f64,
) -> Result<Raster<f64>> {
    let params = ctx.params;
    let smoothed = if params.smoothing > 1 {
        focal_mean(evolved, params.smoothing)?
    } else {
        evolved.clone()
    };

    let kappa = params.grav_diffusion;
    if kappa == 0.0 {
        return Ok(smoothed);
    }

    let curvature = derivatives(ctx.region, &smoothed, params.derivative_params())?;
    let laplacian = algebra::binary(&curvature.dxx, &curvature.dyy, BinaryOp::Add)?;
    debug!(smoothing = params.smoothing, kappa, "stabilized evolved elevation");
    combine3(
        &smoothed,
        &laplacian,
        &ctx.coefficients.density,
        |z, div, rho| z - seconds / rho * kappa * div,
    )
}

/// Stabilize, patch from the previous elevation and assemble the output.
pub(crate) fn finish(
    ctx: &ModelContext<'_>,
    elevation: &Raster<f64>,
    forcing: &StepForcing,
    evolved: Raster<f64>,
    depth: Option<Raster<f64>>,
    erosion_deposition: Raster<f64>,
    flux: Raster<f64>,
) -> Result<ModelOutput> {
    let stabilized = stabilize(ctx, &evolved, forcing.seconds())?;
    let Patched {
        field: evolved_elevation,
        missing_cells,
    } = edge::patch(&stabilized, elevation)?;
    let difference = algebra::binary(elevation, &evolved_elevation, BinaryOp::Subtract)?;

    Ok(ModelOutput {
        evolved_elevation,
        depth,
        erosion_deposition,
        flux,
        difference,
        timestamp: forcing.end()?,
        missing_cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use terraflux_core::GeoTransform;

    fn region() -> AnalysisRegion {
        AnalysisRegion::new(6, 6, GeoTransform::new(0.0, 6.0, 1.0, -1.0)).unwrap()
    }

    #[test]
    fn test_derivatives_cover_region() {
        let region = region();
        let mut dem = region.uniform(0.0);
        for ((r, c), v) in dem.data_mut().indexed_iter_mut() {
            *v = 50.0 + r as f64 * 0.5 - c as f64 * 0.25;
        }
        let d = derivatives(&region, &dem, DerivativeParams::default()).unwrap();
        assert_eq!(d.dx.nodata_count(), 0);
        assert_eq!(d.dxx.nodata_count(), 0);
        assert_relative_eq!(d.dx.get(3, 3).unwrap(), -0.25, epsilon = 1e-9);
        assert_relative_eq!(d.dy.get(3, 3).unwrap(), -0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_divergence_of_linear_field() {
        let region = region();
        let mut qx = region.uniform(0.0);
        for ((_, c), v) in qx.data_mut().indexed_iter_mut() {
            *v = 2.0 * c as f64;
        }
        let qy = region.uniform(1.0);
        let div = divergence(&region, DerivativeParams::default(), &qx, &qy).unwrap();
        assert_relative_eq!(div.get(2, 2).unwrap(), 2.0, epsilon = 1e-9);
        // Grown border flattens the field at the edge
        assert!(div.get(2, 0).unwrap() < 2.0);
    }

    #[test]
    fn test_combine3_propagates_nodata() {
        let region = region();
        let a = region.uniform(1.0);
        let mut b = region.uniform(2.0);
        b.set(1, 1, f64::NAN).unwrap();
        let c = region.uniform(4.0);
        let out = combine3(&a, &b, &c, |x, y, z| x + y * z).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 9.0);
        assert!(out.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn test_update_sign() {
        let region = region();
        let z = region.uniform(10.0);
        let rate = region.uniform(0.7);
        let rho = region.uniform(1400.0);
        let up = update(&z, &rate, &rho, 600.0, 1.0).unwrap();
        let down = update(&z, &rate, &rho, 600.0, -1.0).unwrap();
        assert_relative_eq!(up.get(0, 0).unwrap(), 10.3, epsilon = 1e-12);
        assert_relative_eq!(down.get(0, 0).unwrap(), 9.7, epsilon = 1e-12);
    }
}
