//! USPED and RUSLE3D
//!
//! Transport capacity from the event erosivity and a topographic factor,
//! decomposed along the aspect; erosion-deposition is the negative
//! divergence of that vector field.
//!
//! ```text
//! e  = 0.29 · (1 − 0.72 · exp(−0.05 · i))     MJ/ha·mm
//! R  = e · (i · t/60) · i / (t · 60)          per second of the interval
//! T  = R · K · C · P · LS
//! USPED   LS = U^m · sin(β)^n
//! RUSLE3D LS = (m + 1) · (U / 22.1)^m · (sin(β) / 0.09)^n
//! ```

use terraflux_algorithms::algebra::{clamp, map, zip};
use terraflux_algorithms::hydrology::upslope_area;
use terraflux_core::Raster;
use tracing::debug;

use super::{scaffold, ModelContext, ModelOutput, StepForcing};
use crate::error::Result;

/// Length-slope form used for the transport capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TopographicFactor {
    Usped,
    Rusle,
}

impl TopographicFactor {
    /// LS for upslope area `area` (m²/m) and slope `slope` (radians)
    pub(crate) fn ls(self, area: f64, slope: f64, m: f64, n: f64) -> f64 {
        match self {
            TopographicFactor::Usped => area.powf(m) * slope.sin().powf(n),
            TopographicFactor::Rusle => {
                (m + 1.0) * (area / 22.1).powf(m) * (slope.sin() / 0.09).powf(n)
            }
        }
    }
}

/// Rainfall erosivity of `interval` minutes at `intensity` mm/h, per
/// second of the interval.
pub fn erosivity(intensity: f64, interval: f64) -> f64 {
    let energy = 0.29 * (1.0 - 0.72 * (-0.05 * intensity).exp());
    let volume = intensity * interval / 60.0;
    energy * volume * intensity / (interval * 60.0)
}

pub(super) fn run(
    ctx: &mut ModelContext<'_>,
    elevation: &Raster<f64>,
    forcing: &StepForcing,
    factor: TopographicFactor,
) -> Result<ModelOutput> {
    let params = ctx.params;
    let c = ctx.coefficients;
    let derivs = scaffold::derivatives(ctx.region, elevation, params.derivative_params())?;

    let minutes = forcing.minutes();
    let r = map(&forcing.intensity, |i| erosivity(i, minutes))?;
    let area = upslope_area(elevation)?;
    let (m, n, p) = (params.m, params.n, params.p_factor);
    let ls = zip(&area, &derivs.slope, |u, s| factor.ls(u, s, m, n))?;
    let kc = zip(&c.k_factor, &c.c_factor, |k, cf| k * cf * p)?;

    // ton/ha to kg/m²
    let sediment_flow = scaffold::combine3(&r, &kc, &ls, |r, kc, ls| r * kc * ls * 1000.0 / 10000.0)?;
    let qsx = zip(&sediment_flow, &derivs.aspect, |q, a| q * a.cos())?;
    let qsy = zip(&sediment_flow, &derivs.aspect, |q, a| q * a.sin())?;
    let divergence = scaffold::divergence(ctx.region, params.derivative_params(), &qsx, &qsy)?;
    let raw_erdep = map(&divergence, |d| -d)?;
    debug!(?factor, "transport capacity and divergence");

    let erdep = clamp(&raw_erdep, params.erdep_min, params.erdep_max)?;
    let flux = clamp(&sediment_flow, params.flux_min, params.flux_max)?;
    let evolved = scaffold::update(
        elevation,
        &erdep,
        &c.density,
        forcing.seconds(),
        1.0,
    )?;

    scaffold::finish(ctx, elevation, forcing, evolved, None, erdep, flux)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_erosivity() {
        let i: f64 = 155.0;
        let energy = 0.29 * (1.0 - 0.72 * (-0.05 * i).exp());
        let expected = energy * (i * 10.0 / 60.0) * i / 600.0;
        assert_relative_eq!(erosivity(i, 10.0), expected, epsilon = 1e-12);
        assert_eq!(erosivity(0.0, 10.0), 0.0);
    }

    #[test]
    fn test_topographic_factors() {
        let slope = (0.09f64).asin();
        assert_relative_eq!(
            TopographicFactor::Rusle.ls(22.1, slope, 1.0, 1.0),
            2.0,
            epsilon = 1e-12
        );
        assert_relative_eq!(
            TopographicFactor::Usped.ls(10.0, slope, 1.0, 1.0),
            0.9,
            epsilon = 1e-12
        );
        assert_eq!(TopographicFactor::Usped.ls(10.0, 0.0, 1.0, 1.0), 0.0);
    }
}
