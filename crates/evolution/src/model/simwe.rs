//! SIMWE-driven models: water depth and sediment transport come from the
//! backends.

use terraflux_algorithms::algebra::clamp;
use terraflux_algorithms::terrain::TerrainDerivatives;
use terraflux_core::Raster;
use tracing::debug;

use super::{scaffold, ModelContext, ModelOutput, StepForcing};
use crate::backend::{SedimentInput, SedimentOutput};
use crate::error::Result;

fn transport(
    ctx: &mut ModelContext<'_>,
    elevation: &Raster<f64>,
    derivs: &TerrainDerivatives,
    depth: &Raster<f64>,
    forcing: &StepForcing,
) -> Result<SedimentOutput> {
    let c = ctx.coefficients;
    let input = SedimentInput {
        elevation,
        depth,
        dx: &derivs.dx,
        dy: &derivs.dy,
        detachment: &c.detachment,
        transport: &c.transport,
        shearstress: &c.shearstress,
        mannings: &c.mannings,
        walkers: ctx.params.walkers,
        duration: forcing.interval,
    };
    let output = ctx.sediment.simulate(&input)?;
    ctx.region.ensure_matches(&output.erosion_deposition)?;
    ctx.region.ensure_matches(&output.flux)?;
    debug!(backend = ctx.sediment.name(), "simulated sediment transport");
    Ok(output)
}

/// Net erosion-deposition over sediment density.
///
/// Erosion-deposition is positive for deposition, so the surface rises
/// where sediment settles.
pub(super) fn erosion_deposition(
    ctx: &mut ModelContext<'_>,
    elevation: &Raster<f64>,
    forcing: &StepForcing,
) -> Result<ModelOutput> {
    let params = ctx.params;
    let derivs = scaffold::derivatives(ctx.region, elevation, params.derivative_params())?;
    let depth = scaffold::surface_flow(ctx, elevation, &derivs, forcing)?;
    let raw = transport(ctx, elevation, &derivs, &depth, forcing)?;

    let erdep = clamp(&raw.erosion_deposition, params.erdep_min, params.erdep_max)?;
    let flux = clamp(&raw.flux, params.flux_min, params.flux_max)?;
    let evolved = scaffold::update(
        elevation,
        &erdep,
        &ctx.coefficients.density,
        forcing.seconds(),
        1.0,
    )?;

    scaffold::finish(ctx, elevation, forcing, evolved, Some(depth), erdep, flux)
}

/// Detachment-limited lowering: sediment flux over mass per area.
pub(super) fn detachment_flux(
    ctx: &mut ModelContext<'_>,
    elevation: &Raster<f64>,
    forcing: &StepForcing,
) -> Result<ModelOutput> {
    let params = ctx.params;
    let derivs = scaffold::derivatives(ctx.region, elevation, params.derivative_params())?;
    let depth = scaffold::surface_flow(ctx, elevation, &derivs, forcing)?;
    let raw = transport(ctx, elevation, &derivs, &depth, forcing)?;

    let erdep = clamp(&raw.erosion_deposition, params.erdep_min, params.erdep_max)?;
    let flux = clamp(&raw.flux, params.flux_min, params.flux_max)?;
    let evolved = scaffold::update(
        elevation,
        &flux,
        &ctx.coefficients.mass,
        forcing.seconds(),
        -1.0,
    )?;

    scaffold::finish(ctx, elevation, forcing, evolved, Some(depth), erdep, flux)
}
