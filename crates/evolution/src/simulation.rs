//! Simulation loop
//!
//! Drives one run through `Initializing → Stepping → Finalizing → Done`.
//! Initializing validates the configuration, resolves coefficients, picks
//! the physical model and runs the first step. Each later step starts from
//! the previous evolved elevation, with the water retained by the previous
//! step added to the rainfall. Steps never overlap: step `i + 1` reads the
//! full output of step `i`.

use std::time::Instant;

use chrono::{NaiveDateTime, TimeDelta};
use ndarray::Zip;
use terraflux_algorithms::algebra::{self, BinaryOp};
use terraflux_core::{AnalysisRegion, Raster};
use tracing::{debug, info, warn};

use crate::backend::{HydrologySimulator, SedimentSimulator, SteadyStateSediment, SteadyStateWater};
use crate::config::{CoefficientFields, Coefficients, Mode, SimulationParameters};
use crate::error::{EvolutionError, Result};
use crate::model::{scaffold, ModelContext, ModelKind, ModelOutput, StepForcing};
use crate::rainfall::{PrecipitationEntry, RainfallDriver, RainfallRecord};
use crate::regime::{RegimeClassifier, RegimeDecision, RegimeInput};
use crate::registry::{SeriesName, TemporalRegistry};

/// Source of the rainfall forcing
#[derive(Debug, Clone, PartialEq)]
pub enum RunKind {
    /// One storm split into fixed intervals
    Event,
    /// One step per precipitation record
    Series(Vec<PrecipitationEntry>),
}

/// State of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Stepping,
    Finalizing,
    Done,
}

/// Carry-over between steps
#[derive(Debug, Clone)]
pub struct EvolutionState {
    pub elevation: Raster<f64>,
    pub timestamp: NaiveDateTime,
    /// Water depth retained by the last step
    pub depth: Option<Raster<f64>>,
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub final_elevation: Raster<f64>,
    pub final_timestamp: NaiveDateTime,
    /// Initial elevation minus final elevation
    pub net_difference: Raster<f64>,
    pub steps: usize,
    pub model: ModelKind,
    /// Set when the model was chosen by the regime classifier
    pub regime: Option<RegimeDecision>,
    /// NoData cells left in the final elevation
    pub missing_cells: usize,
}

/// Add the water retained by the previous step to the nominal rainfall:
/// `i + depth / 1000 · interval / 60`.
///
/// NoData depth cells add nothing.
pub fn excess_rainfall(
    intensity: &Raster<f64>,
    depth: Option<&Raster<f64>>,
    interval_minutes: f64,
) -> Result<Raster<f64>> {
    let mut out = intensity.clone();
    let Some(depth) = depth else {
        return Ok(out);
    };
    if depth.shape() != intensity.shape() {
        return Err(terraflux_core::Error::SizeMismatch {
            er: intensity.rows(),
            ec: intensity.cols(),
            ar: depth.rows(),
            ac: depth.cols(),
        }
        .into());
    }

    let hours = interval_minutes / 60.0;
    Zip::from(out.data_mut())
        .and(depth.data())
        .for_each(|rain, &d| {
            if !depth.is_nodata(d) {
                *rain += d / 1000.0 * hours;
            }
        });
    Ok(out)
}

/// A configured simulation run.
///
/// ```no_run
/// use terraflux_core::{GeoTransform, Raster};
/// use terraflux_evolution::{InMemoryRegistry, RunKind, Simulation, SimulationParameters};
///
/// let mut dem = Raster::filled(10, 10, 100.0);
/// dem.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));
///
/// let mut registry = InMemoryRegistry::new();
/// let summary = Simulation::new(SimulationParameters::default())
///     .run(&dem, RunKind::Event, &mut registry)
///     .unwrap();
/// assert_eq!(summary.steps, 6);
/// ```
pub struct Simulation {
    params: SimulationParameters,
    start: Option<NaiveDateTime>,
    fields: CoefficientFields,
    hydrology: Box<dyn HydrologySimulator>,
    sediment: Box<dyn SedimentSimulator>,
    phase: Phase,
}

impl Simulation {
    /// Run with the built-in steady-state backends.
    pub fn new(params: SimulationParameters) -> Self {
        let sediment = SteadyStateSediment {
            derivatives: params.derivative_params(),
        };
        Self {
            params,
            start: None,
            fields: CoefficientFields::default(),
            hydrology: Box::new(SteadyStateWater),
            sediment: Box::new(sediment),
            phase: Phase::Initializing,
        }
    }

    /// Start at `start` instead of the configured start timestamp.
    pub fn with_start(mut self, start: NaiveDateTime) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.params.mode = mode;
        self
    }

    pub fn with_coefficients(mut self, fields: CoefficientFields) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_hydrology(mut self, backend: impl HydrologySimulator + 'static) -> Self {
        self.hydrology = Box::new(backend);
        self
    }

    pub fn with_sediment(mut self, backend: impl SedimentSimulator + 'static) -> Self {
        self.sediment = Box::new(backend);
        self
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run every step and register each output in `registry`.
    ///
    /// On a fatal error the run stops; whatever was registered before stays
    /// the valid partial result.
    ///
    /// In [`Mode::Simwe`] the regime is classified from one extra hydrology
    /// pass over the first record before stepping begins, so the hydrology
    /// backend is called once more than there are steps. The classification
    /// depth is not carried into step 1.
    pub fn run(
        &mut self,
        initial_elevation: &Raster<f64>,
        run_kind: RunKind,
        registry: &mut dyn TemporalRegistry,
    ) -> Result<RunSummary> {
        let Self {
            params,
            start,
            fields,
            hydrology,
            sediment,
            phase,
        } = self;
        let params: &SimulationParameters = params;
        *phase = Phase::Initializing;

        params.validate()?;
        let event = matches!(run_kind, RunKind::Event);
        if event {
            params.validate_event()?;
        }
        let start = match start {
            Some(t) => *t,
            None => params.start_time()?,
        };

        let region = AnalysisRegion::of(initial_elevation)?;
        let initial = algebra::map(initial_elevation, |z| z)?;
        let coefficients = Coefficients::resolve(params, fields.clone(), &region)?;
        let interval = params.interval();

        let mut driver = match &run_kind {
            RunKind::Event => {
                RainfallDriver::event(start, params.rain_intensity, params.duration(), interval)?
            }
            RunKind::Series(entries) => {
                RainfallDriver::series(entries, params.series_interval, interval)?
            }
        };
        let Some(first) = driver.next() else {
            return Err(EvolutionError::config("rainfall", "no rainfall records"));
        };
        info!(
            rows = region.rows(),
            cols = region.cols(),
            steps = driver.remaining() + 1,
            %start,
            mode = ?params.mode,
            "initializing simulation"
        );

        let mut ctx = ModelContext {
            region: &region,
            params,
            coefficients: &coefficients,
            hydrology: &mut **hydrology,
            sediment: &mut **sediment,
        };

        let (model, regime) = match params.mode {
            Mode::Simwe => {
                let forcing = StepForcing {
                    start: first.timestamp,
                    interval: first.interval,
                    intensity: base_intensity(&ctx, event, &first),
                };
                let decision = classify(&mut ctx, &initial, &forcing)?;
                (decision.regime.model(), Some(decision))
            }
            Mode::ErosionDeposition => (ModelKind::ErosionDeposition, None),
            Mode::DetachmentFlux => (ModelKind::DetachmentFlux, None),
            Mode::Usped => (ModelKind::Usped, None),
            Mode::Rusle => (ModelKind::Rusle, None),
        };
        info!(%model, "selected physical model");

        if params.register_initial_elevation {
            registry.register(SeriesName::Elevation, &initial, start, interval)?;
        }

        let limit = params.step_timeout();
        let mut state = EvolutionState {
            elevation: initial.clone(),
            timestamp: start,
            depth: None,
        };
        let mut steps = 0usize;
        let mut missing_cells = 0usize;
        let mut next = Some(first);

        while let Some(record) = next.take() {
            steps += 1;
            if record.timestamp != state.timestamp {
                warn!(
                    step = steps,
                    expected = %state.timestamp,
                    record = %record.timestamp,
                    "rainfall record does not start where the previous step ended"
                );
            }

            let wrap = |source: EvolutionError| EvolutionError::StepFailed {
                step: steps,
                timestamp: record.timestamp,
                mode: model,
                source: Box::new(source),
            };

            let began = Instant::now();
            let output = step(&mut ctx, model, event, &state, &record).map_err(wrap)?;
            let elapsed = began.elapsed();
            if let Some(limit) = limit {
                if elapsed > limit {
                    return Err(EvolutionError::StepTimeout {
                        step: steps,
                        timestamp: record.timestamp,
                        elapsed,
                        limit,
                    });
                }
            }

            register(registry, &output, record.interval).map_err(wrap)?;
            info!(
                step = steps,
                timestamp = %output.timestamp,
                %model,
                intensity = record.intensity,
                elapsed_ms = elapsed.as_millis() as u64,
                "registered step"
            );

            missing_cells = output.missing_cells;
            state = EvolutionState {
                elevation: output.evolved_elevation,
                timestamp: output.timestamp,
                depth: output.depth,
            };
            if steps == 1 {
                *phase = Phase::Stepping;
            }
            next = driver.next();
        }

        *phase = Phase::Finalizing;
        let net_difference = algebra::binary(&initial, &state.elevation, BinaryOp::Subtract)?;
        info!(steps, end = %state.timestamp, "simulation finished");
        *phase = Phase::Done;

        Ok(RunSummary {
            final_elevation: state.elevation,
            final_timestamp: state.timestamp,
            net_difference,
            steps,
            model,
            regime,
            missing_cells,
        })
    }
}

/// Run one simulation with explicit start and mode, using the built-in
/// backends.
pub fn run(
    initial_elevation: &Raster<f64>,
    params: &SimulationParameters,
    start_time: NaiveDateTime,
    mode: Mode,
    run_kind: RunKind,
    registry: &mut dyn TemporalRegistry,
) -> Result<RunSummary> {
    Simulation::new(params.clone())
        .with_start(start_time)
        .with_mode(mode)
        .run(initial_elevation, run_kind, registry)
}

/// Nominal intensity field of a record
fn base_intensity(ctx: &ModelContext<'_>, event: bool, record: &RainfallRecord) -> Raster<f64> {
    match (&ctx.coefficients.rain_intensity, event) {
        (Some(field), true) => field.clone(),
        _ => ctx.region.uniform(record.intensity),
    }
}

fn classify(
    ctx: &mut ModelContext<'_>,
    elevation: &Raster<f64>,
    forcing: &StepForcing,
) -> Result<RegimeDecision> {
    let derivs = scaffold::derivatives(ctx.region, elevation, ctx.params.derivative_params())?;
    let depth = scaffold::surface_flow(ctx, elevation, &derivs, forcing)?;
    let c = ctx.coefficients;
    let input = RegimeInput {
        depth: &depth,
        slope: &derivs.slope,
        detachment: &c.detachment,
        transport: &c.transport,
        shearstress: &c.shearstress,
    };
    RegimeClassifier::from_params(ctx.params).classify(&input)
}

fn step(
    ctx: &mut ModelContext<'_>,
    model: ModelKind,
    event: bool,
    state: &EvolutionState,
    record: &RainfallRecord,
) -> Result<ModelOutput> {
    let base = base_intensity(ctx, event, record);
    let intensity = excess_rainfall(
        &base,
        state.depth.as_ref(),
        crate::rainfall::as_minutes(record.interval),
    )?;
    let forcing = StepForcing {
        start: record.timestamp,
        interval: record.interval,
        intensity,
    };
    debug!(start = %forcing.start, minutes = forcing.minutes(), "forcing ready");
    model.run(ctx, &state.elevation, &forcing)
}

fn register(
    registry: &mut dyn TemporalRegistry,
    output: &ModelOutput,
    interval: TimeDelta,
) -> Result<()> {
    let ts = output.timestamp;
    registry.register(SeriesName::Elevation, &output.evolved_elevation, ts, interval)?;
    if let Some(depth) = &output.depth {
        registry.register(SeriesName::Depth, depth, ts, interval)?;
    }
    registry.register(SeriesName::ErosionDeposition, &output.erosion_deposition, ts, interval)?;
    registry.register(SeriesName::Flux, &output.flux, ts, interval)?;
    registry.register(SeriesName::Difference, &output.difference, ts, interval)?;
    Ok(())
}
