//! Fatal errors stop the run and leave the registered prefix intact

use chrono::TimeDelta;
use terraflux_core::{GeoTransform, Raster};
use terraflux_evolution::backend::{HydrologyInput, SteadyStateWater};
use terraflux_evolution::prelude::*;
use terraflux_evolution::{parse_precipitation, parse_timestamp, Phase};

fn slope(rows: usize, cols: usize) -> Raster<f64> {
    let mut r = Raster::new(rows, cols);
    r.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
    r.set_nodata(Some(f64::NAN));
    for ((row, col), v) in r.data_mut().indexed_iter_mut() {
        *v = 40.0 - 0.3 * row as f64 - 0.1 * col as f64;
    }
    r
}

/// Delegates to the steady-state solver and fails on the `fail_at`-th call
struct FlakyWater {
    calls: usize,
    fail_at: usize,
    inner: SteadyStateWater,
}

impl HydrologySimulator for FlakyWater {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn simulate(&mut self, input: &HydrologyInput<'_>) -> Result<Raster<f64>> {
        self.calls += 1;
        if self.calls == self.fail_at {
            return Err(EvolutionError::Backend {
                backend: "flaky",
                reason: "solver diverged".into(),
            });
        }
        self.inner.simulate(input)
    }
}

/// Returns a depth grid of the wrong size
struct MisfitWater;

impl HydrologySimulator for MisfitWater {
    fn name(&self) -> &'static str {
        "misfit"
    }

    fn simulate(&mut self, _input: &HydrologyInput<'_>) -> Result<Raster<f64>> {
        Ok(Raster::filled(2, 2, 0.01))
    }
}

#[test]
fn backend_failure_aborts_with_step_context() {
    let params = SimulationParameters {
        mode: Mode::ErosionDeposition,
        ..Default::default()
    };
    let mut registry = InMemoryRegistry::new();
    let mut sim = Simulation::new(params.clone()).with_hydrology(FlakyWater {
        calls: 0,
        fail_at: 3,
        inner: SteadyStateWater,
    });

    let err = sim.run(&slope(8, 8), RunKind::Event, &mut registry).unwrap_err();
    match &err {
        EvolutionError::StepFailed {
            step,
            timestamp,
            mode,
            ..
        } => {
            assert_eq!(*step, 3);
            assert_eq!(*mode, ModelKind::ErosionDeposition);
            assert_eq!(
                *timestamp,
                params.start_time().unwrap() + TimeDelta::minutes(20)
            );
        }
        other => panic!("unexpected error {other}"),
    }
    assert!(matches!(err.root_cause(), EvolutionError::Backend { .. }));
    let message = err.to_string();
    assert!(message.contains("step 3") && message.contains("erosion-deposition"), "{message}");

    // The two completed steps stay registered, nothing after them
    assert_eq!(registry.entries(SeriesName::Elevation).len(), 2);
    assert_eq!(registry.entries(SeriesName::Difference).len(), 2);
    assert_ne!(sim.phase(), Phase::Done);
}

#[test]
fn wrong_sized_backend_output_is_fatal() {
    let params = SimulationParameters {
        mode: Mode::DetachmentFlux,
        ..Default::default()
    };
    let mut registry = InMemoryRegistry::new();
    let err = Simulation::new(params)
        .with_hydrology(MisfitWater)
        .run(&slope(6, 6), RunKind::Event, &mut registry)
        .unwrap_err();

    assert!(matches!(err, EvolutionError::StepFailed { step: 1, .. }));
    assert!(matches!(err.root_cause(), EvolutionError::Grid(_)));
    assert!(registry.is_empty());
}

#[test]
fn out_of_order_registration_is_fatal() {
    let mut registry = InMemoryRegistry::new();
    let later = parse_timestamp("2030-01-01 00:00:00").unwrap();
    registry
        .register(SeriesName::Elevation, &slope(6, 6), later, TimeDelta::minutes(10))
        .unwrap();

    let params = SimulationParameters {
        mode: Mode::Usped,
        ..Default::default()
    };
    let err = Simulation::new(params)
        .run(&slope(6, 6), RunKind::Event, &mut registry)
        .unwrap_err();

    assert!(matches!(err, EvolutionError::StepFailed { step: 1, .. }));
    assert!(matches!(err.root_cause(), EvolutionError::TimeOrdering { .. }));
    assert_eq!(registry.entries(SeriesName::Elevation).len(), 1);
}

#[test]
fn unordered_precipitation_log_is_rejected_before_stepping() {
    let records = parse_precipitation(
        "2016-01-01 00:10:00,5\n2016-01-01 00:05:00,5",
    )
    .unwrap();
    let mut registry = InMemoryRegistry::new();
    let err = Simulation::new(SimulationParameters::default())
        .run(&slope(6, 6), RunKind::Series(records), &mut registry)
        .unwrap_err();

    assert!(matches!(err, EvolutionError::TimeOrdering { .. }));
    assert!(registry.is_empty());
}

#[test]
fn configuration_errors_run_no_steps() {
    let cases = [
        SimulationParameters {
            rain_interval: 0.0,
            ..Default::default()
        },
        SimulationParameters {
            start: "06/10/2015".into(),
            ..Default::default()
        },
        SimulationParameters {
            rain_duration: 5.0,
            ..Default::default()
        },
        SimulationParameters {
            flux_min: 4.0,
            ..Default::default()
        },
    ];

    for params in cases {
        let mut registry = InMemoryRegistry::new();
        let err = Simulation::new(params.clone())
            .run(&slope(5, 5), RunKind::Event, &mut registry)
            .unwrap_err();
        assert!(
            matches!(err, EvolutionError::Config { .. } | EvolutionError::Timestamp { .. }),
            "{params:?} gave {err}"
        );
        assert!(registry.is_empty());
    }
}

#[test]
fn coefficient_field_on_another_grid_is_a_configuration_error() {
    let fields = CoefficientFields {
        runoff: Some(Raster::filled(3, 3, 0.5)),
        ..Default::default()
    };
    let mut registry = InMemoryRegistry::new();
    let err = Simulation::new(SimulationParameters::default())
        .with_coefficients(fields)
        .run(&slope(5, 5), RunKind::Event, &mut registry)
        .unwrap_err();
    assert!(matches!(err, EvolutionError::Config { .. }));
}

#[test]
fn step_over_time_limit_stops_the_run() {
    let params = SimulationParameters {
        mode: Mode::ErosionDeposition,
        step_timeout_secs: Some(1e-9),
        ..Default::default()
    };
    let mut registry = InMemoryRegistry::new();
    let err = Simulation::new(params)
        .run(&slope(6, 6), RunKind::Event, &mut registry)
        .unwrap_err();

    assert!(matches!(err, EvolutionError::StepTimeout { step: 1, .. }));
    assert!(registry.is_empty());
}

#[test]
fn storm_ending_past_the_calendar_is_a_configuration_error() {
    let params = SimulationParameters {
        rain_interval: 1e13,
        rain_duration: 1e13,
        ..Default::default()
    };
    let mut registry = InMemoryRegistry::new();
    let mut sim = Simulation::new(params);
    let err = sim.run(&slope(5, 5), RunKind::Event, &mut registry).unwrap_err();

    assert!(matches!(err, EvolutionError::Config { .. }));
    assert_eq!(sim.phase(), Phase::Initializing);
    assert!(registry.is_empty());

    let start = parse_timestamp("2016-01-01 00:00:00").unwrap();
    let log = parse_precipitation("2016-01-01 00:00:00,10").unwrap();
    let params = SimulationParameters {
        rain_interval: 1e13,
        ..Default::default()
    };
    let err = terraflux_evolution::run(
        &slope(5, 5),
        &params,
        start,
        Mode::ErosionDeposition,
        RunKind::Series(log),
        &mut registry,
    )
    .unwrap_err();
    assert!(matches!(err, EvolutionError::Config { .. }));
}
