//! Independent runs side by side
//!
//! Runs share nothing but the read-only initial elevation: each job gets
//! its own [`Simulation`], backends and [`InMemoryRegistry`], so jobs can
//! execute on separate threads. A failing job does not stop the others.

use terraflux_core::Raster;
use tracing::{info, warn};

use crate::config::{CoefficientFields, SimulationParameters};
use crate::error::Result;
use crate::registry::InMemoryRegistry;
use crate::simulation::{RunKind, RunSummary, Simulation};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// How the jobs of a batch are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingMode {
    /// One job after the other
    Sequential,
    /// All jobs on the global thread pool
    #[default]
    Parallel,
    /// All jobs on a dedicated pool with this many threads
    ParallelWith(usize),
}

/// One independent run
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub name: String,
    pub params: SimulationParameters,
    pub coefficients: CoefficientFields,
    pub run_kind: RunKind,
}

impl BatchJob {
    pub fn new(name: impl Into<String>, params: SimulationParameters, run_kind: RunKind) -> Self {
        Self {
            name: name.into(),
            params,
            coefficients: CoefficientFields::default(),
            run_kind,
        }
    }
}

/// Output of a successful job
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub summary: RunSummary,
    pub registry: InMemoryRegistry,
}

/// Outcome of one job, in submission order
#[derive(Debug)]
pub struct BatchOutcome {
    pub name: String,
    pub result: Result<BatchRun>,
}

fn run_job(initial: &Raster<f64>, job: BatchJob) -> BatchOutcome {
    let mut registry = InMemoryRegistry::new();
    let result = Simulation::new(job.params)
        .with_coefficients(job.coefficients)
        .run(initial, job.run_kind, &mut registry)
        .map(|summary| BatchRun { summary, registry });

    match &result {
        Ok(run) => info!(job = %job.name, steps = run.summary.steps, "batch job finished"),
        Err(e) => warn!(job = %job.name, error = %e, "batch job failed"),
    }
    BatchOutcome {
        name: job.name,
        result,
    }
}

/// Run every job from the same initial elevation.
///
/// Only a failure to set up the thread pool is returned as an error; job
/// failures are reported in their [`BatchOutcome`].
pub fn run_batch(
    initial: &Raster<f64>,
    jobs: Vec<BatchJob>,
    mode: ProcessingMode,
) -> Result<Vec<BatchOutcome>> {
    info!(jobs = jobs.len(), ?mode, "running batch");

    #[cfg(feature = "parallel")]
    {
        match mode {
            ProcessingMode::Sequential => {}
            ProcessingMode::Parallel => {
                return Ok(jobs.into_par_iter().map(|job| run_job(initial, job)).collect());
            }
            ProcessingMode::ParallelWith(threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| crate::error::EvolutionError::backend("thread pool", e.to_string()))?;
                return Ok(pool.install(|| {
                    jobs.into_par_iter().map(|job| run_job(initial, job)).collect()
                }));
            }
        }
    }

    Ok(jobs.into_iter().map(|job| run_job(initial, job)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use terraflux_core::GeoTransform;

    fn hill() -> Raster<f64> {
        let mut dem = Raster::new(8, 8);
        dem.set_transform(GeoTransform::new(0.0, 8.0, 1.0, -1.0));
        dem.set_nodata(Some(f64::NAN));
        for ((r, c), v) in dem.data_mut().indexed_iter_mut() {
            let (dr, dc) = (r as f64 - 3.5, c as f64 - 3.5);
            *v = 20.0 - 0.2 * (dr * dr + dc * dc).sqrt();
        }
        dem
    }

    fn jobs() -> Vec<BatchJob> {
        let short = SimulationParameters {
            rain_duration: 20.0,
            walkers: 1000,
            ..Default::default()
        };
        [Mode::ErosionDeposition, Mode::DetachmentFlux, Mode::Usped]
            .into_iter()
            .map(|mode| {
                BatchJob::new(
                    format!("{mode:?}"),
                    SimulationParameters { mode, ..short.clone() },
                    RunKind::Event,
                )
            })
            .collect()
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let dem = hill();
        let seq = run_batch(&dem, jobs(), ProcessingMode::Sequential).unwrap();
        let par = run_batch(&dem, jobs(), ProcessingMode::ParallelWith(2)).unwrap();

        assert_eq!(seq.len(), 3);
        for (a, b) in seq.iter().zip(&par) {
            assert_eq!(a.name, b.name);
            let (a, b) = (a.result.as_ref().unwrap(), b.result.as_ref().unwrap());
            assert_eq!(a.summary.steps, 2);
            assert_eq!(a.summary.final_elevation.data(), b.summary.final_elevation.data());
        }
    }

    #[test]
    fn test_failed_job_does_not_stop_others() {
        let dem = hill();
        let mut jobs = jobs();
        jobs[1].params.rain_interval = 0.0;

        let out = run_batch(&dem, jobs, ProcessingMode::Parallel).unwrap();
        assert!(out[0].result.is_ok());
        assert!(out[1].result.is_err());
        assert!(out[2].result.is_ok());
    }
}
