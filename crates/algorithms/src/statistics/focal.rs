//! Focal (moving window) statistics
//!
//! Computes a statistic within a moving window centered on each cell.
//! NoData cells inside the window are skipped, so a cell with valid
//! neighbors receives a value even when it is NoData itself.

use crate::maybe_rayon::*;
use terraflux_core::raster::{Neighborhood, Raster};
use terraflux_core::{Algorithm, Error, Result};

/// Available focal statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocalStatistic {
    /// Arithmetic mean
    #[default]
    Mean,
    Min,
    Max,
}

/// Parameters for focal statistics
#[derive(Debug, Clone, Copy)]
pub struct FocalParams {
    /// Window shape
    pub window: Neighborhood,
    /// Statistic to compute
    pub statistic: FocalStatistic,
}

impl Default for FocalParams {
    fn default() -> Self {
        Self {
            window: Neighborhood::Square(1),
            statistic: FocalStatistic::Mean,
        }
    }
}

/// Focal statistics algorithm
#[derive(Debug, Clone, Default)]
pub struct FocalStatistics;

impl Algorithm for FocalStatistics {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = FocalParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Focal Statistics"
    }

    fn description(&self) -> &'static str {
        "Moving-window statistic over valid cells"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        focal_statistics(&input, params)
    }
}

/// Compute focal statistics on a raster.
///
/// A radius of 0 returns the input values unchanged.
pub fn focal_statistics(raster: &Raster<f64>, params: FocalParams) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();
    let offsets = params.window.offsets();

    let output_data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            let mut values: Vec<f64> = Vec::with_capacity(offsets.len());

            for (col, out) in row_data.iter_mut().enumerate() {
                values.clear();

                for &(dr, dc) in &offsets {
                    let nr = row as isize + dr;
                    let nc = col as isize + dc;

                    if nr >= 0 && nc >= 0 && (nr as usize) < rows && (nc as usize) < cols {
                        let v = unsafe { raster.get_unchecked(nr as usize, nc as usize) };
                        if !raster.is_nodata(v) {
                            values.push(v);
                        }
                    }
                }

                if values.is_empty() {
                    continue;
                }

                *out = compute_statistic(&values, params.statistic);
            }

            row_data
        })
        .collect();

    crate::assemble(raster, output_data)
}

/// Moving average over a square window of odd side `size`.
pub fn focal_mean(raster: &Raster<f64>, size: usize) -> Result<Raster<f64>> {
    if size == 0 || size % 2 == 0 {
        return Err(Error::InvalidParameter {
            name: "size",
            value: size.to_string(),
            reason: "neighborhood size must be odd".into(),
        });
    }
    focal_statistics(
        raster,
        FocalParams {
            window: Neighborhood::square_of_size(size),
            statistic: FocalStatistic::Mean,
        },
    )
}

fn compute_statistic(values: &[f64], stat: FocalStatistic) -> f64 {
    match stat {
        FocalStatistic::Mean => values.iter().sum::<f64>() / values.len() as f64,
        FocalStatistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        FocalStatistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}
