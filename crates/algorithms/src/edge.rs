//! Edge correction for moving-window operators
//!
//! Derivative operators leave a NoData halo at the grid border and around
//! interior holes. The helpers here grow valid values outward by nearest
//! value extrapolation before such operators run, move fields onto and off
//! a temporarily expanded region, and patch the final field from a fallback.
//!
//! Growing propagates the nearest seed cell through the grid with a
//! priority queue ordered by Euclidean distance, the same visiting scheme
//! Priority-Flood uses for elevations (Barnes et al. 2014).

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ndarray::Array2;
use terraflux_core::raster::{d8, Raster};
use terraflux_core::{Algorithm, Error, HaloScope, Result};
use tracing::{debug, warn};

/// A candidate assignment in the growth queue, ordered by distance to its seed.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist2: i64,
    row: usize,
    col: usize,
    seed_row: usize,
    seed_col: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reverse ordering so BinaryHeap (max-heap) pops the nearest candidate;
// ties resolve by position to keep the result deterministic.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist2
            .cmp(&self.dist2)
            .then_with(|| (other.row, other.col).cmp(&(self.row, self.col)))
            .then_with(|| (other.seed_row, other.seed_col).cmp(&(self.seed_row, self.seed_col)))
    }
}

/// Nearest-value growing algorithm
#[derive(Debug, Clone, Default)]
pub struct Grow;

impl Algorithm for Grow {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Grow"
    }

    fn description(&self) -> &'static str {
        "Fill NoData cells with the value of the nearest valid cell"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        grow(&input)
    }
}

/// Replace every NoData cell with the value of its nearest valid cell.
///
/// The result has no NoData anywhere on the grid. Fails only when the field
/// has no valid cell to grow from.
pub fn grow(field: &Raster<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = field.shape();
    let mut output = Array2::<f64>::from_elem((rows, cols), f64::NAN);
    let mut done = Array2::<bool>::from_elem((rows, cols), false);
    let mut heap = BinaryHeap::new();
    let mut missing = 0usize;

    for ((row, col), &v) in field.data().indexed_iter() {
        if field.is_nodata(v) {
            missing += 1;
            continue;
        }
        output[(row, col)] = v;
        done[(row, col)] = true;
        heap.push(Candidate {
            dist2: 0,
            row,
            col,
            seed_row: row,
            seed_col: col,
        });
    }

    if missing == 0 {
        let mut result = field.clone();
        result.set_nodata(Some(f64::NAN));
        return Ok(result);
    }
    if heap.is_empty() {
        return Err(Error::Algorithm("cannot grow a field without valid cells".into()));
    }

    while let Some(cand) = heap.pop() {
        if cand.dist2 > 0 {
            if done[(cand.row, cand.col)] {
                continue;
            }
            done[(cand.row, cand.col)] = true;
            output[(cand.row, cand.col)] = output[(cand.seed_row, cand.seed_col)];
        }

        for &(dr, dc) in &d8::OFFSETS[1..] {
            let nr = cand.row as isize + dr;
            let nc = cand.col as isize + dc;
            if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
                continue;
            }
            let (nr, nc) = (nr as usize, nc as usize);
            if done[(nr, nc)] {
                continue;
            }
            let dy = nr as i64 - cand.seed_row as i64;
            let dx = nc as i64 - cand.seed_col as i64;
            heap.push(Candidate {
                dist2: dx * dx + dy * dy,
                row: nr,
                col: nc,
                seed_row: cand.seed_row,
                seed_col: cand.seed_col,
            });
        }
    }

    debug!(filled = missing, "grew field over NoData cells");

    let mut result = field.with_same_meta::<f64>(rows, cols);
    result.set_nodata(Some(f64::NAN));
    *result.data_mut() = output;
    Ok(result)
}

/// Move `field` onto the expanded region of `halo` and grow it over the
/// new border, so a moving-window operator sees valid data up to the
/// original edge.
pub fn expand(field: &Raster<f64>, halo: &HaloScope<'_>) -> Result<Raster<f64>> {
    let padded = halo.pad(field)?;
    grow(&padded)
}

/// Cut a field computed on the expanded region back to the original extent.
pub fn restore(field: &Raster<f64>, halo: &HaloScope<'_>) -> Result<Raster<f64>> {
    halo.crop(field)
}

/// Result of [`patch`]
#[derive(Debug, Clone)]
pub struct Patched {
    pub field: Raster<f64>,
    /// Cells NoData in both the updated field and the fallback
    pub missing_cells: usize,
}

/// Fill NoData cells of `updated` from `fallback`.
///
/// Cells missing in both stay NoData and are counted; they are never
/// replaced by an arbitrary number.
pub fn patch(updated: &Raster<f64>, fallback: &Raster<f64>) -> Result<Patched> {
    crate::algebra::ensure_same_shape(updated, fallback)?;
    let (rows, cols) = updated.shape();

    let mut missing_cells = 0usize;
    let mut patched_cells = 0usize;
    let mut data = Array2::<f64>::from_elem((rows, cols), f64::NAN);

    for ((row, col), out) in data.indexed_iter_mut() {
        let u = unsafe { updated.get_unchecked(row, col) };
        if !updated.is_nodata(u) {
            *out = u;
            continue;
        }
        let f = unsafe { fallback.get_unchecked(row, col) };
        if fallback.is_nodata(f) {
            missing_cells += 1;
        } else {
            *out = f;
            patched_cells += 1;
        }
    }

    if patched_cells > 0 {
        debug!(patched_cells, "patched NoData cells from fallback");
    }
    if missing_cells > 0 {
        warn!(missing_cells, "cells remain NoData after patching");
    }

    let mut field = updated.with_same_meta::<f64>(rows, cols);
    field.set_nodata(Some(f64::NAN));
    *field.data_mut() = data;
    Ok(Patched { field, missing_cells })
}
