//! Flow accumulation
//!
//! Routes a per-cell quantity down the D8 network. With unit weights the
//! result is the upstream cell count; with rainfall-excess weights it is the
//! discharge reaching each cell.

use super::flow_direction::{downstream, flow_direction, NO_FLOW_DATA};
use ndarray::Array2;
use terraflux_core::raster::Raster;
use terraflux_core::{Algorithm, Error, Result};

/// Flow accumulation algorithm
#[derive(Debug, Clone, Default)]
pub struct FlowAccumulation;

impl Algorithm for FlowAccumulation {
    type Input = Raster<u8>;
    type Output = Raster<f64>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Accumulation"
    }

    fn description(&self) -> &'static str {
        "Calculate upstream contributing cell count from D8 flow direction"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        flow_accumulation(&input)
    }
}

/// Number of upstream cells draining into each cell.
///
/// Headwater cells have accumulation 0; NoData directions give NaN.
pub fn flow_accumulation(flow_dir: &Raster<u8>) -> Result<Raster<f64>> {
    let ones = flow_dir.with_same_meta::<f64>(flow_dir.rows(), flow_dir.cols());
    let ones = ones.with_data(Array2::from_elem(flow_dir.shape(), 1.0))?;
    let total = weighted_flow_accumulation(flow_dir, &ones)?;
    crate::algebra::map(&total, |v| v - 1.0)
}

/// Accumulate `weight` downstream: each cell receives its own weight plus
/// everything that drains into it.
///
/// NoData weights contribute nothing; cells with NoData direction or weight
/// come out as NaN.
///
/// # Algorithm
/// 1. Count incoming flows for each cell (in-degree)
/// 2. Start from cells with in-degree 0 (headwaters)
/// 3. Propagate downstream in topological order
pub fn weighted_flow_accumulation(flow_dir: &Raster<u8>, weight: &Raster<f64>) -> Result<Raster<f64>> {
    if flow_dir.shape() != weight.shape() {
        return Err(Error::SizeMismatch {
            er: flow_dir.rows(),
            ec: flow_dir.cols(),
            ar: weight.rows(),
            ac: weight.cols(),
        });
    }

    let (rows, cols) = flow_dir.shape();

    let mut in_degree = Array2::<u32>::zeros((rows, cols));
    let mut accumulation = Array2::<f64>::zeros((rows, cols));

    for row in 0..rows {
        for col in 0..cols {
            let w = unsafe { weight.get_unchecked(row, col) };
            if !weight.is_nodata(w) {
                accumulation[(row, col)] = w;
            }
            let dir = unsafe { flow_dir.get_unchecked(row, col) };
            if let Some(next) = downstream(dir, row, col, rows, cols) {
                in_degree[next] += 1;
            }
        }
    }

    let mut queue: Vec<(usize, usize)> = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            if in_degree[(row, col)] == 0 {
                queue.push((row, col));
            }
        }
    }

    while let Some((row, col)) = queue.pop() {
        let dir = unsafe { flow_dir.get_unchecked(row, col) };
        let Some(next) = downstream(dir, row, col, rows, cols) else {
            continue;
        };

        accumulation[next] += accumulation[(row, col)];
        in_degree[next] = in_degree[next].saturating_sub(1);
        if in_degree[next] == 0 {
            queue.push(next);
        }
    }

    for ((row, col), acc) in accumulation.indexed_iter_mut() {
        let dir = unsafe { flow_dir.get_unchecked(row, col) };
        let w = unsafe { weight.get_unchecked(row, col) };
        if dir == NO_FLOW_DATA || weight.is_nodata(w) {
            *acc = f64::NAN;
        }
    }

    let mut output = flow_dir.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = accumulation;
    Ok(output)
}

/// Upslope contributing area per unit contour width (m²/m).
///
/// Each cell counts itself, so a headwater cell has one cell width of
/// contributing length.
pub fn upslope_area(dem: &Raster<f64>) -> Result<Raster<f64>> {
    let fdir = flow_direction(dem)?;
    let cell_size = dem.cell_size();
    let weight = crate::algebra::map(dem, |_| cell_size)?;
    weighted_flow_accumulation(&fdir, &weight)
}
