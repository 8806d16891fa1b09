//! D8 flow direction
//!
//! Each cell drains to its steepest downslope neighbor.
//!
//! ```text
//!   4  3  2
//!   5  0  1
//!   6  7  8
//! ```
//! 0 = pit or flat (no outflow), 1-8 = direction to steepest neighbor,
//! [`NO_FLOW_DATA`] = NoData elevation.

use crate::maybe_rayon::*;
use terraflux_core::raster::{d8, Raster};
use terraflux_core::{Algorithm, Error, Result};

/// Flow direction code written where the elevation is NoData
pub const NO_FLOW_DATA: u8 = 255;

/// Flow direction algorithm (D8)
#[derive(Debug, Clone, Default)]
pub struct FlowDirection;

impl Algorithm for FlowDirection {
    type Input = Raster<f64>;
    type Output = Raster<u8>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Direction (D8)"
    }

    fn description(&self) -> &'static str {
        "Direction of steepest descent towards one of the eight neighbors"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        flow_direction(&input)
    }
}

/// Calculate D8 flow direction from a DEM.
///
/// Neighbors outside the grid or with NoData are ignored, so border cells
/// drain inward or along the edge. Ties keep the first direction in code
/// order.
pub fn flow_direction(dem: &Raster<f64>) -> Result<Raster<u8>> {
    let (rows, cols) = dem.shape();
    let cell_size = dem.cell_size();

    let output_data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u8; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                let center = unsafe { dem.get_unchecked(row, col) };
                if dem.is_nodata(center) {
                    *out = NO_FLOW_DATA;
                    continue;
                }

                let mut max_drop = 0.0_f64;
                let mut best_dir: u8 = 0;

                for dir in 1..=8u8 {
                    let (dr, dc) = d8::OFFSETS[dir as usize];
                    let nr = row as isize + dr;
                    let nc = col as isize + dc;

                    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                        continue;
                    }

                    let neighbor = unsafe { dem.get_unchecked(nr as usize, nc as usize) };
                    if dem.is_nodata(neighbor) {
                        continue;
                    }

                    let distance = d8::DISTANCES[dir as usize] * cell_size;
                    let drop = (center - neighbor) / distance;

                    if drop > max_drop {
                        max_drop = drop;
                        best_dir = dir;
                    }
                }

                *out = best_dir;
            }

            row_data
        })
        .collect();

    let mut output = dem.with_same_meta::<u8>(rows, cols);
    output.set_nodata(Some(NO_FLOW_DATA));
    *output.data_mut() = ndarray::Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

/// Downstream neighbor of `(row, col)` for a direction code, if it lies on the grid.
#[inline]
pub fn downstream(dir: u8, row: usize, col: usize, rows: usize, cols: usize) -> Option<(usize, usize)> {
    if dir == 0 || dir as usize >= d8::OFFSETS.len() {
        return None;
    }
    let (dr, dc) = d8::OFFSETS[dir as usize];
    let nr = row as isize + dr;
    let nc = col as isize + dc;
    if nr < 0 || nc < 0 || nr as usize >= rows || nc as usize >= cols {
        return None;
    }
    Some((nr as usize, nc as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use terraflux_core::GeoTransform;

    fn dem_from(f: impl Fn(usize, usize) -> f64) -> Raster<f64> {
        let mut dem = Raster::new(5, 5);
        dem.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        for row in 0..5 {
            for col in 0..5 {
                dem.set(row, col, f(row, col)).unwrap();
            }
        }
        dem
    }

    #[test]
    fn test_flow_direction_slope_east() {
        let fdir = flow_direction(&dem_from(|_, col| (5 - col) as f64 * 10.0)).unwrap();
        let center = fdir.get(2, 2).unwrap();
        assert_eq!(center, 1, "Expected flow direction E (1), got {}", center);
    }

    #[test]
    fn test_flow_direction_slope_south() {
        let fdir = flow_direction(&dem_from(|row, _| (5 - row) as f64 * 10.0)).unwrap();
        let center = fdir.get(2, 2).unwrap();
        assert_eq!(center, 7, "Expected flow direction S (7), got {}", center);
    }

    #[test]
    fn test_flow_direction_diagonal() {
        let fdir = flow_direction(&dem_from(|row, col| (10 - row - col) as f64 * 10.0)).unwrap();
        let center = fdir.get(2, 2).unwrap();
        assert_eq!(center, 8, "Expected flow direction SE (8), got {}", center);
    }

    #[test]
    fn test_pit_and_nodata() {
        let mut dem = dem_from(|row, col| if (row, col) == (2, 2) { 1.0 } else { 10.0 });
        dem.set(0, 0, f64::NAN).unwrap();
        let fdir = flow_direction(&dem).unwrap();

        assert_eq!(fdir.get(2, 2).unwrap(), 0, "pit has no outflow");
        assert_eq!(fdir.get(0, 0).unwrap(), NO_FLOW_DATA);
        assert!(fdir.is_nodata_at(0, 0).unwrap());
        assert!(!fdir.is_nodata_at(2, 2).unwrap());
    }

    #[test]
    fn test_downstream() {
        assert_eq!(downstream(1, 2, 2, 5, 5), Some((2, 3)));
        assert_eq!(downstream(4, 0, 0, 5, 5), None);
        assert_eq!(downstream(0, 2, 2, 5, 5), None);
        assert_eq!(downstream(NO_FLOW_DATA, 2, 2, 5, 5), None);
    }
}
