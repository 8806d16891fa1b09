//! Edge correction properties over hand-built grids.
//!
//! For every NoData-free field, growing it onto an expanded region, running
//! a moving-window operator, restoring the extent and patching from the
//! original leaves no NoData cell.

use terraflux_algorithms::algebra::{clamp, zip};
use terraflux_algorithms::edge::{expand, grow, patch, restore};
use terraflux_algorithms::statistics::focal_mean;
use terraflux_algorithms::terrain::{partial_derivatives, DerivativeMethod, DerivativeParams};
use terraflux_core::{AnalysisRegion, GeoTransform, Raster};

fn surfaces() -> Vec<Raster<f64>> {
    let shapes: [(usize, usize); 4] = [(3, 3), (4, 7), (10, 10), (12, 5)];
    let mut out = Vec::new();
    for (i, &(rows, cols)) in shapes.iter().enumerate() {
        let mut dem = Raster::new(rows, cols);
        dem.set_transform(GeoTransform::new(0.0, rows as f64 * 2.0, 2.0, -2.0));
        for row in 0..rows {
            for col in 0..cols {
                let (x, y) = (col as f64, row as f64);
                let z = match i {
                    0 => 100.0,
                    1 => 50.0 + 0.3 * x - 0.7 * y,
                    2 => (x - 4.5).powi(2) + (y - 4.5).powi(2),
                    _ => ((row * 7 + col * 13) % 11) as f64,
                };
                dem.set(row, col, z).unwrap();
            }
        }
        out.push(dem);
    }
    out
}

#[test]
fn restore_then_patch_leaves_no_nodata() {
    for dem in surfaces() {
        let region = AnalysisRegion::of(&dem).unwrap();
        for window in [3, 5] {
            for method in [
                DerivativeMethod::EvansYoung,
                DerivativeMethod::ZevenbergenThorne,
                DerivativeMethod::Horn,
            ] {
                let params = DerivativeParams { method, window };
                let halo = region.expand(params.halo());
                let grown = expand(&dem, &halo).unwrap();
                let d = partial_derivatives(&grown, params).unwrap();
                let divergence = zip(&d.dxx, &d.dyy, |a, b| a + b).unwrap();
                let restored = restore(&divergence, &halo).unwrap();
                drop(halo);

                let processed = zip(&dem, &restored, |z, div| z - 0.01 * div).unwrap();
                let patched = patch(&processed, &dem).unwrap();
                assert_eq!(
                    patched.field.nodata_count(),
                    0,
                    "{:?} window {window} on {:?} left NoData",
                    method,
                    dem.shape()
                );
                assert_eq!(patched.missing_cells, 0);
            }
        }
    }
}

#[test]
fn derivatives_without_expansion_are_recovered_by_grow() {
    for dem in surfaces() {
        let d = partial_derivatives(&dem, DerivativeParams::default()).unwrap();
        if dem.rows() < 3 || dem.cols() < 3 {
            continue;
        }
        let grown = grow(&d.slope).unwrap();
        assert_eq!(grown.nodata_count(), 0);
        assert_eq!(grown.shape(), dem.shape());
    }
}

#[test]
fn smoothing_and_clamp_keep_coverage() {
    for dem in surfaces() {
        let smoothed = focal_mean(&dem, 3).unwrap();
        let clamped = clamp(&smoothed, 0.0, 60.0).unwrap();
        assert_eq!(clamped.nodata_count(), 0);
        assert!(clamped.data().iter().all(|v| (0.0..=60.0).contains(v)));
    }
}
