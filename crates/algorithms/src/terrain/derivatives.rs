//! Partial derivatives from 3×3 elevation windows
//!
//! ```text
//! 3×3 window indexing:
//!
//!   z1 z2 z3      (NW) (N) (NE)
//!   z4 z5 z6  →   (W)  (C) (E)
//!   z7 z8 z9      (SW) (S) (SE)
//! ```
//!
//! - **Evans-Young (1979/1978)**: weighted least squares on all 9 cells,
//!   all five derivatives.
//! - **Zevenbergen-Thorne (1987)**: central differences, all five derivatives.
//! - **Horn (1981)**: weighted first-order differences only (r, s, t are 0).
//!
//! Every method reports `q` positive when elevation rises to the north.
//!
//! Reference:
//! Evans, I.S. (1979). An integrated system of terrain analysis.
//! Zevenbergen, L.W. & Thorne, C.R. (1987). Quantitative analysis of
//!   land surface topography. ESPL.
//! Horn, B.K.P. (1981). Hill shading and the reflectance map. IEEE.

use std::f64::consts::TAU;

/// First- and second-order partial derivatives of a surface.
///
/// - p = ∂z/∂x  (east gradient)
/// - q = ∂z/∂y  (north gradient)
/// - r = ∂²z/∂x²
/// - s = ∂²z/∂x∂y
/// - t = ∂²z/∂y²
#[derive(Debug, Clone, Copy, Default)]
pub struct Derivatives {
    pub p: f64,
    pub q: f64,
    pub r: f64,
    pub s: f64,
    pub t: f64,
}

impl Derivatives {
    /// Gradient magnitude: √(p² + q²)
    #[inline]
    pub fn slope_magnitude(&self) -> f64 {
        (self.p * self.p + self.q * self.q).sqrt()
    }

    /// Slope angle in radians
    #[inline]
    pub fn slope_angle(&self) -> f64 {
        self.slope_magnitude().atan()
    }

    /// Downslope direction in radians, counter-clockwise from east, in
    /// `[0, 2π)`. Flat cells report 0.
    #[inline]
    pub fn downslope_aspect(&self) -> f64 {
        if self.p == 0.0 && self.q == 0.0 {
            return 0.0;
        }
        (-self.q).atan2(-self.p).rem_euclid(TAU)
    }
}

/// Evans-Young weighted least squares.
///
/// `z` holds [NW, N, NE, W, C, E, SW, S, SE]; `cellsize` is the spacing
/// between window samples.
#[inline]
pub fn evans_young(z: [f64; 9], cellsize: f64) -> Derivatives {
    let [z1, z2, z3, z4, z5, z6, z7, z8, z9] = z;

    let cs6 = 6.0 * cellsize;
    let cs2_3 = 3.0 * cellsize * cellsize;
    let cs2_4 = 4.0 * cellsize * cellsize;

    Derivatives {
        p: (z3 + z6 + z9 - z1 - z4 - z7) / cs6,
        q: (z1 + z2 + z3 - z7 - z8 - z9) / cs6,
        r: (z1 + z3 + z4 + z6 + z7 + z9 - 2.0 * (z2 + z5 + z8)) / cs2_3,
        s: (z3 + z7 - z1 - z9) / cs2_4,
        t: (z1 + z2 + z3 + z7 + z8 + z9 - 2.0 * (z4 + z5 + z6)) / cs2_3,
    }
}

/// Zevenbergen-Thorne central differences.
#[inline]
pub fn zevenbergen_thorne(z: [f64; 9], cellsize: f64) -> Derivatives {
    let [z1, z2, z3, z4, z5, z6, z7, z8, z9] = z;

    let two_cs = 2.0 * cellsize;
    let cs2 = cellsize * cellsize;

    Derivatives {
        p: (z6 - z4) / two_cs,
        q: (z2 - z8) / two_cs,
        r: (z4 - 2.0 * z5 + z6) / cs2,
        s: (z3 - z1 - z9 + z7) / (4.0 * cs2),
        t: (z2 - 2.0 * z5 + z8) / cs2,
    }
}

/// Horn first-order differences.
#[inline]
pub fn horn(z: [f64; 9], cellsize: f64) -> Derivatives {
    let [z1, z2, z3, z4, _z5, z6, z7, z8, z9] = z;

    let eight_cs = 8.0 * cellsize;

    Derivatives {
        p: ((z3 + 2.0 * z6 + z9) - (z1 + 2.0 * z4 + z7)) / eight_cs,
        q: ((z1 + 2.0 * z2 + z3) - (z7 + 2.0 * z8 + z9)) / eight_cs,
        ..Derivatives::default()
    }
}

/// Sample a 3×3 window whose outer ring lies `step` cells from the center.
///
/// Returns `None` if the window leaves the grid or touches NaN.
#[inline]
pub fn extract_window(
    data: &ndarray::Array2<f64>,
    row: usize,
    col: usize,
    step: usize,
) -> Option<[f64; 9]> {
    let (rows, cols) = data.dim();
    if row < step || col < step || row + step >= rows || col + step >= cols {
        return None;
    }
    let (n, s, w, e) = (row - step, row + step, col - step, col + step);

    let z = [
        data[[n, w]],
        data[[n, col]],
        data[[n, e]],
        data[[row, w]],
        data[[row, col]],
        data[[row, e]],
        data[[s, w]],
        data[[s, col]],
        data[[s, e]],
    ];

    if z.iter().any(|v| v.is_nan()) {
        return None;
    }
    Some(z)
}
