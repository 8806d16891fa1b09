//! Raster algebra
//!
//! Element-wise expressions over one or two fields: arithmetic, conditional
//! selection and the outlier clamp applied to physically produced fields.
//! NoData (NaN) in any input yields NoData in the output.

use crate::maybe_rayon::*;
use terraflux_core::raster::Raster;
use terraflux_core::{Algorithm, Error, Result};
use tracing::debug;

/// Binary operations between two fields or a field and a scalar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Min,
    Max,
}

impl BinaryOp {
    #[inline]
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => {
                if b.abs() < 1e-10 {
                    f64::NAN
                } else {
                    a / b
                }
            }
            BinaryOp::Power => a.powf(b),
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
        }
    }
}

pub(crate) fn ensure_same_shape(a: &Raster<f64>, b: &Raster<f64>) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(Error::SizeMismatch {
            er: a.rows(),
            ec: a.cols(),
            ar: b.rows(),
            ac: b.cols(),
        });
    }
    Ok(())
}

/// Apply a unary function to every valid cell.
///
/// ```
/// use terraflux_core::Raster;
/// use terraflux_algorithms::algebra::map;
///
/// let rain = Raster::filled(2, 2, 155.0);
/// let effective = map(&rain, |v| v * 0.35).unwrap();
/// assert!((effective.get(0, 0).unwrap() - 54.25).abs() < 1e-12);
/// ```
pub fn map<F>(raster: &Raster<f64>, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64) -> f64 + Sync + Send,
{
    let (rows, cols) = raster.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let val = unsafe { raster.get_unchecked(row, col) };
                if raster.is_nodata(val) {
                    continue;
                }
                *out = f(val);
            }
            row_data
        })
        .collect();

    crate::assemble(raster, data)
}

/// Combine two fields cell by cell.
pub fn zip<F>(a: &Raster<f64>, b: &Raster<f64>, f: F) -> Result<Raster<f64>>
where
    F: Fn(f64, f64) -> f64 + Sync + Send,
{
    ensure_same_shape(a, b)?;
    let (rows, cols) = a.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let va = unsafe { a.get_unchecked(row, col) };
                let vb = unsafe { b.get_unchecked(row, col) };
                if a.is_nodata(va) || b.is_nodata(vb) {
                    continue;
                }
                *out = f(va, vb);
            }
            row_data
        })
        .collect();

    crate::assemble(a, data)
}

/// Apply a [`BinaryOp`] between two fields.
pub fn binary(a: &Raster<f64>, b: &Raster<f64>, op: BinaryOp) -> Result<Raster<f64>> {
    zip(a, b, |x, y| op.apply(x, y))
}

/// Apply a [`BinaryOp`] between a field and a constant.
pub fn scalar(a: &Raster<f64>, op: BinaryOp, value: f64) -> Result<Raster<f64>> {
    map(a, |x| op.apply(x, value))
}

/// `if(cond, a, b)`: cells where `cond` is non-zero take `a`, others take `b`.
pub fn select(cond: &Raster<f64>, a: &Raster<f64>, b: &Raster<f64>) -> Result<Raster<f64>> {
    ensure_same_shape(cond, a)?;
    ensure_same_shape(cond, b)?;
    let (rows, cols) = cond.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let c = unsafe { cond.get_unchecked(row, col) };
                if cond.is_nodata(c) {
                    continue;
                }
                let v = if c != 0.0 {
                    unsafe { a.get_unchecked(row, col) }
                } else {
                    unsafe { b.get_unchecked(row, col) }
                };
                *out = v;
            }
            row_data
        })
        .collect();

    crate::assemble(cond, data)
}

/// Bounds for [`clamp`]
#[derive(Debug, Clone, Copy)]
pub struct ClampParams {
    pub min: f64,
    pub max: f64,
}

impl Default for ClampParams {
    fn default() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }
}

/// Outlier clamp algorithm
#[derive(Debug, Clone, Default)]
pub struct Clamp;

impl Algorithm for Clamp {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = ClampParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Clamp"
    }

    fn description(&self) -> &'static str {
        "Replace values outside [min, max] with the nearest bound"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        clamp(&input, params.min, params.max)
    }
}

/// Bound every valid cell to `[lo, hi]`.
///
/// NoData passes through. Applying the clamp twice gives the same field as
/// applying it once.
pub fn clamp(field: &Raster<f64>, lo: f64, hi: f64) -> Result<Raster<f64>> {
    if lo.is_nan() || hi.is_nan() || lo > hi {
        return Err(Error::InvalidParameter {
            name: "clamp bounds",
            value: format!("[{lo}, {hi}]"),
            reason: "min must not exceed max".into(),
        });
    }

    let out = map(field, |v| v.clamp(lo, hi))?;

    if tracing::enabled!(tracing::Level::DEBUG) {
        let (below, above) = field
            .data()
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0usize, 0usize), |(b, a), &v| {
                (b + usize::from(v < lo), a + usize::from(v > hi))
            });
        debug!(lo, hi, below, above, "clamped outliers");
    }

    Ok(out)
}
