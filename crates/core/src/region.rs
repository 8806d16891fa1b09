//! Active analysis extent and resolution
//!
//! Every field taking part in one time step must share the same grid. The
//! [`AnalysisRegion`] is that grid, passed explicitly to whoever needs it.
//! Moving-window operators that need a border of extra cells acquire a
//! [`HaloScope`], which describes the grown grid and crops results back to
//! the original extent. The scope borrows the region, so the original region
//! cannot be changed while a halo is active and is restored when the scope
//! ends.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use ndarray::{s, Array2};
use tracing::trace;

/// Grid shared by every field of one simulation step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisRegion {
    rows: usize,
    cols: usize,
    transform: GeoTransform,
}

impl AnalysisRegion {
    pub fn new(rows: usize, cols: usize, transform: GeoTransform) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions { rows, cols });
        }
        let cell = transform.cell_size();
        if cell <= 0.0 || !cell.is_finite() {
            return Err(Error::InvalidParameter {
                name: "cell_size",
                value: cell.to_string(),
                reason: "must be positive and finite".into(),
            });
        }
        Ok(Self { rows, cols, transform })
    }

    /// Region covered by an existing raster
    pub fn of<T: RasterElement>(raster: &Raster<T>) -> Result<Self> {
        Self::new(raster.rows(), raster.cols(), *raster.transform())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    pub fn cell_area(&self) -> f64 {
        self.transform.cell_area()
    }

    /// Fail unless `raster` lies on this region's grid.
    pub fn ensure_matches<T: RasterElement>(&self, raster: &Raster<T>) -> Result<()> {
        if raster.shape() != self.shape() {
            return Err(Error::SizeMismatch {
                er: self.rows,
                ec: self.cols,
                ar: raster.rows(),
                ac: raster.cols(),
            });
        }
        let expected = self.cell_size();
        let actual = raster.cell_size();
        if (expected - actual).abs() > 1e-9 * expected.max(1.0) {
            return Err(Error::ResolutionMismatch { expected, actual });
        }
        Ok(())
    }

    /// Uniform field over the region
    pub fn uniform(&self, value: f64) -> Raster<f64> {
        let mut out = Raster::from_array(Array2::from_elem((self.rows, self.cols), value));
        out.set_transform(self.transform);
        out.set_nodata(Some(f64::NAN));
        out
    }

    /// Grow the region by `margin` cells on every side for the lifetime of
    /// the returned scope.
    pub fn expand(&self, margin: usize) -> HaloScope<'_> {
        let expanded = AnalysisRegion {
            rows: self.rows + 2 * margin,
            cols: self.cols + 2 * margin,
            transform: self.transform.expanded(margin),
        };
        trace!(
            margin,
            rows = expanded.rows,
            cols = expanded.cols,
            "expanded analysis region"
        );
        HaloScope {
            base: self,
            margin,
            expanded,
        }
    }
}

/// Scoped halo around an [`AnalysisRegion`].
///
/// `pad` moves fields onto the grown grid, `crop` moves them back.
#[derive(Debug)]
pub struct HaloScope<'a> {
    base: &'a AnalysisRegion,
    margin: usize,
    expanded: AnalysisRegion,
}

impl HaloScope<'_> {
    /// The grown region
    pub fn region(&self) -> &AnalysisRegion {
        &self.expanded
    }

    /// The region this scope restores to
    pub fn base(&self) -> &AnalysisRegion {
        self.base
    }

    pub fn margin(&self) -> usize {
        self.margin
    }

    /// Place `field` in the middle of the grown grid with a NoData border.
    pub fn pad(&self, field: &Raster<f64>) -> Result<Raster<f64>> {
        self.base.ensure_matches(field)?;
        let m = self.margin;
        let mut data = Array2::from_elem(self.expanded.shape(), f64::NAN);
        data.slice_mut(s![m..m + self.base.rows, m..m + self.base.cols])
            .zip_mut_with(field.data(), |dst, &src| {
                *dst = if field.is_nodata(src) { f64::NAN } else { src };
            });

        let mut out = Raster::from_array(data);
        out.set_transform(self.expanded.transform);
        out.set_nodata(Some(f64::NAN));
        Ok(out)
    }

    /// Cut a field on the grown grid back to the original extent.
    pub fn crop(&self, field: &Raster<f64>) -> Result<Raster<f64>> {
        self.expanded.ensure_matches(field)?;
        let m = self.margin;
        let data = field
            .data()
            .slice(s![m..m + self.base.rows, m..m + self.base.cols])
            .to_owned();

        let mut out = Raster::from_array(data);
        out.set_transform(self.base.transform);
        out.set_nodata(field.nodata());
        Ok(out)
    }
}

impl Drop for HaloScope<'_> {
    fn drop(&mut self) {
        trace!(
            rows = self.base.rows,
            cols = self.base.cols,
            "restored analysis region"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(rows: usize, cols: usize) -> AnalysisRegion {
        AnalysisRegion::new(rows, cols, GeoTransform::new(0.0, 0.0, 2.0, -2.0)).unwrap()
    }

    #[test]
    fn test_rejects_empty_region() {
        assert!(AnalysisRegion::new(0, 5, GeoTransform::default()).is_err());
    }

    #[test]
    fn test_ensure_matches() {
        let r = region(4, 5);
        let mut field = r.uniform(1.0);
        assert!(r.ensure_matches(&field).is_ok());

        field.set_transform(GeoTransform::new(0.0, 0.0, 3.0, -3.0));
        assert!(matches!(
            r.ensure_matches(&field),
            Err(Error::ResolutionMismatch { .. })
        ));

        let other: Raster<f64> = Raster::new(5, 5);
        assert!(matches!(
            r.ensure_matches(&other),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_pad_then_crop_returns_original() {
        let r = region(3, 4);
        let mut field = r.uniform(0.0);
        for row in 0..3 {
            for col in 0..4 {
                field.set(row, col, (row * 4 + col) as f64).unwrap();
            }
        }

        let halo = r.expand(2);
        let padded = halo.pad(&field).unwrap();
        assert_eq!(padded.shape(), (7, 8));
        assert!(padded.get(0, 0).unwrap().is_nan(), "halo must be NoData");
        assert_eq!(padded.get(2, 2).unwrap(), 0.0);
        assert_eq!(padded.get(4, 5).unwrap(), 11.0);

        let cropped = halo.crop(&padded).unwrap();
        assert_eq!(cropped.data(), field.data());
        assert_eq!(cropped.transform(), field.transform());
    }

    #[test]
    fn test_crop_rejects_unpadded_field() {
        let r = region(3, 3);
        let halo = r.expand(1);
        assert!(halo.crop(&r.uniform(1.0)).is_err());
    }
}
