//! Affine mapping between pixel and projected coordinates.

use serde::{Deserialize, Serialize};

use crate::geometry::{PixelPoint, PixelSize};
use crate::{RasterError, Result};

/// Six affine coefficients `(g0..g5)` mapping pixel to projected coordinates:
///
/// ```text
/// projected_x = g0 + x * g1 + y * g2
/// projected_y = g3 + x * g4 + y * g5
/// ```
///
/// `g0`/`g3` locate the upper-left corner of the upper-left pixel, `g1`/`g5`
/// are the pixel width/height (the height is negative for a north-up image)
/// and `g2`/`g4` are rotation terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationPack([f64; 6]);

impl CalibrationPack {
    /// Create a calibration pack from its six coefficients.
    pub const fn new(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }

    /// The raw coefficients.
    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// Determinant of the linear part, `g1 * g5 - g2 * g4`.
    pub fn determinant(&self) -> f64 {
        let [_, g1, g2, _, g4, g5] = self.0;
        g1 * g5 - g2 * g4
    }

    /// Projected coordinates of a (possibly fractional) pixel coordinate.
    pub fn to_projected(&self, (pixel_x, pixel_y): (f64, f64)) -> (f64, f64) {
        let [g0, g1, g2, g3, g4, g5] = self.0;
        (
            g0 + pixel_x * g1 + pixel_y * g2,
            g3 + pixel_x * g4 + pixel_y * g5,
        )
    }

    /// Projected coordinates of an integer pixel point.
    pub fn to_projected_point(&self, pixel: PixelPoint) -> (f64, f64) {
        self.to_projected((pixel.x as f64, pixel.y as f64))
    }

    /// Pixel coordinates of a projected coordinate, rounded half away from zero.
    pub fn to_pixel(&self, (projected_x, projected_y): (f64, f64)) -> Result<PixelPoint> {
        let [g0, g1, g2, g3, g4, g5] = self.0;
        let k = self.determinant();
        if k == 0.0 {
            return Err(RasterError::DegenerateCalibration { pack: self.0 });
        }
        let x = -g0 * g5 + g2 * g3 - g2 * projected_y + g5 * projected_x;
        let y = -g1 * (g3 - projected_y) + g4 * (g0 - projected_x);
        Ok(PixelPoint::new(
            (x / k).round() as i64,
            (y / k).round() as i64,
        ))
    }

    /// Projected extent of the given pixel dimensions: `(|w * g1|, |h * g5|)`.
    pub fn to_projected_dimensions(&self, dimensions: PixelSize) -> (f64, f64) {
        let [_, g1, _, _, _, g5] = self.0;
        (
            (f64::from(dimensions.width) * g1).abs(),
            (f64::from(dimensions.height) * g5).abs(),
        )
    }

    /// Pixel dimensions covering a projected extent, rounded to the nearest pixel.
    pub fn to_pixel_dimensions(&self, (width, height): (f64, f64)) -> Result<PixelSize> {
        let [_, g1, _, _, _, g5] = self.0;
        if g1 == 0.0 || g5 == 0.0 {
            return Err(RasterError::DegenerateCalibration { pack: self.0 });
        }
        PixelSize::try_from_signed(
            (width / g1).abs().round() as i64,
            (height / g5).abs().round() as i64,
        )
    }
}

impl From<[f64; 6]> for CalibrationPack {
    fn from(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }
}
