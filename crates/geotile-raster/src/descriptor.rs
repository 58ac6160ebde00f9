//! Raster metadata captured once when a raster is opened.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::calibration::CalibrationPack;
use crate::geometry::{PixelBounds, PixelSize};
use crate::{RasterError, Result};

/// Numeric type of the samples stored in a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

/// Smallest unsigned integer width able to hold any pixel coordinate of a raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateWidth {
    U8,
    U16,
    U32,
}

impl CoordinateWidth {
    /// Width needed for coordinates up to `max_dimension`.
    pub fn for_max_dimension(max_dimension: u32) -> Self {
        if max_dimension <= u32::from(u8::MAX) {
            CoordinateWidth::U8
        } else if max_dimension <= u32::from(u16::MAX) {
            CoordinateWidth::U16
        } else {
            CoordinateWidth::U32
        }
    }
}

/// Immutable description of an opened raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterDescriptor {
    /// Where the raster came from, if it was read from disk.
    pub path: Option<PathBuf>,
    /// Width and height in pixels.
    pub pixel_dimensions: PixelSize,
    /// Number of bands (at least one).
    pub band_count: usize,
    /// Null value for each band, if declared.
    pub null_values: Vec<Option<f64>>,
    /// Type of the stored samples.
    pub sample_type: SampleType,
    /// Normalized proj4 string of the native projection.
    pub projection: String,
    /// Pixel to projected calibration.
    pub calibration: CalibrationPack,
}

impl RasterDescriptor {
    /// Build a descriptor, validating the band layout and normalizing the projection.
    pub fn new(
        pixel_dimensions: PixelSize,
        band_count: usize,
        null_values: Vec<Option<f64>>,
        sample_type: SampleType,
        projection: &str,
        calibration: CalibrationPack,
    ) -> Result<Self> {
        if band_count == 0 {
            return Err(RasterError::InvalidDimensions(
                "raster must have at least one band".to_string(),
            ));
        }
        if null_values.len() != band_count {
            return Err(RasterError::InvalidDimensions(format!(
                "{} null values for {} bands",
                null_values.len(),
                band_count
            )));
        }
        Ok(Self {
            path: None,
            pixel_dimensions,
            band_count,
            null_values,
            sample_type,
            projection: normalize_projection(projection),
            calibration,
        })
    }

    /// Attach the source path.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Integer width sufficient for pixel coordinates of this raster.
    pub fn pixel_coordinate_width(&self) -> CoordinateWidth {
        CoordinateWidth::for_max_dimension(
            self.pixel_dimensions.width.max(self.pixel_dimensions.height),
        )
    }

    /// The whole raster as a pixel box.
    pub fn pixel_bounds(&self) -> PixelBounds {
        PixelBounds::new(
            0,
            0,
            i64::from(self.pixel_dimensions.width),
            i64::from(self.pixel_dimensions.height),
        )
    }

    /// The single null value shared by every band, if the bands agree.
    ///
    /// Returns `Some(None)` when no band declares a null value.
    pub fn shared_null_value(&self) -> Option<Option<f64>> {
        let first = self.null_values.first().copied()?;
        self.null_values
            .iter()
            .all(|v| same_null(*v, first))
            .then_some(first)
    }
}

fn same_null(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b || (a.is_nan() && b.is_nan()),
        _ => false,
    }
}

/// Trim and collapse whitespace so equal projections compare equal.
pub fn normalize_projection(projection: &str) -> String {
    projection.split_whitespace().collect::<Vec<_>>().join(" ")
}
