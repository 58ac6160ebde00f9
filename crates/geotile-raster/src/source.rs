//! Raster sources: anything that can turn a pixel frame into an array.

use serde::{Deserialize, Serialize};
use tracing::trace;

use geotile_metrics::{metric_defs, metrics};

use crate::descriptor::RasterDescriptor;
use crate::geometry::{PixelBounds, PixelFrame};
use crate::{RasterError, Result};

/// A `height x width x bands` block of samples, stored row-major with bands interleaved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileArray {
    height: usize,
    width: usize,
    bands: usize,
    data: Vec<f32>,
}

impl TileArray {
    /// Wrap existing samples, checking that the length matches the shape.
    pub fn new(height: usize, width: usize, bands: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != height * width * bands {
            return Err(RasterError::InvalidDimensions(format!(
                "{} samples for a {}x{}x{} array",
                data.len(),
                height,
                width,
                bands
            )));
        }
        Ok(Self {
            height,
            width,
            bands,
            data,
        })
    }

    /// An array with every sample set to `value`.
    pub fn filled(height: usize, width: usize, bands: usize, value: f32) -> Self {
        Self {
            height,
            width,
            bands,
            data: vec![value; height * width * bands],
        }
    }

    /// `[height, width, bands]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.bands]
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn bands(&self) -> usize {
        self.bands
    }

    /// All samples in storage order.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    fn offset(&self, row: usize, column: usize, band: usize) -> usize {
        (row * self.width + column) * self.bands + band
    }

    /// Sample at `(row, column, band)`, if inside the array.
    pub fn get(&self, row: usize, column: usize, band: usize) -> Option<f32> {
        if row >= self.height || column >= self.width || band >= self.bands {
            return None;
        }
        self.data.get(self.offset(row, column, band)).copied()
    }

    /// Largest sample, or `None` for an array without samples.
    pub fn max(&self) -> Option<f32> {
        self.data.iter().copied().reduce(f32::max)
    }

    /// Whether every sample is zero. Such arrays carry no usable imagery.
    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    /// Copy of the window `rows x columns` starting at `(row, column)`.
    pub fn window(&self, row: usize, column: usize, rows: usize, columns: usize) -> Result<Self> {
        if row + rows > self.height || column + columns > self.width {
            return Err(RasterError::InvalidDimensions(format!(
                "window {rows}x{columns} at ({row}, {column}) exceeds {}x{} array",
                self.height, self.width
            )));
        }
        let mut data = Vec::with_capacity(rows * columns * self.bands);
        for r in row..row + rows {
            let start = self.offset(r, column, 0);
            data.extend_from_slice(&self.data[start..start + columns * self.bands]);
        }
        Self::new(rows, columns, self.bands, data)
    }

    /// Paste `other` with its upper-left sample at `(row, column)`.
    fn paste(&mut self, other: &TileArray, row: usize, column: usize) {
        for r in 0..other.height {
            let source = other.offset(r, 0, 0);
            let target = self.offset(row + r, column, 0);
            let len = other.width * other.bands;
            self.data[target..target + len].copy_from_slice(&other.data[source..source + len]);
        }
    }

    /// Replace the declared null values of a raster with `fill_value`.
    ///
    /// When every band shares one null value the replacement is global,
    /// otherwise each band is handled with its own null value.
    pub fn replace_nulls(&mut self, descriptor: &RasterDescriptor, fill_value: f32) {
        match descriptor.shared_null_value() {
            Some(None) => {}
            Some(Some(null)) => {
                for v in &mut self.data {
                    if matches_null(*v, null) {
                        *v = fill_value;
                    }
                }
            }
            None => {
                let bands = self.bands;
                for (band, null) in descriptor.null_values.iter().enumerate().take(bands) {
                    let Some(null) = *null else { continue };
                    for v in self.data.iter_mut().skip(band).step_by(bands) {
                        if matches_null(*v, null) {
                            *v = fill_value;
                        }
                    }
                }
            }
        }
    }
}

fn matches_null(value: f32, null: f64) -> bool {
    if null.is_nan() {
        value.is_nan()
    } else {
        value == null as f32
    }
}

/// Supplies pixel data and metadata for a raster.
pub trait RasterSource {
    /// Metadata captured when the raster was opened.
    fn descriptor(&self) -> &RasterDescriptor;

    /// Raw samples of a window that lies entirely inside the raster.
    fn read_window(&self, window: &PixelBounds) -> Result<TileArray>;

    /// Array for `frame`, with nulls and the part outside the raster set to `fill_value`.
    ///
    /// Fails with [`RasterError::FrameOutOfBounds`] when the frame does not
    /// overlap the raster at all.
    fn read(&self, frame: &PixelFrame, fill_value: f32) -> Result<TileArray> {
        let descriptor = self.descriptor();
        let requested = frame.bounds();
        let region = descriptor
            .pixel_bounds()
            .intersection(&requested)
            .ok_or(RasterError::FrameOutOfBounds {
                x: frame.upper_left.x,
                y: frame.upper_left.y,
                width: i64::from(frame.dimensions.width),
                height: i64::from(frame.dimensions.height),
            })?;

        let mut array = self.read_window(&region)?;
        array.replace_nulls(descriptor, fill_value);
        metrics::counter!(metric_defs::RASTER_READS.name).increment(1);

        if region == requested {
            return Ok(array);
        }
        trace!(?frame, ?region, "Padding partial frame");
        let mut padded = TileArray::filled(
            frame.dimensions.height as usize,
            frame.dimensions.width as usize,
            descriptor.band_count,
            fill_value,
        );
        padded.paste(
            &array,
            (region.min_y - requested.min_y) as usize,
            (region.min_x - requested.min_x) as usize,
        );
        Ok(padded)
    }

    /// Like [`read`](RasterSource::read), but a frame entirely outside the
    /// raster yields an all-fill array instead of an error.
    fn read_or_fill(&self, frame: &PixelFrame, fill_value: f32) -> Result<TileArray> {
        match self.read(frame, fill_value) {
            Err(RasterError::FrameOutOfBounds { .. }) => {
                metrics::counter!(metric_defs::FRAMES_OUT_OF_BOUNDS.name).increment(1);
                Ok(TileArray::filled(
                    frame.dimensions.height as usize,
                    frame.dimensions.width as usize,
                    self.descriptor().band_count,
                    fill_value,
                ))
            }
            other => other,
        }
    }
}

/// A raster held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    descriptor: RasterDescriptor,
    samples: TileArray,
}

impl MemoryRaster {
    /// Wrap `samples`, which must match the descriptor's dimensions and band count.
    pub fn new(descriptor: RasterDescriptor, samples: TileArray) -> Result<Self> {
        let expected = [
            descriptor.pixel_dimensions.height as usize,
            descriptor.pixel_dimensions.width as usize,
            descriptor.band_count,
        ];
        if samples.shape() != expected {
            return Err(RasterError::InvalidDimensions(format!(
                "samples have shape {:?}, descriptor expects {:?}",
                samples.shape(),
                expected
            )));
        }
        Ok(Self {
            descriptor,
            samples,
        })
    }

    /// All samples of the raster.
    pub fn samples(&self) -> &TileArray {
        &self.samples
    }
}

impl RasterSource for MemoryRaster {
    fn descriptor(&self) -> &RasterDescriptor {
        &self.descriptor
    }

    fn read_window(&self, window: &PixelBounds) -> Result<TileArray> {
        if window.min_x < 0 || window.min_y < 0 || window.width() < 0 || window.height() < 0 {
            return Err(RasterError::InvalidDimensions(format!("window {window:?}")));
        }
        self.samples.window(
            window.min_y as usize,
            window.min_x as usize,
            window.height() as usize,
            window.width() as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationPack;
    use crate::descriptor::SampleType;
    use crate::geometry::{PixelPoint, PixelSize};

    /// 4 x 3 raster with two bands: band 0 = column + 10 * row, band 1 = 7.
    fn raster(null_values: Vec<Option<f64>>) -> MemoryRaster {
        let descriptor = RasterDescriptor::new(
            PixelSize::new(4, 3),
            2,
            null_values,
            SampleType::U8,
            "+proj=utm +zone=10 +datum=WGS84",
            CalibrationPack::new([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]),
        )
        .unwrap();
        let mut data = Vec::new();
        for row in 0..3 {
            for column in 0..4 {
                data.push((column + 10 * row) as f32);
                data.push(7.0);
            }
        }
        MemoryRaster::new(descriptor, TileArray::new(3, 4, 2, data).unwrap()).unwrap()
    }

    #[test]
    fn test_read_inside() {
        let source = raster(vec![None, None]);
        let frame = PixelFrame::new(PixelPoint::new(1, 1), PixelSize::new(2, 2));
        let array = source.read(&frame, 0.0).unwrap();
        assert_eq!(array.shape(), [2, 2, 2]);
        assert_eq!(array.get(0, 0, 0), Some(11.0));
        assert_eq!(array.get(1, 1, 0), Some(22.0));
        assert_eq!(array.get(1, 1, 1), Some(7.0));
    }

    #[test]
    fn test_read_pads_edge_frame() {
        let source = raster(vec![None, None]);
        let frame = PixelFrame::new(PixelPoint::new(3, -1), PixelSize::new(2, 2));
        let array = source.read(&frame, -1.0).unwrap();
        assert_eq!(array.shape(), [2, 2, 2]);
        assert_eq!(array.get(0, 0, 0), Some(-1.0));
        assert_eq!(array.get(1, 0, 0), Some(3.0));
        assert_eq!(array.get(1, 1, 0), Some(-1.0));
    }

    #[test]
    fn test_read_outside_fails_and_read_or_fill_recovers() {
        let source = raster(vec![None, None]);
        let frame = PixelFrame::new(PixelPoint::new(4, 0), PixelSize::new(2, 2));
        assert!(matches!(
            source.read(&frame, 0.0),
            Err(RasterError::FrameOutOfBounds { .. })
        ));
        let filled = source.read_or_fill(&frame, 5.0).unwrap();
        assert_eq!(filled.shape(), [2, 2, 2]);
        assert!(filled.data().iter().all(|&v| v == 5.0));
    }

    #[test]
    fn test_shared_null_value_replaced_globally() {
        let source = raster(vec![Some(7.0), Some(7.0)]);
        let frame = PixelFrame::new(PixelPoint::new(0, 0), PixelSize::new(4, 3));
        let array = source.read(&frame, 0.0).unwrap();
        assert_eq!(array.get(0, 0, 1), Some(0.0));
        assert_eq!(array.get(2, 3, 1), Some(0.0));
    }

    #[test]
    fn test_per_band_null_values() {
        // Band 0 treats 11 as null, band 1 declares none.
        let source = raster(vec![Some(11.0), None]);
        let frame = PixelFrame::new(PixelPoint::new(0, 0), PixelSize::new(4, 3));
        let array = source.read(&frame, 99.0).unwrap();
        assert_eq!(array.get(1, 1, 0), Some(99.0));
        assert_eq!(array.get(1, 1, 1), Some(7.0));
        assert_eq!(array.get(0, 0, 0), Some(0.0));
    }

    #[test]
    fn test_all_zero() {
        assert!(TileArray::filled(2, 2, 3, 0.0).is_all_zero());
        assert!(!TileArray::new(1, 1, 2, vec![0.0, 1.0]).unwrap().is_all_zero());
    }
}
