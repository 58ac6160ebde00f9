//! Example pools: parallel arrays, labels and pixel locations.
//!
//! A pool is the unit of storage shared by extraction, sampling and batching.
//! Every array in a pool has the same `height x width x bands` shape. Labels
//! are either absent (tiles cut from a grid) or present for every example.
//! Locations are either pixel centers or pixel upper-lefts; the serialized
//! field name (`pixel_centers` / `pixel_upper_lefts`) records which.

use geotile_raster::{CalibrationPack, PixelBounds, PixelPoint, PixelSize, SampleType, TileArray};
use serde::{Deserialize, Serialize};

use crate::{DatasetError, Result};

/// Which point of a tile a stored location refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationKind {
    Center,
    UpperLeft,
}

/// Pixel locations of the examples in a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelLocations {
    PixelCenters(Vec<PixelPoint>),
    PixelUpperLefts(Vec<PixelPoint>),
}

impl PixelLocations {
    pub fn empty(kind: LocationKind) -> Self {
        match kind {
            LocationKind::Center => PixelLocations::PixelCenters(Vec::new()),
            LocationKind::UpperLeft => PixelLocations::PixelUpperLefts(Vec::new()),
        }
    }

    pub fn kind(&self) -> LocationKind {
        match self {
            PixelLocations::PixelCenters(_) => LocationKind::Center,
            PixelLocations::PixelUpperLefts(_) => LocationKind::UpperLeft,
        }
    }

    pub fn points(&self) -> &[PixelPoint] {
        match self {
            PixelLocations::PixelCenters(points) | PixelLocations::PixelUpperLefts(points) => {
                points
            }
        }
    }

    fn points_mut(&mut self) -> &mut Vec<PixelPoint> {
        match self {
            PixelLocations::PixelCenters(points) | PixelLocations::PixelUpperLefts(points) => {
                points
            }
        }
    }

    pub fn len(&self) -> usize {
        self.points().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<PixelPoint> {
        self.points().get(index).copied()
    }

    /// Pixel box covered by the tile at `index`.
    pub fn tile_bounds(&self, index: usize, tile_dimensions: PixelSize) -> Option<PixelBounds> {
        let point = self.get(index)?;
        Some(match self.kind() {
            LocationKind::Center => PixelBounds::from_pixel_center(point, tile_dimensions),
            LocationKind::UpperLeft => PixelBounds::from_pixel_upper_left(point, tile_dimensions),
        })
    }
}

/// Georeferencing metadata attached to a pool's locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationAttributes {
    pub calibration_pack: CalibrationPack,
    pub proj4: String,
}

/// Examples sharing one array shape, with optional labels and their pixel locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PoolRecord")]
pub struct ExamplePool {
    arrays: Vec<TileArray>,
    labels: Vec<bool>,
    #[serde(flatten)]
    locations: PixelLocations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attributes: Option<LocationAttributes>,
    sample_type: SampleType,
}

/// Unvalidated serialized form of a pool.
#[derive(Deserialize)]
struct PoolRecord {
    arrays: Vec<TileArray>,
    #[serde(default)]
    labels: Vec<bool>,
    #[serde(flatten)]
    locations: PixelLocations,
    #[serde(default)]
    attributes: Option<LocationAttributes>,
    sample_type: SampleType,
}

impl TryFrom<PoolRecord> for ExamplePool {
    type Error = DatasetError;

    fn try_from(record: PoolRecord) -> Result<Self> {
        ExamplePool::from_parts(
            record.arrays,
            record.labels,
            record.locations,
            record.attributes,
            record.sample_type,
        )
    }
}

impl ExamplePool {
    /// An empty pool.
    pub fn new(kind: LocationKind, sample_type: SampleType) -> Self {
        Self {
            arrays: Vec::new(),
            labels: Vec::new(),
            locations: PixelLocations::empty(kind),
            attributes: None,
            sample_type,
        }
    }

    /// Attach georeferencing metadata.
    pub fn with_attributes(mut self, attributes: LocationAttributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Build a pool from parallel sequences, checking shapes and lengths.
    pub fn from_parts(
        arrays: Vec<TileArray>,
        labels: Vec<bool>,
        locations: PixelLocations,
        attributes: Option<LocationAttributes>,
        sample_type: SampleType,
    ) -> Result<Self> {
        if let Some(first) = arrays.first() {
            let expected = first.shape();
            for array in &arrays {
                let [height, width, bands] = array.shape();
                if array.shape() != expected {
                    return Err(DatasetError::ShapeMismatch {
                        expected,
                        found: array.shape(),
                    });
                }
                if array.data().len() != height * width * bands {
                    return Err(DatasetError::LengthMismatch {
                        field: "array samples",
                        expected: height * width * bands,
                        found: array.data().len(),
                    });
                }
            }
        }
        if !labels.is_empty() && labels.len() != arrays.len() {
            return Err(DatasetError::LengthMismatch {
                field: "labels",
                expected: arrays.len(),
                found: labels.len(),
            });
        }
        if locations.len() != arrays.len() {
            return Err(DatasetError::LengthMismatch {
                field: "locations",
                expected: arrays.len(),
                found: locations.len(),
            });
        }
        Ok(Self {
            arrays,
            labels,
            locations,
            attributes,
            sample_type,
        })
    }

    /// Append an example. `label` must be given for all examples or for none.
    pub fn push(&mut self, array: TileArray, label: Option<bool>, location: PixelPoint) -> Result<()> {
        if let Some(expected) = self.array_shape() {
            if array.shape() != expected {
                return Err(DatasetError::ShapeMismatch {
                    expected,
                    found: array.shape(),
                });
            }
        }
        match label {
            Some(label) if self.labels.len() == self.arrays.len() => self.labels.push(label),
            None if self.labels.is_empty() => {}
            _ => {
                return Err(DatasetError::LengthMismatch {
                    field: "labels",
                    expected: self.arrays.len() + 1,
                    found: self.labels.len(),
                })
            }
        }
        self.arrays.push(array);
        self.locations.points_mut().push(location);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    pub fn arrays(&self) -> &[TileArray] {
        &self.arrays
    }

    pub fn array(&self, index: usize) -> Result<&TileArray> {
        self.arrays.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.arrays.len(),
        })
    }

    /// Labels of every example; empty for an unlabeled pool.
    pub fn labels(&self) -> &[bool] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Result<bool> {
        self.labels.get(index).copied().ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.labels.len(),
        })
    }

    pub fn is_labeled(&self) -> bool {
        !self.arrays.is_empty() && self.labels.len() == self.arrays.len()
    }

    pub fn locations(&self) -> &PixelLocations {
        &self.locations
    }

    pub fn location(&self, index: usize) -> Result<PixelPoint> {
        self.locations.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.locations.len(),
        })
    }

    pub fn location_kind(&self) -> LocationKind {
        self.locations.kind()
    }

    pub fn attributes(&self) -> Option<&LocationAttributes> {
        self.attributes.as_ref()
    }

    /// Type of the samples in the raster the arrays were read from.
    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// `[height, width, bands]` shared by every array, if the pool is not empty.
    pub fn array_shape(&self) -> Option<[usize; 3]> {
        self.arrays.first().map(TileArray::shape)
    }

    /// Pixel dimensions of the tiles in this pool.
    pub fn tile_dimensions(&self) -> Option<PixelSize> {
        let [height, width, _] = self.array_shape()?;
        Some(PixelSize::new(
            u32::try_from(width).ok()?,
            u32::try_from(height).ok()?,
        ))
    }
}

/// The positive and negative pools extracted for one raster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleSet {
    pub positive: ExamplePool,
    pub negative: ExamplePool,
}

impl ExampleSet {
    /// Pool for a label.
    pub fn pool(&self, label: bool) -> &ExamplePool {
        if label {
            &self.positive
        } else {
            &self.negative
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(value: f32) -> TileArray {
        TileArray::filled(2, 3, 1, value)
    }

    #[test]
    fn test_push_labeled() {
        let mut pool = ExamplePool::new(LocationKind::Center, SampleType::U8);
        pool.push(array(1.0), Some(true), PixelPoint::new(5, 6)).unwrap();
        pool.push(array(2.0), Some(false), PixelPoint::new(7, 8)).unwrap();
        assert_eq!(pool.len(), 2);
        assert!(pool.is_labeled());
        assert!(!pool.label(1).unwrap());
        assert_eq!(pool.location(0).unwrap(), PixelPoint::new(5, 6));
        assert_eq!(pool.tile_dimensions(), Some(PixelSize::new(3, 2)));
    }

    #[test]
    fn test_labels_all_or_nothing() {
        let mut pool = ExamplePool::new(LocationKind::UpperLeft, SampleType::U8);
        pool.push(array(1.0), None, PixelPoint::new(0, 0)).unwrap();
        assert!(matches!(
            pool.push(array(1.0), Some(true), PixelPoint::new(0, 0)),
            Err(DatasetError::LengthMismatch { field: "labels", .. })
        ));
        assert_eq!(pool.len(), 1);
        assert!(!pool.is_labeled());
    }

    #[test]
    fn test_shape_must_match() {
        let mut pool = ExamplePool::new(LocationKind::Center, SampleType::U8);
        pool.push(array(1.0), Some(true), PixelPoint::new(0, 0)).unwrap();
        let result = pool.push(TileArray::filled(3, 3, 1, 0.0), Some(true), PixelPoint::new(0, 0));
        assert!(matches!(
            result,
            Err(DatasetError::ShapeMismatch {
                expected: [2, 3, 1],
                found: [3, 3, 1]
            })
        ));
    }

    #[test]
    fn test_from_parts_checks_lengths() {
        let result = ExamplePool::from_parts(
            vec![array(1.0), array(2.0)],
            vec![true],
            PixelLocations::PixelCenters(vec![PixelPoint::new(0, 0), PixelPoint::new(1, 1)]),
            None,
            SampleType::U8,
        );
        assert!(matches!(result, Err(DatasetError::LengthMismatch { field: "labels", .. })));

        let result = ExamplePool::from_parts(
            vec![array(1.0)],
            vec![],
            PixelLocations::PixelUpperLefts(vec![]),
            None,
            SampleType::U8,
        );
        assert!(matches!(result, Err(DatasetError::LengthMismatch { field: "locations", .. })));
    }

    #[test]
    fn test_tile_bounds_by_location_kind() {
        let size = PixelSize::new(10, 4);
        let centers = PixelLocations::PixelCenters(vec![PixelPoint::new(20, 20)]);
        assert_eq!(centers.tile_bounds(0, size), Some(PixelBounds::new(15, 18, 25, 22)));
        let upper_lefts = PixelLocations::PixelUpperLefts(vec![PixelPoint::new(20, 20)]);
        assert_eq!(upper_lefts.tile_bounds(0, size), Some(PixelBounds::new(20, 20, 30, 24)));
        assert_eq!(upper_lefts.tile_bounds(1, size), None);
    }
}
