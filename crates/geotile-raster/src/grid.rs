//! Regular grid of possibly-overlapping tiles over a raster's pixel space.
//!
//! Tiles are `tile` pixels wide and start every `interval = tile - overlap`
//! pixels. Tile indices enumerate the grid in row-major order:
//! `index = row * column_count + column`.
//!
//! Tiles along the far edges may extend past the raster; reading them is the
//! raster source's job. Callers that need a full-size array for an arbitrary
//! frame use [`TileGrid::clamp_pixel_frame`].

use rand::Rng;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::calibration::CalibrationPack;
use crate::descriptor::RasterDescriptor;
use crate::geometry::{PixelBounds, PixelFrame, PixelPoint, PixelSize};
use crate::metric::MetricReprojection;
use crate::{RasterError, Result};

/// Column and row of a tile in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TileCoordinates {
    /// Column (0 at the west edge).
    pub column: u64,
    /// Row (0 at the north edge).
    pub row: u64,
}

/// Partition of a raster's pixel space into tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TileGrid {
    raster_dimensions: PixelSize,
    tile_dimensions: PixelSize,
    overlap_dimensions: PixelSize,
    interval_dimensions: PixelSize,
    column_count: u64,
    row_count: u64,
}

/// Number of tiles that fit along one axis.
///
/// `floor((length - tile) / interval) + 1`, which requires `length >= tile`.
pub fn chop(length: u32, tile_length: u32, interval_length: u32) -> Option<u64> {
    if length < tile_length || interval_length == 0 {
        return None;
    }
    Some(u64::from((length - tile_length) / interval_length) + 1)
}

impl TileGrid {
    /// Build a grid for the raster described by `descriptor`.
    pub fn new(
        descriptor: &RasterDescriptor,
        tile_dimensions: PixelSize,
        overlap_dimensions: PixelSize,
    ) -> Result<Self> {
        Self::for_dimensions(
            descriptor.pixel_dimensions,
            tile_dimensions,
            overlap_dimensions,
        )
    }

    /// Build a grid for a raster of the given pixel dimensions.
    pub fn for_dimensions(
        raster_dimensions: PixelSize,
        tile_dimensions: PixelSize,
        overlap_dimensions: PixelSize,
    ) -> Result<Self> {
        if overlap_dimensions.width >= tile_dimensions.width
            || overlap_dimensions.height >= tile_dimensions.height
        {
            return Err(RasterError::InvalidTileConfig {
                tile_width: i64::from(tile_dimensions.width),
                tile_height: i64::from(tile_dimensions.height),
                overlap_width: i64::from(overlap_dimensions.width),
                overlap_height: i64::from(overlap_dimensions.height),
            });
        }
        let interval_dimensions = PixelSize::new(
            tile_dimensions.width - overlap_dimensions.width,
            tile_dimensions.height - overlap_dimensions.height,
        );

        let too_small = || RasterError::RasterTooSmall {
            raster_width: i64::from(raster_dimensions.width),
            raster_height: i64::from(raster_dimensions.height),
            tile_width: i64::from(tile_dimensions.width),
            tile_height: i64::from(tile_dimensions.height),
        };
        let column_count = chop(
            raster_dimensions.width,
            tile_dimensions.width,
            interval_dimensions.width,
        )
        .ok_or_else(too_small)?;
        let row_count = chop(
            raster_dimensions.height,
            tile_dimensions.height,
            interval_dimensions.height,
        )
        .ok_or_else(too_small)?;

        Ok(Self {
            raster_dimensions,
            tile_dimensions,
            overlap_dimensions,
            interval_dimensions,
            column_count,
            row_count,
        })
    }

    /// Build a grid from tile and overlap extents given in metric units.
    pub fn from_metric_dimensions(
        descriptor: &RasterDescriptor,
        metric: &MetricReprojection,
        tile_metric_dimensions: (f64, f64),
        overlap_metric_dimensions: (f64, f64),
    ) -> Result<Self> {
        let tile = metric.to_pixel_dimensions_from_metric(tile_metric_dimensions)?;
        let overlap = if overlap_metric_dimensions == (0.0, 0.0) {
            PixelSize::default()
        } else {
            metric.to_pixel_dimensions_from_metric(overlap_metric_dimensions)?
        };
        Self::new(descriptor, tile, overlap)
    }

    /// Raster dimensions the grid was built for.
    pub fn raster_dimensions(&self) -> PixelSize {
        self.raster_dimensions
    }

    /// Tile dimensions.
    pub fn tile_dimensions(&self) -> PixelSize {
        self.tile_dimensions
    }

    /// Overlap between neighbouring tiles.
    pub fn overlap_dimensions(&self) -> PixelSize {
        self.overlap_dimensions
    }

    /// Distance between the upper-left corners of neighbouring tiles.
    pub fn interval_dimensions(&self) -> PixelSize {
        self.interval_dimensions
    }

    /// Number of tile columns.
    pub fn column_count(&self) -> u64 {
        self.column_count
    }

    /// Number of tile rows.
    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> u64 {
        self.column_count * self.row_count
    }

    /// Column and row of a tile index (row-major).
    pub fn tile_coordinates_from_index(&self, tile_index: u64) -> TileCoordinates {
        TileCoordinates {
            column: tile_index % self.column_count,
            row: tile_index / self.column_count,
        }
    }

    /// Tile index of a column and row (row-major).
    pub fn tile_index_from_coordinates(&self, coordinates: TileCoordinates) -> u64 {
        coordinates.row * self.column_count + coordinates.column
    }

    /// Pixel frame of the tile at the given column and row.
    pub fn pixel_frame_from_tile_coordinates(&self, coordinates: TileCoordinates) -> PixelFrame {
        let upper_left = PixelPoint::new(
            i64::from(self.interval_dimensions.width) * coordinates.column as i64,
            i64::from(self.interval_dimensions.height) * coordinates.row as i64,
        );
        PixelFrame::new(upper_left, self.tile_dimensions)
    }

    /// Pixel frame of the tile with the given index.
    pub fn pixel_frame_from_tile_index(&self, tile_index: u64) -> PixelFrame {
        self.pixel_frame_from_tile_coordinates(self.tile_coordinates_from_index(tile_index))
    }

    /// Tile-sized frame centered on `pixel_center`.
    pub fn pixel_frame_from_pixel_center(&self, pixel_center: PixelPoint) -> PixelFrame {
        PixelFrame::from_pixel_center(pixel_center, self.tile_dimensions)
    }

    /// Tile-sized frame whose upper-left corner is `pixel_upper_left`.
    pub fn pixel_frame_from_pixel_upper_left(&self, pixel_upper_left: PixelPoint) -> PixelFrame {
        PixelFrame::new(pixel_upper_left, self.tile_dimensions)
    }

    /// Tile-sized frame centered on a projected coordinate.
    pub fn pixel_frame_from_projected_center(
        &self,
        calibration: &CalibrationPack,
        projected_center: (f64, f64),
    ) -> Result<PixelFrame> {
        Ok(self.pixel_frame_from_pixel_center(calibration.to_pixel(projected_center)?))
    }

    /// Tile-sized frame whose upper-left corner is a projected coordinate.
    pub fn pixel_frame_from_projected_upper_left(
        &self,
        calibration: &CalibrationPack,
        projected_upper_left: (f64, f64),
    ) -> Result<PixelFrame> {
        Ok(self.pixel_frame_from_pixel_upper_left(calibration.to_pixel(projected_upper_left)?))
    }

    /// Bounds of the tile-sized frame centered on `pixel_center`.
    pub fn pixel_bounds_from_pixel_center(&self, pixel_center: PixelPoint) -> PixelBounds {
        PixelBounds::from_pixel_center(pixel_center, self.tile_dimensions)
    }

    /// Bounds of the tile-sized frame at `pixel_upper_left`.
    pub fn pixel_bounds_from_pixel_upper_left(&self, pixel_upper_left: PixelPoint) -> PixelBounds {
        PixelBounds::from_pixel_upper_left(pixel_upper_left, self.tile_dimensions)
    }

    /// Move a frame inside the raster so that it keeps its full dimensions.
    ///
    /// The upper-left corner is clipped to `[0, raster - frame]` on each axis.
    /// A frame larger than the raster is pinned to the origin.
    pub fn clamp_pixel_frame(&self, frame: PixelFrame) -> PixelFrame {
        let max_x = (i64::from(self.raster_dimensions.width) - i64::from(frame.dimensions.width)).max(0);
        let max_y =
            (i64::from(self.raster_dimensions.height) - i64::from(frame.dimensions.height)).max(0);
        PixelFrame::new(
            PixelPoint::new(
                frame.upper_left.x.clamp(0, max_x),
                frame.upper_left.y.clamp(0, max_y),
            ),
            frame.dimensions,
        )
    }

    /// Smallest upper-left corner of a full tile.
    pub fn minimum_pixel_upper_left(&self) -> PixelPoint {
        PixelPoint::new(0, 0)
    }

    /// Largest upper-left corner of a tile that still lies entirely inside the raster.
    pub fn maximum_pixel_upper_left(&self) -> PixelPoint {
        let limit = self.raster_dimensions.as_point() - self.tile_dimensions.as_point();
        PixelPoint::new(limit.x.max(0), limit.y.max(0))
    }

    /// Smallest center of a full tile.
    pub fn minimum_pixel_center(&self) -> PixelPoint {
        PixelFrame::new(self.minimum_pixel_upper_left(), self.tile_dimensions).pixel_center()
    }

    /// Largest center of a full tile.
    pub fn maximum_pixel_center(&self) -> PixelPoint {
        PixelFrame::new(self.maximum_pixel_upper_left(), self.tile_dimensions).pixel_center()
    }

    /// Whether a tile centered here lies entirely inside the raster.
    pub fn is_pixel_center(&self, pixel_center: PixelPoint) -> bool {
        within(
            pixel_center,
            self.minimum_pixel_center(),
            self.maximum_pixel_center(),
        )
    }

    /// Whether a tile with this upper-left corner lies entirely inside the raster.
    pub fn is_pixel_upper_left(&self, pixel_upper_left: PixelPoint) -> bool {
        within(
            pixel_upper_left,
            self.minimum_pixel_upper_left(),
            self.maximum_pixel_upper_left(),
        )
    }

    /// A uniformly random center whose tile lies entirely inside the raster.
    pub fn random_pixel_center<R: Rng + ?Sized>(&self, rng: &mut R) -> PixelPoint {
        let low = self.minimum_pixel_center();
        let high = self.maximum_pixel_center();
        PixelPoint::new(rng.gen_range(low.x..=high.x), rng.gen_range(low.y..=high.y))
    }

    /// Enumerate `(tile_index, pixel_upper_left)` pairs in row-major order,
    /// keeping only tiles accepted by `filter`.
    pub fn frames<'a>(&'a self, filter: &'a TileFilter) -> TileFrames<'a> {
        TileFrames {
            grid: self,
            filter,
            next_index: 0,
        }
    }
}

fn within(point: PixelPoint, low: PixelPoint, high: PixelPoint) -> bool {
    (low.x..=high.x).contains(&point.x) && (low.y..=high.y).contains(&point.y)
}

/// Restricts tile enumeration. Both criteria must hold when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileFilter {
    /// Keep tiles whose bounds intersect this box (touching counts).
    pub pixel_bounds: Option<PixelBounds>,
    /// Keep only these tile indices. An empty set keeps nothing.
    pub tile_indices: Option<BTreeSet<u64>>,
}

impl TileFilter {
    /// A filter that keeps every tile.
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep tiles intersecting `bounds`.
    pub fn with_pixel_bounds(mut self, bounds: PixelBounds) -> Self {
        self.pixel_bounds = Some(bounds);
        self
    }

    /// Keep only the listed tile indices.
    pub fn with_tile_indices(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.tile_indices = Some(indices.into_iter().collect());
        self
    }

    /// Whether the tile with this index and frame passes the filter.
    pub fn accepts(&self, tile_index: u64, frame: &PixelFrame) -> bool {
        if let Some(indices) = &self.tile_indices {
            if !indices.contains(&tile_index) {
                return false;
            }
        }
        match &self.pixel_bounds {
            Some(bounds) => frame.bounds().intersects(bounds),
            None => true,
        }
    }
}

/// Lazy iterator over the filtered tiles of a [`TileGrid`].
///
/// Restart the sequence by calling [`TileGrid::frames`] again or cloning the
/// iterator before consuming it.
#[derive(Debug, Clone)]
pub struct TileFrames<'a> {
    grid: &'a TileGrid,
    filter: &'a TileFilter,
    next_index: u64,
}

impl Iterator for TileFrames<'_> {
    type Item = (u64, PixelPoint);

    fn next(&mut self) -> Option<Self::Item> {
        let tile_count = self.grid.tile_count();
        while self.next_index < tile_count {
            let tile_index = self.next_index;
            self.next_index += 1;
            let frame = self.grid.pixel_frame_from_tile_index(tile_index);
            if self.filter.accepts(tile_index, &frame) {
                return Some((tile_index, frame.upper_left));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.tile_count().saturating_sub(self.next_index);
        (0, usize::try_from(remaining).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn grid(width: u32, height: u32, tile: u32, overlap: u32) -> TileGrid {
        TileGrid::for_dimensions(
            PixelSize::new(width, height),
            PixelSize::new(tile, tile),
            PixelSize::new(overlap, overlap),
        )
        .unwrap()
    }

    #[test]
    fn test_column_count_without_overlap() {
        let g = grid(100, 100, 30, 0);
        assert_eq!(g.column_count(), 3);
        assert_eq!(g.row_count(), 3);
        assert_eq!(g.tile_count(), 9);
    }

    #[test]
    fn test_column_count_with_overlap() {
        let g = grid(100, 60, 30, 10);
        assert_eq!(g.interval_dimensions(), PixelSize::new(20, 20));
        assert_eq!(g.column_count(), 4);
        assert_eq!(g.row_count(), 2);
    }

    #[test]
    fn test_exact_fit_gives_one_tile() {
        let g = grid(30, 30, 30, 0);
        assert_eq!(g.tile_count(), 1);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_tile() {
        let result = TileGrid::for_dimensions(
            PixelSize::new(100, 100),
            PixelSize::new(30, 30),
            PixelSize::new(10, 30),
        );
        assert!(matches!(result, Err(RasterError::InvalidTileConfig { .. })));
    }

    #[test]
    fn test_raster_too_small() {
        let result = TileGrid::for_dimensions(
            PixelSize::new(100, 20),
            PixelSize::new(30, 30),
            PixelSize::new(0, 0),
        );
        assert!(matches!(result, Err(RasterError::RasterTooSmall { .. })));
    }

    #[test]
    fn test_tile_index_inversion() {
        let g = grid(257, 131, 32, 7);
        for i in 0..g.tile_count() {
            let coordinates = g.tile_coordinates_from_index(i);
            assert!(coordinates.column < g.column_count());
            assert!(coordinates.row < g.row_count());
            assert_eq!(g.tile_index_from_coordinates(coordinates), i);
        }
    }

    #[test]
    fn test_pixel_frame_from_tile_index_is_row_major() {
        let g = grid(100, 100, 30, 10);
        let frame = g.pixel_frame_from_tile_index(5);
        // 4 columns: index 5 is column 1, row 1
        assert_eq!(frame.upper_left, PixelPoint::new(20, 20));
        assert_eq!(frame.dimensions, PixelSize::new(30, 30));
    }

    #[test]
    fn test_clamp_pixel_frame() {
        let g = grid(100, 80, 30, 0);
        let frame = g.pixel_frame_from_pixel_center(PixelPoint::new(2, 79));
        let clamped = g.clamp_pixel_frame(frame);
        assert_eq!(clamped.upper_left, PixelPoint::new(0, 50));
        assert_eq!(clamped.dimensions, PixelSize::new(30, 30));

        let inside = PixelFrame::new(PixelPoint::new(10, 10), PixelSize::new(30, 30));
        assert_eq!(g.clamp_pixel_frame(inside), inside);
    }

    #[test]
    fn test_random_pixel_center_stays_inside() {
        let g = grid(64, 48, 16, 0);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..500 {
            let center = g.random_pixel_center(&mut rng);
            assert!(g.is_pixel_center(center), "{center:?}");
            let frame = g.pixel_frame_from_pixel_center(center);
            assert_eq!(g.clamp_pixel_frame(frame), frame);
        }
        assert_eq!(g.minimum_pixel_center(), PixelPoint::new(8, 8));
        assert_eq!(g.maximum_pixel_center(), PixelPoint::new(56, 40));
    }

    #[test]
    fn test_frames_enumerates_all_tiles_in_order() {
        let g = grid(100, 100, 30, 10);
        let filter = TileFilter::all();
        let frames: Vec<_> = g.frames(&filter).collect();
        assert_eq!(frames.len() as u64, g.tile_count());
        assert_eq!(frames[0], (0, PixelPoint::new(0, 0)));
        assert_eq!(frames[1], (1, PixelPoint::new(20, 0)));
        assert_eq!(frames[4], (4, PixelPoint::new(0, 20)));
    }

    #[test]
    fn test_frames_restartable() {
        let g = grid(100, 100, 30, 0);
        let filter = TileFilter::all();
        let first: Vec<_> = g.frames(&filter).collect();
        let second: Vec<_> = g.frames(&filter).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_frames_filters_compose() {
        let g = grid(100, 100, 30, 0);
        // Tiles are at 0, 30, 60 on each axis; this box touches tile (1, 0) at x = 30.
        let bounds_only = TileFilter::all().with_pixel_bounds(PixelBounds::new(0, 0, 30, 10));
        let indices: Vec<u64> = g.frames(&bounds_only).map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0, 1]);

        let both = bounds_only.clone().with_tile_indices([1, 4]);
        let indices: Vec<u64> = g.frames(&both).map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1]);

        let nothing = TileFilter::all().with_tile_indices([]);
        assert_eq!(g.frames(&nothing).count(), 0);
    }
}
