//! Pixel-space geometry: points, sizes, frames and bounding boxes.
//!
//! A [`PixelFrame`] is the `(upper_left, dimensions)` pair used to request
//! arrays from a raster. A [`PixelBounds`] is the equivalent
//! `(min_x, min_y, max_x, max_y)` box used for spatial filtering.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

use crate::{RasterError, Result};

/// An integer pixel coordinate. May lie outside the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[i64; 2]", into = "[i64; 2]")]
pub struct PixelPoint {
    /// Column (x grows to the east).
    pub x: i64,
    /// Row (y grows to the south).
    pub y: i64,
}

impl PixelPoint {
    /// Create a new pixel point.
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl From<[i64; 2]> for PixelPoint {
    fn from([x, y]: [i64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<PixelPoint> for [i64; 2] {
    fn from(p: PixelPoint) -> Self {
        [p.x, p.y]
    }
}

impl Add for PixelPoint {
    type Output = PixelPoint;

    fn add(self, rhs: PixelPoint) -> PixelPoint {
        PixelPoint::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for PixelPoint {
    type Output = PixelPoint;

    fn sub(self, rhs: PixelPoint) -> PixelPoint {
        PixelPoint::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Non-negative pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct PixelSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl PixelSize {
    /// Create new pixel dimensions.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Build dimensions from signed values, rejecting negatives.
    pub fn try_from_signed(width: i64, height: i64) -> Result<Self> {
        let width = u32::try_from(width)
            .map_err(|_| RasterError::InvalidDimensions(format!("width {width}")))?;
        let height = u32::try_from(height)
            .map_err(|_| RasterError::InvalidDimensions(format!("height {height}")))?;
        Ok(Self { width, height })
    }

    /// Dimensions as a signed offset.
    pub fn as_point(&self) -> PixelPoint {
        PixelPoint::new(i64::from(self.width), i64::from(self.height))
    }

    /// Half the dimensions, using floor division.
    pub fn half(&self) -> PixelPoint {
        PixelPoint::new(i64::from(self.width / 2), i64::from(self.height / 2))
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl From<[u32; 2]> for PixelSize {
    fn from([width, height]: [u32; 2]) -> Self {
        Self { width, height }
    }
}

impl From<PixelSize> for [u32; 2] {
    fn from(s: PixelSize) -> Self {
        [s.width, s.height]
    }
}

/// A rectangle in pixel space given by its upper-left corner and dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelFrame {
    /// Upper-left corner.
    pub upper_left: PixelPoint,
    /// Width and height.
    pub dimensions: PixelSize,
}

impl PixelFrame {
    /// Create a new pixel frame.
    pub const fn new(upper_left: PixelPoint, dimensions: PixelSize) -> Self {
        Self {
            upper_left,
            dimensions,
        }
    }

    /// Frame of the given dimensions centered on `center` (floor division).
    pub fn from_pixel_center(center: PixelPoint, dimensions: PixelSize) -> Self {
        Self::new(center - dimensions.half(), dimensions)
    }

    /// Frame covering the given bounds.
    pub fn from_pixel_bounds(bounds: &PixelBounds) -> Result<Self> {
        let dimensions = PixelSize::try_from_signed(bounds.width(), bounds.height())?;
        Ok(Self::new(
            PixelPoint::new(bounds.min_x, bounds.min_y),
            dimensions,
        ))
    }

    /// Center of the frame (floor division).
    pub fn pixel_center(&self) -> PixelPoint {
        self.upper_left + self.dimensions.half()
    }

    /// Lower-right corner (exclusive).
    pub fn lower_right(&self) -> PixelPoint {
        self.upper_left + self.dimensions.as_point()
    }

    /// Bounding box of the frame.
    pub fn bounds(&self) -> PixelBounds {
        let lower_right = self.lower_right();
        PixelBounds::new(
            self.upper_left.x,
            self.upper_left.y,
            lower_right.x,
            lower_right.y,
        )
    }
}

/// An axis-aligned box in pixel space: `(min_x, min_y, max_x, max_y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i64; 4]", into = "[i64; 4]")]
pub struct PixelBounds {
    /// Minimum x.
    pub min_x: i64,
    /// Minimum y.
    pub min_y: i64,
    /// Maximum x.
    pub max_x: i64,
    /// Maximum y.
    pub max_y: i64,
}

impl PixelBounds {
    /// Create a new bounding box.
    pub const fn new(min_x: i64, min_y: i64, max_x: i64, max_y: i64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounds of a tile of `dimensions` whose upper-left corner is `upper_left`.
    pub fn from_pixel_upper_left(upper_left: PixelPoint, dimensions: PixelSize) -> Self {
        PixelFrame::new(upper_left, dimensions).bounds()
    }

    /// Bounds of a tile of `dimensions` centered on `center`.
    pub fn from_pixel_center(center: PixelPoint, dimensions: PixelSize) -> Self {
        PixelFrame::from_pixel_center(center, dimensions).bounds()
    }

    /// Extent along x.
    pub fn width(&self) -> i64 {
        self.max_x - self.min_x
    }

    /// Extent along y.
    pub fn height(&self) -> i64 {
        self.max_y - self.min_y
    }

    /// Inclusive intersection test: boxes that only touch along an edge or
    /// at a corner intersect.
    pub fn intersects(&self, other: &PixelBounds) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    /// Overlapping region with positive area, if any.
    pub fn intersection(&self, other: &PixelBounds) -> Option<PixelBounds> {
        let clipped = PixelBounds::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        );
        (clipped.width() > 0 && clipped.height() > 0).then_some(clipped)
    }
}

impl From<[i64; 4]> for PixelBounds {
    fn from([min_x, min_y, max_x, max_y]: [i64; 4]) -> Self {
        Self::new(min_x, min_y, max_x, max_y)
    }
}

impl From<PixelBounds> for [i64; 4] {
    fn from(b: PixelBounds) -> Self {
        [b.min_x, b.min_y, b.max_x, b.max_y]
    }
}
