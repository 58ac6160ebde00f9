//! # geotile-raster
//!
//! Geo-referenced raster access for tiled dataset extraction.
//!
//! This crate provides:
//! - [`CalibrationPack`]: the six-coefficient affine map between pixel and
//!   projected coordinates, with its inverse
//! - [`MetricReprojection`]: conversion between a raster's pixel grid and a
//!   metric (UTM) projection, building its coordinate transforms once
//! - [`TileGrid`]: a regular grid of possibly overlapping tiles over a raster,
//!   with index/coordinate/frame conversions and filtered enumeration
//! - [`RasterSource`]: reading a pixel frame as a `height x width x bands`
//!   array, with null replacement and edge padding; implemented by
//!   [`GeoTiffRaster`] and [`MemoryRaster`]
//!
//! ## Example
//!
//! ```no_run
//! use geotile_raster::{GeoTiffRaster, PixelSize, RasterSource, TileFilter, TileGrid};
//!
//! let raster = GeoTiffRaster::open("scene.tif")?;
//! let grid = TileGrid::new(raster.descriptor(), PixelSize::new(40, 40), PixelSize::new(20, 20))?;
//! println!("{} tiles", grid.tile_count());
//!
//! let filter = TileFilter::all();
//! for (tile_index, upper_left) in grid.frames(&filter).take(3) {
//!     let frame = grid.pixel_frame_from_pixel_upper_left(upper_left);
//!     let array = raster.read(&frame, 0.0)?;
//!     println!("tile {tile_index}: {:?}", array.shape());
//! }
//! # Ok::<(), geotile_raster::RasterError>(())
//! ```

mod calibration;
mod descriptor;
mod error;
mod geometry;
mod geotiff;
mod grid;
mod metric;
mod source;

pub use calibration::CalibrationPack;
pub use descriptor::{normalize_projection, CoordinateWidth, RasterDescriptor, SampleType};
pub use error::RasterError;
pub use geometry::{PixelBounds, PixelFrame, PixelPoint, PixelSize};
pub use geotiff::{epsg_from_geo_keys, proj4_from_epsg, GeoTiffRaster};
pub use grid::{chop, TileCoordinates, TileFilter, TileFrames, TileGrid};
pub use metric::{
    is_geographic_projection, is_metric_projection, utm_projection, utm_zone_letter,
    utm_zone_number, MetricReprojection, PointTransform, Proj4Factory, TransformFactory,
    LONGLAT_WGS84,
};
pub use source::{MemoryRaster, RasterSource, TileArray};

/// Result type for raster operations.
pub type Result<T> = std::result::Result<T, RasterError>;
