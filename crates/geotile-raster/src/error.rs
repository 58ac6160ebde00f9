//! Error types for the raster crate.

use thiserror::Error;

/// Errors that can occur when calibrating, reprojecting, tiling or reading rasters.
#[derive(Debug, Error)]
pub enum RasterError {
    /// I/O error reading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    TiffDecode(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing or malformed georeferencing tags.
    #[error("Invalid GeoTIFF: {0}")]
    InvalidGeoTiff(String),

    /// The raster declares a coordinate reference system we cannot express as a proj4 string.
    #[error("Unsupported projection: {0}")]
    UnsupportedProjection(String),

    /// The affine matrix of the calibration pack cannot be inverted.
    #[error("Degenerate calibration pack {pack:?} (determinant is zero)")]
    DegenerateCalibration {
        /// The offending coefficients.
        pack: [f64; 6],
    },

    /// No coordinate transform could be built (or applied) between two projections.
    #[error("Cannot reproject from `{source_proj}` to `{target_proj}`: {reason}")]
    Reprojection {
        /// Source projection string.
        source_proj: String,
        /// Target projection string.
        target_proj: String,
        /// Reason reported by the projection library.
        reason: String,
    },

    /// Overlap is not strictly smaller than the tile on some axis.
    #[error("Invalid tile configuration: tile {tile_width}x{tile_height}, overlap {overlap_width}x{overlap_height}")]
    InvalidTileConfig {
        /// Tile width in pixels.
        tile_width: i64,
        /// Tile height in pixels.
        tile_height: i64,
        /// Overlap width in pixels.
        overlap_width: i64,
        /// Overlap height in pixels.
        overlap_height: i64,
    },

    /// The raster cannot hold a single tile.
    #[error("Raster {raster_width}x{raster_height} is smaller than tile {tile_width}x{tile_height}")]
    RasterTooSmall {
        /// Raster width in pixels.
        raster_width: i64,
        /// Raster height in pixels.
        raster_height: i64,
        /// Tile width in pixels.
        tile_width: i64,
        /// Tile height in pixels.
        tile_height: i64,
    },

    /// The requested pixel frame does not overlap the raster.
    #[error("Pixel frame at ({x}, {y}) with size {width}x{height} does not overlap the raster")]
    FrameOutOfBounds {
        /// Upper-left x.
        x: i64,
        /// Upper-left y.
        y: i64,
        /// Frame width.
        width: i64,
        /// Frame height.
        height: i64,
    },

    /// Negative or otherwise unusable dimensions.
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),
}
