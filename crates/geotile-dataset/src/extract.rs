//! Reading example pools out of a raster.

use geotile_metrics::{metric_defs, metrics};
use geotile_raster::{
    PixelBounds, PixelFrame, PixelPoint, RasterDescriptor, RasterSource, TileFilter, TileGrid,
};
use rand::Rng;
use tracing::{debug, info};

use crate::pool::{ExamplePool, ExampleSet, LocationAttributes, LocationKind};
use crate::Result;

const PROGRESS_INTERVAL: usize = 1000;

fn location_attributes(descriptor: &RasterDescriptor) -> LocationAttributes {
    LocationAttributes {
        calibration_pack: descriptor.calibration,
        proj4: descriptor.projection.clone(),
    }
}

fn empty_pool(descriptor: &RasterDescriptor, kind: LocationKind) -> ExamplePool {
    ExamplePool::new(kind, descriptor.sample_type).with_attributes(location_attributes(descriptor))
}

/// Read every tile of `grid` accepted by `filter` into an unlabeled pool
/// keyed by pixel upper-left corners.
///
/// Null samples are replaced by `fill_value`.
pub fn extract_tiles<S>(
    source: &S,
    grid: &TileGrid,
    filter: &TileFilter,
    fill_value: f32,
) -> Result<ExamplePool>
where
    S: RasterSource + ?Sized,
{
    let descriptor = source.descriptor();
    let mut pool = empty_pool(descriptor, LocationKind::UpperLeft);
    metrics::gauge!(metric_defs::GRID_TILES.name).set(grid.tile_count() as f64);

    for (tile_index, pixel_upper_left) in grid.frames(filter) {
        let frame = grid.pixel_frame_from_pixel_upper_left(pixel_upper_left);
        let array = source.read_or_fill(&frame, fill_value)?;
        pool.push(array, None, pixel_upper_left)?;
        metrics::counter!(metric_defs::TILES_EXTRACTED.name).increment(1);
        if pool.len() % PROGRESS_INTERVAL == 0 {
            info!(tiles = pool.len(), tile_index, "Extracting tiles");
        }
    }

    debug!(
        tiles = pool.len(),
        grid_tiles = grid.tile_count(),
        columns = grid.column_count(),
        rows = grid.row_count(),
        "Extracted tiles"
    );
    Ok(pool)
}

/// Read the single window covered by `bounds` into a one-example pool keyed
/// by its pixel upper-left corner.
pub fn extract_bounds<S>(source: &S, bounds: &PixelBounds, fill_value: f32) -> Result<ExamplePool>
where
    S: RasterSource + ?Sized,
{
    let frame = PixelFrame::from_pixel_bounds(bounds)?;
    let mut pool = empty_pool(source.descriptor(), LocationKind::UpperLeft);
    let array = source.read(&frame, fill_value)?;
    pool.push(array, None, frame.upper_left)?;
    metrics::counter!(metric_defs::TILES_EXTRACTED.name).increment(1);
    debug!(?bounds, "Extracted window");
    Ok(pool)
}

/// Read one tile-sized example around each of `pixel_centers`, all with `label`.
///
/// Each frame is moved inside the raster so the example keeps the full tile
/// dimensions; the stored location is the center of the moved frame.
pub fn extract_at_centers<S>(
    source: &S,
    grid: &TileGrid,
    pixel_centers: &[PixelPoint],
    label: bool,
    fill_value: f32,
) -> Result<ExamplePool>
where
    S: RasterSource + ?Sized,
{
    let mut pool = empty_pool(source.descriptor(), LocationKind::Center);
    for &pixel_center in pixel_centers {
        let requested = grid.pixel_frame_from_pixel_center(pixel_center);
        let frame = grid.clamp_pixel_frame(requested);
        if frame != requested {
            debug!(?pixel_center, clamped = ?frame.pixel_center(), "Clamped example frame");
        }
        let array = source.read(&frame, fill_value)?;
        pool.push(array, Some(label), frame.pixel_center())?;
        if pool.len() % PROGRESS_INTERVAL == 0 {
            info!(examples = pool.len(), label, "Extracting examples");
        }
    }
    Ok(pool)
}

/// Draw `count` random pixel centers whose tiles lie entirely inside the raster.
pub fn random_centers<R: Rng + ?Sized>(grid: &TileGrid, count: usize, rng: &mut R) -> Vec<PixelPoint> {
    (0..count).map(|_| grid.random_pixel_center(rng)).collect()
}

/// Extract the positive and negative pools of one raster.
pub fn extract_example_set<S>(
    source: &S,
    grid: &TileGrid,
    positive_centers: &[PixelPoint],
    negative_centers: &[PixelPoint],
    fill_value: f32,
) -> Result<ExampleSet>
where
    S: RasterSource + ?Sized,
{
    let set = ExampleSet {
        positive: extract_at_centers(source, grid, positive_centers, true, fill_value)?,
        negative: extract_at_centers(source, grid, negative_centers, false, fill_value)?,
    };
    info!(
        positive = set.positive.len(),
        negative = set.negative.len(),
        "Extracted example set"
    );
    Ok(set)
}
