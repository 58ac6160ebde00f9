//! The work behind each `geotile` subcommand.
//!
//! Each command reads its inputs, writes its stores into an output folder and
//! returns a serializable summary that the binary prints as JSON.

use geotile_dataset::{
    extract_bounds, extract_example_set, extract_tiles, random_centers, read_example_set,
    read_pool, sample_dataset, write_example_set, write_pool, BatchGroup, SamplingSummary,
    ARRAYS_NAME, DATASET_NAME, EXAMPLES_NAME,
};
use geotile_metrics::{describe_metrics, SummaryRecorder};
use geotile_raster::{
    CalibrationPack, CoordinateWidth, GeoTiffRaster, MetricReprojection, PixelBounds, PixelPoint,
    PixelSize, RasterSource, SampleType, TileFilter, TileGrid,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::SamplingConfig;
use crate::error::{Result, RunnerError};
use crate::parse::read_points;

/// Seeded random source, or one seeded from the OS when `seed` is `None`.
pub fn make_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

/// Install a [`SummaryRecorder`] as the global metrics recorder.
pub fn install_summary_recorder() -> Result<SummaryRecorder> {
    let recorder = SummaryRecorder::new();
    metrics::set_global_recorder(recorder.clone()).map_err(|_| RunnerError::RecorderInstalled)?;
    describe_metrics();
    Ok(recorder)
}

/// Write a metrics snapshot as JSON, to stdout when `path` is `-`.
pub fn write_metrics(recorder: &SummaryRecorder, path: &Path) -> Result<()> {
    let snapshot = recorder.snapshot();
    if path == Path::new("-") {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        info!(path = %path.display(), "Wrote metrics");
    }
    Ok(())
}

fn open_raster(image: &Path, projection: Option<&str>) -> Result<GeoTiffRaster> {
    let raster = match projection {
        Some(projection) => GeoTiffRaster::open_with_projection(image, projection)?,
        None => GeoTiffRaster::open(image)?,
    };
    Ok(raster)
}

/// Descriptor of a raster plus its extent in metric units.
#[derive(Debug, Clone, Serialize)]
pub struct RasterSummary {
    pub path: PathBuf,
    pub pixel_dimensions: PixelSize,
    pub band_count: usize,
    pub sample_type: SampleType,
    pub null_values: Vec<Option<f64>>,
    pub projection: String,
    pub calibration_pack: CalibrationPack,
    pub pixel_coordinate_width: CoordinateWidth,
    pub metric_projection: String,
    pub metric_dimensions: (f64, f64),
}

/// Describe a raster without reading tiles.
pub fn inspect(image: &Path, projection: Option<&str>) -> Result<RasterSummary> {
    let raster = open_raster(image, projection)?;
    let descriptor = raster.descriptor();
    let metric = MetricReprojection::new(descriptor)?;
    Ok(RasterSummary {
        path: image.to_path_buf(),
        pixel_dimensions: descriptor.pixel_dimensions,
        band_count: descriptor.band_count,
        sample_type: descriptor.sample_type,
        null_values: descriptor.null_values.clone(),
        projection: descriptor.projection.clone(),
        calibration_pack: descriptor.calibration,
        pixel_coordinate_width: descriptor.pixel_coordinate_width(),
        metric_projection: metric.metric_projection().to_string(),
        metric_dimensions: metric.to_metric_dimensions(descriptor.pixel_dimensions)?,
    })
}

/// Inputs of `geotile extract`.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub image: PathBuf,
    pub projection: Option<String>,
    /// Tile extent in metric units; without it the included bounds are read as one array.
    pub tile_dimensions: Option<(f64, f64)>,
    pub overlap_dimensions: (f64, f64),
    pub included_pixel_bounds: Option<PixelBounds>,
    pub output_folder: PathBuf,
    pub fill_value: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractSummary {
    pub array_count: usize,
    pub tile_pixel_dimensions: PixelSize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap_pixel_dimensions: Option<PixelSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tile_count: Option<u64>,
    pub arrays_path: PathBuf,
}

/// Cut a raster into tiles, or read a single window, into `arrays.json`.
pub fn extract(request: &ExtractRequest) -> Result<ExtractSummary> {
    let raster = open_raster(&request.image, request.projection.as_deref())?;
    let arrays_path = request.output_folder.join(ARRAYS_NAME);

    let Some(tile_dimensions) = request.tile_dimensions else {
        let bounds = request.included_pixel_bounds.ok_or_else(|| {
            RunnerError::ConfigError(
                "extract needs --tile-dimensions or --included-pixel-bounds".to_string(),
            )
        })?;
        let pool = extract_bounds(&raster, &bounds, request.fill_value)?;
        write_pool(&arrays_path, &pool)?;
        return Ok(ExtractSummary {
            array_count: pool.len(),
            tile_pixel_dimensions: pool.tile_dimensions().unwrap_or_default(),
            overlap_pixel_dimensions: None,
            tile_count: None,
            arrays_path,
        });
    };

    let descriptor = raster.descriptor();
    let metric = MetricReprojection::new(descriptor)?;
    let grid = TileGrid::from_metric_dimensions(
        descriptor,
        &metric,
        tile_dimensions,
        request.overlap_dimensions,
    )?;
    info!(
        tiles = grid.tile_count(),
        tile_width = grid.tile_dimensions().width,
        tile_height = grid.tile_dimensions().height,
        "Built tile grid"
    );

    let mut filter = TileFilter::all();
    if let Some(bounds) = request.included_pixel_bounds {
        filter = filter.with_pixel_bounds(bounds);
    }
    let pool = extract_tiles(&raster, &grid, &filter, request.fill_value)?;
    write_pool(&arrays_path, &pool)?;

    Ok(ExtractSummary {
        array_count: pool.len(),
        tile_pixel_dimensions: grid.tile_dimensions(),
        overlap_pixel_dimensions: Some(grid.overlap_dimensions()),
        tile_count: Some(grid.tile_count()),
        arrays_path,
    })
}

/// Inputs of `geotile examples`.
#[derive(Debug, Clone)]
pub struct ExamplesRequest {
    pub image: PathBuf,
    pub projection: Option<String>,
    pub tile_dimensions: (f64, f64),
    /// Projected `X,Y` points of positive examples, one per line.
    pub positive_points: PathBuf,
    /// Projected points of negative examples; random centers when absent.
    pub negative_points: Option<PathBuf>,
    pub negative_count: usize,
    pub output_folder: PathBuf,
    pub fill_value: f32,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExamplesSummary {
    pub positive_count: usize,
    pub negative_count: usize,
    pub skipped_points: usize,
    pub tile_pixel_dimensions: PixelSize,
    pub examples_path: PathBuf,
}

/// Pixel centers of the points that fall inside the raster.
fn pixel_centers(
    grid: &TileGrid,
    calibration: &CalibrationPack,
    raster_bounds: &PixelBounds,
    points: &[(f64, f64)],
) -> Result<(Vec<PixelPoint>, usize)> {
    let mut centers = Vec::with_capacity(points.len());
    let mut skipped = 0;
    for &point in points {
        let center = grid.pixel_frame_from_projected_center(calibration, point)?.pixel_center();
        let inside = (raster_bounds.min_x..raster_bounds.max_x).contains(&center.x)
            && (raster_bounds.min_y..raster_bounds.max_y).contains(&center.y);
        if inside {
            centers.push(center);
        } else {
            warn!(?point, ?center, "Skipping point outside raster");
            skipped += 1;
        }
    }
    Ok((centers, skipped))
}

/// Extract labeled examples around points into `examples.json`.
pub fn examples(request: &ExamplesRequest) -> Result<ExamplesSummary> {
    let raster = open_raster(&request.image, request.projection.as_deref())?;
    let descriptor = raster.descriptor();
    let metric = MetricReprojection::new(descriptor)?;
    let grid = TileGrid::from_metric_dimensions(descriptor, &metric, request.tile_dimensions, (0.0, 0.0))?;
    let raster_bounds = descriptor.pixel_bounds();

    let points = read_points(&request.positive_points)?;
    let (positive, mut skipped_points) =
        pixel_centers(&grid, &descriptor.calibration, &raster_bounds, &points)?;
    let negative = match &request.negative_points {
        Some(path) => {
            let points = read_points(path)?;
            let (centers, skipped) =
                pixel_centers(&grid, &descriptor.calibration, &raster_bounds, &points)?;
            skipped_points += skipped;
            centers
        }
        None => random_centers(&grid, request.negative_count, &mut make_rng(request.seed)),
    };

    let set = extract_example_set(&raster, &grid, &positive, &negative, request.fill_value)?;
    let examples_path = request.output_folder.join(EXAMPLES_NAME);
    write_example_set(&examples_path, &set)?;

    Ok(ExamplesSummary {
        positive_count: set.positive.len(),
        negative_count: set.negative.len(),
        skipped_points,
        tile_pixel_dimensions: grid.tile_dimensions(),
        examples_path,
    })
}

/// Inputs of `geotile dataset`.
#[derive(Debug, Clone)]
pub struct DatasetRequest {
    pub examples_path: PathBuf,
    pub config: SamplingConfig,
    pub output_folder: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    #[serde(flatten)]
    pub sampling: SamplingSummary,
    pub dataset_path: PathBuf,
}

/// Sample a balanced dataset from an example set into `dataset.json`.
pub fn dataset(request: &DatasetRequest) -> Result<DatasetSummary> {
    let set = read_example_set(&request.examples_path)?;
    let mut rng = make_rng(request.config.seed);
    let (dataset, sampling) = sample_dataset(&set, &request.config.options, &mut rng)?;
    let dataset_path = request.output_folder.join(DATASET_NAME);
    write_pool(&dataset_path, &dataset)?;
    info!(
        dataset_size = sampling.dataset_size,
        positive_fraction = sampling.positive_fraction,
        path = %dataset_path.display(),
        "Wrote dataset"
    );
    Ok(DatasetSummary {
        sampling,
        dataset_path,
    })
}

/// Inputs of `geotile batches`.
#[derive(Debug, Clone)]
pub struct BatchesRequest {
    pub dataset_paths: Vec<PathBuf>,
    pub batch_size: usize,
    pub seed: Option<u64>,
    /// Where to write the shuffled keys as JSON.
    pub keys_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub array_count: usize,
    pub array_shape: Option<[usize; 3]>,
    pub key_count: usize,
    pub batch_count: usize,
    pub positive_count: usize,
}

/// Draw padded, shuffled batch keys across several datasets.
pub fn batches(request: &BatchesRequest) -> Result<BatchSummary> {
    let sources = request
        .dataset_paths
        .iter()
        .map(read_pool)
        .collect::<geotile_dataset::Result<Vec<_>>>()?;
    let group = BatchGroup::new(sources);
    let keys = group.batch_keys(request.batch_size, &mut make_rng(request.seed))?;
    let labels = group.labels(&keys)?;

    if let Some(path) = &request.keys_path {
        std::fs::write(path, serde_json::to_string(&keys)?)?;
    }
    Ok(BatchSummary {
        array_count: group.array_count(),
        array_shape: group.array_shape(),
        key_count: keys.len(),
        batch_count: keys.len() / request.batch_size,
        positive_count: labels.iter().filter(|&&label| label).count(),
    })
}
