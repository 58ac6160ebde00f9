//! `geotile`: extract tiles and labeled examples from GeoTIFF rasters, then
//! sample balanced datasets and batches from them.

use clap::{Args, Parser, Subcommand, ValueEnum};
use geotile_dataset::SelectionOrder;
use geotile_raster::PixelBounds;
use geotile_runner::commands::{
    self, BatchesRequest, DatasetRequest, ExamplesRequest, ExtractRequest,
};
use geotile_runner::parse::{parse_bounds, parse_dimensions};
use geotile_runner::{Result, SamplingConfig, SamplingOverrides};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "geotile")]
#[command(about = "Tile GeoTIFF rasters into balanced, batched training datasets")]
#[command(version)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write a JSON metrics summary to this file ("-" for stdout)
    #[arg(long, global = true, value_name = "FILE")]
    metrics_output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Describe a raster: dimensions, bands, projection and calibration
    Inspect(RasterArgs),
    /// Cut a raster into tiles (or read one window) into arrays.json
    Extract(ExtractArgs),
    /// Extract labeled examples around points into examples.json
    Examples(ExamplesArgs),
    /// Sample a balanced dataset from examples.json into dataset.json
    Dataset(DatasetArgs),
    /// Draw shuffled batch keys across datasets
    Batches(BatchesArgs),
}

#[derive(Args, Debug)]
struct RasterArgs {
    /// GeoTIFF image
    #[arg(long, value_name = "PATH")]
    image_path: PathBuf,

    /// proj4 projection overriding the one stored in the image
    #[arg(long, value_name = "PROJ4")]
    projection: Option<String>,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    #[command(flatten)]
    raster: RasterArgs,

    /// Dimensions of each tile in metric units
    #[arg(long, value_name = "WIDTH,HEIGHT", value_parser = dimensions)]
    tile_dimensions: Option<(f64, f64)>,

    /// Dimensions of tile overlap in metric units
    #[arg(long, value_name = "WIDTH,HEIGHT", value_parser = dimensions, default_value = "0,0")]
    overlap_dimensions: (f64, f64),

    /// Only extract tiles touching these pixel bounds
    #[arg(long, value_name = "MIN_X,MIN_Y,MAX_X,MAX_Y", value_parser = bounds)]
    included_pixel_bounds: Option<PixelBounds>,

    /// Value written for null pixels and padding
    #[arg(long, default_value_t = 0.0)]
    fill_value: f32,

    /// Output folder
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ExamplesArgs {
    #[command(flatten)]
    raster: RasterArgs,

    /// Dimensions of each example in metric units
    #[arg(long, value_name = "WIDTH,HEIGHT", value_parser = dimensions)]
    tile_dimensions: (f64, f64),

    /// File of projected X,Y points, one per line, marking positive examples
    #[arg(long, value_name = "PATH")]
    positive_points: PathBuf,

    /// File of projected X,Y points marking negative examples
    #[arg(long, value_name = "PATH", conflicts_with = "negative_count")]
    negative_points: Option<PathBuf>,

    /// Number of random negative examples when no negative points are given
    #[arg(long, default_value_t = 100)]
    negative_count: usize,

    /// Value written for null pixels
    #[arg(long, default_value_t = 0.0)]
    fill_value: f32,

    /// Random seed for negative centers
    #[arg(long)]
    seed: Option<u64>,

    /// Output folder
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OrderArg {
    TruncateThenFilter,
    FilterThenTruncate,
}

impl From<OrderArg> for SelectionOrder {
    fn from(order: OrderArg) -> Self {
        match order {
            OrderArg::TruncateThenFilter => SelectionOrder::TruncateThenFilter,
            OrderArg::FilterThenTruncate => SelectionOrder::FilterThenTruncate,
        }
    }
}

#[derive(Args, Debug)]
struct DatasetArgs {
    /// Example set written by `geotile examples`
    #[arg(long, value_name = "PATH")]
    examples_path: PathBuf,

    /// YAML sampling configuration
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum number of examples before batch rounding
    #[arg(long)]
    maximum_dataset_size: Option<usize>,

    /// Target fraction of positive examples
    #[arg(long)]
    positive_fraction: Option<f64>,

    /// Keep the natural positive ratio instead of targeting a fraction
    #[arg(long, conflicts_with = "positive_fraction")]
    preserve_ratio: bool,

    /// Drop examples whose tiles touch these pixel bounds
    #[arg(long, value_name = "MIN_X,MIN_Y,MAX_X,MAX_Y", value_parser = bounds)]
    excluded_pixel_bounds: Option<PixelBounds>,

    /// Round the dataset size up to a multiple of this
    #[arg(long)]
    batch_size: Option<usize>,

    /// Whether the size limit applies before or after exclusion
    #[arg(long, value_enum)]
    selection_order: Option<OrderArg>,

    /// Random seed for shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Output folder
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct BatchesArgs {
    /// Datasets written by `geotile dataset`
    #[arg(required = true, value_name = "PATH")]
    dataset_paths: Vec<PathBuf>,

    /// Number of examples per batch
    #[arg(long)]
    batch_size: usize,

    /// Random seed for shuffling
    #[arg(long)]
    seed: Option<u64>,

    /// Write the shuffled keys to this JSON file
    #[arg(long, value_name = "FILE")]
    keys_output: Option<PathBuf>,
}

fn dimensions(value: &str) -> std::result::Result<(f64, f64), String> {
    parse_dimensions(value).map_err(|e| e.to_string())
}

fn bounds(value: &str) -> std::result::Result<PixelBounds, String> {
    parse_bounds(value).map_err(|e| e.to_string())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Inspect(args) => {
            print_json(&commands::inspect(&args.image_path, args.projection.as_deref())?)
        }
        Command::Extract(args) => {
            let request = ExtractRequest {
                image: args.raster.image_path,
                projection: args.raster.projection,
                tile_dimensions: args.tile_dimensions,
                overlap_dimensions: args.overlap_dimensions,
                included_pixel_bounds: args.included_pixel_bounds,
                output_folder: args.output,
                fill_value: args.fill_value,
            };
            print_json(&commands::extract(&request)?)
        }
        Command::Examples(args) => {
            let request = ExamplesRequest {
                image: args.raster.image_path,
                projection: args.raster.projection,
                tile_dimensions: args.tile_dimensions,
                positive_points: args.positive_points,
                negative_points: args.negative_points,
                negative_count: args.negative_count,
                output_folder: args.output,
                fill_value: args.fill_value,
                seed: args.seed,
            };
            print_json(&commands::examples(&request)?)
        }
        Command::Dataset(args) => {
            let config = match &args.config {
                Some(path) => SamplingConfig::load(path)?,
                None => SamplingConfig::default(),
            };
            let overrides = SamplingOverrides {
                maximum_dataset_size: args.maximum_dataset_size,
                positive_fraction: args.positive_fraction,
                preserve_ratio: args.preserve_ratio,
                excluded_pixel_bounds: args.excluded_pixel_bounds,
                batch_size: args.batch_size,
                selection_order: args.selection_order.map(SelectionOrder::from),
                seed: args.seed,
            };
            let request = DatasetRequest {
                examples_path: args.examples_path,
                config: config.with_overrides(&overrides)?,
                output_folder: args.output,
            };
            print_json(&commands::dataset(&request)?)
        }
        Command::Batches(args) => {
            let request = BatchesRequest {
                dataset_paths: args.dataset_paths,
                batch_size: args.batch_size,
                seed: args.seed,
                keys_path: args.keys_output,
            };
            print_json(&commands::batches(&request)?)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let recorder = match &cli.metrics_output {
        Some(_) => match commands::install_summary_recorder() {
            Ok(recorder) => Some(recorder),
            Err(e) => {
                error!("{e}");
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let result = run(cli.command).and_then(|()| match (&recorder, &cli.metrics_output) {
        (Some(recorder), Some(path)) => commands::write_metrics(recorder, path),
        _ => Ok(()),
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
