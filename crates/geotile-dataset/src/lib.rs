//! # geotile-dataset
//!
//! Labeled example pools, balanced dataset sampling and batching.
//!
//! - [`extract`](extract_tiles): cut tiles or labeled examples out of a
//!   [`RasterSource`](geotile_raster::RasterSource) into an [`ExamplePool`]
//! - [`sample_dataset`]: select usable examples from the positive and negative
//!   pools of an [`ExampleSet`] and assemble a shuffled, balanced dataset
//! - [`BatchGroup`]: draw padded, shuffled batch keys across several datasets
//! - [`read_pool`] / [`write_pool`]: JSON persistence of pools and example sets
//!
//! ## Example
//!
//! ```no_run
//! use geotile_dataset::{read_example_set, sample_dataset, write_pool, SamplingOptions};
//! use rand::SeedableRng;
//!
//! let set = read_example_set("examples.json")?;
//! let options = SamplingOptions {
//!     maximum_dataset_size: Some(1000),
//!     ..Default::default()
//! };
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//! let (dataset, summary) = sample_dataset(&set, &options, &mut rng)?;
//! println!("{} examples, {:.2} positive", summary.dataset_size, summary.positive_fraction);
//! write_pool("dataset.json", &dataset)?;
//! # Ok::<(), geotile_dataset::DatasetError>(())
//! ```

mod batch;
mod error;
mod extract;
mod pool;
mod sampler;
mod store;

pub use batch::{BatchGroup, BatchKey};
pub use error::DatasetError;
pub use extract::{
    extract_at_centers, extract_bounds, extract_example_set, extract_tiles, random_centers,
};
pub use pool::{ExamplePool, ExampleSet, LocationAttributes, LocationKind, PixelLocations};
pub use sampler::{
    adjust_counts, assemble, fit_indices, sample_dataset, select_indices, truncate_indices,
    BalancePolicy, ExampleCounts, SamplingOptions, SamplingSummary, SelectionOrder,
};
pub use store::{
    read_example_set, read_pool, write_example_set, write_pool, ARRAYS_NAME, DATASET_NAME,
    EXAMPLES_NAME,
};

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;
