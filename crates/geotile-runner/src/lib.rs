//! # geotile-runner
//!
//! Library side of the `geotile` command-line tool: YAML sampling
//! configuration, parsing of command-line values and the implementation of
//! each subcommand.
//!
//! | Command    | Reads              | Writes          |
//! |------------|--------------------|-----------------|
//! | `inspect`  | GeoTIFF            | (stdout only)   |
//! | `extract`  | GeoTIFF            | `arrays.json`   |
//! | `examples` | GeoTIFF, points    | `examples.json` |
//! | `dataset`  | `examples.json`    | `dataset.json`  |
//! | `batches`  | `dataset.json` ... | batch keys      |

pub mod commands;
pub mod config;
pub mod error;
pub mod parse;

pub use config::{SamplingConfig, SamplingOverrides};
pub use error::{Result, RunnerError};
