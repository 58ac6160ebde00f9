use geotile_dataset::DatasetError;
use geotile_raster::RasterError;
use thiserror::Error;

/// Errors that can occur while running a geotile command.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// A command-line value could not be parsed.
    #[error("Invalid {what} '{value}': expected {expected}")]
    InvalidArgument {
        what: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics recorder already installed")]
    RecorderInstalled,
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
