//! YAML task configuration for sampling runs.
//!
//! ```yaml
//! maximum_dataset_size: 1000
//! policy:
//!   kind: fraction_target
//!   positive_fraction: 0.5
//! excluded_pixel_bounds: [0, 0, 500, 500]
//! batch_size: 32
//! selection_order: truncate_then_filter
//! seed: 42
//! ```
//!
//! Every field is optional; command-line flags override the file.

use geotile_dataset::{BalancePolicy, SamplingOptions, SelectionOrder};
use geotile_raster::PixelBounds;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{Result, RunnerError};

/// A sampling run: options plus the seed of its random source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(flatten)]
    pub options: SamplingOptions,
    /// Seed for shuffling; drawn from the OS when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

/// Values given on the command line, each replacing the file's value when set.
#[derive(Debug, Clone, Default)]
pub struct SamplingOverrides {
    pub maximum_dataset_size: Option<usize>,
    pub positive_fraction: Option<f64>,
    pub preserve_ratio: bool,
    pub excluded_pixel_bounds: Option<PixelBounds>,
    pub batch_size: Option<usize>,
    pub selection_order: Option<SelectionOrder>,
    pub seed: Option<u64>,
}

impl SamplingConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&text)?;
        debug!(path = %path.display(), ?config, "Loaded sampling configuration");
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, overrides: &SamplingOverrides) -> Result<Self> {
        if overrides.preserve_ratio && overrides.positive_fraction.is_some() {
            return Err(RunnerError::ConfigError(
                "--preserve-ratio cannot be combined with --positive-fraction".to_string(),
            ));
        }
        let options = &mut self.options;
        if let Some(size) = overrides.maximum_dataset_size {
            options.maximum_dataset_size = Some(size);
        }
        if overrides.preserve_ratio {
            options.policy = BalancePolicy::PreserveRatio;
        }
        if let Some(fraction) = overrides.positive_fraction {
            options.policy = BalancePolicy::FractionTarget {
                positive_fraction: Some(fraction),
            };
        }
        if let Some(bounds) = overrides.excluded_pixel_bounds {
            options.excluded_pixel_bounds = Some(bounds);
        }
        if let Some(batch_size) = overrides.batch_size {
            options.batch_size = Some(batch_size);
        }
        if let Some(order) = overrides.selection_order {
            options.selection_order = order;
        }
        if let Some(seed) = overrides.seed {
            self.seed = Some(seed);
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if self.options.batch_size == Some(0) {
            return Err(RunnerError::ConfigError("batch_size must be positive".to_string()));
        }
        if let BalancePolicy::FractionTarget {
            positive_fraction: Some(fraction),
        } = self.options.policy
        {
            if !(0.0..=1.0).contains(&fraction) {
                return Err(RunnerError::ConfigError(format!(
                    "positive_fraction {fraction} is outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}
