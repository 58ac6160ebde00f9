//! Balanced dataset sampling from positive and negative pools.
//!
//! A sampling run is a pure function of its inputs and the random source
//! passed in:
//!
//! 1. [`select_indices`] keeps the usable examples of each pool.
//! 2. [`adjust_counts`] picks how many positives and negatives to take.
//! 3. [`fit_indices`] (fraction target) or [`truncate_indices`] (ratio
//!    preserving) sizes each index list.
//! 4. [`assemble`] shuffles the labeled indices and copies the examples.

use geotile_metrics::{metric_defs, metrics, MetricLabels};
use geotile_raster::PixelBounds;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::pool::{ExamplePool, ExampleSet};
use crate::{DatasetError, Result};

/// Examples written between progress events.
const PROGRESS_INTERVAL: usize = 1000;

/// Whether `maximum_size` limits candidates before or after filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrder {
    /// Only the first `maximum_size` stored examples are candidates.
    #[default]
    TruncateThenFilter,
    /// Filter the whole pool, then keep the first `maximum_size` survivors.
    FilterThenTruncate,
}

/// How positive and negative counts are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalancePolicy {
    /// Hit a positive fraction (the natural ratio when unset), padding by repetition.
    FractionTarget {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        positive_fraction: Option<f64>,
    },
    /// Keep the natural ratio, shrinking both pools proportionally.
    PreserveRatio,
}

impl Default for BalancePolicy {
    fn default() -> Self {
        BalancePolicy::FractionTarget {
            positive_fraction: None,
        }
    }
}

/// Parameters of a sampling run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingOptions {
    pub maximum_dataset_size: Option<usize>,
    pub policy: BalancePolicy,
    pub excluded_pixel_bounds: Option<PixelBounds>,
    pub batch_size: Option<usize>,
    pub selection_order: SelectionOrder,
}

/// Number of examples to take from each pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExampleCounts {
    pub positive: usize,
    pub negative: usize,
}

impl ExampleCounts {
    pub fn total(&self) -> usize {
        self.positive + self.negative
    }
}

/// Result of a sampling run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingSummary {
    pub dataset_size: usize,
    pub positive_count: usize,
    pub negative_count: usize,
    pub positive_fraction: f64,
}

/// Indices of the usable examples of `pool`, in storage order.
///
/// Examples whose arrays are entirely zero are dropped. When
/// `excluded_pixel_bounds` is given, examples whose tile box touches it are
/// dropped as well, and `maximum_size` limits the result according to
/// `order`. Without exclusion bounds the dataset size is capped later by
/// [`adjust_counts`] instead.
pub fn select_indices(
    pool: &ExamplePool,
    pool_name: &str,
    maximum_size: Option<usize>,
    excluded_pixel_bounds: Option<&PixelBounds>,
    order: SelectionOrder,
) -> Vec<usize> {
    let limit = match (excluded_pixel_bounds, maximum_size) {
        (Some(_), Some(maximum_size)) => maximum_size,
        _ => pool.len(),
    };
    let candidate_count = match order {
        SelectionOrder::TruncateThenFilter => limit.min(pool.len()),
        SelectionOrder::FilterThenTruncate => pool.len(),
    };
    let tile_dimensions = pool.tile_dimensions().unwrap_or_default();

    let mut skipped_empty = 0u64;
    let mut excluded = 0u64;
    let mut indices = Vec::new();
    for (index, array) in pool.arrays().iter().enumerate().take(candidate_count) {
        if array.is_all_zero() {
            skipped_empty += 1;
            continue;
        }
        if let Some(bounds) = excluded_pixel_bounds {
            let touches = pool
                .locations()
                .tile_bounds(index, tile_dimensions)
                .is_some_and(|tile| tile.intersects(bounds));
            if touches {
                excluded += 1;
                continue;
            }
        }
        indices.push(index);
    }
    if order == SelectionOrder::FilterThenTruncate {
        indices.truncate(limit);
    }

    let labels = MetricLabels::new(pool_name).to_labels();
    metrics::counter!(metric_defs::EXAMPLES_SKIPPED_EMPTY.name, &labels).increment(skipped_empty);
    metrics::counter!(metric_defs::EXAMPLES_EXCLUDED.name, &labels).increment(excluded);
    metrics::counter!(metric_defs::EXAMPLES_SELECTED.name, &labels).increment(indices.len() as u64);
    debug!(
        pool = pool_name,
        selected = indices.len(),
        skipped_empty,
        excluded,
        "Selected examples"
    );
    indices
}

/// Decide how many positive and negative examples a dataset gets.
pub fn adjust_counts(
    positive_count: usize,
    negative_count: usize,
    maximum_size: Option<usize>,
    policy: &BalancePolicy,
    batch_size: Option<usize>,
) -> Result<ExampleCounts> {
    let total = positive_count + negative_count;
    let size = maximum_size.unwrap_or(total).min(total);

    match *policy {
        BalancePolicy::FractionTarget { positive_fraction } => {
            let size = match batch_size {
                Some(0) => return Err(DatasetError::InvalidBatchSize(0)),
                Some(batch) => size.div_ceil(batch) * batch,
                None => size,
            };
            let fraction = match positive_fraction {
                Some(f) if f.is_nan() => return Err(DatasetError::InvalidPositiveFraction(f)),
                Some(f) => f.clamp(0.0, 1.0),
                None if total == 0 => 0.0,
                None => positive_count as f64 / total as f64,
            };
            // f64::round rounds half away from zero
            let positive = (fraction * size as f64).round() as usize;
            Ok(ExampleCounts {
                positive,
                negative: size - positive,
            })
        }
        BalancePolicy::PreserveRatio => {
            if size == total {
                return Ok(ExampleCounts {
                    positive: positive_count,
                    negative: negative_count,
                });
            }
            let positive = positive_count * size / total;
            Ok(ExampleCounts {
                positive,
                negative: size - positive,
            })
        }
    }
}

/// Exactly `count` indices, repeating `indices` cyclically when it is too short.
pub fn fit_indices(indices: &[usize], count: usize, pool_name: &str) -> Result<Vec<usize>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if indices.is_empty() {
        return Err(DatasetError::InsufficientExamples {
            pool: pool_name.to_string(),
            requested: count,
        });
    }
    Ok(indices.iter().copied().cycle().take(count).collect())
}

/// At most `count` leading indices.
pub fn truncate_indices(indices: &[usize], count: usize) -> Vec<usize> {
    indices[..count.min(indices.len())].to_vec()
}

/// Copy the chosen examples into a new labeled pool in shuffled order.
///
/// Locations keep the positive pool's naming and attributes, and arrays keep
/// its sample type.
pub fn assemble<R: Rng + ?Sized>(
    set: &ExampleSet,
    positive_indices: &[usize],
    negative_indices: &[usize],
    rng: &mut R,
) -> Result<ExamplePool> {
    let mut packs: Vec<(usize, bool)> = positive_indices
        .iter()
        .map(|&i| (i, true))
        .chain(negative_indices.iter().map(|&i| (i, false)))
        .collect();
    packs.shuffle(rng);

    let source = &set.positive;
    let mut dataset = ExamplePool::new(source.location_kind(), source.sample_type());
    if let Some(attributes) = source.attributes() {
        dataset = dataset.with_attributes(attributes.clone());
    }

    let last = packs.len().saturating_sub(1);
    for (index, &(inner_index, label)) in packs.iter().enumerate() {
        if index % PROGRESS_INTERVAL == 0 {
            info!("{} / {}", index, last);
        }
        let pool = set.pool(label);
        dataset.push(
            pool.array(inner_index)?.clone(),
            Some(label),
            pool.location(inner_index)?,
        )?;
    }
    info!("{} / {}", packs.len().saturating_sub(1), last);

    metrics::counter!(metric_defs::EXAMPLES_WRITTEN.name).increment(packs.len() as u64);
    Ok(dataset)
}

/// Run a full sampling pass over an example set.
pub fn sample_dataset<R: Rng + ?Sized>(
    set: &ExampleSet,
    options: &SamplingOptions,
    rng: &mut R,
) -> Result<(ExamplePool, SamplingSummary)> {
    let select = |pool: &ExamplePool, name: &str| {
        select_indices(
            pool,
            name,
            options.maximum_dataset_size,
            options.excluded_pixel_bounds.as_ref(),
            options.selection_order,
        )
    };
    let positive_indices = select(&set.positive, "positive");
    let negative_indices = select(&set.negative, "negative");

    let counts = adjust_counts(
        positive_indices.len(),
        negative_indices.len(),
        options.maximum_dataset_size,
        &options.policy,
        options.batch_size,
    )?;
    info!(
        eligible_positive = positive_indices.len(),
        eligible_negative = negative_indices.len(),
        positive = counts.positive,
        negative = counts.negative,
        "Balanced example counts"
    );

    let (positive_indices, negative_indices) = match options.policy {
        BalancePolicy::FractionTarget { .. } => (
            fit_indices(&positive_indices, counts.positive, "positive")?,
            fit_indices(&negative_indices, counts.negative, "negative")?,
        ),
        BalancePolicy::PreserveRatio => (
            truncate_indices(&positive_indices, counts.positive),
            truncate_indices(&negative_indices, counts.negative),
        ),
    };

    let dataset = assemble(set, &positive_indices, &negative_indices, rng)?;
    let dataset_size = dataset.len();
    let positive_fraction = if dataset_size == 0 {
        0.0
    } else {
        positive_indices.len() as f64 / dataset_size as f64
    };
    metrics::histogram!(metric_defs::DATASET_POSITIVE_FRACTION.name).record(positive_fraction);

    Ok((
        dataset,
        SamplingSummary {
            dataset_size,
            positive_count: positive_indices.len(),
            negative_count: negative_indices.len(),
            positive_fraction,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::LocationKind;
    use geotile_raster::{PixelPoint, SampleType, TileArray};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    /// Pool of 4x4 single-band arrays centered at `(10 * i, 0)`; `empty` lists all-zero examples.
    fn pool(count: usize, label: bool, empty: &[usize]) -> ExamplePool {
        let mut pool = ExamplePool::new(LocationKind::Center, SampleType::U8);
        for i in 0..count {
            let value = if empty.contains(&i) { 0.0 } else { i as f32 + 1.0 };
            pool.push(
                TileArray::filled(4, 4, 1, value),
                Some(label),
                PixelPoint::new(10 * i as i64, 0),
            )
            .unwrap();
        }
        pool
    }

    #[test]
    fn test_fraction_target_counts() {
        let policy = BalancePolicy::FractionTarget {
            positive_fraction: Some(0.5),
        };
        let counts = adjust_counts(100, 50, Some(90), &policy, Some(10)).unwrap();
        assert_eq!(counts, ExampleCounts { positive: 45, negative: 45 });
    }

    #[test]
    fn test_fraction_target_rounds_up_to_batch() {
        let policy = BalancePolicy::default();
        let counts = adjust_counts(30, 10, Some(33), &policy, Some(8)).unwrap();
        assert_eq!(counts.total(), 40);
        // Natural ratio 0.75 of 40
        assert_eq!(counts.positive, 30);
    }

    #[test]
    fn test_fraction_is_clamped() {
        let policy = BalancePolicy::FractionTarget {
            positive_fraction: Some(1.7),
        };
        let counts = adjust_counts(10, 10, None, &policy, None).unwrap();
        assert_eq!(counts, ExampleCounts { positive: 20, negative: 0 });

        let policy = BalancePolicy::FractionTarget {
            positive_fraction: Some(-0.2),
        };
        let counts = adjust_counts(10, 10, None, &policy, None).unwrap();
        assert_eq!(counts, ExampleCounts { positive: 0, negative: 20 });
    }

    #[test]
    fn test_fraction_rounds_half_away_from_zero() {
        let policy = BalancePolicy::FractionTarget {
            positive_fraction: Some(0.5),
        };
        let counts = adjust_counts(3, 2, Some(5), &policy, None).unwrap();
        assert_eq!(counts, ExampleCounts { positive: 3, negative: 2 });
    }

    #[test]
    fn test_invalid_counts_inputs() {
        let policy = BalancePolicy::default();
        assert!(matches!(
            adjust_counts(1, 1, None, &policy, Some(0)),
            Err(DatasetError::InvalidBatchSize(0))
        ));
        let policy = BalancePolicy::FractionTarget {
            positive_fraction: Some(f64::NAN),
        };
        assert!(matches!(
            adjust_counts(1, 1, None, &policy, None),
            Err(DatasetError::InvalidPositiveFraction(_))
        ));
    }

    #[test]
    fn test_preserve_ratio_counts() {
        let counts = adjust_counts(30, 70, Some(50), &BalancePolicy::PreserveRatio, None).unwrap();
        assert_eq!(counts, ExampleCounts { positive: 15, negative: 35 });
    }

    #[test]
    fn test_preserve_ratio_without_shrinkage() {
        let counts = adjust_counts(3, 7, Some(50), &BalancePolicy::PreserveRatio, Some(4)).unwrap();
        assert_eq!(counts, ExampleCounts { positive: 3, negative: 7 });
    }

    #[test]
    fn test_fit_indices_tiles() {
        assert_eq!(
            fit_indices(&[1, 2, 3], 8, "positive").unwrap(),
            vec![1, 2, 3, 1, 2, 3, 1, 2]
        );
        assert_eq!(fit_indices(&[1, 2, 3], 2, "positive").unwrap(), vec![1, 2]);
        assert!(fit_indices(&[], 0, "positive").unwrap().is_empty());
        assert!(matches!(
            fit_indices(&[], 1, "negative"),
            Err(DatasetError::InsufficientExamples { requested: 1, .. })
        ));
    }

    #[test]
    fn test_truncate_indices() {
        assert_eq!(truncate_indices(&[4, 5, 6], 2), vec![4, 5]);
        assert_eq!(truncate_indices(&[4], 3), vec![4]);
    }

    #[test]
    fn test_select_skips_empty_arrays() {
        let pool = pool(6, true, &[1, 4]);
        let indices = select_indices(&pool, "positive", None, None, SelectionOrder::default());
        assert_eq!(indices, vec![0, 2, 3, 5]);
    }

    #[test]
    fn test_select_excludes_touching_tiles() {
        // Tile i covers x in [10i - 2, 10i + 2], y in [-2, 2].
        let pool = pool(5, true, &[]);
        // Touches tile 1 on its right edge and tile 2 on its left edge.
        let bounds = PixelBounds::new(12, 0, 18, 1);
        let indices =
            select_indices(&pool, "positive", None, Some(&bounds), SelectionOrder::default());
        assert_eq!(indices, vec![0, 3, 4]);

        // One pixel away from tile 3 on the y axis.
        let bounds = PixelBounds::new(30, 3, 31, 9);
        let indices =
            select_indices(&pool, "positive", None, Some(&bounds), SelectionOrder::default());
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_selection_order() {
        let pool = pool(6, true, &[0, 1]);
        let far_away = PixelBounds::new(1000, 1000, 1001, 1001);
        let truncated = select_indices(
            &pool,
            "positive",
            Some(3),
            Some(&far_away),
            SelectionOrder::TruncateThenFilter,
        );
        assert_eq!(truncated, vec![2]);
        let filtered = select_indices(
            &pool,
            "positive",
            Some(3),
            Some(&far_away),
            SelectionOrder::FilterThenTruncate,
        );
        assert_eq!(filtered, vec![2, 3, 4]);

        // The maximum only applies together with exclusion bounds.
        let unbounded =
            select_indices(&pool, "positive", Some(3), None, SelectionOrder::TruncateThenFilter);
        assert_eq!(unbounded, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_assemble_is_deterministic_for_a_seed() {
        let set = ExampleSet {
            positive: pool(5, true, &[]),
            negative: pool(5, false, &[]),
        };
        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut rng2 = ChaCha8Rng::seed_from_u64(42);
        let a = assemble(&set, &[0, 1, 2], &[3, 4], &mut rng1).unwrap();
        let b = assemble(&set, &[0, 1, 2], &[3, 4], &mut rng2).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert_eq!(a.labels().iter().filter(|&&l| l).count(), 3);
    }

    #[test]
    fn test_assemble_copies_matching_examples() {
        let set = ExampleSet {
            positive: pool(3, true, &[]),
            negative: pool(3, false, &[]),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let dataset = assemble(&set, &[2], &[0, 1], &mut rng).unwrap();
        for i in 0..dataset.len() {
            let location = dataset.location(i).unwrap();
            let source = (location.x / 10) as usize;
            assert_eq!(dataset.array(i).unwrap(), set.pool(dataset.label(i).unwrap()).array(source).unwrap());
        }
        assert_eq!(dataset.location_kind(), LocationKind::Center);
    }

    #[test]
    fn test_assemble_rejects_missing_index() {
        let set = ExampleSet {
            positive: pool(1, true, &[]),
            negative: pool(1, false, &[]),
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(
            assemble(&set, &[0], &[9], &mut rng),
            Err(DatasetError::IndexOutOfRange { index: 9, len: 1 })
        ));
    }

    #[test]
    fn test_sample_dataset_fraction_target() {
        let set = ExampleSet {
            positive: pool(3, true, &[]),
            negative: pool(12, false, &[5]),
        };
        let options = SamplingOptions {
            maximum_dataset_size: Some(10),
            policy: BalancePolicy::FractionTarget {
                positive_fraction: Some(0.5),
            },
            batch_size: Some(4),
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (dataset, summary) = sample_dataset(&set, &options, &mut rng).unwrap();
        // Eligible: 3 positive, 11 negative; the size cap of 10 rounds up to 12.
        assert_eq!(
            summary,
            SamplingSummary {
                dataset_size: 12,
                positive_count: 6,
                negative_count: 6,
                positive_fraction: 0.5,
            }
        );
        assert_eq!(dataset.len(), 12);
        // Positives are repeated to reach six.
        assert_eq!(dataset.labels().iter().filter(|&&l| l).count(), 6);
        assert!(dataset.arrays().iter().all(|a| !a.is_all_zero()));
    }

    #[test]
    fn test_sample_dataset_preserve_ratio() {
        let set = ExampleSet {
            positive: pool(30, true, &[]),
            negative: pool(70, false, &[]),
        };
        let options = SamplingOptions {
            maximum_dataset_size: Some(50),
            policy: BalancePolicy::PreserveRatio,
            selection_order: SelectionOrder::FilterThenTruncate,
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let (dataset, summary) = sample_dataset(&set, &options, &mut rng).unwrap();
        assert_eq!(summary.positive_count, 15);
        assert_eq!(summary.negative_count, 35);
        assert_eq!(dataset.len(), 50);
    }

    #[test]
    fn test_sample_dataset_fails_on_empty_pool() {
        let set = ExampleSet {
            positive: pool(4, true, &[0, 1, 2, 3]),
            negative: pool(4, false, &[]),
        };
        let options = SamplingOptions {
            policy: BalancePolicy::FractionTarget {
                positive_fraction: Some(0.5),
            },
            ..Default::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert!(matches!(
            sample_dataset(&set, &options, &mut rng),
            Err(DatasetError::InsufficientExamples { .. })
        ));
    }
}
