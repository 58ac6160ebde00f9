//! Fixed-size batches drawn across several datasets.

use geotile_metrics::{metric_defs, metrics};
use geotile_raster::{PixelPoint, TileArray};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pool::ExamplePool;
use crate::{DatasetError, Result};

/// Position of one example: which source, and which example within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchKey {
    pub source: usize,
    pub index: usize,
}

impl BatchKey {
    pub const fn new(source: usize, index: usize) -> Self {
        Self { source, index }
    }
}

/// Several datasets read together as one corpus.
#[derive(Debug, Clone)]
pub struct BatchGroup {
    sources: Vec<ExamplePool>,
    array_shape: Option<[usize; 3]>,
    array_count: usize,
}

impl BatchGroup {
    /// Group `sources`, computing the common array shape and count once.
    pub fn new(sources: Vec<ExamplePool>) -> Self {
        let array_shape = smallest_array_shape(&sources);
        let array_count = sources.iter().map(ExamplePool::len).sum();
        Self {
            sources,
            array_shape,
            array_count,
        }
    }

    /// Use a fixed array shape instead of the computed one.
    pub fn with_array_shape(mut self, array_shape: [usize; 3]) -> Self {
        self.array_shape = Some(array_shape);
        self
    }

    pub fn sources(&self) -> &[ExamplePool] {
        &self.sources
    }

    /// Total number of arrays across sources, empty ones included.
    pub fn array_count(&self) -> usize {
        self.array_count
    }

    /// `[height, width, bands]` taking the smallest tile area and the
    /// smallest band count across sources.
    pub fn array_shape(&self) -> Option<[usize; 3]> {
        self.array_shape
    }

    /// Keys of every non-empty array, padded to a multiple of `batch_size` and shuffled.
    ///
    /// The last batch is completed by repeating keys from the start of the list.
    pub fn batch_keys<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<BatchKey>> {
        if batch_size == 0 {
            return Err(DatasetError::InvalidBatchSize(batch_size));
        }
        let mut keys = Vec::with_capacity(self.array_count);
        let mut skipped = 0u64;
        for (source, pool) in self.sources.iter().enumerate() {
            for (index, array) in pool.arrays().iter().enumerate() {
                if array.is_all_zero() {
                    skipped += 1;
                    continue;
                }
                keys.push(BatchKey::new(source, index));
            }
        }

        let collected = keys.len();
        loop {
            let extra = keys.len() % batch_size;
            if extra == 0 {
                break;
            }
            let fill = (batch_size - extra).min(keys.len());
            keys.extend_from_within(..fill);
        }
        keys.shuffle(rng);

        metrics::counter!(metric_defs::BATCH_EMPTY_ARRAYS.name).increment(skipped);
        metrics::counter!(metric_defs::BATCH_PADDING_KEYS.name)
            .increment((keys.len() - collected) as u64);
        debug!(
            keys = keys.len(),
            padding = keys.len() - collected,
            skipped,
            batch_size,
            "Collected batch keys"
        );
        Ok(keys)
    }

    fn source(&self, key: BatchKey) -> Result<&ExamplePool> {
        self.sources.get(key.source).ok_or(DatasetError::IndexOutOfRange {
            index: key.source,
            len: self.sources.len(),
        })
    }

    pub fn array(&self, key: BatchKey) -> Result<&TileArray> {
        self.source(key)?.array(key.index)
    }

    pub fn labels(&self, keys: &[BatchKey]) -> Result<Vec<bool>> {
        keys.iter()
            .map(|&key| self.source(key)?.label(key.index))
            .collect()
    }

    pub fn pixel_locations(&self, keys: &[BatchKey]) -> Result<Vec<PixelPoint>> {
        keys.iter()
            .map(|&key| self.source(key)?.location(key.index))
            .collect()
    }
}

fn smallest_array_shape(sources: &[ExamplePool]) -> Option<[usize; 3]> {
    let mut shapes = sources.iter().filter_map(ExamplePool::array_shape);
    let [mut height, mut width, mut bands] = shapes.next()?;
    for [h, w, b] in shapes {
        if h * w < height * width {
            height = h;
            width = w;
        }
        bands = bands.min(b);
    }
    Some([height, width, bands])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::LocationKind;
    use geotile_raster::SampleType;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn source(count: usize, shape: [usize; 3], empty: &[usize]) -> ExamplePool {
        let mut pool = ExamplePool::new(LocationKind::Center, SampleType::U8);
        let [height, width, bands] = shape;
        for i in 0..count {
            let value = if empty.contains(&i) { 0.0 } else { 1.0 };
            pool.push(
                TileArray::filled(height, width, bands, value),
                Some(i % 2 == 0),
                PixelPoint::new(i as i64, 100 + i as i64),
            )
            .unwrap();
        }
        pool
    }

    #[test]
    fn test_batch_keys_pad_last_batch() {
        let group = BatchGroup::new(vec![source(5, [2, 2, 1], &[1]), source(3, [2, 2, 1], &[])]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let keys = group.batch_keys(4, &mut rng).unwrap();
        // 7 non-empty keys padded by one repeated key.
        assert_eq!(keys.len(), 8);
        assert!(!keys.contains(&BatchKey::new(0, 1)));
        let distinct: HashSet<_> = keys.iter().copied().collect();
        assert_eq!(distinct.len(), 7);
    }

    #[test]
    fn test_batch_keys_pad_from_short_list() {
        let group = BatchGroup::new(vec![source(2, [2, 2, 1], &[])]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let keys = group.batch_keys(5, &mut rng).unwrap();
        assert_eq!(keys.len(), 5);
        assert!(keys.iter().all(|k| k.source == 0 && k.index < 2));
    }

    #[test]
    fn test_batch_keys_edge_cases() {
        let group = BatchGroup::new(vec![source(2, [2, 2, 1], &[0, 1])]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        assert!(group.batch_keys(3, &mut rng).unwrap().is_empty());
        assert!(matches!(
            group.batch_keys(0, &mut rng),
            Err(DatasetError::InvalidBatchSize(0))
        ));
    }

    #[test]
    fn test_batch_keys_shuffle_is_seeded() {
        let group = BatchGroup::new(vec![source(20, [1, 1, 1], &[])]);
        let a = group.batch_keys(4, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
        let b = group.batch_keys(4, &mut ChaCha8Rng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_labels_and_locations() {
        let group = BatchGroup::new(vec![source(3, [2, 2, 1], &[]), source(3, [2, 2, 1], &[])]);
        let keys = [BatchKey::new(1, 1), BatchKey::new(0, 2)];
        assert_eq!(group.labels(&keys).unwrap(), vec![false, true]);
        assert_eq!(
            group.pixel_locations(&keys).unwrap(),
            vec![PixelPoint::new(1, 101), PixelPoint::new(2, 102)]
        );
        assert!(matches!(
            group.labels(&[BatchKey::new(2, 0)]),
            Err(DatasetError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_array_shape_and_count() {
        let group = BatchGroup::new(vec![
            source(2, [4, 4, 3], &[]),
            source(1, [2, 6, 4], &[]),
            source(1, [5, 5, 2], &[]),
        ]);
        assert_eq!(group.array_count(), 4);
        assert_eq!(group.array_shape(), Some([2, 6, 2]));
        let fixed = group.with_array_shape([1, 1, 1]);
        assert_eq!(fixed.array_shape(), Some([1, 1, 1]));
        assert_eq!(BatchGroup::new(vec![]).array_shape(), None);
    }
}
