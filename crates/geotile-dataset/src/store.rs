//! JSON persistence of pools, example sets and datasets.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

use crate::pool::{ExamplePool, ExampleSet};
use crate::Result;

/// File name of tiles extracted from a raster grid.
pub const ARRAYS_NAME: &str = "arrays.json";
/// File name of a positive/negative example set.
pub const EXAMPLES_NAME: &str = "examples.json";
/// File name of an assembled dataset.
pub const DATASET_NAME: &str = "dataset.json";

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    let value = serde_json::from_reader(reader)?;
    debug!(path = %path.display(), "Read store");
    Ok(value)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    debug!(path = %path.display(), "Wrote store");
    Ok(())
}

/// Read a pool written by [`write_pool`], with either location naming.
pub fn read_pool<P: AsRef<Path>>(path: P) -> Result<ExamplePool> {
    read_json(path.as_ref())
}

pub fn write_pool<P: AsRef<Path>>(path: P, pool: &ExamplePool) -> Result<()> {
    write_json(path.as_ref(), pool)
}

pub fn read_example_set<P: AsRef<Path>>(path: P) -> Result<ExampleSet> {
    read_json(path.as_ref())
}

pub fn write_example_set<P: AsRef<Path>>(path: P, set: &ExampleSet) -> Result<()> {
    write_json(path.as_ref(), set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{LocationAttributes, LocationKind};
    use crate::DatasetError;
    use geotile_raster::{CalibrationPack, PixelPoint, SampleType, TileArray};
    use tempfile::TempDir;

    fn pool(kind: LocationKind, labeled: bool) -> ExamplePool {
        let mut pool = ExamplePool::new(kind, SampleType::U16).with_attributes(LocationAttributes {
            calibration_pack: CalibrationPack::new([100.0, 0.5, 0.0, 200.0, 0.0, -0.5]),
            proj4: "+proj=utm +zone=10 +ellps=WGS84 +units=m +no_defs".to_string(),
        });
        for i in 0..3 {
            let label = labeled.then_some(i % 2 == 0);
            pool.push(TileArray::filled(2, 2, 3, i as f32), label, PixelPoint::new(i, 2 * i))
                .unwrap();
        }
        pool
    }

    #[test]
    fn test_pool_round_trip_keeps_location_naming() {
        let dir = TempDir::new().unwrap();
        for kind in [LocationKind::Center, LocationKind::UpperLeft] {
            let path = dir.path().join(ARRAYS_NAME);
            let original = pool(kind, kind == LocationKind::Center);
            write_pool(&path, &original).unwrap();
            let restored = read_pool(&path).unwrap();
            assert_eq!(restored, original);
            assert_eq!(restored.location_kind(), kind);
        }
    }

    #[test]
    fn test_reader_accepts_either_location_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("handwritten.json");
        let json = r#"{
            "arrays": [{"height": 1, "width": 1, "bands": 1, "data": [4.0]}],
            "pixel_upper_lefts": [[3, 4]],
            "sample_type": "u8"
        }"#;
        std::fs::write(&path, json).unwrap();
        let restored = read_pool(&path).unwrap();
        assert_eq!(restored.location_kind(), LocationKind::UpperLeft);
        assert_eq!(restored.location(0).unwrap(), PixelPoint::new(3, 4));
        assert!(restored.labels().is_empty());
        assert!(restored.attributes().is_none());

        let json = json.replace("pixel_upper_lefts", "pixel_centers");
        std::fs::write(&path, json).unwrap();
        assert_eq!(read_pool(&path).unwrap().location_kind(), LocationKind::Center);
    }

    #[test]
    fn test_reader_rejects_inconsistent_pool() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        let json = r#"{
            "arrays": [{"height": 1, "width": 1, "bands": 1, "data": [4.0]}],
            "labels": [true, false],
            "pixel_centers": [[3, 4]],
            "sample_type": "u8"
        }"#;
        std::fs::write(&path, json).unwrap();
        assert!(matches!(read_pool(&path), Err(DatasetError::Json(_))));
    }

    #[test]
    fn test_example_set_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(EXAMPLES_NAME);
        let set = ExampleSet {
            positive: pool(LocationKind::Center, true),
            negative: pool(LocationKind::Center, true),
        };
        write_example_set(&path, &set).unwrap();
        assert_eq!(read_example_set(&path).unwrap(), set);
    }

    #[test]
    fn test_missing_store() {
        assert!(matches!(
            read_pool("/nonexistent/arrays.json"),
            Err(DatasetError::Io(_))
        ));
    }
}
