//! Metric (UTM) coordinates for rasters whose native projection may not be metric.
//!
//! Distances only make sense in a locally Cartesian projection. For a raster
//! in geographic coordinates we pick the UTM zone containing the raster origin
//! and convert through it.
//!
//! All transforms and the metric anchor (the metric coordinate of pixel
//! `(0, 0)`) are built once in [`MetricReprojection::new`] and reused by
//! every conversion afterwards.

use proj4rs::proj::Proj;
use tracing::debug;

use crate::calibration::CalibrationPack;
use crate::descriptor::{normalize_projection, RasterDescriptor};
use crate::geometry::{PixelPoint, PixelSize};
use crate::{RasterError, Result};

/// Geographic WGS84 coordinates in degrees, longitude first.
pub const LONGLAT_WGS84: &str = "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs";

/// UTM latitude band letters from 80°S to 84°N (the X band is 12° tall).
const ZONE_LETTERS: &[u8] = b"CDEFGHJKLMNPQRSTUVWXX";

/// A point transform between two fixed projections.
pub trait PointTransform {
    /// Transform `(x, y)`. Geographic coordinates are in degrees.
    fn apply(&self, xy: (f64, f64)) -> Result<(f64, f64)>;
}

/// Builds [`PointTransform`]s from pairs of proj4 strings.
pub trait TransformFactory {
    /// Build a transform from `source` to `target`.
    fn create(&self, source: &str, target: &str) -> Result<Box<dyn PointTransform>>;
}

/// Transform factory backed by the pure-Rust `proj4rs` library.
#[derive(Debug, Clone, Copy, Default)]
pub struct Proj4Factory;

impl TransformFactory for Proj4Factory {
    fn create(&self, source: &str, target: &str) -> Result<Box<dyn PointTransform>> {
        let parse = |definition: &str| {
            Proj::from_proj_string(definition).map_err(|e| RasterError::Reprojection {
                source_proj: source.to_string(),
                target_proj: target.to_string(),
                reason: format!("invalid projection `{definition}`: {e:?}"),
            })
        };
        Ok(Box::new(Proj4Transform {
            source: parse(source)?,
            target: parse(target)?,
            source_proj: source.to_string(),
            target_proj: target.to_string(),
            source_geographic: is_geographic_projection(source),
            target_geographic: is_geographic_projection(target),
        }))
    }
}

struct Proj4Transform {
    source: Proj,
    target: Proj,
    source_proj: String,
    target_proj: String,
    source_geographic: bool,
    target_geographic: bool,
}

impl PointTransform for Proj4Transform {
    fn apply(&self, (x, y): (f64, f64)) -> Result<(f64, f64)> {
        // proj4rs works in radians for geographic coordinates
        let mut point = if self.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        proj4rs::transform::transform(&self.source, &self.target, &mut point).map_err(|e| {
            RasterError::Reprojection {
                source_proj: self.source_proj.clone(),
                target_proj: self.target_proj.clone(),
                reason: format!("{e:?}"),
            }
        })?;
        if self.target_geographic {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }
}

/// Whether a proj4 string describes geographic (angular) coordinates.
pub fn is_geographic_projection(projection: &str) -> bool {
    ["+proj=longlat", "+proj=latlong", "+proj=lonlat", "+proj=latlon"]
        .iter()
        .any(|p| projection.contains(p))
}

/// Whether a proj4 string already describes a UTM-like metric projection.
pub fn is_metric_projection(projection: &str) -> bool {
    projection.contains("+proj=utm")
}

/// UTM zone number for a coordinate, including the Norway and Svalbard exceptions.
pub fn utm_zone_number(latitude: f64, longitude: f64) -> u8 {
    let longitude = (longitude + 180.0).rem_euclid(360.0) - 180.0;
    if (56.0..64.0).contains(&latitude) && (3.0..12.0).contains(&longitude) {
        return 32;
    }
    if (72.0..=84.0).contains(&latitude) && longitude >= 0.0 {
        if longitude < 9.0 {
            return 31;
        } else if longitude < 21.0 {
            return 33;
        } else if longitude < 33.0 {
            return 35;
        } else if longitude < 42.0 {
            return 37;
        }
    }
    let zone = ((longitude + 180.0) / 6.0).floor() as i64 + 1;
    zone.clamp(1, 60) as u8
}

/// UTM latitude band letter, or `None` outside 80°S..84°N.
pub fn utm_zone_letter(latitude: f64) -> Option<char> {
    if !(-80.0..=84.0).contains(&latitude) {
        return None;
    }
    let index = ((latitude + 80.0) as usize) >> 3;
    ZONE_LETTERS.get(index).map(|&b| b as char)
}

/// The proj4 string of the UTM zone containing `(latitude, longitude)`.
pub fn utm_projection(latitude: f64, longitude: f64) -> String {
    let zone = utm_zone_number(latitude, longitude);
    let south = latitude < 0.0;
    format!(
        "+proj=utm +zone={}{} +ellps=WGS84 +units=m +no_defs",
        zone,
        if south { " +south" } else { "" }
    )
}

/// Converts between pixel coordinates of a raster and a metric projection.
pub struct MetricReprojection {
    calibration: CalibrationPack,
    projection: String,
    metric_projection: String,
    in_metric_projection: bool,
    to_metric: Option<Box<dyn PointTransform>>,
    to_native: Option<Box<dyn PointTransform>>,
    metric_origin: (f64, f64),
}

impl std::fmt::Debug for MetricReprojection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricReprojection")
            .field("projection", &self.projection)
            .field("metric_projection", &self.metric_projection)
            .field("in_metric_projection", &self.in_metric_projection)
            .field("metric_origin", &self.metric_origin)
            .finish()
    }
}

impl MetricReprojection {
    /// Set up metric conversions for a raster using `proj4rs`.
    pub fn new(descriptor: &RasterDescriptor) -> Result<Self> {
        Self::with_factory(descriptor, &Proj4Factory)
    }

    /// Set up metric conversions, building transforms with `factory`.
    ///
    /// The metric projection is chosen here and never recomputed.
    pub fn with_factory(
        descriptor: &RasterDescriptor,
        factory: &dyn TransformFactory,
    ) -> Result<Self> {
        let calibration = descriptor.calibration;
        let projection = normalize_projection(&descriptor.projection);

        if is_metric_projection(&projection) {
            let metric_origin = calibration.to_projected((0.0, 0.0));
            return Ok(Self {
                calibration,
                metric_projection: projection.clone(),
                projection,
                in_metric_projection: true,
                to_metric: None,
                to_native: None,
                metric_origin,
            });
        }

        let to_longlat = factory.create(&projection, LONGLAT_WGS84)?;
        let (longitude, latitude) = to_longlat.apply(calibration.to_projected((0.0, 0.0)))?;
        let metric_projection = utm_projection(latitude, longitude);
        debug!(
            projection = %projection,
            metric_projection = %metric_projection,
            latitude,
            longitude,
            "Selected metric projection"
        );

        let to_metric = factory.create(&projection, &metric_projection)?;
        let to_native = factory.create(&metric_projection, &projection)?;
        let metric_origin = to_metric.apply(calibration.to_projected((0.0, 0.0)))?;

        Ok(Self {
            calibration,
            projection,
            metric_projection,
            in_metric_projection: false,
            to_metric: Some(to_metric),
            to_native: Some(to_native),
            metric_origin,
        })
    }

    /// The native projection of the raster.
    pub fn projection(&self) -> &str {
        &self.projection
    }

    /// The metric projection used for conversions.
    pub fn metric_projection(&self) -> &str {
        &self.metric_projection
    }

    /// Whether the native projection is already metric.
    pub fn in_metric_projection(&self) -> bool {
        self.in_metric_projection
    }

    /// Metric coordinate of pixel `(0, 0)`.
    pub fn metric_origin(&self) -> (f64, f64) {
        self.metric_origin
    }

    /// Metric coordinates of a pixel coordinate.
    pub fn to_metric(&self, pixel: (f64, f64)) -> Result<(f64, f64)> {
        let projected = self.calibration.to_projected(pixel);
        match &self.to_metric {
            Some(transform) => transform.apply(projected),
            None => Ok(projected),
        }
    }

    /// Pixel coordinates of a metric coordinate.
    pub fn to_pixel_from_metric(&self, metric: (f64, f64)) -> Result<PixelPoint> {
        let projected = match &self.to_native {
            Some(transform) => transform.apply(metric)?,
            None => metric,
        };
        self.calibration.to_pixel(projected)
    }

    /// Metric extent of the given pixel dimensions, measured from the raster origin.
    pub fn to_metric_dimensions(&self, dimensions: PixelSize) -> Result<(f64, f64)> {
        if self.in_metric_projection {
            return Ok(self.calibration.to_projected_dimensions(dimensions));
        }
        let (x, y) = self.to_metric((f64::from(dimensions.width), f64::from(dimensions.height)))?;
        Ok((
            (x - self.metric_origin.0).abs(),
            (y - self.metric_origin.1).abs(),
        ))
    }

    /// Pixel dimensions covering a metric extent, measured from the raster origin.
    pub fn to_pixel_dimensions_from_metric(&self, (width, height): (f64, f64)) -> Result<PixelSize> {
        if self.in_metric_projection {
            return self.calibration.to_pixel_dimensions((width, height));
        }
        let offset = (self.metric_origin.0 + width, self.metric_origin.1 + height);
        let pixel = self.to_pixel_from_metric(offset)?;
        PixelSize::try_from_signed(pixel.x.abs(), pixel.y.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SampleType;
    use approx::assert_relative_eq;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Factory whose transforms shift by a fixed offset and count constructions.
    struct ShiftFactory {
        created: Rc<Cell<usize>>,
        applied: Rc<Cell<usize>>,
    }

    struct Shift {
        dx: f64,
        dy: f64,
        applied: Rc<Cell<usize>>,
    }

    impl PointTransform for Shift {
        fn apply(&self, (x, y): (f64, f64)) -> Result<(f64, f64)> {
            self.applied.set(self.applied.get() + 1);
            Ok((x + self.dx, y + self.dy))
        }
    }

    impl TransformFactory for ShiftFactory {
        fn create(&self, source: &str, target: &str) -> Result<Box<dyn PointTransform>> {
            self.created.set(self.created.get() + 1);
            let (dx, dy) = if target == LONGLAT_WGS84 {
                (0.0, 0.0)
            } else if is_metric_projection(target) {
                (1000.0, 2000.0)
            } else if is_metric_projection(source) {
                (-1000.0, -2000.0)
            } else {
                return Err(RasterError::Reprojection {
                    source_proj: source.to_string(),
                    target_proj: target.to_string(),
                    reason: "unexpected pair".to_string(),
                });
            };
            Ok(Box::new(Shift {
                dx,
                dy,
                applied: Rc::clone(&self.applied),
            }))
        }
    }

    fn geographic_descriptor() -> RasterDescriptor {
        RasterDescriptor::new(
            PixelSize::new(1000, 1000),
            1,
            vec![None],
            SampleType::U8,
            LONGLAT_WGS84,
            CalibrationPack::new([-122.5, 0.5, 0.0, 47.5, 0.0, -0.5]),
        )
        .unwrap()
    }

    #[test]
    fn test_utm_zone_number() {
        assert_eq!(utm_zone_number(47.6, -122.3), 10);
        assert_eq!(utm_zone_number(0.0, 0.0), 31);
        assert_eq!(utm_zone_number(60.0, 5.0), 32);
        assert_eq!(utm_zone_number(78.0, 15.0), 33);
        assert_eq!(utm_zone_number(-33.9, 18.4), 34);
        assert_eq!(utm_zone_number(10.0, 180.0), 1);
    }

    #[test]
    fn test_utm_zone_letter() {
        assert_eq!(utm_zone_letter(47.6), Some('T'));
        assert_eq!(utm_zone_letter(-33.9), Some('H'));
        assert_eq!(utm_zone_letter(84.0), Some('X'));
        assert_eq!(utm_zone_letter(-85.0), None);
    }

    #[test]
    fn test_utm_projection_hemisphere() {
        assert_eq!(
            utm_projection(47.6, -122.3),
            "+proj=utm +zone=10 +ellps=WGS84 +units=m +no_defs"
        );
        assert_eq!(
            utm_projection(-33.9, 18.4),
            "+proj=utm +zone=34 +south +ellps=WGS84 +units=m +no_defs"
        );
    }

    #[test]
    fn test_metric_projection_is_computed_once() {
        let created = Rc::new(Cell::new(0));
        let applied = Rc::new(Cell::new(0));
        let factory = ShiftFactory {
            created: Rc::clone(&created),
            applied: Rc::clone(&applied),
        };
        let metric = MetricReprojection::with_factory(&geographic_descriptor(), &factory).unwrap();
        assert_eq!(created.get(), 3);
        assert_eq!(
            metric.metric_projection(),
            "+proj=utm +zone=10 +ellps=WGS84 +units=m +no_defs"
        );
        assert!(!metric.in_metric_projection());

        let lookups_after_setup = applied.get();
        for i in 0..50 {
            metric.to_metric((i as f64, i as f64)).unwrap();
            metric.to_metric_dimensions(PixelSize::new(i, i)).unwrap();
        }
        assert_eq!(created.get(), 3);
        assert_eq!(applied.get(), lookups_after_setup + 100);
    }

    #[test]
    fn test_metric_dimensions_are_anchored_at_origin() {
        let factory = ShiftFactory {
            created: Rc::new(Cell::new(0)),
            applied: Rc::new(Cell::new(0)),
        };
        let metric = MetricReprojection::with_factory(&geographic_descriptor(), &factory).unwrap();
        assert_eq!(metric.metric_origin(), (-122.5 + 1000.0, 47.5 + 2000.0));

        let (w, h) = metric.to_metric_dimensions(PixelSize::new(10, 4)).unwrap();
        assert_relative_eq!(w, 5.0);
        assert_relative_eq!(h, 2.0);

        let pixels = metric.to_pixel_dimensions_from_metric((5.0, 2.0)).unwrap();
        assert_eq!(pixels, PixelSize::new(10, 4));
    }

    #[test]
    fn test_metric_native_projection_short_circuits() {
        let descriptor = RasterDescriptor::new(
            PixelSize::new(100, 100),
            1,
            vec![None],
            SampleType::U8,
            "+proj=utm +zone=33 +datum=WGS84 +units=m +no_defs",
            CalibrationPack::new([400_000.0, 0.6, 0.0, 5_000_000.0, 0.0, -0.6]),
        )
        .unwrap();
        let created = Rc::new(Cell::new(0));
        let factory = ShiftFactory {
            created: Rc::clone(&created),
            applied: Rc::new(Cell::new(0)),
        };
        let metric = MetricReprojection::with_factory(&descriptor, &factory).unwrap();

        assert!(metric.in_metric_projection());
        assert_eq!(metric.metric_projection(), metric.projection());
        assert_eq!(created.get(), 0);
        assert_eq!(metric.to_metric((10.0, 10.0)).unwrap(), (400_006.0, 4_999_994.0));
        assert_eq!(
            metric.to_pixel_from_metric((400_006.0, 4_999_994.0)).unwrap(),
            PixelPoint::new(10, 10)
        );
        assert_eq!(
            metric.to_pixel_dimensions_from_metric((30.0, 30.0)).unwrap(),
            PixelSize::new(50, 50)
        );
    }

    #[test]
    fn test_factory_failure_propagates() {
        struct Failing;
        impl TransformFactory for Failing {
            fn create(&self, source: &str, target: &str) -> Result<Box<dyn PointTransform>> {
                Err(RasterError::Reprojection {
                    source_proj: source.to_string(),
                    target_proj: target.to_string(),
                    reason: "no transform".to_string(),
                })
            }
        }
        let result = MetricReprojection::with_factory(&geographic_descriptor(), &Failing);
        assert!(matches!(result, Err(RasterError::Reprojection { .. })));
    }
}
