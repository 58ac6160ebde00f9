//! GeoTIFF-backed raster source.

use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, warn};

use crate::calibration::CalibrationPack;
use crate::descriptor::{RasterDescriptor, SampleType};
use crate::geometry::{PixelBounds, PixelSize};
use crate::source::{RasterSource, TileArray};
use crate::{RasterError, Result};

const MODEL_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const MODEL_TIEPOINT: Tag = Tag::ModelTiepointTag;
const MODEL_TRANSFORMATION: Tag = Tag::ModelTransformationTag;
const GEO_KEY_DIRECTORY: Tag = Tag::GeoKeyDirectoryTag;
const GDAL_NODATA: Tag = Tag::GdalNodata;

const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;
const USER_DEFINED: u16 = 32767;

/// A GeoTIFF raster decoded into memory.
#[derive(Debug)]
pub struct GeoTiffRaster {
    descriptor: RasterDescriptor,
    samples: TileArray,
}

impl GeoTiffRaster {
    /// Open a GeoTIFF, reading its projection from the GeoKey directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::load(path.as_ref(), None)
    }

    /// Open a GeoTIFF with an explicit proj4 projection.
    ///
    /// Use this when the file has no usable GeoKey directory.
    pub fn open_with_projection<P: AsRef<Path>>(path: P, projection: &str) -> Result<Self> {
        Self::load(path.as_ref(), Some(projection))
    }

    fn load(path: &Path, projection: Option<&str>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut decoder = Decoder::new(file)?;

        // Satellite scenes are large; lift the default decoder limits.
        let mut limits = Limits::default();
        limits.decoding_buffer_size = 1024 * 1024 * 1024;
        limits.intermediate_buffer_size = 1024 * 1024 * 1024;
        limits.ifd_value_size = 1024 * 1024 * 1024;
        decoder = decoder.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let band_count = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize;

        let calibration = Self::read_calibration(&mut decoder)?;
        let projection = match projection {
            Some(p) => p.to_string(),
            None => Self::read_projection(&mut decoder)?,
        };
        let null_value = Self::read_nodata_value(&mut decoder);
        let (data, sample_type) = Self::decode_samples(&mut decoder)?;

        let samples = TileArray::new(height as usize, width as usize, band_count, data)
            .map_err(|e| RasterError::InvalidGeoTiff(format!("{}: {e}", path.display())))?;

        let descriptor = RasterDescriptor::new(
            PixelSize::new(width, height),
            band_count,
            vec![null_value; band_count],
            sample_type,
            &projection,
            calibration,
        )?
        .with_path(path);

        debug!(
            path = %path.display(),
            width,
            height,
            band_count,
            projection = %descriptor.projection,
            "Opened GeoTIFF"
        );
        Ok(Self {
            descriptor,
            samples,
        })
    }

    /// Read the affine calibration from ModelTransformation or ModelTiepoint + ModelPixelScale.
    fn read_calibration<R: std::io::Read + std::io::Seek>(
        decoder: &mut Decoder<R>,
    ) -> Result<CalibrationPack> {
        if let Ok(m) = decoder.get_tag_f64_vec(MODEL_TRANSFORMATION) {
            if m.len() >= 8 {
                return Ok(CalibrationPack::new([m[3], m[0], m[1], m[7], m[4], m[5]]));
            }
        }

        let tiepoint = decoder.get_tag_f64_vec(MODEL_TIEPOINT);
        let pixel_scale = decoder.get_tag_f64_vec(MODEL_PIXEL_SCALE);
        if let (Ok(tiepoint), Ok(scale)) = (tiepoint, pixel_scale) {
            if tiepoint.len() >= 6 && scale.len() >= 2 {
                // Tiepoint format: [i, j, k, x, y, z] maps pixel (i, j) to model (x, y)
                let (i, j) = (tiepoint[0], tiepoint[1]);
                let (x, y) = (tiepoint[3], tiepoint[4]);
                let (scale_x, scale_y) = (scale[0], scale[1]);
                return Ok(CalibrationPack::new([
                    x - i * scale_x,
                    scale_x,
                    0.0,
                    y + j * scale_y,
                    0.0,
                    -scale_y,
                ]));
            }
        }

        Err(RasterError::InvalidGeoTiff(
            "missing ModelTransformation or ModelTiepoint/ModelPixelScale tags".to_string(),
        ))
    }

    /// Resolve the EPSG code in the GeoKey directory to a proj4 string.
    fn read_projection<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Result<String> {
        let directory = decoder
            .get_tag_u16_vec(GEO_KEY_DIRECTORY)
            .map_err(|_| RasterError::InvalidGeoTiff("missing GeoKeyDirectory tag".to_string()))?;
        let code = epsg_from_geo_keys(&directory).ok_or_else(|| {
            RasterError::UnsupportedProjection("no EPSG code in GeoKey directory".to_string())
        })?;
        proj4_from_epsg(code)
    }

    /// Try to read the no-data value from the GDAL_NODATA tag.
    fn read_nodata_value<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
        let text = decoder.get_tag_ascii_string(GDAL_NODATA).ok()?;
        match text.trim().trim_end_matches('\0').parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(nodata = %text, "Ignoring unparseable GDAL_NODATA value");
                None
            }
        }
    }

    /// Decode every sample, remembering the stored sample type.
    fn decode_samples<R: std::io::Read + std::io::Seek>(
        decoder: &mut Decoder<R>,
    ) -> Result<(Vec<f32>, SampleType)> {
        let decoded = match decoder.read_image()? {
            DecodingResult::F32(data) => (data, SampleType::F32),
            DecodingResult::F64(data) => (to_f32(data, |v| v as f32), SampleType::F64),
            DecodingResult::I8(data) => (to_f32(data, f32::from), SampleType::I8),
            DecodingResult::I16(data) => (to_f32(data, f32::from), SampleType::I16),
            DecodingResult::I32(data) => (to_f32(data, |v| v as f32), SampleType::I32),
            DecodingResult::I64(data) => (to_f32(data, |v| v as f32), SampleType::I64),
            DecodingResult::U8(data) => (to_f32(data, f32::from), SampleType::U8),
            DecodingResult::U16(data) => (to_f32(data, f32::from), SampleType::U16),
            DecodingResult::U32(data) => (to_f32(data, |v| v as f32), SampleType::U32),
            DecodingResult::U64(data) => (to_f32(data, |v| v as f32), SampleType::U64),
        };
        Ok(decoded)
    }
}

fn to_f32<T>(data: Vec<T>, convert: impl Fn(T) -> f32) -> Vec<f32> {
    data.into_iter().map(convert).collect()
}

/// Find the projected (preferred) or geographic EPSG code in a GeoKey directory.
///
/// The directory is a header `[version, revision, minor, count]` followed by
/// `count` entries of `[key, location, count, value]`; only inline values
/// (`location == 0`) carry EPSG codes.
pub fn epsg_from_geo_keys(directory: &[u16]) -> Option<u16> {
    let count = *directory.get(3)? as usize;
    let entries = directory.get(4..)?.chunks_exact(4).take(count);
    let mut geographic = None;
    let mut projected = None;
    for entry in entries {
        let (key, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match key {
            PROJECTED_CS_TYPE_GEO_KEY => projected = Some(value),
            GEOGRAPHIC_TYPE_GEO_KEY => geographic = Some(value),
            _ => {}
        }
    }
    projected.or(geographic)
}

/// Proj4 definition of an EPSG code.
pub fn proj4_from_epsg(code: u16) -> Result<String> {
    crs_definitions::from_code(code)
        .map(|def| def.proj4.to_string())
        .ok_or_else(|| RasterError::UnsupportedProjection(format!("EPSG:{code}")))
}

impl RasterSource for GeoTiffRaster {
    fn descriptor(&self) -> &RasterDescriptor {
        &self.descriptor
    }

    fn read_window(&self, window: &PixelBounds) -> Result<TileArray> {
        if window.min_x < 0 || window.min_y < 0 || window.width() < 0 || window.height() < 0 {
            return Err(RasterError::InvalidDimensions(format!("window {window:?}")));
        }
        self.samples.window(
            window.min_y as usize,
            window.min_x as usize,
            window.height() as usize,
            window.width() as usize,
        )
    }
}
