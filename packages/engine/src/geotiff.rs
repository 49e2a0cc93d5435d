//! Single-band GeoTIFF reading and writing.
//!
//! Grids are georeferenced with `ModelPixelScale` + `ModelTiepoint`, tagged
//! with an EPSG code in the GeoKey directory, and carry their no-data value
//! in `GDAL_NODATA` so desktop GIS tools read them as-is.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write as _};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{TiffEncoder, colortype};
use tiff::tags::Tag;

use crate::{EngineError, LinearUnit, Raster, SpatialRef};

/// On-disk no-data value for written grids.
pub const NODATA_VALUE: f32 = f32::MIN;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const PROJ_LINEAR_UNITS: u16 = 3076;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const USER_DEFINED: u16 = 32767;

/// Georeferencing of a grid without its cell values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterHeader {
    /// x of the left edge.
    pub origin_x: f64,
    /// y of the top edge.
    pub origin_y: f64,
    /// Cell size (x scale).
    pub cell_size: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// Spatial reference from the GeoKey directory.
    pub spatial_ref: SpatialRef,
}

/// Writes `raster` to `path` as a float32 GeoTIFF, replacing any file there.
///
/// # Errors
///
/// Returns an error if the file cannot be created or encoded.
#[allow(clippy::cast_possible_truncation)]
pub fn write_raster(path: &Path, raster: &Raster) -> Result<(), EngineError> {
    let file = File::create(path).map_err(|e| io_error(path, e))?;
    let mut writer = BufWriter::new(file);

    let data: Vec<f32> = raster
        .values()
        .iter()
        .map(|v| if v.is_nan() { NODATA_VALUE } else { *v })
        .collect();
    let geokeys = geokey_directory(&raster.spatial_ref);
    let nodata = NODATA_VALUE.to_string();

    {
        let mut encoder = TiffEncoder::new(&mut writer)?;
        let mut image =
            encoder.new_image::<colortype::Gray32Float>(raster.width as u32, raster.height as u32)?;
        image.encoder().write_tag(
            Tag::ModelPixelScaleTag,
            &[raster.cell_size, raster.cell_size, 0.0][..],
        )?;
        image.encoder().write_tag(
            Tag::ModelTiepointTag,
            &[0.0, 0.0, 0.0, raster.origin_x, raster.origin_y, 0.0][..],
        )?;
        image
            .encoder()
            .write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;
        image.encoder().write_tag(Tag::GdalNodata, nodata.as_str())?;
        image.write_data(&data)?;
    }

    writer.flush().map_err(|e| io_error(path, e))?;
    log::debug!(
        "Wrote {}x{} grid to {}",
        raster.width,
        raster.height,
        path.display()
    );
    Ok(())
}

/// Reads the georeferencing of the GeoTIFF at `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or lacks georeferencing.
pub fn read_header(path: &Path) -> Result<RasterHeader, EngineError> {
    let mut decoder = open(path)?;
    header_from(&mut decoder, path)
}

/// Reads the first band of the GeoTIFF at `path`.
///
/// Cells equal to the file's `GDAL_NODATA` value become no-data.
///
/// # Errors
///
/// Returns an error if the file cannot be decoded or is not single-band.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn read_raster(path: &Path) -> Result<Raster, EngineError> {
    let mut decoder = open(path)?;
    let header = header_from(&mut decoder, path)?;

    let nodata: Option<f32> = decoder
        .find_tag(Tag::GdalNodata)?
        .map(tiff::decoder::ifd::Value::into_string)
        .transpose()?
        .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok())
        .map(|v| v as f32);

    let values: Vec<f32> = match decoder.read_image()? {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        _ => {
            return Err(EngineError::Conversion {
                message: format!("{}: unsupported sample format", path.display()),
            });
        }
    };

    let values = match nodata {
        Some(nd) => values
            .into_iter()
            .map(|v| if (v - nd).abs() <= f32::EPSILON * nd.abs().max(1.0) { f32::NAN } else { v })
            .collect(),
        None => values,
    };

    Raster::from_values(
        header.origin_x,
        header.origin_y,
        header.cell_size,
        header.width,
        header.height,
        header.spatial_ref,
        values,
    )
}

fn open(path: &Path) -> Result<Decoder<BufReader<File>>, EngineError> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    Ok(Decoder::new(BufReader::new(file))?)
}

fn header_from(
    decoder: &mut Decoder<BufReader<File>>,
    path: &Path,
) -> Result<RasterHeader, EngineError> {
    let (width, height) = decoder.dimensions()?;
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag)?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag)?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(EngineError::Conversion {
            message: format!("{}: incomplete georeferencing tags", path.display()),
        });
    }

    let geokeys = decoder
        .find_tag(Tag::GeoKeyDirectoryTag)?
        .map(tiff::decoder::ifd::Value::into_u16_vec)
        .transpose()?;
    let spatial_ref = geokeys
        .as_deref()
        .map_or(SpatialRef::UNKNOWN, spatial_ref_from_geokeys);

    if (scale[0] - scale[1]).abs() > scale[0].abs() * 1e-6 {
        log::warn!(
            "{}: non-square cells ({} x {}); using the x scale",
            path.display(),
            scale[0],
            scale[1]
        );
    }

    Ok(RasterHeader {
        origin_x: tiepoint[0].mul_add(-scale[0], tiepoint[3]),
        origin_y: tiepoint[1].mul_add(scale[1], tiepoint[4]),
        cell_size: scale[0],
        width: width as usize,
        height: height as usize,
        spatial_ref,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn geokey_directory(spatial_ref: &SpatialRef) -> Vec<u16> {
    let mut keys = vec![(GT_RASTER_TYPE, RASTER_PIXEL_IS_AREA)];
    if spatial_ref.is_known() {
        let epsg = u16::try_from(spatial_ref.epsg).unwrap_or_else(|_| {
            log::warn!("{spatial_ref} does not fit a GeoKey; writing it as user-defined");
            USER_DEFINED
        });
        if spatial_ref.is_geographic() {
            keys.push((GT_MODEL_TYPE, MODEL_TYPE_GEOGRAPHIC));
            keys.push((GEOGRAPHIC_TYPE, epsg));
        } else {
            keys.push((GT_MODEL_TYPE, MODEL_TYPE_PROJECTED));
            keys.push((PROJECTED_CS_TYPE, epsg));
            if let Some(code) = spatial_ref.unit.geokey_code() {
                keys.push((PROJ_LINEAR_UNITS, code));
            }
        }
    }
    keys.sort_unstable();

    let mut directory = vec![1, 1, 0, keys.len() as u16];
    for (key, value) in keys {
        directory.extend_from_slice(&[key, 0, 1, value]);
    }
    directory
}

fn spatial_ref_from_geokeys(directory: &[u16]) -> SpatialRef {
    let mut model_type = None;
    let mut epsg = None;
    let mut unit = None;

    for entry in directory.get(4..).unwrap_or_default().chunks_exact(4) {
        // Only inline SHORT values (location 0) are meaningful here.
        if entry[1] != 0 {
            continue;
        }
        match entry[0] {
            GT_MODEL_TYPE => model_type = Some(entry[3]),
            GEOGRAPHIC_TYPE if epsg.is_none() => epsg = Some(entry[3]),
            PROJECTED_CS_TYPE => epsg = Some(entry[3]),
            PROJ_LINEAR_UNITS => unit = LinearUnit::from_geokey_code(entry[3]),
            _ => {}
        }
    }

    let Some(epsg) = epsg else {
        return SpatialRef::UNKNOWN;
    };
    let unit = if model_type == Some(MODEL_TYPE_GEOGRAPHIC) {
        LinearUnit::Degree
    } else {
        unit.or_else(|| SpatialRef::from_epsg(u32::from(epsg)).map(|s| s.unit))
            .unwrap_or_default()
    };
    SpatialRef::new(u32::from(epsg), unit)
}

fn io_error(path: &Path, source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: path.display().to_string(),
        source,
    }
}
