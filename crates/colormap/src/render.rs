//! Raster-to-RGBA rendering and quicklook output.

use crate::scheme::{evaluate, ColorScheme, Rgb};
use landslideml_core::raster::{GeoTransform, Raster, RasterElement};
use landslideml_core::{Error, Result};
use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;
use tiff::encoder::{colortype::RGBA8, TiffEncoder};
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;

/// Parameters for colormap rendering.
#[derive(Debug, Clone)]
pub struct ColormapParams {
    pub scheme: ColorScheme,
    /// Value mapped to the start of the scheme; lower values are clamped
    pub min: f64,
    /// Value mapped to the end of the scheme; higher values are clamped
    pub max: f64,
    /// RGBA for nodata pixels, transparent by default
    pub nodata_color: [u8; 4],
}

impl ColormapParams {
    /// Params with the natural range of the scheme: probabilities in [0, 1],
    /// levels 1 to 5, classes 0 and 1.
    pub fn new(scheme: ColorScheme) -> Self {
        match scheme {
            ColorScheme::Levels => Self::with_range(scheme, 1.0, 5.0),
            _ => Self::with_range(scheme, 0.0, 1.0),
        }
    }

    pub fn with_range(scheme: ColorScheme, min: f64, max: f64) -> Self {
        Self {
            scheme,
            min,
            max,
            nodata_color: [0, 0, 0, 0],
        }
    }
}

/// Params spanning the valid data range of `raster`.
///
/// All-nodata rasters get [0, 1]; constant rasters get [v, v + 1].
pub fn auto_params<T: RasterElement>(raster: &Raster<T>, scheme: ColorScheme) -> ColormapParams {
    let nodata = raster.nodata();
    let (min, max) = raster
        .data()
        .iter()
        .filter(|v| !v.is_nodata(nodata))
        .filter_map(|v| v.to_f64())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if !min.is_finite() {
        ColormapParams::with_range(scheme, 0.0, 1.0)
    } else if max - min < f64::EPSILON {
        ColormapParams::with_range(scheme, min, min + 1.0)
    } else {
        ColormapParams::with_range(scheme, min, max)
    }
}

/// Convert a raster to row-major RGBA bytes, `rows * cols * 4` long.
pub fn raster_to_rgba<T: RasterElement>(raster: &Raster<T>, params: &ColormapParams) -> Vec<u8> {
    let nodata = raster.nodata();
    let range = params.max - params.min;
    let inv_range = if range.abs() > f64::EPSILON {
        1.0 / range
    } else {
        1.0
    };

    let mut rgba = Vec::with_capacity(raster.len() * 4);
    for val in raster.data().iter() {
        let value = if val.is_nodata(nodata) {
            None
        } else {
            val.to_f64().filter(|v| v.is_finite())
        };
        match value {
            Some(v) => {
                let Rgb { r, g, b } = evaluate(params.scheme, (v - params.min) * inv_range);
                rgba.extend_from_slice(&[r, g, b, 255]);
            }
            None => rgba.extend_from_slice(&params.nodata_color),
        }
    }
    rgba
}

/// Render `raster` and write it as an RGBA GeoTIFF on the same grid
pub fn write_rgba_tiff<T, P>(raster: &Raster<T>, params: &ColormapParams, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let rgba = raster_to_rgba(raster, params);
    let file = File::create(path.as_ref())?;
    encode_rgba(&rgba, raster.shape(), raster.transform(), file)
}

fn encode_rgba<W: Write + Seek>(
    rgba: &[u8],
    (rows, cols): (usize, usize),
    gt: &GeoTransform,
    writer: W,
) -> Result<()> {
    let tiff_err = |e: tiff::TiffError| Error::Other(format!("Cannot write RGBA TIFF: {}", e));
    let mut encoder = TiffEncoder::new(writer).map_err(tiff_err)?;
    let mut image = encoder
        .new_image::<RGBA8>(cols as u32, rows as u32)
        .map_err(tiff_err)?;

    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &scale[..])
        .map_err(tiff_err)?;
    image
        .encoder()
        .write_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT), &tiepoint[..])
        .map_err(tiff_err)?;

    image.write_data(rgba).map_err(tiff_err)?;
    Ok(())
}
