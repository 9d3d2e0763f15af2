//! Gridded covariates from NetCDF files (`netcdf` feature)
//!
//! Prediction grids are commonly shipped as one NetCDF file holding a 2D
//! variable per covariate on shared `y`/`x` (or `lat`/`lon`) dimensions.

use crate::error::{Error, Result};
use crate::io::FeatureStack;
use crate::raster::{GeoTransform, Raster};
use netcdf::AttributeValue;
use std::path::Path;
use tracing::debug;

/// Read the named variables of a NetCDF file into a [`FeatureStack`].
///
/// Each variable must be 2D, or 3D with a leading dimension of length 1
/// (a single time step). `_FillValue` cells become NaN. The geotransform is
/// derived from the 1D coordinate variables named after the last two
/// dimensions when they exist.
pub fn read_netcdf<P, S>(path: P, variables: &[S]) -> Result<FeatureStack>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let file = netcdf::open(path)?;
    let mut stack = FeatureStack::new();

    for name in variables {
        let name = name.as_ref();
        let var = file
            .variable(name)
            .ok_or_else(|| Error::MissingLayer(name.to_string()))?;

        let dims = var.dimensions();
        let (rows, cols) = match dims.len() {
            2 => (dims[0].len(), dims[1].len()),
            3 if dims[0].len() == 1 => (dims[1].len(), dims[2].len()),
            _ => {
                return Err(Error::UnsupportedDataType(format!(
                    "variable '{}' has {} dimensions, expected a 2D grid",
                    name,
                    dims.len()
                )))
            }
        };
        let y_dim = dims[dims.len() - 2].name();
        let x_dim = dims[dims.len() - 1].name();

        let fill = var
            .attribute("_FillValue")
            .and_then(|a| a.value().ok())
            .and_then(attribute_as_f64);

        let mut values: Vec<f64> = var.get_values::<f64, _>(..)?;
        if let Some(fill) = fill {
            for v in values.iter_mut().filter(|v| **v == fill) {
                *v = f64::NAN;
            }
        }

        let mut raster = Raster::from_vec(values, rows, cols)?;
        raster.set_nodata(Some(f64::NAN));

        let xs = coordinate(&file, &x_dim);
        let ys = coordinate(&file, &y_dim);
        if let Some(gt) = xs
            .zip(ys)
            .and_then(|(xs, ys)| GeoTransform::from_cell_centers(&xs, &ys))
        {
            raster.set_transform(gt);
        }

        debug!("NetCDF variable '{}': {} x {}", name, cols, rows);
        stack.push(name, raster)?;
    }

    Ok(stack)
}

fn coordinate(file: &netcdf::File, dim: &str) -> Option<Vec<f64>> {
    let var = file.variable(dim)?;
    if var.dimensions().len() != 1 {
        return None;
    }
    var.get_values::<f64, _>(..).ok()
}

fn attribute_as_f64(value: AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Double(v) => Some(v),
        AttributeValue::Float(v) => Some(v as f64),
        AttributeValue::Int(v) => Some(v as f64),
        AttributeValue::Short(v) => Some(v as f64),
        AttributeValue::Uchar(v) => Some(v as f64),
        AttributeValue::Schar(v) => Some(v as f64),
        _ => None,
    }
}
