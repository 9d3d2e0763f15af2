//! # LandslideML Core
//!
//! Data primitives shared by the LandslideML crates.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced 2D grid holding one covariate or a model output
//! - `GeoTransform`: affine transformation for georeferencing
//! - `Dataset`: tabular training/prediction samples read from CSV
//! - `FeatureStack`: co-registered rasters, one per model feature
//! - GeoTIFF I/O (and NetCDF with the `netcdf` feature)

pub mod dataset;
pub mod error;
pub mod io;
pub mod raster;

pub use dataset::Dataset;
pub use error::{Error, Result};
pub use io::FeatureStack;
pub use raster::{GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::dataset::Dataset;
    pub use crate::error::{Error, Result};
    pub use crate::io::FeatureStack;
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
}
