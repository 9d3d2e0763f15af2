//! Reading and writing covariate layers and susceptibility maps

mod geotiff;
#[cfg(feature = "netcdf")]
mod netcdf_io;
mod stack;

pub use geotiff::{read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer};
#[cfg(feature = "netcdf")]
pub use netcdf_io::read_netcdf;
pub use stack::FeatureStack;
