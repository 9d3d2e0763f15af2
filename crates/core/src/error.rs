//! Error types for LandslideML core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for data loading and raster operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File '{}' does not exist", .0.display())]
    FileNotFound(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Column '{0}' not found in dataset")]
    MissingColumn(String),

    #[error("Layer '{0}' not found in feature stack")]
    MissingLayer(String),

    #[error("Duplicate name: {0}")]
    Duplicate(String),

    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Invalid label {value} in column '{column}' at row {row}: labels must be integral")]
    InvalidLabel { column: String, row: usize, value: f64 },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("NetCDF error: {0}")]
    #[cfg(feature = "netcdf")]
    NetCdf(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

#[cfg(feature = "netcdf")]
impl From<netcdf::Error> for Error {
    fn from(e: netcdf::Error) -> Self {
        Error::NetCdf(e.to_string())
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;
