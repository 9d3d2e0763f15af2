//! # LandslideML Colormap
//!
//! Quicklook rendering of susceptibility maps.
//!
//! A small set of schemes suited to model outputs (continuous probability,
//! five susceptibility levels, binary classes, grayscale) on top of a
//! multi-stop interpolation engine. [`raster_to_rgba`] turns a `Raster<T>`
//! into RGBA bytes and [`write_rgba_tiff`] stores them as a georeferenced TIFF.
//!
//! ## Usage
//!
//! ```ignore
//! use landslideml_colormap::{ColorScheme, ColormapParams, write_rgba_tiff};
//!
//! let params = ColormapParams::new(ColorScheme::Susceptibility);
//! write_rgba_tiff(&map.probability, &params, "susceptibility_rgba.tif")?;
//! ```

mod render;
mod scheme;

pub use render::{auto_params, raster_to_rgba, write_rgba_tiff, ColormapParams};
pub use scheme::{evaluate, multi_stop, ColorScheme, ColorStop, Rgb};
