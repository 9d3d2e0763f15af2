//! Co-registered covariate layers

use crate::error::{Error, Result};
use crate::io::read_geotiff;
use crate::raster::{GeoTransform, Raster};
use std::path::Path;
use tracing::debug;

/// An ordered set of named rasters sharing one grid.
///
/// Each layer holds one model feature; prediction reads the layers in the
/// order the model was trained with (see [`FeatureStack::select`]).
#[derive(Debug, Clone, Default)]
pub struct FeatureStack {
    layers: Vec<(String, Raster<f64>)>,
}

impl FeatureStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a layer. It must match the grid of the layers already present.
    pub fn push(&mut self, name: impl Into<String>, raster: Raster<f64>) -> Result<()> {
        let name = name.into();
        if self.layers.iter().any(|(n, _)| *n == name) {
            return Err(Error::Duplicate(name));
        }
        if let Some((_, first)) = self.layers.first() {
            if first.shape() != raster.shape() {
                return Err(Error::SizeMismatch {
                    er: first.rows(),
                    ec: first.cols(),
                    ar: raster.rows(),
                    ac: raster.cols(),
                });
            }
            if first.transform() != raster.transform() {
                return Err(Error::Other(format!(
                    "layer '{}' is not aligned with layer '{}'",
                    name, self.layers[0].0
                )));
            }
        }
        self.layers.push((name, raster));
        Ok(())
    }

    /// Read one GeoTIFF per feature from `(name, path)` pairs
    pub fn from_geotiffs<S, P>(layers: &[(S, P)]) -> Result<Self>
    where
        S: AsRef<str>,
        P: AsRef<Path>,
    {
        let mut stack = Self::new();
        for (name, path) in layers {
            let raster = read_geotiff::<f64, _>(path)?;
            debug!(
                "Layer '{}': {} x {} from {}",
                name.as_ref(),
                raster.cols(),
                raster.rows(),
                path.as_ref().display()
            );
            stack.push(name.as_ref(), raster)?;
        }
        Ok(stack)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().map(|(n, _)| n.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Raster<f64>> {
        self.layers.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    /// Layers in the order of `features`; error on the first missing one
    pub fn select<S: AsRef<str>>(&self, features: &[S]) -> Result<Vec<&Raster<f64>>> {
        features
            .iter()
            .map(|f| {
                self.get(f.as_ref())
                    .ok_or_else(|| Error::MissingLayer(f.as_ref().to_string()))
            })
            .collect()
    }

    /// Grid shape shared by all layers, (0, 0) when empty
    pub fn shape(&self) -> (usize, usize) {
        self.layers.first().map_or((0, 0), |(_, r)| r.shape())
    }

    pub fn transform(&self) -> GeoTransform {
        self.layers
            .first()
            .map_or_else(GeoTransform::default, |(_, r)| *r.transform())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(value: f64) -> Raster<f64> {
        let mut r = Raster::filled(3, 4, value);
        r.set_transform(GeoTransform::new(0.0, 30.0, 10.0, -10.0));
        r
    }

    #[test]
    fn test_select_reorders() {
        let mut stack = FeatureStack::new();
        stack.push("slope", layer(1.0)).unwrap();
        stack.push("alti", layer(2.0)).unwrap();

        let selected = stack.select(&["alti", "slope"]).unwrap();
        assert_eq!(selected[0].get(0, 0).unwrap(), 2.0);
        assert_eq!(selected[1].get(0, 0).unwrap(), 1.0);
        assert!(matches!(stack.select(&["clay"]), Err(Error::MissingLayer(_))));
    }

    #[test]
    fn test_push_rejects_mismatched_layers() {
        let mut stack = FeatureStack::new();
        stack.push("slope", layer(1.0)).unwrap();

        assert!(matches!(
            stack.push("alti", Raster::filled(2, 2, 0.0)),
            Err(Error::SizeMismatch { .. })
        ));
        assert!(matches!(stack.push("slope", layer(3.0)), Err(Error::Duplicate(_))));

        let mut shifted = layer(1.0);
        shifted.set_transform(GeoTransform::new(5.0, 30.0, 10.0, -10.0));
        assert!(stack.push("clay", shifted).is_err());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn test_from_geotiffs_keeps_nodata_and_alignment() {
        let dir = tempfile::tempdir().unwrap();
        let mut slope = layer(12.0);
        slope.set_nodata(Some(-9999.0));
        slope.set(1, 2, -9999.0).unwrap();
        let slope_path = dir.path().join("slope.tif");
        crate::io::write_geotiff(&slope, &slope_path).unwrap();

        let alti_path = dir.path().join("alti.tif");
        crate::io::write_geotiff(&layer(250.0), &alti_path).unwrap();

        let stack =
            FeatureStack::from_geotiffs(&[("slope", &slope_path), ("alti", &alti_path)]).unwrap();
        let read = stack.get("slope").unwrap();
        assert_eq!(read.nodata(), Some(-9999.0));
        assert!(read.is_nodata(read.get(1, 2).unwrap()));
        assert_eq!(read.statistics().valid_count, 11);
        assert_eq!(stack.transform(), GeoTransform::new(0.0, 30.0, 10.0, -10.0));

        let mut shifted = layer(1.0);
        shifted.set_transform(GeoTransform::new(100.0, 30.0, 10.0, -10.0));
        let shifted_path = dir.path().join("clay.tif");
        crate::io::write_geotiff(&shifted, &shifted_path).unwrap();
        assert!(FeatureStack::from_geotiffs(&[("slope", &slope_path), ("clay", &shifted_path)]).is_err());
    }
}
