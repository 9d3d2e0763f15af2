//! Susceptibility maps from a fitted classifier and a feature stack

use crate::error::{ModelError, Result};
use crate::estimator::Classifier;
use crate::maybe_rayon::*;
use landslideml_core::{FeatureStack, Raster};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Per-pixel model output on the grid of the input stack.
///
/// Pixels where any feature is nodata are NaN in every layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SusceptibilityMap {
    /// Predicted class label
    pub classes: Raster<f64>,
    /// Probability of the positive (landslide) class
    pub probability: Raster<f64>,
    /// Susceptibility level, once [`SusceptibilityMap::classify_levels`] ran
    pub levels: Option<Raster<f64>>,
}

impl SusceptibilityMap {
    pub fn classify_levels(&mut self, levels: &SusceptibilityLevels) -> Result<&Raster<f64>> {
        Ok(&*self.levels.insert(levels.classify(&self.probability)?))
    }

    /// Number of pixels that received a prediction
    pub fn valid_cells(&self) -> usize {
        self.probability.data().iter().filter(|v| !v.is_nan()).count()
    }
}

/// Predict every pixel of `stack`, reading layers in `features` order.
///
/// `positive_class` selects the class whose probability is reported as
/// susceptibility.
pub fn predict_map<C, S>(
    model: &C,
    stack: &FeatureStack,
    features: &[S],
    positive_class: i64,
) -> Result<SusceptibilityMap>
where
    C: Classifier + ?Sized,
    S: AsRef<str>,
{
    if !model.is_fitted() {
        return Err(ModelError::NotFitted);
    }
    if features.len() != model.n_features() {
        return Err(ModelError::FeatureMismatch {
            expected: model.n_features(),
            actual: features.len(),
        });
    }
    let positive = model
        .classes()
        .iter()
        .position(|&c| c == positive_class)
        .ok_or_else(|| {
            ModelError::InvalidInput(format!("class {} was not seen in training", positive_class))
        })?;

    let layers = stack.select(features)?;
    let (rows, cols) = stack.shape();
    let start = Instant::now();

    let per_row: Vec<Vec<(f64, f64)>> = (0..rows)
        .into_par_iter()
        .map(|r| {
            let mut sample = vec![0.0; layers.len()];
            (0..cols)
                .map(|c| {
                    for (slot, layer) in sample.iter_mut().zip(&layers) {
                        // SAFETY: r < rows and c < cols, every layer shares the stack shape
                        let v = unsafe { layer.get_unchecked(r, c) };
                        if layer.is_nodata(v) || !v.is_finite() {
                            return (f64::NAN, f64::NAN);
                        }
                        *slot = v;
                    }
                    let row = ArrayView1::from(sample.as_slice());
                    let (label, proba) = model.predict_row_with_proba(row);
                    (label as f64, proba[positive])
                })
                .collect()
        })
        .collect();

    let (class_data, proba_data): (Vec<f64>, Vec<f64>) = per_row.into_iter().flatten().unzip();

    let template = layers
        .first()
        .ok_or_else(|| ModelError::InvalidInput("feature stack is empty".into()))?;
    let mut classes = template.with_same_meta(class_data)?;
    classes.set_nodata(Some(f64::NAN));
    let mut probability = template.with_same_meta(proba_data)?;
    probability.set_nodata(Some(f64::NAN));

    debug!(
        "Predicted {} x {} pixels in {:.2?}",
        cols,
        rows,
        start.elapsed()
    );

    Ok(SusceptibilityMap {
        classes,
        probability,
        levels: None,
    })
}

/// Ordered probability breaks splitting [0, 1] into susceptibility levels.
///
/// With the default four breaks a probability maps to level 1 (very low)
/// through 5 (very high). A value equal to a break falls in the upper level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SusceptibilityLevels {
    breaks: Vec<f64>,
}

impl Default for SusceptibilityLevels {
    fn default() -> Self {
        Self {
            breaks: vec![0.2, 0.4, 0.6, 0.8],
        }
    }
}

impl SusceptibilityLevels {
    pub const NAMES: [&'static str; 5] = ["very low", "low", "moderate", "high", "very high"];

    pub fn new(breaks: Vec<f64>) -> Result<Self> {
        if breaks.is_empty() {
            return Err(ModelError::InvalidInput("at least one break is required".into()));
        }
        if breaks.iter().any(|b| !(0.0..=1.0).contains(b)) {
            return Err(ModelError::InvalidInput(
                "level breaks must lie within [0, 1]".into(),
            ));
        }
        if breaks.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ModelError::InvalidInput(
                "level breaks must be strictly ascending".into(),
            ));
        }
        Ok(Self { breaks })
    }

    pub fn breaks(&self) -> &[f64] {
        &self.breaks
    }

    pub fn n_levels(&self) -> usize {
        self.breaks.len() + 1
    }

    /// Level (1-based) of a probability, `None` for NaN
    pub fn level(&self, probability: f64) -> Option<u8> {
        if probability.is_nan() {
            return None;
        }
        let below = self.breaks.iter().filter(|&&b| probability >= b).count();
        Some(below as u8 + 1)
    }

    /// Descriptive name of a level when there are five levels
    pub fn level_name(&self, level: u8) -> Option<&'static str> {
        if self.n_levels() != Self::NAMES.len() || level == 0 {
            return None;
        }
        Self::NAMES.get(level as usize - 1).copied()
    }

    pub fn classify(&self, probability: &Raster<f64>) -> Result<Raster<f64>> {
        let data: Vec<f64> = probability
            .data()
            .iter()
            .map(|&p| self.level(p).map_or(f64::NAN, f64::from))
            .collect();
        let mut out = probability.with_same_meta(data)?;
        out.set_nodata(Some(f64::NAN));
        Ok(out)
    }
}
