//! Saving and restoring fitted models as JSON

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::estimator::{Classifier, Estimator};
use crate::metrics::ClassificationReport;
use crate::model::{MlModel, Prediction};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Bumped whenever the saved layout changes incompatibly
pub const FORMAT_VERSION: u32 = 1;

/// On-disk form of an [`MlModel`]: configuration, fitted estimator, the
/// last evaluation report and the last prediction. The training table itself
/// is not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub format_version: u32,
    /// Version of the crate that wrote the file
    pub written_by: String,
    pub config: ModelConfig,
    pub estimator: Estimator,
    pub report: Option<ClassificationReport>,
    /// Absent in files written before predictions were stored
    #[serde(default)]
    pub last_prediction: Option<Prediction>,
}

impl MlModel {
    pub fn to_saved(&self) -> SavedModel {
        SavedModel {
            format_version: FORMAT_VERSION,
            written_by: env!("CARGO_PKG_VERSION").to_string(),
            config: self.config.clone(),
            estimator: self.estimator.clone(),
            report: self.report.clone(),
            last_prediction: self.last_prediction.clone(),
        }
    }

    pub fn from_saved(saved: SavedModel) -> Result<Self> {
        if saved.format_version != FORMAT_VERSION {
            return Err(ModelError::InvalidInput(format!(
                "unsupported model format version {} (expected {})",
                saved.format_version, FORMAT_VERSION
            )));
        }
        if saved.estimator.kind() != saved.config.model_type {
            return Err(ModelError::InvalidInput(format!(
                "model file declares {} but holds a {} estimator",
                saved.config.model_type,
                saved.estimator.kind()
            )));
        }
        if saved.estimator.is_fitted() && saved.estimator.n_features() != saved.config.features.len() {
            return Err(ModelError::FeatureMismatch {
                expected: saved.config.features.len(),
                actual: saved.estimator.n_features(),
            });
        }
        Ok(Self {
            config: saved.config,
            estimator: saved.estimator,
            split: None,
            y_pred: None,
            report: saved.report,
            last_prediction: saved.last_prediction,
        })
    }

    /// Write the model as JSON
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &self.to_saved())?;
        writer.flush()?;
        info!("Saved {} model to {}", self.config.model_type, path.display());
        Ok(())
    }
}

/// Restore a model written by [`MlModel::save_model`]
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<MlModel> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(landslideml_core::Error::FileNotFound(path.to_path_buf()).into());
    }
    let saved: SavedModel = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    MlModel::from_saved(saved)
}
