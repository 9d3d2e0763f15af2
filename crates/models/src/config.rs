//! Training configuration (TOML)
//!
//! ```toml
//! data_path = "training.csv"
//! model_type = "GBM"
//! target = "label"
//! features = ["alti", "slope", "aspect", "clay"]
//! test_size = 0.25
//!
//! [params]
//! n_estimators = 100
//! max_depth = 4
//! ```

use crate::error::{ModelError, Result};
use crate::params::{ModelKind, Params};
use crate::split::DEFAULT_SEED;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn default_model_type() -> ModelKind {
    ModelKind::RandomForest
}

fn default_target() -> String {
    "label".to_string()
}

fn default_test_size() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

/// Everything needed to build an [`crate::MlModel`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    /// CSV training table with a header row
    pub data_path: PathBuf,

    #[serde(default = "default_model_type")]
    pub model_type: ModelKind,

    /// Integer class column
    #[serde(default = "default_target")]
    pub target: String,

    /// Feature columns, in the order the model sees them
    pub features: Vec<String>,

    /// Fraction of rows held out for evaluation
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Seed of the train/test shuffle
    #[serde(default = "default_seed")]
    pub random_state: u64,

    /// Estimator hyper-parameters
    #[serde(default)]
    pub params: Params,
}

impl ModelConfig {
    pub fn new<S: AsRef<str>>(
        data_path: impl Into<PathBuf>,
        model_type: ModelKind,
        features: &[S],
        target: &str,
        test_size: f64,
    ) -> Self {
        Self {
            data_path: data_path.into(),
            model_type,
            target: target.to_string(),
            features: features.iter().map(|f| f.as_ref().to_string()).collect(),
            test_size,
            random_state: DEFAULT_SEED,
            params: Params::new(),
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a file; a relative `data_path` is resolved against the
    /// file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if config.data_path.is_relative() {
            if let Some(dir) = path.parent() {
                config.data_path = dir.join(&config.data_path);
            }
        }
        Ok(config)
    }

    /// Check everything that can be checked before reading the data
    pub fn verify(&self) -> Result<()> {
        if !self.data_path.is_file() {
            return Err(landslideml_core::Error::FileNotFound(self.data_path.clone()).into());
        }
        if self.target.trim().is_empty() {
            return Err(ModelError::InvalidInput("target column name is empty".into()));
        }
        if self.features.is_empty() {
            return Err(ModelError::InvalidInput("feature list is empty".into()));
        }
        let mut seen = HashSet::new();
        for feature in &self.features {
            if !seen.insert(feature.as_str()) {
                return Err(ModelError::InvalidInput(format!(
                    "feature '{}' listed twice",
                    feature
                )));
            }
        }
        if self.features.contains(&self.target) {
            return Err(ModelError::InvalidInput(format!(
                "target '{}' is also listed as a feature",
                self.target
            )));
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ModelError::invalid_parameter(
                "test_size",
                self.test_size,
                "must be between 0 and 1",
            ));
        }
        self.params.validate(self.model_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;
    use std::io::Write;

    #[test]
    fn test_parse_with_defaults() {
        let config = ModelConfig::from_toml_str(
            r#"
            data_path = "training.csv"
            features = ["alti", "slope"]
            "#,
        )
        .unwrap();
        assert_eq!(config.model_type, ModelKind::RandomForest);
        assert_eq!(config.target, "label");
        assert_eq!(config.test_size, 0.2);
        assert_eq!(config.random_state, 42);
        assert!(config.params.is_empty());
    }

    #[test]
    fn test_parse_params_table() {
        let config = ModelConfig::from_toml_str(
            r#"
            data_path = "training.csv"
            model_type = "SVM"
            features = ["alti"]
            test_size = 0.25

            [params]
            C = 10
            kernel = "linear"
            probability = true
            gamma = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.model_type, ModelKind::Svm);
        assert_eq!(config.params.get("C"), Some(&ParamValue::Int(10)));
        assert_eq!(config.params.get("gamma"), Some(&ParamValue::Float(0.5)));
        assert_eq!(config.params.get("probability"), Some(&ParamValue::Bool(true)));
    }

    #[test]
    fn test_unknown_keys_and_kinds_rejected() {
        assert!(ModelConfig::from_toml_str("data_path = 'a.csv'\nfeatures = []\ncolour = 1").is_err());
        assert!(ModelConfig::from_toml_str("data_path = 'a.csv'\nfeatures = []\nmodel_type = 'KNN'").is_err());
    }

    #[test]
    fn test_verify() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "alti,label").unwrap();
        let config = ModelConfig::new(file.path(), ModelKind::Gbm, &["alti"], "label", 0.3);
        assert!(config.verify().is_ok());

        let missing = ModelConfig::new("/no/such/file.csv", ModelKind::Gbm, &["alti"], "label", 0.3);
        assert!(missing.verify().is_err());

        let twice = ModelConfig::new(file.path(), ModelKind::Gbm, &["alti", "alti"], "label", 0.3);
        assert!(twice.verify().is_err());

        let bad_size = ModelConfig::new(file.path(), ModelKind::Gbm, &["alti"], "label", 1.0);
        assert!(bad_size.verify().is_err());

        let bad_param = config.with_params(Params::new().with("kernel", "rbf"));
        assert!(matches!(bad_param.verify(), Err(ModelError::InvalidParams(_))));
    }

    #[test]
    fn test_relative_data_path_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.toml");
        std::fs::write(&path, "data_path = \"data/training.csv\"\nfeatures = [\"slope\"]\n").unwrap();
        let config = ModelConfig::from_file(&path).unwrap();
        assert_eq!(config.data_path, dir.path().join("data/training.csv"));
    }
}
