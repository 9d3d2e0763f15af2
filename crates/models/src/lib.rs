//! # LandslideML Models
//!
//! Classifiers and the training workflow behind landslide susceptibility maps.
//!
//! ## Classifiers
//!
//! - **Random forest**: bagged Gini trees, grown in parallel
//! - **SVM**: C-SVC with linear, rbf, poly and sigmoid kernels, one-vs-one
//! - **GBM**: gradient boosted regression trees on the log-loss
//!
//! ## Workflow
//!
//! ```ignore
//! use landslideml_models::prelude::*;
//!
//! let mut model = generate_model("training.csv", ModelKind::Gbm, &["alti", "slope"], "label", 0.25)?;
//! model.setup(&Params::new().with("n_estimators", 100).with("max_depth", 4))?;
//! println!("{}", model.evaluate_model(false)?);
//!
//! let stack = FeatureStack::from_geotiffs(&[("alti", "alti.tif"), ("slope", "slope.tif")])?;
//! model.predict(PredictionInput::Rasters(stack))?;
//! model.save_model("gbm_model.json")?;
//! ```

pub mod config;
pub mod error;
pub mod estimator;
pub mod forest;
pub mod gbm;
mod maybe_rayon;
pub mod metrics;
pub mod model;
pub mod params;
pub mod persist;
mod rng;
pub mod split;
pub mod susceptibility;
pub mod svm;
mod tree;

pub use config::ModelConfig;
pub use error::{ModelError, Result};
pub use estimator::{Classifier, Estimator};
pub use metrics::{accuracy, classification_report, confusion_matrix, ClassificationReport};
pub use model::{generate_model, MlModel, Prediction, PredictionInput, TablePrediction};
pub use params::{ModelKind, ParamValue, Params};
pub use persist::{load_model, SavedModel};
pub use split::{train_test_split, Split};
pub use susceptibility::{predict_map, SusceptibilityLevels, SusceptibilityMap};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::ModelConfig;
    pub use crate::error::{ModelError, Result};
    pub use crate::estimator::{Classifier, Estimator};
    pub use crate::metrics::ClassificationReport;
    pub use crate::model::{generate_model, MlModel, Prediction, PredictionInput};
    pub use crate::params::{ModelKind, Params};
    pub use crate::persist::load_model;
    pub use crate::susceptibility::{SusceptibilityLevels, SusceptibilityMap};
    pub use landslideml_core::{FeatureStack, Raster};
}
