//! End-to-end workflow: load a training table, split, fit, evaluate, predict

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::estimator::{Classifier, Estimator};
use crate::metrics::{classification_report, ClassificationReport};
use crate::params::{ModelKind, ParamValue, Params};
use crate::split::{train_test_split, Split};
use crate::susceptibility::{predict_map, SusceptibilityMap};
use landslideml_core::{Dataset, FeatureStack};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Data to predict on
#[derive(Debug, Clone)]
pub enum PredictionInput {
    /// (samples, features) matrix in the model's feature order
    Matrix(Array2<f64>),
    /// CSV table with a header containing every model feature
    Table(PathBuf),
    /// One raster per model feature
    Rasters(FeatureStack),
    /// NetCDF file with one 2D variable per model feature
    NetCdf(PathBuf),
}

/// Per-row output of a tabular prediction.
///
/// Rows with a missing feature value get no label and a NaN susceptibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePrediction {
    pub labels: Vec<Option<i64>>,
    /// Probability of the positive class
    #[serde(with = "nan_as_null")]
    pub susceptibility: Vec<f64>,
}

impl TablePrediction {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Write `row,prediction,susceptibility` lines; missing values stay empty
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path).map_err(landslideml_core::Error::from)?;
        writer
            .write_record(["row", "prediction", "susceptibility"])
            .map_err(landslideml_core::Error::from)?;
        for (row, (label, p)) in self.labels.iter().zip(&self.susceptibility).enumerate() {
            let label = label.map(|l| l.to_string()).unwrap_or_default();
            let p = if p.is_nan() { String::new() } else { p.to_string() };
            writer
                .write_record([row.to_string(), label, p])
                .map_err(landslideml_core::Error::from)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// JSON has no NaN; missing susceptibilities travel as `null`
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        values
            .iter()
            .map(|v| (!v.is_nan()).then_some(*v))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "output", rename_all = "snake_case")]
pub enum Prediction {
    Table(TablePrediction),
    Map(SusceptibilityMap),
}

/// A classifier bound to its training table and feature list.
///
/// Created with [`MlModel::new`] (or [`generate_model`]) the estimator is not
/// fitted yet; [`MlModel::setup`] fits it with a set of hyper-parameters.
#[derive(Debug, Clone)]
pub struct MlModel {
    pub(crate) config: ModelConfig,
    pub(crate) estimator: Estimator,
    /// Absent for models restored from disk
    pub(crate) split: Option<Split>,
    pub(crate) y_pred: Option<Vec<i64>>,
    pub(crate) report: Option<ClassificationReport>,
    pub(crate) last_prediction: Option<Prediction>,
}

/// Build a model from a CSV file, feature list and target column
pub fn generate_model<P, S>(
    path: P,
    model_type: ModelKind,
    features: &[S],
    target: &str,
    test_size: f64,
) -> Result<MlModel>
where
    P: Into<PathBuf>,
    S: AsRef<str>,
{
    MlModel::new(ModelConfig::new(path, model_type, features, target, test_size))
}

impl MlModel {
    /// Verify the configuration, read the table and split it.
    ///
    /// Rows with a missing feature or target value are dropped before
    /// splitting.
    pub fn new(config: ModelConfig) -> Result<Self> {
        config.verify()?;
        let start = Instant::now();

        let dataset = Dataset::read_csv(&config.data_path)?;
        let mut needed = config.features.clone();
        needed.push(config.target.clone());
        let complete = dataset.drop_incomplete(&needed)?;
        if complete.n_rows() < dataset.n_rows() {
            warn!(
                "Dropped {} of {} rows with missing values",
                dataset.n_rows() - complete.n_rows(),
                dataset.n_rows()
            );
        }

        let x = complete.features(&config.features)?;
        let y = complete.labels(&config.target)?;
        let split = train_test_split(x.view(), &y, config.test_size, config.random_state)?;
        let estimator = Estimator::new(config.model_type, &config.params)?;

        info!(
            "Loaded {}: {} train / {} test samples, {} features",
            config.data_path.display(),
            split.n_train(),
            split.n_test(),
            config.features.len()
        );
        debug!("Dataset prepared in {:.2?}", start.elapsed());

        Ok(Self {
            config,
            estimator,
            split: Some(split),
            y_pred: None,
            report: None,
            last_prediction: None,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn model_type(&self) -> ModelKind {
        self.config.model_type
    }

    pub fn features(&self) -> &[String] {
        &self.config.features
    }

    pub fn target(&self) -> &str {
        &self.config.target
    }

    /// Hyper-parameters accumulated over [`MlModel::setup`] calls
    pub fn params(&self) -> &Params {
        &self.config.params
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn split(&self) -> Option<&Split> {
        self.split.as_ref()
    }

    /// Predictions on the test split
    pub fn y_pred(&self) -> Option<&[i64]> {
        self.y_pred.as_deref()
    }

    pub fn report(&self) -> Option<&ClassificationReport> {
        self.report.as_ref()
    }

    pub fn last_prediction(&self) -> Option<&Prediction> {
        self.last_prediction.as_ref()
    }

    /// The last prediction, when it was made over rasters
    pub fn prediction_map(&self) -> Option<&SusceptibilityMap> {
        match &self.last_prediction {
            Some(Prediction::Map(map)) => Some(map),
            _ => None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.estimator.is_fitted()
    }

    /// Class whose probability is reported as susceptibility: the largest
    /// label, i.e. `1` for 0/1 landslide inventories.
    pub fn positive_class(&self) -> Result<i64> {
        self.estimator
            .classes()
            .last()
            .copied()
            .ok_or(ModelError::NotFitted)
    }

    /// Merge `params` into the current hyper-parameters, fit on the train
    /// split and predict the test split.
    ///
    /// The estimator is rebuilt unless `warm_start` is set, in which case
    /// forests and boosting continue from the fitted state. On error the
    /// model keeps its previous estimator, parameters and predictions.
    pub fn setup(&mut self, params: &Params) -> Result<()> {
        params.validate(self.config.model_type)?;
        let mut merged = self.config.params.clone();
        merged.merge(params);

        let warm = matches!(merged.get("warm_start"), Some(ParamValue::Bool(true)));
        let mut candidate = if warm && self.estimator.is_fitted() {
            let mut estimator = self.estimator.clone();
            estimator.set_params(&merged)?;
            estimator
        } else {
            Estimator::new(self.config.model_type, &merged)?
        };
        let y_pred = self.fit_and_score(&mut candidate)?;

        self.estimator = candidate;
        self.config.params = merged;
        self.y_pred = Some(y_pred);
        self.report = None;
        Ok(())
    }

    fn fit_and_score(&self, estimator: &mut Estimator) -> Result<Vec<i64>> {
        let start = Instant::now();
        let split = training_split(&self.split)?;
        estimator.fit(split.x_train.view(), &split.y_train)?;
        let y_pred = estimator.predict(split.x_test.view())?;
        info!(
            "Fitted {} on {} samples in {:.2?}",
            self.config.model_type,
            split.n_train(),
            start.elapsed()
        );
        Ok(y_pred)
    }

    /// Classification report on the test split.
    ///
    /// Without earlier test predictions the model is fitted (if needed) and
    /// the test split predicted first. `show` prints the text report.
    pub fn evaluate_model(&mut self, show: bool) -> Result<&ClassificationReport> {
        if self.y_pred.is_none() {
            warn!("No predictions available yet; predicting the test split");
            if self.estimator.is_fitted() {
                let split = training_split(&self.split)?;
                self.y_pred = Some(self.estimator.predict(split.x_test.view())?);
            } else {
                let mut estimator = self.estimator.clone();
                let y_pred = self.fit_and_score(&mut estimator)?;
                self.estimator = estimator;
                self.y_pred = Some(y_pred);
            }
        }

        let split = training_split(&self.split)?;
        let y_pred = self.y_pred.as_deref().unwrap_or_default();
        let report = classification_report(&split.y_test, y_pred)?;
        if show {
            println!("{}", report);
        }
        Ok(&*self.report.insert(report))
    }

    /// Predict labels and susceptibility for `input`, keeping the result as
    /// the model's last prediction.
    pub fn predict(&mut self, input: PredictionInput) -> Result<&Prediction> {
        if !self.estimator.is_fitted() {
            return Err(ModelError::NotFitted);
        }
        let positive = self.positive_class()?;

        let prediction = match input {
            PredictionInput::Matrix(x) => Prediction::Table(self.predict_table(x.view(), positive)?),
            PredictionInput::Table(path) => {
                let dataset = Dataset::read_csv(&path)?;
                let x = dataset.features(&self.config.features)?;
                Prediction::Table(self.predict_table(x.view(), positive)?)
            }
            PredictionInput::Rasters(stack) => Prediction::Map(predict_map(
                &self.estimator,
                &stack,
                &self.config.features,
                positive,
            )?),
            PredictionInput::NetCdf(path) => {
                let stack = read_netcdf_stack(&path, &self.config.features)?;
                Prediction::Map(predict_map(
                    &self.estimator,
                    &stack,
                    &self.config.features,
                    positive,
                )?)
            }
        };
        Ok(&*self.last_prediction.insert(prediction))
    }

    fn predict_table(&self, x: ArrayView2<'_, f64>, positive: i64) -> Result<TablePrediction> {
        let n_features = self.estimator.n_features();
        if x.ncols() != n_features {
            return Err(ModelError::FeatureMismatch {
                expected: n_features,
                actual: x.ncols(),
            });
        }
        let positive = self
            .estimator
            .classes()
            .iter()
            .position(|&c| c == positive)
            .unwrap_or(0);

        let complete: Vec<usize> = x
            .outer_iter()
            .enumerate()
            .filter(|(_, row)| row.iter().all(|v| v.is_finite()))
            .map(|(i, _)| i)
            .collect();
        let subset = x.select(Axis(0), &complete);

        let mut labels = vec![None; x.nrows()];
        let mut susceptibility = vec![f64::NAN; x.nrows()];
        if !complete.is_empty() {
            let predicted = self.estimator.predict(subset.view())?;
            let proba = self.estimator.predict_proba(subset.view())?;
            for (k, &row) in complete.iter().enumerate() {
                labels[row] = Some(predicted[k]);
                susceptibility[row] = proba[[k, positive]];
            }
        }
        if complete.len() < x.nrows() {
            warn!(
                "{} rows with missing feature values were not predicted",
                x.nrows() - complete.len()
            );
        }
        Ok(TablePrediction {
            labels,
            susceptibility,
        })
    }
}

fn training_split(split: &Option<Split>) -> Result<&Split> {
    split.as_ref().ok_or_else(|| {
        ModelError::InvalidInput("model was restored without its training data".into())
    })
}

#[cfg(feature = "netcdf")]
fn read_netcdf_stack(path: &Path, features: &[String]) -> Result<FeatureStack> {
    Ok(landslideml_core::io::read_netcdf(path, features)?)
}

#[cfg(not(feature = "netcdf"))]
fn read_netcdf_stack(path: &Path, _features: &[String]) -> Result<FeatureStack> {
    Err(ModelError::InvalidInput(format!(
        "cannot read {}: built without NetCDF support (enable the `netcdf` feature)",
        path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// 0/1 labels decided by `slope`, with `noise` unrelated
    fn training_csv(n: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "slope,noise,label").unwrap();
        for i in 0..n {
            let slope = (i * 37 % 60) as f64;
            let label = i32::from(slope >= 30.0);
            writeln!(file, "{},{},{}", slope, (i * 13) % 5, label).unwrap();
        }
        file
    }

    fn forest_model(file: &tempfile::NamedTempFile) -> MlModel {
        generate_model(
            file.path(),
            ModelKind::RandomForest,
            &["slope", "noise"],
            "label",
            0.25,
        )
        .unwrap()
    }

    #[test]
    fn test_new_model_is_split_but_unfitted() {
        let file = training_csv(40);
        let model = forest_model(&file);
        let split = model.split().unwrap();
        assert_eq!(split.n_test(), 10);
        assert_eq!(split.n_train(), 30);
        assert!(!model.is_fitted());
        assert!(model.y_pred().is_none());
    }

    #[test]
    fn test_new_model_rejects_bad_input() {
        let file = training_csv(10);
        assert!(generate_model(file.path(), ModelKind::Svm, &["slope"], "label", 0.0).is_err());
        assert!(generate_model(file.path(), ModelKind::Svm, &["aspect"], "label", 0.2).is_err());
        assert!(generate_model(file.path(), ModelKind::Svm, &["slope"], "class", 0.2).is_err());
        let none: [&str; 0] = [];
        assert!(generate_model(file.path(), ModelKind::Svm, &none, "label", 0.2).is_err());
    }

    #[test]
    fn test_setup_fits_and_predicts_test_split() {
        let file = training_csv(80);
        let mut model = forest_model(&file);
        model
            .setup(&Params::new().with("n_estimators", 20).with("max_depth", 4))
            .unwrap();
        assert!(model.is_fitted());
        assert_eq!(model.y_pred().unwrap().len(), 20);
        assert_eq!(model.params().usize_or("n_estimators", 0).unwrap(), 20);

        let report = model.evaluate_model(false).unwrap();
        assert!(report.accuracy > 0.9);
        assert!(model.report().is_some());
    }

    #[test]
    fn test_setup_rejects_unknown_params() {
        let file = training_csv(20);
        let mut model = forest_model(&file);
        let err = model
            .setup(&Params::new().with("kernel", "rbf").with("C", 1.0))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid kwargs found: C, kernel");
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_evaluate_before_setup_fits_first() {
        let file = training_csv(40);
        let mut model = forest_model(&file);
        let report = model.evaluate_model(false).unwrap();
        assert_eq!(report.macro_avg.support, 10);
        assert!(model.is_fitted());
        assert!(model.y_pred().is_some());
    }

    #[test]
    fn test_warm_start_setup_grows_forest() {
        let file = training_csv(40);
        let mut model = forest_model(&file);
        model
            .setup(&Params::new().with("n_estimators", 5).with("warm_start", true))
            .unwrap();
        model.setup(&Params::new().with("n_estimators", 9)).unwrap();
        match model.estimator() {
            Estimator::RandomForest(rf) => assert_eq!(rf.n_trees(), 9),
            other => panic!("unexpected estimator {:?}", other.kind()),
        }
    }

    #[test]
    fn test_failed_warm_start_keeps_previous_fit() {
        let file = training_csv(40);
        let mut model = forest_model(&file);
        model
            .setup(&Params::new().with("n_estimators", 5).with("warm_start", true))
            .unwrap();
        let y_pred = model.y_pred().unwrap().to_vec();

        // A warm-started forest cannot shrink
        assert!(model.setup(&Params::new().with("n_estimators", 3)).is_err());
        assert_eq!(model.params().usize_or("n_estimators", 0).unwrap(), 5);
        assert_eq!(model.y_pred().unwrap(), y_pred.as_slice());
        match model.estimator() {
            Estimator::RandomForest(rf) => {
                assert_eq!(rf.n_trees(), 5);
                assert_eq!(rf.params().n_estimators, 5);
            }
            other => panic!("unexpected estimator {:?}", other.kind()),
        }
    }

    #[test]
    fn test_predict_matrix_and_table() {
        let file = training_csv(60);
        let mut model = forest_model(&file);
        model.setup(&Params::new().with("n_estimators", 15)).unwrap();

        let x = ndarray::array![[5.0, 1.0], [55.0, 2.0], [f64::NAN, 0.0]];
        match model.predict(PredictionInput::Matrix(x)).unwrap() {
            Prediction::Table(t) => {
                assert_eq!(t.labels, vec![Some(0), Some(1), None]);
                assert!(t.susceptibility[1] > 0.5);
                assert!(t.susceptibility[2].is_nan());
            }
            Prediction::Map(_) => panic!("expected a table prediction"),
        }

        let mut table = tempfile::NamedTempFile::new().unwrap();
        writeln!(table, "noise,slope\n0,50\n1,3").unwrap();
        match model.predict(PredictionInput::Table(table.path().to_path_buf())).unwrap() {
            Prediction::Table(t) => assert_eq!(t.labels, vec![Some(1), Some(0)]),
            Prediction::Map(_) => panic!("expected a table prediction"),
        }
        assert!(model.prediction_map().is_none());

        let out = tempfile::NamedTempFile::new().unwrap();
        if let Some(Prediction::Table(t)) = model.last_prediction() {
            t.write_csv(out.path()).unwrap();
        }
        let written = std::fs::read_to_string(out.path()).unwrap();
        assert!(written.starts_with("row,prediction,susceptibility"));
        assert_eq!(written.lines().count(), 3);
    }

    #[test]
    fn test_predict_requires_fit() {
        let file = training_csv(20);
        let mut model = forest_model(&file);
        let x = ndarray::array![[1.0, 1.0]];
        assert!(matches!(
            model.predict(PredictionInput::Matrix(x)),
            Err(ModelError::NotFitted)
        ));
    }
}
