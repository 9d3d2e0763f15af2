//! Common classifier interface and the serialisable estimator enum

use crate::error::{ModelError, Result};
use crate::forest::RandomForest;
use crate::gbm::GradientBoosting;
use crate::maybe_rayon::*;
use crate::params::{ModelKind, Params};
use crate::svm::Svc;
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// A supervised classifier over `f64` feature vectors and integer labels.
pub trait Classifier: Send + Sync {
    /// Fit on a (samples, features) matrix and one label per sample
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<()>;

    /// Sorted distinct labels seen during fitting; empty before `fit`
    fn classes(&self) -> &[i64];

    /// Number of features seen during fitting
    fn n_features(&self) -> usize;

    /// Class probabilities for one sample, ordered like [`Classifier::classes`].
    ///
    /// Callers guarantee the model is fitted and the row has the right length.
    fn proba_row(&self, row: ArrayView1<'_, f64>) -> Vec<f64>;

    /// Predicted label for one sample
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> i64 {
        self.classes()[argmax(&self.proba_row(row))]
    }

    /// Label and class probabilities together; the label is the most
    /// probable class unless the model decides labels some other way.
    fn predict_row_with_proba(&self, row: ArrayView1<'_, f64>) -> (i64, Vec<f64>) {
        let proba = self.proba_row(row);
        (self.classes()[argmax(&proba)], proba)
    }

    fn is_fitted(&self) -> bool {
        !self.classes().is_empty()
    }

    /// (samples, classes) probability matrix
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        check_predict_input(self, x.ncols())?;
        let k = self.classes().len();
        let flat: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .flat_map(|i| self.proba_row(x.row(i)))
            .collect();
        Array2::from_shape_vec((x.nrows(), k), flat)
            .map_err(|e| ModelError::Training(e.to_string()))
    }

    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<i64>> {
        check_predict_input(self, x.ncols())?;
        Ok((0..x.nrows())
            .into_par_iter()
            .map(|i| self.predict_row(x.row(i)))
            .collect())
    }
}

/// One of the supported classifiers, fitted or not
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Estimator {
    #[serde(rename = "RandomForest")]
    RandomForest(RandomForest),
    #[serde(rename = "SVM")]
    Svm(Svc),
    #[serde(rename = "GBM")]
    Gbm(GradientBoosting),
}

impl Estimator {
    /// Build an unfitted estimator, validating parameter names and values
    pub fn new(kind: ModelKind, params: &Params) -> Result<Self> {
        params.validate(kind)?;
        Ok(match kind {
            ModelKind::RandomForest => Estimator::RandomForest(RandomForest::new(params)?),
            ModelKind::Svm => Estimator::Svm(Svc::new(params)?),
            ModelKind::Gbm => Estimator::Gbm(GradientBoosting::new(params)?),
        })
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Estimator::RandomForest(_) => ModelKind::RandomForest,
            Estimator::Svm(_) => ModelKind::Svm,
            Estimator::Gbm(_) => ModelKind::Gbm,
        }
    }

    /// Replace hyper-parameters in place, keeping fitted state.
    ///
    /// Ensembles with `warm_start` use the kept state to continue fitting.
    pub fn set_params(&mut self, params: &Params) -> Result<()> {
        params.validate(self.kind())?;
        match self {
            Estimator::RandomForest(m) => m.set_params(params),
            Estimator::Svm(m) => m.set_params(params),
            Estimator::Gbm(m) => m.set_params(params),
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Estimator::RandomForest(m) => m,
            Estimator::Svm(m) => m,
            Estimator::Gbm(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Estimator::RandomForest(m) => m,
            Estimator::Svm(m) => m,
            Estimator::Gbm(m) => m,
        }
    }
}

impl Classifier for Estimator {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn classes(&self) -> &[i64] {
        self.inner().classes()
    }

    fn n_features(&self) -> usize {
        self.inner().n_features()
    }

    fn proba_row(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        self.inner().proba_row(row)
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> i64 {
        self.inner().predict_row(row)
    }

    fn predict_row_with_proba(&self, row: ArrayView1<'_, f64>) -> (i64, Vec<f64>) {
        self.inner().predict_row_with_proba(row)
    }
}

/// Validate a training set; returns sorted classes and encoded labels
pub(crate) fn prepare_training(
    x: ArrayView2<'_, f64>,
    y: &[i64],
) -> Result<(Vec<i64>, Vec<usize>)> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(ModelError::Training("empty training set".into()));
    }
    if x.nrows() != y.len() {
        return Err(ModelError::InvalidInput(format!(
            "{} samples but {} labels",
            x.nrows(),
            y.len()
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::Training(
            "training features contain NaN or infinite values".into(),
        ));
    }

    let mut classes = y.to_vec();
    classes.sort_unstable();
    classes.dedup();
    if classes.len() < 2 {
        return Err(ModelError::Training(format!(
            "need at least 2 classes, got {}",
            classes.len()
        )));
    }
    let encoded = y
        .iter()
        .map(|label| classes.binary_search(label).unwrap_or(0))
        .collect();
    Ok((classes, encoded))
}

fn check_predict_input<C: Classifier + ?Sized>(model: &C, n_features: usize) -> Result<()> {
    if !model.is_fitted() {
        return Err(ModelError::NotFitted);
    }
    if n_features != model.n_features() {
        return Err(ModelError::FeatureMismatch {
            expected: model.n_features(),
            actual: n_features,
        });
    }
    Ok(())
}

/// Index of the largest value; first wins on ties
pub(crate) fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}
