//! Gradient boosting classifier
//!
//! Additive model of shallow regression trees fitted to the negative gradient
//! of the log-loss. Two classes use a single score (log-odds) and one tree per
//! stage; K > 2 classes use K scores with a softmax and K trees per stage.
//! Leaf values are set with one Newton step per leaf.

use crate::error::{ModelError, Result};
use crate::estimator::{prepare_training, Classifier};
use crate::params::{MaxFeatures, Params};
use crate::rng::Lcg;
use crate::tree::{DecisionTree, Target, TreeParams};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Fraction of samples drawn (without replacement) per stage
    pub subsample: f64,
    pub max_features: MaxFeatures,
    pub random_state: u64,
    pub warm_start: bool,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: Some(3),
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            max_features: MaxFeatures::All,
            random_state: 0,
            warm_start: false,
        }
    }
}

impl GbmParams {
    pub fn from_params(p: &Params) -> Result<Self> {
        let d = Self::default();
        let params = Self {
            n_estimators: p.usize_or("n_estimators", d.n_estimators)?,
            learning_rate: p.f64_or("learning_rate", d.learning_rate)?,
            max_depth: match p.get("max_depth") {
                None => d.max_depth,
                Some(_) => p.optional_usize("max_depth")?,
            },
            min_samples_split: p.usize_or("min_samples_split", d.min_samples_split)?,
            min_samples_leaf: p.usize_or("min_samples_leaf", d.min_samples_leaf)?,
            subsample: p.f64_or("subsample", d.subsample)?,
            max_features: p.max_features_or(d.max_features)?,
            random_state: p.seed()?,
            warm_start: p.bool_or("warm_start", d.warm_start)?,
        };
        if params.n_estimators == 0 {
            return Err(ModelError::invalid_parameter("n_estimators", 0, "must be at least 1"));
        }
        if !(params.learning_rate > 0.0) {
            return Err(ModelError::invalid_parameter(
                "learning_rate",
                params.learning_rate,
                "must be positive",
            ));
        }
        if !(params.subsample > 0.0 && params.subsample <= 1.0) {
            return Err(ModelError::invalid_parameter(
                "subsample",
                params.subsample,
                "must be in (0, 1]",
            ));
        }
        if params.min_samples_split < 2 || params.min_samples_leaf == 0 {
            return Err(ModelError::invalid_parameter(
                "min_samples_split",
                params.min_samples_split,
                "need min_samples_split >= 2 and min_samples_leaf >= 1",
            ));
        }
        Ok(params)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    params: GbmParams,
    classes: Vec<i64>,
    n_features: usize,
    /// Prior scores: one log-odds for two classes, else one log-prior per class
    init: Vec<f64>,
    /// One tree per score per stage
    stages: Vec<Vec<DecisionTree>>,
}

impl GradientBoosting {
    pub fn new(params: &Params) -> Result<Self> {
        Ok(Self::with_params(GbmParams::from_params(params)?))
    }

    pub fn with_params(params: GbmParams) -> Self {
        Self {
            params,
            classes: Vec::new(),
            n_features: 0,
            init: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn set_params(&mut self, params: &Params) -> Result<()> {
        self.params = GbmParams::from_params(params)?;
        Ok(())
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    /// Raw additive scores for one sample
    fn scores(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut f = self.init.clone();
        for stage in &self.stages {
            for (score, tree) in f.iter_mut().zip(stage) {
                *score += self.params.learning_rate * tree.predict_row(row)[0];
            }
        }
        f
    }

    fn init_scores(counts: &[f64], n: f64) -> Vec<f64> {
        if counts.len() == 2 {
            let p = (counts[1] / n).clamp(1e-12, 1.0 - 1e-12);
            vec![(p / (1.0 - p)).ln()]
        } else {
            counts.iter().map(|c| (c / n).max(1e-12).ln()).collect()
        }
    }
}

impl Classifier for GradientBoosting {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<()> {
        let (classes, encoded) = prepare_training(x, y)?;
        let n = x.nrows();
        let k = classes.len();
        let n_scores = if k == 2 { 1 } else { k };
        let p = self.params.clone();

        let continuing = p.warm_start && self.is_fitted();
        if continuing {
            if classes != self.classes || x.ncols() != self.n_features {
                return Err(ModelError::Training(
                    "warm start needs the same classes and features as the previous fit".into(),
                ));
            }
            if p.n_estimators < self.stages.len() {
                return Err(ModelError::invalid_parameter(
                    "n_estimators",
                    p.n_estimators,
                    format!("must be >= {} when warm_start is set", self.stages.len()),
                ));
            }
            if p.n_estimators == self.stages.len() {
                warn!("Warm-start fitting without increasing n_estimators does not add stages");
            }
        } else {
            let mut counts = vec![0.0; k];
            for &c in &encoded {
                counts[c] += 1.0;
            }
            self.init = Self::init_scores(&counts, n as f64);
            self.stages.clear();
            self.classes = classes;
            self.n_features = x.ncols();
        }

        // Current scores of every training sample
        let mut f: Vec<Vec<f64>> = (0..n).map(|i| self.scores(x.row(i))).collect();

        let tree_params = TreeParams {
            max_depth: p.max_depth,
            min_samples_split: p.min_samples_split,
            min_samples_leaf: p.min_samples_leaf,
            max_features: p.max_features.resolve(x.ncols()),
        };
        let n_sub = ((p.subsample * n as f64).round() as usize).clamp(1, n);
        let mut rng = Lcg::new(p.random_state ^ (self.stages.len() as u64).wrapping_mul(0x9E37_79B9));
        let start = self.stages.len();

        for _ in start..p.n_estimators {
            let proba: Vec<Vec<f64>> = f.iter().map(|s| scores_to_proba(s)).collect();
            let mut sample_pool: Vec<usize> = (0..n).collect();
            if n_sub < n {
                rng.shuffle(&mut sample_pool);
                sample_pool.truncate(n_sub);
            }

            let mut stage = Vec::with_capacity(n_scores);
            for s in 0..n_scores {
                // Class whose indicator this score models
                let class = if n_scores == 1 { 1 } else { s };
                let residual: Vec<f64> = (0..n)
                    .map(|i| f64::from(u8::from(encoded[i] == class)) - proba[i][class])
                    .collect();

                let mut samples = sample_pool.clone();
                let mut tree = DecisionTree::fit(
                    x,
                    Target::Values(&residual),
                    &mut samples,
                    tree_params,
                    rng.fork(),
                );
                newton_leaf_values(&mut tree, x, &sample_pool, &residual, n_scores);

                for i in 0..n {
                    f[i][s] += p.learning_rate * tree.predict_row(x.row(i))[0];
                }
                stage.push(tree);
            }
            self.stages.push(stage);
        }

        debug!(
            "Gradient boosting: {} stages x {} trees, {} samples",
            self.stages.len(),
            n_scores,
            n
        );
        Ok(())
    }

    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn proba_row(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        scores_to_proba(&self.scores(row))
    }
}

/// Class probabilities from raw scores (sigmoid for one score, else softmax)
fn scores_to_proba(scores: &[f64]) -> Vec<f64> {
    if scores.len() == 1 {
        let p1 = 1.0 / (1.0 + (-scores[0]).exp());
        return vec![1.0 - p1, p1];
    }
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.iter().map(|e| e / sum).collect()
}

/// Replace each leaf value with the Newton step of the log-loss over the
/// in-bag samples that reach it
fn newton_leaf_values(
    tree: &mut DecisionTree,
    x: ArrayView2<'_, f64>,
    samples: &[usize],
    residual: &[f64],
    n_scores: usize,
) {
    let mut sums: std::collections::HashMap<usize, (f64, f64)> = std::collections::HashMap::new();
    for &i in samples {
        let leaf = tree.leaf_index(x.row(i));
        let r = residual[i];
        // Binary: y - p has |r|(1-|r|) = p(1-p)
        let h = r.abs() * (1.0 - r.abs());
        let entry = sums.entry(leaf).or_insert((0.0, 0.0));
        entry.0 += r;
        entry.1 += h;
    }

    let scale = if n_scores == 1 {
        1.0
    } else {
        (n_scores as f64 - 1.0) / n_scores as f64
    };
    for (leaf, (num, den)) in sums {
        let value = if den.abs() < 1e-150 { 0.0 } else { scale * num / den };
        tree.set_leaf_value(leaf, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn three_bands(n: usize, seed: u64) -> (Array2<f64>, Vec<i64>) {
        let mut rng = Lcg::new(seed);
        let mut x = Array2::zeros((n, 2));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let class = (i % 3) as i64;
            x[[i, 0]] = class as f64 * 10.0 + rng.next_f64() * 3.0;
            x[[i, 1]] = rng.next_f64();
            y.push(class + 1);
        }
        (x, y)
    }

    fn accuracy(pred: &[i64], truth: &[i64]) -> f64 {
        pred.iter().zip(truth).filter(|(a, b)| a == b).count() as f64 / truth.len() as f64
    }

    #[test]
    fn test_binary_boosting() {
        let (x, y3) = three_bands(150, 1);
        let y: Vec<i64> = y3.iter().map(|&c| i64::from(c == 3)).collect();

        let mut gbm = GradientBoosting::new(&Params::new().with("n_estimators", 30)).unwrap();
        gbm.fit(x.view(), &y).unwrap();

        let pred = gbm.predict(x.view()).unwrap();
        assert!(accuracy(&pred, &y) > 0.97);
        let proba = gbm.predict_proba(x.view()).unwrap();
        assert!(proba.rows().into_iter().all(|r| (r.sum() - 1.0).abs() < 1e-9));
    }

    #[test]
    fn test_multiclass_boosting() {
        let (x, y) = three_bands(150, 2);
        let mut gbm = GradientBoosting::new(
            &Params::new().with("n_estimators", 25).with("learning_rate", 0.3),
        )
        .unwrap();
        gbm.fit(x.view(), &y).unwrap();

        assert_eq!(gbm.classes(), &[1, 2, 3]);
        let (x_test, y_test) = three_bands(60, 3);
        assert!(accuracy(&gbm.predict(x_test.view()).unwrap(), &y_test) > 0.95);
    }

    #[test]
    fn test_more_stages_lower_training_loss() {
        let (x, y3) = three_bands(90, 4);
        let y: Vec<i64> = y3.iter().map(|&c| i64::from(c >= 2)).collect();
        let log_loss = |m: &GradientBoosting| {
            let proba = m.predict_proba(x.view()).unwrap();
            y.iter()
                .enumerate()
                .map(|(i, &c)| -proba[[i, c as usize]].max(1e-15).ln())
                .sum::<f64>()
        };

        let mut short = GradientBoosting::new(&Params::new().with("n_estimators", 2)).unwrap();
        short.fit(x.view(), &y).unwrap();
        let mut long = GradientBoosting::new(&Params::new().with("n_estimators", 20)).unwrap();
        long.fit(x.view(), &y).unwrap();

        assert!(log_loss(&long) < log_loss(&short));
    }

    #[test]
    fn test_warm_start_adds_stages() {
        let (x, y) = three_bands(60, 5);
        let mut warm = GradientBoosting::new(
            &Params::new().with("n_estimators", 5).with("warm_start", true),
        )
        .unwrap();
        warm.fit(x.view(), &y).unwrap();
        warm.set_params(&Params::new().with("n_estimators", 10).with("warm_start", true))
            .unwrap();
        warm.fit(x.view(), &y).unwrap();
        assert_eq!(warm.n_stages(), 10);
    }

    #[test]
    fn test_subsample_and_validation() {
        let (x, y) = three_bands(60, 6);
        let mut gbm = GradientBoosting::new(
            &Params::new()
                .with("n_estimators", 10)
                .with("subsample", 0.5)
                .with("random_state", 3),
        )
        .unwrap();
        gbm.fit(x.view(), &y).unwrap();
        assert_eq!(gbm.n_stages(), 10);

        assert!(GradientBoosting::new(&Params::new().with("subsample", 1.5)).is_err());
        assert!(GradientBoosting::new(&Params::new().with("learning_rate", 0.0)).is_err());
    }
}
