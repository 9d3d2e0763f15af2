//! Random forest classifier
//!
//! Bagged Gini trees with a random feature subset per split. Trees are grown
//! in parallel; class probabilities are the mean of the per-tree leaf class
//! frequencies.

use crate::error::{ModelError, Result};
use crate::estimator::{prepare_training, Classifier};
use crate::maybe_rayon::*;
use crate::params::{MaxFeatures, Params};
use crate::rng::Lcg;
use crate::tree::{DecisionTree, Target, TreeParams};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Random forest hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: u64,
    pub warm_start: bool,
    /// Worker threads; `None` uses the global pool
    pub n_jobs: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            random_state: 0,
            warm_start: false,
            n_jobs: None,
        }
    }
}

impl ForestParams {
    pub fn from_params(p: &Params) -> Result<Self> {
        let d = Self::default();
        let params = Self {
            n_estimators: p.usize_or("n_estimators", d.n_estimators)?,
            max_depth: p.optional_usize("max_depth")?,
            min_samples_split: p.usize_or("min_samples_split", d.min_samples_split)?,
            min_samples_leaf: p.usize_or("min_samples_leaf", d.min_samples_leaf)?,
            max_features: p.max_features_or(d.max_features)?,
            bootstrap: p.bool_or("bootstrap", d.bootstrap)?,
            random_state: p.seed()?,
            warm_start: p.bool_or("warm_start", d.warm_start)?,
            // -1 (all cores) and absent both mean the global pool
            n_jobs: match p.i64_or("n_jobs", -1)? {
                n if n > 0 => Some(n as usize),
                _ => None,
            },
        };
        if params.n_estimators == 0 {
            return Err(ModelError::invalid_parameter("n_estimators", 0, "must be at least 1"));
        }
        if params.min_samples_split < 2 {
            return Err(ModelError::invalid_parameter(
                "min_samples_split",
                params.min_samples_split,
                "must be at least 2",
            ));
        }
        if params.min_samples_leaf == 0 {
            return Err(ModelError::invalid_parameter("min_samples_leaf", 0, "must be at least 1"));
        }
        Ok(params)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    classes: Vec<i64>,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(params: &Params) -> Result<Self> {
        Ok(Self::with_params(ForestParams::from_params(params)?))
    }

    pub fn with_params(params: ForestParams) -> Self {
        Self {
            params,
            classes: Vec::new(),
            n_features: 0,
            trees: Vec::new(),
        }
    }

    pub fn set_params(&mut self, params: &Params) -> Result<()> {
        self.params = ForestParams::from_params(params)?;
        Ok(())
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Seed of tree `t`, independent of growth order and of earlier trees
    fn tree_seed(&self, t: usize) -> u64 {
        self.params.random_state ^ (t as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<()> {
        let (classes, encoded) = prepare_training(x, y)?;
        let n = x.nrows();
        let p = self.params.clone();

        let start = if p.warm_start && self.is_fitted() {
            if classes != self.classes || x.ncols() != self.n_features {
                return Err(ModelError::Training(
                    "warm start needs the same classes and features as the previous fit".into(),
                ));
            }
            if p.n_estimators < self.trees.len() {
                return Err(ModelError::invalid_parameter(
                    "n_estimators",
                    p.n_estimators,
                    format!("must be >= {} when warm_start is set", self.trees.len()),
                ));
            }
            if p.n_estimators == self.trees.len() {
                warn!("Warm-start fitting without increasing n_estimators does not fit new trees");
            }
            self.trees.len()
        } else {
            self.trees.clear();
            0
        };

        let tree_params = TreeParams {
            max_depth: p.max_depth,
            min_samples_split: p.min_samples_split,
            min_samples_leaf: p.min_samples_leaf,
            max_features: p.max_features.resolve(x.ncols()),
        };
        let target = Target::Classes {
            y: &encoded,
            n_classes: classes.len(),
        };

        let grow = |t: usize| {
            let mut rng = Lcg::new(self.tree_seed(t));
            let mut samples: Vec<usize> = if p.bootstrap {
                (0..n).map(|_| rng.below(n)).collect()
            } else {
                (0..n).collect()
            };
            DecisionTree::fit(x, target, &mut samples, tree_params, rng)
        };
        let new_trees = run_with_threads(p.n_jobs, || {
            (start..p.n_estimators).into_par_iter().map(grow).collect::<Vec<_>>()
        })?;

        debug!(
            "Random forest: grew {} trees on {} samples x {} features (max depth {}, {} leaves)",
            new_trees.len(),
            n,
            x.ncols(),
            new_trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
            new_trees.iter().map(DecisionTree::n_leaves).sum::<usize>()
        );
        self.trees.extend(new_trees);
        self.classes = classes;
        self.n_features = x.ncols();
        Ok(())
    }

    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn proba_row(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (acc, v) in proba.iter_mut().zip(tree.predict_row(row)) {
                *acc += v;
            }
        }
        let n = self.trees.len().max(1) as f64;
        proba.iter_mut().for_each(|v| *v /= n);
        proba
    }
}

#[cfg(feature = "parallel")]
fn run_with_threads<T: Send>(threads: Option<usize>, f: impl FnOnce() -> T + Send) -> Result<T> {
    match threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| ModelError::Training(format!("cannot build thread pool: {}", e)))?;
            Ok(pool.install(f))
        }
        None => Ok(f()),
    }
}

#[cfg(not(feature = "parallel"))]
fn run_with_threads<T>(_threads: Option<usize>, f: impl FnOnce() -> T) -> Result<T> {
    Ok(f())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Two noisy blobs split along the first feature
    fn blobs(n: usize, seed: u64) -> (Array2<f64>, Vec<i64>) {
        let mut rng = Lcg::new(seed);
        let mut x = Array2::zeros((n, 3));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let class = (i % 2) as i64;
            x[[i, 0]] = class as f64 * 4.0 + rng.next_f64();
            x[[i, 1]] = rng.next_f64() * 10.0;
            x[[i, 2]] = rng.next_f64();
            y.push(class);
        }
        (x, y)
    }

    fn forest(params: Params) -> RandomForest {
        RandomForest::new(&params).unwrap()
    }

    #[test]
    fn test_forest_separates_blobs() {
        let (x, y) = blobs(200, 1);
        let mut rf = forest(Params::new().with("n_estimators", 20).with("random_state", 42));
        rf.fit(x.view(), &y).unwrap();

        let (x_test, y_test) = blobs(100, 2);
        let pred = rf.predict(x_test.view()).unwrap();
        let correct = pred.iter().zip(&y_test).filter(|(a, b)| a == b).count();
        assert!(correct >= 95, "accuracy too low: {}/100", correct);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (x, y) = blobs(60, 3);
        let mut rf = forest(Params::new().with("n_estimators", 10).with("max_depth", 3));
        rf.fit(x.view(), &y).unwrap();

        let proba = rf.predict_proba(x.view()).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = blobs(80, 4);
        let params = Params::new().with("n_estimators", 5).with("random_state", 7);
        let mut a = forest(params.clone());
        let mut b = forest(params);
        a.fit(x.view(), &y).unwrap();
        b.fit(x.view(), &y).unwrap();
        assert_eq!(
            a.predict_proba(x.view()).unwrap(),
            b.predict_proba(x.view()).unwrap()
        );
    }

    #[test]
    fn test_warm_start_adds_trees() {
        let (x, y) = blobs(50, 5);
        let mut rf = forest(Params::new().with("n_estimators", 5).with("warm_start", true));
        rf.fit(x.view(), &y).unwrap();
        assert_eq!(rf.n_trees(), 5);

        rf.set_params(&Params::new().with("n_estimators", 8).with("warm_start", true))
            .unwrap();
        rf.fit(x.view(), &y).unwrap();
        assert_eq!(rf.n_trees(), 8);

        rf.set_params(&Params::new().with("n_estimators", 3).with("warm_start", true))
            .unwrap();
        assert!(rf.fit(x.view(), &y).is_err());

        rf.set_params(&Params::new().with("n_estimators", 3)).unwrap();
        rf.fit(x.view(), &y).unwrap();
        assert_eq!(rf.n_trees(), 3);
    }

    #[test]
    fn test_invalid_params() {
        assert!(RandomForest::new(&Params::new().with("n_estimators", 0)).is_err());
        assert!(RandomForest::new(&Params::new().with("min_samples_split", 1)).is_err());
        assert!(RandomForest::new(&Params::new().with("max_features", "cube")).is_err());
    }

    #[test]
    fn test_n_jobs_pool() {
        let (x, y) = blobs(40, 6);
        let mut rf = forest(Params::new().with("n_estimators", 4).with("n_jobs", 2));
        rf.fit(x.view(), &y).unwrap();
        assert_eq!(rf.n_trees(), 4);
    }
}
