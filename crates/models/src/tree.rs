//! CART decision trees
//!
//! Binary trees grown greedily on axis-aligned thresholds. Classification
//! trees minimise Gini impurity and store class frequencies in their leaves;
//! regression trees minimise squared error and store a single value. The
//! ensembles in [`crate::forest`] and [`crate::gbm`] are built from these.

use crate::rng::Lcg;
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    /// Maximum depth (root = 0); `None` grows until leaves are pure
    pub max_depth: Option<usize>,
    /// Minimum samples a node needs before it may be split
    pub min_samples_split: usize,
    /// Minimum samples each child must keep
    pub min_samples_leaf: usize,
    /// Number of features drawn at random per split
    pub max_features: usize,
}

/// What a tree is fitted to
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Encoded class indices in `0..n_classes`
    Classes { y: &'a [usize], n_classes: usize },
    /// Continuous values (gradient boosting residuals)
    Values(&'a [f64]),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct Builder<'a> {
    x: ArrayView2<'a, f64>,
    target: Target<'a>,
    params: TreeParams,
    rng: Lcg,
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    score: f64,
}

impl DecisionTree {
    /// Grow a tree on the rows listed in `samples`.
    ///
    /// `samples` may repeat rows (bootstrap draws). It must not be empty.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        target: Target<'_>,
        samples: &mut [usize],
        params: TreeParams,
        rng: Lcg,
    ) -> Self {
        let mut builder = Builder {
            x: x.view(),
            target,
            params,
            rng,
            nodes: Vec::new(),
        };
        builder.grow(samples, 0);
        Self {
            nodes: builder.nodes,
        }
    }

    /// Index of the leaf reached by `row`
    pub fn leaf_index(&self, row: ArrayView1<'_, f64>) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { .. } => return idx,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Leaf value reached by `row`: class frequencies or a one-element value
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        match &self.nodes[self.leaf_index(row)] {
            Node::Leaf { value } => value,
            Node::Split { .. } => unreachable!("leaf_index always stops at a leaf"),
        }
    }

    /// Overwrite the value of a leaf (gradient boosting line search)
    pub fn set_leaf_value(&mut self, leaf: usize, value: f64) {
        if let Some(Node::Leaf { value: v }) = self.nodes.get_mut(leaf) {
            *v = vec![value];
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() {
            0
        } else {
            walk(&self.nodes, 0)
        }
    }
}

impl Builder<'_> {
    fn grow(&mut self, samples: &mut [usize], depth: usize) -> usize {
        let id = self.nodes.len();
        let leaf = self.leaf_value(samples);
        self.nodes.push(Node::Leaf { value: leaf });

        let n = samples.len();
        let p = self.params;
        if p.max_depth.is_some_and(|d| depth >= d)
            || n < p.min_samples_split
            || n < 2 * p.min_samples_leaf
        {
            return id;
        }

        let parent = self.impurity(samples);
        if parent <= 1e-12 {
            return id;
        }

        let Some(best) = self.best_split(samples) else {
            return id;
        };
        if best.score >= parent - 1e-12 {
            return id;
        }

        let mid = partition(samples, |i| self.x[[i, best.feature]] <= best.threshold);
        let (left_samples, right_samples) = samples.split_at_mut(mid);
        let left = self.grow(left_samples, depth + 1);
        let right = self.grow(right_samples, depth + 1);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        id
    }

    fn leaf_value(&self, samples: &[usize]) -> Vec<f64> {
        match self.target {
            Target::Classes { y, n_classes } => {
                let mut counts = vec![0.0; n_classes];
                for &i in samples {
                    counts[y[i]] += 1.0;
                }
                let n = samples.len().max(1) as f64;
                counts.iter_mut().for_each(|c| *c /= n);
                counts
            }
            Target::Values(v) => {
                let sum: f64 = samples.iter().map(|&i| v[i]).sum();
                vec![sum / samples.len().max(1) as f64]
            }
        }
    }

    /// Node impurity scaled by sample count (n * gini, or SSE)
    fn impurity(&self, samples: &[usize]) -> f64 {
        match self.target {
            Target::Classes { y, n_classes } => {
                let mut counts = vec![0.0; n_classes];
                for &i in samples {
                    counts[y[i]] += 1.0;
                }
                weighted_gini(&counts, samples.len() as f64)
            }
            Target::Values(v) => {
                let (sum, sum_sq) = samples
                    .iter()
                    .fold((0.0, 0.0), |(s, q), &i| (s + v[i], q + v[i] * v[i]));
                sse(sum, sum_sq, samples.len() as f64)
            }
        }
    }

    fn best_split(&mut self, samples: &[usize]) -> Option<SplitCandidate> {
        let n_features = self.x.ncols();
        let mut features: Vec<usize> = (0..n_features).collect();
        self.rng.shuffle(&mut features);

        let mut best: Option<SplitCandidate> = None;
        let mut order = samples.to_vec();
        // Keep drawing past max_features until at least one valid split exists
        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.params.max_features && best.is_some() {
                break;
            }
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));
            if let Some(candidate) = self.scan_feature(&order, feature) {
                if best.as_ref().map_or(true, |b| candidate.score < b.score) {
                    best = Some(candidate);
                }
            }
        }
        best
    }

    /// Sweep thresholds over samples sorted by `feature`
    fn scan_feature(&self, sorted: &[usize], feature: usize) -> Option<SplitCandidate> {
        let n = sorted.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let value = |k: usize| self.x[[sorted[k], feature]];
        let mut best: Option<(usize, f64)> = None;

        match self.target {
            Target::Classes { y, n_classes } => {
                let mut total = vec![0.0; n_classes];
                for &i in sorted {
                    total[y[i]] += 1.0;
                }
                let mut left = vec![0.0; n_classes];
                let mut right = total;
                for k in 0..n - 1 {
                    left[y[sorted[k]]] += 1.0;
                    right[y[sorted[k]]] -= 1.0;
                    let n_left = k + 1;
                    if n_left < min_leaf || n - n_left < min_leaf || value(k) == value(k + 1) {
                        continue;
                    }
                    let score = weighted_gini(&left, n_left as f64)
                        + weighted_gini(&right, (n - n_left) as f64);
                    if best.map_or(true, |(_, s)| score < s) {
                        best = Some((k, score));
                    }
                }
            }
            Target::Values(v) => {
                let (total_sum, total_sq) = sorted
                    .iter()
                    .fold((0.0, 0.0), |(s, q), &i| (s + v[i], q + v[i] * v[i]));
                let (mut sum, mut sum_sq) = (0.0, 0.0);
                for k in 0..n - 1 {
                    let t = v[sorted[k]];
                    sum += t;
                    sum_sq += t * t;
                    let n_left = k + 1;
                    if n_left < min_leaf || n - n_left < min_leaf || value(k) == value(k + 1) {
                        continue;
                    }
                    let score = sse(sum, sum_sq, n_left as f64)
                        + sse(total_sum - sum, total_sq - sum_sq, (n - n_left) as f64);
                    if best.map_or(true, |(_, s)| score < s) {
                        best = Some((k, score));
                    }
                }
            }
        }

        best.map(|(k, score)| {
            let (a, b) = (value(k), value(k + 1));
            let mid = a + (b - a) / 2.0;
            // Midpoint can round up to b for adjacent floats
            let threshold = if mid < b { mid } else { a };
            SplitCandidate {
                feature,
                threshold,
                score,
            }
        })
    }
}

fn weighted_gini(counts: &[f64], n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    let sum_sq: f64 = counts.iter().map(|c| c * c).sum();
    n - sum_sq / n
}

fn sse(sum: f64, sum_sq: f64, n: f64) -> f64 {
    if n == 0.0 {
        return 0.0;
    }
    (sum_sq - sum * sum / n).max(0.0)
}

/// Move items satisfying `pred` to the front; returns their count
fn partition(items: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..items.len() {
        if pred(items[i]) {
            items.swap(i, mid);
            mid += 1;
        }
    }
    mid
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn params() -> TreeParams {
        TreeParams {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 2,
        }
    }

    #[test]
    fn test_classification_tree_separates_threshold() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 1.0], [10.0, 1.0], [11.0, 0.0], [12.0, 1.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let mut samples: Vec<usize> = (0..6).collect();

        let tree = DecisionTree::fit(
            x.view(),
            Target::Classes { y: &y, n_classes: 2 },
            &mut samples,
            params(),
            Lcg::new(0),
        );

        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict_row(array![2.5, 1.0].view()), &[1.0, 0.0]);
        assert_eq!(tree.predict_row(array![11.5, 0.0].view()), &[0.0, 1.0]);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = Array2::from_shape_fn((32, 1), |(i, _)| i as f64);
        let y: Vec<usize> = (0..32).map(|i| i % 2).collect();
        let mut samples: Vec<usize> = (0..32).collect();
        let mut p = params();
        p.max_depth = Some(3);
        p.max_features = 1;

        let tree = DecisionTree::fit(
            x.view(),
            Target::Classes { y: &y, n_classes: 2 },
            &mut samples,
            p,
            Lcg::new(0),
        );
        assert!(tree.depth() <= 3);
        assert!(tree.n_leaves() <= 8);
    }

    #[test]
    fn test_regression_tree_means() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let v = [1.0, 1.0, 5.0, 5.0];
        let mut samples: Vec<usize> = (0..4).collect();
        let mut p = params();
        p.max_features = 1;

        let mut tree = DecisionTree::fit(x.view(), Target::Values(&v), &mut samples, p, Lcg::new(0));
        assert_eq!(tree.predict_row(array![0.5].view()), &[1.0]);
        assert_eq!(tree.predict_row(array![2.5].view()), &[5.0]);

        let leaf = tree.leaf_index(array![2.5].view());
        tree.set_leaf_value(leaf, -2.0);
        assert_eq!(tree.predict_row(array![3.0].view()), &[-2.0]);
    }

    #[test]
    fn test_min_samples_leaf_blocks_split() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = [0, 1, 1];
        let mut samples: Vec<usize> = (0..3).collect();
        let mut p = params();
        p.min_samples_leaf = 2;
        p.max_features = 1;

        let tree = DecisionTree::fit(
            x.view(),
            Target::Classes { y: &y, n_classes: 2 },
            &mut samples,
            p,
            Lcg::new(0),
        );
        assert_eq!(tree.n_leaves(), 1);
    }
}
