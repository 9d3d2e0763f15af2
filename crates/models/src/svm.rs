//! Support vector classifier
//!
//! C-SVC trained with sequential minimal optimisation using the
//! maximal-violating-pair working set. More than two classes are handled
//! one-vs-one: one binary machine per class pair, prediction by voting.
//!
//! Probabilities come from a sigmoid (Platt) fitted to each machine's
//! decision values on its training samples; for more than two classes the
//! pairwise probabilities are coupled into one distribution.

use crate::error::{ModelError, Result};
use crate::estimator::{prepare_training, Classifier};
use crate::params::{ParamValue, Params};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const TAU: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Kernel {
    Linear,
    Rbf,
    Poly,
    Sigmoid,
}

/// Kernel coefficient for rbf, poly and sigmoid kernels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gamma {
    /// 1 / (n_features * variance of the training matrix)
    Scale,
    /// 1 / n_features
    Auto,
    Value(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvcParams {
    pub c: f64,
    pub kernel: Kernel,
    pub gamma: Gamma,
    pub degree: i32,
    pub coef0: f64,
    /// Stopping tolerance on the maximal KKT violation
    pub tol: f64,
    /// Solver iteration cap per binary machine; `None` uses a size-based cap
    pub max_iter: Option<usize>,
    pub probability: bool,
    pub random_state: u64,
}

impl Default for SvcParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: Kernel::Rbf,
            gamma: Gamma::Scale,
            degree: 3,
            coef0: 0.0,
            tol: 1e-3,
            max_iter: None,
            probability: false,
            random_state: 0,
        }
    }
}

impl SvcParams {
    pub fn from_params(p: &Params) -> Result<Self> {
        let d = Self::default();
        let kernel = match p.get("kernel") {
            None => d.kernel,
            Some(ParamValue::Str(s)) => match s.to_lowercase().as_str() {
                "linear" => Kernel::Linear,
                "rbf" => Kernel::Rbf,
                "poly" => Kernel::Poly,
                "sigmoid" => Kernel::Sigmoid,
                _ => {
                    return Err(ModelError::invalid_parameter(
                        "kernel",
                        s,
                        "expected linear, rbf, poly or sigmoid",
                    ))
                }
            },
            Some(v) => return Err(ModelError::invalid_parameter("kernel", v, "expected a name")),
        };
        let gamma = match p.get("gamma") {
            None => d.gamma,
            Some(ParamValue::Str(s)) if s.eq_ignore_ascii_case("scale") => Gamma::Scale,
            Some(ParamValue::Str(s)) if s.eq_ignore_ascii_case("auto") => Gamma::Auto,
            Some(_) => {
                let g = p.f64_or("gamma", 0.0)?;
                if !(g > 0.0) {
                    return Err(ModelError::invalid_parameter("gamma", g, "must be positive"));
                }
                Gamma::Value(g)
            }
        };
        let params = Self {
            c: p.f64_or("C", d.c)?,
            kernel,
            gamma,
            degree: p.i64_or("degree", d.degree as i64)? as i32,
            coef0: p.f64_or("coef0", d.coef0)?,
            tol: p.f64_or("tol", d.tol)?,
            max_iter: match p.i64_or("max_iter", -1)? {
                n if n > 0 => Some(n as usize),
                _ => None,
            },
            probability: p.bool_or("probability", d.probability)?,
            random_state: p.seed()?,
        };
        if !(params.c > 0.0) {
            return Err(ModelError::invalid_parameter("C", params.c, "must be positive"));
        }
        if !(params.tol > 0.0) {
            return Err(ModelError::invalid_parameter("tol", params.tol, "must be positive"));
        }
        if params.degree < 0 {
            return Err(ModelError::invalid_parameter("degree", params.degree, "must be >= 0"));
        }
        Ok(params)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct KernelFn {
    kernel: Kernel,
    gamma: f64,
    degree: i32,
    coef0: f64,
}

impl KernelFn {
    fn eval(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self.kernel {
            Kernel::Linear => a.dot(&b),
            Kernel::Rbf => {
                let d2: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q) * (p - q)).sum();
                (-self.gamma * d2).exp()
            }
            Kernel::Poly => (self.gamma * a.dot(&b) + self.coef0).powi(self.degree),
            Kernel::Sigmoid => (self.gamma * a.dot(&b) + self.coef0).tanh(),
        }
    }
}

/// One binary machine separating class `positive` (+1) from `negative` (-1)
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BinarySvm {
    positive: usize,
    negative: usize,
    support: Vec<Vec<f64>>,
    /// y_i * alpha_i per support vector
    coef: Vec<f64>,
    rho: f64,
    /// Platt sigmoid: P(positive) = 1 / (1 + exp(A * f + B))
    prob_a: f64,
    prob_b: f64,
}

impl BinarySvm {
    fn decision(&self, kf: &KernelFn, row: ArrayView1<'_, f64>) -> f64 {
        self.support
            .iter()
            .zip(&self.coef)
            .map(|(sv, c)| c * kf.eval(ArrayView1::from(sv.as_slice()), row))
            .sum::<f64>()
            - self.rho
    }

    fn positive_proba(&self, decision: f64) -> f64 {
        sigmoid_predict(decision, self.prob_a, self.prob_b)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Svc {
    params: SvcParams,
    classes: Vec<i64>,
    n_features: usize,
    kernel_fn: Option<KernelFn>,
    machines: Vec<BinarySvm>,
}

impl Svc {
    pub fn new(params: &Params) -> Result<Self> {
        Ok(Self::with_params(SvcParams::from_params(params)?))
    }

    pub fn with_params(params: SvcParams) -> Self {
        Self {
            params,
            classes: Vec::new(),
            n_features: 0,
            kernel_fn: None,
            machines: Vec::new(),
        }
    }

    pub fn set_params(&mut self, params: &Params) -> Result<()> {
        self.params = SvcParams::from_params(params)?;
        Ok(())
    }

    pub fn n_support(&self) -> usize {
        self.machines.iter().map(|m| m.support.len()).sum()
    }

    /// Decision value of every one-vs-one machine
    fn decisions(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        match &self.kernel_fn {
            Some(kf) => self.machines.iter().map(|m| m.decision(kf, row)).collect(),
            None => Vec::new(),
        }
    }

    fn resolve_gamma(&self, x: ArrayView2<'_, f64>) -> f64 {
        let n_features = x.ncols() as f64;
        match self.params.gamma {
            Gamma::Value(g) => g,
            Gamma::Auto => 1.0 / n_features,
            Gamma::Scale => {
                let n = x.len() as f64;
                let mean = x.sum() / n;
                let var = x.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
                if var > 0.0 {
                    1.0 / (n_features * var)
                } else {
                    1.0
                }
            }
        }
    }
}

impl Classifier for Svc {
    fn fit(&mut self, x: ArrayView2<'_, f64>, y: &[i64]) -> Result<()> {
        let (classes, encoded) = prepare_training(x, y)?;
        let kf = KernelFn {
            kernel: self.params.kernel,
            gamma: self.resolve_gamma(x),
            degree: self.params.degree,
            coef0: self.params.coef0,
        };

        let k = classes.len();
        let mut machines = Vec::with_capacity(k * (k - 1) / 2);
        for a in 0..k {
            for b in (a + 1)..k {
                let idx: Vec<usize> = (0..x.nrows())
                    .filter(|&i| encoded[i] == a || encoded[i] == b)
                    .collect();
                let signs: Vec<f64> = idx
                    .iter()
                    .map(|&i| if encoded[i] == a { 1.0 } else { -1.0 })
                    .collect();
                let max_iter = self
                    .params
                    .max_iter
                    .unwrap_or_else(|| (100 * idx.len()).max(10_000_000));

                let solution = solve_smo(x, &idx, &signs, self.params.c, &kf, self.params.tol, max_iter);
                if solution.iterations >= max_iter {
                    warn!(
                        "SVM solver stopped after {} iterations without converging (classes {} vs {})",
                        max_iter, classes[a], classes[b]
                    );
                }

                let mut machine = BinarySvm {
                    positive: a,
                    negative: b,
                    support: Vec::new(),
                    coef: Vec::new(),
                    rho: solution.rho,
                    prob_a: 0.0,
                    prob_b: 0.0,
                };
                for (t, &alpha) in solution.alpha.iter().enumerate() {
                    if alpha > 0.0 {
                        machine.support.push(x.row(idx[t]).to_vec());
                        machine.coef.push(signs[t] * alpha);
                    }
                }

                let decisions: Vec<f64> = idx
                    .iter()
                    .map(|&i| machine.decision(&kf, x.row(i)))
                    .collect();
                let (pa, pb) = sigmoid_train(&decisions, &signs);
                machine.prob_a = pa;
                machine.prob_b = pb;

                debug!(
                    "SVM {} vs {}: {} support vectors, {} iterations",
                    classes[a],
                    classes[b],
                    machine.support.len(),
                    solution.iterations
                );
                machines.push(machine);
            }
        }

        self.classes = classes;
        self.n_features = x.ncols();
        self.kernel_fn = Some(kf);
        self.machines = machines;
        Ok(())
    }

    fn classes(&self) -> &[i64] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn proba_row(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        let k = self.classes.len();
        let decisions = self.decisions(row);
        if k == 2 {
            let p = self.machines[0].positive_proba(decisions[0]);
            return vec![p, 1.0 - p];
        }

        let mut pairwise = vec![vec![0.0; k]; k];
        for (m, &dec) in self.machines.iter().zip(&decisions) {
            let p = m.positive_proba(dec).clamp(1e-7, 1.0 - 1e-7);
            pairwise[m.positive][m.negative] = p;
            pairwise[m.negative][m.positive] = 1.0 - p;
        }
        couple_pairwise(&pairwise)
    }

    /// One-vs-one voting on decision values; ties go to the lower class
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> i64 {
        let mut votes = vec![0usize; self.classes.len()];
        for (m, dec) in self.machines.iter().zip(self.decisions(row)) {
            if dec > 0.0 {
                votes[m.positive] += 1;
            } else {
                votes[m.negative] += 1;
            }
        }
        let best = votes
            .iter()
            .enumerate()
            .fold((0, 0), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
            .0;
        self.classes[best]
    }

    /// Labels come from one-vs-one voting, not from the probabilities
    fn predict_row_with_proba(&self, row: ArrayView1<'_, f64>) -> (i64, Vec<f64>) {
        (self.predict_row(row), self.proba_row(row))
    }
}

struct SmoSolution {
    alpha: Vec<f64>,
    rho: f64,
    iterations: usize,
}

/// Dual C-SVC on the rows `idx` of `x` with labels `y` in {+1, -1}
fn solve_smo(
    x: ArrayView2<'_, f64>,
    idx: &[usize],
    y: &[f64],
    c: f64,
    kf: &KernelFn,
    tol: f64,
    max_iter: usize,
) -> SmoSolution {
    let n = idx.len();
    let mut alpha = vec![0.0; n];
    // Gradient of 0.5 a'Qa - e'a at a = 0
    let mut grad = vec![-1.0; n];
    let diag: Vec<f64> = idx.iter().map(|&i| kf.eval(x.row(i), x.row(i))).collect();
    let kernel_row = |i: usize| -> Vec<f64> {
        idx.iter()
            .map(|&t| kf.eval(x.row(idx[i]), x.row(t)))
            .collect()
    };

    let in_up = |t: usize, a: &[f64]| (y[t] > 0.0 && a[t] < c) || (y[t] < 0.0 && a[t] > 0.0);
    let in_low = |t: usize, a: &[f64]| (y[t] > 0.0 && a[t] > 0.0) || (y[t] < 0.0 && a[t] < c);

    let mut iterations = 0;
    loop {
        let mut g_max = f64::NEG_INFINITY;
        let mut g_min = f64::INFINITY;
        let (mut i, mut j) = (usize::MAX, usize::MAX);
        for t in 0..n {
            let yg = -y[t] * grad[t];
            if in_up(t, &alpha) && yg > g_max {
                g_max = yg;
                i = t;
            }
            if in_low(t, &alpha) && yg < g_min {
                g_min = yg;
                j = t;
            }
        }
        if i == usize::MAX || j == usize::MAX || g_max - g_min < tol || iterations >= max_iter {
            break;
        }
        iterations += 1;

        let ki = kernel_row(i);
        let kj = kernel_row(j);
        let (old_i, old_j) = (alpha[i], alpha[j]);

        if y[i] != y[j] {
            let quad = (diag[i] + diag[j] - 2.0 * ki[j]).max(TAU);
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = c - diff;
                }
            } else if alpha[j] > c {
                alpha[j] = c;
                alpha[i] = c + diff;
            }
        } else {
            let quad = (diag[i] + diag[j] - 2.0 * ki[j]).max(TAU);
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > c {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = sum - c;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c {
                if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = sum - c;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let (di, dj) = (alpha[i] - old_i, alpha[j] - old_j);
        for t in 0..n {
            grad[t] += y[t] * (y[i] * ki[t] * di + y[j] * kj[t] * dj);
        }
    }

    // Offset from free vectors, else the midpoint of the feasible interval
    let (mut ub, mut lb) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut sum_free, mut n_free) = (0.0, 0usize);
    for t in 0..n {
        let yg = y[t] * grad[t];
        if alpha[t] >= c {
            if y[t] < 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else if alpha[t] <= 0.0 {
            if y[t] > 0.0 {
                ub = ub.min(yg);
            } else {
                lb = lb.max(yg);
            }
        } else {
            sum_free += yg;
            n_free += 1;
        }
    }
    let rho = if n_free > 0 {
        sum_free / n_free as f64
    } else {
        (ub + lb) / 2.0
    };

    SmoSolution {
        alpha,
        rho,
        iterations,
    }
}

/// Fit Platt's sigmoid to decision values; returns (A, B)
fn sigmoid_train(decisions: &[f64], labels: &[f64]) -> (f64, f64) {
    let prior1 = labels.iter().filter(|&&l| l > 0.0).count() as f64;
    let prior0 = labels.len() as f64 - prior1;
    let hi = (prior1 + 1.0) / (prior1 + 2.0);
    let lo = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = labels.iter().map(|&l| if l > 0.0 { hi } else { lo }).collect();

    let objective = |a: f64, b: f64| -> f64 {
        decisions
            .iter()
            .zip(&targets)
            .map(|(&d, &t)| {
                let f = d * a + b;
                if f >= 0.0 {
                    t * f + (1.0 + (-f).exp()).ln()
                } else {
                    (t - 1.0) * f + (1.0 + f.exp()).ln()
                }
            })
            .sum()
    };

    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);
    const SIGMA: f64 = 1e-12;

    for _ in 0..100 {
        let (mut h11, mut h22, mut h21, mut g1, mut g2) = (SIGMA, SIGMA, 0.0, 0.0, 0.0);
        for (&d, &t) in decisions.iter().zip(&targets) {
            let f = d * a + b;
            let (p, q) = if f >= 0.0 {
                let e = (-f).exp();
                (e / (1.0 + e), 1.0 / (1.0 + e))
            } else {
                let e = f.exp();
                (1.0 / (1.0 + e), e / (1.0 + e))
            };
            let d2 = p * q;
            h11 += d * d * d2;
            h22 += d2;
            h21 += d * d2;
            let d1 = t - p;
            g1 += d * d1;
            g2 += d1;
        }
        if g1.abs() < 1e-5 && g2.abs() < 1e-5 {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0;
        while step >= 1e-10 {
            let (na, nb) = (a + step * da, b + step * db);
            let nf = objective(na, nb);
            if nf < fval + 1e-4 * step * gd {
                a = na;
                b = nb;
                fval = nf;
                break;
            }
            step /= 2.0;
        }
        if step < 1e-10 {
            break;
        }
    }
    (a, b)
}

fn sigmoid_predict(decision: f64, a: f64, b: f64) -> f64 {
    let f = decision * a + b;
    if f >= 0.0 {
        (-f).exp() / (1.0 + (-f).exp())
    } else {
        1.0 / (1.0 + f.exp())
    }
}

/// Combine pairwise probabilities r[i][j] = P(i | i or j) into one
/// distribution by minimising sum (r[j][i] p_i - r[i][j] p_j)^2
fn couple_pairwise(r: &[Vec<f64>]) -> Vec<f64> {
    let k = r.len();
    let mut q = vec![vec![0.0; k]; k];
    for t in 0..k {
        for j in 0..k {
            if j != t {
                q[t][t] += r[j][t] * r[j][t];
                q[t][j] = -r[j][t] * r[t][j];
            }
        }
    }

    let mut p = vec![1.0 / k as f64; k];
    let mut qp = vec![0.0; k];
    let eps = 0.005 / k as f64;
    for _ in 0..100.max(k) {
        let mut pqp = 0.0;
        for t in 0..k {
            qp[t] = (0..k).map(|j| q[t][j] * p[j]).sum();
            pqp += p[t] * qp[t];
        }
        let max_error = qp.iter().map(|v| (v - pqp).abs()).fold(0.0, f64::max);
        if max_error < eps {
            break;
        }
        for t in 0..k {
            let diff = (-qp[t] + pqp) / q[t][t];
            p[t] += diff;
            pqp = (pqp + diff * (diff * q[t][t] + 2.0 * qp[t])) / ((1.0 + diff) * (1.0 + diff));
            for j in 0..k {
                qp[j] = (qp[j] + diff * q[t][j]) / (1.0 + diff);
                p[j] /= 1.0 + diff;
            }
        }
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Lcg;
    use ndarray::Array2;

    fn svc(params: Params) -> Svc {
        Svc::new(&params).unwrap()
    }

    fn linear_data(n: usize, seed: u64) -> (Array2<f64>, Vec<i64>) {
        let mut rng = Lcg::new(seed);
        let mut x = Array2::zeros((n, 2));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let class = (i % 2) as i64;
            let shift = if class == 1 { 2.0 } else { -2.0 };
            x[[i, 0]] = shift + rng.next_f64() - 0.5;
            x[[i, 1]] = shift + rng.next_f64() - 0.5;
            y.push(class);
        }
        (x, y)
    }

    #[test]
    fn test_linear_kernel_separates() {
        let (x, y) = linear_data(60, 1);
        let mut model = svc(Params::new().with("kernel", "linear"));
        model.fit(x.view(), &y).unwrap();

        assert_eq!(model.predict(x.view()).unwrap(), y);
        assert!(model.n_support() >= 2);
        assert!(model.n_support() < 60);
    }

    #[test]
    fn test_rbf_learns_ring() {
        // Inner disc vs outer ring: not linearly separable
        let mut rng = Lcg::new(9);
        let n = 120;
        let mut x = Array2::zeros((n, 2));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let angle = rng.next_f64() * std::f64::consts::TAU;
            let outer = i % 2 == 1;
            let radius = if outer { 3.0 + rng.next_f64() } else { rng.next_f64() };
            x[[i, 0]] = radius * angle.cos();
            x[[i, 1]] = radius * angle.sin();
            y.push(i64::from(outer));
        }

        let mut model = svc(Params::new().with("C", 10.0));
        model.fit(x.view(), &y).unwrap();
        let pred = model.predict(x.view()).unwrap();
        let correct = pred.iter().zip(&y).filter(|(a, b)| a == b).count();
        assert!(correct >= 118, "only {} of {} correct", correct, n);
    }

    #[test]
    fn test_probabilities_follow_side_of_boundary() {
        let (x, y) = linear_data(40, 2);
        let mut model = svc(Params::new().with("kernel", "linear").with("probability", true));
        model.fit(x.view(), &y).unwrap();

        let far = ndarray::array![[4.0, 4.0], [-4.0, -4.0]];
        let proba = model.predict_proba(far.view()).unwrap();
        assert!(proba[[0, 1]] > 0.9);
        assert!(proba[[1, 0]] > 0.9);
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_one_vs_one_multiclass() {
        let mut rng = Lcg::new(3);
        let centers = [(0.0, 0.0), (5.0, 0.0), (0.0, 5.0)];
        let n = 90;
        let mut x = Array2::zeros((n, 2));
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let c = i % 3;
            x[[i, 0]] = centers[c].0 + rng.next_f64();
            x[[i, 1]] = centers[c].1 + rng.next_f64();
            y.push(c as i64 * 10);
        }

        let mut model = svc(Params::new());
        model.fit(x.view(), &y).unwrap();
        assert_eq!(model.classes(), &[0, 10, 20]);
        assert_eq!(model.predict(x.view()).unwrap(), y);

        let proba = model.predict_proba(x.view()).unwrap();
        for (row, &label) in proba.rows().into_iter().zip(&y) {
            assert!((row.sum() - 1.0).abs() < 1e-6);
            assert_eq!(model.classes()[crate::estimator::argmax(row.as_slice().unwrap())], label);
        }
    }

    #[test]
    fn test_invalid_params() {
        assert!(Svc::new(&Params::new().with("C", 0.0)).is_err());
        assert!(Svc::new(&Params::new().with("kernel", "cubic")).is_err());
        assert!(Svc::new(&Params::new().with("gamma", -1.0)).is_err());
        assert!(Svc::new(&Params::new().with("gamma", "auto")).is_ok());
    }

    #[test]
    fn test_coupling_uniform_for_balanced_pairs() {
        let r = vec![vec![0.0, 0.5, 0.5], vec![0.5, 0.0, 0.5], vec![0.5, 0.5, 0.0]];
        let p = couple_pairwise(&r);
        for v in p {
            assert!((v - 1.0 / 3.0).abs() < 1e-6);
        }
    }
}
