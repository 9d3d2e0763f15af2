//! Classification metrics

use crate::error::{ModelError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Precision, recall and F1 for one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: i64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Averaged metrics over all classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Per-class metrics plus accuracy, macro and support-weighted averages.
///
/// Undefined ratios (no predicted or no true samples of a class) are 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AverageMetrics,
    pub weighted_avg: AverageMetrics,
}

impl ClassificationReport {
    pub fn class(&self, label: i64) -> Option<&ClassMetrics> {
        self.classes.iter().find(|c| c.label == label)
    }
}

/// Sorted labels occurring in either vector
pub fn unique_labels(y_true: &[i64], y_pred: &[i64]) -> Vec<i64> {
    let mut labels: Vec<i64> = y_true.iter().chain(y_pred).copied().collect();
    labels.sort_unstable();
    labels.dedup();
    labels
}

fn check_lengths(y_true: &[i64], y_pred: &[i64]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(ModelError::InvalidInput(format!(
            "{} true labels but {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(ModelError::InvalidInput("no samples to score".into()));
    }
    Ok(())
}

/// Counts indexed by (true, predicted) position in `labels`
pub fn confusion_matrix(y_true: &[i64], y_pred: &[i64], labels: &[i64]) -> Result<Array2<usize>> {
    check_lengths(y_true, y_pred)?;
    let mut matrix = Array2::zeros((labels.len(), labels.len()));
    for (t, p) in y_true.iter().zip(y_pred) {
        if let (Some(i), Some(j)) = (
            labels.iter().position(|l| l == t),
            labels.iter().position(|l| l == p),
        ) {
            matrix[[i, j]] += 1;
        }
    }
    Ok(matrix)
}

pub fn accuracy(y_true: &[i64], y_pred: &[i64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(correct as f64 / y_true.len() as f64)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub fn classification_report(y_true: &[i64], y_pred: &[i64]) -> Result<ClassificationReport> {
    let labels = unique_labels(y_true, y_pred);
    let cm = confusion_matrix(y_true, y_pred, &labels)?;

    let classes: Vec<ClassMetrics> = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| {
            let tp = cm[[i, i]];
            let predicted = cm.column(i).sum();
            let support = cm.row(i).sum();
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            let f1_score = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            ClassMetrics {
                label,
                precision,
                recall,
                f1_score,
                support,
            }
        })
        .collect();

    let total = y_true.len();
    let k = classes.len() as f64;
    let macro_avg = AverageMetrics {
        precision: classes.iter().map(|c| c.precision).sum::<f64>() / k,
        recall: classes.iter().map(|c| c.recall).sum::<f64>() / k,
        f1_score: classes.iter().map(|c| c.f1_score).sum::<f64>() / k,
        support: total,
    };
    let weighted = |f: fn(&ClassMetrics) -> f64| {
        classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / total as f64
    };
    let weighted_avg = AverageMetrics {
        precision: weighted(|c| c.precision),
        recall: weighted(|c| c.recall),
        f1_score: weighted(|c| c.f1_score),
        support: total,
    };

    Ok(ClassificationReport {
        accuracy: accuracy(y_true, y_pred)?,
        classes,
        macro_avg,
        weighted_avg,
    })
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.to_string().len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1_score, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1_score, avg.support
            )?;
        }
        Ok(())
    }
}
