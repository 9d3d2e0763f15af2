//! Train/test partitioning

use crate::error::{ModelError, Result};
use crate::rng::Lcg;
use ndarray::{Array2, ArrayView2, Axis};

/// Seed used when a configuration does not name one
pub const DEFAULT_SEED: u64 = 42;

/// Samples on both sides of a split, with the source row of each sample
#[derive(Debug, Clone)]
pub struct Split {
    pub x_train: Array2<f64>,
    pub y_train: Vec<i64>,
    pub x_test: Array2<f64>,
    pub y_test: Vec<i64>,
    pub train_rows: Vec<usize>,
    pub test_rows: Vec<usize>,
}

impl Split {
    pub fn n_train(&self) -> usize {
        self.y_train.len()
    }

    pub fn n_test(&self) -> usize {
        self.y_test.len()
    }
}

/// Shuffle rows with a seeded generator and hold out `ceil(test_size * n)`
/// of them for testing.
pub fn train_test_split(
    x: ArrayView2<'_, f64>,
    y: &[i64],
    test_size: f64,
    seed: u64,
) -> Result<Split> {
    let n = x.nrows();
    if n != y.len() {
        return Err(ModelError::InvalidInput(format!(
            "{} samples but {} labels",
            n,
            y.len()
        )));
    }
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ModelError::invalid_parameter(
            "test_size",
            test_size,
            "must be between 0 and 1",
        ));
    }

    let n_test = (test_size * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_test);
    if n_test == 0 || n_train == 0 {
        return Err(ModelError::InvalidInput(format!(
            "test_size={} on {} samples leaves an empty train or test set",
            test_size, n
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    Lcg::new(seed).shuffle(&mut order);
    let (test_rows, train_rows) = order.split_at(n_test);

    let pick = |rows: &[usize]| -> (Array2<f64>, Vec<i64>) {
        (x.select(Axis(0), rows), rows.iter().map(|&i| y[i]).collect())
    };
    let (x_train, y_train) = pick(train_rows);
    let (x_test, y_test) = pick(test_rows);

    Ok(Split {
        x_train,
        y_train,
        x_test,
        y_test,
        train_rows: train_rows.to_vec(),
        test_rows: test_rows.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(n: usize) -> (Array2<f64>, Vec<i64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i * 10 + j) as f64);
        let y = (0..n as i64).collect();
        (x, y)
    }

    #[test]
    fn test_split_sizes_round_test_up() {
        let (x, y) = data(10);
        let split = train_test_split(x.view(), &y, 0.25, DEFAULT_SEED).unwrap();
        assert_eq!(split.n_test(), 3);
        assert_eq!(split.n_train(), 7);
        assert_eq!(split.x_test.nrows(), 3);
    }

    #[test]
    fn test_split_is_disjoint_and_covering() {
        let (x, y) = data(23);
        let split = train_test_split(x.view(), &y, 0.3, 7).unwrap();
        let mut all: Vec<usize> = split
            .train_rows
            .iter()
            .chain(&split.test_rows)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..23).collect::<Vec<_>>());

        // Rows travel with their labels
        for (k, &row) in split.test_rows.iter().enumerate() {
            assert_eq!(split.y_test[k], row as i64);
            assert_eq!(split.x_test[[k, 0]], (row * 10) as f64);
        }
    }

    #[test]
    fn test_split_deterministic_per_seed() {
        let (x, y) = data(50);
        let a = train_test_split(x.view(), &y, 0.2, 1).unwrap();
        let b = train_test_split(x.view(), &y, 0.2, 1).unwrap();
        let c = train_test_split(x.view(), &y, 0.2, 2).unwrap();
        assert_eq!(a.test_rows, b.test_rows);
        assert_ne!(a.test_rows, c.test_rows);
    }

    #[test]
    fn test_split_rejects_bad_sizes() {
        let (x, y) = data(4);
        assert!(train_test_split(x.view(), &y, 0.0, 1).is_err());
        assert!(train_test_split(x.view(), &y, 1.0, 1).is_err());
        assert!(train_test_split(x.view(), &y, 0.7, 1).is_ok());
        assert!(train_test_split(x.view(), &y, 0.9, 1).is_err());

        let (x, y) = data(1);
        assert!(train_test_split(x.view(), &y, 0.5, 1).is_err());
        assert!(train_test_split(x.view(), &y[..0], 0.5, 1).is_err());
    }
}
