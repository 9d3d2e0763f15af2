//! Tabular samples read from CSV
//!
//! Training data for susceptibility models is a table with one row per
//! sampled location: covariate columns (altitude, slope, soil texture...)
//! and an integer label column marking landslide / non-landslide points.

use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1, Axis};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// A numeric table with named columns.
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl Dataset {
    /// Build a dataset from column names and a (rows, columns) matrix.
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(Error::InvalidDimensions {
                width: values.ncols(),
                height: values.nrows(),
            });
        }
        check_unique(&columns)?;
        Ok(Self { columns, values })
    }

    /// Read a CSV file with a header row.
    ///
    /// Empty cells and `NaN`/`NA` are read as NaN. Any other cell that is
    /// not a number is an error naming the column and the 1-based data row.
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let dataset = Self::from_csv(reader)?;
        debug!(
            "Read {} rows x {} columns from {}",
            dataset.n_rows(),
            dataset.n_columns(),
            path.display()
        );
        Ok(dataset)
    }

    /// Read CSV text from any reader (header row required)
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        Self::from_csv(reader)
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        check_unique(&columns)?;

        let mut flat = Vec::new();
        let mut n_rows = 0;
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            for (field, column) in record.iter().zip(&columns) {
                flat.push(parse_cell(field).ok_or_else(|| Error::InvalidValue {
                    column: column.clone(),
                    row: i + 1,
                    value: field.to_string(),
                })?);
            }
            n_rows += 1;
        }

        let values = Array2::from_shape_vec((n_rows, columns.len()), flat)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self { columns, values })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self.column_index(name)?;
        Ok(self.values.column(idx))
    }

    /// Feature matrix with columns in the order given
    pub fn features<S: AsRef<str>>(&self, names: &[S]) -> Result<Array2<f64>> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.values.select(Axis(1), &indices))
    }

    /// Integer class labels from the target column
    pub fn labels(&self, target: &str) -> Result<Vec<i64>> {
        self.column(target)?
            .iter()
            .enumerate()
            .map(|(row, &v)| {
                if v.is_finite() && v.fract() == 0.0 {
                    Ok(v as i64)
                } else {
                    Err(Error::InvalidLabel {
                        column: target.to_string(),
                        row: row + 1,
                        value: v,
                    })
                }
            })
            .collect()
    }

    /// Copy of the dataset without rows that have NaN in any of `names`
    pub fn drop_incomplete<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let keep: Vec<usize> = self
            .values
            .outer_iter()
            .enumerate()
            .filter(|(_, row)| indices.iter().all(|&c| !row[c].is_nan()))
            .map(|(i, _)| i)
            .collect();

        let dropped = self.n_rows() - keep.len();
        if dropped > 0 {
            debug!("Dropped {} incomplete rows", dropped);
        }

        Ok(Self {
            columns: self.columns.clone(),
            values: self.values.select(Axis(0), &keep),
        })
    }
}

fn parse_cell(field: &str) -> Option<f64> {
    match field {
        "" | "NA" | "nan" | "NaN" | "NAN" => Some(f64::NAN),
        _ => field.parse().ok(),
    }
}

fn check_unique(columns: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for c in columns {
        if !seen.insert(c.as_str()) {
            return Err(Error::Duplicate(c.clone()));
        }
    }
    Ok(())
}
