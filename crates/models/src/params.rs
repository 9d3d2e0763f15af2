//! Model kinds and hyper-parameters
//!
//! Hyper-parameters travel as an ordered `name -> value` map so they can come
//! from a TOML file, `key=value` pairs on the command line, or a saved model.
//! Each estimator turns the map into its own typed parameter struct.

use crate::error::{ModelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Supported classifier families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "RandomForest")]
    RandomForest,
    #[serde(rename = "SVM")]
    Svm,
    #[serde(rename = "GBM")]
    Gbm,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::RandomForest, ModelKind::Svm, ModelKind::Gbm];

    /// Hyper-parameter names accepted by this kind
    pub fn param_names(&self) -> &'static [&'static str] {
        match self {
            ModelKind::RandomForest => &[
                "n_estimators",
                "max_depth",
                "min_samples_split",
                "min_samples_leaf",
                "max_features",
                "bootstrap",
                "random_state",
                "warm_start",
                "n_jobs",
            ],
            ModelKind::Svm => &[
                "C",
                "kernel",
                "gamma",
                "degree",
                "coef0",
                "tol",
                "max_iter",
                "probability",
                "random_state",
            ],
            ModelKind::Gbm => &[
                "n_estimators",
                "learning_rate",
                "max_depth",
                "min_samples_split",
                "min_samples_leaf",
                "subsample",
                "max_features",
                "random_state",
                "warm_start",
            ],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::RandomForest => "RandomForest",
            ModelKind::Svm => "SVM",
            ModelKind::Gbm => "GBM",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace(['_', '-'], "").as_str() {
            "randomforest" | "rf" => Ok(ModelKind::RandomForest),
            "svm" | "svc" => Ok(ModelKind::Svm),
            "gbm" | "gradientboosting" => Ok(ModelKind::Gbm),
            _ => Err(ModelError::UnsupportedModel(s.to_string())),
        }
    }
}

/// A single hyper-parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Parse a command-line value: integer, float, bool, else string
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if let Ok(i) = text.parse::<i64>() {
            return ParamValue::Int(i);
        }
        if let Ok(f) = text.parse::<f64>() {
            // "inf" and "nan" stay text so numeric lookups reject them
            if f.is_finite() {
                return ParamValue::Float(f);
            }
        }
        match text.to_lowercase().as_str() {
            "true" => ParamValue::Bool(true),
            "false" => ParamValue::Bool(false),
            _ => ParamValue::Str(text.to_string()),
        }
    }

    fn is_none(&self) -> bool {
        matches!(self, ParamValue::Str(s) if s.eq_ignore_ascii_case("none"))
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// Ordered hyper-parameter map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overlay `other` on top of these values
    pub fn merge(&mut self, other: &Params) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Parse `name=value` pairs
    pub fn from_assignments<S: AsRef<str>>(pairs: &[S]) -> Result<Self> {
        let mut params = Params::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (name, value) = pair.split_once('=').ok_or_else(|| {
                ModelError::InvalidInput(format!("parameter must be 'name=value', got '{}'", pair))
            })?;
            params.insert(name.trim(), ParamValue::parse(value));
        }
        Ok(params)
    }

    /// Reject names the model kind does not accept, listing all of them
    pub fn validate(&self, kind: ModelKind) -> Result<()> {
        let allowed = kind.param_names();
        let invalid: Vec<String> = self
            .0
            .keys()
            .filter(|k| !allowed.contains(&k.as_str()))
            .cloned()
            .collect();
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(ModelError::InvalidParams(invalid))
        }
    }

    pub fn usize_or(&self, name: &str, default: usize) -> Result<usize> {
        Ok(self.optional_usize(name)?.unwrap_or(default))
    }

    /// Non-negative integer, `None` when absent or set to "none"
    pub fn optional_usize(&self, name: &str) -> Result<Option<usize>> {
        match self.get(name) {
            None => Ok(None),
            Some(v) if v.is_none() => Ok(None),
            Some(ParamValue::Int(i)) if *i >= 0 => Ok(Some(*i as usize)),
            Some(v) => Err(ModelError::invalid_parameter(
                name,
                v,
                "expected a non-negative integer",
            )),
        }
    }

    pub fn i64_or(&self, name: &str, default: i64) -> Result<i64> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Int(i)) => Ok(*i),
            Some(v) => Err(ModelError::invalid_parameter(name, v, "expected an integer")),
        }
    }

    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Float(f)) if f.is_finite() => Ok(*f),
            Some(ParamValue::Float(f)) => {
                Err(ModelError::invalid_parameter(name, f, "must be finite"))
            }
            Some(ParamValue::Int(i)) => Ok(*i as f64),
            Some(v) => Err(ModelError::invalid_parameter(name, v, "expected a number")),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(ParamValue::Bool(b)) => Ok(*b),
            Some(v) => Err(ModelError::invalid_parameter(name, v, "expected true or false")),
        }
    }

    /// Seed from `random_state`; absent or "none" gives 0
    pub fn seed(&self) -> Result<u64> {
        Ok(self.optional_usize("random_state")?.unwrap_or(0) as u64)
    }

    pub fn max_features_or(&self, default: MaxFeatures) -> Result<MaxFeatures> {
        let name = "max_features";
        match self.get(name) {
            None => Ok(default),
            Some(v) if v.is_none() => Ok(MaxFeatures::All),
            Some(ParamValue::Int(i)) if *i >= 1 => Ok(MaxFeatures::Count(*i as usize)),
            Some(ParamValue::Float(f)) if *f > 0.0 && *f <= 1.0 => Ok(MaxFeatures::Fraction(*f)),
            Some(ParamValue::Str(s)) => match s.to_lowercase().as_str() {
                "sqrt" | "auto" => Ok(MaxFeatures::Sqrt),
                "log2" => Ok(MaxFeatures::Log2),
                "all" => Ok(MaxFeatures::All),
                _ => Err(ModelError::invalid_parameter(name, s, "expected sqrt, log2 or all")),
            },
            Some(v) => Err(ModelError::invalid_parameter(
                name,
                v,
                "expected a positive integer or a fraction in (0, 1]",
            )),
        }
    }
}

/// Number of features considered per split
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
    Count(usize),
    Fraction(f64),
}

impl MaxFeatures {
    /// Resolve against the number of features, at least 1
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let m = match self {
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(c) => *c,
            MaxFeatures::Fraction(f) => (f * n).floor() as usize,
        };
        m.clamp(1, n_features.max(1))
    }
}
