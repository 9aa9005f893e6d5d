//! Search dimensions and concrete parameter assignments.

use crate::domain::clock::RandomSource;
use crate::domain::error::StratsearchError;
use std::collections::BTreeMap;
use std::fmt;

/// Grids larger than this are refused rather than enumerated.
pub const MAX_GRID_COMBINATIONS: usize = 1_000_000;

/// Inclusive numeric range for one search dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ParameterSpec {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        ParameterSpec { min, max, step }
    }

    pub fn validate(&self, name: &str) -> Result<(), StratsearchError> {
        let invalid = |reason: &str| StratsearchError::InvalidParameter {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if !self.min.is_finite() || !self.max.is_finite() || !self.step.is_finite() {
            return Err(invalid("bounds and step must be finite"));
        }
        if self.min > self.max {
            return Err(invalid("min must not exceed max"));
        }
        if self.step <= 0.0 {
            return Err(invalid("step must be positive"));
        }
        Ok(())
    }

    /// `min, min+step, ...` up to and including `max` when it lies on the grid.
    /// Empty when the dimension has more than `MAX_GRID_COMBINATIONS` points.
    pub fn grid_values(&self) -> Vec<f64> {
        let len = self.grid_len().unwrap_or(0);
        (0..len)
            .map(|i| self.min + i as f64 * self.step)
            .map(|v| v.min(self.max))
            .collect()
    }

    /// Number of grid points, or `None` past `MAX_GRID_COMBINATIONS`.
    pub fn grid_len(&self) -> Option<usize> {
        let steps = ((self.max - self.min) / self.step + 1e-9).floor();
        if !steps.is_finite() || steps < 0.0 || steps >= MAX_GRID_COMBINATIONS as f64 {
            return None;
        }
        Some(steps as usize + 1)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn sample(&self, rng: &mut dyn RandomSource) -> f64 {
        rng.uniform(self.min, self.max)
    }
}

/// Concrete value per named dimension.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSet(BTreeMap<String, f64>);

impl ParameterSet {
    pub fn new() -> Self {
        ParameterSet(BTreeMap::new())
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        ParameterSet(iter.into_iter().collect())
    }
}

impl fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{k}={v}")).collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Named search dimensions. Iteration order is by name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSpace(BTreeMap<String, ParameterSpec>);

impl ParameterSpace {
    pub fn new() -> Self {
        ParameterSpace(BTreeMap::new())
    }

    pub fn with(mut self, name: &str, spec: ParameterSpec) -> Self {
        self.0.insert(name.to_string(), spec);
        self
    }

    pub fn insert(&mut self, name: &str, spec: ParameterSpec) {
        self.0.insert(name.to_string(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterSpec)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> Result<(), StratsearchError> {
        if self.0.is_empty() {
            return Err(StratsearchError::InvalidParameter {
                name: "parameter space".into(),
                reason: "at least one dimension is required".into(),
            });
        }
        for (name, spec) in &self.0 {
            spec.validate(name)?;
        }
        Ok(())
    }

    /// Uniform sample within every dimension's bounds.
    pub fn sample(&self, rng: &mut dyn RandomSource) -> ParameterSet {
        self.0
            .iter()
            .map(|(name, spec)| (name.clone(), spec.sample(rng)))
            .collect()
    }

    pub fn contains(&self, params: &ParameterSet) -> bool {
        self.0
            .iter()
            .all(|(name, spec)| params.get(name).is_some_and(|v| spec.contains(v)))
    }

    /// Full Cartesian product of every dimension's grid, first dimension
    /// varying slowest.
    pub fn grid(&self) -> Result<Vec<ParameterSet>, StratsearchError> {
        self.validate()?;
        let total = self
            .0
            .values()
            .try_fold(1usize, |acc, spec| acc.checked_mul(spec.grid_len()?))
            .filter(|&n| n <= MAX_GRID_COMBINATIONS)
            .ok_or_else(|| StratsearchError::InvalidParameter {
                name: "parameter space".into(),
                reason: format!("grid exceeds {MAX_GRID_COMBINATIONS} combinations"),
            })?;

        let mut combos: Vec<ParameterSet> = Vec::with_capacity(total);
        combos.push(ParameterSet::new());
        for (name, spec) in &self.0 {
            let values = spec.grid_values();
            let mut next = Vec::with_capacity(combos.len() * values.len());
            for combo in &combos {
                for &v in &values {
                    next.push(combo.clone().with(name, v));
                }
            }
            combos = next;
        }
        Ok(combos)
    }
}
