//! StatsScan - single-pass summary statistics over floating point samples
//!
//! Accumulates count, min, max, mean and the sum of squared deviations with
//! Welford's update, so population variance and the standard error of the
//! mean are available without a second pass over the data.
//!
//! NaN is treated as a corrupt sample: scanning stops at the first NaN and
//! every accessor reports its index.

use num_traits::float::Float;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error types for StatsScan operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("NaN value encountered at index {0}")]
    NaNEncountered(usize),
    #[error("No data provided (empty slice)")]
    NoData,
}

/// Running statistics over a sequence of samples
#[derive(Debug, Clone)]
pub struct StatsScan<T: Float> {
    min_value: Option<T>,
    max_value: Option<T>,
    mean: T,
    m2: T,
    count: usize,
    nan_index: Option<usize>,
}

/// Plain-value snapshot of a scan, suitable for reports
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSummary {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl<T: Float + fmt::Debug> StatsScan<T> {
    /// Scan a slice of values
    pub fn new(data: &[T]) -> Self {
        data.iter().copied().collect()
    }

    fn empty() -> Self {
        Self {
            min_value: None,
            max_value: None,
            mean: T::zero(),
            m2: T::zero(),
            count: 0,
            nan_index: None,
        }
    }

    /// Fold one more sample into the scan
    pub fn push(&mut self, value: T) {
        if self.nan_index.is_some() {
            return;
        }
        if value.is_nan() {
            self.nan_index = Some(self.count);
            return;
        }

        self.count += 1;
        let n = T::from(self.count).unwrap_or_else(T::one);
        let delta = value - self.mean;
        self.mean = self.mean + delta / n;
        self.m2 = self.m2 + delta * (value - self.mean);

        self.min_value = Some(self.min_value.map_or(value, |m| m.min(value)));
        self.max_value = Some(self.max_value.map_or(value, |m| m.max(value)));
    }

    fn check(&self) -> Result<(), StatsError> {
        match self.nan_index {
            Some(index) => Err(StatsError::NaNEncountered(index)),
            None if self.count == 0 => Err(StatsError::NoData),
            None => Ok(()),
        }
    }

    pub fn min(&self) -> Result<T, StatsError> {
        self.check()?;
        self.min_value.ok_or(StatsError::NoData)
    }

    pub fn max(&self) -> Result<T, StatsError> {
        self.check()?;
        self.max_value.ok_or(StatsError::NoData)
    }

    /// Arithmetic mean of the scanned samples
    pub fn mean(&self) -> Result<T, StatsError> {
        self.check()?;
        Ok(self.mean)
    }

    /// Population variance (divides by `n`)
    pub fn variance(&self) -> Result<T, StatsError> {
        self.check()?;
        let n = T::from(self.count).unwrap_or_else(T::one);
        Ok(self.m2 / n)
    }

    /// Population standard deviation
    pub fn std_dev(&self) -> Result<T, StatsError> {
        Ok(self.variance()?.sqrt())
    }

    /// Standard error of the mean, `std_dev / sqrt(n)`
    pub fn standard_error(&self) -> Result<T, StatsError> {
        let n = T::from(self.count).unwrap_or_else(T::one);
        Ok(self.std_dev()? / n.sqrt())
    }

    /// Number of samples folded in before any NaN
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn has_nan(&self) -> bool {
        self.nan_index.is_some()
    }

    /// Snapshot of every statistic as `f64`
    pub fn summary(&self) -> Result<StatsSummary, StatsError> {
        let as_f64 = |v: T| v.to_f64().unwrap_or(f64::NAN);
        Ok(StatsSummary {
            count: self.count,
            mean: as_f64(self.mean()?),
            min: as_f64(self.min()?),
            max: as_f64(self.max()?),
            std_dev: as_f64(self.std_dev()?),
        })
    }
}

impl<T: Float + fmt::Debug> FromIterator<T> for StatsScan<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut scan = Self::empty();
        for value in iter {
            scan.push(value);
        }
        scan
    }
}
