/*!
Data processing and IO functions
*/
use crate::*;
use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod fake;
pub mod history;
pub mod scale;

/// Errors raised while loading, validating or scaling observation data
#[derive(Debug, Error)]
pub enum DataError {
    /// Reading or writing a file failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A JSON document could not be read or written
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// A CSV record could not be read or written
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// A timestamp field could not be parsed
    #[error("unparseable timestamp {value:?} on line {line}")]
    BadTimestamp {
        /// The 1-based line number of the offending record
        line: u64,
        /// The raw field
        value: String,
    },
    /// A closing price field could not be parsed, or was not finite
    #[error("unparseable closing price {value:?} on line {line}")]
    BadClose {
        /// The 1-based line number of the offending record
        line: u64,
        /// The raw field
        value: String,
    },
    /// Two observations were out of order or shared a timestamp
    #[error("observation {index} at {t} does not strictly follow the previous observation")]
    Unordered {
        /// Index of the first offending observation
        index: usize,
        /// Its timestamp
        t: NaiveDateTime,
    },
    /// No observations were found for an asset
    #[error("no observations for asset {0:?}")]
    NoData(String),
    /// A scaler was fit on no values
    #[error("cannot fit a scaler on an empty set of values")]
    EmptyFit,
}

/// A single observed closing price
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Observation<F = CpuFloat> {
    /// This observation's timestamp
    pub t: NaiveDateTime,
    /// The closing price
    pub c: F,
}

/// An ordered sequence of observations with strictly increasing timestamps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservationSeries {
    observations: Vec<Observation>,
}

impl ObservationSeries {
    /// Validate and wrap a vector of observations, which must already be in strictly increasing timestamp order
    pub fn new(observations: Vec<Observation>) -> Result<ObservationSeries, DataError> {
        if let Some((i, (_, next))) = observations
            .iter()
            .tuple_windows()
            .enumerate()
            .find(|(_, (prev, next))| next.t <= prev.t)
        {
            return Err(DataError::Unordered {
                index: i + 1,
                t: next.t,
            });
        }
        Ok(ObservationSeries { observations })
    }
    /// Sort observations by timestamp, then validate them. Duplicate timestamps are still rejected.
    pub fn from_unsorted(mut observations: Vec<Observation>) -> Result<ObservationSeries, DataError> {
        observations.sort_by(|l, r| l.t.cmp(&r.t));
        Self::new(observations)
    }
    /// The observations in this series
    #[inline]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }
    /// The closing prices in this series, in timestamp order
    pub fn closes(&self) -> Vec<CpuFloat> {
        self.observations.iter().map(|o| o.c).collect()
    }
    /// The last `sequence_length` closing prices, or `None` if the series is shorter than that
    pub fn seed(&self, sequence_length: usize) -> Option<Vec<CpuFloat>> {
        let start = self.observations.len().checked_sub(sequence_length)?;
        Some(self.observations[start..].iter().map(|o| o.c).collect())
    }
    /// The most recent observation
    #[inline]
    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }
    /// The number of observations in this series
    #[inline]
    pub fn len(&self) -> usize {
        self.observations.len()
    }
    /// Whether this series is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// Split a series into sliding windows of `sequence_length` inputs, each paired with the value which follows it
pub fn create_sequences<F: Copy>(data: &[F], sequence_length: usize) -> (Vec<Vec<F>>, Vec<F>) {
    if sequence_length == 0 || data.len() <= sequence_length {
        return (Vec::new(), Vec::new());
    }
    data.windows(sequence_length + 1)
        .map(|window| (window[..sequence_length].to_vec(), window[sequence_length]))
        .unzip()
}

/// Split a series into a leading training portion holding `ratio` of the data and a trailing testing portion
pub fn train_test_split<F: Copy>(data: &[F], ratio: f64) -> (&[F], &[F]) {
    let ratio = ratio.max(0.0).min(1.0);
    let train_samples = (data.len() as f64 * ratio) as usize;
    data.split_at(train_samples)
}
