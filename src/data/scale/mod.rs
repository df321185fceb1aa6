/*!
Input data scaling
*/
use super::DataError;
use crate::CpuFloat;
use num::Float;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A reversible linear map from the range of a fitting set onto a fixed target range
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler<F = CpuFloat> {
    /// The smallest value in the fitting set
    pub data_min: F,
    /// The largest value in the fitting set
    pub data_max: F,
    /// The lower bound of the target range
    pub range_min: F,
    /// The upper bound of the target range
    pub range_max: F,
}

impl<F> MinMaxScaler<F>
where
    F: Copy + Float,
{
    /// Fit a scaler mapping the range of `data` onto `[0, 1]`
    pub fn fit(data: &[F]) -> Result<MinMaxScaler<F>, DataError> {
        Self::fit_range(data, F::zero(), F::one())
    }
    /// Fit a scaler mapping the range of `data` onto `[range_min, range_max]`. Non-finite values are ignored.
    pub fn fit_range(data: &[F], range_min: F, range_max: F) -> Result<MinMaxScaler<F>, DataError> {
        let (data_min, data_max) = data
            .iter()
            .copied()
            .filter(|x| x.is_finite())
            .fold(None, |acc: Option<(F, F)>, x| match acc {
                None => Some((x, x)),
                Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
            })
            .ok_or(DataError::EmptyFit)?;
        Ok(MinMaxScaler {
            data_min,
            data_max,
            range_min,
            range_max,
        })
    }
    /// The multiplier applied to a value's offset from `data_min`. A constant fitting set scales by the width of
    /// the target range alone.
    #[inline]
    pub fn scale(&self) -> F {
        let data_range = self.data_max - self.data_min;
        let target_range = self.range_max - self.range_min;
        if data_range == F::zero() {
            target_range
        } else {
            target_range / data_range
        }
    }
    /// Map a raw value into the target range. Values outside the fitting range extrapolate linearly.
    #[inline]
    pub fn normalize(&self, val: F) -> F {
        (val - self.data_min) * self.scale() + self.range_min
    }
    /// Map a normalized value back to the raw scale
    #[inline]
    pub fn denormalize(&self, val: F) -> F {
        (val - self.range_min) / self.scale() + self.data_min
    }
    /// Normalize a slice of values
    pub fn normalize_all(&self, vals: &[F]) -> Vec<F> {
        vals.iter().map(|&v| self.normalize(v)).collect()
    }
    /// Denormalize a slice of values
    pub fn denormalize_all(&self, vals: &[F]) -> Vec<F> {
        vals.iter().map(|&v| self.denormalize(v)).collect()
    }
}

impl<F> MinMaxScaler<F>
where
    F: Serialize + for<'de> Deserialize<'de>,
{
    /// Load a fitted scaler from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<MinMaxScaler<F>, DataError> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
    /// Save a fitted scaler to a JSON file, so that inference reuses the transform fitted at training time
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DataError> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}
