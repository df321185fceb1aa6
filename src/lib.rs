/*!
Iterative price forecasting for an index or asset, with a moving-average crossover recommendation on top.

Historical closes are scaled into `[0, 1]`, a window of the most recent values seeds a one-step-ahead
[`Predictor`](predictor::Predictor), and each prediction is fed back in as input for the next step. The resulting
path is appended to the history, smoothed with a fast and a slow moving average, and the crossover at a chosen date
yields a [`Recommendation`](decision::Recommendation).

The predictor is a black box: anything mapping a fixed-length window to a single value works, including the
recurrent network in [`lstm`] (behind the `lstm` feature, using PyTorch bindings).
*/
#![forbid(missing_docs)]

pub mod config;
pub mod data;
pub mod decision;
pub mod forecast;
#[cfg(feature = "lstm")]
pub mod lstm;
pub mod predictor;
pub mod service;
pub mod util;

/// The floating point type to be used for CPU calculations
pub type CpuFloat = f64;

/// The floating point type to be used for GPU calculations
pub type GpuFloat = f32;
