/*!
One-step-ahead predictors: anything mapping a fixed-length window of normalized values to the next value
*/
use thiserror::Error;

/// Errors raised by a predictor invocation
#[derive(Debug, Error)]
pub enum PredictorError {
    /// The predictor was given a window of the wrong length
    #[error("predictor expects a window of {expected} values, got {got}")]
    WindowLength {
        /// The window length the predictor accepts
        expected: usize,
        /// The window length it was given
        got: usize,
    },
    /// The predictor returned NaN or an infinity
    #[error("predictor returned a non-finite value: {0}")]
    NonFinite(f64),
    /// The underlying model failed
    #[error("predictor backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A black-box model predicting the next normalized value from a window of preceding normalized values
pub trait Predictor {
    /// Predict the value following `window`
    fn predict(&self, window: &[f64]) -> Result<f64, PredictorError>;
    /// The window length this predictor accepts, if it is fixed
    fn window_length(&self) -> Option<usize> {
        None
    }
}

impl<P: Predictor + ?Sized> Predictor for &P {
    #[inline]
    fn predict(&self, window: &[f64]) -> Result<f64, PredictorError> {
        (**self).predict(window)
    }
    #[inline]
    fn window_length(&self) -> Option<usize> {
        (**self).window_length()
    }
}

impl<P: Predictor + ?Sized> Predictor for Box<P> {
    #[inline]
    fn predict(&self, window: &[f64]) -> Result<f64, PredictorError> {
        (**self).predict(window)
    }
    #[inline]
    fn window_length(&self) -> Option<usize> {
        (**self).window_length()
    }
}

/// Predicts the mean of its input window
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct MeanPredictor;

impl Predictor for MeanPredictor {
    fn predict(&self, window: &[f64]) -> Result<f64, PredictorError> {
        if window.is_empty() {
            return Err(PredictorError::WindowLength {
                expected: 1,
                got: 0,
            });
        }
        Ok(window.iter().sum::<f64>() / window.len() as f64)
    }
}

/// Predicts that the last value in its window persists
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct NaivePredictor;

impl Predictor for NaivePredictor {
    fn predict(&self, window: &[f64]) -> Result<f64, PredictorError> {
        window
            .last()
            .copied()
            .ok_or(PredictorError::WindowLength {
                expected: 1,
                got: 0,
            })
    }
}

/// Adapt a fallible closure into a predictor accepting exactly `window_length` values
#[derive(Debug, Copy, Clone)]
pub struct FnPredictor<F> {
    /// The window length the closure accepts
    pub window_length: usize,
    /// The prediction function
    pub func: F,
}

impl<F> FnPredictor<F>
where
    F: Fn(&[f64]) -> Result<f64, PredictorError>,
{
    /// Wrap a closure
    pub fn new(window_length: usize, func: F) -> FnPredictor<F> {
        FnPredictor {
            window_length,
            func,
        }
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(&[f64]) -> Result<f64, PredictorError>,
{
    fn predict(&self, window: &[f64]) -> Result<f64, PredictorError> {
        if window.len() != self.window_length {
            return Err(PredictorError::WindowLength {
                expected: self.window_length,
                got: window.len(),
            });
        }
        (self.func)(window)
    }
    fn window_length(&self) -> Option<usize> {
        Some(self.window_length)
    }
}
