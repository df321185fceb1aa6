/*!
Iterative one-step-ahead forecasting: each prediction is appended to the input buffer and fed back in for the next step
*/
use crate::config::{ConfigError, ForecastConfig};
use crate::data::{scale::MinMaxScaler, DataError, Observation, ObservationSeries};
use crate::decision::{decide, BlendedSeries, Recommendation};
use crate::predictor::{Predictor, PredictorError};
use crate::util::{days_between, following_days};
use chrono::NaiveDate;
use serde::Serialize;
use std::convert::TryFrom;
use thiserror::Error;

/// Errors raised while forecasting
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Fewer observations are available than the predictor's window length
    #[error("insufficient history: need at least {required} observations, got {available}")]
    InsufficientHistory {
        /// The number of observations needed
        required: usize,
        /// The number of observations available
        available: usize,
    },
    /// The requested target date is not strictly after the last known observation
    #[error("target date {target} must be after the last known date {last}")]
    InvalidTarget {
        /// The requested target date
        target: NaiveDate,
        /// The date of the last known observation
        last: NaiveDate,
    },
    /// A forecast of zero steps was requested
    #[error("a forecast must cover at least one step")]
    EmptyHorizon,
    /// A forecast longer than the allowed horizon was requested
    #[error("a forecast of {steps} steps exceeds the maximum horizon of {max}")]
    HorizonTooLong {
        /// The number of steps requested
        steps: usize,
        /// The maximum number of steps allowed
        max: usize,
    },
    /// The predictor failed or returned malformed output
    #[error(transparent)]
    Predictor(#[from] PredictorError),
    /// The observation data could not be used
    #[error(transparent)]
    Data(#[from] DataError),
    /// The session configuration was invalid
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Roll a predictor forward `steps` times from a seed window.
///
/// The last `sequence_length` values of `seed` start the buffer. Each step predicts from the last `sequence_length`
/// values of the buffer and appends the prediction, so the returned buffer holds `sequence_length + steps` normalized
/// values, of which the last `steps` are new.
pub fn forecast<P>(
    seed: &[f64],
    predictor: &P,
    sequence_length: usize,
    steps: usize,
) -> Result<Vec<f64>, ForecastError>
where
    P: Predictor + ?Sized,
{
    if sequence_length == 0 || seed.len() < sequence_length {
        return Err(ForecastError::InsufficientHistory {
            required: sequence_length.max(1),
            available: seed.len(),
        });
    }
    if steps == 0 {
        return Err(ForecastError::EmptyHorizon);
    }
    if let Some(expected) = predictor.window_length() {
        if expected != sequence_length {
            return Err(PredictorError::WindowLength {
                expected,
                got: sequence_length,
            }
            .into());
        }
    }

    let mut buffer = Vec::with_capacity(sequence_length + steps);
    buffer.extend_from_slice(&seed[seed.len() - sequence_length..]);
    for _ in 0..steps {
        let window = &buffer[buffer.len() - sequence_length..];
        let next = predictor.predict(window)?;
        if !next.is_finite() {
            return Err(PredictorError::NonFinite(next).into());
        }
        buffer.push(next);
    }
    Ok(buffer)
}

/// The number of calendar days from the last known date to a target date, which must be strictly later
pub fn target_to_steps(last: NaiveDate, target: NaiveDate) -> Result<usize, ForecastError> {
    let days = days_between(last, target);
    if days <= 0 {
        return Err(ForecastError::InvalidTarget { target, last });
    }
    usize::try_from(days).map_err(|_| ForecastError::InvalidTarget { target, last })
}

/// The outcome of a forecast to a target date: the predicted price, the series it was judged on and the decision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    /// The target date
    pub target: NaiveDate,
    /// The price predicted for the target date
    pub predicted_price: f64,
    /// The history followed by the fixed-horizon forecast, with moving averages
    pub blended: BlendedSeries,
    /// The crossover decision at the target date
    pub recommendation: Recommendation,
}

/// A forecasting session over one asset's history: the observations, the transform fitted on them and the
/// configuration, passed explicitly to every forecast
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSession {
    series: ObservationSeries,
    scaler: MinMaxScaler,
    normalized: Vec<f64>,
    config: ForecastConfig,
}

impl ForecastSession {
    /// Start a session, fitting the normalization transform on the whole history
    pub fn new(series: ObservationSeries, config: ForecastConfig) -> Result<ForecastSession, ForecastError> {
        Self::check_length(&series, &config)?;
        let scaler = MinMaxScaler::fit(&series.closes())?;
        Self::with_scaler(series, scaler, config)
    }
    /// Start a session reusing an already fitted normalization transform, such as the one a model was trained with
    pub fn with_scaler(
        series: ObservationSeries,
        scaler: MinMaxScaler,
        config: ForecastConfig,
    ) -> Result<ForecastSession, ForecastError> {
        Self::check_length(&series, &config)?;
        let normalized = scaler.normalize_all(&series.closes());
        log::debug!(
            "Forecast session over {} observations, closes in [{}, {}]",
            series.len(),
            scaler.data_min,
            scaler.data_max
        );
        Ok(ForecastSession {
            series,
            scaler,
            normalized,
            config,
        })
    }
    fn check_length(series: &ObservationSeries, config: &ForecastConfig) -> Result<(), ForecastError> {
        config.validate()?;
        if series.len() < config.sequence_length {
            return Err(ForecastError::InsufficientHistory {
                required: config.sequence_length,
                available: series.len(),
            });
        }
        Ok(())
    }
    /// The observed history
    #[inline]
    pub fn series(&self) -> &ObservationSeries {
        &self.series
    }
    /// The fitted normalization transform
    #[inline]
    pub fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }
    /// The session configuration
    #[inline]
    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }
    /// The normalized history
    #[inline]
    pub fn normalized(&self) -> &[f64] {
        &self.normalized
    }
    /// The most recent `sequence_length` normalized observations
    pub fn seed(&self) -> &[f64] {
        &self.normalized[self.normalized.len() - self.config.sequence_length..]
    }
    fn last_observation(&self) -> Result<&Observation, ForecastError> {
        self.series.last().ok_or(ForecastError::InsufficientHistory {
            required: self.config.sequence_length,
            available: 0,
        })
    }
    /// The calendar date of the last observation
    pub fn last_date(&self) -> Result<NaiveDate, ForecastError> {
        Ok(self.last_observation()?.t.date())
    }
    /// The dates a target may be chosen from: every day after the last observation up to the maximum horizon
    pub fn allowed_targets(&self) -> Result<Vec<NaiveDate>, ForecastError> {
        let last = self.last_observation()?;
        Ok(following_days(last.t, self.config.max_horizon)
            .map(|t| t.date())
            .collect())
    }
    fn check_horizon(&self, steps: usize) -> Result<(), ForecastError> {
        if steps == 0 {
            return Err(ForecastError::EmptyHorizon);
        }
        if steps > self.config.max_horizon {
            return Err(ForecastError::HorizonTooLong {
                steps,
                max: self.config.max_horizon,
            });
        }
        Ok(())
    }
    /// Roll forward `steps` days and return the denormalized new values
    fn rollout<P: Predictor + ?Sized>(&self, predictor: &P, steps: usize) -> Result<Vec<f64>, ForecastError> {
        self.check_horizon(steps)?;
        let buffer = forecast(self.seed(), predictor, self.config.sequence_length, steps)?;
        Ok(self.scaler.denormalize_all(&buffer[buffer.len() - steps..]))
    }
    /// Predict the price on a single future date, discarding the intermediate steps
    pub fn predict_to_date<P: Predictor + ?Sized>(
        &self,
        predictor: &P,
        target: NaiveDate,
    ) -> Result<f64, ForecastError> {
        let steps = target_to_steps(self.last_date()?, target)?;
        let path = self.rollout(predictor, steps)?;
        let price = path[path.len() - 1];
        log::info!("Predicted {:.2} for {} ({} steps)", price, target, steps);
        Ok(price)
    }
    /// Forecast `steps` days, dated consecutively from the day after the last observation
    pub fn forecast_path<P: Predictor + ?Sized>(
        &self,
        predictor: &P,
        steps: usize,
    ) -> Result<Vec<Observation>, ForecastError> {
        let last = self.last_observation()?;
        let values = self.rollout(predictor, steps)?;
        Ok(following_days(last.t, steps)
            .zip(values)
            .map(|(t, c)| Observation { t, c })
            .collect())
    }
    /// Forecast the configured horizon and blend it onto the history, with moving averages over the result
    pub fn blended<P: Predictor + ?Sized>(&self, predictor: &P) -> Result<BlendedSeries, ForecastError> {
        let path = self.forecast_path(predictor, self.config.horizon)?;
        Ok(BlendedSeries::blend(
            &self.series,
            &path,
            self.config.short_window,
            self.config.long_window,
        ))
    }
    /// Predict the price at a target date, build the blended series and decide on it
    pub fn report<P: Predictor + ?Sized>(
        &self,
        predictor: &P,
        target: NaiveDate,
    ) -> Result<ForecastReport, ForecastError> {
        let predicted_price = self.predict_to_date(predictor, target)?;
        let blended = self.blended(predictor)?;
        let recommendation = decide(&blended, target);
        Ok(ForecastReport {
            target,
            predicted_price,
            blended,
            recommendation,
        })
    }
}
