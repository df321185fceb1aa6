/*!
Forecasting configuration
*/
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

/// The default length of the window fed to the predictor
pub const SEQUENCE_LENGTH: usize = 10;
/// The sequence length used by the prediction service
pub const SERVICE_SEQUENCE_LENGTH: usize = 60;
/// The default number of days forecast for the blended series
pub const HORIZON: usize = 30;
/// The default maximum number of days which may be forecast in one request
pub const MAX_HORIZON: usize = 30;
/// The default short moving average window
pub const SHORT_WINDOW: usize = 20;
/// The default long moving average window
pub const LONG_WINDOW: usize = 80;

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("could not read configuration: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration file was not valid JSON
    #[error("could not parse configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// A configuration value was out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where the prediction service gets its normalization transform from
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerPolicy {
    /// Reuse the transform fitted once, on the reference history, when the service was set up
    Reuse,
    /// Fit a fresh transform on the window supplied with each request
    RefitPerRequest,
}

impl Default for ScalerPolicy {
    fn default() -> ScalerPolicy {
        ScalerPolicy::Reuse
    }
}

/// Parameters of a forecasting session
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// The number of normalized values fed to the predictor per step
    pub sequence_length: usize,
    /// The number of days forecast for the blended series
    pub horizon: usize,
    /// The largest number of days a single forecast may cover
    pub max_horizon: usize,
    /// The short moving average window
    pub short_window: usize,
    /// The long moving average window
    pub long_window: usize,
    /// Normalization policy for ad hoc history supplied to the prediction service
    pub scaler_policy: ScalerPolicy,
}

impl Default for ForecastConfig {
    fn default() -> ForecastConfig {
        ForecastConfig {
            sequence_length: SEQUENCE_LENGTH,
            horizon: HORIZON,
            max_horizon: MAX_HORIZON,
            short_window: SHORT_WINDOW,
            long_window: LONG_WINDOW,
            scaler_policy: ScalerPolicy::default(),
        }
    }
}

impl ForecastConfig {
    /// The configuration used by the prediction service, which looks back over a longer window
    pub fn service() -> ForecastConfig {
        ForecastConfig {
            sequence_length: SERVICE_SEQUENCE_LENGTH,
            ..ForecastConfig::default()
        }
    }
    /// Check that every parameter is in range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence_length == 0 {
            return Err(ConfigError::Invalid(
                "sequence_length must be positive".into(),
            ));
        }
        if self.horizon == 0 {
            return Err(ConfigError::Invalid("horizon must be positive".into()));
        }
        if self.horizon > self.max_horizon {
            return Err(ConfigError::Invalid(format!(
                "horizon {} exceeds max_horizon {}",
                self.horizon, self.max_horizon
            )));
        }
        if self.short_window == 0 || self.long_window == 0 {
            return Err(ConfigError::Invalid(
                "moving average windows must be positive".into(),
            ));
        }
        Ok(())
    }
    /// Load and validate a JSON configuration file. Missing fields take their default values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ForecastConfig, ConfigError> {
        let file = File::open(path)?;
        let config: ForecastConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = ForecastConfig::default();
        assert_eq!(config.sequence_length, 10);
        assert_eq!((config.short_window, config.long_window), (20, 80));
        config.validate().unwrap();
        assert_eq!(ForecastConfig::service().sequence_length, 60);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ForecastConfig =
            serde_json::from_str(r#"{"sequence_length": 60, "scaler_policy": "refit_per_request"}"#)
                .unwrap();
        assert_eq!(config.sequence_length, 60);
        assert_eq!(config.horizon, HORIZON);
        assert_eq!(config.scaler_policy, ScalerPolicy::RefitPerRequest);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let config = ForecastConfig {
            horizon: 31,
            ..ForecastConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        let config = ForecastConfig {
            sequence_length: 0,
            ..ForecastConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
