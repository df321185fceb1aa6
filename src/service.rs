/*!
The prediction service: a framework-free request handler which predicts the next closing price from a window of
history, with JSON request and response bodies
*/
use crate::config::{ForecastConfig, ScalerPolicy};
use crate::data::{history::HistorySource, scale::MinMaxScaler, DataError, ObservationSeries};
use crate::forecast::{forecast, ForecastError};
use crate::predictor::Predictor;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The body of a prediction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    /// Historical closing prices, oldest first
    pub history: Vec<f64>,
}

/// The body of a successful prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// The predicted next closing price
    pub predicted_price: f64,
    /// Where the history was loaded from, if the service loaded it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// How many days of history the prediction used, if the service loaded it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_used: Option<usize>,
}

/// The body returned by the status check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// A human-readable status message
    pub message: String,
}

/// The category of a failed request
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The request itself was unusable
    BadRequest,
    /// The service failed while handling a valid request
    Internal,
}

impl ErrorCategory {
    /// The HTTP status code for this category
    pub fn status(&self) -> u16 {
        match self {
            ErrorCategory::BadRequest => 400,
            ErrorCategory::Internal => 500,
        }
    }
}

/// A failed request: a category and a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ServiceError {
    /// What kind of failure this was
    pub category: ErrorCategory,
    /// What went wrong
    #[serde(rename = "error")]
    pub message: String,
}

impl ServiceError {
    /// A rejected request
    pub fn bad_request<S: Into<String>>(message: S) -> ServiceError {
        ServiceError {
            category: ErrorCategory::BadRequest,
            message: message.into(),
        }
    }
    /// A failure while handling a valid request
    pub fn internal<S: Into<String>>(message: S) -> ServiceError {
        ServiceError {
            category: ErrorCategory::Internal,
            message: message.into(),
        }
    }
}

impl From<ForecastError> for ServiceError {
    fn from(err: ForecastError) -> ServiceError {
        match err {
            ForecastError::InsufficientHistory { .. }
            | ForecastError::InvalidTarget { .. }
            | ForecastError::EmptyHorizon
            | ForecastError::HorizonTooLong { .. } => ServiceError::bad_request(err.to_string()),
            ForecastError::Predictor(_) | ForecastError::Data(_) | ForecastError::Config(_) => {
                ServiceError::internal(err.to_string())
            }
        }
    }
}

impl From<DataError> for ServiceError {
    fn from(err: DataError) -> ServiceError {
        ServiceError::internal(err.to_string())
    }
}

/// Predicts the next closing price from the most recent `sequence_length` closes
#[derive(Debug, Clone)]
pub struct PredictionService<P> {
    predictor: P,
    scaler: Option<MinMaxScaler>,
    config: ForecastConfig,
}

impl<P: Predictor> PredictionService<P> {
    /// Serve a predictor, normalizing requests with a transform fitted in advance
    pub fn new(predictor: P, scaler: MinMaxScaler, config: ForecastConfig) -> PredictionService<P> {
        PredictionService {
            predictor,
            scaler: Some(scaler),
            config,
        }
    }
    /// Serve a predictor, fitting a fresh transform on every request's window
    pub fn refitting(predictor: P, config: ForecastConfig) -> PredictionService<P> {
        PredictionService {
            predictor,
            scaler: None,
            config: ForecastConfig {
                scaler_policy: ScalerPolicy::RefitPerRequest,
                ..config
            },
        }
    }
    /// A liveness message
    pub fn status(&self) -> StatusMessage {
        StatusMessage {
            message: "Price prediction service is online.".to_string(),
        }
    }
    fn scaler_for(&self, window: &[f64]) -> Result<MinMaxScaler, ServiceError> {
        match self.scaler {
            Some(scaler) if self.config.scaler_policy == ScalerPolicy::Reuse => Ok(scaler),
            _ => Ok(MinMaxScaler::fit(window)?),
        }
    }
    fn predict_window(&self, history: &[f64]) -> Result<f64, ServiceError> {
        let sequence_length = self.config.sequence_length;
        let window = &history[history.len() - sequence_length..];
        let scaler = self.scaler_for(window)?;
        let normalized = scaler.normalize_all(window);
        let buffer = forecast(&normalized, &self.predictor, sequence_length, 1)?;
        Ok(scaler.denormalize(buffer[buffer.len() - 1]))
    }
    /// Predict the price following the supplied history
    pub fn predict(&self, request: &PredictRequest) -> Result<PredictResponse, ServiceError> {
        let sequence_length = self.config.sequence_length;
        if request.history.len() < sequence_length {
            return Err(ServiceError::bad_request(format!(
                "At least {} historical prices are required, got {}.",
                sequence_length,
                request.history.len()
            )));
        }
        if let Some(bad) = request.history.iter().find(|p| !p.is_finite()) {
            return Err(ServiceError::bad_request(format!(
                "Historical prices must be finite numbers, got {}.",
                bad
            )));
        }
        let predicted_price = self.predict_window(&request.history)?;
        log::info!(
            "Predicted {:.2} from {} supplied prices",
            predicted_price,
            request.history.len()
        );
        Ok(PredictResponse {
            predicted_price,
            source: None,
            days_used: None,
        })
    }
    /// Load an asset's history and predict the price following it
    pub fn predict_auto<S>(&self, source: &S, asset: &str) -> Result<PredictResponse, ServiceError>
    where
        S: HistorySource + ?Sized,
    {
        let sequence_length = self.config.sequence_length;
        let series = match source.load(asset) {
            Ok(series) => series,
            Err(DataError::NoData(_)) => ObservationSeries::default(),
            Err(err) => return Err(err.into()),
        };
        let window = series.seed(sequence_length).ok_or_else(|| {
            ServiceError::bad_request(format!(
                "Not enough data to predict {} (minimum {} days, found {}).",
                asset,
                sequence_length,
                series.len()
            ))
        })?;
        let predicted_price = self.predict_window(&window)?;
        log::info!("Predicted {:.2} for {} from {}", predicted_price, asset, source.describe());
        Ok(PredictResponse {
            predicted_price,
            source: Some(source.describe()),
            days_used: Some(sequence_length),
        })
    }
    /// Handle a JSON prediction request body, returning an HTTP status code and a JSON response body
    pub fn handle_json(&self, body: &str) -> (u16, String) {
        let result = serde_json::from_str::<PredictRequest>(body)
            .map_err(|err| ServiceError::bad_request(format!("Malformed request: {}", err)))
            .and_then(|request| self.predict(&request));
        let (status, body) = match result {
            Ok(response) => (200, serde_json::to_string(&response)),
            Err(err) => {
                log::warn!("Rejected prediction request: {}", err);
                (err.category.status(), serde_json::to_string(&err))
            }
        };
        match body {
            Ok(body) => (status, body),
            Err(err) => (500, format!("{{\"error\":\"{}\",\"category\":\"internal\"}}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Observation;
    use crate::predictor::{FnPredictor, MeanPredictor, NaivePredictor, PredictorError};
    use chrono::{Duration, NaiveDate};
    use std::collections::HashMap;

    fn small_config() -> ForecastConfig {
        ForecastConfig {
            sequence_length: 4,
            ..ForecastConfig::default()
        }
    }

    #[test]
    fn reused_scaler_predicts_in_price_units() {
        let scaler = MinMaxScaler::fit(&[100.0, 200.0]).unwrap();
        let service = PredictionService::new(MeanPredictor, scaler, small_config());
        let response = service
            .predict(&PredictRequest {
                history: vec![1.0, 120.0, 140.0, 160.0, 180.0],
            })
            .unwrap();
        assert!((response.predicted_price - 150.0).abs() < 1e-9);
        assert_eq!(response.source, None);
    }

    #[test]
    fn refitting_scaler_predicts_in_price_units() {
        let service = PredictionService::refitting(NaivePredictor, small_config());
        let response = service
            .predict(&PredictRequest {
                history: vec![10.0, 11.0, 12.0, 13.0],
            })
            .unwrap();
        assert!((response.predicted_price - 13.0).abs() < 1e-9);
    }

    #[test]
    fn short_history_is_a_bad_request() {
        let service = PredictionService::refitting(MeanPredictor, ForecastConfig::service());
        let err = service
            .predict(&PredictRequest {
                history: vec![1.0; 59],
            })
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::BadRequest);
        assert_eq!(err.category.status(), 400);
        assert!(err.message.contains("60"));
    }

    #[test]
    fn predictor_failures_are_internal_errors() {
        let failing = FnPredictor::new(4, |_: &[f64]| {
            Err(PredictorError::Backend("session closed".into()))
        });
        let service = PredictionService::refitting(failing, small_config());
        let err = service
            .predict(&PredictRequest {
                history: vec![1.0, 2.0, 3.0, 4.0],
            })
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Internal);
    }

    #[test]
    fn json_contract() {
        let service = PredictionService::refitting(NaivePredictor, small_config());
        let (status, body) = service.handle_json(r#"{"history": [5.0, 6.0, 7.0, 8.0]}"#);
        assert_eq!(status, 200);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!((value["predicted_price"].as_f64().unwrap() - 8.0).abs() < 1e-9);
        assert!(value.get("source").is_none());

        let (status, body) = service.handle_json(r#"{"history": [5.0]}"#);
        assert_eq!(status, 400);
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["category"], "bad_request");
        assert!(value["error"].as_str().unwrap().contains("At least 4"));

        let (status, _) = service.handle_json("not json");
        assert_eq!(status, 400);
    }

    #[test]
    fn automatic_prediction_loads_history() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let series = ObservationSeries::new(
            (0..6)
                .map(|i| Observation {
                    t: start + Duration::days(i),
                    c: 40_000.0 + 100.0 * i as f64,
                })
                .collect(),
        )
        .unwrap();
        let mut sources = HashMap::new();
        sources.insert("BTC-USD".to_string(), series);

        let service = PredictionService::refitting(NaivePredictor, small_config());
        let response = service.predict_auto(&sources, "BTC-USD").unwrap();
        assert!((response.predicted_price - 40_500.0).abs() < 1e-6);
        assert_eq!(response.source.as_deref(), Some("memory"));
        assert_eq!(response.days_used, Some(4));

        let err = service.predict_auto(&sources, "ETH-USD").unwrap_err();
        assert_eq!(err.category, ErrorCategory::BadRequest);
        assert_eq!(err.category.status(), 400);
        assert!(err.message.contains("minimum 4 days, found 0"));

        let strict = PredictionService::refitting(NaivePredictor, ForecastConfig::service());
        assert_eq!(
            strict.predict_auto(&sources, "BTC-USD").unwrap_err().category,
            ErrorCategory::BadRequest
        );
    }

    #[test]
    fn status_is_online() {
        let service = PredictionService::refitting(MeanPredictor, small_config());
        assert!(service.status().message.contains("online"));
    }
}
