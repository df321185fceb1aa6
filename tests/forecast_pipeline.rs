/*!
Test the full pipeline: history file, session, rollout, blended series and decision
*/
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io::Write;
use stockcast::config::ForecastConfig;
use stockcast::data::fake::{PriceRandomWalk, SeriesGen};
use stockcast::data::history::{write_history, CsvHistory, HistorySource};
use stockcast::data::scale::MinMaxScaler;
use stockcast::data::{Observation, ObservationSeries};
use stockcast::decision::{decide, Recommendation};
use stockcast::forecast::{forecast, ForecastError, ForecastSession};
use stockcast::predictor::{FnPredictor, MeanPredictor, NaivePredictor, PredictorError};
use stockcast::service::{ErrorCategory, PredictionService};
use tempfile::NamedTempFile;

fn history_file(days: usize) -> NamedTempFile {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let walk = PriceRandomWalk::new(StdRng::seed_from_u64(11), 110_000.0, 0.0002, 0.012).unwrap();
    let observations: Vec<Observation> = SeriesGen::daily(start, walk).take(days).collect();
    let mut file = NamedTempFile::new().unwrap();
    write_history(&mut file, "^BVSP", observations.iter()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn increasing_seed_with_mean_predictor_stays_in_hull() {
    let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
    let scaler = MinMaxScaler::fit(&closes).unwrap();
    let seed = scaler.normalize_all(&closes);
    let buffer = forecast(&seed, &MeanPredictor, 10, 5).unwrap();
    assert_eq!(buffer.len(), 15);
    let predicted = scaler.denormalize_all(&buffer[10..]);
    for pair in predicted.windows(2) {
        assert!(pair[1] >= pair[0] - 1e-12);
    }
    assert!(predicted.iter().all(|&p| p >= 100.0 && p <= 109.0));
}

#[test]
fn dashboard_flow() {
    let file = history_file(250);
    let series = CsvHistory::new(file.path()).load("^BVSP").unwrap();
    let session = ForecastSession::new(series, ForecastConfig::default()).unwrap();
    let targets = session.allowed_targets().unwrap();
    assert_eq!(targets.len(), 30);

    for &target in &[targets[0], targets[14], targets[29]] {
        let report = session.report(&MeanPredictor, target).unwrap();
        assert_eq!(report.blended.rows.len(), 280);
        assert!(report.recommendation.is_decision());
        let row = report.blended.row_on(target).unwrap();
        assert!(row.forecast);
        assert!((row.c - report.predicted_price).abs() < 1e-6);
        let (lo, hi) = (session.scaler().data_min, session.scaler().data_max);
        assert!(report.predicted_price >= lo - 1e-6 && report.predicted_price <= hi + 1e-6);
    }

    // Determinism: the same inputs give the same series
    let a = session.blended(&NaivePredictor).unwrap();
    let b = session.blended(&NaivePredictor).unwrap();
    assert_eq!(a, b);

    // Persistence holds the last close flat through the forecast
    let last = session.series().last().unwrap().c;
    assert!(a.forecast_rows().all(|row| (row.c - last).abs() < 1e-6));

    let past = session.last_date().unwrap();
    assert!(matches!(
        session.report(&MeanPredictor, past),
        Err(ForecastError::InvalidTarget { .. })
    ));
    assert_eq!(
        decide(&a, past - Duration::days(1000)),
        Recommendation::DateNotFound
    );
}

#[test]
fn short_history_only_warms_up() {
    let file = history_file(40);
    let series = CsvHistory::new(file.path()).load("^BVSP").unwrap();
    let session = ForecastSession::new(series, ForecastConfig::default()).unwrap();
    let target = session.last_date().unwrap() + Duration::days(10);
    // 40 days of history plus 30 forecast days never fill the 80-day window
    let report = session.report(&MeanPredictor, target).unwrap();
    assert_eq!(report.recommendation, Recommendation::InsufficientData);
}

#[test]
fn predictor_failures_abort_the_report() {
    let file = history_file(100);
    let series = CsvHistory::new(file.path()).load("^BVSP").unwrap();
    let session = ForecastSession::new(series, ForecastConfig::default()).unwrap();
    let target = session.last_date().unwrap() + Duration::days(5);
    let broken = FnPredictor::new(10, |_: &[f64]| {
        Err(PredictorError::Backend("tensor shape mismatch".into()))
    });
    assert!(matches!(
        session.report(&broken, target),
        Err(ForecastError::Predictor(_))
    ));
}

#[test]
fn service_predicts_from_stored_history() {
    let file = history_file(90);
    let history = CsvHistory::new(file.path());
    let closes = history.load("^BVSP").unwrap().closes();
    let scaler = MinMaxScaler::fit(&closes).unwrap();
    let service = PredictionService::new(NaivePredictor, scaler, ForecastConfig::service());
    let response = service.predict_auto(&history, "^BVSP").unwrap();
    assert!((response.predicted_price - closes[closes.len() - 1]).abs() < 1e-6);
    assert_eq!(response.days_used, Some(60));

    let short = history_file(30);
    let err = service
        .predict_auto(&CsvHistory::new(short.path()), "^BVSP")
        .unwrap_err();
    assert_eq!(err.category, ErrorCategory::BadRequest);
}

#[test]
fn session_reuses_a_saved_scaler() {
    let closes: Vec<f64> = (0..20).map(|i| 10.0 + i as f64).collect();
    let start = NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let series = ObservationSeries::new(
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Observation {
                t: start + Duration::days(i as i64),
                c,
            })
            .collect(),
    )
    .unwrap();
    let trained = MinMaxScaler::fit(&[0.0, 100.0]).unwrap();
    let session = ForecastSession::with_scaler(series, trained, ForecastConfig::default()).unwrap();
    assert_eq!(session.scaler(), &trained);
    assert!((session.normalized()[0] - 0.1).abs() < 1e-12);
    assert_eq!(session.seed().len(), 10);
}
