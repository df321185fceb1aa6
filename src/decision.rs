/*!
Blended history and forecast series, and the moving-average crossover decision made on them
*/
use crate::data::{Observation, ObservationSeries};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use ta::indicators::SimpleMovingAverage;
use ta::Next;

/// A trailing simple moving average over `values`. The first `window - 1` positions, which have fewer than `window`
/// values behind them, are `None`; so is every position if `window` is zero.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let sma = Some(window)
        .filter(|&n| n > 0 && n <= u32::MAX as usize)
        .and_then(|n| SimpleMovingAverage::new(n as _).ok());
    let mut sma = match sma {
        Some(sma) => sma,
        None => return vec![None; values.len()],
    };
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let average = sma.next(value);
            if i + 1 >= window {
                Some(average)
            } else {
                None
            }
        })
        .collect()
}

/// A row of a blended series
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendedRow {
    /// This row's timestamp
    pub t: NaiveDateTime,
    /// The observed or forecast closing price
    pub c: f64,
    /// The short moving average ending at this row, if outside its warm-up gap
    pub short: Option<f64>,
    /// The long moving average ending at this row, if outside its warm-up gap
    pub long: Option<f64>,
    /// Whether this row was forecast rather than observed
    pub forecast: bool,
}

/// Historical observations followed by a forecast path, with short and long moving averages over the combined closes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendedSeries {
    /// The rows of the series, in timestamp order
    pub rows: Vec<BlendedRow>,
    /// The short moving average window
    pub short_window: usize,
    /// The long moving average window
    pub long_window: usize,
}

impl BlendedSeries {
    /// Append a forecast path to a history and compute both moving averages over the result
    pub fn blend(
        history: &ObservationSeries,
        path: &[Observation],
        short_window: usize,
        long_window: usize,
    ) -> BlendedSeries {
        let observed = history.observations().iter().map(|obs| (obs, false));
        let forecast = path.iter().map(|obs| (obs, true));
        let merged: Vec<(&Observation, bool)> = observed.chain(forecast).collect();
        let closes: Vec<f64> = merged.iter().map(|(obs, _)| obs.c).collect();
        let short = rolling_mean(&closes, short_window);
        let long = rolling_mean(&closes, long_window);
        let rows = merged
            .into_iter()
            .zip(short.into_iter().zip(long))
            .map(|((obs, forecast), (short, long))| BlendedRow {
                t: obs.t,
                c: obs.c,
                short,
                long,
                forecast,
            })
            .collect();
        BlendedSeries {
            rows,
            short_window,
            long_window,
        }
    }
    /// The first row falling on a given calendar date, ignoring time of day
    pub fn row_on(&self, date: NaiveDate) -> Option<&BlendedRow> {
        self.rows.iter().find(|row| row.t.date() == date)
    }
    /// The forecast rows of this series
    pub fn forecast_rows(&self) -> impl Iterator<Item = &BlendedRow> {
        self.rows.iter().filter(|row| row.forecast)
    }
    /// The lowest and highest closing prices in the series, for scaling a chart
    pub fn close_range(&self) -> Option<(f64, f64)> {
        self.rows.iter().map(|row| row.c).fold(None, |acc, c| match acc {
            None => Some((c, c)),
            Some((lo, hi)) => Some((lo.min(c), hi.max(c))),
        })
    }
}

/// The outcome of a crossover decision
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// The short average is above the long average
    Buy,
    /// The short average is at or below the long average
    Wait,
    /// The series has no row on the requested date
    DateNotFound,
    /// A moving average is still inside its warm-up gap on the requested date
    InsufficientData,
}

impl Recommendation {
    /// Whether this is an actionable recommendation, rather than a report that no decision could be made
    pub fn is_decision(&self) -> bool {
        matches!(self, Recommendation::Buy | Recommendation::Wait)
    }
}

impl Display for Recommendation {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Recommendation::Buy => write!(f, "Recommendation: Buy"),
            Recommendation::Wait => write!(f, "Recommendation: Wait"),
            Recommendation::DateNotFound => write!(f, "Date not found."),
            Recommendation::InsufficientData => write!(f, "Not enough data for a decision."),
        }
    }
}

/// Decide whether to buy at a target date: buy if the short moving average is strictly above the long one, and wait
/// otherwise
pub fn decide(blended: &BlendedSeries, target: NaiveDate) -> Recommendation {
    let row = match blended.row_on(target) {
        Some(row) => row,
        None => return Recommendation::DateNotFound,
    };
    match (row.short, row.long) {
        (Some(short), Some(long)) if short > long => Recommendation::Buy,
        (Some(_), Some(_)) => Recommendation::Wait,
        _ => Recommendation::InsufficientData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(n: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::days(n)
    }

    fn single_row(short: Option<f64>, long: Option<f64>) -> BlendedSeries {
        BlendedSeries {
            rows: vec![BlendedRow {
                t: day(0) + Duration::hours(17),
                c: 100.0,
                short,
                long,
                forecast: true,
            }],
            short_window: 20,
            long_window: 80,
        }
    }

    fn history(closes: impl IntoIterator<Item = f64>) -> ObservationSeries {
        ObservationSeries::new(
            closes
                .into_iter()
                .enumerate()
                .map(|(i, c)| Observation {
                    t: day(i as i64),
                    c,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn rolling_mean_has_warm_up_gap() {
        let avg = rolling_mean(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(avg[..2], [None, None]);
        let tail: Vec<f64> = avg[2..].iter().map(|a| a.unwrap()).collect();
        for (got, want) in tail.iter().zip(&[2.0, 3.0, 4.0]) {
            assert!((got - want).abs() < 1e-12);
        }
        assert_eq!(rolling_mean(&[1.0, 2.0], 3), vec![None, None]);
        assert_eq!(rolling_mean(&[1.0, 2.0], 0), vec![None, None]);
        assert_eq!(rolling_mean(&[4.0], 1), vec![Some(4.0)]);
    }

    #[test]
    fn crossover_boundaries() {
        let target = day(0).date();
        assert_eq!(
            decide(&single_row(Some(105.0), Some(100.0)), target),
            Recommendation::Buy
        );
        assert_eq!(
            decide(&single_row(Some(95.0), Some(100.0)), target),
            Recommendation::Wait
        );
        assert_eq!(
            decide(&single_row(Some(100.0), Some(100.0)), target),
            Recommendation::Wait
        );
    }

    #[test]
    fn missing_rows_and_averages() {
        let target = day(0).date();
        assert_eq!(
            decide(&single_row(Some(105.0), Some(100.0)), day(1).date()),
            Recommendation::DateNotFound
        );
        assert_eq!(
            decide(&single_row(Some(105.0), None), target),
            Recommendation::InsufficientData
        );
        assert_eq!(
            decide(&single_row(None, Some(100.0)), target),
            Recommendation::InsufficientData
        );
    }

    #[test]
    fn short_series_stays_in_warm_up_gap() {
        let blended = BlendedSeries::blend(&history((0..79).map(|i| 100.0 + i as f64)), &[], 20, 80);
        assert_eq!(blended.rows.len(), 79);
        for row in blended.rows.iter() {
            assert_eq!(decide(&blended, row.t.date()), Recommendation::InsufficientData);
        }
    }

    #[test]
    fn blend_marks_forecast_rows_and_averages_across_the_seam() {
        let hist = history(vec![1.0, 2.0, 3.0]);
        let path = vec![
            Observation { t: day(3), c: 4.0 },
            Observation { t: day(4), c: 5.0 },
        ];
        let blended = BlendedSeries::blend(&hist, &path, 2, 4);
        assert_eq!(blended.rows.len(), 5);
        assert_eq!(blended.forecast_rows().count(), 2);
        assert!(!blended.rows[2].forecast && blended.rows[3].forecast);
        assert!((blended.rows[3].short.unwrap() - 3.5).abs() < 1e-12);
        assert!((blended.rows[4].long.unwrap() - 3.5).abs() < 1e-12);
        assert_eq!(blended.rows[2].long, None);
        assert_eq!(blended.close_range(), Some((1.0, 5.0)));
        // Rising closes put the fast average over the slow one
        assert_eq!(decide(&blended, day(4).date()), Recommendation::Buy);
    }

    #[test]
    fn recommendations_display() {
        assert_eq!(Recommendation::Buy.to_string(), "Recommendation: Buy");
        assert_eq!(Recommendation::Wait.to_string(), "Recommendation: Wait");
        assert!(!Recommendation::DateNotFound.is_decision());
    }
}
