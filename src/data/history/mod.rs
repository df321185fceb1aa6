/*!
Historical closing price IO, in a simple `asset,date,close` CSV format
*/
use super::{DataError, Observation, ObservationSeries};
use crate::decision::BlendedSeries;
use crate::util::parse_timestamp;
use chrono::{NaiveDateTime, Timelike};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::str::FromStr;

/// The datetime format used in history files
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The date-only format used in history files
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A source of historical closing prices, keyed by asset identifier
pub trait HistorySource {
    /// Load every observation for an asset, ordered by timestamp ascending
    fn load(&self, asset: &str) -> Result<ObservationSeries, DataError>;
    /// A short description of where the data comes from
    fn describe(&self) -> String;
}

impl HistorySource for HashMap<String, ObservationSeries> {
    fn load(&self, asset: &str) -> Result<ObservationSeries, DataError> {
        self.get(asset)
            .filter(|series| !series.is_empty())
            .cloned()
            .ok_or_else(|| DataError::NoData(asset.to_string()))
    }
    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// A CSV history file holding `asset,date,close` records for any number of assets, in any order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvHistory {
    /// The path to the history file
    pub path: PathBuf,
}

impl CsvHistory {
    /// Use the history file at a given path
    pub fn new<P: Into<PathBuf>>(path: P) -> CsvHistory {
        CsvHistory { path: path.into() }
    }
}

impl HistorySource for CsvHistory {
    fn load(&self, asset: &str) -> Result<ObservationSeries, DataError> {
        let file = File::open(&self.path)?;
        let observations = read_history(file, asset)?;
        if observations.is_empty() {
            return Err(DataError::NoData(asset.to_string()));
        }
        log::debug!(
            "Loaded {} observations for {} from {}",
            observations.len(),
            asset,
            self.path.display()
        );
        ObservationSeries::from_unsorted(observations)
    }
    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Read the observations for one asset from `asset,date,close` CSV data with a header row
pub fn read_history<R: Read>(rdr: R, asset: &str) -> Result<Vec<Observation>, DataError> {
    let mut observations = Vec::new();
    for result in csv::Reader::from_reader(rdr).into_records() {
        let record = result?;
        let line = record.position().map(|pos| pos.line()).unwrap_or(0);
        let mut fields = record.iter();
        if fields.next().map(str::trim) != Some(asset) {
            continue;
        }
        let date = fields.next().unwrap_or("");
        let close = fields.next().unwrap_or("");
        observations.push(parse_observation(line, date, close)?);
    }
    Ok(observations)
}

/// Read every observation from `date,close` CSV data with a header row, as exported for a single asset
pub fn read_closes<R: Read>(rdr: R) -> Result<ObservationSeries, DataError> {
    let mut observations = Vec::new();
    for result in csv::Reader::from_reader(rdr).into_records() {
        let record = result?;
        let line = record.position().map(|pos| pos.line()).unwrap_or(0);
        let date = record.get(0).unwrap_or("");
        let close = record.get(1).unwrap_or("");
        observations.push(parse_observation(line, date, close)?);
    }
    ObservationSeries::from_unsorted(observations)
}

fn parse_observation(line: u64, date: &str, close: &str) -> Result<Observation, DataError> {
    let t = parse_timestamp(date).ok_or_else(|| DataError::BadTimestamp {
        line,
        value: date.to_string(),
    })?;
    let c = f64::from_str(close.trim())
        .ok()
        .filter(|c| c.is_finite())
        .ok_or_else(|| DataError::BadClose {
            line,
            value: close.to_string(),
        })?;
    Ok(Observation { t, c })
}

/// Format a timestamp as a bare date if it falls on midnight, and as a full datetime otherwise
pub fn format_timestamp(t: NaiveDateTime) -> String {
    if t.num_seconds_from_midnight() == 0 && t.nanosecond() == 0 {
        t.format(DATE_FORMAT).to_string()
    } else {
        t.format(DATETIME_FORMAT).to_string()
    }
}

/// Write observations for an asset as `asset,date,close` CSV data.
/// On success, return how many observations were written
pub fn write_history<'a, W, I>(wtr: W, asset: &str, observations: I) -> Result<usize, DataError>
where
    W: Write,
    I: IntoIterator<Item = &'a Observation>,
{
    let mut wtr = csv::Writer::from_writer(wtr);
    wtr.write_record(&["asset", "date", "close"])?;
    let mut written = 0;
    for obs in observations {
        wtr.write_record(&[asset.to_string(), format_timestamp(obs.t), obs.c.to_string()])?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}

/// Write a blended series as chart-ready `date,close,ma_short,ma_long,forecast` CSV data, leaving averages inside
/// their warm-up gap empty. On success, return how many rows were written
pub fn write_blended<W: Write>(wtr: W, blended: &BlendedSeries) -> Result<usize, DataError> {
    let mut wtr = csv::Writer::from_writer(wtr);
    let short_header = format!("ma{}", blended.short_window);
    let long_header = format!("ma{}", blended.long_window);
    wtr.write_record(&[
        "date",
        "close",
        short_header.as_str(),
        long_header.as_str(),
        "forecast",
    ])?;
    let fmt_avg = |avg: Option<f64>| avg.map(|v| v.to_string()).unwrap_or_default();
    for row in blended.rows.iter() {
        wtr.write_record(&[
            format_timestamp(row.t),
            row.c.to_string(),
            fmt_avg(row.short),
            fmt_avg(row.long),
            row.forecast.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(blended.rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const HISTORY: &str = "asset,date,close
^BVSP,2024-01-03,132834.0
BTC-USD,2024-01-02,45000.5
^BVSP,2024-01-02,134194.0
^BVSP,2024-01-04 00:00:00,131226.0
";

    #[test]
    fn history_is_filtered_and_sorted() {
        let observations = read_history(HISTORY.as_bytes(), "^BVSP").unwrap();
        assert_eq!(observations.len(), 3);
        let series = ObservationSeries::from_unsorted(observations).unwrap();
        assert_eq!(series.closes(), vec![134194.0, 132834.0, 131226.0]);
        assert_eq!(
            series.last().unwrap().t.date(),
            NaiveDate::from_ymd_opt(2024, 1, 4).unwrap()
        );
    }

    #[test]
    fn missing_assets_are_reported() {
        let mut sources = HashMap::new();
        sources.insert(
            "BTC-USD".to_string(),
            ObservationSeries::from_unsorted(read_history(HISTORY.as_bytes(), "BTC-USD").unwrap())
                .unwrap(),
        );
        assert_eq!(sources.load("BTC-USD").unwrap().len(), 1);
        assert!(matches!(sources.load("ETH-USD"), Err(DataError::NoData(_))));
    }

    #[test]
    fn bad_fields_are_errors() {
        let bad_date = "asset,date,close\nX,yesterday,1.0\n";
        assert!(matches!(
            read_history(bad_date.as_bytes(), "X"),
            Err(DataError::BadTimestamp { line: 2, .. })
        ));
        let bad_close = "date,close\n2024-01-01,NaN\n";
        assert!(matches!(
            read_closes(bad_close.as_bytes()),
            Err(DataError::BadClose { line: 2, .. })
        ));
    }

    #[test]
    fn timestamps_format_compactly() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(format_timestamp(d.and_hms_opt(0, 0, 0).unwrap()), "2024-03-09");
        assert_eq!(
            format_timestamp(d.and_hms_opt(16, 30, 0).unwrap()),
            "2024-03-09 16:30:00"
        );
    }
}
