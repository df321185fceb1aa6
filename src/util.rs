/*!
Miscellaneous calendar utilities for `stockcast`
*/

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// The number of whole calendar days from `from` to `to`, negative if `to` is earlier
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}

/// The `n` consecutive daily timestamps following `last`, keeping its time of day
pub fn following_days(last: NaiveDateTime, n: usize) -> impl Iterator<Item = NaiveDateTime> {
    (1..=n as i64).map(move |day| last + Duration::days(day))
}

/// Parse a timestamp written either as a full `%Y-%m-%d %H:%M:%S` datetime or as a bare `%Y-%m-%d` date
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, crate::data::history::DATETIME_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, crate::data::history::DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between(date(2024, 2, 27), date(2024, 3, 1)), 3);
        assert_eq!(days_between(date(2024, 3, 1), date(2024, 3, 1)), 0);
        assert_eq!(days_between(date(2024, 3, 2), date(2024, 3, 1)), -1);
    }

    #[test]
    fn test_following_days() {
        let last = date(2023, 12, 30).and_hms_opt(18, 0, 0).unwrap();
        let days: Vec<_> = following_days(last, 3).collect();
        assert_eq!(
            days,
            vec![
                date(2023, 12, 31).and_hms_opt(18, 0, 0).unwrap(),
                date(2024, 1, 1).and_hms_opt(18, 0, 0).unwrap(),
                date(2024, 1, 2).and_hms_opt(18, 0, 0).unwrap(),
            ]
        );
        assert_eq!(following_days(last, 0).count(), 0);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(
            parse_timestamp("2024-05-06"),
            date(2024, 5, 6).and_hms_opt(0, 0, 0)
        );
        assert_eq!(
            parse_timestamp(" 2024-05-06 13:45:00 "),
            date(2024, 5, 6).and_hms_opt(13, 45, 0)
        );
        assert_eq!(parse_timestamp("06/05/2024"), None);
    }
}
