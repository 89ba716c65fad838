//! Time helpers for the daily tournament cycle.
//!
//! Tournaments are keyed by UTC calendar date. Storage uses unix seconds.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// UTC calendar date key, rendered as `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DayKey(pub String);

impl DayKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m-%d").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key for the following UTC day.
    pub fn next(&self) -> Option<Self> {
        let date = NaiveDate::parse_from_str(&self.0, "%Y-%m-%d").ok()?;
        Some(Self::from_date(date + Duration::days(1)))
    }
}

impl std::fmt::Display for DayKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Day key for the given instant.
pub fn day_key(at: DateTime<Utc>) -> DayKey {
    DayKey::from_date(at.date_naive())
}

/// Unix bounds of the UTC day holding `at`: midnight and 23:59:59.
pub fn day_bounds(at: DateTime<Utc>) -> (u64, u64) {
    let date = at.date_naive();
    let start = Utc
        .with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0)
        .single()
        .map(|t| t.timestamp())
        .unwrap_or(0);
    let end = start + 86_399;
    (start.max(0) as u64, end.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_key_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 17, 30, 0).unwrap();
        assert_eq!(day_key(at).as_str(), "2024-03-09");
    }

    #[test]
    fn next_day_rolls_over_months() {
        let key = DayKey("2024-02-29".to_string());
        assert_eq!(key.next().unwrap().as_str(), "2024-03-01");
        let key = DayKey("2024-12-31".to_string());
        assert_eq!(key.next().unwrap().as_str(), "2025-01-01");
    }

    #[test]
    fn day_bounds_cover_full_day() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let (start, end) = day_bounds(at);
        assert_eq!(end - start, 86_399);
        assert_eq!(start % 86_400, 0);
    }
}
