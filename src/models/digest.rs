use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::OwnerId;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    #[default]
    Weekly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Weekly => "weekly",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(PeriodType::Weekly),
            other => Err(AppError::Invalid(format!("unknown period type: {}", other))),
        }
    }
}

/// A calendar window in the owner's local time. `end` is the last day included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DigestPeriod {
    pub period_type: PeriodType,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DigestPeriod {
    /// The seven days beginning at `start`.
    pub fn week_starting(start: NaiveDate) -> Self {
        Self {
            period_type: PeriodType::Weekly,
            start,
            end: start + Duration::days(6),
        }
    }

    /// The last Monday..Sunday week that has fully ended at `now` in the owner's offset.
    pub fn most_recent_completed_week(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        let today = now.with_timezone(&offset).date_naive();
        let this_monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        Self::week_starting(this_monday - Duration::days(7))
    }

    /// `[start 00:00 local, end+1 00:00 local)` expressed in UTC.
    pub fn utc_window(&self, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
        let shift = Duration::seconds(offset.local_minus_utc() as i64);
        let from = (self.start.and_time(NaiveTime::MIN) - shift).and_utc();
        let to = ((self.end + Duration::days(1)).and_time(NaiveTime::MIN) - shift).and_utc();
        (from, to)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub id: i64,
    pub owner_id: OwnerId,
    pub period: DigestPeriod,
    pub content: String,
    pub summary_count: i64,
    pub top_themes: Vec<String>,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_completed_week_mid_week() {
        // Thursday 2026-10-15
        let now = Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap();
        let period = DigestPeriod::most_recent_completed_week(now, FixedOffset::east_opt(0).unwrap());
        assert_eq!(period.start, date(2026, 10, 5));
        assert_eq!(period.end, date(2026, 10, 11));
    }

    #[test]
    fn test_completed_week_on_monday_is_previous_week() {
        let now = Utc.with_ymd_and_hms(2026, 10, 12, 0, 30, 0).unwrap();
        let period = DigestPeriod::most_recent_completed_week(now, FixedOffset::east_opt(0).unwrap());
        assert_eq!(period.start, date(2026, 10, 5));
    }

    #[test]
    fn test_offset_moves_local_date() {
        // Sunday 20:00 UTC is already Monday in Tokyo.
        let now = Utc.with_ymd_and_hms(2026, 10, 11, 20, 0, 0).unwrap();
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let period = DigestPeriod::most_recent_completed_week(now, tokyo);
        assert_eq!(period.start, date(2026, 10, 5));

        let utc = DigestPeriod::most_recent_completed_week(now, FixedOffset::east_opt(0).unwrap());
        assert_eq!(utc.start, date(2026, 9, 28));
    }

    #[test]
    fn test_utc_window_respects_offset() {
        let period = DigestPeriod::week_starting(date(2026, 10, 5));
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let (from, to) = period.utc_window(tokyo);
        assert_eq!(from, Utc.with_ymd_and_hms(2026, 10, 4, 15, 0, 0).unwrap());
        assert_eq!(to, Utc.with_ymd_and_hms(2026, 10, 11, 15, 0, 0).unwrap());
    }
}
