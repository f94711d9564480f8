//! Reporting window resolution.
//!
//! Windows are inclusive `[start, end]` ranges of epoch seconds resolved
//! against calendar boundaries in UTC. Record timestamps are never shifted.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Period selector driving the window of a reload cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "period", rename_all = "lowercase")]
pub enum PeriodSelection {
    Year,
    #[default]
    Month,
    Week,
    Custom { start: i64, end: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingWindow {
    pub start: i64,
    pub end: i64,
}

impl ReportingWindow {
    pub fn contains(&self, ts: i64) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Window covering every representable timestamp.
    pub fn unbounded() -> Self {
        Self {
            start: i64::MIN,
            end: i64::MAX,
        }
    }
}

impl PeriodSelection {
    /// Resolve the selection into the calendar period containing `now`.
    pub fn resolve(&self, now: i64) -> ReportingWindow {
        let today = DateTime::<Utc>::from_timestamp(now, 0)
            .unwrap_or_default()
            .date_naive();

        let (first_day, next_first_day) = match self {
            PeriodSelection::Custom { start, end } => {
                let (start, end) = if start <= end { (*start, *end) } else { (*end, *start) };
                return ReportingWindow { start, end };
            }
            PeriodSelection::Year => (
                NaiveDate::from_ymd_opt(today.year(), 1, 1),
                NaiveDate::from_ymd_opt(today.year() + 1, 1, 1),
            ),
            PeriodSelection::Month => {
                let (next_year, next_month) = if today.month() == 12 {
                    (today.year() + 1, 1)
                } else {
                    (today.year(), today.month() + 1)
                };
                (
                    NaiveDate::from_ymd_opt(today.year(), today.month(), 1),
                    NaiveDate::from_ymd_opt(next_year, next_month, 1),
                )
            }
            PeriodSelection::Week => {
                let monday =
                    today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
                (Some(monday), Some(monday + Duration::days(7)))
            }
        };

        match (first_day, next_first_day) {
            (Some(first), Some(next)) => ReportingWindow {
                start: midnight_utc(first),
                end: midnight_utc(next) - 1,
            },
            // Only reachable at the edges of chrono's calendar range.
            _ => ReportingWindow::unbounded(),
        }
    }
}

/// Epoch seconds of 00:00:00 UTC on `day`.
pub fn midnight_utc(day: NaiveDate) -> i64 {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap_or_default())
        .timestamp()
}

/// Epoch seconds of the UTC midnight starting the day that contains `now`.
pub fn start_of_day(now: i64) -> i64 {
    now - now.rem_euclid(86_400)
}
