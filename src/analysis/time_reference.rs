//! Normalized time references and their concrete windows

use crate::providers::TimeRange;
use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

const WEEKDAYS: [(&str, Weekday); 7] = [
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

const MONTHS: [&str; 12] = [
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

/// A time phrase normalized to English ("yesterday", "last week", "3 day ago", "friday")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeReference(String);

impl TimeReference {
    pub fn new(normalized: impl Into<String>) -> Self {
        Self(normalized.into().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Concrete window relative to `now`, or None when the phrase cannot be placed
    pub fn resolve(&self, now: DateTime<Utc>) -> Option<TimeRange> {
        let today = start_of_day(now.date_naive());
        let parts: Vec<&str> = self.0.split_whitespace().collect();

        match parts.as_slice() {
            ["today"] => Some(TimeRange::new(today, now)),
            ["yesterday"] => Some(TimeRange::new(today - Duration::days(1), today)),
            ["recent"] => Some(TimeRange::new(now - Duration::days(7), now)),
            ["last", "week"] => Some(TimeRange::new(now - Duration::days(7), now)),
            ["last", "month"] => Some(TimeRange::new(now - Duration::days(30), now)),
            ["last", "year"] => Some(TimeRange::new(now - Duration::days(365), now)),
            ["this", "week"] => {
                let offset = now.weekday().num_days_from_monday() as i64;
                Some(TimeRange::new(today - Duration::days(offset), now))
            }
            ["this", "month"] => {
                let first = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)?;
                Some(TimeRange::new(start_of_day(first), now))
            }
            ["this", "year"] => {
                let first = NaiveDate::from_ymd_opt(now.year(), 1, 1)?;
                Some(TimeRange::new(start_of_day(first), now))
            }
            // counts come straight from user text; out-of-range values leave the query unfiltered
            ["last", n, unit] => {
                let span = unit_duration(unit)?.checked_mul(n.parse::<i32>().ok()?)?;
                Some(TimeRange::new(now.checked_sub_signed(span)?, now))
            }
            [n, unit, "ago"] => {
                let n: i32 = n.parse().ok()?;
                let unit = unit_duration(unit)?;
                if unit == Duration::days(1) {
                    let day = today.checked_sub_signed(Duration::try_days(i64::from(n))?)?;
                    return Some(TimeRange::new(day, day.checked_add_signed(unit)?));
                }
                let end = now
                    .checked_sub_signed(unit.checked_mul(n.checked_sub(1)?)?)?
                    .min(now);
                let start = now.checked_sub_signed(unit.checked_mul(n.checked_add(1)?)?)?;
                Some(TimeRange::new(start, end))
            }
            [word] => {
                if let Some((_, weekday)) = WEEKDAYS.iter().find(|(name, _)| name == word) {
                    let back = (7 + now.weekday().num_days_from_monday() as i64
                        - weekday.num_days_from_monday() as i64)
                        % 7;
                    let day = today - Duration::days(back);
                    return Some(TimeRange::new(day, day + Duration::days(1)));
                }
                let month_index = MONTHS.iter().position(|m| m == word)? as u32 + 1;
                let year = if month_index <= now.month() {
                    now.year()
                } else {
                    now.year() - 1
                };
                let first = NaiveDate::from_ymd_opt(year, month_index, 1)?;
                let next = if month_index == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)?
                } else {
                    NaiveDate::from_ymd_opt(year, month_index + 1, 1)?
                };
                Some(TimeRange::new(start_of_day(first), start_of_day(next)))
            }
            _ => None,
        }
    }

    /// Scene width implied by the phrase, in hours
    pub fn cluster_window_hours(&self) -> Option<f64> {
        let s = self.0.as_str();
        if s == "today" || s == "yesterday" || s.ends_with("hour") || s.ends_with("minute") {
            return Some(3.0);
        }
        if s == "recent" {
            return Some(6.0);
        }
        if s.ends_with("week") || WEEKDAYS.iter().any(|(name, _)| *name == s) {
            return Some(24.0);
        }
        if s.ends_with("month") || s.ends_with("year") || MONTHS.contains(&s) {
            return Some(72.0);
        }
        if s.ends_with("day ago") || (s.starts_with("last ") && s.ends_with("day")) {
            return Some(12.0);
        }
        None
    }
}

impl std::fmt::Display for TimeReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

fn unit_duration(unit: &str) -> Option<Duration> {
    match unit.trim_end_matches('s') {
        "minute" => Some(Duration::minutes(1)),
        "hour" => Some(Duration::hours(1)),
        "day" => Some(Duration::days(1)),
        "week" => Some(Duration::weeks(1)),
        "month" => Some(Duration::days(30)),
        "year" => Some(Duration::days(365)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        // Friday
        Utc.with_ymd_and_hms(2026, 10, 16, 15, 30, 0).unwrap()
    }

    #[test]
    fn test_yesterday_is_whole_previous_day() {
        let range = TimeReference::new("yesterday").resolve(now()).unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap());
        assert_eq!(range.end, Utc.with_ymd_and_hms(2026, 10, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_relative_windows() {
        let week = TimeReference::new("last week").resolve(now()).unwrap();
        assert_eq!(week.end - week.start, Duration::days(7));

        let hours = TimeReference::new("last 3 hour").resolve(now()).unwrap();
        assert_eq!(hours.end - hours.start, Duration::hours(3));

        let ago = TimeReference::new("2 day ago").resolve(now()).unwrap();
        assert_eq!(ago.start, Utc.with_ymd_and_hms(2026, 10, 14, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_weekday_and_month() {
        let monday = TimeReference::new("monday").resolve(now()).unwrap();
        assert_eq!(monday.start, Utc.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap());

        let december = TimeReference::new("december").resolve(now()).unwrap();
        assert_eq!(december.start, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(december.end, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_unresolvable() {
        assert!(TimeReference::new("someday").resolve(now()).is_none());
    }

    #[test]
    fn test_huge_counts_resolve_to_nothing() {
        for phrase in [
            "2000000000 day ago",
            "2147483647 hour ago",
            "3000000000 week ago",
            "last 1000000000 day",
            "last 2147483647 day",
        ] {
            assert!(
                TimeReference::new(phrase).resolve(now()).is_none(),
                "{} should not resolve",
                phrase
            );
        }

        let hour = TimeReference::new("1 hour ago").resolve(now()).unwrap();
        assert_eq!(hour.end, now());
        assert_eq!(hour.end - hour.start, Duration::hours(2));
    }

    #[test]
    fn test_cluster_window() {
        assert_eq!(TimeReference::new("today").cluster_window_hours(), Some(3.0));
        assert_eq!(TimeReference::new("last week").cluster_window_hours(), Some(24.0));
        assert_eq!(TimeReference::new("march").cluster_window_hours(), Some(72.0));
    }
}
