//! Business-hours oracle: decides whether "now" is working time, and whether
//! it falls in the short start-of-day window used to flush queued alerts.
//!
//! Everything is computed in the configured timezone. State is built once
//! at startup and never reloaded.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use deskwatch_core::config::{BusinessHoursConfig, expand_path};
use deskwatch_core::error::{DeskWatchError, Result};
use serde::Deserialize;

/// Minutes after the start hour during which the queue is flushed.
pub const START_OF_DAY_WINDOW_MINUTES: u32 = 5;

/// On-disk holiday list.
#[derive(Debug, Deserialize)]
struct HolidaysFile {
    #[serde(default)]
    holidays: Vec<String>,
}

/// Working-time calendar.
#[derive(Debug, Clone)]
pub struct BusinessHours {
    enabled: bool,
    start_hour: u32,
    end_hour: u32,
    timezone: Tz,
    /// ISO weekday numbers (1 = Monday).
    work_days: HashSet<u32>,
    holidays: HashSet<NaiveDate>,
    notify_on_open: bool,
}

impl BusinessHours {
    /// Build the calendar from config, loading the holiday file if one is set.
    /// A bad timezone or holiday file only logs a warning.
    pub fn new(config: &BusinessHoursConfig, span: &tracing::Span) -> Self {
        let _enter = span.enter();

        let holidays = if config.holidays_file.trim().is_empty() {
            HashSet::new()
        } else {
            let path = expand_path(&config.holidays_file);
            match load_holidays(&path) {
                Ok(days) => {
                    tracing::debug!(count = days.len(), file = %path.display(), "holidays loaded");
                    days
                }
                Err(e) => {
                    tracing::warn!("⚠️ Failed to load holidays file {}: {e}", path.display());
                    HashSet::new()
                }
            }
        };

        Self::with_holidays(config, holidays)
    }

    /// Build the calendar with an explicit holiday set.
    pub fn with_holidays(config: &BusinessHoursConfig, holidays: HashSet<NaiveDate>) -> Self {
        Self {
            enabled: config.enabled,
            start_hour: config.start_hour,
            end_hour: config.end_hour,
            timezone: resolve_timezone(&config.timezone),
            work_days: config.work_days.iter().copied().collect(),
            holidays,
            notify_on_open: config.notify_on_open,
        }
    }

    /// True when `at` is inside working hours (always true when disabled).
    pub fn is_business_time(&self, at: DateTime<Utc>) -> bool {
        if !self.enabled {
            return true;
        }

        let local = at.with_timezone(&self.timezone);
        if self.holidays.contains(&local.date_naive()) {
            return false;
        }
        if !self.work_days.contains(&local.weekday().number_from_monday()) {
            return false;
        }

        let hour = local.hour();
        hour >= self.start_hour && hour < self.end_hour
    }

    /// True during the first few minutes of a business day, when queued
    /// notifications should be flushed.
    pub fn is_start_of_day_window(&self, at: DateTime<Utc>) -> bool {
        if !self.enabled || !self.notify_on_open {
            return false;
        }
        if !self.is_business_time(at) {
            return false;
        }

        let local = at.with_timezone(&self.timezone);
        local.hour() == self.start_hour && local.minute() < START_OF_DAY_WINDOW_MINUTES
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn holiday_count(&self) -> usize {
        self.holidays.len()
    }
}

/// Resolve an IANA timezone name, falling back to UTC.
pub fn resolve_timezone(name: &str) -> Tz {
    match name.trim().parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!("⚠️ Unknown timezone '{name}', using UTC");
            Tz::UTC
        }
    }
}

/// Read `{"holidays": ["YYYY-MM-DD", ...]}`. Malformed dates are skipped.
pub fn load_holidays(path: &Path) -> Result<HashSet<NaiveDate>> {
    let data = std::fs::read_to_string(path)?;
    let file: HolidaysFile = serde_json::from_str(&data)
        .map_err(|e| DeskWatchError::Config(format!("holidays file {}: {e}", path.display())))?;

    let mut days = HashSet::with_capacity(file.holidays.len());
    for raw in &file.holidays {
        match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
            Ok(day) => {
                days.insert(day);
            }
            Err(_) => tracing::warn!("⚠️ Ignoring malformed holiday '{raw}'"),
        }
    }
    Ok(days)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// 9–17 Mon–Fri in Chicago, start-of-day flush on.
    fn config() -> BusinessHoursConfig {
        BusinessHoursConfig::default()
    }

    /// A UTC instant for a Chicago wall-clock time.
    fn chicago(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        chrono_tz::America::Chicago
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_hour_boundaries() {
        // 2026-03-04 is a Wednesday.
        let bh = BusinessHours::with_holidays(&config(), HashSet::new());
        assert!(!bh.is_business_time(chicago(2026, 3, 4, 8, 59)));
        assert!(bh.is_business_time(chicago(2026, 3, 4, 9, 0)));
        assert!(bh.is_business_time(chicago(2026, 3, 4, 16, 59)));
        assert!(!bh.is_business_time(chicago(2026, 3, 4, 17, 0)));
    }

    #[test]
    fn test_weekend_is_closed() {
        let bh = BusinessHours::with_holidays(&config(), HashSet::new());
        // Saturday and Sunday.
        assert!(!bh.is_business_time(chicago(2026, 3, 7, 11, 0)));
        assert!(!bh.is_business_time(chicago(2026, 3, 8, 11, 0)));
    }

    #[test]
    fn test_holiday_is_closed() {
        let christmas = NaiveDate::from_ymd_opt(2026, 12, 25).unwrap();
        let bh = BusinessHours::with_holidays(&config(), HashSet::from([christmas]));
        assert!(!bh.is_business_time(chicago(2026, 12, 25, 10, 0)));
        assert!(bh.is_business_time(chicago(2026, 12, 24, 10, 0)));
    }

    #[test]
    fn test_holiday_uses_local_date() {
        // 02:00 UTC on the 25th is still the 24th in Chicago.
        let christmas = NaiveDate::from_ymd_opt(2026, 12, 25).unwrap();
        let mut cfg = config();
        cfg.start_hour = 0;
        cfg.end_hour = 23;
        let bh = BusinessHours::with_holidays(&cfg, HashSet::from([christmas]));
        let at = Utc.with_ymd_and_hms(2026, 12, 25, 2, 0, 0).unwrap();
        assert!(bh.is_business_time(at));
    }

    #[test]
    fn test_disabled_is_always_open() {
        let mut cfg = config();
        cfg.enabled = false;
        let bh = BusinessHours::with_holidays(&cfg, HashSet::new());
        assert!(bh.is_business_time(chicago(2026, 3, 8, 3, 0)));
        assert!(!bh.is_start_of_day_window(chicago(2026, 3, 4, 9, 0)));
    }

    #[test]
    fn test_start_of_day_window() {
        let bh = BusinessHours::with_holidays(&config(), HashSet::new());
        assert!(bh.is_start_of_day_window(chicago(2026, 3, 4, 9, 0)));
        assert!(bh.is_start_of_day_window(chicago(2026, 3, 4, 9, 4)));
        assert!(!bh.is_start_of_day_window(chicago(2026, 3, 4, 9, 5)));
        assert!(!bh.is_start_of_day_window(chicago(2026, 3, 4, 10, 0)));
        // Sunday 09:00 is not a business day.
        assert!(!bh.is_start_of_day_window(chicago(2026, 3, 8, 9, 0)));
    }

    #[test]
    fn test_start_of_day_needs_notify_on_open() {
        let mut cfg = config();
        cfg.notify_on_open = false;
        let bh = BusinessHours::with_holidays(&cfg, HashSet::new());
        assert!(!bh.is_start_of_day_window(chicago(2026, 3, 4, 9, 1)));
    }

    #[test]
    fn test_unknown_timezone_falls_back_to_utc() {
        let mut cfg = config();
        cfg.timezone = "Mars/Olympus_Mons".into();
        let bh = BusinessHours::with_holidays(&cfg, HashSet::new());
        assert_eq!(bh.timezone(), Tz::UTC);
        assert!(bh.is_business_time(Utc.with_ymd_and_hms(2026, 3, 4, 9, 0, 0).unwrap()));
    }

    #[test]
    fn test_load_holidays_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holidays.json");
        std::fs::write(&path, r#"{"holidays": ["2026-01-01", "not-a-date", "2026-12-25"]}"#).unwrap();
        let days = load_holidays(&path).unwrap();
        assert_eq!(days.len(), 2);
        assert!(days.contains(&NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()));
    }

    #[test]
    fn test_missing_or_bad_holidays_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let span = tracing::Span::none();

        let mut cfg = config();
        cfg.holidays_file = dir.path().join("missing.json").display().to_string();
        assert_eq!(BusinessHours::new(&cfg, &span).holiday_count(), 0);

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "[2026-01-01").unwrap();
        cfg.holidays_file = bad.display().to_string();
        assert_eq!(BusinessHours::new(&cfg, &span).holiday_count(), 0);
    }
}
