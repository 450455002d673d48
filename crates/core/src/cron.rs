// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Six-field cron expression parsing and next-firing computation.
//!
//! Fields, in evaluation order: year, month, day-of-month, day-of-week,
//! hour, minute, second. Each field accepts `*`, a single value `N`, a
//! range `N-M`, a step `*/S`, or a comma-separated list of any of those.
//! Seconds default to `0` when the schedule omits them.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CronError {
    #[error("empty cron field")]
    EmptyField,
    #[error("invalid cron field {field:?}: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("no firing time found within the search horizon")]
    HorizonExceeded,
}

/// One field's parsed set of accepted values, kept sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldSpec {
    /// `None` means "matches everything in range" (the field was `*`).
    values: Option<Vec<u32>>,
}

impl FieldSpec {
    fn any() -> Self {
        Self { values: None }
    }

    fn matches(&self, v: u32) -> bool {
        match &self.values {
            None => true,
            Some(vals) => vals.binary_search(&v).is_ok(),
        }
    }

    /// Smallest accepted value >= `v` within `[min, max]`, if any.
    fn next_at_or_after(&self, v: u32, min: u32, max: u32) -> Option<u32> {
        match &self.values {
            None => {
                if v <= max {
                    Some(v.max(min))
                } else {
                    None
                }
            }
            Some(vals) => vals.iter().copied().find(|&x| x >= v && x >= min && x <= max),
        }
    }

    fn min_value(&self, min: u32, max: u32) -> Option<u32> {
        self.next_at_or_after(min, min, max)
    }

    fn parse(field: &str, min: u32, max: u32) -> Result<Self, CronError> {
        if field.trim().is_empty() {
            return Err(CronError::EmptyField);
        }
        if field.trim() == "*" {
            return Ok(Self::any());
        }
        let mut values = Vec::new();
        for part in field.split(',') {
            values.extend(parse_part(part.trim(), min, max, field)?);
        }
        values.sort_unstable();
        values.dedup();
        if values.is_empty() {
            return Err(CronError::InvalidField {
                field: field.to_string(),
                reason: "no values parsed".to_string(),
            });
        }
        Ok(Self { values: Some(values) })
    }
}

fn parse_part(part: &str, min: u32, max: u32, whole: &str) -> Result<Vec<u32>, CronError> {
    let bad = |reason: &str| CronError::InvalidField { field: whole.to_string(), reason: reason.to_string() };

    if let Some(step_part) = part.strip_prefix("*/") {
        let step: u32 = step_part.parse().map_err(|_| bad("bad step value"))?;
        if step == 0 {
            return Err(bad("step cannot be zero"));
        }
        return Ok((min..=max).step_by(step as usize).collect());
    }

    if let Some((lo, hi)) = part.split_once('-') {
        let lo: u32 = lo.parse().map_err(|_| bad("bad range start"))?;
        let hi: u32 = hi.parse().map_err(|_| bad("bad range end"))?;
        if lo > hi {
            return Err(bad("range start after end"));
        }
        return Ok((lo.max(min)..=hi.min(max)).collect());
    }

    let n: u32 = part.parse().map_err(|_| bad("not a number"))?;
    if n < min || n > max {
        return Err(bad("value out of range"));
    }
    Ok(vec![n])
}

/// A parsed six-field schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    year: FieldSpec,
    month: FieldSpec,
    day_of_month: FieldSpec,
    day_of_week: FieldSpec,
    hour: FieldSpec,
    minute: FieldSpec,
    second: FieldSpec,
}

/// How many years forward to search before giving up. A schedule that
/// cannot fire within this horizon is almost certainly self-contradictory
/// (e.g. `day_of_month=31` combined with `month=2`).
const SEARCH_HORIZON_YEARS: i32 = 8;

impl CronSchedule {
    /// Parse from the six raw string fields, in spec order: year, month,
    /// day-of-month, day-of-week, hour, minute, second. `second` may be
    /// `None`, in which case it defaults to `"0"`.
    pub fn parse(
        year: &str,
        month: &str,
        day_of_month: &str,
        day_of_week: &str,
        hour: &str,
        minute: &str,
        second: Option<&str>,
    ) -> Result<Self, CronError> {
        Ok(Self {
            year: FieldSpec::parse(year, 1970, 2200)?,
            month: FieldSpec::parse(month, 1, 12)?,
            day_of_month: FieldSpec::parse(day_of_month, 1, 31)?,
            day_of_week: FieldSpec::parse(day_of_week, 0, 6)?,
            hour: FieldSpec::parse(hour, 0, 23)?,
            minute: FieldSpec::parse(minute, 0, 59)?,
            second: FieldSpec::parse(second.unwrap_or("0"), 0, 59)?,
        })
    }

    /// A schedule that fires every second (used as a sane "all wildcard"
    /// default when a job omits the schedule entirely).
    pub fn every_second() -> Self {
        Self {
            year: FieldSpec::any(),
            month: FieldSpec::any(),
            day_of_month: FieldSpec::any(),
            day_of_week: FieldSpec::any(),
            hour: FieldSpec::any(),
            minute: FieldSpec::any(),
            second: FieldSpec::parse("0", 0, 59).unwrap_or(FieldSpec::any()),
        }
    }

    fn matches(&self, dt: &DateTime<Utc>) -> bool {
        self.year.matches(dt.year() as u32)
            && self.month.matches(dt.month())
            && self.day_of_month.matches(dt.day())
            && self.day_of_week.matches(dt.weekday().num_days_from_sunday())
            && self.hour.matches(dt.hour())
            && self.minute.matches(dt.minute())
            && self.second.matches(dt.second())
    }

    /// The smallest timestamp strictly greater than `after` that satisfies
    /// every field.
    ///
    /// Works field-by-field from year down to second: the first field that
    /// doesn't match the current candidate is bumped to its next accepted
    /// value (carrying into the next-larger field on wraparound) and every
    /// smaller field is reset to its minimum, then the whole check restarts
    /// from the year. This converges in a handful of iterations even when
    /// fields rule out most of the calendar (e.g. `month=2,day_of_month=29`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, CronError> {
        let horizon_year = after.year() + SEARCH_HORIZON_YEARS;
        let start = after + Duration::seconds(1);
        let mut year = start.year();
        let mut month = start.month();
        let mut day = start.day();
        let mut hour = start.hour();
        let mut minute = start.minute();
        let mut second = start.second();

        for _ in 0..100_000 {
            if year > horizon_year {
                return Err(CronError::HorizonExceeded);
            }

            // Normalize any overflow produced by the previous iteration's
            // carry (e.g. minute bumped to 60, hour bumped to 24) before
            // evaluating fields against it.
            if second >= 60 {
                second = 0;
                minute += 1;
            }
            if minute >= 60 {
                minute = 0;
                hour += 1;
            }
            if hour >= 24 {
                hour = 0;
                day += 1;
            }
            if day > days_in_month(year, month) {
                day = 1;
                month += 1;
            }
            if month > 12 {
                month = 1;
                year += 1;
            }

            match self.year.next_at_or_after(year as u32, year as u32, 2200) {
                Some(y) if y as i32 == year => {}
                Some(y) => {
                    year = y as i32;
                    month = 1;
                    day = 1;
                    hour = 0;
                    minute = 0;
                    second = 0;
                    continue;
                }
                None => return Err(CronError::HorizonExceeded),
            }

            match self.month.next_at_or_after(month, 1, 12) {
                Some(m) if m == month => {}
                Some(m) => {
                    month = m;
                    day = 1;
                    hour = 0;
                    minute = 0;
                    second = 0;
                    continue;
                }
                None => {
                    year += 1;
                    month = 1;
                    day = 1;
                    hour = 0;
                    minute = 0;
                    second = 0;
                    continue;
                }
            }

            let days_in_month = days_in_month(year, month);
            if day > days_in_month {
                month += 1;
                if month > 12 {
                    month = 1;
                    year += 1;
                }
                day = 1;
                hour = 0;
                minute = 0;
                second = 0;
                continue;
            }

            let candidate_date = Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single();
            let dow_matches = candidate_date
                .map(|d| self.day_of_week.matches(d.weekday().num_days_from_sunday()))
                .unwrap_or(false);
            if !(self.day_of_month.matches(day) && dow_matches) {
                day += 1;
                hour = 0;
                minute = 0;
                second = 0;
                continue;
            }

            match self.hour.next_at_or_after(hour, 0, 23) {
                Some(h) if h == hour => {}
                Some(h) => {
                    hour = h;
                    minute = 0;
                    second = 0;
                    continue;
                }
                None => {
                    day += 1;
                    hour = 0;
                    minute = 0;
                    second = 0;
                    continue;
                }
            }

            match self.minute.next_at_or_after(minute, 0, 59) {
                Some(m) if m == minute => {}
                Some(m) => {
                    minute = m;
                    second = 0;
                    continue;
                }
                None => {
                    hour += 1;
                    minute = 0;
                    second = 0;
                    continue;
                }
            }

            match self.second.next_at_or_after(second, 0, 59) {
                Some(s) if s == second => {}
                Some(s) => {
                    second = s;
                    continue;
                }
                None => {
                    minute += 1;
                    second = 0;
                    continue;
                }
            }

            return Utc
                .with_ymd_and_hms(year, month, day, hour, minute, second)
                .single()
                .ok_or(CronError::HorizonExceeded);
        }
        Err(CronError::HorizonExceeded)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month_first = if month == 12 {
        Utc.with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
    } else {
        Utc.with_ymd_and_hms(year, month + 1, 1, 0, 0, 0)
    };
    let this_month_first = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0);
    match (this_month_first.single(), next_month_first.single()) {
        (Some(a), Some(b)) => (b - a).num_days() as u32,
        _ => 28,
    }
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
