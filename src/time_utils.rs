use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimeError {
    #[error("Could not parse time string: {0}")]
    Unparseable(String),

    #[error("Invalid CF time units: {0}")]
    InvalidUnits(String),

    #[error("Time offset {0} cannot be represented as a timestamp")]
    OffsetOutOfRange(f64),

    #[error("Unknown resampling period: {0} (expected month, quarter or year)")]
    UnknownPeriod(String),
}

/// Calendar period used for resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Month,
    Quarter,
    Year,
}

impl FromStr for Period {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "ms" | "month" | "monthly" => Ok(Period::Month),
            "q" | "qs" | "quarter" | "quarterly" => Ok(Period::Quarter),
            "y" | "ys" | "a" | "as" | "year" | "yearly" | "annual" => Ok(Period::Year),
            other => Err(TimeError::UnknownPeriod(other.to_string())),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Period::Month => "month",
            Period::Quarter => "quarter",
            Period::Year => "year",
        };
        write!(f, "{}", name)
    }
}

/// Sampling frequency inferred from a time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    /// Consecutive months stamped on the first day.
    MonthStart,
    /// Consecutive months stamped on the last day.
    MonthEnd,
    Irregular,
}

impl Frequency {
    pub fn is_monthly(self) -> bool {
        matches!(self, Frequency::MonthStart | Frequency::MonthEnd)
    }
}

/// Check if a year is a leap year
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}

/// Calculate the number of days in a given month, `None` for a month
/// outside 1..=12
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => Some(31),
        4 | 6 | 9 | 11 => Some(30),
        2 => {
            if is_leap_year(year) {
                Some(29)
            } else {
                Some(28)
            }
        }
        _ => None,
    }
}

/// Midnight UTC on the given calendar day, if the day exists.
pub fn utc_date(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
}

fn is_midnight(dt: &DateTime<Utc>) -> bool {
    dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 && dt.nanosecond() == 0
}

fn month_ordinal(dt: &DateTime<Utc>) -> i64 {
    dt.year() as i64 * 12 + dt.month0() as i64
}

/// Infer the sampling frequency of an ordered time axis.
///
/// At least three timestamps are needed to call an axis regular; shorter
/// axes are reported as [`Frequency::Irregular`].
pub fn infer_frequency(times: &[DateTime<Utc>]) -> Frequency {
    if times.len() < 3 {
        return Frequency::Irregular;
    }

    let one_day = Duration::days(1);
    if times.windows(2).all(|w| w[1] - w[0] == one_day) {
        return Frequency::Daily;
    }

    let consecutive_months = times
        .windows(2)
        .all(|w| month_ordinal(&w[1]) - month_ordinal(&w[0]) == 1);
    if !consecutive_months || !times.iter().all(is_midnight) {
        return Frequency::Irregular;
    }

    if times.iter().all(|t| t.day() == 1) {
        Frequency::MonthStart
    } else if times
        .iter()
        .all(|t| Some(t.day()) == days_in_month(t.year(), t.month()))
    {
        Frequency::MonthEnd
    } else {
        Frequency::Irregular
    }
}

/// Start of the calendar period covering `dt`.
pub fn period_start(dt: &DateTime<Utc>, period: Period) -> DateTime<Utc> {
    let month = match period {
        Period::Month => dt.month(),
        Period::Quarter => dt.month0() / 3 * 3 + 1,
        Period::Year => 1,
    };
    // first of a valid month always exists
    utc_date(dt.year(), month, 1).unwrap_or(*dt)
}

/// Parse time string in various formats
///
/// Accepted: `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`,
/// `YYYY-MM`, GRDC monthly `YYYY-MM-00` and the compact `YYYYMMDDHH`.
pub fn parse_time_string(time_str: &str) -> Result<DateTime<Utc>, TimeError> {
    let s = time_str.trim();

    if let Some(dt) = parse_iso_format(s) {
        return Ok(dt);
    }

    if let Some(dt) = parse_date_format(s) {
        return Ok(dt);
    }

    if let Some(dt) = parse_simple_format(s) {
        return Ok(dt);
    }

    Err(TimeError::Unparseable(time_str.to_string()))
}

fn parse_iso_format(time_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = time_str.trim_end_matches('Z');
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
}

fn parse_date_format(time_str: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = time_str.split('-').collect();
    let (year, month, day) = match parts.as_slice() {
        [y, m] => (y.parse().ok()?, m.parse().ok()?, 1),
        // GRDC monthly records use day 00
        [y, m, "00"] => (y.parse().ok()?, m.parse().ok()?, 1),
        [y, m, d] => (y.parse().ok()?, m.parse().ok()?, d.parse().ok()?),
        _ => return None,
    };
    utc_date(year, month, day)
}

/// Simple format: YYYYMMDDHH
fn parse_simple_format(time_str: &str) -> Option<DateTime<Utc>> {
    if time_str.len() != 10 || !time_str.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let year = time_str[0..4].parse().ok()?;
    let month = time_str[4..6].parse().ok()?;
    let day = time_str[6..8].parse().ok()?;
    let hour = time_str[8..10].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
}

/// Unit of a CF `"<unit> since <reference>"` time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn seconds(self) -> f64 {
        match self {
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3600.0,
            TimeUnit::Days => 86400.0,
        }
    }
}

/// Parse CF time units such as `days since 1901-01-01 00:00:00`.
///
/// Only fixed-length units are supported; `months since` and `years since`
/// are rejected because their length depends on the calendar.
pub fn parse_cf_time_units(units: &str) -> Result<(TimeUnit, DateTime<Utc>), TimeError> {
    let (unit, reference) = units
        .split_once(" since ")
        .ok_or_else(|| TimeError::InvalidUnits(units.to_string()))?;

    let unit = match unit.trim().to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => TimeUnit::Seconds,
        "min" | "mins" | "minute" | "minutes" => TimeUnit::Minutes,
        "h" | "hr" | "hrs" | "hour" | "hours" => TimeUnit::Hours,
        "d" | "day" | "days" => TimeUnit::Days,
        _ => return Err(TimeError::InvalidUnits(units.to_string())),
    };

    let reference = reference.trim().trim_end_matches("UTC").trim();
    let base = parse_time_string(reference)
        .map_err(|_| TimeError::InvalidUnits(units.to_string()))?;

    Ok((unit, base))
}

/// Convert numeric CF offsets into timestamps (standard calendar).
pub fn cf_offsets_to_datetimes(
    offsets: &[f64],
    unit: TimeUnit,
    base: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, TimeError> {
    offsets
        .iter()
        .map(|&offset| {
            if !offset.is_finite() {
                return Err(TimeError::OffsetOutOfRange(offset));
            }
            let millis = (offset * unit.seconds() * 1000.0).round();
            if millis.abs() > i64::MAX as f64 / 2.0 {
                return Err(TimeError::OffsetOutOfRange(offset));
            }
            base.checked_add_signed(Duration::milliseconds(millis as i64))
                .ok_or(TimeError::OffsetOutOfRange(offset))
        })
        .collect()
}
