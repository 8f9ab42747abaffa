//! Single-column time series and extraction from a gridded dataset.

use crate::grid::{GridError, GridIndex, GriddedDataset};
use crate::time_utils::{infer_frequency, utc_date};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("Series has {keys} timestamps but {values} values")]
    LengthMismatch { keys: usize, values: usize },
}

/// Index entry of a [`TimeSeries`].
///
/// Monthly series are keyed by year and month so that month-start and
/// month-end stamped data line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeKey {
    Month { year: i32, month: u32 },
    Instant(DateTime<Utc>),
}

impl TimeKey {
    pub fn month_of(dt: &DateTime<Utc>) -> Self {
        TimeKey::Month {
            year: dt.year(),
            month: dt.month(),
        }
    }

    /// First instant covered by the key.
    pub fn start(&self) -> DateTime<Utc> {
        match *self {
            TimeKey::Instant(dt) => dt,
            TimeKey::Month { year, month } => {
                utc_date(year, month, 1).unwrap_or(DateTime::<Utc>::MIN_UTC)
            }
        }
    }

    pub fn as_instant(&self) -> Option<DateTime<Utc>> {
        match *self {
            TimeKey::Instant(dt) => Some(dt),
            TimeKey::Month { .. } => None,
        }
    }
}

impl From<DateTime<Utc>> for TimeKey {
    fn from(dt: DateTime<Utc>) -> Self {
        TimeKey::Instant(dt)
    }
}

impl fmt::Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimeKey::Month { year, month } => write!(f, "{:04}-{:02}", year, month),
            TimeKey::Instant(dt) => {
                if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 {
                    write!(f, "{}", dt.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S"))
                }
            }
        }
    }
}

/// Ordered (timestamp, value) pairs. Values may be NaN; keys may repeat
/// until the series is aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    keys: Vec<TimeKey>,
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(keys: Vec<TimeKey>, values: Vec<f64>) -> Result<Self, SeriesError> {
        if keys.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        Ok(Self { keys, values })
    }

    pub fn from_datetimes(times: &[DateTime<Utc>], values: Vec<f64>) -> Result<Self, SeriesError> {
        Self::new(times.iter().copied().map(TimeKey::Instant).collect(), values)
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (TimeKey, f64)>,
    {
        let (keys, values) = pairs.into_iter().unzip();
        Self { keys, values }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[TimeKey] {
        &self.keys
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (TimeKey, f64)> + '_ {
        self.keys.iter().copied().zip(self.values.iter().copied())
    }

    /// Mean of the finite values, `None` if there are none.
    pub fn nan_mean(&self) -> Option<f64> {
        let (sum, n) = self
            .values
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
        (n > 0).then(|| sum / n as f64)
    }

    /// Re-key the series by year and month if its timestamps are monthly.
    ///
    /// Series that are already month-keyed, mixed, or not monthly are
    /// returned unchanged.
    pub fn normalize_monthly(self) -> Self {
        let instants: Option<Vec<DateTime<Utc>>> =
            self.keys.iter().map(TimeKey::as_instant).collect();
        let instants = match instants {
            Some(instants) => instants,
            None => return self,
        };

        let frequency = infer_frequency(&instants);
        if !frequency.is_monthly() {
            return self;
        }

        debug!("Normalizing {:?} index of {} entries to year-month keys", frequency, self.len());
        Self {
            keys: instants.iter().map(TimeKey::month_of).collect(),
            values: self.values,
        }
    }
}

/// Read the series of `variable` at a fixed cell for every time step.
///
/// Values are returned as stored, missing ones included. Monthly time axes
/// are normalized to year-month keys.
pub fn extract<G>(grid: &G, index: GridIndex, variable: &str) -> Result<TimeSeries, GridError>
where
    G: GriddedDataset + ?Sized,
{
    let values = grid.cell_series(variable, index)?;
    let keys = grid.times().iter().copied().map(TimeKey::Instant).collect();
    Ok(TimeSeries { keys, values }.normalize_monthly())
}
