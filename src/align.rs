//! Resampling and timestamp-exact alignment of observed and simulated series.

use crate::series::{TimeKey, TimeSeries};
use crate::time_utils::period_start;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

pub use crate::time_utils::Period;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignError {
    #[error("Unknown resampling statistic: {0} (expected mean, max, min or sum)")]
    UnknownStatistic(String),

    #[error("Observed and simulated values differ in length: {observed} vs {simulated}")]
    LengthMismatch { observed: usize, simulated: usize },
}

/// Aggregation applied to the values of one resampling period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statistic {
    Mean,
    Max,
    Min,
    Sum,
}

impl Statistic {
    /// Aggregate the finite values, NaN if there are none.
    pub fn apply(self, values: &[f64]) -> f64 {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return f64::NAN;
        }
        match self {
            Statistic::Mean => finite.iter().sum::<f64>() / finite.len() as f64,
            Statistic::Max => finite.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Statistic::Min => finite.iter().copied().fold(f64::INFINITY, f64::min),
            Statistic::Sum => finite.iter().sum(),
        }
    }
}

impl FromStr for Statistic {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" => Ok(Statistic::Mean),
            "max" => Ok(Statistic::Max),
            "min" => Ok(Statistic::Min),
            "sum" => Ok(Statistic::Sum),
            other => Err(AlignError::UnknownStatistic(other.to_string())),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Statistic::Mean => "mean",
            Statistic::Max => "max",
            Statistic::Min => "min",
            Statistic::Sum => "sum",
        };
        write!(f, "{}", name)
    }
}

/// Aggregate a series to calendar periods labelled by their start.
///
/// Monthly output is keyed by year and month. Missing values are skipped;
/// a period without any finite value yields NaN.
pub fn resample(series: &TimeSeries, period: Period, statistic: Statistic) -> TimeSeries {
    let mut groups: BTreeMap<TimeKey, Vec<f64>> = BTreeMap::new();
    for (key, value) in series.iter() {
        let start = period_start(&key.start(), period);
        let label = match period {
            Period::Month => TimeKey::month_of(&start),
            Period::Quarter | Period::Year => TimeKey::Instant(start),
        };
        groups.entry(label).or_default().push(value);
    }

    debug!(
        "Resampled {} values into {} {} periods ({})",
        series.len(),
        groups.len(),
        period,
        statistic
    );

    TimeSeries::from_pairs(
        groups
            .into_iter()
            .map(|(label, values)| (label, statistic.apply(&values))),
    )
}

/// Bookkeeping of an alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlignReport {
    pub observed_len: usize,
    pub simulated_len: usize,
    /// Entries dropped because their timestamp was already seen
    pub observed_duplicates: usize,
    pub simulated_duplicates: usize,
}

impl AlignReport {
    pub fn has_duplicates(&self) -> bool {
        self.observed_duplicates > 0 || self.simulated_duplicates > 0
    }
}

/// Observed and simulated values on their common timestamps, ascending.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPair {
    keys: Vec<TimeKey>,
    observed: Vec<f64>,
    simulated: Vec<f64>,
    report: AlignReport,
}

impl AlignedPair {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[TimeKey] {
        &self.keys
    }

    pub fn observed(&self) -> &[f64] {
        &self.observed
    }

    pub fn simulated(&self) -> &[f64] {
        &self.simulated
    }

    pub fn report(&self) -> &AlignReport {
        &self.report
    }

    /// `(timestamp, observed, simulated)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (TimeKey, f64, f64)> + '_ {
        self.keys
            .iter()
            .zip(self.observed.iter().zip(self.simulated.iter()))
            .map(|(&k, (&o, &s))| (k, o, s))
    }

    /// Rows where both values are present.
    pub fn complete(&self) -> CompletePairs {
        let mut pairs = CompletePairs::default();
        for (key, obs, sim) in self.iter() {
            if obs.is_finite() && sim.is_finite() {
                pairs.keys.push(key);
                pairs.observed.push(obs);
                pairs.simulated.push(sim);
            } else {
                pairs.dropped += 1;
            }
        }
        pairs
    }
}

/// Missing-free view of aligned values, the input accepted by
/// [`crate::metrics::score`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletePairs {
    keys: Vec<TimeKey>,
    observed: Vec<f64>,
    simulated: Vec<f64>,
    dropped: usize,
}

impl CompletePairs {
    /// Build from equal-length value slices, dropping rows with a missing value.
    pub fn from_values(observed: &[f64], simulated: &[f64]) -> Result<Self, AlignError> {
        if observed.len() != simulated.len() {
            return Err(AlignError::LengthMismatch {
                observed: observed.len(),
                simulated: simulated.len(),
            });
        }
        let mut pairs = CompletePairs::default();
        for (&obs, &sim) in observed.iter().zip(simulated) {
            if obs.is_finite() && sim.is_finite() {
                pairs.observed.push(obs);
                pairs.simulated.push(sim);
            } else {
                pairs.dropped += 1;
            }
        }
        Ok(pairs)
    }

    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    /// Timestamps of the rows; empty when built from bare values.
    pub fn keys(&self) -> &[TimeKey] {
        &self.keys
    }

    pub fn observed(&self) -> &[f64] {
        &self.observed
    }

    pub fn simulated(&self) -> &[f64] {
        &self.simulated
    }

    /// Rows removed because a value was missing.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Outcome of [`align`].
#[derive(Debug, Clone, PartialEq)]
pub enum Alignment {
    Overlap(AlignedPair),
    /// The series share no timestamp
    NoOverlap(AlignReport),
}

impl Alignment {
    pub fn report(&self) -> &AlignReport {
        match self {
            Alignment::Overlap(pair) => pair.report(),
            Alignment::NoOverlap(report) => report,
        }
    }

    pub fn pair(&self) -> Option<&AlignedPair> {
        match self {
            Alignment::Overlap(pair) => Some(pair),
            Alignment::NoOverlap(_) => None,
        }
    }
}

pub(crate) fn dedupe(series: &TimeSeries) -> (BTreeMap<TimeKey, f64>, usize) {
    let mut unique = BTreeMap::new();
    for (key, value) in series.iter() {
        unique.entry(key).or_insert(value);
    }
    let duplicates = series.len() - unique.len();
    (unique, duplicates)
}

/// First value of every timestamp in time order, and the number of dropped
/// duplicates.
pub(crate) fn first_occurrences(series: &TimeSeries) -> (TimeSeries, usize) {
    let (unique, duplicates) = dedupe(series);
    (TimeSeries::from_pairs(unique), duplicates)
}

/// Inner join of two series on exact timestamps.
///
/// Duplicate timestamps keep their first value and are counted in the
/// report. Missing values are kept; use [`AlignedPair::complete`] to drop them.
pub fn align(observed: &TimeSeries, simulated: &TimeSeries) -> Alignment {
    let (obs, observed_duplicates) = dedupe(observed);
    let (sim, simulated_duplicates) = dedupe(simulated);

    let report = AlignReport {
        observed_len: observed.len(),
        simulated_len: simulated.len(),
        observed_duplicates,
        simulated_duplicates,
    };

    if report.has_duplicates() {
        warn!(
            "Duplicate timestamps resolved by keeping the first value ({} observed, {} simulated)",
            observed_duplicates, simulated_duplicates
        );
    }

    let mut keys = Vec::new();
    let mut obs_values = Vec::new();
    let mut sim_values = Vec::new();
    for (key, obs_value) in obs {
        if let Some(&sim_value) = sim.get(&key) {
            keys.push(key);
            obs_values.push(obs_value);
            sim_values.push(sim_value);
        }
    }

    if keys.is_empty() {
        warn!("No common time period of observed and simulated values");
        return Alignment::NoOverlap(report);
    }

    Alignment::Overlap(AlignedPair {
        keys,
        observed: obs_values,
        simulated: sim_values,
        report,
    })
}
