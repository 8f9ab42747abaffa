//! Per-station evaluation: locate, extract, resample, align, score.

use crate::align::{align, first_occurrences, resample, AlignedPair, Alignment};
use crate::config::{EvaluationOptions, WindowSearch};
use crate::grid::{GridError, GridIndex, GriddedDataset};
use crate::locate::{locate, locate_with_window, FallbackReason, LocateError, LocateOutcome};
use crate::metrics::{score_with_decimals, MetricsResult};
use crate::series::{extract, TimeSeries};
use crate::station::StationMetadata;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failures that stop the evaluation of one station.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Station {station}: missing or invalid coordinates (lon={lon:?}, lat={lat:?})")]
    InvalidCoordinates {
        station: String,
        lon: Option<f64>,
        lat: Option<f64>,
    },

    #[error("Gridded dataset is empty")]
    EmptyDataset,

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Recoverable conditions recorded on a report.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticFlag {
    /// Window search could not run; the nearest cell was used
    WindowFallback(FallbackReason),
    /// Window search picked a cell other than the nearest one
    Relocated { from: GridIndex, to: GridIndex },
    DuplicateTimestamps { observed: usize, simulated: usize },
    NoOverlap,
    InsufficientPoints { points: usize, required: usize },
    UndefinedMetrics(Vec<&'static str>),
}

impl DiagnosticFlag {
    pub fn is_degrading(&self) -> bool {
        !matches!(self, DiagnosticFlag::Relocated { .. })
    }
}

impl fmt::Display for DiagnosticFlag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiagnosticFlag::WindowFallback(reason) => write!(f, "window search fallback: {}", reason),
            DiagnosticFlag::Relocated { from, to } => write!(f, "relocated from {} to {}", from, to),
            DiagnosticFlag::DuplicateTimestamps { observed, simulated } => write!(
                f,
                "duplicate timestamps: {} observed, {} simulated",
                observed, simulated
            ),
            DiagnosticFlag::NoOverlap => write!(f, "no common time period"),
            DiagnosticFlag::InsufficientPoints { points, required } => {
                write!(f, "{} points, {} required", points, required)
            }
            DiagnosticFlag::UndefinedMetrics(names) => {
                write!(f, "undefined metrics: {}", names.join(","))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StationOutcome {
    Ok,
    Degraded,
    Failed,
}

impl fmt::Display for StationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            StationOutcome::Ok => "ok",
            StationOutcome::Degraded => "degraded",
            StationOutcome::Failed => "failed",
        };
        write!(f, "{}", text)
    }
}

/// Scores of one station with the cell they were computed at.
#[derive(Debug, Clone)]
pub struct StationReport {
    pub station: StationMetadata,
    pub index: GridIndex,
    /// Coordinates of the evaluated cell
    pub cell_lon: f64,
    pub cell_lat: f64,
    pub window_applied: bool,
    pub metrics: MetricsResult,
    /// Aligned values before missing rows were dropped
    pub aligned: Option<AlignedPair>,
    pub flags: Vec<DiagnosticFlag>,
}

impl StationReport {
    pub fn outcome(&self) -> StationOutcome {
        if self.flags.iter().any(DiagnosticFlag::is_degrading) {
            StationOutcome::Degraded
        } else {
            StationOutcome::Ok
        }
    }

    pub fn has_flag(&self, predicate: impl Fn(&DiagnosticFlag) -> bool) -> bool {
        self.flags.iter().any(predicate)
    }
}

fn valid_coordinates(station: &StationMetadata) -> Option<(f64, f64)> {
    match (station.longitude, station.latitude) {
        (Some(lon), Some(lat)) if lon.is_finite() && lat.is_finite() => Some((lon, lat)),
        _ => None,
    }
}

/// Evaluate `variable` of `grid` against the observations of one station.
///
/// Recoverable problems (window fallback, duplicate timestamps, no overlap,
/// too few points, undefined scores) are returned as flags on the report;
/// only invalid coordinates and an empty or unreadable dataset are errors.
pub fn evaluate_station<G>(
    grid: &G,
    station: &StationMetadata,
    observed: &TimeSeries,
    options: &EvaluationOptions,
) -> Result<StationReport, EvaluationError>
where
    G: GriddedDataset + ?Sized,
{
    if grid.is_empty() {
        return Err(EvaluationError::EmptyDataset);
    }
    let (lon, lat) = valid_coordinates(station).ok_or_else(|| EvaluationError::InvalidCoordinates {
        station: station.id.clone(),
        lon: station.longitude,
        lat: station.latitude,
    })?;
    if !grid.has_variable(&options.variable) {
        return Err(GridError::MissingVariable(options.variable.clone()).into());
    }

    let mut flags = Vec::new();

    let window_applied = match options.window_search {
        WindowSearch::Never => false,
        WindowSearch::Always => true,
        WindowSearch::WhenUncorrected => !station.corrected,
    };

    let located = if window_applied {
        let expected = station.expected_mean.or_else(|| observed.nan_mean());
        locate_with_window(grid, lon, lat, expected, &options.variable, &options.locator)
    } else {
        locate(grid, lon, lat).map(|index| LocateOutcome {
            index,
            nearest: index,
            deviation: None,
            fallback: None,
        })
    };
    let located = located.map_err(|e| match e {
        LocateError::EmptyGrid => EvaluationError::EmptyDataset,
        LocateError::NonFiniteCoordinates { lon, lat } => EvaluationError::InvalidCoordinates {
            station: station.id.clone(),
            lon: Some(lon),
            lat: Some(lat),
        },
        LocateError::Grid(e) => EvaluationError::Grid(e),
    })?;

    if let Some(reason) = located.fallback {
        flags.push(DiagnosticFlag::WindowFallback(reason));
    }
    if located.was_relocated() {
        flags.push(DiagnosticFlag::Relocated {
            from: located.nearest,
            to: located.index,
        });
    }

    let index = located.index;
    info!(
        "Station {}: reading {} at row {} and column {}",
        station.id, options.variable, index.row, index.col
    );
    let mut simulated = extract(grid, index, &options.variable)?;
    let mut observed = observed.clone();
    let mut observed_duplicates = 0;
    let mut simulated_duplicates = 0;

    if let Some(period) = options.time_scale {
        // duplicates keep their first value before they reach a period statistic
        let (obs_unique, obs_dups) = first_occurrences(&observed);
        let (sim_unique, sim_dups) = first_occurrences(&simulated);
        if obs_dups + sim_dups > 0 {
            warn!(
                "Station {}: {} observed and {} simulated duplicate timestamps dropped before resampling",
                station.id, obs_dups, sim_dups
            );
        }
        observed_duplicates = obs_dups;
        simulated_duplicates = sim_dups;

        debug!("Station {}: resampling to {} ({})", station.id, period, options.statistic);
        observed = resample(&obs_unique, period, options.statistic);
        simulated = resample(&sim_unique, period, options.statistic);
    }

    let alignment = align(&observed, &simulated);
    let report = alignment.report();
    observed_duplicates += report.observed_duplicates;
    simulated_duplicates += report.simulated_duplicates;
    if observed_duplicates > 0 || simulated_duplicates > 0 {
        flags.push(DiagnosticFlag::DuplicateTimestamps {
            observed: observed_duplicates,
            simulated: simulated_duplicates,
        });
    }

    let (metrics, aligned) = match alignment {
        Alignment::NoOverlap(_) => {
            warn!("Station {}: no common time period", station.id);
            flags.push(DiagnosticFlag::NoOverlap);
            (MetricsResult::default(), None)
        }
        Alignment::Overlap(pair) => {
            let complete = pair.complete();
            let metrics = if complete.len() < options.min_points {
                warn!(
                    "Station {}: only {} complete pairs, {} required",
                    station.id,
                    complete.len(),
                    options.min_points
                );
                flags.push(DiagnosticFlag::InsufficientPoints {
                    points: complete.len(),
                    required: options.min_points,
                });
                MetricsResult {
                    points: complete.len(),
                    ..MetricsResult::default()
                }
            } else {
                let metrics = score_with_decimals(&complete, options.decimals);
                let undefined: Vec<&'static str> = metrics
                    .fields()
                    .iter()
                    .filter(|(_, v)| v.is_none())
                    .map(|(name, _)| *name)
                    .collect();
                if !undefined.is_empty() {
                    flags.push(DiagnosticFlag::UndefinedMetrics(undefined));
                }
                metrics
            };
            (metrics, Some(pair))
        }
    };

    let report = StationReport {
        station: station.clone(),
        index,
        cell_lon: grid.longitudes()[index.col],
        cell_lat: grid.latitudes()[index.row],
        window_applied,
        metrics,
        aligned,
        flags,
    };

    info!(
        "Station {}: {} (KGE {:?}, {} points)",
        station.id,
        report.outcome(),
        report.metrics.kge,
        report.metrics.points
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::InMemoryGrid;
    use crate::series::TimeKey;
    use chrono::{DateTime, TimeZone, Utc};
    use ndarray::Array3;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, d, 0, 0, 0).unwrap()
    }

    fn grid() -> InMemoryGrid {
        let times: Vec<_> = (1..=5).map(day).collect();
        let data = Array3::from_shape_fn((5, 2, 2), |(t, r, c)| (t + 1) as f64 + (r * 2 + c) as f64 * 10.0);
        InMemoryGrid::new(vec![10.0, 10.5], vec![45.0, 45.5], times)
            .with_variable("discharge", data)
            .unwrap()
    }

    fn observed(values: &[f64]) -> TimeSeries {
        let times: Vec<_> = (1..=values.len() as u32).map(day).collect();
        TimeSeries::from_datetimes(&times, values.to_vec()).unwrap()
    }

    fn no_window() -> EvaluationOptions {
        EvaluationOptions {
            window_search: WindowSearch::Never,
            ..EvaluationOptions::default()
        }
    }

    #[test]
    fn test_perfect_station() {
        let station = StationMetadata::new("1", 10.0, 45.0);
        let report =
            evaluate_station(&grid(), &station, &observed(&[1.0, 2.0, 3.0, 4.0, 5.0]), &no_window())
                .unwrap();
        assert_eq!(report.index, GridIndex::new(0, 0));
        assert_eq!(report.metrics.kge, Some(1.0));
        assert_eq!(report.outcome(), StationOutcome::Ok);
        assert_eq!(report.aligned.as_ref().unwrap().len(), 5);
    }

    #[test]
    fn test_missing_coordinates_fatal() {
        let station = StationMetadata {
            id: "2".into(),
            latitude: Some(45.0),
            ..StationMetadata::default()
        };
        let result = evaluate_station(&grid(), &station, &observed(&[1.0]), &no_window());
        assert!(matches!(result, Err(EvaluationError::InvalidCoordinates { .. })));
    }

    #[test]
    fn test_empty_dataset_fatal() {
        let empty = InMemoryGrid::new(vec![], vec![], vec![]);
        let station = StationMetadata::new("3", 10.0, 45.0);
        let result = evaluate_station(&empty, &station, &observed(&[1.0]), &no_window());
        assert!(matches!(result, Err(EvaluationError::EmptyDataset)));
    }

    #[test]
    fn test_no_overlap_is_degraded() {
        let station = StationMetadata::new("4", 10.0, 45.0);
        let obs = TimeSeries::from_pairs(vec![(
            TimeKey::Instant(Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap()),
            1.0,
        )]);
        let report = evaluate_station(&grid(), &station, &obs, &no_window()).unwrap();
        assert!(report.flags.contains(&DiagnosticFlag::NoOverlap));
        assert_eq!(report.metrics, MetricsResult::default());
        assert_eq!(report.outcome(), StationOutcome::Degraded);
    }

    #[test]
    fn test_window_search_relocates() {
        // observations match cell (1, 1), which holds 31..=35
        let station = StationMetadata::new("5", 10.0, 45.0);
        let obs = observed(&[31.0, 32.0, 33.0, 34.0, 35.0]);
        let options = EvaluationOptions {
            locator: crate::config::LocatorConfig {
                window_size: 1,
                degrees_per_cell: 0.5,
            },
            ..EvaluationOptions::default()
        };
        let report = evaluate_station(&grid(), &station, &obs, &options).unwrap();
        assert!(report.window_applied);
        assert_eq!(report.index, GridIndex::new(1, 1));
        assert_eq!(report.metrics.nse, Some(1.0));
        assert_eq!(report.outcome(), StationOutcome::Ok);

        let corrected = station.with_corrected_coordinates(10.0, 45.0);
        let report = evaluate_station(&grid(), &corrected, &obs, &options).unwrap();
        assert!(!report.window_applied);
        assert_eq!(report.index, GridIndex::new(0, 0));
    }

    #[test]
    fn test_insufficient_points() {
        let station = StationMetadata::new("6", 10.0, 45.0);
        let obs = observed(&[1.0, f64::NAN, f64::NAN, f64::NAN, f64::NAN]);
        let report = evaluate_station(&grid(), &station, &obs, &no_window()).unwrap();
        assert!(report.has_flag(|f| matches!(f, DiagnosticFlag::InsufficientPoints { points: 1, .. })));
        assert_eq!(report.metrics.points, 1);
        assert_eq!(report.metrics.mse, None);
    }
}
