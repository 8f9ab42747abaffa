use crate::config::EvaluationOptions;
use crate::grid::GriddedDataset;
use crate::pipeline::{evaluate_station, StationOutcome, StationReport};
use crate::series::TimeSeries;
use crate::station::{GrdcRecord, StationMetadata};
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ParallelError {
    #[error("Failed to create thread pool: {0}")]
    ThreadPool(String),
}

/// Station metadata with its observed series.
#[derive(Debug, Clone)]
pub struct StationInput {
    pub metadata: StationMetadata,
    pub observed: TimeSeries,
}

impl From<GrdcRecord> for StationInput {
    fn from(record: GrdcRecord) -> Self {
        Self {
            metadata: record.metadata,
            observed: record.observations,
        }
    }
}

/// Result of one station in a batch.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub station_id: String,
    pub outcome: StationOutcome,
    pub report: Option<StationReport>,
    pub error: Option<String>,
}

/// Evaluate every station against the shared grid using Rayon.
///
/// A failing station is recorded as [`StationOutcome::Failed`] and never
/// aborts the batch. Entries are sorted by station id.
pub fn evaluate_stations_parallel<G>(
    grid: &G,
    stations: &[StationInput],
    options: &EvaluationOptions,
) -> Vec<BatchEntry>
where
    G: GriddedDataset + Sync + ?Sized,
{
    info!(
        "Evaluating {} stations in parallel using {} threads",
        stations.len(),
        rayon::current_num_threads()
    );

    let monitor = ProgressMonitor::new(stations.len());

    let mut entries: Vec<BatchEntry> = stations
        .par_iter()
        .map(|input| {
            let id = input.metadata.id.clone();
            debug!("Station {}: start", id);
            let entry = match evaluate_station(grid, &input.metadata, &input.observed, options) {
                Ok(report) => BatchEntry {
                    station_id: id,
                    outcome: report.outcome(),
                    report: Some(report),
                    error: None,
                },
                Err(e) => {
                    warn!("Station {} failed: {}", id, e);
                    BatchEntry {
                        station_id: id,
                        outcome: StationOutcome::Failed,
                        report: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            monitor.increment();
            entry
        })
        .collect();

    entries.sort_by(|a, b| a.station_id.cmp(&b.station_id));
    entries
}

/// Parallel evaluation with custom thread pool
pub fn evaluate_with_custom_threads<G>(
    grid: &G,
    stations: &[StationInput],
    options: &EvaluationOptions,
    num_threads: usize,
) -> Result<Vec<BatchEntry>, ParallelError>
where
    G: GriddedDataset + Sync + ?Sized,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build()
        .map_err(|e| ParallelError::ThreadPool(e.to_string()))?;

    Ok(pool.install(|| evaluate_stations_parallel(grid, stations, options)))
}

/// Outcome counts of a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub ok: usize,
    pub degraded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn from_entries(entries: &[BatchEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut s, e| {
            match e.outcome {
                StationOutcome::Ok => s.ok += 1,
                StationOutcome::Degraded => s.degraded += 1,
                StationOutcome::Failed => s.failed += 1,
            }
            s
        })
    }

    pub fn total(&self) -> usize {
        self.ok + self.degraded + self.failed
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stations: {} ok, {} degraded, {} failed",
            self.total(),
            self.ok,
            self.degraded,
            self.failed
        )
    }
}

/// Monitor parallel processing progress
struct ProgressMonitor {
    total_tasks: usize,
    completed_tasks: AtomicUsize,
    start_time: Instant,
}

impl ProgressMonitor {
    fn new(total_tasks: usize) -> Self {
        Self {
            total_tasks,
            completed_tasks: AtomicUsize::new(0),
            start_time: Instant::now(),
        }
    }

    fn increment(&self) {
        let completed = self.completed_tasks.fetch_add(1, Ordering::Relaxed) + 1;

        if completed % 100 == 0 || completed == self.total_tasks {
            let elapsed = self.start_time.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 { completed as f64 / elapsed } else { 0.0 };
            info!(
                "Progress: {}/{} ({:.1}%) - {:.1} stations/s",
                completed,
                self.total_tasks,
                completed as f64 / self.total_tasks as f64 * 100.0,
                rate
            );
        }
    }
}
