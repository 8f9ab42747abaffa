//! Locate stations on a model grid, align observed and simulated series
//! and score the agreement between them.

pub mod align;
pub mod config;
pub mod grid;
pub mod locate;
pub mod metrics;
pub mod output;
pub mod parallel;
pub mod pipeline;
pub mod series;
pub mod station;
pub mod time_utils;

pub use align::{align, resample, AlignReport, AlignedPair, Alignment, CompletePairs, Statistic};
pub use config::{Config, EvaluationOptions, LocatorConfig, WindowSearch};
pub use grid::{GridIndex, GriddedDataset, InMemoryGrid};
pub use locate::{locate, locate_with_window, FallbackReason, LocateOutcome};
pub use metrics::{score, MetricsResult};
pub use pipeline::{evaluate_station, DiagnosticFlag, StationOutcome, StationReport};
pub use series::{TimeKey, TimeSeries};
pub use time_utils::Period;
