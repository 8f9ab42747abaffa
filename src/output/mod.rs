use crate::parallel::BatchEntry;
use std::path::Path;
use thiserror::Error;

pub mod csv_writer;
pub mod geojson_writer;

pub use csv_writer::{write_evaluated_timeseries, CsvScoreWriter};
pub use geojson_writer::GeoJsonScoreWriter;

/// Error types for result writing operations
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown output format: {0}")]
    UnknownFormat(String),
}

/// Sink for per-station batch results.
pub trait ResultWriter {
    /// Queue the result of one station
    fn write_entry(&mut self, entry: &BatchEntry) -> Result<(), WriteError>;

    fn write_entries(&mut self, entries: &[BatchEntry]) -> Result<(), WriteError> {
        for entry in entries {
            self.write_entry(entry)?;
        }
        Ok(())
    }

    /// Write everything queued to disk
    fn close(&mut self) -> Result<(), WriteError>;

    fn output_path(&self) -> &Path;
}

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    GeoJson,
}

impl OutputFormat {
    /// Detect output format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("csv") | Some("txt") => Some(OutputFormat::Csv),
            Some("geojson") | Some("json") => Some(OutputFormat::GeoJson),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::GeoJson => "geojson",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::GeoJson => write!(f, "geojson"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = WriteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" | "txt" => Ok(OutputFormat::Csv),
            "geojson" | "json" => Ok(OutputFormat::GeoJson),
            _ => Err(WriteError::UnknownFormat(s.to_string())),
        }
    }
}

/// Factory function to create appropriate writer for the format
pub fn create_writer(
    output_path: &Path,
    format: OutputFormat,
) -> Result<Box<dyn ResultWriter>, WriteError> {
    match format {
        OutputFormat::Csv => Ok(Box::new(CsvScoreWriter::new(output_path))),
        OutputFormat::GeoJson => Ok(Box::new(GeoJsonScoreWriter::new(output_path))),
    }
}

/// Convenience function to auto-detect format and create writer
pub fn create_writer_auto(output_path: &Path) -> Result<Box<dyn ResultWriter>, WriteError> {
    let format = OutputFormat::from_path(output_path)
        .ok_or_else(|| WriteError::UnknownFormat(output_path.display().to_string()))?;
    create_writer(output_path, format)
}
