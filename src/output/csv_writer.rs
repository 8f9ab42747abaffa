use super::{ResultWriter, WriteError};
use crate::align::AlignedPair;
use crate::metrics::MetricsResult;
use crate::parallel::BatchEntry;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const FLAG_SEPARATOR: &str = "; ";

/// Score table with one row per station.
pub struct CsvScoreWriter {
    output_path: PathBuf,
    rows: Vec<String>,
}

impl CsvScoreWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            output_path: path.to_path_buf(),
            rows: Vec::new(),
        }
    }

    fn header() -> String {
        let mut columns = vec![
            "station", "outcome", "row", "col", "cell_lon", "cell_lat", "window", "points",
        ];
        columns.extend(MetricsResult::default().fields().iter().map(|(name, _)| *name));
        columns.push("flags");
        columns.join(",")
    }
}

/// Quote a field when it would break the row.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => v.to_string(),
        _ => String::new(),
    }
}

impl ResultWriter for CsvScoreWriter {
    fn write_entry(&mut self, entry: &BatchEntry) -> Result<(), WriteError> {
        let mut fields = vec![escape(&entry.station_id), entry.outcome.to_string()];

        match &entry.report {
            Some(report) => {
                fields.push(report.index.row.to_string());
                fields.push(report.index.col.to_string());
                fields.push(format_value(Some(report.cell_lon)));
                fields.push(format_value(Some(report.cell_lat)));
                fields.push(report.window_applied.to_string());
                fields.push(report.metrics.points.to_string());
                fields.extend(report.metrics.fields().iter().map(|(_, v)| format_value(*v)));
                let flags: Vec<String> = report.flags.iter().map(|f| f.to_string()).collect();
                fields.push(escape(&flags.join(FLAG_SEPARATOR)));
            }
            None => {
                // row, col, cell_lon, cell_lat, window, points and the scores
                fields.extend(std::iter::repeat(String::new()).take(6 + 9));
                fields.push(escape(entry.error.as_deref().unwrap_or_default()));
            }
        }

        self.rows.push(fields.join(","));
        Ok(())
    }

    fn close(&mut self) -> Result<(), WriteError> {
        let mut writer = BufWriter::new(File::create(&self.output_path)?);
        writeln!(writer, "{}", Self::header())?;
        for row in &self.rows {
            writeln!(writer, "{}", row)?;
        }
        writer.flush()?;

        info!(
            "Wrote {} station scores to {}",
            self.rows.len(),
            self.output_path.display()
        );
        Ok(())
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }
}

/// Write the aligned pairs of one station as `date,observed,simulated`.
///
/// Rows with a missing value are kept with an empty cell.
pub fn write_evaluated_timeseries(path: &Path, pair: &AlignedPair) -> Result<(), WriteError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "date,observed,simulated")?;
    for (key, observed, simulated) in pair.iter() {
        writeln!(
            writer,
            "{},{},{}",
            key,
            format_value(Some(observed)),
            format_value(Some(simulated))
        )?;
    }
    writer.flush()?;
    Ok(())
}
