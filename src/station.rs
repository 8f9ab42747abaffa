//! Station metadata and observations from GRDC text files.

use crate::series::{SeriesError, TimeSeries};
use crate::time_utils::{parse_time_string, TimeError};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum StationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("No column header found after the metadata block")]
    MissingTableHeader,

    #[error("None of the value columns {tried:?} found, available: {available:?}")]
    MissingColumn {
        tried: Vec<String>,
        available: Vec<String>,
    },

    #[error("Line {line}: invalid date {value:?}")]
    InvalidDate { line: usize, value: String },

    #[error("Line {line}: invalid value {value:?}")]
    InvalidValue { line: usize, value: String },

    #[error(transparent)]
    Time(#[from] TimeError),

    #[error(transparent)]
    Series(#[from] SeriesError),
}

/// Text encoding of station files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// ISO-8859-1, the encoding GRDC distributes its files in
    Latin1,
}

impl Encoding {
    pub fn decode(self, bytes: &[u8]) -> Result<String, StationError> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| StationError::Encoding(e.to_string())),
            // every Latin-1 byte is the code point of the same value
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeaderConfig {
    pub encoding: Encoding,
    /// Number of lines scanned for metadata
    pub max_header_lines: usize,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Latin1,
            max_header_lines: 40,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ObservationConfig {
    pub encoding: Encoding,
    /// Value columns tried in order
    pub value_columns: Vec<String>,
    pub date_column: String,
    pub separator: char,
    /// Sentinel replaced by NaN
    pub missing_value: f64,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Latin1,
            value_columns: vec!["Value".into(), "Calculated".into(), "Original".into()],
            date_column: "YYYY-MM-DD".into(),
            separator: ';',
            missing_value: -999.0,
        }
    }
}

impl ObservationConfig {
    /// Try `column` before the default candidates.
    pub fn prefer_column(mut self, column: &str) -> Self {
        let column = column.trim().to_string();
        self.value_columns.retain(|c| c != &column);
        self.value_columns.insert(0, column);
        self
    }
}

/// Header fields of a GRDC file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    GrdcNo,
    Station,
    River,
    Latitude,
    Longitude,
    CatchmentArea,
    TimeSeries,
    NumberOfYears,
}

impl HeaderField {
    const ALL: [HeaderField; 8] = [
        HeaderField::GrdcNo,
        HeaderField::Station,
        HeaderField::River,
        HeaderField::Latitude,
        HeaderField::Longitude,
        HeaderField::CatchmentArea,
        HeaderField::TimeSeries,
        HeaderField::NumberOfYears,
    ];

    pub fn label(self) -> &'static str {
        match self {
            HeaderField::GrdcNo => "GRDC-No.",
            HeaderField::Station => "Station",
            HeaderField::River => "River",
            HeaderField::Latitude => "Latitude",
            HeaderField::Longitude => "Longitude",
            HeaderField::CatchmentArea => "Catchment area",
            HeaderField::TimeSeries => "Time series",
            HeaderField::NumberOfYears => "No. of years",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| label.starts_with(f.label()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderWarning {
    Missing(HeaderField),
    Unparseable { field: HeaderField, value: String },
}

impl fmt::Display for HeaderWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HeaderWarning::Missing(field) => write!(f, "no \"{}\" information found", field.label()),
            HeaderWarning::Unparseable { field, value } => {
                write!(f, "could not parse \"{}\" value {:?}", field.label(), value)
            }
        }
    }
}

/// Station description consumed by the pipeline.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StationMetadata {
    pub id: String,
    pub name: Option<String>,
    pub river: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// km²
    pub catchment_area: Option<f64>,
    pub series_start: Option<DateTime<Utc>>,
    pub series_end: Option<DateTime<Utc>>,
    pub years: Option<u32>,
    /// Long-term mean of the observations, if known ahead of time
    pub expected_mean: Option<f64>,
    /// Coordinates were set by the user and are trusted as exact
    pub corrected: bool,
}

impl StationMetadata {
    pub fn new(id: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            id: id.into(),
            longitude: Some(longitude),
            latitude: Some(latitude),
            ..Self::default()
        }
    }

    pub fn with_corrected_coordinates(mut self, longitude: f64, latitude: f64) -> Self {
        info!(
            "Station {}: coordinates {:?}/{:?} replaced by corrected {}/{}",
            self.id, self.latitude, self.longitude, latitude, longitude
        );
        self.longitude = Some(longitude);
        self.latitude = Some(latitude);
        self.corrected = true;
        self
    }

    pub fn with_expected_mean(mut self, mean: f64) -> Self {
        self.expected_mean = Some(mean);
        self
    }
}

/// Metadata plus the warnings raised while reading it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedHeader {
    pub metadata: StationMetadata,
    pub warnings: Vec<HeaderWarning>,
}

fn strip_comment(line: &str) -> Option<&str> {
    line.trim_start().strip_prefix('#').map(|rest| rest.trim_start_matches('#'))
}

/// Scan the `# label: value` block at the top of a GRDC file.
///
/// Labels are matched by prefix so that unit suffixes like `Latitude (DD)`
/// are accepted. Missing or unreadable fields become warnings, never errors.
pub fn parse_grdc_header(text: &str, config: &HeaderConfig) -> ParsedHeader {
    let mut metadata = StationMetadata::default();
    let mut warnings = Vec::new();
    let mut seen = Vec::new();

    for line in text.lines().take(config.max_header_lines) {
        let Some(content) = strip_comment(line) else {
            break;
        };
        let Some((label, value)) = content.split_once(':') else {
            continue;
        };
        let Some(field) = HeaderField::from_label(label.trim()) else {
            continue;
        };
        let value = value.trim();
        seen.push(field);

        let mut unparseable = || {
            warnings.push(HeaderWarning::Unparseable {
                field,
                value: value.to_string(),
            })
        };

        match field {
            HeaderField::GrdcNo => metadata.id = value.to_string(),
            HeaderField::Station => metadata.name = Some(value.to_string()),
            HeaderField::River => metadata.river = Some(value.to_string()),
            HeaderField::Latitude => match value.parse::<f64>() {
                Ok(v) if v.is_finite() => metadata.latitude = Some(v),
                _ => unparseable(),
            },
            HeaderField::Longitude => match value.parse::<f64>() {
                Ok(v) if v.is_finite() => metadata.longitude = Some(v),
                _ => unparseable(),
            },
            HeaderField::CatchmentArea => {
                if !value.is_empty() {
                    match value.parse::<f64>() {
                        Ok(v) => metadata.catchment_area = Some(v),
                        Err(_) => unparseable(),
                    }
                }
            }
            HeaderField::TimeSeries => {
                let parsed = value.split_once(" - ").and_then(|(start, end)| {
                    Some((
                        parse_time_string(start.trim()).ok()?,
                        parse_time_string(end.trim()).ok()?,
                    ))
                });
                match parsed {
                    Some((start, end)) => {
                        metadata.series_start = Some(start);
                        metadata.series_end = Some(end);
                    }
                    None => unparseable(),
                }
            }
            HeaderField::NumberOfYears => match value.parse::<u32>() {
                Ok(v) => metadata.years = Some(v),
                Err(_) => unparseable(),
            },
        }
    }

    for field in HeaderField::ALL {
        if !seen.contains(&field) {
            warnings.push(HeaderWarning::Missing(field));
        }
    }

    ParsedHeader { metadata, warnings }
}

/// Observed series and the column it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    pub series: TimeSeries,
    pub value_column: String,
}

/// Read the `;`-separated table following the metadata block.
///
/// The first line not starting with `#` holds the column names. Monthly
/// records dated `YYYY-MM-00` are read as the first of the month and the
/// series is re-keyed by month when its dates are monthly.
pub fn read_grdc_observations(
    text: &str,
    config: &ObservationConfig,
) -> Result<ObservationTable, StationError> {
    let mut lines = text
        .lines()
        .enumerate()
        .skip_while(|(_, line)| line.trim_start().starts_with('#') || line.trim().is_empty());

    let (_, header) = lines.next().ok_or(StationError::MissingTableHeader)?;
    let columns: Vec<String> = header
        .split(config.separator)
        .map(|c| c.trim().to_string())
        .collect();

    let date_idx = columns
        .iter()
        .position(|c| c == &config.date_column)
        .unwrap_or(0);
    let (value_idx, value_column) = config
        .value_columns
        .iter()
        .find_map(|wanted| {
            columns
                .iter()
                .position(|c| c == wanted)
                .map(|i| (i, wanted.clone()))
        })
        .ok_or_else(|| StationError::MissingColumn {
            tried: config.value_columns.clone(),
            available: columns.clone(),
        })?;

    if value_column != config.value_columns[0] {
        warn!(
            "Column {} not found, falling back to column {}",
            config.value_columns[0], value_column
        );
    } else {
        debug!("Reading column {}", value_column);
    }

    let mut times = Vec::new();
    let mut values = Vec::new();
    for (i, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(config.separator).map(str::trim).collect();
        let date = fields.get(date_idx).copied().unwrap_or_default();
        let raw = fields.get(value_idx).copied().unwrap_or_default();

        let time = parse_time_string(date).map_err(|_| StationError::InvalidDate {
            line: i + 1,
            value: date.to_string(),
        })?;
        let value: f64 = raw.parse().map_err(|_| StationError::InvalidValue {
            line: i + 1,
            value: raw.to_string(),
        })?;

        times.push(time);
        values.push(if value == config.missing_value { f64::NAN } else { value });
    }

    let series = TimeSeries::from_datetimes(&times, values)?.normalize_monthly();
    Ok(ObservationTable {
        series,
        value_column,
    })
}

/// Everything read from one GRDC file.
#[derive(Debug, Clone, PartialEq)]
pub struct GrdcRecord {
    pub path: PathBuf,
    pub metadata: StationMetadata,
    pub warnings: Vec<HeaderWarning>,
    pub observations: TimeSeries,
    pub value_column: String,
}

pub fn read_grdc_file(
    path: impl AsRef<Path>,
    header_config: &HeaderConfig,
    obs_config: &ObservationConfig,
) -> Result<GrdcRecord, StationError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;

    let header_text = header_config.encoding.decode(&bytes)?;
    let ParsedHeader {
        mut metadata,
        warnings,
    } = parse_grdc_header(&header_text, header_config);

    if metadata.id.is_empty() {
        metadata.id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    for warning in &warnings {
        warn!("{}: {}", path.display(), warning);
    }

    let table = if obs_config.encoding == header_config.encoding {
        read_grdc_observations(&header_text, obs_config)?
    } else {
        read_grdc_observations(&obs_config.encoding.decode(&bytes)?, obs_config)?
    };

    Ok(GrdcRecord {
        path: path.to_path_buf(),
        metadata,
        warnings,
        observations: table.series,
        value_column: table.value_column,
    })
}

/// Read every `.txt` file in `folder`, sorted by file name.
///
/// Files that cannot be read are reported alongside the records.
pub fn read_grdc_folder(
    folder: impl AsRef<Path>,
    header_config: &HeaderConfig,
    obs_config: &ObservationConfig,
) -> Result<(Vec<GrdcRecord>, Vec<(PathBuf, StationError)>), StationError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(folder.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().map_or(false, |e| e.eq_ignore_ascii_case("txt")))
        .collect();
    paths.sort();

    info!("Found {} station files in {}", paths.len(), folder.as_ref().display());

    let mut records = Vec::new();
    let mut failures = Vec::new();
    for path in paths {
        match read_grdc_file(&path, header_config, obs_config) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                failures.push((path, e));
            }
        }
    }
    Ok((records, failures))
}

/// Station ids listed one per line.
pub fn read_selection_file(path: impl AsRef<Path>) -> Result<Vec<String>, StationError> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Keep the records whose id is listed in `ids`.
pub fn select_stations(records: Vec<GrdcRecord>, ids: &[String]) -> Vec<GrdcRecord> {
    let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let available: HashSet<String> = records.iter().map(|r| r.metadata.id.clone()).collect();
    for id in ids {
        if !available.contains(id) {
            warn!("Selected station {} not found", id);
        }
    }
    records
        .into_iter()
        .filter(|r| wanted.contains(r.metadata.id.as_str()))
        .collect()
}
