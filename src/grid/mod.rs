use crate::time_utils::TimeError;
use chrono::{DateTime, Utc};
use ndarray::{s, Array3};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

#[cfg(feature = "netcdf")]
pub mod netcdf_reader;

#[cfg(feature = "netcdf")]
pub use netcdf_reader::{read_netcdf_grid, GridReaderConfig};

/// Error type for gridded dataset access
#[derive(Error, Debug)]
pub enum GridError {
    #[error("Variable not found: {0}")]
    MissingVariable(String),

    #[error("Coordinate not found, tried: {0}")]
    MissingCoordinate(String),

    #[error("Variable {variable} has shape {found:?}, expected (time, lat, lon) = {expected:?}")]
    ShapeMismatch {
        variable: String,
        expected: (usize, usize, usize),
        found: Vec<usize>,
    },

    #[error("Grid index {index} outside grid of {rows} rows x {cols} columns")]
    IndexOutOfBounds {
        index: GridIndex,
        rows: usize,
        cols: usize,
    },

    #[error("Time axis error: {0}")]
    Time(#[from] TimeError),

    #[error("NetCDF error: {0}")]
    Netcdf(String),
}

/// Position of a cell in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridIndex {
    pub row: usize,
    pub col: usize,
}

impl GridIndex {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for GridIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(row {}, col {})", self.row, self.col)
    }
}

/// Temporal mean of one cell, ignoring missing values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMean {
    pub mean: f64,
    /// Number of finite values that went into the mean
    pub valid: usize,
}

impl CellMean {
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a f64>,
    {
        let (sum, valid) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
        let mean = if valid > 0 { sum / valid as f64 } else { f64::NAN };
        Self { mean, valid }
    }

    pub fn value(&self) -> Option<f64> {
        (self.valid > 0).then_some(self.mean)
    }
}

/// Read-only access to a time x lat x lon dataset with 1-D coordinate axes.
///
/// Longitudes index columns and latitudes index rows. Implementors must be
/// safe to share between threads for batch evaluation.
pub trait GriddedDataset {
    fn longitudes(&self) -> &[f64];

    fn latitudes(&self) -> &[f64];

    fn times(&self) -> &[DateTime<Utc>];

    fn has_variable(&self, variable: &str) -> bool;

    /// Values of `variable` at `index` for every time step.
    fn cell_series(&self, variable: &str, index: GridIndex) -> Result<Vec<f64>, GridError>;

    fn rows(&self) -> usize {
        self.latitudes().len()
    }

    fn cols(&self) -> usize {
        self.longitudes().len()
    }

    fn is_empty(&self) -> bool {
        self.rows() == 0 || self.cols() == 0 || self.times().is_empty()
    }

    fn check_index(&self, index: GridIndex) -> Result<(), GridError> {
        if index.row >= self.rows() || index.col >= self.cols() {
            return Err(GridError::IndexOutOfBounds {
                index,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        Ok(())
    }

    fn cell_mean(&self, variable: &str, index: GridIndex) -> Result<CellMean, GridError> {
        let series = self.cell_series(variable, index)?;
        Ok(CellMean::from_values(&series))
    }
}

/// Gridded dataset held in memory, one `Array3` per variable.
#[derive(Debug, Clone)]
pub struct InMemoryGrid {
    longitudes: Vec<f64>,
    latitudes: Vec<f64>,
    times: Vec<DateTime<Utc>>,
    variables: HashMap<String, Array3<f64>>,
}

impl InMemoryGrid {
    pub fn new(longitudes: Vec<f64>, latitudes: Vec<f64>, times: Vec<DateTime<Utc>>) -> Self {
        Self {
            longitudes,
            latitudes,
            times,
            variables: HashMap::new(),
        }
    }

    /// Add a variable laid out as `[time, lat, lon]`.
    pub fn insert_variable(
        &mut self,
        name: impl Into<String>,
        data: Array3<f64>,
    ) -> Result<(), GridError> {
        let name = name.into();
        let expected = (self.times.len(), self.latitudes.len(), self.longitudes.len());
        if data.dim() != expected {
            return Err(GridError::ShapeMismatch {
                variable: name,
                expected,
                found: data.shape().to_vec(),
            });
        }
        self.variables.insert(name, data);
        Ok(())
    }

    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        data: Array3<f64>,
    ) -> Result<Self, GridError> {
        self.insert_variable(name, data)?;
        Ok(self)
    }

    pub fn variable(&self, name: &str) -> Option<&Array3<f64>> {
        self.variables.get(name)
    }
}

impl GriddedDataset for InMemoryGrid {
    fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    fn has_variable(&self, variable: &str) -> bool {
        self.variables.contains_key(variable)
    }

    fn cell_series(&self, variable: &str, index: GridIndex) -> Result<Vec<f64>, GridError> {
        let data = self
            .variables
            .get(variable)
            .ok_or_else(|| GridError::MissingVariable(variable.to_string()))?;
        self.check_index(index)?;
        Ok(data.slice(s![.., index.row, index.col]).to_vec())
    }
}
