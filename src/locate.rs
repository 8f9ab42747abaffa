//! Map station coordinates onto grid cells.

use crate::config::LocatorConfig;
use crate::grid::{GridError, GridIndex, GriddedDataset};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("Grid has no cells")]
    EmptyGrid,

    #[error("Coordinates must be finite, got lon={lon}, lat={lat}")]
    NonFiniteCoordinates { lon: f64, lat: f64 },

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Why the window search gave way to the nearest cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// No grid cell lies inside the window
    EmptyWindow,
    /// Every cell in the window is missing for the whole time axis
    NoValidCells,
    /// Expected mean is missing, zero or not finite
    InvalidExpectedMean,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            FallbackReason::EmptyWindow => "empty search window",
            FallbackReason::NoValidCells => "no valid cells in search window",
            FallbackReason::InvalidExpectedMean => "invalid expected mean",
        };
        write!(f, "{}", text)
    }
}

/// Result of [`locate_with_window`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocateOutcome {
    pub index: GridIndex,
    /// Cell returned by the plain nearest-cell search
    pub nearest: GridIndex,
    /// `|mean / expected - 1|` of the chosen cell when the window search succeeded
    pub deviation: Option<f64>,
    pub fallback: Option<FallbackReason>,
}

impl LocateOutcome {
    fn fallback(nearest: GridIndex, reason: FallbackReason) -> Self {
        Self {
            index: nearest,
            nearest,
            deviation: None,
            fallback: Some(reason),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.fallback.is_some()
    }

    /// True if the window search moved the station away from the nearest cell.
    pub fn was_relocated(&self) -> bool {
        self.index != self.nearest
    }
}

fn abs_diff(axis: f64, target: f64) -> f64 {
    let d = (axis - target).abs();
    if d.is_nan() {
        f64::INFINITY
    } else {
        d
    }
}

/// Nearest grid cell under the Chebyshev distance `max(|dlon|, |dlat|)`.
///
/// Ties go to the smallest row, then the smallest column. Coordinates outside
/// the grid resolve to the nearest edge cell rather than failing.
pub fn locate<G>(grid: &G, lon: f64, lat: f64) -> Result<GridIndex, LocateError>
where
    G: GriddedDataset + ?Sized,
{
    if !lon.is_finite() || !lat.is_finite() {
        return Err(LocateError::NonFiniteCoordinates { lon, lat });
    }
    if grid.rows() == 0 || grid.cols() == 0 {
        return Err(LocateError::EmptyGrid);
    }

    let dlat: Vec<f64> = grid.latitudes().iter().map(|&y| abs_diff(y, lat)).collect();
    let dlon: Vec<f64> = grid.longitudes().iter().map(|&x| abs_diff(x, lon)).collect();

    let min_lat = dlat.iter().copied().fold(f64::INFINITY, f64::min);
    let min_lon = dlon.iter().copied().fold(f64::INFINITY, f64::min);
    // max(dlat[r], dlon[c]) is minimised at max(min dlat, min dlon); the first
    // row and column within that distance give the row-major first minimum.
    let best = min_lat.max(min_lon);

    let row = dlat.iter().position(|&d| d <= best).unwrap_or(0);
    let col = dlon.iter().position(|&d| d <= best).unwrap_or(0);

    Ok(GridIndex::new(row, col))
}

/// Refine the nearest cell by searching a square window for the cell whose
/// temporal mean of `variable` is closest to `expected_mean`.
///
/// The window extends `window_size * degrees_per_cell` degrees on each side
/// of the station, bounds inclusive. Any failure of the search falls back to
/// [`locate`] and records the reason.
pub fn locate_with_window<G>(
    grid: &G,
    lon: f64,
    lat: f64,
    expected_mean: Option<f64>,
    variable: &str,
    locator: &LocatorConfig,
) -> Result<LocateOutcome, LocateError>
where
    G: GriddedDataset + ?Sized,
{
    let nearest = locate(grid, lon, lat)?;

    let expected = match expected_mean {
        Some(m) if m.is_finite() && m != 0.0 => m,
        _ => {
            warn!("Window search not possible: invalid expected mean {:?}", expected_mean);
            return Ok(LocateOutcome::fallback(nearest, FallbackReason::InvalidExpectedMean));
        }
    };

    let half_width = locator.half_width_degrees();
    let rows: Vec<usize> = grid
        .latitudes()
        .iter()
        .enumerate()
        .filter(|(_, &y)| (y - lat).abs() <= half_width)
        .map(|(r, _)| r)
        .collect();
    let cols: Vec<usize> = grid
        .longitudes()
        .iter()
        .enumerate()
        .filter(|(_, &x)| (x - lon).abs() <= half_width)
        .map(|(c, _)| c)
        .collect();

    if rows.is_empty() || cols.is_empty() {
        warn!("Window search not possible: no grid cells within {} degrees", half_width);
        return Ok(LocateOutcome::fallback(nearest, FallbackReason::EmptyWindow));
    }

    debug!("Searching {} x {} window around {}", rows.len(), cols.len(), nearest);

    let mut best: Option<(GridIndex, f64)> = None;
    for &row in &rows {
        for &col in &cols {
            let index = GridIndex::new(row, col);
            let mean = match grid.cell_mean(variable, index)?.value() {
                Some(m) if m.is_finite() => m,
                _ => continue,
            };
            let deviation = (mean / expected - 1.0).abs();
            // strict comparison keeps the first cell in row-major order on ties
            if best.map_or(true, |(_, d)| deviation < d) {
                best = Some((index, deviation));
            }
        }
    }

    match best {
        Some((index, deviation)) => {
            if index != nearest {
                info!(
                    "Original coordinates {}/{} replaced by {}/{}",
                    lat,
                    lon,
                    grid.latitudes()[index.row],
                    grid.longitudes()[index.col]
                );
            } else {
                info!("Original coordinates unchanged after window search");
            }
            Ok(LocateOutcome {
                index,
                nearest,
                deviation: Some(deviation),
                fallback: None,
            })
        }
        None => {
            warn!("Window search not possible: all cells missing in window");
            Ok(LocateOutcome::fallback(nearest, FallbackReason::NoValidCells))
        }
    }
}
