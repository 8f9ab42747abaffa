use chrono::{DateTime, TimeZone, Utc};
use gridval::config::LocatorConfig;
use gridval::grid::{GridError, GridIndex, GriddedDataset, InMemoryGrid};
use gridval::locate::{locate, locate_with_window, FallbackReason, LocateError};
use ndarray::Array3;

fn days(n: usize) -> Vec<DateTime<Utc>> {
    (0..n)
        .map(|d| Utc.with_ymd_and_hms(2000, 1, 1 + d as u32, 0, 0, 0).unwrap())
        .collect()
}

/// 3 x 3 grid on whole degrees whose cell means are 10, 20, ... 90 in
/// row-major order.
fn ladder_grid() -> InMemoryGrid {
    let data = Array3::from_shape_fn((4, 3, 3), |(t, r, c)| {
        let mean = 10.0 * (r * 3 + c + 1) as f64;
        // zero-mean wiggle over time
        mean + if t % 2 == 0 { 1.0 } else { -1.0 }
    });
    InMemoryGrid::new(vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 2.0], days(4))
        .with_variable("discharge", data)
        .unwrap()
}

fn one_degree_window(window_size: usize) -> LocatorConfig {
    LocatorConfig {
        window_size,
        degrees_per_cell: 1.0,
    }
}

#[test]
fn test_nearest_cell() {
    let lon: Vec<f64> = (0..5).map(f64::from).collect();
    let lat: Vec<f64> = (0..5).map(f64::from).collect();
    let grid = InMemoryGrid::new(lon, lat, days(1));

    assert_eq!(locate(&grid, 2.2, 3.4).unwrap(), GridIndex::new(3, 2));
    assert_eq!(locate(&grid, 0.0, 0.0).unwrap(), GridIndex::new(0, 0));
    assert_eq!(locate(&grid, 4.0, 4.0).unwrap(), GridIndex::new(4, 4));
}

#[test]
fn test_ties_prefer_first_row_then_column() {
    let grid = InMemoryGrid::new(vec![0.0, 1.0], vec![0.0, 1.0], days(1));
    // equidistant from all four cells
    assert_eq!(locate(&grid, 0.5, 0.5).unwrap(), GridIndex::new(0, 0));

    // longitude distance dominates, so both rows tie
    let wide = InMemoryGrid::new(vec![0.0, 2.0], vec![0.0, 0.5], days(1));
    assert_eq!(locate(&wide, 1.0, 0.3).unwrap(), GridIndex::new(0, 0));
}

#[test]
fn test_descending_latitudes() {
    let grid = InMemoryGrid::new(vec![10.0, 10.5], vec![50.0, 49.5, 49.0], days(1));
    assert_eq!(locate(&grid, 10.4, 49.1).unwrap(), GridIndex::new(2, 1));
}

#[test]
fn test_outside_grid_resolves_to_edge() {
    let grid = InMemoryGrid::new(vec![0.0, 1.0, 2.0], vec![0.0, 1.0, 2.0], days(1));
    let index = locate(&grid, 50.0, 1.0).unwrap();
    assert_eq!(index.col, 2);
}

#[test]
fn test_invalid_inputs() {
    let grid = InMemoryGrid::new(vec![0.0], vec![0.0], days(1));
    assert!(matches!(
        locate(&grid, f64::NAN, 0.0),
        Err(LocateError::NonFiniteCoordinates { .. })
    ));
    let empty = InMemoryGrid::new(vec![], vec![0.0], days(1));
    assert!(matches!(locate(&empty, 0.0, 0.0), Err(LocateError::EmptyGrid)));
}

#[test]
fn test_window_picks_closest_mean() {
    let grid = ladder_grid();
    let outcome =
        locate_with_window(&grid, 1.0, 1.0, Some(31.0), "discharge", &one_degree_window(1))
            .unwrap();
    assert_eq!(outcome.nearest, GridIndex::new(1, 1));
    assert_eq!(outcome.index, GridIndex::new(0, 2));
    assert!(outcome.was_relocated());
    assert!(!outcome.is_degraded());
    assert!((outcome.deviation.unwrap() - 1.0 / 31.0).abs() < 1e-12);
}

#[test]
fn test_window_bounds_are_inclusive() {
    let grid = ladder_grid();
    // the 90 cell is exactly two degrees away on both axes
    let outcome =
        locate_with_window(&grid, 0.0, 0.0, Some(90.0), "discharge", &one_degree_window(2))
            .unwrap();
    assert_eq!(outcome.index, GridIndex::new(2, 2));

    let outcome =
        locate_with_window(&grid, 0.0, 0.0, Some(90.0), "discharge", &one_degree_window(1))
            .unwrap();
    assert_eq!(outcome.index, GridIndex::new(1, 1));
}

#[test]
fn test_window_keeps_nearest_when_it_matches() {
    let grid = ladder_grid();
    let outcome =
        locate_with_window(&grid, 1.0, 1.0, Some(50.0), "discharge", &one_degree_window(1))
            .unwrap();
    assert_eq!(outcome.index, outcome.nearest);
    assert_eq!(outcome.deviation, Some(0.0));
    assert!(!outcome.was_relocated());
}

#[test]
fn test_window_fallbacks() {
    let grid = ladder_grid();
    let window = one_degree_window(1);

    for expected in [None, Some(0.0), Some(f64::NAN)] {
        let outcome = locate_with_window(&grid, 1.0, 1.0, expected, "discharge", &window).unwrap();
        assert_eq!(outcome.fallback, Some(FallbackReason::InvalidExpectedMean));
        assert_eq!(outcome.index, GridIndex::new(1, 1));
    }

    let outcome = locate_with_window(&grid, 40.0, 1.0, Some(30.0), "discharge", &window).unwrap();
    assert_eq!(outcome.fallback, Some(FallbackReason::EmptyWindow));
    assert_eq!(outcome.index, outcome.nearest);

    let missing = InMemoryGrid::new(vec![0.0, 1.0], vec![0.0, 1.0], days(2))
        .with_variable("discharge", Array3::from_elem((2, 2, 2), f64::NAN))
        .unwrap();
    let outcome = locate_with_window(&missing, 0.2, 0.2, Some(30.0), "discharge", &window).unwrap();
    assert_eq!(outcome.fallback, Some(FallbackReason::NoValidCells));
    assert_eq!(outcome.index, GridIndex::new(0, 0));
}

#[test]
fn test_window_skips_missing_cells() {
    let mut data = Array3::from_elem((2, 1, 3), 10.0);
    for t in 0..2 {
        // the best match on paper, but all missing
        data[[t, 0, 1]] = f64::NAN;
    }
    data[[0, 0, 2]] = 12.0;
    data[[1, 0, 2]] = f64::NAN;
    let grid = InMemoryGrid::new(vec![0.0, 1.0, 2.0], vec![0.0], days(2))
        .with_variable("discharge", data)
        .unwrap();

    let outcome =
        locate_with_window(&grid, 1.0, 0.0, Some(12.0), "discharge", &one_degree_window(1))
            .unwrap();
    // the single finite value of column 2 is its mean
    assert_eq!(outcome.index, GridIndex::new(0, 2));
}

#[test]
fn test_unknown_variable_is_an_error() {
    let grid = ladder_grid();
    let result = locate_with_window(&grid, 1.0, 1.0, Some(10.0), "runoff", &one_degree_window(1));
    assert!(matches!(
        result,
        Err(LocateError::Grid(GridError::MissingVariable(_)))
    ));
}

/// A dataset computed on the fly, to exercise the trait default methods.
struct Analytic {
    lon: Vec<f64>,
    lat: Vec<f64>,
    times: Vec<DateTime<Utc>>,
}

impl GriddedDataset for Analytic {
    fn longitudes(&self) -> &[f64] {
        &self.lon
    }

    fn latitudes(&self) -> &[f64] {
        &self.lat
    }

    fn times(&self) -> &[DateTime<Utc>] {
        &self.times
    }

    fn has_variable(&self, variable: &str) -> bool {
        variable == "flow"
    }

    fn cell_series(&self, variable: &str, index: GridIndex) -> Result<Vec<f64>, GridError> {
        if !self.has_variable(variable) {
            return Err(GridError::MissingVariable(variable.to_string()));
        }
        self.check_index(index)?;
        Ok(vec![(index.row * 10 + index.col) as f64; self.times.len()])
    }
}

#[test]
fn test_custom_dataset() {
    let grid = Analytic {
        lon: vec![0.0, 1.0, 2.0],
        lat: vec![0.0, 1.0],
        times: days(3),
    };
    let outcome =
        locate_with_window(&grid, 1.0, 0.0, Some(12.0), "flow", &one_degree_window(1)).unwrap();
    assert_eq!(outcome.index, GridIndex::new(1, 2));
    assert!(grid.cell_series("flow", GridIndex::new(2, 0)).is_err());
}
