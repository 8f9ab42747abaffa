//! Load a CF-style NetCDF file into an [`InMemoryGrid`].

use super::{GridError, InMemoryGrid};
use crate::time_utils::{cf_offsets_to_datetimes, parse_cf_time_units};
use ndarray::Array3;
use std::path::Path;
use tracing::{debug, info};

impl From<netcdf::Error> for GridError {
    fn from(e: netcdf::Error) -> Self {
        GridError::Netcdf(e.to_string())
    }
}

/// Coordinate variable names tried in order.
#[derive(Debug, Clone)]
pub struct GridReaderConfig {
    pub lon_names: Vec<String>,
    pub lat_names: Vec<String>,
    pub time_name: String,
}

impl Default for GridReaderConfig {
    fn default() -> Self {
        Self {
            lon_names: vec!["lon".into(), "longitude".into(), "x".into()],
            lat_names: vec!["lat".into(), "latitude".into(), "y".into()],
            time_name: "time".into(),
        }
    }
}

/// Read the coordinate axes and the requested `[time, lat, lon]` variables.
///
/// `_FillValue` and `missing_value` become NaN, then `scale_factor` and
/// `add_offset` are applied.
pub fn read_netcdf_grid(
    path: impl AsRef<Path>,
    variables: &[&str],
    config: &GridReaderConfig,
) -> Result<InMemoryGrid, GridError> {
    let path = path.as_ref();
    info!("Reading gridded data from {}", path.display());
    let file = netcdf::open(path)?;

    let lon = read_coord(&file, &config.lon_names)?;
    let lat = read_coord(&file, &config.lat_names)?;

    let time_var = file
        .variable(&config.time_name)
        .ok_or_else(|| GridError::MissingCoordinate(config.time_name.clone()))?;
    let offsets: Vec<f64> = time_var.get_values(..)?;
    let units = get_attr_string(&time_var, "units")
        .ok_or_else(|| GridError::MissingCoordinate(format!("{} units", config.time_name)))?;
    let (unit, base) = parse_cf_time_units(&units)?;
    let times = cf_offsets_to_datetimes(&offsets, unit, base)?;

    debug!(
        "Grid axes: {} times, {} latitudes, {} longitudes",
        times.len(),
        lat.len(),
        lon.len()
    );

    let shape = (times.len(), lat.len(), lon.len());
    let mut grid = InMemoryGrid::new(lon, lat, times);

    for &name in variables {
        let var = file
            .variable(name)
            .ok_or_else(|| GridError::MissingVariable(name.to_string()))?;

        let dims: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        if dims != [shape.0, shape.1, shape.2] {
            return Err(GridError::ShapeMismatch {
                variable: name.to_string(),
                expected: shape,
                found: dims,
            });
        }

        let scale = get_attr_f64(&var, "scale_factor").unwrap_or(1.0);
        let offset = get_attr_f64(&var, "add_offset").unwrap_or(0.0);
        let fill_values: Vec<f64> = ["_FillValue", "missing_value"]
            .iter()
            .filter_map(|attr| get_attr_f64(&var, attr))
            .collect();

        let raw: Vec<f64> = var.get_values(..)?;
        let values: Vec<f64> = raw
            .into_iter()
            .map(|v| {
                if fill_values.iter().any(|&fill| v == fill) {
                    f64::NAN
                } else {
                    v * scale + offset
                }
            })
            .collect();

        let data = Array3::from_shape_vec(shape, values).map_err(|_| GridError::ShapeMismatch {
            variable: name.to_string(),
            expected: shape,
            found: dims.clone(),
        })?;
        grid.insert_variable(name, data)?;
    }

    Ok(grid)
}

fn read_coord(file: &netcdf::File, names: &[String]) -> Result<Vec<f64>, GridError> {
    for name in names {
        if let Some(var) = file.variable(name) {
            let data: Vec<f64> = var.get_values(..)?;
            return Ok(data);
        }
    }
    Err(GridError::MissingCoordinate(names.join(" or ")))
}

fn get_attr_f64(var: &netcdf::Variable, name: &str) -> Option<f64> {
    var.attribute_value(name)
        .and_then(|r| r.ok())
        .and_then(|v| match v {
            netcdf::AttributeValue::Double(d) => Some(d),
            netcdf::AttributeValue::Float(f) => Some(f as f64),
            netcdf::AttributeValue::Int(i) => Some(i as f64),
            netcdf::AttributeValue::Short(s) => Some(s as f64),
            _ => None,
        })
}

fn get_attr_string(var: &netcdf::Variable, name: &str) -> Option<String> {
    var.attribute_value(name)
        .and_then(|r| r.ok())
        .and_then(|v| match v {
            netcdf::AttributeValue::Str(s) => Some(s),
            _ => None,
        })
}
