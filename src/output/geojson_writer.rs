use super::{ResultWriter, WriteError};
use crate::parallel::BatchEntry;
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Station scores as a GeoJSON `FeatureCollection` of points.
///
/// Geometry is the station location; stations without coordinates get a
/// `null` geometry. Undefined scores are written as `null`.
pub struct GeoJsonScoreWriter {
    output_path: PathBuf,
    features: Vec<Value>,
}

impl GeoJsonScoreWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            output_path: path.to_path_buf(),
            features: Vec::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "type": "FeatureCollection",
            "features": self.features,
        })
    }
}

fn feature(entry: &BatchEntry) -> Value {
    let mut properties = Map::new();
    properties.insert("station".into(), json!(entry.station_id));
    properties.insert("outcome".into(), json!(entry.outcome.to_string()));

    let Some(report) = &entry.report else {
        properties.insert("error".into(), json!(entry.error));
        return json!({ "type": "Feature", "geometry": null, "properties": properties });
    };

    let station = &report.station;
    properties.insert("name".into(), json!(station.name));
    properties.insert("river".into(), json!(station.river));
    properties.insert("row".into(), json!(report.index.row));
    properties.insert("col".into(), json!(report.index.col));
    properties.insert("cell_lon".into(), json!(report.cell_lon));
    properties.insert("cell_lat".into(), json!(report.cell_lat));
    properties.insert("points".into(), json!(report.metrics.points));
    for (name, value) in report.metrics.fields() {
        properties.insert(name.into(), json!(value.filter(|v| v.is_finite())));
    }
    let flags: Vec<String> = report.flags.iter().map(|f| f.to_string()).collect();
    properties.insert("flags".into(), json!(flags));

    let geometry = match (station.longitude, station.latitude) {
        (Some(lon), Some(lat)) => json!({ "type": "Point", "coordinates": [lon, lat] }),
        _ => Value::Null,
    };

    json!({ "type": "Feature", "geometry": geometry, "properties": properties })
}

impl ResultWriter for GeoJsonScoreWriter {
    fn write_entry(&mut self, entry: &BatchEntry) -> Result<(), WriteError> {
        self.features.push(feature(entry));
        Ok(())
    }

    fn close(&mut self) -> Result<(), WriteError> {
        let mut writer = BufWriter::new(File::create(&self.output_path)?);
        serde_json::to_writer_pretty(&mut writer, &self.to_value())?;
        writer.flush()?;

        info!(
            "Wrote {} station features to {}",
            self.features.len(),
            self.output_path.display()
        );
        Ok(())
    }

    fn output_path(&self) -> &Path {
        &self.output_path
    }
}
