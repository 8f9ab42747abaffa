use chrono::{TimeZone, Utc};
use gridval::align::align;
use gridval::config::{EvaluationOptions, WindowSearch};
use gridval::grid::InMemoryGrid;
use gridval::output::{create_writer, create_writer_auto, write_evaluated_timeseries, OutputFormat};
use gridval::parallel::{evaluate_stations_parallel, BatchEntry, StationInput};
use gridval::series::TimeSeries;
use gridval::station::StationMetadata;
use ndarray::Array3;
use std::fs;
use tempfile::tempdir;

fn batch() -> Vec<BatchEntry> {
    let times: Vec<_> = (1..=5)
        .map(|d| Utc.with_ymd_and_hms(2005, 6, d, 0, 0, 0).unwrap())
        .collect();
    let data = Array3::from_shape_fn((5, 1, 2), |(t, _, c)| {
        if c == 0 {
            (t + 1) as f64
        } else {
            [1.0, 2.0, 3.0, 4.0, 6.0][t]
        }
    });
    let grid = InMemoryGrid::new(vec![5.0, 6.0], vec![50.0], times.clone())
        .with_variable("discharge", data)
        .unwrap();
    let observed = TimeSeries::from_datetimes(&times, vec![1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();

    let mut rees = StationMetadata::new("6335020", 6.0, 50.0);
    rees.name = Some("REES, RHINE".into());
    let stations = vec![
        StationInput {
            metadata: rees,
            observed: observed.clone(),
        },
        StationInput {
            metadata: StationMetadata::new("6335060", 5.0, 50.0),
            observed: observed.clone(),
        },
        StationInput {
            metadata: StationMetadata {
                id: "6335999".into(),
                ..StationMetadata::default()
            },
            observed,
        },
    ];
    let options = EvaluationOptions {
        window_search: WindowSearch::Never,
        ..EvaluationOptions::default()
    };
    evaluate_stations_parallel(&grid, &stations, &options)
}

#[test]
fn test_csv_scores() {
    let temp_dir = tempdir().unwrap();
    let output_path = temp_dir.path().join("all_scores.csv");

    let mut writer = create_writer(&output_path, OutputFormat::Csv).unwrap();
    writer.write_entries(&batch()).unwrap();
    writer.close().unwrap();
    assert_eq!(writer.output_path(), output_path.as_path());

    let text = fs::read_to_string(&output_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(
        lines[0],
        "station,outcome,row,col,cell_lon,cell_lat,window,points,KGE,r,alpha,beta,NSE,R2,MSE,RMSE,RRMSE_std,flags"
    );
    assert_eq!(
        lines[1],
        "6335020,ok,0,1,6,50,false,5,0.773,0.986,1.217,1.067,0.9,0.973,0.2,0.447,0.283,"
    );
    assert_eq!(lines[2], "6335060,ok,0,0,5,50,false,5,1,1,1,1,1,1,0,0,0,");
    assert!(lines[3].starts_with("6335999,failed,,,"));
    assert!(lines[3].contains("invalid coordinates"));
}

#[test]
fn test_geojson_scores() {
    let temp_dir = tempdir().unwrap();
    let output_path = temp_dir.path().join("scores.geojson");

    let mut writer = create_writer(&output_path, OutputFormat::GeoJson).unwrap();
    writer.write_entries(&batch()).unwrap();
    writer.close().unwrap();

    let text = fs::read_to_string(&output_path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["type"], "FeatureCollection");

    let features = json["features"].as_array().unwrap();
    assert_eq!(features.len(), 3);

    let rees = &features[0];
    assert_eq!(rees["geometry"]["type"], "Point");
    assert_eq!(rees["geometry"]["coordinates"], serde_json::json!([6.0, 50.0]));
    assert_eq!(rees["properties"]["name"], "REES, RHINE");
    assert_eq!(rees["properties"]["KGE"], 0.773);
    assert_eq!(rees["properties"]["col"], 1);

    assert!(features[2]["geometry"].is_null());
    assert_eq!(features[2]["properties"]["outcome"], "failed");
}

#[test]
fn test_evaluated_timeseries_keeps_missing_rows() {
    let times: Vec<_> = (1..=3)
        .map(|d| Utc.with_ymd_and_hms(2005, 6, d, 0, 0, 0).unwrap())
        .collect();
    let observed = TimeSeries::from_datetimes(&times, vec![1.0, f64::NAN, 3.5]).unwrap();
    let simulated = TimeSeries::from_datetimes(&times, vec![1.25, 2.0, 3.0]).unwrap();
    let alignment = align(&observed, &simulated);

    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("6335020").join("evaluated_timeseries.csv");
    write_evaluated_timeseries(&path, alignment.pair().unwrap()).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(
        text,
        "date,observed,simulated\n2005-06-01,1,1.25\n2005-06-02,,2\n2005-06-03,3.5,3\n"
    );
}

#[test]
fn test_format_detection() {
    use std::path::Path;

    assert_eq!(
        OutputFormat::from_path(Path::new("out/all_scores.csv")),
        Some(OutputFormat::Csv)
    );
    assert_eq!(
        OutputFormat::from_path(Path::new("out/scores.json")),
        Some(OutputFormat::GeoJson)
    );
    assert_eq!(OutputFormat::GeoJson.extension(), "geojson");
    assert_eq!(OutputFormat::Csv.to_string(), "csv");
}

#[test]
fn test_writers_picked_from_file_names() {
    let temp_dir = tempdir().unwrap();
    let entries = batch();

    for name in ["all_scores.csv", "scores.geojson"] {
        let path = temp_dir.path().join(name);
        let mut writer = create_writer_auto(&path).unwrap();
        writer.write_entries(&entries).unwrap();
        writer.close().unwrap();
        assert_eq!(writer.output_path(), path.as_path());
    }

    let csv = fs::read_to_string(temp_dir.path().join("all_scores.csv")).unwrap();
    assert!(csv.starts_with("station,outcome,"));
    assert_eq!(csv.lines().count(), 4);

    let geojson = fs::read_to_string(temp_dir.path().join("scores.geojson")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&geojson).unwrap();
    assert_eq!(value["type"], "FeatureCollection");
    assert_eq!(value["features"].as_array().unwrap().len(), 3);
}
