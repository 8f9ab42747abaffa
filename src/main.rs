use gridval::{
    config::{Config, ConfigError},
    grid::{read_netcdf_grid, GridReaderConfig},
    output::{create_writer_auto, write_evaluated_timeseries},
    parallel::{
        evaluate_stations_parallel, evaluate_with_custom_threads, BatchEntry, BatchSummary,
        StationInput,
    },
    pipeline::StationOutcome,
    station::{
        read_grdc_folder, read_selection_file, select_stations, HeaderConfig, ObservationConfig,
    },
};
use std::error::Error;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    let config = match Config::from_args() {
        Ok(config) => config,
        // help and version exit with 0, usage errors with 2
        Err(ConfigError::Cli(e)) => e.exit(),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(config.verbose);

    if let Err(e) = run(&config) {
        error!("Evaluation failed: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(config: &Config) -> Result<(), Box<dyn Error>> {
    let start = Instant::now();
    let options = &config.options;

    let grid = read_netcdf_grid(
        &config.ncf,
        &[options.variable.as_str()],
        &GridReaderConfig::default(),
    )?;

    let mut obs_config = ObservationConfig::default();
    if let Some(column) = &config.grdc_column {
        obs_config = obs_config.prefer_column(column);
    }
    let (mut records, failures) =
        read_grdc_folder(&config.folder, &HeaderConfig::default(), &obs_config)?;

    if let Some(selection) = &config.selection {
        let ids = read_selection_file(selection)?;
        info!("Selection lists {} stations", ids.len());
        records = select_stations(records, &ids);
    }
    if records.is_empty() {
        warn!("No stations to evaluate");
    }

    let stations: Vec<StationInput> = records.into_iter().map(StationInput::from).collect();
    let mut entries = match config.num_threads {
        Some(n) => evaluate_with_custom_threads(&grid, &stations, options, n)?,
        None => evaluate_stations_parallel(&grid, &stations, options),
    };

    // unreadable station files still get a row
    for (path, e) in failures {
        entries.push(BatchEntry {
            station_id: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            outcome: StationOutcome::Failed,
            report: None,
            error: Some(e.to_string()),
        });
    }
    entries.sort_by(|a, b| a.station_id.cmp(&b.station_id));

    write_outputs(&config.out, &entries)?;

    info!(
        "{} in {:.2}s",
        BatchSummary::from_entries(&entries),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn write_outputs(out: &Path, entries: &[BatchEntry]) -> Result<(), Box<dyn Error>> {
    std::fs::create_dir_all(out)?;

    for name in ["all_scores.csv", "scores.geojson"] {
        let mut writer = create_writer_auto(&out.join(name))?;
        writer.write_entries(entries)?;
        writer.close()?;
    }

    for entry in entries {
        let Some(aligned) = entry.report.as_ref().and_then(|r| r.aligned.as_ref()) else {
            continue;
        };
        let path = out.join(&entry.station_id).join("evaluated_timeseries.csv");
        if let Err(e) = write_evaluated_timeseries(&path, aligned) {
            warn!("Station {}: could not write {}: {}", entry.station_id, path.display(), e);
        }
    }
    Ok(())
}
