use crate::align::Statistic;
use crate::time_utils::Period;
use clap::{Arg, ArgMatches, Command};
use std::ffi::OsString;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Grid spacing of a 30 arc-second product in degrees.
pub const DEFAULT_DEGREES_PER_CELL: f64 = 0.008333333;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid command line: {0}")]
    Cli(#[from] clap::Error),

    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Path does not exist: {0}")]
    MissingPath(PathBuf),

    #[error("{0}")]
    Invalid(String),
}

/// Parameters of the window refinement around the nearest cell.
#[derive(Clone, Debug, PartialEq)]
pub struct LocatorConfig {
    /// Window size in grid cells
    pub window_size: usize,
    /// Nominal grid spacing used to turn the window into degrees
    pub degrees_per_cell: f64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            degrees_per_cell: DEFAULT_DEGREES_PER_CELL,
        }
    }
}

impl LocatorConfig {
    /// Half-width of the search window in degrees.
    pub fn half_width_degrees(&self) -> f64 {
        self.window_size as f64 * self.degrees_per_cell
    }
}

/// When to refine the nearest cell with the window search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowSearch {
    Never,
    Always,
    /// Only for stations without user-corrected coordinates
    WhenUncorrected,
}

impl FromStr for WindowSearch {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" | "off" => Ok(WindowSearch::Never),
            "always" | "on" => Ok(WindowSearch::Always),
            "uncorrected" | "when-uncorrected" | "auto" => Ok(WindowSearch::WhenUncorrected),
            other => Err(ConfigError::InvalidValue {
                name: "window-search",
                value: other.to_string(),
            }),
        }
    }
}

/// Options for evaluating a single station.
#[derive(Clone, Debug)]
pub struct EvaluationOptions {
    /// Variable read from the gridded dataset
    pub variable: String,
    pub locator: LocatorConfig,
    pub window_search: WindowSearch,
    /// Resample both series to this period before aligning
    pub time_scale: Option<Period>,
    pub statistic: Statistic,
    /// Minimum number of complete pairs before scoring
    pub min_points: usize,
    /// Decimal places kept in reported scores
    pub decimals: u32,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            variable: "discharge".to_string(),
            locator: LocatorConfig::default(),
            window_search: WindowSearch::WhenUncorrected,
            time_scale: None,
            statistic: Statistic::Mean,
            min_points: 2,
            decimals: 3,
        }
    }
}

impl EvaluationOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.variable.trim().is_empty() {
            return Err(ConfigError::Invalid("Variable name must not be empty".to_string()));
        }
        if self.locator.window_size == 0 && self.window_search != WindowSearch::Never {
            return Err(ConfigError::Invalid(
                "Window size must be at least one cell when window search is enabled".to_string(),
            ));
        }
        if self.locator.degrees_per_cell.is_nan() || self.locator.degrees_per_cell <= 0.0 {
            return Err(ConfigError::Invalid(
                "Degrees per cell must be positive".to_string(),
            ));
        }
        if self.decimals > 12 {
            return Err(ConfigError::Invalid(format!(
                "Too many decimals requested: {}",
                self.decimals
            )));
        }
        Ok(())
    }
}

/// Command line configuration of the `gridval` binary.
#[derive(Clone, Debug)]
pub struct Config {
    /// NetCDF file with simulated data
    pub ncf: PathBuf,
    /// Output directory
    pub out: PathBuf,
    /// Folder with GRDC station files
    pub folder: PathBuf,
    /// Optional file listing station ids to evaluate
    pub selection: Option<PathBuf>,
    /// Value column requested in the GRDC files
    pub grdc_column: Option<String>,
    pub options: EvaluationOptions,
    pub num_threads: Option<usize>,
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn from_args() -> Result<Self, ConfigError> {
        Self::from_arg_list(std::env::args_os())
    }

    pub fn from_arg_list<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let app = Command::new("gridval")
            .version("0.1.0")
            .about("Evaluate gridded model output against station observations")
            .subcommand_required(true)
            .subcommand(
                Command::new("grdc")
                    .about("Evaluate simulated discharge against GRDC stations")
                    .arg(
                        Arg::new("ncf")
                            .value_name("NCF")
                            .help("NetCDF file with simulated data")
                            .required(true),
                    )
                    .arg(
                        Arg::new("out")
                            .value_name("OUT")
                            .help("Output directory")
                            .required(true),
                    )
                    .arg(
                        Arg::new("folder")
                            .short('f')
                            .long("folder")
                            .value_name("DIR")
                            .help("Folder containing GRDC station files")
                            .required(true),
                    )
                    .arg(
                        Arg::new("var-name")
                            .short('v')
                            .long("var-name")
                            .value_name("NAME")
                            .help("Variable name in the NetCDF file")
                            .default_value("discharge"),
                    )
                    .arg(
                        Arg::new("grdc-column")
                            .short('c')
                            .long("grdc-column")
                            .value_name("COLUMN")
                            .help("Preferred value column in the GRDC files"),
                    )
                    .arg(
                        Arg::new("time-scale")
                            .short('t')
                            .long("time-scale")
                            .value_name("PERIOD")
                            .help("Resample both series to month, quarter or year"),
                    )
                    .arg(
                        Arg::new("stat-func")
                            .long("stat-func")
                            .value_name("STAT")
                            .help("Statistic used when resampling")
                            .value_parser(["mean", "max", "min", "sum"])
                            .default_value("mean"),
                    )
                    .arg(
                        Arg::new("window")
                            .short('w')
                            .long("window")
                            .value_name("CELLS")
                            .help("Window size in grid cells for refining station locations")
                            .default_value("5"),
                    )
                    .arg(
                        Arg::new("window-search")
                            .long("window-search")
                            .value_name("MODE")
                            .help("When to apply the window search")
                            .value_parser(["never", "always", "uncorrected"])
                            .default_value("uncorrected"),
                    )
                    .arg(
                        Arg::new("selection")
                            .short('s')
                            .long("selection")
                            .value_name("FILE")
                            .help("File with station ids to evaluate, one per line"),
                    )
                    .arg(
                        Arg::new("num-threads")
                            .short('j')
                            .long("num-threads")
                            .value_name("COUNT")
                            .help("Number of parallel threads"),
                    )
                    .arg(
                        Arg::new("verbose")
                            .long("verbose")
                            .help("Enable verbose output")
                            .action(clap::ArgAction::SetTrue),
                    ),
            );

        let matches = app
            .try_get_matches_from(args)
            .map_err(ConfigError::Cli)?;

        let sub = match matches.subcommand() {
            Some(("grdc", sub)) => sub,
            _ => return Err(ConfigError::MissingArgument("grdc")),
        };

        let ncf = PathBuf::from(required(sub, "ncf")?);
        let out = PathBuf::from(required(sub, "out")?);
        let folder = PathBuf::from(required(sub, "folder")?);
        let selection = sub.get_one::<String>("selection").map(PathBuf::from);
        let grdc_column = sub.get_one::<String>("grdc-column").cloned();

        let time_scale = sub
            .get_one::<String>("time-scale")
            .map(|s| s.parse::<Period>())
            .transpose()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let stat_func = required(sub, "stat-func")?;
        let statistic: Statistic = stat_func.parse().map_err(|_| ConfigError::InvalidValue {
            name: "stat-func",
            value: stat_func.clone(),
        })?;

        let window = required(sub, "window")?;
        let window_size: usize = window.parse().map_err(|_| ConfigError::InvalidValue {
            name: "window",
            value: window.clone(),
        })?;

        let window_search: WindowSearch = required(sub, "window-search")?.parse()?;

        let num_threads = match sub.get_one::<String>("num-threads") {
            Some(s) => Some(s.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                name: "num-threads",
                value: s.clone(),
            })?),
            None => None,
        };

        let options = EvaluationOptions {
            variable: required(sub, "var-name")?.clone(),
            locator: LocatorConfig {
                window_size,
                ..LocatorConfig::default()
            },
            window_search,
            time_scale,
            statistic,
            ..EvaluationOptions::default()
        };

        let config = Self {
            ncf,
            out,
            folder,
            selection,
            grdc_column,
            options,
            num_threads,
            verbose: sub.get_flag("verbose"),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.options.validate()?;

        if !self.ncf.is_file() {
            return Err(ConfigError::MissingPath(self.ncf.clone()));
        }
        if !self.folder.is_dir() {
            return Err(ConfigError::MissingPath(self.folder.clone()));
        }
        if let Some(selection) = &self.selection {
            if !selection.is_file() {
                return Err(ConfigError::MissingPath(selection.clone()));
            }
        }
        if self.num_threads == Some(0) {
            return Err(ConfigError::Invalid(
                "Number of threads must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn required<'a>(matches: &'a ArgMatches, id: &'static str) -> Result<&'a String, ConfigError> {
    matches
        .get_one::<String>(id)
        .ok_or(ConfigError::MissingArgument(id))
}
