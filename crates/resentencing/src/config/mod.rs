use chrono::{Local, NaiveDate};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEMOGRAPHICS_FILE: &str = "demographics.csv";
pub const CURRENT_COMMITMENTS_FILE: &str = "currentcommitments.csv";
pub const PRIOR_COMMITMENTS_FILE: &str = "priorcommitments.csv";
pub const CRITERIA_DIR: &str = "Criteria";
pub const CRITERIA_FILE: &str = "sorting_criteria.csv";

/// Distinguishes runtime behavior for different stages of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for an evaluation run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub data: DataConfig,
    pub as_of: Option<NaiveDate>,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("RESENTENCING_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let data_path = env::var("RESENTENCING_DATA_PATH").unwrap_or_else(|_| "data".to_string());
        let data = DataConfig {
            data_path: PathBuf::from(data_path),
            county: non_empty_var("RESENTENCING_COUNTY"),
            month: non_empty_var("RESENTENCING_MONTH"),
            output_path: non_empty_var("RESENTENCING_OUTPUT_PATH").map(PathBuf::from),
        };

        let as_of = non_empty_var("RESENTENCING_AS_OF")
            .map(|value| parse_as_of(&value))
            .transpose()?;

        let log_level = env::var("RESENTENCING_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            data,
            as_of,
            telemetry: TelemetryConfig { log_level },
        })
    }

    /// Evaluation date; today when none is configured.
    pub fn as_of_or_today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Local::now().date_naive())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn parse_as_of(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|source| {
        ConfigError::InvalidAsOf {
            value: value.to_string(),
            source,
        }
    })
}

/// Where the county exports live.
#[derive(Debug, Clone)]
pub struct DataConfig {
    pub data_path: PathBuf,
    pub county: Option<String>,
    pub month: Option<String>,
    pub output_path: Option<PathBuf>,
}

impl DataConfig {
    pub fn location(&self) -> DataLocation {
        let mut county_dir = self.data_path.clone();
        if let Some(county) = &self.county {
            county_dir.push(county);
        }

        let mut input_dir = county_dir.clone();
        if let Some(month) = &self.month {
            input_dir.push(month);
        }

        let output_dir = self
            .output_path
            .clone()
            .unwrap_or_else(|| input_dir.clone());

        DataLocation {
            criteria_path: county_dir.join(CRITERIA_DIR).join(CRITERIA_FILE),
            input_dir,
            output_dir,
        }
    }
}

/// Resolved file locations for one county and month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLocation {
    input_dir: PathBuf,
    criteria_path: PathBuf,
    output_dir: PathBuf,
}

impl DataLocation {
    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn demographics_path(&self) -> PathBuf {
        self.input_dir.join(DEMOGRAPHICS_FILE)
    }

    pub fn current_commitments_path(&self) -> PathBuf {
        self.input_dir.join(CURRENT_COMMITMENTS_FILE)
    }

    pub fn prior_commitments_path(&self) -> PathBuf {
        self.input_dir.join(PRIOR_COMMITMENTS_FILE)
    }

    pub fn criteria_path(&self) -> &Path {
        &self.criteria_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidAsOf {
        value: String,
        source: chrono::ParseError,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidAsOf { value, .. } => {
                write!(f, "RESENTENCING_AS_OF '{value}' must be a YYYY-MM-DD date")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidAsOf { source, .. } => Some(source),
        }
    }
}
