//! Log output for screening runs.
//!
//! Events go to stderr so that `--json` output on stdout stays machine readable.

use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::{LevelFilter, ParseError};
use tracing_subscriber::EnvFilter;

/// Target shared by the library and the `resentencing` binary.
const CRATE_TARGET: &str = "resentencing";

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(f, "RESENTENCING_LOG_LEVEL '{value}' is not a level or filter directive")
            }
            TelemetryError::Subscriber(err) => {
                write!(f, "screening log output already initialised: {err}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// A bare level such as `debug` applies to screening events only; dependencies stay at
/// `warn`. Anything else is taken as a complete filter.
pub fn directives(log_level: &str) -> String {
    let level = log_level.trim();
    match level.parse::<LevelFilter>() {
        Ok(_) => format!("warn,{CRATE_TARGET}={level}"),
        Err(_) => level.to_string(),
    }
}

/// Filter from `RUST_LOG` when set, otherwise from the configured level.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(directives(&config.log_level)).map_err(|source| {
        TelemetryError::EnvFilter {
            value: config.log_level.clone(),
            source,
        }
    })
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = env_filter(config)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}
