use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Station,
    BusStop,
    Arrival,
    Departure,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Station => "station",
            RecordKind::BusStop => "bus stop",
            RecordKind::Arrival => "arrival at station",
            RecordKind::Departure => "departure from bus stop",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid time {0:?}, expected HH:MM:SS")]
pub struct ParseTimeError(pub String);

/// Failures of the transfer computation itself.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("Missing {field} for {kind} {id:?}")]
    MissingDataError {
        kind: RecordKind,
        id: String,
        field: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfigError(String),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    MatchError(#[from] MatchError),
    #[error("No service found for {0}; it might be a holiday or non-service day")]
    NoServiceError(NaiveDate),
    #[error("GTFS feed is missing required table {0}")]
    MissingTableError(String),
    #[error("Malformed GTFS feed: {0}")]
    MalformedFeedError(String),
    #[error("Failed to read or write file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to read or write CSV: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Failed to read GTFS archive: {0}")]
    ZipError(#[from] zip::result::ZipError),
    #[error("Failed to download GTFS feed: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("Failed to write JSON: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Failed to read configuration file: {0}")]
    ConfigFileError(#[from] config::ConfigError),
}
