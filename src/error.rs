use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CollidbError {
    #[error("invalid query: {0}")]
    Keyword(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("could not retrieve data: HTTP {status} ({reason}) returned from {url}")]
    Status {
        status: u16,
        reason: String,
        url: String,
    },

    #[error("malformed manifest: {0}")]
    ManifestFormat(String),

    #[error("failed to load dataset {pk}: {message}")]
    DatasetLoad { pk: i64, message: String },

    #[error("dataset {0} is not loaded in this collection")]
    DatasetNotLoaded(i64),

    #[error("no datasets selected for grouped operation")]
    EmptyGroup,

    #[error("grouped datasets disagree on {property} (dataset {pk})")]
    PlotConsistency { property: &'static str, pk: i64 },

    #[error("cannot convert column {column} to {to_units}: {message}")]
    UnitConversion {
        column: String,
        to_units: String,
        message: String,
    },

    #[error("dataset {pk} failed validation: {message}")]
    Validation { pk: i64, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
