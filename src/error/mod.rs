mod bq_error;
mod parser;

use thiserror::Error;

pub use bq_error::{BigQueryError, QueryErrorLocation};
pub use parser::{parse_bq_error, ErrorContext};

#[derive(Error, Debug)]
pub enum RowDriftError {
    #[error("BigQuery error: {0}")]
    BigQuery(#[from] BigQueryError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Store failure: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigFileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RowDriftError {
    pub fn validation(message: impl Into<String>) -> Self {
        RowDriftError::Validation(message.into())
    }

    /// True for failures raised by a ledger, audit or snapshot backend.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, RowDriftError::Store(_) | RowDriftError::BigQuery(_))
    }
}

pub type Result<T> = std::result::Result<T, RowDriftError>;
