// errors.rs
use std::path::PathBuf;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("{0}")]
    Format(String),

    #[error("Unsupported file format '{0}'. Upload CSV or XLSX")]
    UnsupportedFormat(String),

    #[error("No usable rows in input: {0}")]
    EmptyData(String),

    #[error("Unparseable date {value:?} on row {row}")]
    DateParse { row: usize, value: String },

    #[error("Unparseable price {value:?} on row {row}")]
    NumberParse { row: usize, value: String },

    #[error("Computation failed: {0}")]
    Computation(String),

    #[error("Failed to write chart to {}: {source}", path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input has {rows} rows, limit is {limit}")]
    InputTooLarge { rows: usize, limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task failed: {0}")]
    TaskError(#[from] JoinError),

    #[error("Analysis step failed: {0}")]
    AnalysisStep(String),
}

impl AnalysisError {
    /// Row-level problems that ingestion recovers from by dropping the row.
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            AnalysisError::DateParse { .. } | AnalysisError::NumberParse { .. }
        )
    }

    /// Problems with the request itself rather than with the analysis.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AnalysisError::UnsupportedFormat(_))
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
