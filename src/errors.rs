use std::path::PathBuf;
use thiserror::Error;

/// Fatal failures while reading or writing workbooks. Any of these aborts the
/// run before an output file is produced.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to open workbook {path}: {source}", path = .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },

    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("workbook has no worksheets")]
    NoSheets,

    #[error("worksheet '{0}' not found")]
    MissingSheet(String),

    #[error("worksheet '{0}' has no header row")]
    MissingHeader(String),

    #[error("row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error("failed to write workbook: {0}")]
    Write(#[from] rust_xlsxwriter::XlsxError),

    #[error("failed to serialize leveling areas: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to write CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
