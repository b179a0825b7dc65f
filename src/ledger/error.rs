use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid fields: {found:?}, expect: {expected:?}")]
    HeaderMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("schema requires at least 3 fields, got {0:?}")]
    SchemaTooNarrow(Vec<String>),

    #[error("no data rows in {0}")]
    EmptyLedger(String),

    #[error("line {line}: expected {expected} fields, got {got}")]
    RowShape {
        line: usize,
        expected: usize,
        got: usize,
    },

    #[error("no record {identifier} in {path}")]
    NotFound { identifier: String, path: String },

    #[error("invalid field {field}, only {known:?} permitted")]
    UnknownField { field: String, known: Vec<String> },

    #[error("timestamp {value} does not match format {format}")]
    BadTimestamp { value: String, format: String },

    #[error("missing {field} in record data")]
    MissingField { field: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
