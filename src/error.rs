//! Typed error surfaces for the pipeline stages.
//!
//! Library modules return these concrete enums rather than `anyhow::Error`;
//! `anyhow` is reserved for the binary entry points (`main.rs`,
//! `bin/net_logger.rs`).

use thiserror::Error;

/// Errors a preprocess-stage parse can fail with. All of these are caught
/// by the stage itself and turned into an `error`-channel line plus a log;
/// none escape as a propagated `Result::Err`.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("datapoint has no parseable numeric fields")]
    EmptyDatapoint,

    #[error("malformed legacy CSV line: {0}")]
    MalformedCsv(String),

    #[error("negative legacy field {field}: {value}")]
    NegativeField { field: &'static str, value: i64 },
}

/// Failures reading or writing the append-only history file or the weight
/// file. Caught at the call site and downgraded to a log line; the
/// in-memory model or history position is left untouched.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("history file length {len} is not a multiple of the record size {record_size}")]
    CorruptHistory { len: u64, record_size: u64 },
}

/// Failures loading a persisted weight file into a configured MLP shape.
/// Always caught by the loader; the model falls back to random init.
#[derive(Debug, Error)]
pub enum WeightLoadError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("weight file truncated while reading {0}")]
    Truncated(&'static str),

    #[error(
        "output layer shape mismatch: file has {file_neurons} neurons with input length {file_input_len}, \
         expected {expected_neurons} neurons with input length {expected_input_len}"
    )]
    OutputShapeMismatch {
        file_neurons: u64,
        file_input_len: u64,
        expected_neurons: usize,
        expected_input_len: usize,
    },
}
