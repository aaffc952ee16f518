use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type EnrichResult<T> = Result<T, EnrichError>;

/// Failures of the durable state, the input table, and the output sinks.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("cannot read input {path}: {reason}")]
    InputRead { path: PathBuf, reason: String },
    #[error("input is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("progress ledger {path} is unreadable: {reason}")]
    ProgressCorruption { path: PathBuf, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Transport and validation failures of a single places API attempt.
#[derive(Debug, Error)]
pub enum PlacesError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("places API returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response structure: {0}")]
    InvalidResponse(String),
}

/// Outcome of a fetch that produced no usable response.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("places API failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
    #[error("no cached response for {vkey} and API calls are disabled")]
    Offline { vkey: String },
    #[error("live API call budget of {budget} reached")]
    BudgetExhausted { budget: usize },
    #[error("vicinity cache lookup failed: {0}")]
    Cache(#[source] EnrichError),
}

/// Why a single input row produced no output batch.
#[derive(Debug, Error)]
pub enum RowError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("row processing failed: {0}")]
    Processing(#[from] EnrichError),
}
