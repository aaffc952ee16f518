use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::{now_timestamp, write_atomically};
use crate::errors::{EnrichError, EnrichResult};

/// Row index used for errors that do not belong to an input row.
pub const RUN_LEVEL_ROW: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub row: i64,
    pub error: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub last_processed_input_row: i64,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            last_processed_input_row: RUN_LEVEL_ROW,
            errors: Vec::new(),
        }
    }
}

/// Durable record of the last completed input row. Every mutation is
/// persisted before returning, so a crash never loses a completed row.
pub struct ProgressLedger {
    path: PathBuf,
    state: ProgressState,
}

impl ProgressLedger {
    /// Loads the ledger at `path`; a missing file is a fresh ledger. An
    /// unreadable file is moved aside to `<stem>.corrupt.json` and replaced by
    /// a fresh ledger that records the corruption.
    pub fn load(path: &Path) -> EnrichResult<Self> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                state: ProgressState::default(),
            });
        }

        let parsed = fs::read_to_string(path)
            .map_err(|err| err.to_string())
            .and_then(|text| {
                serde_json::from_str::<ProgressState>(&text).map_err(|err| err.to_string())
            });

        match parsed {
            Ok(state) => Ok(Self {
                path: path.to_path_buf(),
                state,
            }),
            Err(reason) => {
                let corrupt_path = corrupt_path_for(path);
                fs::rename(path, &corrupt_path)?;
                let corruption = EnrichError::ProgressCorruption {
                    path: path.to_path_buf(),
                    reason,
                };
                warn!(
                    moved_to = %corrupt_path.display(),
                    "{corruption}; restarting from the first row"
                );
                let mut ledger = Self {
                    path: path.to_path_buf(),
                    state: ProgressState::default(),
                };
                ledger.record_error(RUN_LEVEL_ROW, &format!("Corrupt progress: {corruption}"))?;
                Ok(ledger)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn last_processed(&self) -> Option<usize> {
        usize::try_from(self.state.last_processed_input_row).ok()
    }

    /// First row that has not been processed yet.
    pub fn next_row(&self) -> usize {
        self.last_processed().map_or(0, |last| last + 1)
    }

    pub fn record_error(&mut self, row: i64, message: &str) -> EnrichResult<()> {
        self.state.errors.push(ErrorRecord {
            row,
            error: message.to_string(),
            time: now_timestamp(),
        });
        self.save()
    }

    pub fn mark_processed(&mut self, row: usize) -> EnrichResult<()> {
        self.state.last_processed_input_row = row as i64;
        self.save()
    }

    pub fn save(&self) -> EnrichResult<()> {
        let encoded = serde_json::to_vec_pretty(&self.state)?;
        write_atomically(&self.path, &encoded)
    }
}

fn corrupt_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|x| x.to_str())
        .unwrap_or("progress_log");
    path.with_file_name(format!("{stem}.corrupt.json"))
}
