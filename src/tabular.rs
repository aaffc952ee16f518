use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::warn;

use crate::common::ensure_parent_dir;
use crate::errors::{EnrichError, EnrichResult};

/// One input row; fields keep the input column order.
#[derive(Debug, Clone, PartialEq)]
pub struct InputRow {
    pub index: usize,
    fields: Vec<(String, String)>,
}

impl InputRow {
    pub fn new(index: usize, fields: Vec<(String, String)>) -> Self {
        Self { index, fields }
    }

    /// Value of `column`, empty when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
            .unwrap_or("")
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputTable {
    pub headers: Vec<String>,
    pub rows: Vec<InputRow>,
}

impl InputTable {
    pub fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|col| !self.headers.iter().any(|h| h == *col))
            .map(|col| col.to_string())
            .collect()
    }
}

/// Reads a CSV with a header row. Short rows are padded with empty strings.
pub fn read_rows(path: &Path) -> EnrichResult<InputTable> {
    let input_error = |reason: String| EnrichError::InputRead {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|err| input_error(err.to_string()))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| input_error(err.to_string()))?
        .iter()
        .map(|h| h.trim().trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|err| input_error(err.to_string()))?;
        let fields = headers
            .iter()
            .enumerate()
            .map(|(j, name)| (name.clone(), record.get(j).unwrap_or("").to_string()))
            .collect();
        rows.push(InputRow::new(index, fields));
    }

    Ok(InputTable { headers, rows })
}

/// Append-only CSV output with a fixed column set.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Creates the file with its header row when absent.
    pub fn ensure_with_header(path: &Path, columns: &[String]) -> EnrichResult<Self> {
        let has_content = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        if has_content {
            let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
            let existing = reader.headers()?.clone();
            if existing != StringRecord::from(columns.to_vec()) {
                warn!(
                    path = %path.display(),
                    "existing output header differs from the current column set; appending anyway"
                );
            }
        } else {
            ensure_parent_dir(path)?;
            let mut writer = WriterBuilder::new().from_path(path)?;
            writer.write_record(columns)?;
            writer.flush()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn append_rows(&self, rows: &[Vec<String>]) -> EnrichResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}
