use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::Local;
use tracing::warn;

use crate::errors::EnrichResult;

pub fn delete_if_exists(path: &Path) -> EnrichResult<bool> {
    if path.exists() {
        fs::remove_file(path)?;
        return Ok(true);
    }
    Ok(false)
}

pub fn ensure_parent_dir(path: &Path) -> EnrichResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Sibling path with `suffix` appended to the full file name.
pub fn sibling_with_suffix(path: &Path, suffix: &str, fallback_name: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or(fallback_name);
    path.with_file_name(format!("{file_name}{suffix}"))
}

/// Writes to `<file>.tmp` first and renames over the target.
pub fn write_atomically(path: &Path, contents: &[u8]) -> EnrichResult<()> {
    ensure_parent_dir(path)?;
    let tmp_path = sibling_with_suffix(path, ".tmp", "state");
    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Sets `shutdown_requested` on the first Ctrl-C so the run can stop after
/// the current row.
pub fn install_ctrlc_handler(shutdown_requested: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let was_set = shutdown_requested.swap(true, Ordering::SeqCst);
            if !was_set {
                warn!("received Ctrl-C; finishing the current row, saving progress, then exiting");
            }
        }
    });
}

pub fn now_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn parse_coordinate(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn truncate_for_log(text: &str) -> String {
    let trimmed = text.trim();
    let max_len = 300usize;
    if trimmed.len() <= max_len {
        return trimmed.to_string();
    }
    let mut cut = max_len;
    while !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &trimmed[..cut])
}
