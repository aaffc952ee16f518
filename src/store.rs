use std::{path::Path, time::Duration};

use rusqlite::Connection;
use tracing::debug;

use crate::common::ensure_parent_dir;
use crate::errors::EnrichResult;

/// Opens (or creates) a SQLite store and applies its schema.
pub fn open_sqlite(path: &Path, schema: &str) -> EnrichResult<Connection> {
    ensure_parent_dir(path)?;
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        ",
    )?;
    conn.execute_batch(schema)?;
    debug!(path = %path.display(), "opened sqlite store");
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory(schema: &str) -> EnrichResult<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(schema)?;
    Ok(conn)
}
