use std::{collections::HashMap, path::Path};

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use tracing::warn;

use crate::errors::EnrichResult;
use crate::store::open_sqlite;

const CACHE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS vicinity_cache (
        vkey TEXT PRIMARY KEY,
        response_json TEXT NOT NULL,
        last_used INTEGER NOT NULL
    );
";

/// Vicinity key -> raw API response, held in memory for the run and in
/// SQLite across runs. The in-memory tier is always a subset of the durable
/// tier as of the last read or write made through this handle.
pub struct VicinityCache {
    conn: Connection,
    memory: HashMap<String, Value>,
}

impl VicinityCache {
    pub fn open(path: &Path) -> EnrichResult<Self> {
        Ok(Self {
            conn: open_sqlite(path, CACHE_SCHEMA)?,
            memory: HashMap::new(),
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> EnrichResult<Self> {
        Ok(Self {
            conn: crate::store::open_in_memory(CACHE_SCHEMA)?,
            memory: HashMap::new(),
        })
    }

    pub fn get(&mut self, vkey: &str) -> EnrichResult<Option<Value>> {
        if let Some(hit) = self.memory.get(vkey) {
            return Ok(Some(hit.clone()));
        }

        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT response_json FROM vicinity_cache WHERE vkey = ?1",
                params![vkey],
                |row| row.get(0),
            )
            .optional()?;
        let Some(stored) = stored else {
            return Ok(None);
        };

        let response: Value = match serde_json::from_str(&stored) {
            Ok(value) => value,
            Err(err) => {
                warn!(vkey, %err, "ignoring undecodable cached response");
                return Ok(None);
            }
        };

        self.conn.execute(
            "UPDATE vicinity_cache SET last_used = strftime('%s', 'now') WHERE vkey = ?1",
            params![vkey],
        )?;
        self.memory.insert(vkey.to_string(), response.clone());
        Ok(Some(response))
    }

    pub fn put(&mut self, vkey: &str, response: &Value) -> EnrichResult<()> {
        let payload = serde_json::to_string(response)?;
        self.conn.execute(
            "
            INSERT INTO vicinity_cache (vkey, response_json, last_used)
            VALUES (?1, ?2, strftime('%s', 'now'))
            ON CONFLICT(vkey) DO UPDATE SET
                response_json = excluded.response_json,
                last_used = excluded.last_used
            ",
            params![vkey, payload],
        )?;
        self.memory.insert(vkey.to_string(), response.clone());
        Ok(())
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn durable_len(&self) -> EnrichResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vicinity_cache", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    #[cfg(test)]
    pub(crate) fn drop_durable_table(&self) {
        self.conn.execute_batch("DROP TABLE vicinity_cache").unwrap();
    }

    #[cfg(test)]
    fn last_used(&self, vkey: &str) -> Option<i64> {
        self.conn
            .query_row(
                "SELECT last_used FROM vicinity_cache WHERE vkey = ?1",
                params![vkey],
                |row| row.get(0),
            )
            .optional()
            .unwrap()
    }
}
