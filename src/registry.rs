use std::path::Path;

use rusqlite::{Connection, params};

use crate::errors::EnrichResult;
use crate::store::open_sqlite;

const REGISTRY_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS places_seen (
        key TEXT PRIMARY KEY,
        first_seen_at INTEGER NOT NULL
    );
";

/// Durable set of place identity keys already written to the primary output.
pub struct PlaceRegistry {
    conn: Connection,
}

impl PlaceRegistry {
    pub fn open(path: &Path) -> EnrichResult<Self> {
        Ok(Self {
            conn: open_sqlite(path, REGISTRY_SCHEMA)?,
        })
    }

    #[cfg(test)]
    pub fn in_memory() -> EnrichResult<Self> {
        Ok(Self {
            conn: crate::store::open_in_memory(REGISTRY_SCHEMA)?,
        })
    }

    /// Claims `key` for emission. Returns `true` only for the first claim ever
    /// made against this store; the primary key constraint decides, so
    /// concurrent claimers sharing the file cannot both win.
    pub fn try_claim(&self, key: &str) -> EnrichResult<bool> {
        let inserted = self.conn.execute(
            "
            INSERT INTO places_seen (key, first_seen_at)
            VALUES (?1, strftime('%s', 'now'))
            ON CONFLICT(key) DO NOTHING
            ",
            params![key],
        )?;
        Ok(inserted == 1)
    }

    #[cfg(test)]
    pub(crate) fn drop_table(&self) {
        self.conn.execute_batch("DROP TABLE places_seen").unwrap();
    }

    pub fn claimed_count(&self) -> EnrichResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM places_seen", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}
