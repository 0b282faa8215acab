use chrono::{DateTime, Duration, Utc};
use router_core::CacheEntry;
use rusqlite::{OptionalExtension, params};

use crate::LedgerTx;
use crate::error::Result;
use crate::helpers::{CACHE_COLUMNS, format_ts, row_to_cache_row};

impl LedgerTx<'_> {
    pub fn get_cache_entry(&self, cache_key: &str) -> Result<Option<CacheEntry>> {
        let row = self
            .tx
            .query_row(
                &format!("SELECT {CACHE_COLUMNS} FROM cache_entries WHERE cache_key = ?1"),
                [cache_key],
                row_to_cache_row,
            )
            .optional()?;
        match row {
            Some(row) => Ok(Some(row.into_entry()?)),
            None => Ok(None),
        }
    }

    /// Inserts or replaces the entry stored under `entry.cache_key`.
    pub fn store_cache_entry(&self, entry: &CacheEntry) -> Result<()> {
        self.tx.execute(
            r#"
            INSERT INTO cache_entries (
              cache_key, model_name, workflow, output, latency_ms, cost, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(cache_key) DO UPDATE SET
              model_name = excluded.model_name,
              workflow = excluded.workflow,
              output = excluded.output,
              latency_ms = excluded.latency_ms,
              cost = excluded.cost,
              created_at = excluded.created_at
            "#,
            params![
                entry.cache_key,
                entry.model_name,
                entry.workflow,
                entry.output,
                entry.latency_ms,
                entry.cost,
                format_ts(entry.created_at)
            ],
        )?;
        Ok(())
    }

    /// Deletes `model`'s entries older than `ttl` as of `now`.
    pub fn purge_expired_cache(
        &self,
        model: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<usize> {
        let cutoff = now - ttl;
        let removed = self.tx.execute(
            "DELETE FROM cache_entries WHERE model_name = ?1 AND created_at < ?2",
            params![model, format_ts(cutoff)],
        )?;
        Ok(removed)
    }

    pub fn cache_size(&self, model: &str) -> Result<u64> {
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE model_name = ?1",
            [model],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn cache_size_total(&self) -> Result<u64> {
        let count: i64 = self
            .tx
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Removes `model`'s oldest entry by `created_at` and returns its key.
    pub fn pop_oldest_cache_entry(&self, model: &str) -> Result<Option<String>> {
        let oldest = self
            .tx
            .query_row(
                r#"
                SELECT cache_key FROM cache_entries
                WHERE model_name = ?1
                ORDER BY created_at ASC, rowid ASC
                LIMIT 1
                "#,
                [model],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        if let Some(cache_key) = &oldest {
            self.tx
                .execute("DELETE FROM cache_entries WHERE cache_key = ?1", [cache_key])?;
        }
        Ok(oldest)
    }

    pub fn clear_cache(&self) -> Result<usize> {
        Ok(self.tx.execute("DELETE FROM cache_entries", [])?)
    }
}
