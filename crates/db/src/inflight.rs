use chrono::{DateTime, Utc};
use router_core::{GenerationOutcome, InflightRecord, InflightStatus};
use rusqlite::{OptionalExtension, params};

use crate::LedgerTx;
use crate::error::Result;
use crate::helpers::{INFLIGHT_COLUMNS, format_ts, row_to_inflight_row};

impl LedgerTx<'_> {
    pub fn get_inflight(&self, cache_key: &str) -> Result<Option<InflightRecord>> {
        let row = self
            .tx
            .query_row(
                &format!("SELECT {INFLIGHT_COLUMNS} FROM inflight_entries WHERE cache_key = ?1"),
                [cache_key],
                row_to_inflight_row,
            )
            .optional()?;
        match row {
            Some(row) => Ok(Some(row.into_record()?)),
            None => Ok(None),
        }
    }

    /// Starts (or restarts) a flight for `cache_key` in the `waiting` state.
    ///
    /// Clears any stored error but keeps the last completed output and its
    /// `completed_at`, which callers that joined an earlier flight may still
    /// be owed.
    pub fn create_inflight(
        &self,
        cache_key: &str,
        model: &str,
        workflow: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.tx.execute(
            r#"
            INSERT INTO inflight_entries (cache_key, status, model_name, workflow, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(cache_key) DO UPDATE SET
              status = excluded.status,
              model_name = excluded.model_name,
              workflow = excluded.workflow,
              error = NULL,
              updated_at = excluded.updated_at
            "#,
            params![
                cache_key,
                InflightStatus::Waiting.as_str(),
                model,
                workflow,
                format_ts(now)
            ],
        )?;
        Ok(())
    }

    /// Returns `false` when the record no longer exists.
    pub fn mark_inflight_success(
        &self,
        cache_key: &str,
        outcome: &GenerationOutcome,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let ts = format_ts(now);
        let updated = self.tx.execute(
            r#"
            UPDATE inflight_entries SET
              status = ?2,
              output = ?3,
              latency_ms = ?4,
              cost = ?5,
              error = NULL,
              updated_at = ?6,
              completed_at = ?6
            WHERE cache_key = ?1
            "#,
            params![
                cache_key,
                InflightStatus::Success.as_str(),
                outcome.output,
                outcome.latency_ms,
                outcome.cost,
                ts
            ],
        )?;
        Ok(updated > 0)
    }

    /// Records a failed attempt. The last completed output is left untouched.
    pub fn mark_inflight_error(
        &self,
        cache_key: &str,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = self.tx.execute(
            r#"
            UPDATE inflight_entries SET
              status = ?2,
              error = ?3,
              updated_at = ?4
            WHERE cache_key = ?1
            "#,
            params![
                cache_key,
                InflightStatus::Error.as_str(),
                message,
                format_ts(now)
            ],
        )?;
        Ok(updated > 0)
    }

    pub fn clear_single_inflight(&self, cache_key: &str) -> Result<bool> {
        let removed = self.tx.execute(
            "DELETE FROM inflight_entries WHERE cache_key = ?1",
            [cache_key],
        )?;
        Ok(removed > 0)
    }

    pub fn clear_inflight(&self) -> Result<usize> {
        Ok(self.tx.execute("DELETE FROM inflight_entries", [])?)
    }

    pub fn list_inflight(&self) -> Result<Vec<InflightRecord>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {INFLIGHT_COLUMNS} FROM inflight_entries ORDER BY updated_at DESC"
        ))?;
        let rows = stmt
            .query_map([], row_to_inflight_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(row.into_record()?);
        }
        Ok(records)
    }
}
