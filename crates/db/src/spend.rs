use chrono::{DateTime, Utc};
use router_core::{LatencyRecord, SpendRecord};
use rusqlite::{OptionalExtension, params};

use crate::LedgerTx;
use crate::error::Result;
use crate::helpers::{format_ts, parse_ts};

impl LedgerTx<'_> {
    /// Cumulative spend for `model`; zero when nothing has been recorded.
    pub fn get_spend(&self, model: &str) -> Result<f64> {
        let cost = self
            .tx
            .query_row(
                "SELECT cost FROM spend WHERE model_name = ?1",
                [model],
                |row| row.get::<_, f64>(0),
            )
            .optional()?;
        Ok(cost.unwrap_or(0.0))
    }

    pub fn set_spend(&self, model: &str, cost: f64) -> Result<()> {
        self.tx.execute(
            r#"
            INSERT INTO spend (model_name, cost, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(model_name) DO UPDATE SET
              cost = excluded.cost,
              updated_at = excluded.updated_at
            "#,
            params![model, cost, format_ts(Utc::now())],
        )?;
        Ok(())
    }

    pub fn clear_spend(&self, model: &str) -> Result<bool> {
        let removed = self
            .tx
            .execute("DELETE FROM spend WHERE model_name = ?1", [model])?;
        Ok(removed > 0)
    }

    pub fn clear_all_spend(&self) -> Result<usize> {
        Ok(self.tx.execute("DELETE FROM spend", [])?)
    }

    pub fn list_spend(&self) -> Result<Vec<SpendRecord>> {
        let mut stmt = self
            .tx
            .prepare("SELECT model_name, cost FROM spend ORDER BY model_name ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SpendRecord {
                    model_name: row.get(0)?,
                    cost: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_latency(&self, model: &str) -> Result<Option<LatencyRecord>> {
        let row = self
            .tx
            .query_row(
                "SELECT model_name, latency_ms, updated_at FROM latency WHERE model_name = ?1",
                [model],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((model_name, latency_ms, updated_at)) => Ok(Some(LatencyRecord {
                model_name,
                latency_ms,
                updated_at: parse_ts(&updated_at)?,
            })),
            None => Ok(None),
        }
    }

    pub fn set_latency(&self, model: &str, latency_ms: f64, now: DateTime<Utc>) -> Result<()> {
        self.tx.execute(
            r#"
            INSERT INTO latency (model_name, latency_ms, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(model_name) DO UPDATE SET
              latency_ms = excluded.latency_ms,
              updated_at = excluded.updated_at
            "#,
            params![model, latency_ms, format_ts(now)],
        )?;
        Ok(())
    }

    pub fn clear_latency(&self, model: &str) -> Result<bool> {
        let removed = self
            .tx
            .execute("DELETE FROM latency WHERE model_name = ?1", [model])?;
        Ok(removed > 0)
    }

    pub fn clear_all_latency(&self) -> Result<usize> {
        Ok(self.tx.execute("DELETE FROM latency", [])?)
    }

    pub fn list_latency(&self) -> Result<Vec<LatencyRecord>> {
        let mut stmt = self.tx.prepare(
            "SELECT model_name, latency_ms, updated_at FROM latency ORDER BY model_name ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut records = Vec::with_capacity(rows.len());
        for (model_name, latency_ms, updated_at) in rows {
            records.push(LatencyRecord {
                model_name,
                latency_ms,
                updated_at: parse_ts(&updated_at)?,
            });
        }
        Ok(records)
    }
}
