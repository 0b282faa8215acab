use chrono::{DateTime, SecondsFormat, Utc};
use router_core::{CacheEntry, InflightRecord, InflightStatus};
use rusqlite::Row;

use crate::error::{LedgerError, Result};

/// Fixed-width UTC timestamps so that lexical order in SQL matches time order.
pub(crate) fn format_ts(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

pub(crate) fn parse_optional_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_ts).transpose()
}

pub(crate) struct CacheRow {
    cache_key: String,
    model_name: String,
    workflow: String,
    output: String,
    latency_ms: f64,
    cost: f64,
    created_at: String,
}

pub(crate) const CACHE_COLUMNS: &str =
    "cache_key, model_name, workflow, output, latency_ms, cost, created_at";

pub(crate) fn row_to_cache_row(row: &Row<'_>) -> rusqlite::Result<CacheRow> {
    Ok(CacheRow {
        cache_key: row.get(0)?,
        model_name: row.get(1)?,
        workflow: row.get(2)?,
        output: row.get(3)?,
        latency_ms: row.get(4)?,
        cost: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl CacheRow {
    pub(crate) fn into_entry(self) -> Result<CacheEntry> {
        Ok(CacheEntry {
            created_at: parse_ts(&self.created_at)?,
            cache_key: self.cache_key,
            model_name: self.model_name,
            workflow: self.workflow,
            output: self.output,
            latency_ms: self.latency_ms,
            cost: self.cost,
        })
    }
}

pub(crate) struct InflightRow {
    cache_key: String,
    status: String,
    model_name: String,
    workflow: String,
    output: Option<String>,
    latency_ms: Option<f64>,
    cost: Option<f64>,
    error: Option<String>,
    updated_at: String,
    completed_at: Option<String>,
}

pub(crate) const INFLIGHT_COLUMNS: &str = "cache_key, status, model_name, workflow, output, \
     latency_ms, cost, error, updated_at, completed_at";

pub(crate) fn row_to_inflight_row(row: &Row<'_>) -> rusqlite::Result<InflightRow> {
    Ok(InflightRow {
        cache_key: row.get(0)?,
        status: row.get(1)?,
        model_name: row.get(2)?,
        workflow: row.get(3)?,
        output: row.get(4)?,
        latency_ms: row.get(5)?,
        cost: row.get(6)?,
        error: row.get(7)?,
        updated_at: row.get(8)?,
        completed_at: row.get(9)?,
    })
}

impl InflightRow {
    pub(crate) fn into_record(self) -> Result<InflightRecord> {
        let status = self
            .status
            .parse::<InflightStatus>()
            .map_err(LedgerError::InvalidStatus)?;
        Ok(InflightRecord {
            status,
            updated_at: parse_ts(&self.updated_at)?,
            completed_at: parse_optional_ts(self.completed_at)?,
            cache_key: self.cache_key,
            model_name: self.model_name,
            workflow: self.workflow,
            output: self.output,
            latency_ms: self.latency_ms,
            cost: self.cost,
            error: self.error,
        })
    }
}
