#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{DateTime, Duration, TimeZone, Utc};
use router_core::{CacheEntry, GenerationOutcome};
use router_db::Ledger;
use tempfile::TempDir;

pub struct TestLedger {
    pub _dir: TempDir,
    pub ledger: Ledger,
    pub path: PathBuf,
}

pub fn setup_ledger() -> TestLedger {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("ledger.sqlite");
    let ledger = Ledger::open(&path).expect("open ledger");
    ledger.migrate().expect("migrate ledger");
    TestLedger {
        _dir: dir,
        ledger,
        path,
    }
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .expect("valid time")
}

pub fn make_entry(key: &str, model: &str, created_at: DateTime<Utc>) -> CacheEntry {
    CacheEntry {
        cache_key: key.to_string(),
        model_name: model.to_string(),
        workflow: "chat".to_string(),
        output: format!("output for {key}"),
        latency_ms: 42.5,
        cost: 0.125,
        created_at,
    }
}

pub fn entries_at_seconds(model: &str, count: usize) -> Vec<CacheEntry> {
    (0..count)
        .map(|index| {
            make_entry(
                &format!("{model}-key-{index}"),
                model,
                base_time() + Duration::seconds(index as i64),
            )
        })
        .collect()
}

pub fn make_outcome(output: &str) -> GenerationOutcome {
    GenerationOutcome {
        output: output.to_string(),
        latency_ms: 250.0,
        cost: 0.4,
    }
}
