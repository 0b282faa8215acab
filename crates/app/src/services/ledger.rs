use std::sync::Arc;

use router_core::{InflightRecord, ModelRegistry};
use router_db::Ledger;
use serde::Serialize;
use tracing::info;

use crate::error::Result;

/// Operator view of one configured model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStatus {
    pub name: String,
    pub spend: f64,
    pub spend_ceiling: Option<f64>,
    pub last_latency_ms: Option<f64>,
    pub latency_threshold_ms: Option<f64>,
    pub cache_entries: u64,
    pub eligible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSnapshot {
    pub models: Vec<ModelStatus>,
    pub cache_entries: u64,
    pub inflight: Vec<InflightRecord>,
}

/// Read and reset operations on the shared ledger.
#[derive(Clone)]
pub struct LedgerService {
    ledger: Arc<Ledger>,
    registry: Arc<ModelRegistry>,
}

impl LedgerService {
    pub fn new(ledger: Arc<Ledger>, registry: Arc<ModelRegistry>) -> Self {
        Self { ledger, registry }
    }

    /// Every configured model plus the global cache and inflight state,
    /// read in a single transaction. Eligibility uses the base routing.
    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        self.ledger.transaction(|tx| -> Result<LedgerSnapshot> {
            let mut models = Vec::with_capacity(self.registry.len());
            for model in self.registry.iter() {
                let routing = model.routing.base();
                let spend = tx.get_spend(&model.name)?;
                let last_latency_ms = tx
                    .get_latency(&model.name)?
                    .map(|record| record.latency_ms);
                models.push(ModelStatus {
                    name: model.name.clone(),
                    spend,
                    spend_ceiling: routing.spend_ceiling,
                    last_latency_ms,
                    latency_threshold_ms: routing.latency_threshold_ms,
                    cache_entries: tx.cache_size(&model.name)?,
                    eligible: routing.spend_allows(spend) && routing.latency_allows(last_latency_ms),
                });
            }
            Ok(LedgerSnapshot {
                models,
                cache_entries: tx.cache_size_total()?,
                inflight: tx.list_inflight()?,
            })
        })
    }

    /// Clears recorded spend for one model, or for all when `model` is `None`.
    pub fn reset_spend(&self, model: Option<&str>) -> Result<usize> {
        let cleared = self.ledger.transaction(|tx| -> Result<usize> {
            Ok(match model {
                Some(name) => usize::from(tx.clear_spend(name)?),
                None => tx.clear_all_spend()?,
            })
        })?;
        info!(model = model.unwrap_or("*"), cleared, "spend reset");
        Ok(cleared)
    }

    pub fn reset_latency(&self, model: Option<&str>) -> Result<usize> {
        let cleared = self.ledger.transaction(|tx| -> Result<usize> {
            Ok(match model {
                Some(name) => usize::from(tx.clear_latency(name)?),
                None => tx.clear_all_latency()?,
            })
        })?;
        info!(model = model.unwrap_or("*"), cleared, "latency reset");
        Ok(cleared)
    }

    pub fn clear_cache(&self) -> Result<usize> {
        let cleared = self.ledger.transaction(|tx| tx.clear_cache())?;
        info!(cleared, "cache cleared");
        Ok(cleared)
    }

    /// Drops one inflight row, or all of them when `cache_key` is `None`.
    pub fn clear_inflight(&self, cache_key: Option<&str>) -> Result<usize> {
        let cleared = self.ledger.transaction(|tx| -> Result<usize> {
            Ok(match cache_key {
                Some(key) => usize::from(tx.clear_single_inflight(key)?),
                None => tx.clear_inflight()?,
            })
        })?;
        info!(cleared, "inflight entries cleared");
        Ok(cleared)
    }
}
