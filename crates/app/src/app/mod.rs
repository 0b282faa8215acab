use std::path::PathBuf;
use std::sync::Arc;

use router_core::ModelRegistry;
use router_db::Ledger;

use crate::client::ModelClient;
use crate::config::RouterConfig;
use crate::error::AppError;
use crate::services::{Candidates, LedgerService, RouterService, iter_candidates};
use crate::startup::open_ledger;

/// Opened ledger and model registry shared by the router and admin tooling.
#[derive(Clone)]
pub struct RouterApp {
    pub config: RouterConfig,
    pub ledger_path: PathBuf,
    ledger: Arc<Ledger>,
    registry: Arc<ModelRegistry>,
}

impl RouterApp {
    /// Opens (and migrates) the ledger the config resolves to.
    pub fn open(config: RouterConfig) -> Result<Self, AppError> {
        let ledger_path = config.resolve_ledger_path();
        Self::open_at(config, ledger_path)
    }

    pub fn open_at(config: RouterConfig, ledger_path: PathBuf) -> Result<Self, AppError> {
        config.validate()?;
        let ledger = open_ledger(&ledger_path)?;
        let registry = config.registry();
        Ok(Self {
            config,
            ledger_path,
            ledger: Arc::new(ledger),
            registry: Arc::new(registry),
        })
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn router<C: ModelClient>(&self, client: C) -> RouterService<C> {
        RouterService::new(
            self.ledger.clone(),
            self.registry.clone(),
            client,
            self.config.inflight,
        )
    }

    pub fn ledger_service(&self) -> LedgerService {
        LedgerService::new(self.ledger.clone(), self.registry.clone())
    }

    pub fn candidates<'a>(&'a self, workflow: &'a str, model_hint: Option<&str>) -> Candidates<'a> {
        iter_candidates(&self.ledger, &self.registry, workflow, model_hint)
    }
}
