use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use router_core::{
    CacheEntry, CacheSettings, GenerationOutcome, Model, ModelRegistry, ResolvedRouting,
    cache_key,
};
use router_db::{Ledger, LedgerTx};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::ModelClient;
use crate::config::InflightSettings;
use crate::error::{AdmissionStage, Result, RouterError};
use crate::services::candidates::{Candidates, iter_candidates};
use crate::services::inflight::{InflightCoordinator, Resolution, Ticket};
use crate::util::time::elapsed_ms;

/// A candidate that was tried and ruled out during [`RouterService::generate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedAttempt {
    pub model_name: String,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedGeneration {
    pub model_name: String,
    pub outcome: GenerationOutcome,
    pub failed_attempts: Vec<FailedAttempt>,
}

/// Request parameters that identify one generation.
struct Request<'a> {
    workflow: &'a str,
    model: &'a Model,
    routing: ResolvedRouting,
    cache_key: String,
    prompt: &'a str,
    temperature: f64,
    max_output_tokens: u32,
}

pub struct RouterService<C> {
    ledger: Arc<Ledger>,
    registry: Arc<ModelRegistry>,
    client: C,
    inflight: InflightCoordinator,
}

impl<C: ModelClient> RouterService<C> {
    pub fn new(
        ledger: Arc<Ledger>,
        registry: Arc<ModelRegistry>,
        client: C,
        settings: InflightSettings,
    ) -> Self {
        let inflight = InflightCoordinator::new(ledger.clone(), settings);
        Self {
            ledger,
            registry,
            client,
            inflight,
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn inflight(&self) -> &InflightCoordinator {
        &self.inflight
    }

    pub fn iter_candidates<'a>(
        &'a self,
        workflow: &'a str,
        model_hint: Option<&str>,
    ) -> Candidates<'a> {
        iter_candidates(&self.ledger, &self.registry, workflow, model_hint)
    }

    /// Runs one attempt against `model`: admission, cache, single-flight and
    /// the upstream call, recording spend and latency on success.
    pub fn execute_generation(
        &self,
        workflow: &str,
        model: &Model,
        prompt: &str,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Result<GenerationOutcome> {
        let request = Request {
            workflow,
            model,
            routing: model.routing_for(workflow),
            cache_key: cache_key(&model.name, workflow, prompt, temperature, max_output_tokens),
            prompt,
            temperature,
            max_output_tokens,
        };
        self.pre_check(&request)?;

        let deadline = Instant::now() + self.inflight.settings().wait_timeout();
        let cache = request
            .routing
            .cache
            .enabled
            .then_some(&request.routing.cache);
        loop {
            match self
                .inflight
                .acquire(&request.cache_key, &model.name, workflow, cache)?
            {
                Ticket::Cached(outcome) => return Ok(outcome),
                Ticket::Owner => return self.run_owner(&request),
                Ticket::Waiter { started_at } => {
                    match self
                        .inflight
                        .wait_until(&request.cache_key, started_at, deadline)?
                    {
                        Resolution::Completed(outcome) => return Ok(outcome),
                        Resolution::Vanished | Resolution::Abandoned => continue,
                    }
                }
            }
        }
    }

    /// Walks the candidates for `workflow` until one attempt succeeds.
    ///
    /// Candidate-level failures move on to the next model; ledger failures
    /// stop the walk.
    pub fn generate(
        &self,
        workflow: &str,
        model_hint: Option<&str>,
        prompt: &str,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Result<RoutedGeneration> {
        let mut failed_attempts: Vec<FailedAttempt> = Vec::new();
        for candidate in self.iter_candidates(workflow, model_hint) {
            let model = candidate?;
            match self.execute_generation(workflow, model, prompt, temperature, max_output_tokens)
            {
                Ok(outcome) => {
                    return Ok(RoutedGeneration {
                        model_name: model.name.clone(),
                        outcome,
                        failed_attempts,
                    });
                }
                Err(err) if err.is_candidate_failure() => {
                    warn!(model = %model.name, workflow, kind = err.kind(), "candidate failed: {err}");
                    failed_attempts.push(FailedAttempt {
                        model_name: model.name.clone(),
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Err(RouterError::NoCandidates {
            workflow: workflow.to_string(),
            attempts: failed_attempts.len(),
            last_error: failed_attempts.last().map(|attempt| attempt.message.clone()),
        })
    }

    fn pre_check(&self, request: &Request<'_>) -> Result<()> {
        let model = request.model;
        let routing = request.routing;
        let estimated_cost = model.pricing.estimate_cost(request.prompt);
        let rejection = self.ledger.transaction(|tx| -> Result<Option<RouterError>> {
            let spend = tx.get_spend(&model.name)?;
            let last_latency = tx
                .get_latency(&model.name)?
                .map(|record| record.latency_ms);
            warn_near_limits(model, request.workflow, &routing, spend + estimated_cost, last_latency);

            if let Some(ceiling) = routing.spend_ceiling
                && spend + estimated_cost > ceiling
            {
                tx.set_spend(&model.name, ceiling)?;
                return Ok(Some(RouterError::BudgetExhausted {
                    model: model.name.clone(),
                    stage: AdmissionStage::PreCheck,
                    spend,
                    cost: estimated_cost,
                    ceiling,
                }));
            }
            Ok(None)
        })?;
        match rejection {
            Some(err) => {
                warn!(model = %model.name, workflow = request.workflow, "{err}");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn run_owner(&self, request: &Request<'_>) -> Result<GenerationOutcome> {
        let model = request.model;
        let guard = self.inflight.own(&request.cache_key);
        let started = Instant::now();
        let output = match self.client.generate(
            request.prompt,
            &model.model_id,
            request.temperature,
            request.max_output_tokens,
        ) {
            Ok(output) => output,
            Err(err) => {
                let message = err.to_string();
                guard.fail(&message)?;
                warn!(model = %model.name, workflow = request.workflow, "model client failed: {message}");
                return Err(RouterError::ClientError {
                    model: model.name.clone(),
                    message,
                });
            }
        };
        let latency_ms = elapsed_ms(started);

        if let Some(threshold_ms) = request.routing.latency_threshold_ms
            && latency_ms > threshold_ms
        {
            let err = RouterError::LatencyExceeded {
                model: model.name.clone(),
                latency_ms,
                threshold_ms,
            };
            let message = err.to_string();
            self.ledger.transaction(|tx| -> Result<()> {
                let now = Utc::now();
                tx.set_latency(&model.name, latency_ms, now)?;
                tx.mark_inflight_error(&request.cache_key, &message, now)?;
                Ok(())
            })?;
            guard.settle();
            warn!(model = %model.name, workflow = request.workflow, "{message}");
            return Err(err);
        }

        let cost = model.pricing.actual_cost(request.prompt, &output);
        let outcome = GenerationOutcome {
            output,
            latency_ms,
            cost,
        };
        let rejection = self.ledger.transaction(|tx| -> Result<Option<RouterError>> {
            let now = Utc::now();
            let spend = tx.get_spend(&model.name)?;
            if let Some(ceiling) = request.routing.spend_ceiling
                && spend + cost > ceiling
            {
                tx.set_spend(&model.name, ceiling)?;
                let err = RouterError::BudgetExhausted {
                    model: model.name.clone(),
                    stage: AdmissionStage::PostCheck,
                    spend,
                    cost,
                    ceiling,
                };
                tx.mark_inflight_error(&request.cache_key, &err.to_string(), now)?;
                return Ok(Some(err));
            }

            tx.set_spend(&model.name, spend + cost)?;
            tx.set_latency(&model.name, latency_ms, now)?;
            tx.mark_inflight_success(&request.cache_key, &outcome, now)?;
            if request.routing.cache.enabled {
                let entry = CacheEntry {
                    cache_key: request.cache_key.clone(),
                    model_name: model.name.clone(),
                    workflow: request.workflow.to_string(),
                    output: outcome.output.clone(),
                    latency_ms,
                    cost,
                    created_at: now,
                };
                store_in_cache(tx, &entry, &request.routing.cache, now)?;
            }
            Ok(None)
        })?;
        guard.settle();
        if let Some(err) = rejection {
            warn!(model = %model.name, workflow = request.workflow, "{err}");
            return Err(err);
        }

        info!(
            model = %model.name,
            workflow = request.workflow,
            latency_ms,
            cost,
            "generation completed"
        );
        Ok(outcome)
    }
}

/// Purges expired entries, evicts the oldest while at capacity, then stores `entry`.
fn store_in_cache(
    tx: &LedgerTx<'_>,
    entry: &CacheEntry,
    settings: &CacheSettings,
    now: DateTime<Utc>,
) -> router_db::Result<()> {
    tx.purge_expired_cache(&entry.model_name, now, settings.ttl())?;
    if tx.get_cache_entry(&entry.cache_key)?.is_none() {
        while tx.cache_size(&entry.model_name)? >= settings.max_entries {
            match tx.pop_oldest_cache_entry(&entry.model_name)? {
                Some(evicted) => debug!(model = %entry.model_name, cache_key = %evicted, "evicted cache entry"),
                None => break,
            }
        }
    }
    tx.store_cache_entry(entry)
}

fn warn_near_limits(
    model: &Model,
    workflow: &str,
    routing: &ResolvedRouting,
    projected_spend: f64,
    last_latency_ms: Option<f64>,
) {
    if let Some(ceiling) = routing.spend_ceiling
        && projected_spend >= ceiling * routing.warning_ratio
    {
        warn!(
            model = %model.name,
            workflow,
            projected_spend,
            ceiling,
            "spend nearing ceiling"
        );
    }
    if let (Some(threshold_ms), Some(latency_ms)) = (routing.latency_threshold_ms, last_latency_ms)
        && latency_ms >= threshold_ms * routing.warning_ratio
    {
        warn!(
            model = %model.name,
            workflow,
            latency_ms,
            threshold_ms,
            "latency nearing threshold"
        );
    }
}
