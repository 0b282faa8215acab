use std::vec;

use router_core::{Model, ModelRegistry};
use router_db::Ledger;
use tracing::debug;

use crate::error::Result;

/// Lazily filtered candidate order for one workflow.
///
/// Eligibility is read from the ledger when a model is about to be yielded,
/// so a candidate that exhausts its budget while earlier ones are tried is
/// skipped later in the same walk.
pub struct Candidates<'a> {
    ledger: &'a Ledger,
    workflow: &'a str,
    order: vec::IntoIter<&'a Model>,
}

impl<'a> Iterator for Candidates<'a> {
    type Item = Result<&'a Model>;

    fn next(&mut self) -> Option<Self::Item> {
        for model in self.order.by_ref() {
            match is_eligible(self.ledger, model, self.workflow) {
                Ok(true) => return Some(Ok(model)),
                Ok(false) => {
                    debug!(model = %model.name, workflow = self.workflow, "skipping ineligible model");
                }
                Err(err) => return Some(Err(err)),
            }
        }
        None
    }
}

/// Hinted model first when it exists, then the rest by descending weight and name.
pub fn iter_candidates<'a>(
    ledger: &'a Ledger,
    registry: &'a ModelRegistry,
    workflow: &'a str,
    model_hint: Option<&str>,
) -> Candidates<'a> {
    let hinted = model_hint.and_then(|name| registry.get(name));
    if hinted.is_none()
        && let Some(name) = model_hint
    {
        debug!(model = name, "hinted model is not configured");
    }

    let mut rest: Vec<(f64, &Model)> = registry
        .iter()
        .filter(|model| hinted.is_none_or(|hint| hint.name != model.name))
        .map(|model| (model.routing_for(workflow).weight, model))
        .collect();
    rest.sort_by(|(weight_a, a), (weight_b, b)| {
        weight_b
            .total_cmp(weight_a)
            .then_with(|| b.name.cmp(&a.name))
    });

    let order: Vec<&Model> = hinted
        .into_iter()
        .chain(rest.into_iter().map(|(_, model)| model))
        .collect();
    Candidates {
        ledger,
        workflow,
        order: order.into_iter(),
    }
}

/// Spend below the ceiling and last latency below the threshold, read in one transaction.
pub fn is_eligible(ledger: &Ledger, model: &Model, workflow: &str) -> Result<bool> {
    let routing = model.routing_for(workflow);
    ledger.transaction(|tx| -> Result<bool> {
        let spend = tx.get_spend(&model.name)?;
        let last_latency = tx
            .get_latency(&model.name)?
            .map(|record| record.latency_ms);
        Ok(routing.spend_allows(spend) && routing.latency_allows(last_latency))
    })
}
