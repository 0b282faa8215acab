#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use router_app::{BoxError, InflightSettings, ModelClient, RouterApp, RouterConfig};
use router_core::{Model, Pricing};
use tempfile::TempDir;

pub const WORKFLOW: &str = "chat";

pub struct TestApp {
    pub _dir: TempDir,
    pub app: RouterApp,
}

pub fn fast_inflight() -> InflightSettings {
    InflightSettings {
        poll_interval_ms: 5,
        wait_timeout_ms: 5_000,
        stale_after_ms: 60_000,
    }
}

pub fn setup_app(models: Vec<Model>) -> TestApp {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = RouterConfig {
        ledger_path: None,
        inflight: fast_inflight(),
        models,
    };
    let app = RouterApp::open_at(config, dir.path().join("ledger.sqlite")).expect("open app");
    TestApp { _dir: dir, app }
}

pub fn model(name: &str, weight: f64, per_call: f64) -> Model {
    let mut model = Model::new(name, "fake", &model_id(name));
    model.routing.weight = weight;
    model.pricing = Pricing::flat(per_call);
    model
}

pub fn model_id(name: &str) -> String {
    format!("{name}-id")
}

pub fn spend_of(app: &RouterApp, model: &str) -> f64 {
    app.ledger()
        .transaction(|tx| tx.get_spend(model))
        .expect("read spend")
}

/// Model client double that counts calls and can be slowed down or made to fail.
#[derive(Clone, Default)]
pub struct FakeClient {
    calls: Arc<AtomicUsize>,
    delay: Duration,
    output: Option<String>,
    failing_model_ids: Vec<String>,
    panics_left: Arc<AtomicUsize>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_output(mut self, output: &str) -> Self {
        self.output = Some(output.to_string());
        self
    }

    pub fn failing_for(mut self, model_name: &str) -> Self {
        self.failing_model_ids.push(model_id(model_name));
        self
    }

    /// The next call panics instead of answering; later calls behave normally.
    pub fn panicking_once(self) -> Self {
        self.panics_left.store(1, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelClient for FakeClient {
    fn generate(
        &self,
        prompt: &str,
        model_id: &str,
        _temperature: f64,
        _max_output_tokens: u32,
    ) -> Result<String, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .panics_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            panic!("model client crashed");
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.failing_model_ids.iter().any(|id| id == model_id) {
            return Err(format!("{model_id} is unavailable").into());
        }
        Ok(self
            .output
            .clone()
            .unwrap_or_else(|| format!("{model_id} says: {prompt}")))
    }
}
