use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use router_core::{Model, ModelRegistry, ResolvedRouting};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::startup::default_ledger_path;

pub const LEDGER_PATH_ENV: &str = "LLM_ROUTER_LEDGER_PATH";

const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_STALE_AFTER_MS: u64 = 600_000;

/// Router configuration as read from TOML.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
    #[serde(default)]
    pub inflight: InflightSettings,
    #[serde(default)]
    pub models: Vec<Model>,
}

/// Timing of the inflight wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct InflightSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_wait_timeout_ms")]
    pub wait_timeout_ms: u64,
    /// A `waiting` record untouched for this long is treated as abandoned.
    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

impl Default for InflightSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            stale_after_ms: DEFAULT_STALE_AFTER_MS,
        }
    }
}

impl InflightSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms)
    }
}

impl RouterConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inflight.poll_interval_ms == 0 {
            return Err(invalid("inflight.poll_interval_ms must be positive"));
        }
        let mut seen = HashSet::new();
        for model in &self.models {
            if model.name.trim().is_empty() {
                return Err(invalid("model name must not be empty"));
            }
            if !seen.insert(model.name.as_str()) {
                return Err(invalid(&format!("duplicate model name {}", model.name)));
            }
            validate_pricing(model)?;
            validate_routing(&model.name, "", &model.routing.base())?;
            for workflow in model.routing.workflows.keys() {
                validate_routing(&model.name, workflow, &model.routing.resolve(workflow))?;
            }
        }
        Ok(())
    }

    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::new(self.models.clone())
    }

    /// `LLM_ROUTER_LEDGER_PATH`, then `ledger_path`, then the temp-dir default.
    pub fn resolve_ledger_path(&self) -> PathBuf {
        self.resolve_ledger_path_with(std::env::var_os(LEDGER_PATH_ENV))
    }

    pub fn resolve_ledger_path_with(&self, env_value: Option<OsString>) -> PathBuf {
        if let Some(value) = env_value.filter(|value| !value.is_empty()) {
            return PathBuf::from(value);
        }
        self.ledger_path.clone().unwrap_or_else(default_ledger_path)
    }
}

fn validate_pricing(model: &Model) -> Result<(), ConfigError> {
    let pricing = &model.pricing;
    let rates = [
        Some(pricing.per_call),
        pricing.prompt_per_1k,
        pricing.completion_per_1k,
    ];
    if rates
        .into_iter()
        .flatten()
        .any(|rate| !rate.is_finite() || rate < 0.0)
    {
        return Err(invalid(&format!(
            "model {} has a negative or non-finite price",
            model.name
        )));
    }
    Ok(())
}

fn validate_routing(
    model: &str,
    workflow: &str,
    routing: &ResolvedRouting,
) -> Result<(), ConfigError> {
    let scope = if workflow.is_empty() {
        model.to_string()
    } else {
        format!("{model} (workflow {workflow})")
    };
    if !routing.weight.is_finite() || routing.weight < 0.0 {
        return Err(invalid(&format!("{scope}: weight must be a non-negative number")));
    }
    if !(routing.warning_ratio > 0.0 && routing.warning_ratio <= 1.0) {
        return Err(invalid(&format!("{scope}: warning_ratio must be in (0, 1]")));
    }
    if let Some(ceiling) = routing.spend_ceiling
        && (!ceiling.is_finite() || ceiling < 0.0)
    {
        return Err(invalid(&format!("{scope}: spend_ceiling must be non-negative")));
    }
    if let Some(threshold) = routing.latency_threshold_ms
        && (!threshold.is_finite() || threshold <= 0.0)
    {
        return Err(invalid(&format!("{scope}: latency_threshold_ms must be positive")));
    }
    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_wait_timeout_ms() -> u64 {
    DEFAULT_WAIT_TIMEOUT_MS
}

fn default_stale_after_ms() -> u64 {
    DEFAULT_STALE_AFTER_MS
}
