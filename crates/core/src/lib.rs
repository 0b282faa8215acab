use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_WEIGHT: f64 = 1.0;
pub const DEFAULT_WARNING_RATIO: f64 = 0.8;
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 1000;

/// Characters per token used when only the raw text is available.
const CHARS_PER_TOKEN: usize = 4;
const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

/// A backend model the router can send generations to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub provider: String,
    pub model_id: String,
    #[serde(flatten)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub pricing: Pricing,
}

impl Model {
    pub fn new(name: &str, provider: &str, model_id: &str) -> Self {
        Self {
            name: name.to_string(),
            provider: provider.to_string(),
            model_id: model_id.to_string(),
            routing: RoutingConfig::default(),
            pricing: Pricing::default(),
        }
    }

    pub fn routing_for(&self, workflow: &str) -> ResolvedRouting {
        self.routing.resolve(workflow)
    }
}

/// Routing knobs for one model, with optional per-workflow overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default)]
    pub spend_ceiling: Option<f64>,
    #[serde(default)]
    pub latency_threshold_ms: Option<f64>,
    #[serde(default = "default_warning_ratio")]
    pub warning_ratio: f64,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub workflows: BTreeMap<String, RoutingOverride>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            weight: DEFAULT_WEIGHT,
            spend_ceiling: None,
            latency_threshold_ms: None,
            warning_ratio: DEFAULT_WARNING_RATIO,
            cache: CacheSettings::default(),
            workflows: BTreeMap::new(),
        }
    }
}

impl RoutingConfig {
    /// Settings with no workflow override applied.
    pub fn base(&self) -> ResolvedRouting {
        ResolvedRouting {
            weight: self.weight,
            spend_ceiling: self.spend_ceiling,
            latency_threshold_ms: self.latency_threshold_ms,
            warning_ratio: self.warning_ratio,
            cache: self.cache,
        }
    }

    /// Merges the override registered for `workflow` (if any) over the base settings.
    pub fn resolve(&self, workflow: &str) -> ResolvedRouting {
        match self.workflows.get(workflow) {
            Some(overrides) => overrides.apply(self.base()),
            None => self.base(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingOverride {
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub spend_ceiling: Option<f64>,
    #[serde(default)]
    pub latency_threshold_ms: Option<f64>,
    #[serde(default)]
    pub warning_ratio: Option<f64>,
    #[serde(default)]
    pub cache: Option<CacheSettings>,
}

impl RoutingOverride {
    fn apply(&self, base: ResolvedRouting) -> ResolvedRouting {
        ResolvedRouting {
            weight: self.weight.unwrap_or(base.weight),
            spend_ceiling: self.spend_ceiling.or(base.spend_ceiling),
            latency_threshold_ms: self.latency_threshold_ms.or(base.latency_threshold_ms),
            warning_ratio: self.warning_ratio.unwrap_or(base.warning_ratio),
            cache: self.cache.unwrap_or(base.cache),
        }
    }
}

/// Routing settings after workflow overrides have been merged in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedRouting {
    pub weight: f64,
    pub spend_ceiling: Option<f64>,
    pub latency_threshold_ms: Option<f64>,
    pub warning_ratio: f64,
    pub cache: CacheSettings,
}

impl ResolvedRouting {
    pub fn spend_allows(&self, spend: f64) -> bool {
        match self.spend_ceiling {
            Some(ceiling) => spend < ceiling,
            None => true,
        }
    }

    pub fn latency_allows(&self, last_latency_ms: Option<f64>) -> bool {
        match (self.latency_threshold_ms, last_latency_ms) {
            (Some(threshold), Some(latency)) => latency < threshold,
            _ => true,
        }
    }
}

/// Per-model generation cache policy.
///
/// Accepts either a bare boolean (`cache = true`) or a table with explicit
/// `ttl_seconds` / `max_entries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CacheSettingsRepr")]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl CacheSettings {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds.min(MAX_TTL_SECONDS) as i64)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CacheSettingsRepr {
    Flag(bool),
    Table {
        #[serde(default = "default_true")]
        enabled: bool,
        #[serde(default)]
        ttl_seconds: Option<u64>,
        #[serde(default)]
        max_entries: Option<u64>,
    },
}

impl From<CacheSettingsRepr> for CacheSettings {
    fn from(repr: CacheSettingsRepr) -> Self {
        match repr {
            CacheSettingsRepr::Flag(enabled) => Self {
                enabled,
                ..Self::default()
            },
            CacheSettingsRepr::Table {
                enabled,
                ttl_seconds,
                max_entries,
            } => Self {
                enabled,
                ttl_seconds: ttl_seconds
                    .filter(|value| *value > 0)
                    .unwrap_or(DEFAULT_CACHE_TTL_SECONDS),
                max_entries: max_entries
                    .filter(|value| *value > 0)
                    .unwrap_or(DEFAULT_CACHE_MAX_ENTRIES),
            },
        }
    }
}

/// Flat per-call cost plus optional per-1000-token rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub per_call: f64,
    #[serde(default)]
    pub prompt_per_1k: Option<f64>,
    #[serde(default)]
    pub completion_per_1k: Option<f64>,
}

impl Pricing {
    pub fn flat(per_call: f64) -> Self {
        Self {
            per_call,
            ..Self::default()
        }
    }

    pub fn cost_for_tokens(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        let prompt = self
            .prompt_per_1k
            .map(|rate| (prompt_tokens as f64 / 1000.0) * rate)
            .unwrap_or(0.0);
        let completion = self
            .completion_per_1k
            .map(|rate| (completion_tokens as f64 / 1000.0) * rate)
            .unwrap_or(0.0);
        self.per_call + prompt + completion
    }

    /// Cost known before the call: the completion length is not yet known.
    pub fn estimate_cost(&self, prompt: &str) -> f64 {
        self.cost_for_tokens(estimate_tokens(prompt), 0)
    }

    pub fn actual_cost(&self, prompt: &str, completion: &str) -> f64 {
        self.cost_for_tokens(estimate_tokens(prompt), estimate_tokens(completion))
    }
}

pub fn estimate_tokens(text: &str) -> u64 {
    text.chars().count().div_ceil(CHARS_PER_TOKEN) as u64
}

/// Read-only view of the configured models.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Vec<Model>,
}

impl ModelRegistry {
    pub fn new(models: Vec<Model>) -> Self {
        Self { models }
    }

    pub fn get(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|model| model.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// What a caller gets back from a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    pub output: String,
    pub latency_ms: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendRecord {
    pub model_name: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRecord {
    pub model_name: String,
    pub latency_ms: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cache_key: String,
    pub model_name: String,
    pub workflow: String,
    pub output: String,
    pub latency_ms: f64,
    pub cost: f64,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.created_at) > ttl
    }

    pub fn outcome(&self) -> GenerationOutcome {
        GenerationOutcome {
            output: self.output.clone(),
            latency_ms: self.latency_ms,
            cost: self.cost,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InflightStatus {
    Waiting,
    Success,
    Error,
}

impl InflightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl FromStr for InflightStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "waiting" => Ok(Self::Waiting),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown inflight status {}", other)),
        }
    }
}

/// Coordination row shared by every caller generating the same cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InflightRecord {
    pub cache_key: String,
    pub status: InflightStatus,
    pub model_name: String,
    pub workflow: String,
    pub output: Option<String>,
    pub latency_ms: Option<f64>,
    pub cost: Option<f64>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl InflightRecord {
    /// The last successful result, if one completed at or after `since`.
    ///
    /// The completed output outlives later retries, so this stays valid even
    /// when `status` has since moved back to `waiting` or `error`.
    pub fn completed_since(&self, since: DateTime<Utc>) -> Option<GenerationOutcome> {
        let completed_at = self.completed_at?;
        if completed_at < since {
            return None;
        }
        Some(GenerationOutcome {
            output: self.output.clone()?,
            latency_ms: self.latency_ms.unwrap_or(0.0),
            cost: self.cost.unwrap_or(0.0),
        })
    }
}

/// Deterministic key shared by the generation cache and inflight dedup.
pub fn cache_key(
    model_name: &str,
    workflow: &str,
    prompt: &str,
    temperature: f64,
    max_output_tokens: u32,
) -> String {
    let temperature = format!("{:?}", temperature);
    let max_output_tokens = max_output_tokens.to_string();
    let mut hasher = Sha256::new();
    for part in [
        model_name,
        workflow,
        prompt,
        temperature.as_str(),
        max_output_tokens.as_str(),
    ] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex_digest(&hasher.finalize())
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut out, "{:02x}", byte);
    }
    out
}

fn default_weight() -> f64 {
    DEFAULT_WEIGHT
}

fn default_warning_ratio() -> f64 {
    DEFAULT_WARNING_RATIO
}

fn default_true() -> bool {
    true
}
