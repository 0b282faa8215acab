use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Which admission check rejected a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionStage {
    PreCheck,
    PostCheck,
}

impl AdmissionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreCheck => "pre-check",
            Self::PostCheck => "post-check",
        }
    }
}

/// Failures surfaced by the router.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error(
        "budget exhausted for model {model} ({}): spend {spend:.4} + cost {cost:.4} exceeds ceiling {ceiling:.4}",
        .stage.as_str()
    )]
    BudgetExhausted {
        model: String,
        stage: AdmissionStage,
        spend: f64,
        cost: f64,
        ceiling: f64,
    },
    #[error("latency exceeded for model {model}: {latency_ms:.1}ms > {threshold_ms:.1}ms")]
    LatencyExceeded {
        model: String,
        latency_ms: f64,
        threshold_ms: f64,
    },
    #[error("no candidates available for workflow {workflow} ({attempts} attempted)")]
    NoCandidates {
        workflow: String,
        attempts: usize,
        last_error: Option<String>,
    },
    #[error("model client error for {model}: {message}")]
    ClientError { model: String, message: String },
    #[error("timed out after {waited:?} waiting for inflight generation {cache_key}")]
    InflightTimeout { cache_key: String, waited: Duration },
    #[error("inflight generation {cache_key} failed: {message}")]
    InflightFailed { cache_key: String, message: String },
    #[error("ledger error: {0}")]
    Ledger(#[from] router_db::LedgerError),
}

impl RouterError {
    /// Stable snake_case name for the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BudgetExhausted { .. } => "budget_exhausted",
            Self::LatencyExceeded { .. } => "latency_exceeded",
            Self::NoCandidates { .. } => "no_candidates_available",
            Self::ClientError { .. } => "client_error",
            Self::InflightTimeout { .. } => "inflight_timeout",
            Self::InflightFailed { .. } => "inflight_failed",
            Self::Ledger(_) => "ledger_error",
        }
    }

    /// True for failures that only rule out the current candidate.
    pub fn is_candidate_failure(&self) -> bool {
        !matches!(self, Self::Ledger(_) | Self::NoCandidates { .. })
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("ledger error: {0}")]
    Ledger(#[from] router_db::LedgerError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("router error: {0}")]
    Router(#[from] RouterError),
}
