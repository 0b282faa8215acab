pub mod app;
pub mod client;
pub mod config;
pub mod error;
pub mod services;
pub mod startup;
pub mod util;

pub use app::RouterApp;
pub use client::{BoxError, ModelClient};
pub use config::{InflightSettings, LEDGER_PATH_ENV, RouterConfig};
pub use error::{AdmissionStage, AppError, ConfigError, Result, RouterError};
pub use services::{
    Candidates, FailedAttempt, InflightCoordinator, LedgerService, LedgerSnapshot, ModelStatus,
    OwnerGuard, Resolution, RoutedGeneration, RouterService, Ticket,
};
pub use startup::{DEFAULT_LEDGER_FILE_NAME, default_ledger_path, open_ledger};
