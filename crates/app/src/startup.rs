use std::path::{Path, PathBuf};

use router_db::Ledger;

use crate::error::AppError;

pub const DEFAULT_LEDGER_FILE_NAME: &str = "llm-router-ledger.sqlite";

pub fn default_ledger_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_LEDGER_FILE_NAME)
}

/// Opens the ledger at `path`, creating its directory and schema as needed.
pub fn open_ledger(path: &Path) -> Result<Ledger, AppError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let ledger = Ledger::open(path)?;
    ledger.migrate()?;
    tracing::debug!(path = %path.display(), "ledger ready");
    Ok(ledger)
}
