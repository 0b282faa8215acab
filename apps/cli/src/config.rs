use std::env;
use std::path::PathBuf;

use router_app::{ConfigError, RouterConfig};

pub const CONFIG_ENV: &str = "LLM_ROUTER_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "llm-router.toml";

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: RouterConfig,
    /// `None` when no config file was found and defaults are in use.
    pub file: Option<PathBuf>,
}

/// `--config`, then `LLM_ROUTER_CONFIG`, then `./llm-router.toml`.
///
/// An explicitly named file must exist; the default location may be absent.
pub fn load(explicit: Option<PathBuf>) -> Result<ConfigLoad, ConfigError> {
    let named = explicit.or_else(|| {
        env::var_os(CONFIG_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
    });
    if let Some(file) = named {
        let config = RouterConfig::load(&file)?;
        return Ok(ConfigLoad {
            config,
            file: Some(file),
        });
    }

    let file = PathBuf::from(DEFAULT_CONFIG_FILE);
    if file.exists() {
        let config = RouterConfig::load(&file)?;
        return Ok(ConfigLoad {
            config,
            file: Some(file),
        });
    }
    Ok(ConfigLoad {
        config: RouterConfig::default(),
        file: None,
    })
}
