//! Driver configuration

use crate::scenario::Scenario;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub session: SessionConfig,

    /// Vault snapshot and command script replayed by the driver
    pub scenario: Scenario,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Window collapsing bursts of price updates, 0 disables it
    pub price_debounce_ms: u64,

    /// Confirmations before a transaction counts as successful
    pub safe_confirmations: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            price_debounce_ms: 0,
            safe_confirmations: 1,
        }
    }
}

impl SessionConfig {
    pub fn price_debounce(&self) -> Duration {
        Duration::from_millis(self.price_debounce_ms)
    }
}

impl Config {
    /// Path from `VAULT_MANAGER_CONFIG`, `vault-manager.toml` when unset
    pub fn path() -> String {
        std::env::var("VAULT_MANAGER_CONFIG").unwrap_or_else(|_| "vault-manager.toml".to_string())
    }

    /// Load configuration from TOML file
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    /// Like `load`, but a missing file yields `None`. A file that exists
    /// and fails to parse is still an error.
    pub fn load_if_present() -> Result<Option<Self>> {
        let path = Self::path();
        if !std::path::Path::new(shellexpand::tilde(&path).as_ref()).exists() {
            return Ok(None);
        }
        Self::load_from(&path).map(Some)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let path = shellexpand::tilde(path);
        let config_str = std::fs::read_to_string(path.as_ref())
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&config_str).context("Failed to parse config TOML")?;

        Ok(config)
    }

    /// WBTC vault with a proxy in place, depositing and generating
    pub fn default_local() -> Self {
        Self {
            session: SessionConfig {
                price_debounce_ms: 250,
                safe_confirmations: 1,
            },
            scenario: Scenario::wbtc_deposit_and_generate(),
        }
    }

    /// Write default config to file
    pub fn write_default(path: &str) -> Result<()> {
        let config = Self::default_local();
        let toml_str = toml::to_string_pretty(&config).context("Failed to serialize config")?;

        let path = shellexpand::tilde(path);
        std::fs::write(path.as_ref(), toml_str)
            .context(format!("Failed to write config to {}", path))?;

        log::info!("Created default config at {}", path);
        Ok(())
    }
}
