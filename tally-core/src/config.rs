//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "ledger": {
//!     "defaultCurrency": "USD",
//!     "databaseFile": "tally.duckdb",
//!     "maxConflictRetries": 16,
//!     "initialBackoffMs": 5,
//!     "maxBackoffMs": 250
//!   }
//! }
//! ```
//! Keys this crate does not manage are kept as-is when saving.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::result::Error;
use crate::domain::Wallet;
use crate::services::RetryPolicy;

pub const SETTINGS_FILE: &str = "settings.json";

const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_DATABASE_FILE: &str = "tally.duckdb";
const DEFAULT_MAX_RETRIES: u32 = 16;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 5;
const DEFAULT_MAX_BACKOFF_MS: u64 = 250;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    ledger: LedgerSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    database_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_conflict_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initial_backoff_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_backoff_ms: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Tally configuration (resolved view of settings)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Currency given to new wallets
    pub default_currency: String,
    /// Ledger database file name, relative to the data directory
    pub database_file: String,
    pub max_conflict_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_currency: DEFAULT_CURRENCY.to_string(),
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            max_conflict_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

impl Config {
    /// Load config from the data directory
    ///
    /// Environment overrides (for CI/testing):
    /// - `TALLY_CURRENCY`: default currency for new wallets
    /// - `TALLY_MAX_RETRIES`: conflict retry budget
    pub fn load(tally_dir: &Path) -> Result<Self> {
        Self::load_with_env(tally_dir, |key| std::env::var(key).ok())
    }

    /// Load config, reading overrides through `env` instead of the process
    /// environment
    pub fn load_with_env(tally_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = read_settings(tally_dir)?;
        let defaults = Config::default();
        let ledger = raw.ledger;

        let mut config = Config {
            default_currency: ledger.default_currency.unwrap_or(defaults.default_currency),
            database_file: ledger.database_file.unwrap_or(defaults.database_file),
            max_conflict_retries: ledger
                .max_conflict_retries
                .unwrap_or(defaults.max_conflict_retries),
            initial_backoff_ms: ledger.initial_backoff_ms.unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: ledger.max_backoff_ms.unwrap_or(defaults.max_backoff_ms),
        };

        if let Some(currency) = env("TALLY_CURRENCY") {
            config.default_currency = currency;
        }
        if let Some(retries) = env("TALLY_MAX_RETRIES") {
            config.max_conflict_retries = retries.trim().parse().map_err(|_| {
                Error::Config(format!("TALLY_MAX_RETRIES must be a number, got '{}'", retries))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        self.default_currency = Wallet::normalize_currency(&self.default_currency)
            .map_err(|e| Error::Config(format!("default currency: {}", e)))?;
        if self.max_conflict_retries == 0 {
            return Err(Error::Config("maxConflictRetries must be at least 1".to_string()).into());
        }
        if self.database_file.trim().is_empty() {
            return Err(Error::Config("databaseFile cannot be empty".to_string()).into());
        }
        Ok(())
    }

    /// Save config to the data directory
    /// Preserves other settings that this crate doesn't manage
    pub fn save(&self, tally_dir: &Path) -> Result<()> {
        let mut settings = read_settings(tally_dir)?;

        settings.ledger.default_currency = Some(self.default_currency.clone());
        settings.ledger.database_file = Some(self.database_file.clone());
        settings.ledger.max_conflict_retries = Some(self.max_conflict_retries);
        settings.ledger.initial_backoff_ms = Some(self.initial_backoff_ms);
        settings.ledger.max_backoff_ms = Some(self.max_backoff_ms);

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(tally_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }

    /// Retry policy for conflicting balance mutations
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_conflict_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms)),
        }
    }
}

fn read_settings(tally_dir: &Path) -> Result<SettingsFile> {
    let settings_path = tally_dir.join(SETTINGS_FILE);
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("Failed to read {}", settings_path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid settings file {}", settings_path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.retry_policy().max_attempts, 16);
        assert_eq!(config.retry_policy().initial_backoff, Duration::from_millis(5));
    }

    #[test]
    fn test_reads_settings_file() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"ledger": {"defaultCurrency": "eur", "maxConflictRetries": 3}}"#,
        )
        .unwrap();

        let config = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(config.default_currency, "EUR");
        assert_eq!(config.max_conflict_retries, 3);
        assert_eq!(config.database_file, "tally.duckdb");
    }

    #[test]
    fn test_env_overrides() {
        let dir = tempdir().unwrap();
        let env = |key: &str| match key {
            "TALLY_CURRENCY" => Some("gbp".to_string()),
            "TALLY_MAX_RETRIES" => Some("40".to_string()),
            _ => None,
        };
        let config = Config::load_with_env(dir.path(), env).unwrap();
        assert_eq!(config.default_currency, "GBP");
        assert_eq!(config.max_conflict_retries, 40);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let bad_retries = |key: &str| (key == "TALLY_MAX_RETRIES").then(|| "many".to_string());
        assert!(Config::load_with_env(dir.path(), bad_retries).is_err());

        let bad_currency = |key: &str| (key == "TALLY_CURRENCY").then(|| "dollars".to_string());
        assert!(Config::load_with_env(dir.path(), bad_currency).is_err());

        let zero = |key: &str| (key == "TALLY_MAX_RETRIES").then(|| "0".to_string());
        assert!(Config::load_with_env(dir.path(), zero).is_err());
    }

    #[test]
    fn test_save_preserves_unknown_keys() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(SETTINGS_FILE),
            r#"{"theme": "dark", "ledger": {"note": "keep me"}}"#,
        )
        .unwrap();

        let mut config = Config::load_with_env(dir.path(), no_env).unwrap();
        config.default_currency = "CHF".to_string();
        config.save(dir.path()).unwrap();

        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join(SETTINGS_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["ledger"]["note"], "keep me");
        assert_eq!(raw["ledger"]["defaultCurrency"], "CHF");

        let reloaded = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(reloaded.default_currency, "CHF");
    }
}
