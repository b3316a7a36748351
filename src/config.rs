//! Configuration management for script runs
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::{ConfirmationPolicy, RetryPolicy};
use crate::codec::felt::parse_felt;
use crate::codec::ExecutionEncoding;
use crate::tx::{Account, FeeEstimator, LocalSigner};
use crate::types::{ContractAddress, WaitFor};

use anyhow::{Context, Result};
use serde::Deserialize;
use starknet_crypto::FieldElement;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "STARKSCRIPT_CONFIG";
/// Config file used when `STARKSCRIPT_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "starkscript.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: NetworkConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub account: Option<AccountConfig>,
    #[serde(default)]
    pub transactions: TransactionsConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub rpc_urls: Vec<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Clone, Deserialize)]
pub struct AccountConfig {
    pub address: String,
    pub private_key: String,
    #[serde(default)]
    pub encoding: ExecutionEncoding,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransactionsConfig {
    pub wait_for: WaitFor,
    pub fee_buffer_percent: u64,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Scarb output directory searched for named contracts
    pub target_dir: PathBuf,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2_000,
        }
    }
}

impl Default for TransactionsConfig {
    fn default() -> Self {
        Self {
            wait_for: WaitFor::default(),
            fee_buffer_percent: 10,
            confirmation_timeout_secs: 300,
            poll_interval_ms: 500,
            max_poll_interval_ms: 5_000,
        }
    }
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("target/dev"),
        }
    }
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl Settings {
    /// Load settings from `STARKSCRIPT_CONFIG`, or `starkscript.toml`
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::from_file(&config_path)
    }

    /// Load settings from a specific file
    pub fn from_file(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        Self::from_toml_str(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str)?;

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.network.rpc_urls.is_empty() {
            anyhow::bail!("At least one RPC URL must be configured");
        }
        for url in &self.network.rpc_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                anyhow::bail!("RPC URL {} must use http or https", url);
            }
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            anyhow::bail!("retry.max_backoff_ms must not be below retry.initial_backoff_ms");
        }

        let tx = &self.transactions;
        if tx.poll_interval_ms == 0 {
            anyhow::bail!("transactions.poll_interval_ms must be positive");
        }
        if tx.max_poll_interval_ms < tx.poll_interval_ms {
            anyhow::bail!(
                "transactions.max_poll_interval_ms must not be below transactions.poll_interval_ms"
            );
        }
        if tx.confirmation_timeout_secs == 0 {
            tracing::warn!("confirmation_timeout_secs is 0 - every wait will time out immediately");
        }

        if self.account.is_some() {
            self.build_account()?;
        } else {
            tracing::warn!("No [account] configured - only calls will be possible");
        }

        Ok(())
    }

    /// Retry settings for node requests
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.initial_backoff_ms),
            Duration::from_millis(self.retry.max_backoff_ms),
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.network.request_timeout_secs)
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy::new(
            Duration::from_millis(self.transactions.poll_interval_ms),
            Duration::from_millis(self.transactions.max_poll_interval_ms),
        )
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.transactions.confirmation_timeout_secs)
    }

    pub fn fee_estimator(&self) -> FeeEstimator {
        FeeEstimator::new(self.transactions.fee_buffer_percent)
    }

    /// The configured acting account, if any
    pub fn build_account(&self) -> Result<Option<Account>> {
        let Some(config) = &self.account else {
            return Ok(None);
        };

        let address: ContractAddress = config
            .address
            .parse()
            .with_context(|| format!("Invalid account address: {}", config.address))?;
        let private_key = parse_felt(&config.private_key)
            .map_err(|_| anyhow::anyhow!("Invalid account private key"))?;
        if private_key == FieldElement::ZERO {
            anyhow::bail!("Account private key must not be zero");
        }

        let signer = Arc::new(LocalSigner::new(private_key));
        Ok(Some(
            Account::new(address, signer).with_encoding(config.encoding),
        ))
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")?;

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_else(|_| {
            tracing::warn!("Environment variable {} is not set", var_name);
            String::new()
        });
        result = result.replace(&cap[0], &var_value);
    }

    Ok(result)
}
