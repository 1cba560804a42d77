//! Multi-network FundMe configuration management
//!
//! This module provides typed, strongly-validated configuration for the
//! deployment tools. Configuration is resolved in priority order:
//!
//! 1. Command-line network override
//! 2. Environment variables (SOROBAN_*, REPORT_GAS)
//! 3. fundme.toml profile selection
//! 4. Built-in network defaults
//!
//! # Examples
//!
//! ```rust,no_run
//! use fundme_tools::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None)?;
//! println!("Network: {}", config.network.name);
//! println!("Chain id: {}", config.network.chain_id);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::network::{Backend, Network, NetworkDescriptor, NetworkEntry, NetworkTable};

/// Default directory holding compiled contract WASM.
pub const DEFAULT_WASM_DIR: &str = "target/wasm32v1-none/release";

/// Default directory where public-network deployments are recorded.
pub const DEFAULT_DEPLOYMENTS_DIR: &str = "deployments";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid network: {0}. Must be: sandbox, local, testnet, or mainnet")]
    InvalidNetwork(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// TOML profile definition from fundme.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkProfile {
    pub network: String,
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub network_passphrase: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u32>,
    #[serde(default)]
    pub block_confirmations: Option<u32>,
    /// Index into the account list of the account that deploys
    #[serde(default)]
    pub deployer_index: Option<usize>,
    #[serde(default)]
    pub price_feed: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Complete fundme.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundMeToml {
    #[serde(default)]
    pub default: Option<DefaultProfile>,
    #[serde(default)]
    pub profile: HashMap<String, NetworkProfile>,
}

/// Default profile section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultProfile {
    pub network: Option<String>,
}

/// Endpoint and credential of the source verification service.
/// Both are set or neither is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    pub url: String,
    pub api_key: String,
}

/// Gas reporting switches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasReportConfig {
    /// Log every transaction receipt at info level
    pub enabled: bool,
    /// Credential for the fiat gas-pricing service
    pub price_api_key: Option<String>,
}

/// Resolved runtime configuration with all required fields
#[derive(Debug, Clone)]
pub struct Config {
    /// Active network
    pub network: NetworkDescriptor,
    /// Chain id → price feed table built from every profile
    pub networks: NetworkTable,
    /// Signing identities for public networks, in index order
    pub accounts: Vec<String>,
    /// Which account deploys
    pub deployer_index: usize,
    /// Source verification; `None` skips verification
    pub verification: Option<VerifierConfig>,
    pub gas: GasReportConfig,
    /// Directory with compiled contract WASM
    pub wasm_dir: PathBuf,
    /// Root of the per-network deployment records
    pub deployments_dir: PathBuf,
    /// RPC timeout in milliseconds
    pub rpc_timeout_ms: u64,
}

impl Config {
    /// Load configuration from the environment and fundme.toml
    ///
    /// # Resolution Order
    ///
    /// 1. Load .env if present
    /// 2. Pick the network: override, SOROBAN_NETWORK, toml default, then sandbox
    /// 3. Overlay env vars on top of the selected TOML profile
    /// 4. Validate required fields
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - An invalid network name is provided
    /// - An RPC-backed network lacks an RPC URL or accounts
    /// - A public network lacks confirmations
    /// - Verification is only half configured
    pub fn load(network_override: Option<&str>) -> Result<Self, ConfigError> {
        // Load .env file if it exists (non-fatal)
        let _ = dotenvy::dotenv();

        let toml = Self::load_toml(Path::new("fundme.toml"))?;
        Self::resolve(&|key: &str| std::env::var(key).ok(), toml, network_override)
    }

    /// Build a configuration from an environment lookup and an optional TOML file.
    pub fn resolve(
        env: &dyn Fn(&str) -> Option<String>,
        toml: Option<FundMeToml>,
        network_override: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let toml = toml.unwrap_or_default();

        let name = network_override
            .map(str::to_string)
            .or_else(|| env("SOROBAN_NETWORK"))
            .or_else(|| toml.default.as_ref().and_then(|d| d.network.clone()))
            .unwrap_or_else(|| Network::Sandbox.as_str().to_string());

        let profile = toml.profile.get(&name);
        let network: Network = match profile {
            Some(profile) => profile.network.parse()?,
            None => name.parse()?,
        };
        let development = network.is_development();

        let rpc_url = if network.backend() == Backend::InProcess {
            None
        } else {
            env("SOROBAN_RPC_URL")
                .or_else(|| profile.and_then(|p| p.rpc_url.clone()))
                .or_else(|| network.default_rpc_url().map(str::to_string))
        };

        let network_passphrase = env("SOROBAN_NETWORK_PASSPHRASE")
            .or_else(|| profile.and_then(|p| p.network_passphrase.clone()))
            .unwrap_or_else(|| network.passphrase().to_string());

        let chain_id = profile
            .and_then(|p| p.chain_id)
            .unwrap_or_else(|| network.default_chain_id());

        let block_confirmations = match parse_var(env, "SOROBAN_BLOCK_CONFIRMATIONS")? {
            Some(confirmations) => confirmations,
            None => match profile.and_then(|p| p.block_confirmations) {
                Some(confirmations) => confirmations,
                None if development => 1,
                None => return Err(ConfigError::MissingField("block_confirmations".to_string())),
            },
        };

        let accounts = ["SOROBAN_ACCOUNT", "SOROBAN_ACCOUNT_2"]
            .into_iter()
            .filter_map(env)
            .filter(|account| !account.is_empty())
            .collect();

        let verification = match (env("SOROBAN_VERIFY_URL"), env("SOROBAN_VERIFY_API_KEY")) {
            (Some(url), Some(api_key)) => Some(VerifierConfig { url, api_key }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::MissingField("SOROBAN_VERIFY_API_KEY".to_string()))
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingField("SOROBAN_VERIFY_URL".to_string()))
            }
        };

        let gas = GasReportConfig {
            enabled: env("REPORT_GAS").is_some_and(|v| !v.is_empty()),
            price_api_key: env("SOROBAN_GAS_PRICE_API_KEY"),
        };

        // Sorted so rows sharing a chain id always merge the same way.
        let mut profiles: Vec<_> = toml.profile.iter().collect();
        profiles.sort_by(|a, b| a.0.cmp(b.0));

        let mut entries = Vec::with_capacity(profiles.len());
        for (profile_name, profile) in profiles {
            let chain_id = match profile.chain_id {
                Some(chain_id) => chain_id,
                None => profile.network.parse::<Network>()?.default_chain_id(),
            };
            entries.push(NetworkEntry {
                chain_id,
                name: profile_name.clone(),
                price_feed: profile.price_feed.clone(),
            });
        }
        let networks = NetworkTable::new(entries)?;

        let config = Config {
            network: NetworkDescriptor {
                name,
                network,
                chain_id,
                development,
                rpc_url,
                network_passphrase,
                block_confirmations,
            },
            networks,
            accounts,
            deployer_index: profile.and_then(|p| p.deployer_index).unwrap_or(0),
            verification,
            gas,
            wasm_dir: env("SOROBAN_WASM_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WASM_DIR)),
            deployments_dir: PathBuf::from(DEFAULT_DEPLOYMENTS_DIR),
            rpc_timeout_ms: parse_var(env, "SOROBAN_RPC_TIMEOUT_MS")?.unwrap_or(30000),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load fundme.toml; a missing file is not an error.
    pub fn load_toml(path: &Path) -> Result<Option<FundMeToml>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(toml::from_str(&content)?))
    }

    /// Validate configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        if self.network.network_passphrase.is_empty() {
            return Err(ConfigError::MissingField("network_passphrase".to_string()));
        }

        if self.network.in_process() {
            return Ok(());
        }

        let rpc_url = self
            .network
            .rpc_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ConfigError::MissingField("rpc_url".to_string()))?;

        // Validate RPC URL format
        if !rpc_url.starts_with("http://") && !rpc_url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "RPC URL must start with http:// or https://: {}",
                rpc_url
            )));
        }

        if self.accounts.is_empty() {
            return Err(ConfigError::MissingField("SOROBAN_ACCOUNT".to_string()));
        }

        if self.deployer_index >= self.accounts.len() {
            return Err(ConfigError::ValidationError(format!(
                "deployer_index {} but only {} account(s) configured",
                self.deployer_index,
                self.accounts.len()
            )));
        }

        Ok(())
    }

    /// Print the resolved configuration
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════════╗");
        println!("║           FUNDME NETWORK CONFIGURATION RESOLVED                ║");
        println!("╚════════════════════════════════════════════════════════════════╝");
        println!("  Network:             {} ({})", self.network.name, self.network.network);
        println!("  Chain ID:            {}", self.network.chain_id);
        println!("  Development:         {}", self.network.development);

        match &self.network.rpc_url {
            Some(url) => println!("  RPC URL:             {}", url),
            None => println!("  RPC URL:             (in-process)"),
        }
        println!("  Network Passphrase:  {}", self.network.network_passphrase);
        println!("  Confirmations:       {}", self.network.block_confirmations);
        println!("  Accounts:            {}", self.accounts.len());
        println!("  Deployer Index:      {}", self.deployer_index);

        if self.network.development {
            println!("  Price Feed:          (mock, deployed per run)");
        } else {
            match self.networks.get(self.network.chain_id).and_then(|e| e.price_feed.as_ref()) {
                Some(feed) => println!("  Price Feed:          {}", feed),
                None => println!("  Price Feed:          (not configured)"),
            }
        }
        for entry in self.networks.iter() {
            println!(
                "    chain {:<8} {:<12} {}",
                entry.chain_id,
                entry.name,
                entry.price_feed.as_deref().unwrap_or("-")
            );
        }

        match &self.verification {
            Some(verifier) => println!("  Verification:        {}", verifier.url),
            None => println!("  Verification:        (disabled)"),
        }

        if self.gas.enabled {
            println!("  Gas Report:          ENABLED");
            if self.gas.price_api_key.is_none() {
                println!("  Gas Pricing:         (no pricing credential)");
            }
        }

        println!("╚════════════════════════════════════════════════════════════════╝");
    }

    /// Get configuration as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn parse_var<T: std::str::FromStr>(
    env: &dyn Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    env(key)
        .map(|value| {
            value.parse().map_err(|_| ConfigError::InvalidValue {
                field: key.to_string(),
                value,
            })
        })
        .transpose()
}

// Credentials are reported as present or absent, never printed.
impl Serialize for Config {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(9))?;
        map.serialize_entry("network", &self.network)?;
        map.serialize_entry("networks", &self.networks)?;
        map.serialize_entry("accounts", &self.accounts.len())?;
        map.serialize_entry("deployer_index", &self.deployer_index)?;
        map.serialize_entry(
            "verification_url",
            &self.verification.as_ref().map(|v| v.url.as_str()),
        )?;
        map.serialize_entry("report_gas", &self.gas.enabled)?;
        map.serialize_entry("wasm_dir", &self.wasm_dir)?;
        map.serialize_entry("deployments_dir", &self.deployments_dir)?;
        map.serialize_entry("rpc_timeout_ms", &self.rpc_timeout_ms)?;
        map.end()
    }
}
