//! Network identity and the static chain-id → price-feed table.

use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::ConfigError;

/// Networks the tools know how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// In-process Soroban host, rebuilt from scratch on every run
    Sandbox,
    /// Standalone node on this machine, e.g. `stellar container start local`
    Local,
    /// Stellar Testnet
    Testnet,
    /// Stellar Mainnet
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Sandbox => "sandbox",
            Network::Local => "local",
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }

    /// Development networks get mocks instead of public oracles and run the test suite.
    pub fn is_development(&self) -> bool {
        matches!(self, Network::Sandbox | Network::Local)
    }

    pub fn backend(&self) -> Backend {
        match self {
            Network::Sandbox => Backend::InProcess,
            Network::Local | Network::Testnet | Network::Mainnet => Backend::Rpc,
        }
    }

    /// Default Soroban RPC endpoint. The sandbox has none.
    pub fn default_rpc_url(&self) -> Option<&'static str> {
        match self {
            Network::Sandbox => None,
            Network::Local => Some("http://localhost:8000"),
            Network::Testnet => Some("https://soroban-testnet.stellar.org"),
            Network::Mainnet => Some("https://mainnet.sorobanrpc.com"),
        }
    }

    /// Network passphrase for transaction signing
    pub fn passphrase(&self) -> &'static str {
        match self {
            Network::Sandbox | Network::Local => "Standalone Network ; February 2017",
            Network::Testnet => "Test SDF Network ; September 2015",
            Network::Mainnet => "Public Global Stellar Network ; September 2015",
        }
    }

    /// Numeric identifier used as the key into the price-feed table.
    pub fn default_chain_id(&self) -> u32 {
        match self {
            Network::Sandbox | Network::Local => 31337,
            Network::Testnet => 2,
            Network::Mainnet => 1,
        }
    }
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sandbox" => Ok(Network::Sandbox),
            "local" => Ok(Network::Local),
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(ConfigError::InvalidNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the tools talk to a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// A [`SandboxChain`](crate::chain::SandboxChain) living in this process
    InProcess,
    /// The `stellar` CLI plus Soroban RPC
    Rpc,
}

/// The active network, fully resolved. Immutable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkDescriptor {
    /// Profile name, used for deployment directories and log lines
    pub name: String,
    pub network: Network,
    pub chain_id: u32,
    pub development: bool,
    pub rpc_url: Option<String>,
    pub network_passphrase: String,
    /// Ledgers to wait after a deployment before treating it as final
    pub block_confirmations: u32,
}

impl NetworkDescriptor {
    /// Descriptor for the in-process sandbox with its defaults.
    pub fn sandbox() -> Self {
        let network = Network::Sandbox;
        Self {
            name: network.as_str().to_string(),
            network,
            chain_id: network.default_chain_id(),
            development: true,
            rpc_url: None,
            network_passphrase: network.passphrase().to_string(),
            block_confirmations: 1,
        }
    }

    /// True when the chain lives in this process and vanishes with it.
    pub fn in_process(&self) -> bool {
        self.network.backend() == Backend::InProcess
    }
}

/// One row of the price-feed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub chain_id: u32,
    pub name: String,
    /// Public XLM/USD feed on this chain
    pub price_feed: Option<String>,
}

/// Static mapping from chain id to its configuration. Read-only once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkTable {
    entries: BTreeMap<u32, NetworkEntry>,
}

impl NetworkTable {
    pub fn new(entries: impl IntoIterator<Item = NetworkEntry>) -> Result<Self, ConfigError> {
        let mut table = Self::default();
        for entry in entries {
            table.insert(entry)?;
        }
        Ok(table)
    }

    /// Add a row. Rows sharing a chain id must name the same feed; a row
    /// without a feed takes the other row's.
    fn insert(&mut self, entry: NetworkEntry) -> Result<(), ConfigError> {
        match self.entries.entry(entry.chain_id) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.price_feed.is_none() {
                    if entry.price_feed.is_some() {
                        *existing = entry;
                    }
                } else if entry.price_feed.is_some() && entry.price_feed != existing.price_feed {
                    return Err(ConfigError::ValidationError(format!(
                        "profiles {} and {} share chain id {} but name different price feeds",
                        existing.name, entry.name, entry.chain_id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, chain_id: u32) -> Option<&NetworkEntry> {
        self.entries.get(&chain_id)
    }

    /// Rows in chain id order.
    pub fn iter(&self) -> impl Iterator<Item = &NetworkEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_from_str() {
        assert_eq!("sandbox".parse::<Network>().unwrap(), Network::Sandbox);
        assert_eq!("local".parse::<Network>().unwrap(), Network::Local);
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("MAINNET".parse::<Network>().unwrap(), Network::Mainnet);
        assert!("rinkeby".parse::<Network>().is_err());
    }

    #[test]
    fn test_development_networks() {
        assert!(Network::Sandbox.is_development());
        assert!(Network::Local.is_development());
        assert!(!Network::Testnet.is_development());
        assert!(!Network::Mainnet.is_development());
    }

    #[test]
    fn test_only_sandbox_runs_in_process() {
        assert_eq!(Network::Sandbox.backend(), Backend::InProcess);
        assert_eq!(Network::Local.backend(), Backend::Rpc);
        assert_eq!(Network::Testnet.backend(), Backend::Rpc);
        assert_eq!(Network::Mainnet.backend(), Backend::Rpc);
        assert!(NetworkDescriptor::sandbox().in_process());
    }

    #[test]
    fn test_sandbox_has_no_rpc() {
        assert_eq!(Network::Sandbox.default_rpc_url(), None);
        assert_eq!(Network::Local.default_rpc_url(), Some("http://localhost:8000"));
        assert_eq!(
            Network::Testnet.default_rpc_url(),
            Some("https://soroban-testnet.stellar.org")
        );
    }

    #[test]
    fn test_table_lookup() {
        let table = NetworkTable::new([
            NetworkEntry {
                chain_id: 2,
                name: "testnet".to_string(),
                price_feed: Some("CFEED".to_string()),
            },
            NetworkEntry {
                chain_id: 1,
                name: "mainnet".to_string(),
                price_feed: None,
            },
        ])
        .unwrap();

        let chain_ids: Vec<u32> = table.iter().map(|entry| entry.chain_id).collect();
        assert_eq!(chain_ids, [1, 2]);
        assert_eq!(table.get(2).unwrap().price_feed.as_deref(), Some("CFEED"));
        assert_eq!(table.get(1).unwrap().price_feed, None);
        assert!(table.get(4).is_none());
    }

    fn entry(name: &str, chain_id: u32, feed: Option<&str>) -> NetworkEntry {
        NetworkEntry {
            chain_id,
            name: name.to_string(),
            price_feed: feed.map(str::to_string),
        }
    }

    #[test]
    fn test_shared_chain_id_keeps_the_configured_feed() {
        for rows in [
            [entry("testnet", 2, Some("CFEED")), entry("testnet-rpc2", 2, None)],
            [entry("testnet-rpc2", 2, None), entry("testnet", 2, Some("CFEED"))],
        ] {
            let table = NetworkTable::new(rows).unwrap();
            let row = table.get(2).unwrap();
            assert_eq!(row.name, "testnet");
            assert_eq!(row.price_feed.as_deref(), Some("CFEED"));
        }
    }

    #[test]
    fn test_shared_chain_id_with_different_feeds_is_rejected() {
        let result = NetworkTable::new([
            entry("testnet", 2, Some("CFEED")),
            entry("testnet-rpc2", 2, Some("COTHERFEED")),
        ]);

        assert!(matches!(result, Err(ConfigError::ValidationError(message)) if message.contains("chain id 2")));
    }
}
