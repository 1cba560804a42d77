//! The chain collaborator: deploy contracts, read ledger state, list accounts.
//!
//! Two backends implement [`Chain`]:
//!
//! - [`SandboxChain`]: an in-process Soroban host, the `sandbox` network
//! - [`CliChain`]: the `stellar` CLI plus Soroban RPC, for a local node and
//!   the public networks

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::Config;
use crate::network::Backend;

pub mod cli;
pub mod rpc;
pub mod sandbox;

pub use cli::CliChain;
pub use rpc::RpcClient;
pub use sandbox::{GasSchedule, Receipt, SandboxChain};

/// Chain error types
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("missing constructor argument: {0}")]
    MissingArgument(String),

    #[error("invalid constructor argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("insufficient balance to pay {fee} for gas")]
    InsufficientFunds { fee: i128 },

    #[error("no account at index {0}")]
    UnknownAccount(usize),

    #[error("unknown signer {0}")]
    UnknownSigner(String),

    #[error("ledger {target} not reached while waiting for confirmations")]
    ConfirmationTimeout { target: u32 },

    #[error("network {0} has no RPC URL")]
    NoRpcUrl(String),

    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl ChainError {
    /// True when this is a contract rejection carrying `reason`.
    pub fn is_revert_with(&self, reason: &str) -> bool {
        matches!(self, ChainError::Reverted(r) if r == reason)
    }
}

/// Contracts this workspace knows how to deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Artifact {
    MockPriceFeed,
    FundMe,
}

impl Artifact {
    /// Name deployments are registered under.
    pub fn contract_name(&self) -> &'static str {
        match self {
            Artifact::MockPriceFeed => "MockPriceFeed",
            Artifact::FundMe => "FundMe",
        }
    }

    /// File name cargo gives the compiled contract.
    pub fn wasm_file(&self) -> &'static str {
        match self {
            Artifact::MockPriceFeed => "mock_price_feed.wasm",
            Artifact::FundMe => "fund_me.wasm",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.contract_name())
    }
}

/// A typed constructor argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgValue {
    Address(String),
    U32(u32),
    I128(i128),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Address(address) => f.write_str(address),
            ArgValue::U32(value) => write!(f, "{}", value),
            ArgValue::I128(value) => write!(f, "{}", value),
        }
    }
}

/// A named constructor argument, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorArg {
    pub name: String,
    pub value: ArgValue,
}

impl ConstructorArg {
    pub fn address(name: &str, address: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: ArgValue::Address(address.into()),
        }
    }

    pub fn u32(name: &str, value: u32) -> Self {
        Self {
            name: name.to_string(),
            value: ArgValue::U32(value),
        }
    }

    pub fn i128(name: &str, value: i128) -> Self {
        Self {
            name: name.to_string(),
            value: ArgValue::I128(value),
        }
    }
}

fn find_arg<'a>(args: &'a [ConstructorArg], name: &str) -> Result<&'a ArgValue, ChainError> {
    args.iter()
        .find(|arg| arg.name == name)
        .map(|arg| &arg.value)
        .ok_or_else(|| ChainError::MissingArgument(name.to_string()))
}

fn mismatch(name: &str, expected: &str) -> ChainError {
    ChainError::InvalidArgument {
        name: name.to_string(),
        reason: format!("expected {}", expected),
    }
}

pub(crate) fn address_arg<'a>(args: &'a [ConstructorArg], name: &str) -> Result<&'a str, ChainError> {
    match find_arg(args, name)? {
        ArgValue::Address(address) => Ok(address),
        _ => Err(mismatch(name, "an address")),
    }
}

pub(crate) fn u32_arg(args: &[ConstructorArg], name: &str) -> Result<u32, ChainError> {
    match find_arg(args, name)? {
        ArgValue::U32(value) => Ok(*value),
        _ => Err(mismatch(name, "a u32")),
    }
}

pub(crate) fn i128_arg(args: &[ConstructorArg], name: &str) -> Result<i128, ChainError> {
    match find_arg(args, name)? {
        ArgValue::I128(value) => Ok(*value),
        _ => Err(mismatch(name, "an i128")),
    }
}

/// A signing account: the handle the chain signs with, and its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub signer: String,
    pub address: String,
}

/// What to deploy, from whom, and how long to wait for it.
#[derive(Debug, Clone, Copy)]
pub struct DeployRequest<'a> {
    pub artifact: Artifact,
    pub from: &'a Account,
    pub args: &'a [ConstructorArg],
    pub confirmations: u32,
}

/// Where a contract landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub address: String,
    /// Ledger sequence once the requested confirmations had elapsed
    pub ledger: u32,
}

#[async_trait(?Send)]
pub trait Chain {
    /// Deploy `request.artifact` and wait for `request.confirmations` ledgers.
    async fn deploy(&mut self, request: DeployRequest<'_>) -> Result<Deployment, ChainError>;

    /// Sequence number of the most recently closed ledger.
    async fn latest_ledger(&self) -> Result<u32, ChainError>;

    /// Address of the native asset contract funders pay in.
    async fn native_token(&mut self) -> Result<String, ChainError>;

    /// Public address behind a signing identity.
    async fn account_address(&self, signer: &str) -> Result<String, ChainError>;

    /// Every account this chain can sign for, in index order.
    async fn accounts(&self) -> Result<Vec<Account>, ChainError>;
}

/// Open the chain backend for the configured network.
pub fn connect(config: &Config) -> Result<Box<dyn Chain>, ChainError> {
    match config.network.network.backend() {
        Backend::InProcess => Ok(Box::new(SandboxChain::new(
            GasSchedule::default(),
            config.gas.enabled,
        ))),
        Backend::Rpc => Ok(Box::new(CliChain::new(config)?)),
    }
}
