//! FundMe Tools Library
//!
//! Network configuration, deployment and the scenario harness for the
//! FundMe Soroban contract.

pub mod chain;
pub mod config;
pub mod deploy;
pub mod harness;
pub mod network;
pub mod tasks;
pub mod verify;

#[cfg(test)]
mod test_http;

pub use config::{Config, ConfigError};
pub use network::{Network, NetworkDescriptor};
