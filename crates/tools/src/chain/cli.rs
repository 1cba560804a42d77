//! RPC backend for a local node and the public networks: the `stellar` CLI
//! signs and submits, Soroban RPC reports ledger progress.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::rpc::RpcClient;
use super::{Account, Chain, ChainError, DeployRequest, Deployment};
use crate::config::Config;

const STELLAR: &str = "stellar";
const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Polls allowed per requested confirmation before giving up.
const POLLS_PER_CONFIRMATION: u32 = 15;

pub struct CliChain {
    rpc: RpcClient,
    network_passphrase: String,
    signers: Vec<String>,
    wasm_dir: PathBuf,
    native: Option<String>,
}

impl CliChain {
    pub fn new(config: &Config) -> Result<Self, ChainError> {
        let url = config
            .network
            .rpc_url
            .clone()
            .ok_or_else(|| ChainError::NoRpcUrl(config.network.name.clone()))?;

        Ok(Self {
            rpc: RpcClient::new(url, Duration::from_millis(config.rpc_timeout_ms))?,
            network_passphrase: config.network.network_passphrase.clone(),
            signers: config.accounts.clone(),
            wasm_dir: config.wasm_dir.clone(),
            native: None,
        })
    }

    fn network_args(&self) -> [OsString; 4] {
        [
            "--rpc-url".into(),
            self.rpc.url().into(),
            "--network-passphrase".into(),
            self.network_passphrase.clone().into(),
        ]
    }

    /// Run the CLI and return trimmed stdout.
    ///
    /// `command` names the invocation in errors; arguments are left out since
    /// they may carry signing secrets.
    async fn run(&self, command: &str, args: Vec<OsString>) -> Result<String, ChainError> {
        debug!(command, "Running stellar CLI");
        let output = Command::new(STELLAR).args(args).output().await?;

        if !output.status.success() {
            return Err(ChainError::Command {
                command: command.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn wait_for(&self, start: u32, confirmations: u32) -> Result<u32, ChainError> {
        let target = start.saturating_add(confirmations);
        let max_polls = confirmations.max(1) * POLLS_PER_CONFIRMATION;

        for _ in 0..max_polls {
            let ledger = self.rpc.latest_ledger().await?.sequence;
            if ledger >= target {
                return Ok(ledger);
            }
            debug!(ledger, target, "Waiting for confirmations");
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Err(ChainError::ConfirmationTimeout { target })
    }
}

/// Whether `value` already is a public account address.
fn is_account_address(value: &str) -> bool {
    value.len() == 56 && value.starts_with('G')
}

#[async_trait(?Send)]
impl Chain for CliChain {
    async fn deploy(&mut self, request: DeployRequest<'_>) -> Result<Deployment, ChainError> {
        let wasm = self.wasm_dir.join(request.artifact.wasm_file());
        info!(
            contract = %request.artifact,
            wasm = %wasm.display(),
            from = %request.from.address,
            "Submitting deployment"
        );

        let mut args: Vec<OsString> = vec![
            "contract".into(),
            "deploy".into(),
            "--wasm".into(),
            wasm.into_os_string(),
            "--source-account".into(),
            request.from.signer.clone().into(),
        ];
        args.extend(self.network_args());
        if !request.args.is_empty() {
            args.push("--".into());
            for arg in request.args {
                args.push(format!("--{}", arg.name).into());
                args.push(arg.value.to_string().into());
            }
        }

        let stdout = self.run("stellar contract deploy", args).await?;
        let address = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or_default()
            .to_string();
        if address.is_empty() {
            return Err(ChainError::Command {
                command: "stellar contract deploy".to_string(),
                stderr: "no contract id in output".to_string(),
            });
        }

        let start = self.rpc.latest_ledger().await?.sequence;
        let ledger = self.wait_for(start, request.confirmations).await?;

        Ok(Deployment { address, ledger })
    }

    async fn latest_ledger(&self) -> Result<u32, ChainError> {
        Ok(self.rpc.latest_ledger().await?.sequence)
    }

    async fn native_token(&mut self) -> Result<String, ChainError> {
        if let Some(native) = &self.native {
            return Ok(native.clone());
        }

        let mut args: Vec<OsString> = vec![
            "contract".into(),
            "id".into(),
            "asset".into(),
            "--asset".into(),
            "native".into(),
        ];
        args.extend(self.network_args().into_iter().skip(2));

        let native = self.run("stellar contract id asset", args).await?;
        self.native = Some(native.clone());
        Ok(native)
    }

    async fn account_address(&self, signer: &str) -> Result<String, ChainError> {
        if is_account_address(signer) {
            return Ok(signer.to_string());
        }
        self.run(
            "stellar keys address",
            vec!["keys".into(), "address".into(), signer.into()],
        )
        .await
    }

    async fn accounts(&self) -> Result<Vec<Account>, ChainError> {
        let mut accounts = Vec::with_capacity(self.signers.len());
        for signer in &self.signers {
            accounts.push(Account {
                signer: signer.clone(),
                address: self.account_address(signer).await?,
            });
        }
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_address_detection() {
        assert!(is_account_address(
            "GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7"
        ));
        assert!(!is_account_address("alice"));
        assert!(!is_account_address(
            "CAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7"
        ));
    }

    #[test]
    fn test_new_requires_rpc_url() {
        let mut config = crate::config::Config::resolve(&|_: &str| None, None, None).unwrap();
        config.network.rpc_url = None;

        assert!(matches!(
            CliChain::new(&config),
            Err(ChainError::NoRpcUrl(name)) if name == "sandbox"
        ));
    }
}
