//! In-process Soroban host used as the development network.
//!
//! Every sandbox starts empty: a native asset contract and ten accounts
//! holding 10 000 units each. Authorization is mocked, so any account can
//! sign. Transactions sent through [`SandboxChain::transact`] are metered
//! from the host's CPU instruction budget. The payer's maximum fee is burned
//! before the call runs and the unused part is minted back afterwards, so a
//! payer who cannot cover the fee never gets as far as the contract.

use async_trait::async_trait;
use fund_me::FundMe;
use mock_price_feed::MockPriceFeed;
use soroban_sdk::testutils::{Address as _, EnvTestConfig, Ledger as _};
use soroban_sdk::token::{StellarAssetClient, TokenClient};
use soroban_sdk::{Address, Env};
use stellar_strkey::Strkey;
use tracing::{debug, info};

use super::{
    address_arg, i128_arg, u32_arg, Account, Artifact, Chain, ChainError, DeployRequest,
    Deployment,
};

/// Stroops in one native unit.
pub const STROOPS_PER_UNIT: i128 = 10_000_000;

/// Number of pre-funded accounts.
pub const ACCOUNT_COUNT: usize = 10;

/// Starting balance of every pre-funded account.
pub const INITIAL_BALANCE: i128 = 10_000 * STROOPS_PER_UNIT;

const LEDGER_CLOSE_SECONDS: u64 = 5;

/// CPU instruction cap per transaction, the host's default budget.
pub const MAX_INSTRUCTIONS: u64 = 100_000_000;

/// How CPU instructions turn into a fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSchedule {
    pub instructions_per_gas: u64,
    /// Stroops charged per gas unit
    pub gas_price: i128,
}

impl Default for GasSchedule {
    fn default() -> Self {
        Self {
            instructions_per_gas: 10_000,
            gas_price: 100,
        }
    }
}

impl GasSchedule {
    pub fn gas_used(&self, instructions: u64) -> u64 {
        instructions.div_ceil(self.instructions_per_gas.max(1))
    }

    /// Most a single transaction can be charged.
    pub fn max_fee(&self) -> i128 {
        self.gas_price * i128::from(self.gas_used(MAX_INSTRUCTIONS))
    }
}

/// Outcome of a metered transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub gas_used: u64,
    pub effective_gas_price: i128,
    /// Ledger the transaction closed in
    pub ledger: u32,
}

impl Receipt {
    /// What the payer was charged: effective price times gas used.
    pub fn gas_cost(&self) -> i128 {
        self.effective_gas_price * i128::from(self.gas_used)
    }
}

pub struct SandboxChain {
    env: Env,
    native: Address,
    accounts: Vec<Address>,
    gas: GasSchedule,
    report_gas: bool,
}

impl SandboxChain {
    pub fn new(gas: GasSchedule, report_gas: bool) -> Self {
        let env = Env::new_with_config(EnvTestConfig {
            capture_snapshot_at_drop: false,
        });
        env.mock_all_auths();
        env.cost_estimate().budget().reset_unlimited();

        let issuer = Address::generate(&env);
        let native = env.register_stellar_asset_contract_v2(issuer).address();
        let minter = StellarAssetClient::new(&env, &native);

        let accounts = (0..ACCOUNT_COUNT)
            .map(|_| {
                let account = Address::generate(&env);
                minter.mint(&account, &INITIAL_BALANCE);
                account
            })
            .collect();

        Self {
            env,
            native,
            accounts,
            gas,
            report_gas,
        }
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn native(&self) -> &Address {
        &self.native
    }

    pub fn account(&self, index: usize) -> Result<Address, ChainError> {
        self.accounts
            .get(index)
            .cloned()
            .ok_or(ChainError::UnknownAccount(index))
    }

    /// Turn a strkey back into a host address.
    ///
    /// The strkey is decoded first, so a bad checksum is an error here
    /// instead of a host panic.
    pub fn parse_address(&self, strkey: &str) -> Result<Address, ChainError> {
        let invalid = |reason: &str| ChainError::InvalidArgument {
            name: strkey.to_string(),
            reason: reason.to_string(),
        };
        match Strkey::from_string(strkey) {
            Ok(Strkey::PublicKeyEd25519(_)) | Ok(Strkey::Contract(_)) => {}
            Ok(_) => return Err(invalid("not an account or contract strkey")),
            Err(_) => return Err(invalid("malformed strkey")),
        }
        Ok(Address::from_string(&soroban_sdk::String::from_str(
            &self.env, strkey,
        )))
    }

    /// Native balance of an account or contract.
    pub fn balance(&self, address: &Address) -> i128 {
        TokenClient::new(&self.env, &self.native).balance(address)
    }

    /// Run one transaction paid for by `payer`, metering its gas.
    ///
    /// The payer must hold the maximum fee before the call runs. A failed
    /// call charges nothing and leaves the ledger where it was.
    pub fn transact<T>(
        &mut self,
        payer: &Address,
        call: impl FnOnce(&Env) -> Result<T, ChainError>,
    ) -> Result<(T, Receipt), ChainError> {
        let reserved = self.gas.max_fee();
        self.charge(payer, reserved)?;

        self.env.cost_estimate().budget().reset_default();
        let output = call(&self.env);
        let instructions = self.env.cost_estimate().budget().cpu_instruction_cost();
        self.env.cost_estimate().budget().reset_unlimited();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                self.refund(payer, reserved);
                return Err(e);
            }
        };

        let receipt = Receipt {
            gas_used: self.gas.gas_used(instructions.min(MAX_INSTRUCTIONS)),
            effective_gas_price: self.gas.gas_price,
            ledger: self.env.ledger().sequence() + 1,
        };
        self.refund(payer, reserved - receipt.gas_cost());
        self.close_ledgers(1);

        if self.report_gas {
            info!(
                gas_used = receipt.gas_used,
                gas_price = receipt.effective_gas_price,
                fee = receipt.gas_cost(),
                ledger = receipt.ledger,
                "Transaction receipt"
            );
        } else {
            debug!(
                gas_used = receipt.gas_used,
                fee = receipt.gas_cost(),
                ledger = receipt.ledger,
                "Transaction receipt"
            );
        }

        Ok((output, receipt))
    }

    fn charge(&self, payer: &Address, fee: i128) -> Result<(), ChainError> {
        if fee == 0 {
            return Ok(());
        }
        match TokenClient::new(&self.env, &self.native).try_burn(payer, &fee) {
            Ok(Ok(())) => Ok(()),
            _ => Err(ChainError::InsufficientFunds { fee }),
        }
    }

    fn refund(&self, payer: &Address, amount: i128) {
        if amount > 0 {
            StellarAssetClient::new(&self.env, &self.native).mint(payer, &amount);
        }
    }

    fn close_ledgers(&self, count: u32) {
        self.env.ledger().with_mut(|li| {
            li.sequence_number += count;
            li.timestamp += u64::from(count) * LEDGER_CLOSE_SECONDS;
        });
    }
}

/// Render a host address as its strkey.
pub fn address_to_string(address: &Address) -> String {
    let strkey = address.to_string();
    let mut buf = vec![0u8; strkey.len() as usize];
    strkey.copy_into_slice(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

#[async_trait(?Send)]
impl Chain for SandboxChain {
    async fn deploy(&mut self, request: DeployRequest<'_>) -> Result<Deployment, ChainError> {
        let address = match request.artifact {
            Artifact::MockPriceFeed => {
                let decimals = u32_arg(request.args, "decimals")?;
                let initial_answer = i128_arg(request.args, "initial_answer")?;
                self.env.register(MockPriceFeed, (decimals, initial_answer))
            }
            Artifact::FundMe => {
                let owner = self.parse_address(address_arg(request.args, "owner")?)?;
                let price_feed = self.parse_address(address_arg(request.args, "price_feed")?)?;
                let token = self.parse_address(address_arg(request.args, "token")?)?;
                self.env.register(FundMe, (owner, price_feed, token))
            }
        };

        self.close_ledgers(request.confirmations);

        Ok(Deployment {
            address: address_to_string(&address),
            ledger: self.env.ledger().sequence(),
        })
    }

    async fn latest_ledger(&self) -> Result<u32, ChainError> {
        Ok(self.env.ledger().sequence())
    }

    async fn native_token(&mut self) -> Result<String, ChainError> {
        Ok(address_to_string(&self.native))
    }

    async fn account_address(&self, signer: &str) -> Result<String, ChainError> {
        self.accounts
            .iter()
            .map(address_to_string)
            .find(|address| address == signer)
            .ok_or_else(|| ChainError::UnknownSigner(signer.to_string()))
    }

    async fn accounts(&self) -> Result<Vec<Account>, ChainError> {
        Ok(self
            .accounts
            .iter()
            .map(|account| {
                let address = address_to_string(account);
                Account {
                    signer: address.clone(),
                    address,
                }
            })
            .collect())
    }
}
