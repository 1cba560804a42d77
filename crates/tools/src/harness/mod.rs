//! Scenario suite for FundMe on the development network.
//!
//! Every scenario gets a fresh sandbox with the whole deployment pipeline run
//! against it, so scenarios never see each other's state.

use soroban_sdk::Address;
use std::fmt::Debug;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::chain::{ChainError, GasSchedule, SandboxChain};
use crate::config::Config;
use crate::deploy::{
    DeployError, DeploySettings, DeploymentRegistry, ExecutionContext, Orchestrator,
};
use crate::network::{NetworkDescriptor, NetworkTable};

pub mod handles;
mod scenarios;

pub use handles::{FundMeHandle, MockPriceFeedHandle};
pub use scenarios::{Scenario, SEND_VALUE};

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("setup failed: {0}")]
    Deploy(#[from] DeployError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("assertion failed: {0}")]
    Assertion(String),
}

pub fn check(condition: bool, message: impl Into<String>) -> Result<(), HarnessError> {
    if condition {
        Ok(())
    } else {
        Err(HarnessError::Assertion(message.into()))
    }
}

pub fn check_eq<T: PartialEq + Debug>(left: T, right: T, what: &str) -> Result<(), HarnessError> {
    if left == right {
        Ok(())
    } else {
        Err(HarnessError::Assertion(format!(
            "{}: expected {:?}, got {:?}",
            what, right, left
        )))
    }
}

/// Require `result` to be a contract rejection with `reason`.
pub fn expect_revert<T: Debug>(
    result: Result<T, ChainError>,
    reason: &str,
) -> Result<(), HarnessError> {
    match result {
        Err(e) if e.is_revert_with(reason) => Ok(()),
        Err(e) => Err(HarnessError::Assertion(format!(
            "expected revert {}, got {}",
            reason, e
        ))),
        Ok(value) => Err(HarnessError::Assertion(format!(
            "expected revert {}, call succeeded with {:?}",
            reason, value
        ))),
    }
}

/// A freshly deployed FundMe and mock feed on a new sandbox.
pub struct Fixture {
    pub chain: SandboxChain,
    pub fund_me: Address,
    pub price_feed: Address,
    pub deployer: Address,
    /// Every account other than the deployer
    pub users: Vec<Address>,
}

impl Fixture {
    pub async fn deploy(
        network: &NetworkDescriptor,
        deployer_index: usize,
        report_gas: bool,
    ) -> Result<Self, HarnessError> {
        let mut chain = SandboxChain::new(GasSchedule::default(), report_gas);

        let registry = {
            let mut ctx = ExecutionContext::open(
                network.clone(),
                NetworkTable::default(),
                deployer_index,
                DeploymentRegistry::in_memory(),
                &mut chain,
            )
            .await?;

            let settings = DeploySettings {
                development: true,
                confirmations: network.block_confirmations,
                verifier: None,
            };
            Orchestrator::standard(settings).run(&mut ctx, &["all"]).await?;
            ctx.into_registry()
        };

        let fund_me = chain.parse_address(&registry.get("FundMe")?.address)?;
        let price_feed = chain.parse_address(&registry.get("MockPriceFeed")?.address)?;
        let deployer = chain.account(deployer_index)?;
        let users = (0..crate::chain::sandbox::ACCOUNT_COUNT)
            .filter(|&i| i != deployer_index)
            .map(|i| chain.account(i))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            chain,
            fund_me,
            price_feed,
            deployer,
            users,
        })
    }

    /// FundMe as the deployer.
    pub fn fund_me(&mut self) -> FundMeHandle<'_> {
        FundMeHandle::new(&mut self.chain, self.fund_me.clone(), self.deployer.clone())
    }

    /// FundMe as some other account.
    pub fn fund_me_as(&mut self, signer: &Address) -> FundMeHandle<'_> {
        FundMeHandle::new(&mut self.chain, self.fund_me.clone(), signer.clone())
    }

    pub fn price_feed(&mut self) -> MockPriceFeedHandle<'_> {
        MockPriceFeedHandle::new(&mut self.chain, self.price_feed.clone(), self.deployer.clone())
    }

    pub fn balance(&self, address: &Address) -> i128 {
        self.chain.balance(address)
    }
}

#[derive(Debug)]
pub struct ScenarioResult {
    pub name: &'static str,
    /// `Err` holds the failure message
    pub outcome: Result<(), String>,
}

#[derive(Debug)]
pub struct SuiteReport {
    pub network: String,
    /// Set when the network is not a development network
    pub skipped: bool,
    pub results: Vec<ScenarioResult>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn print_summary(&self) {
        if self.skipped {
            println!("Skipped: {} is not a development network", self.network);
            return;
        }
        for result in &self.results {
            match &result.outcome {
                Ok(()) => println!("  ✓ {}", result.name),
                Err(message) => println!("  ✗ {}: {}", result.name, message),
            }
        }
        println!();
        println!("{} passing, {} failing", self.passed(), self.failed());
    }
}

pub struct Suite {
    scenarios: Vec<Scenario>,
}

impl Suite {
    pub fn new(scenarios: Vec<Scenario>) -> Self {
        Self { scenarios }
    }

    /// Every FundMe scenario.
    pub fn standard() -> Self {
        Self::new(scenarios::all())
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// Run each scenario against its own fixture.
    ///
    /// Fixtures are always in-process, including for a development network
    /// backed by a local node. Setup failures abort the suite; scenario
    /// failures are collected.
    pub async fn run(&self, config: &Config) -> Result<SuiteReport, HarnessError> {
        let network = &config.network;
        if !network.development {
            warn!(network = %network.name, "Not a development network, skipping tests");
            return Ok(SuiteReport {
                network: network.name.clone(),
                skipped: true,
                results: vec![],
            });
        }

        if !network.in_process() {
            info!(network = %network.name, "Running scenarios on fresh in-process hosts");
        }

        let mut results = Vec::with_capacity(self.scenarios.len());
        for scenario in &self.scenarios {
            let mut fixture =
                Fixture::deploy(network, config.deployer_index, config.gas.enabled).await?;

            let outcome = (scenario.run)(&mut fixture).map_err(|e| e.to_string());
            match &outcome {
                Ok(()) => info!(scenario = scenario.name, "passed"),
                Err(message) => error!(scenario = scenario.name, %message, "failed"),
            }
            results.push(ScenarioResult {
                name: scenario.name,
                outcome,
            });
        }

        Ok(SuiteReport {
            network: network.name.clone(),
            skipped: false,
            results,
        })
    }
}
