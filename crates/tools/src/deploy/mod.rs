//! Deployment pipeline: tagged scripts run in dependency order against an
//! explicit execution context.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::info;

use crate::chain::{self, Account, Chain, ChainError};
use crate::config::Config;
use crate::network::{NetworkDescriptor, NetworkTable};
use crate::verify::VerifyError;

pub mod registry;
pub mod scripts;

pub use registry::{DeploymentRecord, DeploymentRegistry};
pub use scripts::{
    deploy_fund_me, resolve_price_feed, DeploySettings, FundMeScript, MockPriceFeedScript,
    DECIMALS, INITIAL_ANSWER,
};

/// Deployment error types
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("no deployment named {0}")]
    MissingDeployment(String),

    #[error("chain id {0} is not in the network table")]
    UnknownChain(u32),

    #[error("network {network} (chain id {chain_id}) has no price feed configured")]
    MissingPriceFeed { chain_id: u32, network: String },

    #[error("script {script} depends on unknown script {dependency}")]
    UnknownDependency { script: String, dependency: String },

    #[error("dependency cycle between scripts: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("no deploy script carries any of the tags: {0}")]
    NoScripts(String),

    #[error("verifier setup failed: {0}")]
    Verifier(#[from] VerifyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Accounts as deploy scripts see them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedAccounts {
    pub deployer: Account,
    /// Every other account, in index order
    pub users: Vec<Account>,
}

impl NamedAccounts {
    pub fn resolve(mut accounts: Vec<Account>, deployer_index: usize) -> Result<Self, DeployError> {
        if deployer_index >= accounts.len() {
            return Err(ChainError::UnknownAccount(deployer_index).into());
        }
        let deployer = accounts.remove(deployer_index);
        Ok(Self {
            deployer,
            users: accounts,
        })
    }
}

/// Everything a deploy script may touch.
pub struct ExecutionContext<'a> {
    pub network: NetworkDescriptor,
    pub networks: NetworkTable,
    pub accounts: NamedAccounts,
    pub registry: DeploymentRegistry,
    pub chain: &'a mut dyn Chain,
}

impl<'a> ExecutionContext<'a> {
    /// Build a context over `chain`, resolving its accounts.
    pub async fn open(
        network: NetworkDescriptor,
        networks: NetworkTable,
        deployer_index: usize,
        registry: DeploymentRegistry,
        chain: &'a mut dyn Chain,
    ) -> Result<ExecutionContext<'a>, DeployError> {
        let accounts = NamedAccounts::resolve(chain.accounts().await?, deployer_index)?;
        Ok(Self {
            network,
            networks,
            accounts,
            registry,
            chain,
        })
    }

    pub fn into_registry(self) -> DeploymentRegistry {
        self.registry
    }
}

#[async_trait(?Send)]
pub trait DeployScript {
    fn name(&self) -> &str;

    /// Tags selecting this script.
    fn tags(&self) -> &[&'static str];

    /// Names of scripts that must run first.
    fn dependencies(&self) -> &[&'static str];

    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), DeployError>;
}

/// Runs deploy scripts selected by tag, dependencies first.
#[derive(Default)]
pub struct Orchestrator {
    scripts: Vec<Box<dyn DeployScript>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, script: impl DeployScript + 'static) -> Self {
        self.scripts.push(Box::new(script));
        self
    }

    /// The mock price feed and FundMe scripts.
    pub fn standard(settings: DeploySettings) -> Self {
        Self::new()
            .with_script(MockPriceFeedScript)
            .with_script(FundMeScript::new(settings))
    }

    /// Scripts carrying any of `tags` plus their dependencies, in run order.
    ///
    /// Ties are broken by registration order.
    pub fn plan(&self, tags: &[&str]) -> Result<Vec<&dyn DeployScript>, DeployError> {
        let by_name: HashMap<&str, usize> = self
            .scripts
            .iter()
            .enumerate()
            .map(|(i, script)| (script.name(), i))
            .collect();

        let mut selected = BTreeSet::new();
        let mut pending: Vec<usize> = self
            .scripts
            .iter()
            .enumerate()
            .filter(|(_, script)| script.tags().iter().any(|tag| tags.contains(tag)))
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            return Err(DeployError::NoScripts(tags.join(", ")));
        }

        while let Some(i) = pending.pop() {
            if !selected.insert(i) {
                continue;
            }
            for dependency in self.scripts[i].dependencies() {
                let dep = by_name.get(dependency).copied().ok_or_else(|| {
                    DeployError::UnknownDependency {
                        script: self.scripts[i].name().to_string(),
                        dependency: dependency.to_string(),
                    }
                })?;
                pending.push(dep);
            }
        }

        // Kahn's algorithm over the selected subgraph
        let mut in_degree: HashMap<usize, usize> = selected
            .iter()
            .map(|&i| (i, self.scripts[i].dependencies().len()))
            .collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(selected.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            let name = self.scripts[i].name();
            for &j in &selected {
                let hits = self.scripts[j]
                    .dependencies()
                    .iter()
                    .filter(|dep| **dep == name)
                    .count();
                if hits == 0 {
                    continue;
                }
                if let Some(degree) = in_degree.get_mut(&j) {
                    *degree -= hits;
                    if *degree == 0 {
                        ready.insert(j);
                    }
                }
            }
        }

        if order.len() < selected.len() {
            let stuck = selected
                .iter()
                .filter(|i| !order.contains(*i))
                .map(|&i| self.scripts[i].name().to_string())
                .collect();
            return Err(DeployError::DependencyCycle(stuck));
        }

        Ok(order.into_iter().map(|i| self.scripts[i].as_ref()).collect())
    }

    pub async fn run(
        &self,
        ctx: &mut ExecutionContext<'_>,
        tags: &[&str],
    ) -> Result<(), DeployError> {
        for script in self.plan(tags)? {
            info!(script = script.name(), network = %ctx.network.name, "Running deploy script");
            script.run(ctx).await?;
        }
        Ok(())
    }
}

/// Deploy everything selected by `tags` to the configured network.
pub async fn deploy_all(config: &Config, tags: &[&str]) -> Result<DeploymentRegistry, DeployError> {
    let mut chain = chain::connect(config)?;

    let registry = if config.network.in_process() {
        DeploymentRegistry::in_memory()
    } else {
        DeploymentRegistry::open(config.deployments_dir.join(&config.network.name))?
    };

    let mut ctx = ExecutionContext::open(
        config.network.clone(),
        config.networks.clone(),
        config.deployer_index,
        registry,
        chain.as_mut(),
    )
    .await?;

    info!(
        network = %ctx.network.name,
        deployer = %ctx.accounts.deployer.address,
        "Starting deployment"
    );

    Orchestrator::standard(DeploySettings::from_config(config)?)
        .run(&mut ctx, tags)
        .await?;

    Ok(ctx.into_registry())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Script {
        name: &'static str,
        tags: &'static [&'static str],
        deps: &'static [&'static str],
    }

    #[async_trait(?Send)]
    impl DeployScript for Script {
        fn name(&self) -> &str {
            self.name
        }

        fn tags(&self) -> &[&'static str] {
            self.tags
        }

        fn dependencies(&self) -> &[&'static str] {
            self.deps
        }

        async fn run(&self, _ctx: &mut ExecutionContext<'_>) -> Result<(), DeployError> {
            Ok(())
        }
    }

    fn script(
        name: &'static str,
        tags: &'static [&'static str],
        deps: &'static [&'static str],
    ) -> Script {
        Script { name, tags, deps }
    }

    fn names(plan: Vec<&dyn DeployScript>) -> Vec<String> {
        plan.iter().map(|s| s.name().to_string()).collect()
    }

    fn account(n: u8) -> Account {
        Account {
            signer: format!("signer-{}", n),
            address: format!("G{}", n),
        }
    }

    #[test]
    fn test_dependencies_run_first() {
        let orchestrator = Orchestrator::new()
            .with_script(script("fund-me", &["all", "fundme"], &["mocks"]))
            .with_script(script("mocks", &["all", "mocks"], &[]));

        let plan = orchestrator.plan(&["all"]).unwrap();
        assert_eq!(names(plan), ["mocks", "fund-me"]);
    }

    #[test]
    fn test_tag_pulls_in_dependencies() {
        let orchestrator = Orchestrator::new()
            .with_script(script("mocks", &["mocks"], &[]))
            .with_script(script("fund-me", &["fundme"], &["mocks"]))
            .with_script(script("extra", &["extra"], &[]));

        let plan = orchestrator.plan(&["fundme"]).unwrap();
        assert_eq!(names(plan), ["mocks", "fund-me"]);
    }

    #[test]
    fn test_registration_order_breaks_ties() {
        let orchestrator = Orchestrator::new()
            .with_script(script("b", &["all"], &[]))
            .with_script(script("a", &["all"], &[]))
            .with_script(script("c", &["all"], &["a", "b"]));

        let plan = orchestrator.plan(&["all"]).unwrap();
        assert_eq!(names(plan), ["b", "a", "c"]);
    }

    #[test]
    fn test_unknown_dependency() {
        let orchestrator =
            Orchestrator::new().with_script(script("fund-me", &["all"], &["oracle"]));

        assert!(matches!(
            orchestrator.plan(&["all"]),
            Err(DeployError::UnknownDependency { script, dependency })
                if script == "fund-me" && dependency == "oracle"
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let orchestrator = Orchestrator::new()
            .with_script(script("a", &["all"], &["b"]))
            .with_script(script("b", &["all"], &["a"]))
            .with_script(script("c", &["all"], &[]));

        match orchestrator.plan(&["all"]) {
            Err(DeployError::DependencyCycle(stuck)) => assert_eq!(stuck, ["a", "b"]),
            _ => panic!("expected a dependency cycle"),
        }
    }

    #[test]
    fn test_unmatched_tags() {
        let orchestrator = Orchestrator::new().with_script(script("mocks", &["mocks"], &[]));
        assert!(matches!(
            orchestrator.plan(&["nothing"]),
            Err(DeployError::NoScripts(_))
        ));
    }

    #[test]
    fn test_named_accounts() {
        let accounts = NamedAccounts::resolve(vec![account(0), account(1), account(2)], 1).unwrap();
        assert_eq!(accounts.deployer, account(1));
        assert_eq!(accounts.users, [account(0), account(2)]);

        assert!(matches!(
            NamedAccounts::resolve(vec![account(0)], 1),
            Err(DeployError::Chain(ChainError::UnknownAccount(1)))
        ));
    }
}
