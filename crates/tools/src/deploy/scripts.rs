//! The two deploy scripts: a mock price feed for development networks, and
//! FundMe wired to whichever feed the network provides.

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::{DeployError, DeployScript, DeploymentRecord, DeploymentRegistry, ExecutionContext};
use crate::chain::{Artifact, ConstructorArg, DeployRequest};
use crate::config::Config;
use crate::network::NetworkTable;
use crate::verify::{verify_best_effort, HttpVerifier, VerificationRequest, Verifier};

/// Decimals reported by the mock feed.
pub const DECIMALS: u32 = 8;

/// Mock feed's starting answer: 2000 USD with 8 decimals.
pub const INITIAL_ANSWER: i128 = 2_000_0000_0000;

/// How FundMe is deployed on the current network.
pub struct DeploySettings {
    pub development: bool,
    /// Ledgers to wait after deploying
    pub confirmations: u32,
    /// `None` skips verification
    pub verifier: Option<Box<dyn Verifier>>,
}

impl DeploySettings {
    pub fn from_config(config: &Config) -> Result<Self, DeployError> {
        let verifier = match &config.verification {
            Some(verifier) => Some(Box::new(HttpVerifier::new(
                verifier,
                Duration::from_millis(config.rpc_timeout_ms),
            )?) as Box<dyn Verifier>),
            None => None,
        };

        Ok(Self {
            development: config.network.development,
            confirmations: config.network.block_confirmations,
            verifier,
        })
    }
}

/// Deploy `artifact` from the deployer and record it under its contract name.
async fn deploy_contract(
    ctx: &mut ExecutionContext<'_>,
    artifact: Artifact,
    args: Vec<ConstructorArg>,
    confirmations: u32,
) -> Result<DeploymentRecord, DeployError> {
    let from = ctx.accounts.deployer.clone();
    let deployment = ctx
        .chain
        .deploy(DeployRequest {
            artifact,
            from: &from,
            args: &args,
            confirmations,
        })
        .await?;

    info!(
        contract = %artifact,
        address = %deployment.address,
        ledger = deployment.ledger,
        "Deployed"
    );

    let record = DeploymentRecord {
        name: artifact.contract_name().to_string(),
        address: deployment.address,
        args,
        from: from.address,
        ledger: deployment.ledger,
    };
    ctx.registry.record(record.clone())?;
    Ok(record)
}

/// Deploys the mock price feed on development networks only.
pub struct MockPriceFeedScript;

#[async_trait(?Send)]
impl DeployScript for MockPriceFeedScript {
    fn name(&self) -> &str {
        "mocks"
    }

    fn tags(&self) -> &[&'static str] {
        &["all", "mocks"]
    }

    fn dependencies(&self) -> &[&'static str] {
        &[]
    }

    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), DeployError> {
        if !ctx.network.development {
            info!(network = %ctx.network.name, "Public network, no mocks needed");
            return Ok(());
        }

        info!("Development network detected, deploying mocks");
        let args = vec![
            ConstructorArg::u32("decimals", DECIMALS),
            ConstructorArg::i128("initial_answer", INITIAL_ANSWER),
        ];
        let confirmations = ctx.network.block_confirmations;
        deploy_contract(ctx, Artifact::MockPriceFeed, args, confirmations).await?;
        Ok(())
    }
}

pub struct FundMeScript {
    settings: DeploySettings,
}

impl FundMeScript {
    pub fn new(settings: DeploySettings) -> Self {
        Self { settings }
    }
}

#[async_trait(?Send)]
impl DeployScript for FundMeScript {
    fn name(&self) -> &str {
        "fund-me"
    }

    fn tags(&self) -> &[&'static str] {
        &["all", "fundme"]
    }

    fn dependencies(&self) -> &[&'static str] {
        &["mocks"]
    }

    async fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), DeployError> {
        deploy_fund_me(ctx, &self.settings).await?;
        Ok(())
    }
}

/// Price feed FundMe should read from.
///
/// Development networks use the mock deployed earlier in the same run;
/// public networks look up their oracle by chain id.
pub fn resolve_price_feed(
    development: bool,
    chain_id: u32,
    registry: &DeploymentRegistry,
    networks: &NetworkTable,
) -> Result<String, DeployError> {
    if development {
        return Ok(registry
            .get(Artifact::MockPriceFeed.contract_name())?
            .address
            .clone());
    }

    let entry = networks
        .get(chain_id)
        .ok_or(DeployError::UnknownChain(chain_id))?;
    entry
        .price_feed
        .clone()
        .ok_or_else(|| DeployError::MissingPriceFeed {
            chain_id,
            network: entry.name.clone(),
        })
}

/// Deploy FundMe, then verify it when on a public network with a verifier.
pub async fn deploy_fund_me(
    ctx: &mut ExecutionContext<'_>,
    settings: &DeploySettings,
) -> Result<DeploymentRecord, DeployError> {
    let price_feed = resolve_price_feed(
        settings.development,
        ctx.network.chain_id,
        &ctx.registry,
        &ctx.networks,
    )?;
    let token = ctx.chain.native_token().await?;

    let args = vec![
        ConstructorArg::address("owner", ctx.accounts.deployer.address.clone()),
        ConstructorArg::address("price_feed", price_feed),
        ConstructorArg::address("token", token),
    ];
    let record = deploy_contract(ctx, Artifact::FundMe, args, settings.confirmations).await?;

    if !settings.development {
        if let Some(verifier) = &settings.verifier {
            let request = VerificationRequest {
                network: ctx.network.name.clone(),
                chain_id: ctx.network.chain_id,
                contract: record.name.clone(),
                address: record.address.clone(),
                constructor_args: record.args.clone(),
            };
            verify_best_effort(verifier.as_ref(), &request).await;
        }
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Account, Chain, ChainError, Deployment};
    use crate::deploy::{NamedAccounts, Orchestrator};
    use crate::network::{Network, NetworkDescriptor, NetworkEntry};
    use crate::verify::VerifyError;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Hands out sequential addresses and remembers every deploy.
    #[derive(Default)]
    struct RecordingChain {
        deploys: Vec<(Artifact, Vec<ConstructorArg>, u32)>,
    }

    #[async_trait(?Send)]
    impl Chain for RecordingChain {
        async fn deploy(&mut self, request: DeployRequest<'_>) -> Result<Deployment, ChainError> {
            self.deploys.push((
                request.artifact,
                request.args.to_vec(),
                request.confirmations,
            ));
            Ok(Deployment {
                address: format!("C{}", self.deploys.len()),
                ledger: 100 + request.confirmations,
            })
        }

        async fn latest_ledger(&self) -> Result<u32, ChainError> {
            Ok(100)
        }

        async fn native_token(&mut self) -> Result<String, ChainError> {
            Ok("CNATIVE".to_string())
        }

        async fn account_address(&self, signer: &str) -> Result<String, ChainError> {
            Ok(signer.to_string())
        }

        async fn accounts(&self) -> Result<Vec<Account>, ChainError> {
            Ok(vec![])
        }
    }

    struct FailingVerifier {
        calls: Rc<RefCell<Vec<VerificationRequest>>>,
    }

    #[async_trait(?Send)]
    impl Verifier for FailingVerifier {
        async fn verify(&self, request: &VerificationRequest) -> Result<(), VerifyError> {
            self.calls.borrow_mut().push(request.clone());
            Err(VerifyError::Rejected {
                status: 500,
                body: "down".to_string(),
            })
        }
    }

    fn deployer() -> Account {
        Account {
            signer: "deployer".to_string(),
            address: "GDEPLOYER".to_string(),
        }
    }

    fn testnet() -> NetworkDescriptor {
        NetworkDescriptor {
            name: "testnet".to_string(),
            network: Network::Testnet,
            chain_id: 2,
            development: false,
            rpc_url: Some("https://soroban-testnet.stellar.org".to_string()),
            network_passphrase: Network::Testnet.passphrase().to_string(),
            block_confirmations: 6,
        }
    }

    fn table(feed: Option<&str>) -> NetworkTable {
        NetworkTable::new([NetworkEntry {
            chain_id: 2,
            name: "testnet".to_string(),
            price_feed: feed.map(str::to_string),
        }])
        .unwrap()
    }

    fn context<'a>(
        network: NetworkDescriptor,
        networks: NetworkTable,
        chain: &'a mut RecordingChain,
    ) -> ExecutionContext<'a> {
        ExecutionContext {
            network,
            networks,
            accounts: NamedAccounts {
                deployer: deployer(),
                users: vec![],
            },
            registry: DeploymentRegistry::in_memory(),
            chain,
        }
    }

    fn settings(development: bool, verifier: Option<Box<dyn Verifier>>) -> DeploySettings {
        DeploySettings {
            development,
            confirmations: if development { 1 } else { 6 },
            verifier,
        }
    }

    #[test]
    fn test_public_feed_by_chain_id() {
        let registry = DeploymentRegistry::in_memory();

        assert_eq!(
            resolve_price_feed(false, 2, &registry, &table(Some("CFEED"))).unwrap(),
            "CFEED"
        );
        assert!(matches!(
            resolve_price_feed(false, 7, &registry, &table(Some("CFEED"))),
            Err(DeployError::UnknownChain(7))
        ));
        assert!(matches!(
            resolve_price_feed(false, 2, &registry, &table(None)),
            Err(DeployError::MissingPriceFeed { chain_id: 2, .. })
        ));
    }

    #[test]
    fn test_development_uses_latest_mock() {
        let mut registry = DeploymentRegistry::in_memory();
        assert!(matches!(
            resolve_price_feed(true, 31337, &registry, &NetworkTable::default()),
            Err(DeployError::MissingDeployment(_))
        ));

        for address in ["CMOCK1", "CMOCK2"] {
            registry
                .record(DeploymentRecord {
                    name: "MockPriceFeed".to_string(),
                    address: address.to_string(),
                    args: vec![],
                    from: "GDEPLOYER".to_string(),
                    ledger: 1,
                })
                .unwrap();
        }

        assert_eq!(
            resolve_price_feed(true, 31337, &registry, &NetworkTable::default()).unwrap(),
            "CMOCK2"
        );
    }

    #[tokio::test]
    async fn test_unknown_chain_fails_before_deploying() {
        let mut chain = RecordingChain::default();
        let mut network = testnet();
        network.chain_id = 99;
        let mut ctx = context(network, table(Some("CFEED")), &mut chain);

        let result = deploy_fund_me(&mut ctx, &settings(false, None)).await;
        assert!(matches!(result, Err(DeployError::UnknownChain(99))));
        drop(ctx);

        assert!(chain.deploys.is_empty());
    }

    #[tokio::test]
    async fn test_public_deploy_verifies_and_tolerates_failure() {
        let calls = Rc::new(RefCell::new(vec![]));
        let verifier = FailingVerifier {
            calls: calls.clone(),
        };
        let mut chain = RecordingChain::default();
        let mut ctx = context(testnet(), table(Some("CFEED")), &mut chain);

        let record = deploy_fund_me(&mut ctx, &settings(false, Some(Box::new(verifier))))
            .await
            .unwrap();

        assert_eq!(record.name, "FundMe");
        assert_eq!(
            record.args,
            [
                ConstructorArg::address("owner", "GDEPLOYER"),
                ConstructorArg::address("price_feed", "CFEED"),
                ConstructorArg::address("token", "CNATIVE"),
            ]
        );
        assert_eq!(ctx.registry.get("FundMe").unwrap(), &record);
        drop(ctx);

        let calls = calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].address, record.address);
        assert_eq!(calls[0].constructor_args, record.args);
        assert_eq!(chain.deploys.len(), 1);
        assert_eq!(chain.deploys[0].2, 6);
    }

    #[tokio::test]
    async fn test_development_never_verifies() {
        let calls = Rc::new(RefCell::new(vec![]));
        let verifier = FailingVerifier {
            calls: calls.clone(),
        };
        let mut chain = RecordingChain::default();
        let mut ctx = context(NetworkDescriptor::sandbox(), NetworkTable::default(), &mut chain);

        MockPriceFeedScript.run(&mut ctx).await.unwrap();
        let mock = ctx.registry.get("MockPriceFeed").unwrap().address.clone();
        let record = deploy_fund_me(&mut ctx, &settings(true, Some(Box::new(verifier))))
            .await
            .unwrap();

        assert_eq!(record.args[1], ConstructorArg::address("price_feed", mock));
        assert!(calls.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_local_node_deploys_mock_and_skips_verification() {
        let env = |key: &str| match key {
            "SOROBAN_ACCOUNT" => Some("alice".to_string()),
            "SOROBAN_VERIFY_URL" => Some("https://verify.example".to_string()),
            "SOROBAN_VERIFY_API_KEY" => Some("key".to_string()),
            _ => None,
        };
        let config = Config::resolve(&env, None, Some("local")).unwrap();
        let mut settings = DeploySettings::from_config(&config).unwrap();
        assert!(settings.development);
        assert!(settings.verifier.is_some());

        let calls = Rc::new(RefCell::new(vec![]));
        settings.verifier = Some(Box::new(FailingVerifier {
            calls: calls.clone(),
        }));
        let mut chain = RecordingChain::default();
        let mut ctx = context(config.network.clone(), config.networks.clone(), &mut chain);

        Orchestrator::standard(settings)
            .run(&mut ctx, &["all"])
            .await
            .unwrap();

        let mock = ctx.registry.get("MockPriceFeed").unwrap().address.clone();
        let fund_me = ctx.registry.get("FundMe").unwrap().clone();
        drop(ctx);

        assert_eq!(fund_me.args[1], ConstructorArg::address("price_feed", mock));
        assert!(calls.borrow().is_empty());
        assert_eq!(chain.deploys.len(), 2);
        assert_eq!(chain.deploys[0].0, Artifact::MockPriceFeed);
    }

    #[tokio::test]
    async fn test_mocks_skipped_on_public_network() {
        let mut chain = RecordingChain::default();
        let mut ctx = context(testnet(), table(Some("CFEED")), &mut chain);

        MockPriceFeedScript.run(&mut ctx).await.unwrap();
        assert!(ctx.registry.is_empty());
        drop(ctx);

        assert!(chain.deploys.is_empty());
    }

    #[tokio::test]
    async fn test_each_call_deploys_again() {
        let mut chain = RecordingChain::default();
        let mut ctx = context(testnet(), table(Some("CFEED")), &mut chain);

        let first = deploy_fund_me(&mut ctx, &settings(false, None)).await.unwrap();
        let second = deploy_fund_me(&mut ctx, &settings(false, None)).await.unwrap();

        assert_ne!(first.address, second.address);
        assert_eq!(ctx.registry.get("FundMe").unwrap().address, second.address);
    }
}
