use std::collections::HashMap;
use std::path::Path;

use fundme_tools::chain::ArgValue;
use fundme_tools::config::{Config, FundMeToml};
use fundme_tools::deploy::{deploy_all, DeployError};

const ACCOUNT: &str = "GAAZI4TCR3TY5OJHCTJC2A4QSY6CJWJH5IAJTGKIN2ER7LBNVKOCCWN7";

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

fn sandbox() -> Config {
    Config::resolve(&env_from(&[]), None, None).unwrap()
}

fn testnet(toml: &str) -> Config {
    let toml: FundMeToml = toml::from_str(toml).unwrap();
    let env = env_from(&[("SOROBAN_ACCOUNT", ACCOUNT)]);
    Config::resolve(&env, Some(toml), Some("testnet")).unwrap()
}

#[tokio::test]
async fn development_deploy_wires_fresh_mock() {
    let registry = deploy_all(&sandbox(), &["all"]).await.unwrap();

    let mock = registry.get("MockPriceFeed").unwrap();
    let fund_me = registry.get("FundMe").unwrap();

    let feed_arg = fund_me
        .args
        .iter()
        .find(|arg| arg.name == "price_feed")
        .unwrap();
    assert_eq!(feed_arg.value, ArgValue::Address(mock.address.clone()));
    assert_eq!(fund_me.from, mock.from);
    assert!(fund_me.ledger > mock.ledger);
    assert!(registry.dir().is_none());
}

#[tokio::test]
async fn fundme_tag_pulls_in_mocks() {
    let registry = deploy_all(&sandbox(), &["fundme"]).await.unwrap();

    assert_eq!(registry.len(), 2);
    assert!(registry.get("MockPriceFeed").is_ok());
}

#[tokio::test]
async fn mocks_tag_deploys_only_the_mock() {
    let registry = deploy_all(&sandbox(), &["mocks"]).await.unwrap();

    assert_eq!(registry.len(), 1);
    assert!(matches!(
        registry.get("FundMe"),
        Err(DeployError::MissingDeployment(_))
    ));
}

#[tokio::test]
async fn public_network_without_feed_fails_before_deploying() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut config = testnet(
        r#"
        [profile.testnet]
        network = "testnet"
        chain_id = 2
        block_confirmations = 3
        "#,
    );
    config.deployments_dir = temp.path().to_path_buf();

    let result = deploy_all(&config, &["all"]).await;

    assert!(matches!(
        result,
        Err(DeployError::MissingPriceFeed { chain_id: 2, .. })
    ));
    assert!(!temp.path().join("testnet").exists());
}

#[tokio::test]
async fn public_network_with_unknown_chain_id_fails() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut config = testnet(
        r#"
        [profile.testnet]
        network = "testnet"
        chain_id = 2
        block_confirmations = 3
        price_feed = "CFEED"
        "#,
    );
    config.deployments_dir = temp.path().to_path_buf();
    config.network.chain_id = 77;

    assert!(matches!(
        deploy_all(&config, &["all"]).await,
        Err(DeployError::UnknownChain(77))
    ));
}

#[test]
fn shipped_profiles_parse() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fundme.toml");
    let toml = Config::load_toml(&path).unwrap().unwrap();

    assert_eq!(toml.profile["testnet"].deployer_index, Some(1));
    assert!(toml.profile.contains_key("sandbox"));
    assert_eq!(toml.profile["local"].network, "local");
    assert!(toml.profile.contains_key("mainnet"));
}
