use soroban_sdk::{contractclient, Env};

/// The subset of the aggregator interface FundMe reads.
#[contractclient(name = "PriceFeedClient")]
pub trait PriceFeed {
    fn decimals(env: Env) -> u32;
    fn version(env: Env) -> u32;
    fn latest_answer(env: Env) -> i128;
}
