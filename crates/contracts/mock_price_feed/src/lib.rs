#![no_std]

use soroban_sdk::{contract, contracterror, contractimpl, contracttype, panic_with_error, Env};

/// Version reported by the mock, matching the aggregator interface it stands in for.
const VERSION: u32 = 0;

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Decimals,
    LatestRound,
    Round(u64),
}

/// One price observation, laid out like an aggregator round.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoundData {
    pub round_id: u64,
    pub answer: i128,
    pub started_at: u64,
    pub updated_at: u64,
    pub answered_in_round: u64,
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum PriceFeedError {
    NotInitialized = 1,
    RoundNotFound = 2,
}

#[contract]
pub struct MockPriceFeed;

impl MockPriceFeed {
    fn read_latest_round(env: &Env) -> u64 {
        env.storage()
            .instance()
            .get(&DataKey::LatestRound)
            .unwrap_or_else(|| panic_with_error!(env, PriceFeedError::NotInitialized))
    }

    fn read_round(env: &Env, round_id: u64) -> Option<RoundData> {
        env.storage().persistent().get(&DataKey::Round(round_id))
    }

    fn write_round(env: &Env, round: &RoundData) {
        let key = DataKey::Round(round.round_id);
        env.storage().persistent().set(&key, round);
        env.storage().persistent().extend_ttl(&key, 100, 100);
        env.storage()
            .instance()
            .set(&DataKey::LatestRound, &round.round_id);
    }
}

#[contractimpl]
impl MockPriceFeed {
    /// Store the feed precision and publish the first round.
    pub fn __constructor(env: Env, decimals: u32, initial_answer: i128) {
        env.storage().instance().set(&DataKey::Decimals, &decimals);
        env.storage().instance().extend_ttl(100, 100);
        Self::update_answer(env, initial_answer);
    }

    pub fn decimals(env: Env) -> u32 {
        env.storage()
            .instance()
            .get(&DataKey::Decimals)
            .unwrap_or_else(|| panic_with_error!(&env, PriceFeedError::NotInitialized))
    }

    pub fn version(_env: Env) -> u32 {
        VERSION
    }

    /// Publish a new answer as the next round, stamped with the current ledger time.
    pub fn update_answer(env: Env, answer: i128) {
        let round_id = env
            .storage()
            .instance()
            .get::<_, u64>(&DataKey::LatestRound)
            .map_or(1, |latest| latest + 1);
        let now = env.ledger().timestamp();
        Self::write_round(
            &env,
            &RoundData {
                round_id,
                answer,
                started_at: now,
                updated_at: now,
                answered_in_round: round_id,
            },
        );
    }

    /// Overwrite a specific round; it becomes the latest one.
    pub fn update_round_data(
        env: Env,
        round_id: u64,
        answer: i128,
        updated_at: u64,
        started_at: u64,
    ) {
        Self::write_round(
            &env,
            &RoundData {
                round_id,
                answer,
                started_at,
                updated_at,
                answered_in_round: round_id,
            },
        );
    }

    pub fn latest_answer(env: Env) -> i128 {
        Self::latest_round_data(env).answer
    }

    pub fn latest_round_data(env: Env) -> RoundData {
        let round_id = Self::read_latest_round(&env);
        Self::read_round(&env, round_id)
            .unwrap_or_else(|| panic_with_error!(&env, PriceFeedError::RoundNotFound))
    }

    pub fn get_round_data(env: Env, round_id: u64) -> Result<RoundData, PriceFeedError> {
        Self::read_round(&env, round_id).ok_or(PriceFeedError::RoundNotFound)
    }
}

#[cfg(test)]
extern crate std;
