#![no_std]

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, panic_with_error, token, Address, Env,
    Symbol, Vec,
};

mod price_feed;

pub use price_feed::{PriceFeed, PriceFeedClient};

/// Minimum contribution in USD, expressed with the native asset's 7 decimals.
pub const MINIMUM_USD: i128 = 50 * 10_000_000;

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Owner,
    PriceFeed,
    Token,
    Funders,
    Funded(Address),
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Funded {
    pub funder: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Withdrawn {
    pub owner: Address,
    pub amount: i128,
    pub funders: u32,
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum FundMeError {
    NotOwner = 1,
    InsufficientAmount = 2,
    FunderNotFound = 3,
    InvalidPrice = 4,
    NotInitialized = 5,
    /// Amount times price does not fit in an i128
    AmountOverflow = 6,
}

#[contract]
pub struct FundMe;

impl FundMe {
    fn read_address(env: &Env, key: &DataKey) -> Address {
        env.storage()
            .instance()
            .get(key)
            .unwrap_or_else(|| panic_with_error!(env, FundMeError::NotInitialized))
    }

    fn read_funders(env: &Env) -> Vec<Address> {
        env.storage()
            .instance()
            .get(&DataKey::Funders)
            .unwrap_or(Vec::new(env))
    }

    fn read_funded(env: &Env, funder: &Address) -> i128 {
        env.storage()
            .persistent()
            .get(&DataKey::Funded(funder.clone()))
            .unwrap_or(0)
    }

    fn write_funded(env: &Env, funder: &Address, amount: i128) {
        let key = DataKey::Funded(funder.clone());
        env.storage().persistent().set(&key, &amount);
        env.storage().persistent().extend_ttl(&key, 100, 100);
    }

    fn require_owner(env: &Env, caller: &Address) -> Result<Address, FundMeError> {
        caller.require_auth();
        let owner = Self::read_address(env, &DataKey::Owner);
        if *caller != owner {
            return Err(FundMeError::NotOwner);
        }
        Ok(owner)
    }

    fn usd_value(env: &Env, amount: i128) -> Result<i128, FundMeError> {
        let feed = PriceFeedClient::new(env, &Self::read_address(env, &DataKey::PriceFeed));
        let price = feed.latest_answer();
        if price <= 0 {
            return Err(FundMeError::InvalidPrice);
        }
        let scale = 10_i128
            .checked_pow(feed.decimals())
            .ok_or(FundMeError::InvalidPrice)?;
        amount
            .checked_mul(price)
            .map(|value| value / scale)
            .ok_or(FundMeError::AmountOverflow)
    }

    /// Move the whole contract balance to the owner and emit the withdrawal event.
    fn pay_out(env: &Env, owner: Address, funders: u32) {
        let token = token::Client::new(env, &Self::read_address(env, &DataKey::Token));
        let contract = env.current_contract_address();
        let amount = token.balance(&contract);
        if amount > 0 {
            token.transfer(&contract, &owner, &amount);
        }
        env.events().publish(
            (Symbol::new(env, "withdrawn"),),
            Withdrawn {
                owner,
                amount,
                funders,
            },
        );
    }
}

#[contractimpl]
impl FundMe {
    /// Wire the owner, the price feed used for USD conversion, and the asset funders pay in.
    pub fn __constructor(env: Env, owner: Address, price_feed: Address, token: Address) {
        env.storage().instance().set(&DataKey::Owner, &owner);
        env.storage()
            .instance()
            .set(&DataKey::PriceFeed, &price_feed);
        env.storage().instance().set(&DataKey::Token, &token);
        env.storage().instance().extend_ttl(100, 100);
    }

    /// Contribute `amount` of the funding asset.
    /// Rejected when the contribution is worth less than `MINIMUM_USD`.
    pub fn fund(env: Env, funder: Address, amount: i128) -> Result<(), FundMeError> {
        funder.require_auth();

        if Self::usd_value(&env, amount)? < MINIMUM_USD {
            return Err(FundMeError::InsufficientAmount);
        }

        let token = token::Client::new(&env, &Self::read_address(&env, &DataKey::Token));
        token.transfer(&funder, &env.current_contract_address(), &amount);

        let previous = Self::read_funded(&env, &funder);
        let total = previous
            .checked_add(amount)
            .ok_or(FundMeError::AmountOverflow)?;
        Self::write_funded(&env, &funder, total);
        if previous == 0 {
            let mut funders = Self::read_funders(&env);
            funders.push_back(funder.clone());
            env.storage().instance().set(&DataKey::Funders, &funders);
        }

        env.events()
            .publish((Symbol::new(&env, "funded"),), Funded { funder, amount });
        Ok(())
    }

    /// Reset every funder's ledger entry and send the balance to the owner.
    /// The funder list is read back from storage for each index.
    pub fn withdraw(env: Env, caller: Address) -> Result<(), FundMeError> {
        let owner = Self::require_owner(&env, &caller)?;

        let count = Self::read_funders(&env).len();
        for index in 0..count {
            let funder = Self::get_funder(env.clone(), index)?;
            env.storage().persistent().remove(&DataKey::Funded(funder));
        }
        env.storage()
            .instance()
            .set(&DataKey::Funders, &Vec::<Address>::new(&env));

        Self::pay_out(&env, owner, count);
        Ok(())
    }

    /// Same outcome as `withdraw`, loading the funder list once.
    pub fn cheaper_withdraw(env: Env, caller: Address) -> Result<(), FundMeError> {
        let owner = Self::require_owner(&env, &caller)?;

        let funders = Self::read_funders(&env);
        for funder in funders.iter() {
            env.storage().persistent().remove(&DataKey::Funded(funder));
        }
        env.storage().instance().remove(&DataKey::Funders);

        Self::pay_out(&env, owner, funders.len());
        Ok(())
    }

    /// USD value of `amount`, using the feed's latest answer.
    pub fn get_conversion_rate(env: Env, amount: i128) -> Result<i128, FundMeError> {
        Self::usd_value(&env, amount)
    }

    pub fn get_address_to_amount_funded(env: Env, funder: Address) -> i128 {
        Self::read_funded(&env, &funder)
    }

    pub fn get_funder(env: Env, index: u32) -> Result<Address, FundMeError> {
        Self::read_funders(&env)
            .get(index)
            .ok_or(FundMeError::FunderNotFound)
    }

    pub fn get_owner(env: Env) -> Address {
        Self::read_address(&env, &DataKey::Owner)
    }

    pub fn get_price_feed(env: Env) -> Address {
        Self::read_address(&env, &DataKey::PriceFeed)
    }

    pub fn get_version(env: Env) -> u32 {
        PriceFeedClient::new(&env, &Self::read_address(&env, &DataKey::PriceFeed)).version()
    }
}

#[cfg(test)]
extern crate std;
