//! Typed contract handles bound to a signer on the sandbox.

use fund_me::FundMeClient;
use mock_price_feed::MockPriceFeedClient;
use soroban_sdk::Address;
use std::fmt::Debug;

use crate::chain::{ChainError, Receipt, SandboxChain};

/// Collapse a `try_` client result into a chain outcome.
///
/// Contract errors become `ChainError::Reverted` carrying the error's name.
pub(crate) fn settle<T, C, E, I>(result: Result<Result<T, C>, Result<E, I>>) -> Result<T, ChainError>
where
    C: Debug,
    E: Debug,
    I: Debug,
{
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(conversion)) => Err(ChainError::Reverted(format!("{:?}", conversion))),
        Err(Ok(error)) => Err(ChainError::Reverted(format!("{:?}", error))),
        Err(Err(invoke)) => Err(ChainError::Reverted(format!("{:?}", invoke))),
    }
}

pub struct FundMeHandle<'a> {
    chain: &'a mut SandboxChain,
    contract: Address,
    signer: Address,
}

impl<'a> FundMeHandle<'a> {
    pub fn new(chain: &'a mut SandboxChain, contract: Address, signer: Address) -> Self {
        Self {
            chain,
            contract,
            signer,
        }
    }

    pub fn fund(&mut self, amount: i128) -> Result<Receipt, ChainError> {
        let (contract, signer) = (&self.contract, &self.signer);
        let ((), receipt) = self.chain.transact(signer, |env| {
            settle(FundMeClient::new(env, contract).try_fund(signer, &amount))
        })?;
        Ok(receipt)
    }

    pub fn withdraw(&mut self) -> Result<Receipt, ChainError> {
        let (contract, signer) = (&self.contract, &self.signer);
        let ((), receipt) = self.chain.transact(signer, |env| {
            settle(FundMeClient::new(env, contract).try_withdraw(signer))
        })?;
        Ok(receipt)
    }

    pub fn cheaper_withdraw(&mut self) -> Result<Receipt, ChainError> {
        let (contract, signer) = (&self.contract, &self.signer);
        let ((), receipt) = self.chain.transact(signer, |env| {
            settle(FundMeClient::new(env, contract).try_cheaper_withdraw(signer))
        })?;
        Ok(receipt)
    }

    fn client(&self) -> FundMeClient<'_> {
        FundMeClient::new(self.chain.env(), &self.contract)
    }

    pub fn get_price_feed(&self) -> Address {
        self.client().get_price_feed()
    }

    pub fn get_owner(&self) -> Address {
        self.client().get_owner()
    }

    pub fn get_funder(&self, index: u32) -> Result<Address, ChainError> {
        settle(self.client().try_get_funder(&index))
    }

    pub fn get_address_to_amount_funded(&self, funder: &Address) -> i128 {
        self.client().get_address_to_amount_funded(funder)
    }

    pub fn get_conversion_rate(&self, amount: i128) -> Result<i128, ChainError> {
        settle(self.client().try_get_conversion_rate(&amount))
    }
}

pub struct MockPriceFeedHandle<'a> {
    chain: &'a mut SandboxChain,
    contract: Address,
    signer: Address,
}

impl<'a> MockPriceFeedHandle<'a> {
    pub fn new(chain: &'a mut SandboxChain, contract: Address, signer: Address) -> Self {
        Self {
            chain,
            contract,
            signer,
        }
    }

    pub fn update_answer(&mut self, answer: i128) -> Result<Receipt, ChainError> {
        let contract = &self.contract;
        let ((), receipt) = self.chain.transact(&self.signer, |env| {
            MockPriceFeedClient::new(env, contract).update_answer(&answer);
            Ok(())
        })?;
        Ok(receipt)
    }

    pub fn latest_answer(&self) -> i128 {
        MockPriceFeedClient::new(self.chain.env(), &self.contract).latest_answer()
    }

    pub fn decimals(&self) -> u32 {
        MockPriceFeedClient::new(self.chain.env(), &self.contract).decimals()
    }
}
