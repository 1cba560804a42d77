use soroban_sdk::Address;

use super::{check, check_eq, expect_revert, Fixture, HarnessError};
use crate::chain::sandbox::STROOPS_PER_UNIT;
use crate::chain::{ChainError, Receipt};

/// One native unit.
pub const SEND_VALUE: i128 = STROOPS_PER_UNIT;

/// Funders besides the deployer in the multi-funder scenarios.
const EXTRA_FUNDERS: usize = 5;

pub struct Scenario {
    pub name: &'static str,
    pub run: fn(&mut Fixture) -> Result<(), HarnessError>,
}

pub(super) fn all() -> Vec<Scenario> {
    vec![
        Scenario {
            name: "constructor sets the price feed address",
            run: constructor_sets_price_feed,
        },
        Scenario {
            name: "fund fails without enough value",
            run: fund_rejects_zero,
        },
        Scenario {
            name: "fund updates the amount funded",
            run: fund_updates_amount_funded,
        },
        Scenario {
            name: "fund adds the funder to the funder list",
            run: fund_adds_funder,
        },
        Scenario {
            name: "withdraw from a single funder",
            run: withdraw_single_funder,
        },
        Scenario {
            name: "withdraw from multiple funders",
            run: withdraw_many_funders,
        },
        Scenario {
            name: "only the owner can withdraw",
            run: only_owner_can_withdraw,
        },
        Scenario {
            name: "cheaper withdraw from multiple funders",
            run: cheaper_withdraw_many_funders,
        },
        Scenario {
            name: "repeat funding accumulates without a second list entry",
            run: repeat_funding_accumulates,
        },
        Scenario {
            name: "price feed updates change the conversion rate",
            run: price_update_changes_conversion,
        },
    ]
}

fn constructor_sets_price_feed(f: &mut Fixture) -> Result<(), HarnessError> {
    let expected = f.price_feed.clone();
    check_eq(f.fund_me().get_price_feed(), expected, "price feed")
}

fn fund_rejects_zero(f: &mut Fixture) -> Result<(), HarnessError> {
    let deployer = f.deployer.clone();
    let balance = f.balance(&deployer);

    expect_revert(f.fund_me().fund(0), "InsufficientAmount")?;

    check_eq(f.fund_me().get_address_to_amount_funded(&deployer), 0, "amount funded")?;
    expect_revert(f.fund_me().get_funder(0), "FunderNotFound")?;
    check_eq(f.balance(&deployer), balance, "deployer balance")
}

fn fund_updates_amount_funded(f: &mut Fixture) -> Result<(), HarnessError> {
    let deployer = f.deployer.clone();
    f.fund_me().fund(SEND_VALUE)?;

    check_eq(
        f.fund_me().get_address_to_amount_funded(&deployer),
        SEND_VALUE,
        "amount funded",
    )
}

fn fund_adds_funder(f: &mut Fixture) -> Result<(), HarnessError> {
    let deployer = f.deployer.clone();
    f.fund_me().fund(SEND_VALUE)?;

    check_eq(f.fund_me().get_funder(0)?, deployer, "funder 0")
}

/// Withdraw through `withdraw` as the owner and check where the money went.
fn assert_withdrawal(
    f: &mut Fixture,
    funders: &[Address],
    withdraw: fn(&mut Fixture) -> Result<Receipt, ChainError>,
) -> Result<(), HarnessError> {
    let owner = f.deployer.clone();
    let contract = f.fund_me.clone();
    let start_contract = f.balance(&contract);
    let start_owner = f.balance(&owner);
    check(start_contract > 0, "contract holds nothing before withdrawal")?;

    let receipt = withdraw(f)?;
    let gas_cost = receipt.gas_cost();

    check_eq(f.balance(&contract), 0, "contract balance")?;
    check_eq(
        start_contract + start_owner,
        f.balance(&owner) + gas_cost,
        "owner balance plus gas",
    )?;
    expect_revert(f.fund_me().get_funder(0), "FunderNotFound")?;
    for funder in funders {
        check_eq(
            f.fund_me().get_address_to_amount_funded(funder),
            0,
            "amount funded after withdrawal",
        )?;
    }
    Ok(())
}

/// Fund from the deployer and the first `EXTRA_FUNDERS` users.
fn fund_from_many(f: &mut Fixture) -> Result<Vec<Address>, HarnessError> {
    let mut funders = vec![f.deployer.clone()];
    funders.extend(f.users.iter().take(EXTRA_FUNDERS).cloned());

    for funder in &funders {
        f.fund_me_as(funder).fund(SEND_VALUE)?;
    }
    check_eq(
        f.balance(&f.fund_me.clone()),
        SEND_VALUE * funders.len() as i128,
        "contract balance after funding",
    )?;
    Ok(funders)
}

fn withdraw_single_funder(f: &mut Fixture) -> Result<(), HarnessError> {
    let deployer = f.deployer.clone();
    f.fund_me().fund(SEND_VALUE)?;

    assert_withdrawal(f, &[deployer], |f| f.fund_me().withdraw())
}

fn withdraw_many_funders(f: &mut Fixture) -> Result<(), HarnessError> {
    let funders = fund_from_many(f)?;
    assert_withdrawal(f, &funders, |f| f.fund_me().withdraw())
}

fn cheaper_withdraw_many_funders(f: &mut Fixture) -> Result<(), HarnessError> {
    let funders = fund_from_many(f)?;
    assert_withdrawal(f, &funders, |f| f.fund_me().cheaper_withdraw())
}

fn only_owner_can_withdraw(f: &mut Fixture) -> Result<(), HarnessError> {
    let deployer = f.deployer.clone();
    let contract = f.fund_me.clone();
    let attacker = f.users[0].clone();
    f.fund_me().fund(SEND_VALUE)?;

    let start_contract = f.balance(&contract);
    let start_owner = f.balance(&deployer);

    expect_revert(f.fund_me_as(&attacker).withdraw(), "NotOwner")?;
    expect_revert(f.fund_me_as(&attacker).cheaper_withdraw(), "NotOwner")?;

    check_eq(f.balance(&contract), start_contract, "contract balance")?;
    check_eq(f.balance(&deployer), start_owner, "owner balance")?;
    check_eq(
        f.fund_me().get_address_to_amount_funded(&deployer),
        SEND_VALUE,
        "amount funded",
    )?;
    check_eq(f.fund_me().get_funder(0)?, deployer, "funder 0")
}

fn repeat_funding_accumulates(f: &mut Fixture) -> Result<(), HarnessError> {
    let deployer = f.deployer.clone();
    f.fund_me().fund(SEND_VALUE)?;
    f.fund_me().fund(SEND_VALUE)?;

    check_eq(
        f.fund_me().get_address_to_amount_funded(&deployer),
        2 * SEND_VALUE,
        "amount funded",
    )?;
    check_eq(f.fund_me().get_funder(0)?, deployer, "funder 0")?;
    expect_revert(f.fund_me().get_funder(1), "FunderNotFound")
}

fn price_update_changes_conversion(f: &mut Fixture) -> Result<(), HarnessError> {
    let scale = 10_i128.pow(f.price_feed().decimals());

    f.price_feed().update_answer(100 * scale)?;
    check_eq(f.price_feed().latest_answer(), 100 * scale, "latest answer")?;
    check_eq(
        f.fund_me().get_conversion_rate(SEND_VALUE)?,
        100 * SEND_VALUE,
        "conversion rate",
    )?;

    // One unit at 40 USD is under the minimum
    f.price_feed().update_answer(40 * scale)?;
    expect_revert(f.fund_me().fund(SEND_VALUE), "InsufficientAmount")
}
