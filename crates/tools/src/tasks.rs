//! Small read-only tasks against the configured network.

use std::io::Write;

use crate::chain::{Chain, ChainError};

/// Print every account the chain can sign for. Returns how many there were.
pub async fn print_accounts(chain: &dyn Chain, out: &mut impl Write) -> Result<usize, ChainError> {
    let accounts = chain.accounts().await?;
    for account in &accounts {
        writeln!(out, "{}", account.address)?;
    }
    Ok(accounts.len())
}

/// Print the latest closed ledger sequence.
pub async fn print_latest_ledger(chain: &dyn Chain, out: &mut impl Write) -> Result<u32, ChainError> {
    let ledger = chain.latest_ledger().await?;
    writeln!(out, "{}", ledger)?;
    Ok(ledger)
}
