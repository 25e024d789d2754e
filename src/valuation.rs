//! Mark-to-market valuation of a ledger. No fees are applied: this is what the holdings are
//! worth at the current close, not what they would fetch if liquidated.
use crate::error::{ExchangeError, Result};
use crate::ledger::Ledger;
use crate::types::{Portfolio, PriceSnapshot};

fn check_universe(ledger: &Ledger, prices: &PriceSnapshot) -> Result<()> {
    if ledger.universe() != prices.universe() {
        return Err(ExchangeError::UnexpectedCurrencies {
            expected: ledger.universe().currencies().to_vec(),
            found: prices.universe().currencies().to_vec(),
        });
    }
    Ok(())
}

//Callers guarantee that both are laid out against the same universe
pub(crate) fn mark_to_market(ledger: &Ledger, prices: &PriceSnapshot) -> f64 {
    ledger
        .amounts()
        .iter()
        .zip(prices.closes().iter())
        .map(|(qty, price)| qty * price)
        .sum()
}

pub(crate) fn weights(ledger: &Ledger, prices: &PriceSnapshot) -> Result<Portfolio> {
    let total = mark_to_market(ledger, prices);
    if total == 0.0 {
        return Err(ExchangeError::DivisionByZero);
    }
    let weights = ledger
        .amounts()
        .iter()
        .zip(prices.closes().iter())
        .map(|(qty, price)| qty * price / total)
        .collect();
    Ok(Portfolio::from_weights(ledger.universe(), weights))
}

/// Total value of the ledger in cash terms. Fails when the prices cover other currencies.
pub fn capital(ledger: &Ledger, prices: &PriceSnapshot) -> Result<f64> {
    check_universe(ledger, prices)?;
    Ok(mark_to_market(ledger, prices))
}

/// Share of capital held in each asset. Fails when the ledger is worth nothing.
pub fn portfolio(ledger: &Ledger, prices: &PriceSnapshot) -> Result<Portfolio> {
    check_universe(ledger, prices)?;
    weights(ledger, prices)
}
