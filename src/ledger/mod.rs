use std::collections::BTreeMap;

use crate::error::{ExchangeError, Result};
use crate::types::Universe;

/// Holdings of cash and every tradable currency at one point in a simulation.
///
/// A ledger is never modified after it is built: trades produce a new ledger and the old one
/// stays valid, which is what lets a session hand back the state at any earlier step.
/// Quantities are never negative. Floating-point residue that would take a holding below zero
/// is clamped to exactly 0.
#[derive(Clone, Debug, PartialEq)]
pub struct Ledger {
    universe: Universe,
    amounts: Vec<f64>,
}

impl Ledger {
    /// Ledger holding only cash.
    pub fn with_cash(universe: &Universe, cash: f64) -> Result<Self> {
        if !cash.is_finite() || cash < 0.0 {
            return Err(ExchangeError::InvalidBalance {
                asset: crate::types::CASH.to_string(),
                amount: cash,
            });
        }
        let mut amounts = vec![0.0; universe.len()];
        amounts[0] = cash;
        Ok(Self {
            universe: universe.clone(),
            amounts,
        })
    }

    /// Builds a ledger from a mapping that must name cash and every currency of the universe.
    pub fn from_map(universe: &Universe, balance: &BTreeMap<String, f64>) -> Result<Self> {
        let amounts = universe.layout(balance, true)?;
        for (asset, amount) in universe.assets().zip(amounts.iter()) {
            if !amount.is_finite() || *amount < 0.0 {
                return Err(ExchangeError::InvalidBalance {
                    asset: asset.to_string(),
                    amount: *amount,
                });
            }
        }
        Ok(Self {
            universe: universe.clone(),
            amounts,
        })
    }

    pub fn get(&self, asset: &str) -> Option<f64> {
        self.universe.position(asset).map(|pos| self.amounts[pos])
    }

    pub fn cash(&self) -> f64 {
        self.amounts[0]
    }

    /// Quantities in slot order, cash first.
    pub fn amounts(&self) -> &[f64] {
        &self.amounts
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.universe.to_map(&self.amounts)
    }

    /// New ledger with `asset_change` applied to slot `pos` and `cash_change` applied to cash.
    pub(crate) fn transfer(&self, pos: usize, asset_change: f64, cash_change: f64) -> Self {
        let mut amounts = self.amounts.clone();
        amounts[pos] = (amounts[pos] + asset_change).max(0.0);
        amounts[0] = (amounts[0] + cash_change).max(0.0);
        Self {
            universe: self.universe.clone(),
            amounts,
        }
    }
}
