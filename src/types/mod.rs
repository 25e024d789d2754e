//! Values shared by every component: the set of currencies a simulation trades and the
//! per-step prices and allocations that are laid out against it.
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::{ExchangeError, Result};

/// Identifier of the base currency. Cash is the unit of account and is always priced at 1.0.
pub const CASH: &str = "cash";

/// Portfolios built by callers may drift from 1.0 by this much before they are refused.
pub const PORTFOLIO_SUM_TOLERANCE: f64 = 1e-6;

/// Ordered set of tradable currencies fixed when a simulation is created.
///
/// Values laid out against a universe (balances, prices, portfolios) hold one slot per asset:
/// slot 0 is always cash and slot `i + 1` is the `i`th currency. The currency list is shared so
/// cloning a universe, or any value holding one, does not copy it.
#[derive(Clone, Debug)]
pub struct Universe {
    currencies: Arc<[String]>,
}

impl Universe {
    pub fn new<I, S>(currencies: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let currencies: Vec<String> = currencies.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for currency in &currencies {
            if currency == CASH || !seen.insert(currency.as_str()) {
                return Err(ExchangeError::UnexpectedCurrencies {
                    expected: vec!["unique currencies other than cash".to_string()],
                    found: currencies.clone(),
                });
            }
        }
        Ok(Self {
            currencies: currencies.into(),
        })
    }

    /// Tradable currencies, cash excluded.
    pub fn currencies(&self) -> &[String] {
        &self.currencies
    }

    /// Number of slots including cash.
    pub fn len(&self) -> usize {
        self.currencies.len() + 1
    }

    /// True when there is nothing to trade besides cash.
    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }

    pub fn position(&self, asset: &str) -> Option<usize> {
        if asset == CASH {
            return Some(0);
        }
        self.currencies
            .iter()
            .position(|currency| currency == asset)
            .map(|pos| pos + 1)
    }

    /// Asset identifier held in a slot.
    pub fn asset(&self, pos: usize) -> Option<&str> {
        if pos == 0 {
            return Some(CASH);
        }
        self.currencies.get(pos - 1).map(String::as_str)
    }

    /// Every asset in slot order, cash first.
    pub fn assets(&self) -> impl Iterator<Item = &str> {
        std::iter::once(CASH).chain(self.currencies.iter().map(String::as_str))
    }

    fn expected(&self) -> Vec<String> {
        self.assets().map(str::to_string).collect()
    }

    /// Lays a caller-supplied mapping out in slot order. Every key must belong to the universe;
    /// when `exact` is set every slot must also be present, otherwise missing slots are 0.
    pub(crate) fn layout(&self, values: &BTreeMap<String, f64>, exact: bool) -> Result<Vec<f64>> {
        let mut laid_out = vec![0.0; self.len()];
        let mut filled = vec![false; self.len()];
        for (asset, value) in values {
            match self.position(asset) {
                Some(pos) => {
                    laid_out[pos] = *value;
                    filled[pos] = true;
                }
                None => {
                    return Err(ExchangeError::UnexpectedCurrencies {
                        expected: self.expected(),
                        found: values.keys().cloned().collect(),
                    })
                }
            }
        }
        if exact && filled.iter().any(|present| !present) {
            return Err(ExchangeError::UnexpectedCurrencies {
                expected: self.expected(),
                found: values.keys().cloned().collect(),
            });
        }
        Ok(laid_out)
    }

    /// Inverse of [layout](Universe::layout).
    pub(crate) fn to_map(&self, values: &[f64]) -> BTreeMap<String, f64> {
        self.assets()
            .zip(values.iter())
            .map(|(asset, value)| (asset.to_string(), *value))
            .collect()
    }
}

impl PartialEq for Universe {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.currencies, &other.currencies) || self.currencies == other.currencies
    }
}

impl Eq for Universe {}

/// Closing prices of every asset at one step of the timeline. Cash sits in slot 0 at 1.0.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceSnapshot {
    date: i64,
    universe: Universe,
    close: Vec<f64>,
}

impl PriceSnapshot {
    /// `close` holds one price per tradable currency, in universe order.
    pub fn new(universe: &Universe, date: i64, close: &[f64]) -> Result<Self> {
        if close.len() != universe.currencies().len() {
            return Err(ExchangeError::UnexpectedCurrencies {
                expected: universe.currencies().to_vec(),
                found: vec![format!("{} prices", close.len())],
            });
        }
        let mut slots = Vec::with_capacity(universe.len());
        slots.push(1.0);
        slots.extend_from_slice(close);
        Ok(Self {
            date,
            universe: universe.clone(),
            close: slots,
        })
    }

    pub fn date(&self) -> i64 {
        self.date
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn price(&self, asset: &str) -> Option<f64> {
        self.universe.position(asset).map(|pos| self.close[pos])
    }

    /// Prices in slot order, cash included.
    pub fn closes(&self) -> &[f64] {
        &self.close
    }

    /// Prices of tradable currencies keyed by identifier.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = self.universe.to_map(&self.close);
        map.remove(CASH);
        map
    }
}

/// Allocation of capital across every asset, cash included, as fractions of the total.
#[derive(Clone, Debug, PartialEq)]
pub struct Portfolio {
    universe: Universe,
    weights: Vec<f64>,
}

impl Portfolio {
    pub(crate) fn from_weights(universe: &Universe, weights: Vec<f64>) -> Self {
        Self {
            universe: universe.clone(),
            weights,
        }
    }

    /// Builds a target allocation. Assets left out of `weights` get 0. Weights must be finite,
    /// non-negative and sum to 1.
    pub fn target(universe: &Universe, weights: &BTreeMap<String, f64>) -> Result<Self> {
        let laid_out = universe.layout(weights, false)?;
        if let Some((pos, weight)) = laid_out
            .iter()
            .enumerate()
            .find(|(_, weight)| !weight.is_finite() || **weight < 0.0)
        {
            return Err(ExchangeError::InvalidPortfolio {
                reason: format!(
                    "weight {} for {} must be finite and non-negative",
                    weight,
                    universe.asset(pos).unwrap_or_default()
                ),
            });
        }
        let total: f64 = laid_out.iter().sum();
        if (total - 1.0).abs() > PORTFOLIO_SUM_TOLERANCE {
            return Err(ExchangeError::InvalidPortfolio {
                reason: format!("weights sum to {}, expected 1", total),
            });
        }
        Ok(Self::from_weights(universe, laid_out))
    }

    /// Convenience for tests and callers that build targets from literals.
    pub fn from_pairs(universe: &Universe, pairs: &[(&str, f64)]) -> Result<Self> {
        let weights: BTreeMap<String, f64> = pairs
            .iter()
            .map(|(asset, weight)| (asset.to_string(), *weight))
            .collect();
        Self::target(universe, &weights)
    }

    pub fn get(&self, asset: &str) -> Option<f64> {
        self.universe.position(asset).map(|pos| self.weights[pos])
    }

    /// Weights in slot order, cash first.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    /// Largest absolute difference between two allocations over the same universe.
    pub fn distance(&self, other: &Portfolio) -> f64 {
        self.weights
            .iter()
            .zip(other.weights.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.universe.to_map(&self.weights)
    }
}
