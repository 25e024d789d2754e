use std::collections::BTreeMap;
use std::sync::Arc;

use log::info;

use crate::config::ExchangeConfig;
use crate::error::{ExchangeError, Result};
use crate::input::candles::{Candle, CandleStore};
use crate::ledger::Ledger;
use crate::types::{Portfolio, PriceSnapshot};
use crate::valuation;

use super::orders::{Order, OrderEngine, OrderOutcome};
use super::rebalance::{RebalancePlan, Rebalancer};

/// Balance a session starts with when none is given.
pub const DEFAULT_CASH: f64 = 1.0;

/// A simulation stepping through a [CandleStore] with a ledger that trades at each step's
/// closing prices.
///
/// Sessions are values. `advance`, `buy`, `sell` and `rebalance` return a new session and leave
/// the one they were called on as it was, so a caller can keep any earlier state around.
/// Cloning is cheap: the candles are shared.
#[derive(Clone, Debug)]
pub struct ExchangeSession {
    store: Arc<CandleStore>,
    pos: usize,
    ledger: Ledger,
    rebalancer: Rebalancer,
}

impl ExchangeSession {
    /// Starts at the first step holding [DEFAULT_CASH] and nothing else.
    pub fn new(store: Arc<CandleStore>, fee: f64, min_order_size: f64) -> Result<Self> {
        let ledger = Ledger::with_cash(store.universe(), DEFAULT_CASH)?;
        Self::with_ledger(store, fee, min_order_size, ledger)
    }

    /// Starts at the first step with a balance naming cash and every currency of the store.
    pub fn with_balance(
        store: Arc<CandleStore>,
        fee: f64,
        min_order_size: f64,
        balance: &BTreeMap<String, f64>,
    ) -> Result<Self> {
        let ledger = Ledger::from_map(store.universe(), balance)?;
        Self::with_ledger(store, fee, min_order_size, ledger)
    }

    pub fn from_config(store: Arc<CandleStore>, config: &ExchangeConfig) -> Result<Self> {
        match config.initial_balance() {
            Some(balance) => Self::with_balance(
                store,
                config.fee(),
                config.min_order_size(),
                balance,
            ),
            None => Self::new(store, config.fee(), config.min_order_size()),
        }
    }

    fn with_ledger(
        store: Arc<CandleStore>,
        fee: f64,
        min_order_size: f64,
        ledger: Ledger,
    ) -> Result<Self> {
        if store.is_empty() {
            return Err(ExchangeError::EmptyCandles {
                location: "candle store".to_string(),
            });
        }
        let engine = OrderEngine::new(fee, min_order_size)?;
        info!(
            "SESSION: Starting with {:?} steps, fee {:?}, minimum order {:?}",
            store.len(),
            fee,
            min_order_size
        );
        Ok(Self {
            store,
            pos: 0,
            ledger,
            rebalancer: Rebalancer::new(engine),
        })
    }

    fn with_new_ledger(&self, ledger: Ledger) -> Self {
        Self {
            store: Arc::clone(&self.store),
            pos: self.pos,
            ledger,
            rebalancer: self.rebalancer,
        }
    }

    /// Candles for every currency at the current step, in currency order.
    pub fn current_candle(&self) -> &[Candle] {
        self.store.step(self.pos).unwrap_or_default()
    }

    pub fn candle(&self, symbol: &str) -> Option<&Candle> {
        self.store.candle(self.pos, symbol)
    }

    pub fn current_prices(&self) -> &PriceSnapshot {
        //Cursor never leaves the store and the store is never empty
        match self.store.prices(self.pos) {
            Some(prices) => prices,
            None => unreachable!("session cursor outside of candle store"),
        }
    }

    /// Date of the current step.
    pub fn now(&self) -> i64 {
        self.current_prices().date()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn has_next(&self) -> bool {
        self.store.has_next(self.pos)
    }

    pub fn balance(&self) -> &Ledger {
        &self.ledger
    }

    pub fn capital(&self) -> f64 {
        //Ledger and prices are both laid out against the store's universe
        valuation::mark_to_market(&self.ledger, self.current_prices())
    }

    pub fn portfolio(&self) -> Result<Portfolio> {
        valuation::weights(&self.ledger, self.current_prices())
    }

    pub fn fee(&self) -> f64 {
        self.rebalancer.engine().fee()
    }

    pub fn min_order_size(&self) -> f64 {
        self.rebalancer.engine().min_order_size()
    }

    pub fn currencies(&self) -> &[String] {
        self.store.currencies()
    }

    pub fn store(&self) -> &Arc<CandleStore> {
        &self.store
    }

    /// Moves to the next step. The balance carries over and is revalued at the new prices.
    pub fn advance(&self) -> Result<Self> {
        if !self.has_next() {
            return Err(ExchangeError::EndOfData);
        }
        let next = Self {
            store: Arc::clone(&self.store),
            pos: self.pos + 1,
            ledger: self.ledger.clone(),
            rebalancer: self.rebalancer,
        };
        info!("SESSION: Advanced to {:?}", next.now());
        Ok(next)
    }

    /// Buys `qty` units of `symbol`. A rejected order returns a session with the same balance.
    pub fn buy(&self, symbol: &str, qty: f64) -> Result<Self> {
        Ok(self.execute(&Order::market_buy(symbol, qty))?.0)
    }

    /// Sells `qty` units of `symbol`. A rejected order returns a session with the same balance.
    pub fn sell(&self, symbol: &str, qty: f64) -> Result<Self> {
        Ok(self.execute(&Order::market_sell(symbol, qty))?.0)
    }

    pub fn execute(&self, order: &Order) -> Result<(Self, OrderOutcome)> {
        let execution =
            self.rebalancer
                .engine()
                .execute(&self.ledger, self.current_prices(), order)?;
        Ok((self.with_new_ledger(execution.ledger), execution.outcome))
    }

    /// Builds a target portfolio over this session's currencies.
    pub fn target(&self, weights: &BTreeMap<String, f64>) -> Result<Portfolio> {
        Portfolio::target(self.store.universe(), weights)
    }

    /// Orders that [rebalance](ExchangeSession::rebalance) would send, without sending them.
    pub fn plan(&self, target: &Portfolio) -> Result<RebalancePlan> {
        self.rebalancer
            .plan(&self.ledger, self.current_prices(), target)
    }

    pub fn rebalance(&self, target: &Portfolio) -> Result<Self> {
        let rebalanced = self
            .rebalancer
            .rebalance(&self.ledger, self.current_prices(), target)?;
        Ok(self.with_new_ledger(rebalanced.ledger))
    }

    /// Rebalances to weights keyed by asset. Assets that are left out get 0.
    pub fn rebalance_to(&self, weights: &BTreeMap<String, f64>) -> Result<Self> {
        let target = self.target(weights)?;
        self.rebalance(&target)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::ExchangeSession;
    use crate::error::ExchangeError;
    use crate::input::candles::{Candle, CandleStore};

    fn store() -> Arc<CandleStore> {
        let mut series = BTreeMap::new();
        series.insert(
            "cur0".to_string(),
            vec![
                Candle::new(100, 1.1, 0.9, 1.0, 1.0),
                Candle::new(101, 2.1, 1.9, 2.0, 2.0),
            ],
        );
        series.insert(
            "cur1".to_string(),
            vec![
                Candle::new(100, 4.1, 3.9, 4.0, 4.0),
                Candle::new(101, 4.1, 3.9, 4.0, 4.0),
            ],
        );
        Arc::new(CandleStore::from_series(series).unwrap())
    }

    #[test]
    fn test_that_session_starts_with_cash() {
        let session = ExchangeSession::new(store(), 0.0, 0.0).unwrap();
        assert_eq!(session.balance().cash(), 1.0);
        assert_eq!(session.capital(), 1.0);
        assert_eq!(session.now(), 100);
        assert_eq!(session.current_candle().len(), 2);
        assert_eq!(session.candle("cur1").unwrap().close, 4.0);
        assert!(session.has_next());
    }

    #[test]
    fn test_that_advance_revalues_holdings() {
        let session = ExchangeSession::new(store(), 0.0, 0.0).unwrap();
        let bought = session.buy("cur0", 0.5).unwrap();
        assert_eq!(bought.capital(), 1.0);

        let next = bought.advance().unwrap();
        assert_eq!(next.now(), 101);
        assert_eq!(next.capital(), 1.5);
        assert!(!next.has_next());
        assert!(matches!(next.advance(), Err(ExchangeError::EndOfData)));
    }

    #[test]
    fn test_that_trades_leave_the_original_session_alone() {
        let session = ExchangeSession::new(store(), 0.1, 0.0).unwrap();
        let bought = session.buy("cur1", 0.1).unwrap();

        assert_eq!(session.balance().get("cur1"), Some(0.0));
        assert_eq!(session.balance().cash(), 1.0);
        assert_eq!(bought.balance().get("cur1"), Some(0.1));
        assert_eq!(bought.position(), session.position());
    }

    #[test]
    fn test_that_rebalance_to_fills_missing_weights() {
        let session = ExchangeSession::new(store(), 0.0, 0.0).unwrap();
        let mut weights = BTreeMap::new();
        weights.insert("cur0".to_string(), 0.5);
        weights.insert("cur1".to_string(), 0.5);
        let rebalanced = session.rebalance_to(&weights).unwrap();
        let portfolio = rebalanced.portfolio().unwrap();

        assert!(portfolio.get("cash").unwrap() < 1e-10);
        assert!((portfolio.get("cur0").unwrap() - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_that_session_refuses_bad_configuration() {
        assert!(matches!(
            ExchangeSession::new(store(), 1.5, 0.0),
            Err(ExchangeError::InvalidFee { .. })
        ));
        let mut balance = BTreeMap::new();
        balance.insert("cash".to_string(), 1.0);
        assert!(ExchangeSession::with_balance(store(), 0.1, 0.0, &balance).is_err());
    }
}
