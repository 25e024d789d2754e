use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ExchangeError, Result};
use crate::ledger::Ledger;
use crate::types::PriceSnapshot;

/// Orders that overshoot available cash or holdings by less than this are executed and the
/// exhausted balance is clamped to zero.
pub const FORGIVENESS: f64 = 1e-10;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum OrderType {
    MarketBuy,
    MarketSell,
}

/// Request to trade `qty` units of a currency against cash at the current close.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Order {
    pub order_type: OrderType,
    pub symbol: String,
    pub qty: f64,
}

impl Order {
    fn market(order_type: OrderType, symbol: impl Into<String>, qty: f64) -> Self {
        Self {
            order_type,
            symbol: symbol.into(),
            qty,
        }
    }

    pub fn market_buy(symbol: impl Into<String>, qty: f64) -> Self {
        Order::market(OrderType::MarketBuy, symbol, qty)
    }

    pub fn market_sell(symbol: impl Into<String>, qty: f64) -> Self {
        Order::market(OrderType::MarketSell, symbol, qty)
    }

    pub fn get_symbol(&self) -> &str {
        &self.symbol
    }

    pub fn get_qty(&self) -> f64 {
        self.qty
    }

    pub fn get_order_type(&self) -> &OrderType {
        &self.order_type
    }
}

/// An executed order. `value` is the notional at the close, `fee` is what the exchange kept.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Trade {
    pub symbol: String,
    pub qty: f64,
    pub value: f64,
    pub fee: f64,
    pub date: i64,
    pub typ: OrderType,
}

/// Why an order was not executed. More than one reason can apply.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Rejection {
    pub insufficient_funds: bool,
    pub below_minimum: bool,
    pub invalid_quantity: bool,
}

impl Rejection {
    fn is_rejected(&self) -> bool {
        self.insufficient_funds || self.below_minimum || self.invalid_quantity
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub enum OrderOutcome {
    Executed(Trade),
    Rejected(Rejection),
}

impl OrderOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, OrderOutcome::Executed(_))
    }
}

/// Ledger produced by an order along with what happened to the order.
#[derive(Clone, Debug, PartialEq)]
pub struct Execution {
    pub ledger: Ledger,
    pub outcome: OrderOutcome,
}

/// Executes single orders against a ledger.
///
/// The fee is always taken from the cash side of a trade. A buy of `qty` units costs
/// `qty * price / (1 - fee)` cash, a sell of `qty` units returns `qty * price * (1 - fee)`. So
/// buying something and selling it straight back loses `1 - (1 - fee)^2` of its value.
///
/// Orders either execute in full or are rejected. A rejected order returns the ledger it was
/// given, unchanged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderEngine {
    fee: f64,
    min_order_size: f64,
}

impl OrderEngine {
    pub fn new(fee: f64, min_order_size: f64) -> Result<Self> {
        if !fee.is_finite() || !(0.0..1.0).contains(&fee) {
            return Err(ExchangeError::InvalidFee { fee });
        }
        if !min_order_size.is_finite() || min_order_size < 0.0 {
            return Err(ExchangeError::InvalidMinOrderSize { min_order_size });
        }
        Ok(Self {
            fee,
            min_order_size,
        })
    }

    pub fn fee(&self) -> f64 {
        self.fee
    }

    pub fn min_order_size(&self) -> f64 {
        self.min_order_size
    }

    /// Cash needed to receive currency worth `notional` at the close.
    pub fn buy_cost(&self, notional: f64) -> f64 {
        notional / (1.0 - self.fee)
    }

    /// Cash received for currency worth `notional` at the close.
    pub fn sell_proceeds(&self, notional: f64) -> f64 {
        notional * (1.0 - self.fee)
    }

    pub fn buy(
        &self,
        ledger: &Ledger,
        prices: &PriceSnapshot,
        symbol: &str,
        qty: f64,
    ) -> Result<Ledger> {
        let order = Order::market_buy(symbol, qty);
        Ok(self.execute(ledger, prices, &order)?.ledger)
    }

    pub fn sell(
        &self,
        ledger: &Ledger,
        prices: &PriceSnapshot,
        symbol: &str,
        qty: f64,
    ) -> Result<Ledger> {
        let order = Order::market_sell(symbol, qty);
        Ok(self.execute(ledger, prices, &order)?.ledger)
    }

    /// Fails when the order names something that is not a tradable currency, or when the prices
    /// are laid out over other currencies than the ledger.
    pub fn execute(
        &self,
        ledger: &Ledger,
        prices: &PriceSnapshot,
        order: &Order,
    ) -> Result<Execution> {
        if ledger.universe() != prices.universe() {
            return Err(ExchangeError::UnexpectedCurrencies {
                expected: ledger.universe().currencies().to_vec(),
                found: prices.universe().currencies().to_vec(),
            });
        }
        let pos = match ledger.universe().position(order.get_symbol()) {
            Some(pos) if pos > 0 => pos,
            _ => {
                return Err(ExchangeError::UnknownAsset {
                    asset: order.get_symbol().to_string(),
                })
            }
        };
        let price = prices.closes()[pos];
        let qty = order.get_qty();
        let notional = qty * price;

        let mut rejection = Rejection {
            invalid_quantity: !qty.is_finite() || qty <= 0.0,
            below_minimum: notional < self.min_order_size,
            ..Rejection::default()
        };

        let execution = match order.get_order_type() {
            OrderType::MarketBuy => {
                let cost = self.buy_cost(notional);
                rejection.insufficient_funds = cost > ledger.cash() + FORGIVENESS;
                if rejection.is_rejected() {
                    None
                } else {
                    Some((ledger.transfer(pos, qty, -cost), cost - notional))
                }
            }
            OrderType::MarketSell => {
                let held = ledger.amounts()[pos];
                rejection.insufficient_funds = qty > held + FORGIVENESS;
                if rejection.is_rejected() {
                    None
                } else {
                    let proceeds = self.sell_proceeds(notional);
                    Some((ledger.transfer(pos, -qty, proceeds), notional - proceeds))
                }
            }
        };

        match execution {
            Some((next, fee)) => {
                debug!(
                    "EXCHANGE: Executed {:?} of {:?} {:?} at {:?}",
                    order.get_order_type(),
                    qty,
                    order.get_symbol(),
                    price
                );
                Ok(Execution {
                    ledger: next,
                    outcome: OrderOutcome::Executed(Trade {
                        symbol: order.get_symbol().to_string(),
                        qty,
                        value: notional,
                        fee,
                        date: prices.date(),
                        typ: *order.get_order_type(),
                    }),
                })
            }
            None => {
                info!(
                    "EXCHANGE: Rejected {:?} of {:?} {:?}: {:?}",
                    order.get_order_type(),
                    qty,
                    order.get_symbol(),
                    rejection
                );
                Ok(Execution {
                    ledger: ledger.clone(),
                    outcome: OrderOutcome::Rejected(rejection),
                })
            }
        }
    }
}
