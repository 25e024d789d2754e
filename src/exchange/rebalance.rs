use log::{debug, info};

use crate::error::{ExchangeError, Result};
use crate::ledger::Ledger;
use crate::types::{Portfolio, PriceSnapshot};
use crate::valuation;

use super::orders::{Order, OrderEngine, OrderOutcome};

/// Successive estimates of the retention ratio closer than this are treated as converged.
pub const CONVERGENCE_TOLERANCE: f64 = 1e-10;
pub const MAX_ITERATIONS: usize = 10_000;

/// Fraction of capital left after moving from `current` to `target` when every trade pays
/// `fee` on its cash leg.
///
/// Cash moved from one currency to another is sold and then bought, so pays `2f - f^2`. Cash
/// that starts as cash pays only on the buy, cash that ends as cash pays only on the sell. How
/// much has to be sold depends on the capital that remains, so the ratio `r` solves:
///
/// `r = (1 - f * p_cash - (2f - f^2) * sum(max(p_i - r * t_i, 0))) / (1 - f * t_cash)`
///
/// which is found by fixed-point iteration starting from the round-trip cost.
///
/// Both slices are laid out in slot order with cash in slot 0, so must be the same non-zero
/// length.
pub fn retention_ratio(fee: f64, current: &[f64], target: &[f64]) -> Result<f64> {
    if current.is_empty() || current.len() != target.len() {
        return Err(ExchangeError::InvalidPortfolio {
            reason: format!(
                "{} current weights against {} target weights",
                current.len(),
                target.len()
            ),
        });
    }

    let round_trip = 2.0 * fee - fee * fee;
    let denominator = 1.0 - fee * target[0];

    let mut prev = 1.0;
    let mut ratio = 1.0 - round_trip;
    let mut iterations = 0;
    while (ratio - prev).abs() >= CONVERGENCE_TOLERANCE {
        if iterations >= MAX_ITERATIONS {
            return Err(ExchangeError::NonConvergence { iterations });
        }
        prev = ratio;
        let to_sell: f64 = current
            .iter()
            .zip(target.iter())
            .skip(1)
            .map(|(p, t)| (p - prev * t).max(0.0))
            .sum();
        ratio = (1.0 - fee * current[0] - round_trip * to_sell) / denominator;
        //NaN never compares as converged so would spin until the cap
        if !ratio.is_finite() {
            return Err(ExchangeError::NonConvergence { iterations });
        }
        iterations += 1;
    }
    debug!(
        "REBALANCE: Retention ratio {:?} after {:?} iterations",
        ratio, iterations
    );
    Ok(ratio)
}

/// Orders needed to move a ledger to a target allocation, before anything is executed.
#[derive(Clone, Debug, PartialEq)]
pub struct RebalancePlan {
    pub retention: f64,
    pub capital: f64,
    pub target_capital: f64,
    pub sells: Vec<Order>,
    pub buys: Vec<Order>,
}

impl RebalancePlan {
    /// Every order in execution order: sells first.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.sells.iter().chain(self.buys.iter())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rebalanced {
    pub ledger: Ledger,
    pub plan: RebalancePlan,
    pub outcomes: Vec<OrderOutcome>,
}

/// Moves a ledger to a target portfolio through an [OrderEngine].
///
/// Sells execute before buys so that buys can be funded from the cash freed up. Buy sizes come
/// from the plan but are scaled down, all by the same factor, when the cash actually on hand
/// after the sells would not cover them. That happens when a sell was rejected for being
/// below the minimum order size, or from float residue on large ledgers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rebalancer {
    engine: OrderEngine,
}

impl Rebalancer {
    pub fn new(engine: OrderEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &OrderEngine {
        &self.engine
    }

    pub fn plan(
        &self,
        ledger: &Ledger,
        prices: &PriceSnapshot,
        target: &Portfolio,
    ) -> Result<RebalancePlan> {
        if ledger.universe() != target.universe() || ledger.universe() != prices.universe() {
            return Err(ExchangeError::UnexpectedCurrencies {
                expected: ledger.universe().currencies().to_vec(),
                found: target.universe().currencies().to_vec(),
            });
        }

        let capital = valuation::capital(ledger, prices)?;
        let current = valuation::portfolio(ledger, prices)?;
        let retention = retention_ratio(self.engine.fee(), current.weights(), target.weights())?;
        let target_capital = capital * retention;

        let mut sells = Vec::new();
        let mut buys = Vec::new();
        let closes = prices.closes();
        let held = ledger.amounts();
        for (pos, currency) in ledger.universe().currencies().iter().enumerate() {
            let slot = pos + 1;
            let target_qty = target_capital * target.weights()[slot] / closes[slot];
            if target_qty < held[slot] {
                sells.push(Order::market_sell(currency.clone(), held[slot] - target_qty));
            } else if target_qty > held[slot] {
                buys.push(Order::market_buy(currency.clone(), target_qty - held[slot]));
            }
        }

        info!(
            "REBALANCE: Capital {:?} retains {:?} after fees, {:?} sells and {:?} buys",
            capital,
            retention,
            sells.len(),
            buys.len()
        );
        Ok(RebalancePlan {
            retention,
            capital,
            target_capital,
            sells,
            buys,
        })
    }

    pub fn rebalance(
        &self,
        ledger: &Ledger,
        prices: &PriceSnapshot,
        target: &Portfolio,
    ) -> Result<Rebalanced> {
        let plan = self.plan(ledger, prices, target)?;
        let mut ledger = ledger.clone();
        let mut outcomes = Vec::with_capacity(plan.sells.len() + plan.buys.len());

        for order in &plan.sells {
            let execution = self.engine.execute(&ledger, prices, order)?;
            ledger = execution.ledger;
            outcomes.push(execution.outcome);
        }

        let mut required = 0.0;
        for order in &plan.buys {
            if let Some(price) = prices.price(order.get_symbol()) {
                required += self.engine.buy_cost(order.get_qty() * price);
            }
        }
        let scale = if required > ledger.cash() {
            info!(
                "REBALANCE: Buys need {:?} but only {:?} is available, scaling down",
                required,
                ledger.cash()
            );
            ledger.cash() / required
        } else {
            1.0
        };

        for order in &plan.buys {
            let mut qty = order.get_qty() * scale;
            //The last buys absorb any residue left by earlier ones
            if let Some(price) = prices.price(order.get_symbol()) {
                let affordable = ledger.cash() * (1.0 - self.engine.fee()) / price;
                qty = qty.min(affordable);
            }
            let scaled = Order::market_buy(order.get_symbol(), qty);
            let execution = self.engine.execute(&ledger, prices, &scaled)?;
            ledger = execution.ledger;
            outcomes.push(execution.outcome);
        }

        Ok(Rebalanced {
            ledger,
            plan,
            outcomes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{retention_ratio, Rebalancer};
    use crate::error::ExchangeError;
    use crate::exchange::orders::OrderEngine;
    use crate::ledger::Ledger;
    use crate::types::{Portfolio, PriceSnapshot, Universe};
    use crate::valuation;

    fn setup() -> (Ledger, PriceSnapshot) {
        let universe = Universe::new(["cur0", "cur1", "cur2"]).unwrap();
        let mut balance = BTreeMap::new();
        balance.insert("cash".to_string(), 1.0);
        balance.insert("cur0".to_string(), 0.1);
        balance.insert("cur1".to_string(), 0.5);
        balance.insert("cur2".to_string(), 0.0);
        let ledger = Ledger::from_map(&universe, &balance).unwrap();
        let prices = PriceSnapshot::new(&universe, 1575158400, &[0.02008, 0.12008, 0.22008]).unwrap();
        (ledger, prices)
    }

    fn rebalancer(fee: f64) -> Rebalancer {
        Rebalancer::new(OrderEngine::new(fee, 0.0).unwrap())
    }

    #[test]
    fn test_that_zero_fee_retains_everything() {
        let ratio = retention_ratio(0.0, &[0.5, 0.5, 0.0], &[0.0, 0.0, 1.0]).unwrap();
        assert_eq!(ratio, 1.0);
    }

    #[test]
    fn test_that_cash_to_cash_loses_nothing() {
        let ratio = retention_ratio(0.1, &[1.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!((ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_that_cash_into_currency_pays_one_fee() {
        let ratio = retention_ratio(0.1, &[1.0, 0.0], &[0.0, 1.0]).unwrap();
        assert!((ratio - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_that_currency_swap_pays_two_fees() {
        let ratio = retention_ratio(0.1, &[0.0, 1.0, 0.0], &[0.0, 0.0, 1.0]).unwrap();
        assert!((ratio - 0.81).abs() < 1e-9);
    }

    #[test]
    fn test_that_zero_fee_hits_target_exactly() {
        let (ledger, prices) = setup();
        let target = Portfolio::from_pairs(
            ledger.universe(),
            &[("cash", 0.25), ("cur0", 0.25), ("cur1", 0.25), ("cur2", 0.25)],
        )
        .unwrap();
        let result = rebalancer(0.0).rebalance(&ledger, &prices, &target).unwrap();
        let reached = valuation::portfolio(&result.ledger, &prices).unwrap();

        assert!(reached.distance(&target) < 1e-10);
        assert!((valuation::capital(&result.ledger, &prices).unwrap() - 1.062048).abs() < 1e-10);
    }

    #[test]
    fn test_that_fees_still_reach_target_allocation() {
        let (ledger, prices) = setup();
        let target = Portfolio::from_pairs(
            ledger.universe(),
            &[("cash", 0.1), ("cur0", 0.2), ("cur1", 0.01), ("cur2", 0.69)],
        )
        .unwrap();
        let result = rebalancer(0.1).rebalance(&ledger, &prices, &target).unwrap();
        let reached = valuation::portfolio(&result.ledger, &prices).unwrap();
        let capital = valuation::capital(&result.ledger, &prices).unwrap();

        assert!(reached.distance(&target) < 1e-9);
        assert!((capital - result.plan.target_capital).abs() < 1e-9);
        assert!(capital < result.plan.capital);
        assert!(result.outcomes.iter().all(|outcome| outcome.is_executed()));
    }

    #[test]
    fn test_that_all_in_target_spends_all_cash() {
        let (ledger, prices) = setup();
        let target = Portfolio::from_pairs(ledger.universe(), &[("cur0", 1.0)]).unwrap();
        let result = rebalancer(0.1).rebalance(&ledger, &prices, &target).unwrap();

        assert!(result.ledger.cash() < 1e-9);
        assert!(result.ledger.get("cur1").unwrap() < 1e-9);
        assert!(valuation::portfolio(&result.ledger, &prices).unwrap().get("cur0").unwrap() > 1.0 - 1e-9);
    }

    #[test]
    fn test_that_sells_are_planned_before_buys() {
        let (ledger, prices) = setup();
        let target = Portfolio::from_pairs(ledger.universe(), &[("cur2", 1.0)]).unwrap();
        let plan = rebalancer(0.1).plan(&ledger, &prices, &target).unwrap();

        let symbols: Vec<&str> = plan.orders().map(|order| order.get_symbol()).collect();
        assert_eq!(symbols, vec!["cur0", "cur1", "cur2"]);
        assert_eq!(plan.sells.len(), 2);
        assert_eq!(plan.buys.len(), 1);
    }

    #[test]
    fn test_that_rejected_sells_do_not_overdraw_buys() {
        let (ledger, prices) = setup();
        //Selling all of cur0 is worth 0.002, below the minimum, so that cash never arrives
        let rebalancer = Rebalancer::new(OrderEngine::new(0.1, 0.01).unwrap());
        let target = Portfolio::from_pairs(ledger.universe(), &[("cur2", 1.0)]).unwrap();
        let result = rebalancer.rebalance(&ledger, &prices, &target).unwrap();

        assert!(!result.outcomes[0].is_executed());
        assert!(result.outcomes[2].is_executed());
        assert_eq!(result.ledger.get("cur0"), Some(0.1));
        assert!(result.ledger.cash() < 1e-12);
    }

    #[test]
    fn test_that_mismatched_universe_fails() {
        let (ledger, prices) = setup();
        let other = Universe::new(["cur0", "cur1"]).unwrap();
        let target = Portfolio::from_pairs(&other, &[("cur0", 1.0)]).unwrap();
        assert!(matches!(
            rebalancer(0.1).rebalance(&ledger, &prices, &target),
            Err(ExchangeError::UnexpectedCurrencies { .. })
        ));
    }

    #[test]
    fn test_that_weights_of_different_lengths_fail() {
        assert!(matches!(
            retention_ratio(0.1, &[], &[]),
            Err(ExchangeError::InvalidPortfolio { .. })
        ));
        assert!(matches!(
            retention_ratio(0.1, &[0.5, 0.5], &[]),
            Err(ExchangeError::InvalidPortfolio { .. })
        ));
        assert!(matches!(
            retention_ratio(0.1, &[0.5, 0.5], &[0.0, 0.0, 1.0]),
            Err(ExchangeError::InvalidPortfolio { .. })
        ));
    }

    #[test]
    fn test_that_ratio_converges_across_fees() {
        let current = [0.1, 0.3, 0.0, 0.6];
        let targets = [
            [0.0, 0.0, 1.0, 0.0],
            [1.0, 0.0, 0.0, 0.0],
            [0.25, 0.25, 0.25, 0.25],
            [0.0, 0.5, 0.5, 0.0],
        ];
        let mut fee = 0.0;
        while fee < 0.5 {
            for target in &targets {
                let ratio = retention_ratio(fee, &current, target).unwrap();
                assert!(ratio > 0.0 && ratio <= 1.0 + 1e-12);
            }
            fee += 0.01;
        }
    }
}
