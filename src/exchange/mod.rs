//! The exchange is the interface presented to clients. Execution of a single order lives in
//! [orders], the fee-aware rebalancing calculation lives in [rebalance] and the logic in
//! [session] is mostly orchestration: stepping through candles and threading ledgers between
//! the other two.
pub mod orders;
pub mod rebalance;
pub mod session;

pub use orders::{Order, OrderEngine, OrderOutcome, OrderType, Rejection, Trade};
pub use rebalance::{RebalancePlan, Rebalancer};
pub use session::ExchangeSession;
