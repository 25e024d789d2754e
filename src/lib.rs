//! # What is xchg?
//!
//! xchg replays historical candles for a set of currencies and lets users trade against the
//! closing price at each step. It is intended for backtesting allocation strategies: the main
//! operation is moving a balance to a target portfolio while paying fees, and the exchange works
//! out how much capital is left once the fees for getting there are paid.
//!
//! The standard mechanism for running a backtest is the JSON server but users can also import the
//! lib, which is what the server is built on.
//!
//! # Implementation
//!
//! A session is composed of:
//! - An input, [CandleStore](crate::input::candles::CandleStore), holding one candle per currency
//! per step. Candles are read from CSV files, one file per currency. A store is never modified
//! after it is read and is shared between every session replaying it.
//! - A [Ledger](crate::ledger::Ledger) of what is held, laid out against the
//! [Universe](crate::types::Universe) of currencies with cash in the first slot.
//! - An [OrderEngine](crate::exchange::orders::OrderEngine) which executes single market orders.
//! Fees are always taken from the cash side of the trade.
//! - A [Rebalancer](crate::exchange::rebalance::Rebalancer) which solves for the capital retained
//! after fees and then sells and buys toward the target.
//! - The [ExchangeSession](crate::exchange::session::ExchangeSession) which ties these together.
//! Every operation returns a new session so earlier states stay valid.
//!
//! In addition, [source](crate::source) downloads candles from Binance into the format that the
//! input reads.
//!
//! ``
//! cargo run --bin xchg_server [ipv4_address] [port] [config.json]
//! cargo run --bin download_candles [data_dir] [YYYY-MM-DD] [interval] [SYMBOL]...
//! ``
pub mod config;
pub mod error;
pub mod exchange;
pub mod http;
pub mod input;
pub mod ledger;
pub mod source;
pub mod types;
pub mod valuation;
