//! Sources fetch candles from outside the simulator and turn them into [Candle](crate::input::candles::Candle)s,
//! which can be written to disk with [write_candles](crate::input::candles::write_candles) and
//! loaded back by [CandleStore](crate::input::candles::CandleStore).
pub mod binance;
