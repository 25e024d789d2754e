//! Inputs wrap around a dataset and present it to the exchange as a sequence of aligned steps:
//! at every step each currency has exactly one candle and every candle shares the same date.
//!
//! Sources that fetch data from elsewhere should write into the format read here, so that the
//! exchange only ever has to deal with one representation.
pub mod candles;
