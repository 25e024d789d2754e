use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};
use rand::thread_rng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::error::{ExchangeError, Result};
use crate::types::{PriceSnapshot, Universe};

/// One price observation for a currency. Only `close` is used for trading, the rest is carried
/// so that stores can be written back out unchanged.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Candle {
    pub date: i64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
}

impl Candle {
    pub fn new(date: i64, high: f64, low: f64, open: f64, close: f64) -> Self {
        Self {
            date,
            high,
            low,
            open,
            close,
        }
    }
}

/// Row as it appears on disk. Only `date` and `close` have to be present.
#[derive(Deserialize)]
struct CandleRecord {
    date: i64,
    close: f64,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    open: Option<f64>,
}

impl From<CandleRecord> for Candle {
    fn from(record: CandleRecord) -> Self {
        let close = record.close;
        Candle::new(
            record.date,
            record.high.unwrap_or(close),
            record.low.unwrap_or(close),
            record.open.unwrap_or(close),
            close,
        )
    }
}

/// Reads one currency's candles. Missing `high`, `low` or `open` columns take the close, other
/// columns are ignored.
pub fn read_candles(path: impl AsRef<Path>) -> Result<Vec<Candle>> {
    let mut rdr = csv::Reader::from_path(path.as_ref())?;
    let mut candles = Vec::new();
    for row in rdr.deserialize() {
        let record: CandleRecord = row?;
        candles.push(record.into());
    }
    Ok(candles)
}

/// Writes candles in the format read by [read_candles].
pub fn write_candles(path: impl AsRef<Path>, candles: &[Candle]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    for candle in candles {
        wtr.serialize(candle)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Historical candles for a fixed set of currencies, aligned by position.
///
/// The store is read-only once built and is shared between sessions, so every session
/// replaying the same dataset walks the same steps.
#[derive(Clone, Debug)]
pub struct CandleStore {
    universe: Universe,
    //Outer index is the step, inner index is the currency in universe order
    steps: Vec<Vec<Candle>>,
    prices: Vec<PriceSnapshot>,
}

impl CandleStore {
    /// Loads every `<currency>.csv` file in a directory. Currencies are ordered by file name.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut series = BTreeMap::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if file_path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
                continue;
            }
            if let Some(currency) = file_path.file_stem().and_then(|stem| stem.to_str()) {
                debug!("INPUT: Reading candles for {:?} from {:?}", currency, file_path);
                series.insert(currency.to_string(), read_candles(&file_path)?);
            }
        }
        if series.is_empty() {
            return Err(ExchangeError::EmptyCandles {
                location: path.display().to_string(),
            });
        }
        let store = Self::from_series(series)?;
        info!(
            "INPUT: Loaded {:?} steps for {:?} from {:?}",
            store.len(),
            store.currencies(),
            path
        );
        Ok(store)
    }

    /// Builds a store from one candle series per currency. Every series must have the same
    /// length and the same date at each position.
    pub fn from_series(series: BTreeMap<String, Vec<Candle>>) -> Result<Self> {
        let universe = Universe::new(series.keys().cloned())?;
        let mut columns = series.into_iter();
        let (first_currency, first) = match columns.next() {
            Some(column) => column,
            None => {
                return Err(ExchangeError::EmptyCandles {
                    location: "candle series".to_string(),
                })
            }
        };
        if first.is_empty() {
            return Err(ExchangeError::EmptyCandles {
                location: first_currency,
            });
        }

        let mut steps: Vec<Vec<Candle>> = first.into_iter().map(|candle| vec![candle]).collect();
        for (currency, candles) in columns {
            if candles.len() != steps.len() {
                return Err(ExchangeError::MismatchedCandles {
                    currency,
                    reason: format!("{} candles, expected {}", candles.len(), steps.len()),
                });
            }
            for (step, candle) in steps.iter_mut().zip(candles) {
                if candle.date != step[0].date {
                    return Err(ExchangeError::MismatchedCandles {
                        currency,
                        reason: format!("date {} where {} was expected", candle.date, step[0].date),
                    });
                }
                step.push(candle);
            }
        }

        let mut prices = Vec::with_capacity(steps.len());
        for step in &steps {
            for (currency, candle) in universe.currencies().iter().zip(step.iter()) {
                if !candle.close.is_finite() || candle.close <= 0.0 {
                    return Err(ExchangeError::InvalidPrice {
                        currency: currency.clone(),
                        date: candle.date,
                        close: candle.close,
                    });
                }
            }
            let close: Vec<f64> = step.iter().map(|candle| candle.close).collect();
            prices.push(PriceSnapshot::new(&universe, step[0].date, &close)?);
        }

        Ok(Self {
            universe,
            steps,
            prices,
        })
    }

    /// Builds a store from steps keyed by currency. Every step must name the same currencies.
    pub fn from_steps(steps: Vec<BTreeMap<String, Candle>>) -> Result<Self> {
        let mut series: BTreeMap<String, Vec<Candle>> = BTreeMap::new();
        if let Some(first) = steps.first() {
            for currency in first.keys() {
                series.insert(currency.clone(), Vec::with_capacity(steps.len()));
            }
        }
        for step in steps {
            if step.len() != series.len() || step.keys().any(|key| !series.contains_key(key)) {
                return Err(ExchangeError::UnexpectedCurrencies {
                    expected: series.keys().cloned().collect(),
                    found: step.keys().cloned().collect(),
                });
            }
            for (currency, candle) in step {
                if let Some(column) = series.get_mut(&currency) {
                    column.push(candle);
                }
            }
        }
        Self::from_series(series)
    }

    /// Uniformly distributed candles, used for benchmarks and server tests.
    pub fn random(length: usize, symbols: &[&str]) -> Result<Self> {
        let price_dist = Uniform::new(90.0, 100.0);
        let spread_dist = Uniform::new(0.0, 1.0);
        let mut rng = thread_rng();

        let mut steps = Vec::with_capacity(length);
        let mut prices = Vec::with_capacity(length);
        let universe = Universe::new(symbols.iter().copied())?;

        for date in 100..length as i64 + 100 {
            let mut step = Vec::with_capacity(symbols.len());
            for _symbol in symbols {
                let close: f64 = price_dist.sample(&mut rng);
                let spread: f64 = spread_dist.sample(&mut rng);
                step.push(Candle::new(date, close + spread, close - spread, close, close));
            }
            let close: Vec<f64> = step.iter().map(|candle| candle.close).collect();
            prices.push(PriceSnapshot::new(&universe, date, &close)?);
            steps.push(step);
        }

        Ok(Self {
            universe,
            steps,
            prices,
        })
    }

    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    pub fn currencies(&self) -> &[String] {
        self.universe.currencies()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// True when there is a step after `pos`.
    pub fn has_next(&self, pos: usize) -> bool {
        pos + 1 < self.steps.len()
    }

    /// Candles at a step, in universe order.
    pub fn step(&self, pos: usize) -> Option<&[Candle]> {
        self.steps.get(pos).map(Vec::as_slice)
    }

    pub fn candle(&self, pos: usize, currency: &str) -> Option<&Candle> {
        let slot = self.universe.position(currency)?;
        if slot == 0 {
            return None;
        }
        self.steps.get(pos)?.get(slot - 1)
    }

    pub fn prices(&self, pos: usize) -> Option<&PriceSnapshot> {
        self.prices.get(pos)
    }

    pub fn date(&self, pos: usize) -> Option<i64> {
        self.prices.get(pos).map(PriceSnapshot::date)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{Candle, CandleStore};
    use crate::error::ExchangeError;

    fn series() -> BTreeMap<String, Vec<Candle>> {
        let mut series = BTreeMap::new();
        series.insert(
            "cur1".to_string(),
            vec![
                Candle::new(100, 0.13, 0.11, 0.12, 0.12),
                Candle::new(101, 0.14, 0.12, 0.13, 0.13),
            ],
        );
        series.insert(
            "cur0".to_string(),
            vec![
                Candle::new(100, 0.03, 0.01, 0.02, 0.02),
                Candle::new(101, 0.04, 0.02, 0.03, 0.03),
            ],
        );
        series
    }

    #[test]
    fn test_that_series_are_aligned_by_position() {
        let store = CandleStore::from_series(series()).unwrap();

        assert_eq!(store.currencies(), &["cur0".to_string(), "cur1".to_string()]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.candle(1, "cur1").unwrap().close, 0.13);
        assert_eq!(store.prices(0).unwrap().price("cur0"), Some(0.02));
        assert_eq!(store.date(1), Some(101));
        assert!(store.has_next(0));
        assert!(!store.has_next(1));
    }

    #[test]
    fn test_that_mismatched_lengths_fail() {
        let mut series = series();
        series.get_mut("cur0").unwrap().pop();
        assert!(matches!(
            CandleStore::from_series(series),
            Err(ExchangeError::MismatchedCandles { .. })
        ));
    }

    #[test]
    fn test_that_mismatched_dates_fail() {
        let mut series = series();
        series.get_mut("cur1").unwrap()[1].date = 102;
        assert!(matches!(
            CandleStore::from_series(series),
            Err(ExchangeError::MismatchedCandles { .. })
        ));
    }

    #[test]
    fn test_that_non_positive_close_fails() {
        let mut series = series();
        series.get_mut("cur1").unwrap()[0].close = 0.0;
        assert!(matches!(
            CandleStore::from_series(series),
            Err(ExchangeError::InvalidPrice { .. })
        ));
    }

    #[test]
    fn test_that_steps_must_name_the_same_currencies() {
        let mut first = BTreeMap::new();
        first.insert("cur0".to_string(), Candle::new(100, 1.0, 1.0, 1.0, 1.0));
        let mut second = BTreeMap::new();
        second.insert("cur1".to_string(), Candle::new(101, 1.0, 1.0, 1.0, 1.0));

        assert!(CandleStore::from_steps(vec![first.clone()]).is_ok());
        assert!(CandleStore::from_steps(vec![first, second]).is_err());
    }

    #[test]
    fn test_that_random_store_has_requested_shape() {
        let store = CandleStore::random(50, &["ABC", "BCD"]).unwrap();
        assert_eq!(store.len(), 50);
        assert_eq!(store.currencies().len(), 2);
        assert!(store.prices(49).unwrap().price("ABC").unwrap() >= 90.0);
    }
}
