//! Configuration files are JSON. An exchange config sets trading costs and, optionally, the
//! balance new sessions start from:
//!
//! ```json
//! { "fee": 0.001, "min_order_size": 0.0001, "initial_balance": { "cash": 1.0, "BTCUSDT": 0.0 } }
//! ```
//!
//! The server config adds named datasets, each a directory of candle files:
//!
//! ```json
//! { "fee": 0.001, "min_order_size": 0.0001, "datasets": { "daily": "data/daily" } }
//! ```
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ExchangeError, Result};
use crate::input::candles::CandleStore;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ExchangeConfig {
    fee: f64,
    min_order_size: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    initial_balance: Option<BTreeMap<String, f64>>,
}

impl ExchangeConfig {
    pub fn new(fee: f64, min_order_size: f64) -> Result<Self> {
        let config = Self {
            fee,
            min_order_size,
            initial_balance: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_initial_balance(mut self, balance: BTreeMap<String, f64>) -> Result<Self> {
        self.initial_balance = Some(balance);
        self.validate()?;
        Ok(self)
    }

    /// Checks values that do not depend on the dataset. Whether the balance names the right
    /// currencies is only known once a session is built against a store.
    pub fn validate(&self) -> Result<()> {
        if !self.fee.is_finite() || !(0.0..1.0).contains(&self.fee) {
            return Err(ExchangeError::InvalidFee { fee: self.fee });
        }
        if !self.min_order_size.is_finite() || self.min_order_size < 0.0 {
            return Err(ExchangeError::InvalidMinOrderSize {
                min_order_size: self.min_order_size,
            });
        }
        if let Some(balance) = &self.initial_balance {
            for (asset, amount) in balance {
                if !amount.is_finite() || *amount < 0.0 {
                    return Err(ExchangeError::InvalidBalance {
                        asset: asset.clone(),
                        amount: *amount,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn fee(&self) -> f64 {
        self.fee
    }

    pub fn min_order_size(&self) -> f64 {
        self.min_order_size
    }

    pub fn initial_balance(&self) -> Option<&BTreeMap<String, f64>> {
        self.initial_balance.as_ref()
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    #[serde(flatten)]
    pub exchange: ExchangeConfig,
    pub datasets: BTreeMap<String, PathBuf>,
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = serde_json::from_str(&fs::read_to_string(path)?)?;
        config.exchange.validate()?;
        //Relative dataset paths are resolved against the config file
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let datasets = config
            .datasets
            .into_iter()
            .map(|(name, dir)| {
                let dir = if dir.is_relative() { base.join(dir) } else { dir };
                (name, dir)
            })
            .collect();
        Ok(Self {
            exchange: config.exchange,
            datasets,
        })
    }

    /// Reads every dataset into memory. Fails on the first dataset that does not load.
    pub fn load_datasets(&self) -> Result<HashMap<String, Arc<CandleStore>>> {
        let mut loaded = HashMap::with_capacity(self.datasets.len());
        for (name, dir) in &self.datasets {
            info!("CONFIG: Loading dataset {:?} from {:?}", name, dir);
            loaded.insert(name.clone(), Arc::new(CandleStore::from_dir(dir)?));
        }
        Ok(loaded)
    }
}
