use derive_more::{Display, Error};

/// Every failure the simulator reports. Rejected orders are not errors: they leave the balance
/// untouched and are reported through [OrderOutcome](crate::exchange::orders::OrderOutcome).
#[derive(Debug, Display, Error)]
pub enum ExchangeError {
    #[display("end of data: the session is already at its last step")]
    EndOfData,
    #[display("division by zero: capital is zero so the portfolio is undefined")]
    DivisionByZero,
    #[display("retention ratio did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },
    #[display("unknown asset: {asset}")]
    UnknownAsset { asset: String },
    #[display("expected currencies {expected:?}, found {found:?}")]
    UnexpectedCurrencies {
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[display("invalid portfolio: {reason}")]
    InvalidPortfolio { reason: String },
    #[display("invalid balance for {asset}: {amount}")]
    InvalidBalance { asset: String, amount: f64 },
    #[display("fee must be within [0, 1), got {fee}")]
    InvalidFee { fee: f64 },
    #[display("minimum order size must be finite and non-negative, got {min_order_size}")]
    InvalidMinOrderSize { min_order_size: f64 },
    #[display("no candles found in {location}")]
    EmptyCandles { location: String },
    #[display("candles for {currency} do not line up: {reason}")]
    MismatchedCandles { currency: String, reason: String },
    #[display("invalid close price {close} for {currency} at {date}")]
    InvalidPrice {
        currency: String,
        date: i64,
        close: f64,
    },
    #[display("io error: {source}")]
    Io { source: std::io::Error },
    #[display("csv error: {source}")]
    Csv { source: csv::Error },
    #[display("json error: {source}")]
    Json { source: serde_json::Error },
}

impl From<std::io::Error> for ExchangeError {
    fn from(source: std::io::Error) -> Self {
        ExchangeError::Io { source }
    }
}

impl From<csv::Error> for ExchangeError {
    fn from(source: csv::Error) -> Self {
        ExchangeError::Csv { source }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(source: serde_json::Error) -> Self {
        ExchangeError::Json { source }
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::ExchangeError;

    #[test]
    fn test_that_errors_render_their_fields() {
        let err = ExchangeError::UnknownAsset {
            asset: "XYZ".to_string(),
        };
        assert_eq!(err.to_string(), "unknown asset: XYZ");

        let err = ExchangeError::NonConvergence { iterations: 10_000 };
        assert!(err.to_string().contains("10000"));
    }

    #[test]
    fn test_that_io_errors_keep_their_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ExchangeError = io.into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
