//! Value types shared across the engine

use crate::error::{Result, XBridgeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Longest accepted currency symbol, matching common exchange tickers.
pub const MAX_SYMBOL_LENGTH: usize = 8;

/// A tradeable currency: ticker symbol plus decimal precision.
///
/// Amounts everywhere in the engine are integers in the smallest unit of the
/// asset; `precision` is the number of decimal places of that unit. Assets
/// are immutable and shared by `Arc` across every order quoting them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    symbol: String,
    precision: u8,
}

impl Asset {
    pub fn new(symbol: &str, precision: u8) -> Result<Self> {
        let symbol = symbol.trim();
        if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LENGTH {
            return Err(XBridgeError::UnsupportedCurrency(format!(
                "symbol '{}' is empty or exceeds {} characters",
                symbol, MAX_SYMBOL_LENGTH
            )));
        }
        if precision > 18 {
            return Err(XBridgeError::UnsupportedCurrency(format!(
                "precision {} out of range for '{}'",
                precision, symbol
            )));
        }
        Ok(Self {
            symbol: symbol.to_uppercase(),
            precision,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Number of smallest units in one whole coin.
    pub fn one(&self) -> u64 {
        10u64.pow(self.precision as u32)
    }

    /// Render an integer amount in display units, e.g. `1050000` -> "10.50000"
    /// at precision 5.
    pub fn format_amount(&self, amount: u64) -> String {
        if self.precision == 0 {
            return amount.to_string();
        }
        let one = self.one();
        format!(
            "{}.{:0width$}",
            amount / one,
            amount % one,
            width = self.precision as usize
        )
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// One side of a quoted trade: an asset and an amount in its smallest unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetAmount {
    pub asset: Arc<Asset>,
    pub amount: u64,
}

impl AssetAmount {
    pub fn new(asset: Arc<Asset>, amount: u64) -> Self {
        Self { asset, amount }
    }
}

/// Trade details for a currency pair, from local history or the chain.
///
/// Only one of the transaction id or the error message is meaningful,
/// selected by the variant: `Valid` carries the id, both legs and the
/// timestamp; `Error` carries a human-readable failure reason.
#[derive(Debug, Clone, Default)]
pub enum CurrencyPair {
    #[default]
    Empty,
    Error(String),
    Valid {
        xid: String,
        from: AssetAmount,
        to: AssetAmount,
        timestamp: DateTime<Utc>,
    },
}

impl CurrencyPair {
    pub fn valid(xid: String, from: AssetAmount, to: AssetAmount, timestamp: DateTime<Utc>) -> Self {
        CurrencyPair::Valid {
            xid,
            from,
            to,
            timestamp,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        CurrencyPair::Error(message.into())
    }

    /// The trade identifier, present only on a valid pair.
    pub fn xid(&self) -> Option<&str> {
        match self {
            CurrencyPair::Valid { xid, .. } => Some(xid),
            _ => None,
        }
    }

    /// The failure reason, present only on an error pair.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            CurrencyPair::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Price of the trade as to/from in display units; 0.0 unless valid.
    pub fn price(&self) -> f64 {
        match self {
            CurrencyPair::Valid { from, to, .. } => {
                let from_units = from.amount as f64 / from.asset.one() as f64;
                let to_units = to.amount as f64 / to.asset.one() as f64;
                if from_units == 0.0 {
                    0.0
                } else {
                    to_units / from_units
                }
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_normalizes_symbol() {
        let asset = Asset::new("btc", 8).unwrap();
        assert_eq!(asset.symbol(), "BTC");
        assert_eq!(asset.one(), 100_000_000);
    }

    #[test]
    fn asset_rejects_bad_symbols() {
        assert!(Asset::new("", 8).is_err());
        assert!(Asset::new("TOOLONGSYM", 8).is_err());
        assert!(Asset::new("BTC", 19).is_err());
    }

    #[test]
    fn format_amount_pads_fraction() {
        let asset = Asset::new("LTC", 5).unwrap();
        assert_eq!(asset.format_amount(1_050_000), "10.50000");
        assert_eq!(asset.format_amount(7), "0.00007");
    }

    #[test]
    fn currency_pair_tags() {
        let a = Arc::new(Asset::new("A", 6).unwrap());
        let b = Arc::new(Asset::new("B", 6).unwrap());
        let pair = CurrencyPair::valid(
            "deadbeef".into(),
            AssetAmount::new(a, 10_000_000),
            AssetAmount::new(b, 5_000_000),
            Utc::now(),
        );
        assert_eq!(pair.xid(), Some("deadbeef"));
        assert_eq!(pair.error_message(), None);
        assert!((pair.price() - 0.5).abs() < 1e-9);

        let failed = CurrencyPair::error("tx lookup failed");
        assert_eq!(failed.xid(), None);
        assert_eq!(failed.error_message(), Some("tx lookup failed"));
        assert_eq!(failed.price(), 0.0);

        assert!(matches!(CurrencyPair::default(), CurrencyPair::Empty));
    }
}
