/// Core data types for engine inputs
///
/// These types match the JSON records a feed collaborator delivers once per tick.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Fixed scale between the scraped market-cap-like quantity and the price unit.
pub const PRICE_SCALE: f64 = 1e9;

/// Milliseconds since the Unix epoch, the engine's only notion of time.
pub type TimestampMs = i64;

/// Convert an epoch-millisecond timestamp into a UTC datetime (epoch on overflow).
pub fn to_datetime(ts: TimestampMs) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts).unwrap_or_default()
}

/// Transaction side (Buy or Sell)
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Convert to display string
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "Buy",
            Side::Sell => "Sell",
        }
    }

    /// Check if this is a buy
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }

    /// Check if this is a sell
    pub fn is_sell(&self) -> bool {
        matches!(self, Side::Sell)
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One price/volume observation appended per tick
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Sample {
    pub timestamp: TimestampMs,
    pub price: f64,
    pub volume: f64,
}

impl Sample {
    pub fn new(timestamp: TimestampMs, price: f64, volume: f64) -> Self {
        Self {
            timestamp,
            price,
            volume,
        }
    }

    /// A sample is usable only when both price and volume are present and positive.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.volume.is_finite() && self.price > 0.0 && self.volume > 0.0
    }
}

/// A recent transaction as listed by the trade feed
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Buy or Sell
    #[serde(rename = "type")]
    pub side: Side,
    /// Notional value of the transaction
    pub value: f64,
    /// When the transaction was first seen
    pub detected_time: TimestampMs,
}

/// Holder statistics supplied alongside each sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HolderStats {
    pub holders: f64,
    pub pro_traders: f64,
}

/// Everything a feed hands the engine for one tick
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickInput {
    /// Current price, zero when unavailable
    #[serde(default)]
    pub price: f64,
    /// Current rolling volume, zero when unavailable
    #[serde(default)]
    pub volume: f64,
    /// Independent re-read of the volume used as the hyperspeed reference
    #[serde(default)]
    pub volume_reference: Option<f64>,
    /// Most recent transactions, newest first, at most 50 are considered
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
    #[serde(flatten)]
    pub stats: HolderStats,
    /// Identifier of the asset/page the data belongs to
    #[serde(default)]
    pub context: Option<SmolStr>,
}

impl TickInput {
    /// Maximum number of transactions considered per tick.
    pub const MAX_TRANSACTIONS: usize = 50;

    /// Build an input from a market-cap-like quantity using [`PRICE_SCALE`].
    pub fn from_market_cap(market_cap: f64, volume: f64) -> Self {
        Self {
            price: market_cap / PRICE_SCALE,
            volume,
            ..Default::default()
        }
    }

    pub fn with_transactions(mut self, transactions: Vec<TransactionRecord>) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn with_stats(mut self, holders: f64, pro_traders: f64) -> Self {
        self.stats = HolderStats {
            holders,
            pro_traders,
        };
        self
    }

    pub fn with_volume_reference(mut self, volume_reference: f64) -> Self {
        self.volume_reference = Some(volume_reference);
        self
    }

    /// Transactions considered for this tick (first 50).
    pub fn recent_transactions(&self) -> &[TransactionRecord] {
        let len = self.transactions.len().min(Self::MAX_TRANSACTIONS);
        &self.transactions[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_display() {
        assert_eq!(Side::Buy.to_string(), "Buy");
        assert_eq!(Side::Sell.to_string(), "Sell");
    }

    #[test]
    fn test_side_checks() {
        assert!(Side::Buy.is_buy());
        assert!(!Side::Buy.is_sell());
        assert!(Side::Sell.is_sell());
        assert!(!Side::Sell.is_buy());
    }

    #[test]
    fn test_sample_validity() {
        assert!(Sample::new(1, 0.5, 10.0).is_valid());
        assert!(!Sample::new(1, 0.0, 10.0).is_valid());
        assert!(!Sample::new(1, 0.5, 0.0).is_valid());
        assert!(!Sample::new(1, f64::NAN, 10.0).is_valid());
    }

    #[test]
    fn test_market_cap_scaling() {
        let input = TickInput::from_market_cap(2_500_000.0, 100.0);
        assert!((input.price - 0.0025).abs() < 1e-12);
    }

    #[test]
    fn test_tick_input_json() {
        let json = r#"{
            "price": 0.002,
            "volume": 15000,
            "transactions": [{"type": "Buy", "value": 700, "detectedTime": 1000}],
            "holders": 120,
            "proTraders": 9
        }"#;

        let input: TickInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.transactions.len(), 1);
        assert_eq!(input.transactions[0].side, Side::Buy);
        assert_eq!(input.stats.pro_traders, 9.0);
        assert!(input.volume_reference.is_none());
    }

    #[test]
    fn test_recent_transactions_capped() {
        let tx = TransactionRecord {
            side: Side::Sell,
            value: 1.0,
            detected_time: 0,
        };
        let input = TickInput::default().with_transactions(vec![tx; 80]);
        assert_eq!(input.recent_transactions().len(), TickInput::MAX_TRANSACTIONS);
    }
}
