//! # Pulse Engine
//! Accumulation and breakout detection over a live price/volume/transaction stream.
//!
//! Each tick the engine:
//! * appends the sample to bounded sliding windows (skipping ticks with missing data)
//! * recomputes RSI, VWAP, OBV, regression slope, accelerations and explosion odds
//! * runs every registered chart, candlestick and micro-structure [`patterns`] detector
//! * reduces everything to a closed [`ConditionSet`] and a weighted score in `[0, 100]`
//! * drives the four alert kinds and the optional trade lifecycle
//! * grades earlier signals against the prices that followed and adapts condition weights
//!
//! [`AccumulationEngine`] owns all of this state and is driven by a host loop, usually
//! the [`Scheduler`], through [`AccumulationEngine::tick`].

/// Engine input records: samples, transactions and per-tick readings.
pub mod types;

/// [`DetectorConfig`] thresholds with saved-record merging.
pub mod config;

/// Errors raised at the persistence, export and feed edges.
pub mod error;

/// Bounded FIFO sample windows.
pub mod buffer;

/// Technical indicators and explosion odds.
pub mod indicators;

/// Pattern detectors and their registry.
pub mod patterns;

/// Named conditions, flow statistics and consolidation.
pub mod conditions;

/// Weighted composite score and false-signal dampening.
pub mod scoring;

/// Deferred signal evaluation and weight adaptation.
pub mod learner;

/// Alert kinds, decay and cooldowns.
pub mod alerts;

/// Trade-lifecycle hysteresis.
pub mod lifecycle;

/// 5s / 15s / 1m series and convergence.
pub mod timeframe;

/// Key-value persistence.
pub mod store;

/// Signal history export.
pub mod export;

/// The per-tick pipeline.
pub mod engine;

/// Feeds and the serialized tick loop.
pub mod scheduler;

pub use alerts::{AlertEvent, AlertKind, DetectorStatus};
pub use conditions::{Condition, ConditionSet};
pub use config::DetectorConfig;
pub use engine::{AccumulationEngine, EngineStats, TickReport};
pub use error::{EngineError, StoreError};
pub use export::ExportFormat;
pub use learner::{Signal, SignalKind, WeightTable};
pub use scheduler::{Feed, FeedEvent, JsonLinesFeed, Pacing, Scheduler};
pub use store::{FileStore, KeyValueStore, MemoryStore, PersistedState};
pub use types::{TickInput, TimestampMs, TransactionRecord};
