//! Pull-based feeds and the serialized tick loop that drives the engine.
//!
//! The [`Scheduler`] asks its [`Feed`] for the current readings once per tick and
//! runs [`AccumulationEngine::tick`] to completion before the next tick starts.
//! When a feed is slower than the tick interval the missed ticks are skipped,
//! never queued, so two ticks can not overlap.

use crate::{
    engine::{AccumulationEngine, TickReport},
    error::EngineError,
    store::KeyValueStore,
    types::{HolderStats, PRICE_SCALE, TickInput, TimestampMs, TransactionRecord},
};
use async_trait::async_trait;
use serde::Deserialize;
use smol_str::SmolStr;
use std::{sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, Lines},
    sync::mpsc,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

/// What a feed produced when asked for the current readings
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Readings for one tick. `time` falls back to the wall clock when absent.
    Tick {
        time: Option<TimestampMs>,
        input: TickInput,
    },
    /// The source had nothing usable this tick.
    Unavailable,
    /// The asset/page being observed changed.
    ContextChanged(SmolStr),
    /// No more data will arrive.
    Closed,
}

/// Source of per-tick readings, polled by the [`Scheduler`]
#[async_trait]
pub trait Feed: Send {
    async fn next(&mut self) -> Result<FeedEvent, EngineError>;
}

/// One line of a JSON-lines feed
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    #[serde(default)]
    pub time: Option<TimestampMs>,
    #[serde(default)]
    pub price: Option<f64>,
    /// Market-cap-like quantity, scaled by [`PRICE_SCALE`] when `price` is absent
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub volume_reference: Option<f64>,
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
    #[serde(flatten)]
    pub stats: HolderStats,
    #[serde(default)]
    pub context: Option<SmolStr>,
}

impl FeedRecord {
    pub fn price(&self) -> Option<f64> {
        self.price
            .or_else(|| self.market_cap.map(|cap| cap / PRICE_SCALE))
    }
}

impl From<FeedRecord> for FeedEvent {
    fn from(record: FeedRecord) -> Self {
        let Some(price) = record.price() else {
            return match record.context {
                Some(context) => FeedEvent::ContextChanged(context),
                None => FeedEvent::Unavailable,
            };
        };

        FeedEvent::Tick {
            time: record.time,
            input: TickInput {
                price,
                volume: record.volume,
                volume_reference: record.volume_reference,
                transactions: record.transactions,
                stats: record.stats,
                context: record.context,
            },
        }
    }
}

/// [`Feed`] reading one [`FeedRecord`] per line
#[derive(Debug)]
pub struct JsonLinesFeed<R> {
    lines: Lines<R>,
    line: usize,
}

impl<R> JsonLinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
        }
    }
}

#[async_trait]
impl<R> Feed for JsonLinesFeed<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next(&mut self) -> Result<FeedEvent, EngineError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(FeedEvent::Closed);
            };
            self.line += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            return serde_json::from_str::<FeedRecord>(line)
                .map(FeedEvent::from)
                .map_err(|error| EngineError::Feed {
                    line: self.line,
                    reason: error.to_string(),
                });
        }
    }
}

/// How ticks are spaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// One tick per interval, missed ticks skipped
    Interval(Duration),
    /// Process events back to back (replays)
    Unpaced,
}

/// Milliseconds since the Unix epoch from the wall clock.
pub fn wall_clock_ms() -> TimestampMs {
    chrono::Utc::now().timestamp_millis()
}

/// Owns the engine and serializes ticks from a single feed
pub struct Scheduler<F> {
    engine: AccumulationEngine,
    feed: F,
    store: Arc<dyn KeyValueStore>,
    pacing: Pacing,
    reports: Option<mpsc::UnboundedSender<TickReport>>,
}

impl<F> std::fmt::Debug for Scheduler<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("engine", &self.engine)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl<F> Scheduler<F>
where
    F: Feed,
{
    /// Pace ticks at the engine config's interval for the current operating mode.
    pub fn new(engine: AccumulationEngine, feed: F, store: Arc<dyn KeyValueStore>) -> Self {
        let pacing = Pacing::Interval(engine.config().tick_interval());
        Self {
            engine,
            feed,
            store,
            pacing,
            reports: None,
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Forward every [`TickReport`] to `tx`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<TickReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    pub fn engine(&self) -> &AccumulationEngine {
        &self.engine
    }

    /// Run until the feed closes or fails terminally, returning the engine.
    pub async fn run(mut self) -> Result<AccumulationEngine, EngineError> {
        let mut ticker = match self.pacing {
            Pacing::Interval(period) => {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                Some(ticker)
            }
            Pacing::Unpaced => None,
        };
        info!(pacing = ?self.pacing, "scheduler started");

        loop {
            if let Some(ticker) = ticker.as_mut() {
                ticker.tick().await;
            }

            match self.feed.next().await {
                Ok(FeedEvent::Tick { time, input }) => {
                    let now = time.unwrap_or_else(wall_clock_ms);
                    if let Some(report) = self.engine.tick(now, &input) {
                        self.publish(report);
                    }
                    self.flush();
                }
                Ok(FeedEvent::Unavailable) => {
                    debug!("feed unavailable, skipping tick");
                }
                Ok(FeedEvent::ContextChanged(context)) => {
                    self.engine.change_context(context);
                }
                Ok(FeedEvent::Closed) => {
                    info!("feed closed");
                    break;
                }
                Err(error) if error.is_terminal() => {
                    self.flush();
                    return Err(error);
                }
                Err(error) => {
                    warn!(%error, "dropping malformed feed record");
                }
            }
        }

        self.flush();
        Ok(self.engine)
    }

    fn publish(&mut self, report: TickReport) {
        if let Some(tx) = &self.reports {
            if tx.send(report).is_err() {
                debug!("report receiver dropped");
                self.reports = None;
            }
        }
    }

    fn flush(&mut self) {
        if let Err(error) = self.engine.persist(self.store.as_ref()) {
            warn!(%error, "failed to persist learning state");
        }
    }
}
