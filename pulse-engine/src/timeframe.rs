//! Coarser 5s / 15s / 1m series and their bullish convergence.

use crate::{indicators::mean, types::TimestampMs};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Points a series needs before it leaves `Neutral`.
pub const MIN_CLASSIFICATION_POINTS: usize = 5;

/// Latest volume must exceed this multiple of the series average to count as bullish.
const VOLUME_CONFIRMATION: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Timeframe {
    #[serde(rename = "5s")]
    FiveSeconds,
    #[serde(rename = "15s")]
    FifteenSeconds,
    #[serde(rename = "1m")]
    OneMinute,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [
        Timeframe::FiveSeconds,
        Timeframe::FifteenSeconds,
        Timeframe::OneMinute,
    ];

    /// Minimum elapsed time between accepted samples.
    pub fn cadence_ms(&self) -> TimestampMs {
        match self {
            Timeframe::FiveSeconds => 5_000,
            Timeframe::FifteenSeconds => 15_000,
            Timeframe::OneMinute => 60_000,
        }
    }

    /// Maximum series length.
    pub fn capacity(&self) -> usize {
        match self {
            Timeframe::FiveSeconds => 20,
            Timeframe::FifteenSeconds => 15,
            Timeframe::OneMinute => 10,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::FiveSeconds => "5s",
            Timeframe::FifteenSeconds => "15s",
            Timeframe::OneMinute => "1m",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendSignal {
    #[default]
    Neutral,
    Bullish,
    Bearish,
}

impl TrendSignal {
    pub fn label(&self) -> &'static str {
        match self {
            TrendSignal::Neutral => "NEUTRAL",
            TrendSignal::Bullish => "BULLISH",
            TrendSignal::Bearish => "BEARISH",
        }
    }
}

/// One bounded coarser-grained series
#[derive(Debug, Clone)]
pub struct TimeframeSeries {
    timeframe: Timeframe,
    prices: VecDeque<f64>,
    volumes: VecDeque<f64>,
    signals: VecDeque<TrendSignal>,
    last_update: Option<TimestampMs>,
}

impl TimeframeSeries {
    pub fn new(timeframe: Timeframe) -> Self {
        let capacity = timeframe.capacity();
        Self {
            timeframe,
            prices: VecDeque::with_capacity(capacity + 1),
            volumes: VecDeque::with_capacity(capacity + 1),
            signals: VecDeque::with_capacity(capacity + 1),
            last_update: None,
        }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Accept the sample if the cadence has elapsed. Returns whether it was taken.
    pub fn ingest(&mut self, now: TimestampMs, price: f64, volume: f64) -> bool {
        if let Some(last) = self.last_update {
            if now - last < self.timeframe.cadence_ms() {
                return false;
            }
        }

        self.prices.push_back(price);
        self.volumes.push_back(volume);
        self.last_update = Some(now);

        let signal = self.classify();
        self.signals.push_back(signal);

        if self.prices.len() > self.timeframe.capacity() {
            self.prices.pop_front();
            self.volumes.pop_front();
            self.signals.pop_front();
        }
        true
    }

    /// Bullish iff the net change is positive and the latest volume is over 1.5× average.
    pub fn classify(&self) -> TrendSignal {
        if self.prices.len() < MIN_CLASSIFICATION_POINTS {
            return TrendSignal::Neutral;
        }
        let (Some(first), Some(last), Some(last_volume)) =
            (self.prices.front(), self.prices.back(), self.volumes.back())
        else {
            return TrendSignal::Neutral;
        };

        let volumes = self.volumes.iter().copied().collect::<Vec<_>>();
        let rising = last - first > 0.0;
        let volume_confirmed = *last_volume > mean(&volumes) * VOLUME_CONFIRMATION;

        if rising && volume_confirmed {
            TrendSignal::Bullish
        } else {
            TrendSignal::Bearish
        }
    }

    /// Classification recorded with the most recent accepted sample.
    pub fn latest_signal(&self) -> TrendSignal {
        self.signals.back().copied().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.prices.clear();
        self.volumes.clear();
        self.signals.clear();
        self.last_update = None;
    }
}

/// Snapshot of the three series for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Convergence {
    pub five_seconds: TrendSignal,
    pub fifteen_seconds: TrendSignal,
    pub one_minute: TrendSignal,
    /// Fraction of series whose latest signal is bullish
    pub ratio: f64,
    pub converged: bool,
}

/// Owns the three [`TimeframeSeries`]
#[derive(Debug, Clone)]
pub struct MultiTimeframeAggregator {
    series: [TimeframeSeries; 3],
}

impl Default for MultiTimeframeAggregator {
    fn default() -> Self {
        Self {
            series: Timeframe::ALL.map(TimeframeSeries::new),
        }
    }
}

impl MultiTimeframeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series(&self, timeframe: Timeframe) -> &TimeframeSeries {
        &self.series[timeframe as usize]
    }

    /// Offer a sample to every series; each applies its own cadence.
    pub fn ingest(&mut self, now: TimestampMs, price: f64, volume: f64) {
        for series in &mut self.series {
            series.ingest(now, price, volume);
        }
    }

    pub fn convergence(&self, threshold: f64) -> Convergence {
        let signals = self.series.each_ref().map(|s| s.latest_signal());
        let bullish = signals
            .iter()
            .filter(|s| **s == TrendSignal::Bullish)
            .count();
        let ratio = bullish as f64 / signals.len() as f64;

        Convergence {
            five_seconds: signals[0],
            fifteen_seconds: signals[1],
            one_minute: signals[2],
            ratio,
            converged: ratio >= threshold,
        }
    }

    pub fn clear(&mut self) {
        self.series.iter_mut().for_each(TimeframeSeries::clear);
    }
}
