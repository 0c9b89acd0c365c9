//! Weighted composite score with false-signal dampening.

use crate::{
    conditions::ConditionSet,
    config::DetectorConfig,
    indicators::{tail, volatility},
    learner::WeightTable,
    types::TimestampMs,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Multiplier applied when the false-signal filter trips.
pub const FALSE_SIGNAL_DAMPING: f64 = 0.7;

/// Window in which false-signal records reduce the explosion odds.
pub const FALSE_SIGNAL_LOOKBACK_MS: TimestampMs = 60_000;

/// Samples used for the sideways-market check.
const SIDEWAYS_WINDOW: usize = 10;

/// Score for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    /// Weighted sum before dampening and clamping
    pub raw: f64,
    pub dampened: bool,
    /// Final score in `[0, 100]`
    pub value: f64,
}

/// Σ base score × weight over the active conditions.
pub fn weighted_sum(conditions: &ConditionSet, weights: &WeightTable) -> f64 {
    conditions
        .active()
        .map(|c| c.base_score() * weights.get(c))
        .sum()
}

/// Inputs the false-signal filter inspects
#[derive(Debug, Clone, Copy)]
pub struct FalseSignalCheck<'a> {
    pub prices: &'a [f64],
    pub rsi: f64,
    /// An explosion signal fired within 3× the cooldown period
    pub recent_explosion: bool,
}

impl FalseSignalCheck<'_> {
    /// Sideways market, overbought RSI, or a recent explosion.
    pub fn tripped(&self, config: &DetectorConfig) -> bool {
        let sideways = volatility(tail(self.prices, SIDEWAYS_WINDOW))
            < config.volatility_threshold * 0.7;
        sideways || self.rsi > config.rsi_overbought_threshold || self.recent_explosion
    }
}

/// Bounded record of ticks the false-signal filter tripped on
#[derive(Debug, Clone)]
pub struct FalseSignalLog {
    capacity: usize,
    times: VecDeque<TimestampMs>,
}

impl FalseSignalLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            times: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, now: TimestampMs) {
        self.times.push_back(now);
        while self.times.len() > self.capacity {
            self.times.pop_front();
        }
    }

    /// Records from the last minute.
    pub fn recent(&self, now: TimestampMs) -> usize {
        self.times
            .iter()
            .filter(|t| **t > now - FALSE_SIGNAL_LOOKBACK_MS)
            .count()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        while self.times.len() > self.capacity {
            self.times.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.times.clear();
    }
}

/// Converts weighted conditions into the bounded composite score
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    false_signals: FalseSignalLog,
}

impl ScoringEngine {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            false_signals: FalseSignalLog::new(config.max_false_signal_history),
        }
    }

    pub fn false_signals(&self) -> &FalseSignalLog {
        &self.false_signals
    }

    pub fn recent_false_signals(&self, now: TimestampMs) -> usize {
        self.false_signals.recent(now)
    }

    /// Resize the false-signal log after a config change.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.false_signals.set_capacity(capacity);
    }

    /// Score the condition set; a tripped filter scales by 0.7 and is logged.
    pub fn score(
        &mut self,
        now: TimestampMs,
        conditions: &ConditionSet,
        weights: &WeightTable,
        false_signal: bool,
    ) -> Score {
        let raw = weighted_sum(conditions, weights);
        let mut value = raw;

        if false_signal {
            value *= FALSE_SIGNAL_DAMPING;
            self.false_signals.push(now);
            debug!(raw, dampened = value, "false-signal filter tripped");
        }

        Score {
            raw,
            dampened: false_signal,
            value: value.clamp(0.0, 100.0),
        }
    }

    pub fn reset(&mut self) {
        self.false_signals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::Condition;

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    #[test]
    fn test_weighted_sum() {
        let mut weights = WeightTable::default();
        weights.set(Condition::NetWhaleFlow, 1.5);
        let set = [Condition::AccumulationPattern, Condition::NetWhaleFlow]
            .into_iter()
            .collect::<ConditionSet>();

        assert!((weighted_sum(&set, &weights) - (25.0 + 30.0)).abs() < 1e-12);
    }

    #[test]
    fn test_score_clamped_to_hundred() {
        let mut engine = ScoringEngine::new(&config());
        let mut weights = WeightTable::default();
        let all = Condition::ALL.into_iter().collect::<ConditionSet>();
        for condition in Condition::ALL {
            weights.set(condition, 2.0);
        }

        let score = engine.score(0, &all, &weights, false);
        assert!(score.raw > 100.0);
        assert_eq!(score.value, 100.0);

        let empty = engine.score(0, &ConditionSet::default(), &weights, true);
        assert_eq!(empty.value, 0.0);
    }

    #[test]
    fn test_dampening_records_false_signal() {
        let mut engine = ScoringEngine::new(&config());
        let set = [Condition::AccumulationPattern, Condition::NetWhaleFlow]
            .into_iter()
            .collect::<ConditionSet>();

        let score = engine.score(1_000, &set, &WeightTable::default(), true);
        assert!(score.dampened);
        assert!((score.value - 45.0 * 0.7).abs() < 1e-9);
        assert_eq!(engine.recent_false_signals(1_000), 1);
        assert_eq!(engine.recent_false_signals(61_000), 0);
    }

    #[test]
    fn test_false_signal_log_capacity() {
        let mut log = FalseSignalLog::new(3);
        for t in 0..10 {
            log.push(t);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.recent(10), 3);
    }

    #[test]
    fn test_false_signal_filter() {
        struct TestCase {
            prices: Vec<f64>,
            rsi: f64,
            recent_explosion: bool,
            expected: bool,
        }

        let trending = (0..10).map(|i| 1.0 + 0.05 * i as f64).collect::<Vec<_>>();
        let tests = vec![
            TestCase {
                // TC0: sideways market
                prices: vec![1.0; 10],
                rsi: 50.0,
                recent_explosion: false,
                expected: true,
            },
            TestCase {
                // TC1: trending and healthy
                prices: trending.clone(),
                rsi: 60.0,
                recent_explosion: false,
                expected: false,
            },
            TestCase {
                // TC2: overbought
                prices: trending.clone(),
                rsi: 75.0,
                recent_explosion: false,
                expected: true,
            },
            TestCase {
                // TC3: explosion fired recently
                prices: trending,
                rsi: 60.0,
                recent_explosion: true,
                expected: true,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let check = FalseSignalCheck {
                prices: &test.prices,
                rsi: test.rsi,
                recent_explosion: test.recent_explosion,
            };
            assert_eq!(check.tripped(&config()), test.expected, "TC{} failed", index);
        }
    }
}
