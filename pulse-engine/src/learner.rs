//! Deferred outcome evaluation and per-condition weight adaptation.
//!
//! Every alert emission records a [`Signal`] holding a snapshot of the active
//! conditions. Once its evaluation window has elapsed the signal is graded
//! against the prices that followed it and the result nudges the weight of
//! every condition that was active.

use crate::{
    buffer::SampleBuffer,
    conditions::{Condition, ConditionSet},
    config::DetectorConfig,
    types::TimestampMs,
};
use derive_more::Display;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const LEARNING_RATE: f64 = 0.05;
pub const MIN_WEIGHT: f64 = 0.1;
pub const MAX_WEIGHT: f64 = 2.0;
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Signals older than 24h are discarded regardless of resolution.
pub const SIGNAL_RETENTION_MS: TimestampMs = 86_400_000;

/// Samples a condition needs before it can rank as the best performer.
pub const MIN_CONDITION_SAMPLES: u32 = 5;

/// Learned multiplier per [`Condition`], always within `[0.1, 2.0]`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(from = "BTreeMap<SmolStr, f64>", into = "BTreeMap<Condition, f64>")]
pub struct WeightTable([f64; Condition::COUNT]);

impl Default for WeightTable {
    fn default() -> Self {
        Self([DEFAULT_WEIGHT; Condition::COUNT])
    }
}

impl WeightTable {
    pub fn get(&self, condition: Condition) -> f64 {
        self.0[condition.index()]
    }

    /// Store a weight, clamped to the allowed range.
    pub fn set(&mut self, condition: Condition, weight: f64) {
        let weight = if weight.is_finite() {
            weight
        } else {
            DEFAULT_WEIGHT
        };
        self.0[condition.index()] = weight.clamp(MIN_WEIGHT, MAX_WEIGHT);
    }

    /// `weight += rate × reward × active` for every condition.
    pub fn update(&mut self, success: bool, conditions: &ConditionSet) {
        let reward = if success { 1.0 } else { -1.0 };
        for condition in conditions.active() {
            self.set(condition, self.get(condition) + LEARNING_RATE * reward);
        }
    }
}

impl From<BTreeMap<SmolStr, f64>> for WeightTable {
    fn from(map: BTreeMap<SmolStr, f64>) -> Self {
        let mut table = Self::default();
        for (name, weight) in map {
            match Condition::from_name(&name) {
                Some(condition) => table.set(condition, weight),
                None => debug!(%name, "ignoring weight for unknown condition"),
            }
        }
        table
    }
}

impl From<WeightTable> for BTreeMap<Condition, f64> {
    fn from(table: WeightTable) -> Self {
        Condition::ALL
            .into_iter()
            .map(|c| (c, table.get(c)))
            .collect()
    }
}

/// Alert kind that produced a [`Signal`]
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    #[display("accumulation")]
    Accumulation,
    #[display("explosion")]
    Explosion,
    #[display("hyperspeed_explosion")]
    HyperspeedExplosion,
    #[display("mega_accumulation")]
    MegaAccumulation,
    #[display("instant_explosion")]
    InstantExplosion,
}

/// A recorded alert awaiting (or holding) its outcome
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub time: TimestampMs,
    pub price: f64,
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub confidence: f64,
    pub active_conditions: ConditionSet,
    /// `None` while pending, fixed once resolved
    pub success: Option<bool>,
    #[serde(default)]
    pub evaluation_deadline: TimestampMs,
    /// Moment an instant explosion is predicted to land
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_time: Option<TimestampMs>,
}

impl Signal {
    pub fn new(
        time: TimestampMs,
        price: f64,
        kind: SignalKind,
        confidence: f64,
        active_conditions: ConditionSet,
        evaluation_period: TimestampMs,
    ) -> Self {
        Self {
            time,
            price,
            kind,
            confidence,
            active_conditions,
            success: None,
            evaluation_deadline: time + evaluation_period,
            prediction_time: None,
        }
    }

    pub fn with_prediction_time(mut self, prediction_time: TimestampMs) -> Self {
        self.prediction_time = Some(prediction_time);
        self
    }

    pub fn is_pending(&self) -> bool {
        self.success.is_none()
    }

    /// Grade the signal, `None` while `now` is before the deadline.
    ///
    /// Success means the highest price strictly after the signal and at or before
    /// the deadline reached `price × (1 + threshold)`. No such samples is a failure.
    pub fn evaluate(
        &self,
        now: TimestampMs,
        buffer: &SampleBuffer,
        success_threshold: f64,
    ) -> Option<bool> {
        if now < self.evaluation_deadline {
            return None;
        }
        let outcome = buffer
            .max_price_between(self.time, self.evaluation_deadline)
            .is_some_and(|max| max >= self.price * (1.0 + success_threshold));
        Some(outcome)
    }
}

/// Resolution tally for one condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConditionStats {
    pub total: u32,
    pub success: u32,
}

impl ConditionStats {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.success as f64 / self.total as f64
        }
    }
}

/// Per-condition outcome statistics built from resolved signals
#[derive(Debug, Clone, Default)]
pub struct ConditionPerformance {
    stats: FnvHashMap<Condition, ConditionStats>,
}

impl ConditionPerformance {
    pub fn record(&mut self, success: bool, conditions: &ConditionSet) {
        for condition in conditions.active() {
            let entry = self.stats.entry(condition).or_default();
            entry.total += 1;
            if success {
                entry.success += 1;
            }
        }
    }

    pub fn get(&self, condition: Condition) -> ConditionStats {
        self.stats.get(&condition).copied().unwrap_or_default()
    }

    /// Most accurate condition with at least [`MIN_CONDITION_SAMPLES`] resolutions.
    pub fn best(&self) -> Option<(Condition, f64)> {
        Condition::ALL
            .into_iter()
            .filter_map(|c| {
                let stats = self.get(c);
                (stats.total >= MIN_CONDITION_SAMPLES).then(|| (c, stats.accuracy()))
            })
            .fold(None, |best: Option<(Condition, f64)>, candidate| match best {
                Some((_, accuracy)) if accuracy >= candidate.1 => best,
                _ => Some(candidate),
            })
            .filter(|(_, accuracy)| *accuracy > 0.0)
    }
}

/// Owns the weight table, the signal history and its pending evaluations
#[derive(Debug, Clone, Default)]
pub struct AdaptiveWeightLearner {
    weights: WeightTable,
    history: Vec<Signal>,
    performance: ConditionPerformance,
    weights_dirty: bool,
    history_dirty: bool,
}

impl AdaptiveWeightLearner {
    pub fn new(weights: WeightTable, history: Vec<Signal>) -> Self {
        Self {
            weights,
            history,
            ..Default::default()
        }
    }

    /// Restore persisted state, filling in deadlines missing from older records.
    pub fn restore(weights: WeightTable, mut history: Vec<Signal>, config: &DetectorConfig) -> Self {
        for signal in history
            .iter_mut()
            .filter(|s| s.evaluation_deadline <= s.time)
        {
            signal.evaluation_deadline = signal.time + config.ml_evaluation_period;
        }
        Self::new(weights, history)
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn history(&self) -> &[Signal] {
        &self.history
    }

    pub fn performance(&self) -> &ConditionPerformance {
        &self.performance
    }

    pub fn pending(&self) -> impl Iterator<Item = &Signal> {
        self.history.iter().filter(|s| s.is_pending())
    }

    /// Record a newly emitted signal.
    pub fn record(&mut self, signal: Signal) {
        debug!(kind = %signal.kind, confidence = signal.confidence, "signal recorded");
        self.history.push(signal);
        self.history_dirty = true;
    }

    /// Resolve every pending signal whose window has elapsed, update weights,
    /// and drop signals older than 24h. Returns the number resolved.
    pub fn resolve(
        &mut self,
        now: TimestampMs,
        buffer: &SampleBuffer,
        config: &DetectorConfig,
    ) -> usize {
        let mut resolved = 0;

        for signal in self.history.iter_mut().filter(|s| s.is_pending()) {
            let Some(success) = signal.evaluate(now, buffer, config.ml_success_threshold) else {
                continue;
            };
            signal.success = Some(success);
            self.weights.update(success, &signal.active_conditions);
            self.performance.record(success, &signal.active_conditions);
            resolved += 1;

            info!(
                kind = %signal.kind,
                success,
                price = signal.price,
                active = signal.active_conditions.active_count(),
                "signal resolved"
            );
        }

        let before = self.history.len();
        self.history.retain(|s| now - s.time < SIGNAL_RETENTION_MS);

        if resolved > 0 {
            self.weights_dirty = true;
        }
        if resolved > 0 || self.history.len() != before {
            self.history_dirty = true;
        }

        resolved
    }

    /// A signal of `kind` was emitted less than `within` ms ago.
    pub fn fired_within(&self, now: TimestampMs, kind: SignalKind, within: TimestampMs) -> bool {
        self.history
            .iter()
            .rev()
            .any(|s| s.kind == kind && now - s.time < within)
    }

    /// Percentage of retained signals that resolved successfully.
    pub fn success_rate(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let successful = self
            .history
            .iter()
            .filter(|s| s.success == Some(true))
            .count();
        Some(successful as f64 / self.history.len() as f64 * 100.0)
    }

    /// Take and clear the `(weights, history)` dirty flags.
    pub fn take_dirty(&mut self) -> (bool, bool) {
        let dirty = (self.weights_dirty, self.history_dirty);
        self.weights_dirty = false;
        self.history_dirty = false;
        dirty
    }

    /// Re-flag state whose write failed so the next flush retries it.
    pub fn mark_dirty(&mut self, weights: bool, history: bool) {
        self.weights_dirty |= weights;
        self.history_dirty |= history;
    }
}
