//! Named boolean conditions shared by scoring and weight learning.
//!
//! [`Condition`] is the closed vocabulary. Flow statistics, indicators, pattern flags
//! and timeframe convergence are reduced to a [`ConditionSet`] once per tick.

use crate::{
    config::DetectorConfig,
    indicators::{IndicatorSet, VwapAnalysis, mean, tail, volatility},
    patterns::{Pattern, PatternFlags},
    types::{TimestampMs, TransactionRecord},
};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::{BTreeMap, VecDeque};
use tracing::debug;

/// Pro-trader counts older than this are dropped from the change calculation.
pub const PRO_TRADER_WINDOW_MS: TimestampMs = 15_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    ProTraderBuyVolume,
    NetWhaleFlow,
    ObvSpike,
    WhaleCluster,
    AccumulationPattern,
    VolumeAcceleration,
    Consolidation,
    PatternMatch,
    ShockwaveEngine,
    ExplosionOdds,
    CandlePattern,
    VwapConfirmation,
    TimeframeConvergence,
    ScalpingMode,
    InstantBuyPressure,
    VolumeSpike,
    MicroRange,
    VduSpike,
    FlashAbsorption,
    TrapRun,
    ShakeoutBar,
    SupplyAbsorption,
    VolumeStaircase,
    DarvasBox,
    BoxBreakout,
    HiddenDivergence,
    ObvUptrend,
    BuyWallStack,
    VwapRetest,
}

impl Condition {
    pub const COUNT: usize = 29;

    pub const ALL: [Condition; Self::COUNT] = [
        Condition::ProTraderBuyVolume,
        Condition::NetWhaleFlow,
        Condition::ObvSpike,
        Condition::WhaleCluster,
        Condition::AccumulationPattern,
        Condition::VolumeAcceleration,
        Condition::Consolidation,
        Condition::PatternMatch,
        Condition::ShockwaveEngine,
        Condition::ExplosionOdds,
        Condition::CandlePattern,
        Condition::VwapConfirmation,
        Condition::TimeframeConvergence,
        Condition::ScalpingMode,
        Condition::InstantBuyPressure,
        Condition::VolumeSpike,
        Condition::MicroRange,
        Condition::VduSpike,
        Condition::FlashAbsorption,
        Condition::TrapRun,
        Condition::ShakeoutBar,
        Condition::SupplyAbsorption,
        Condition::VolumeStaircase,
        Condition::DarvasBox,
        Condition::BoxBreakout,
        Condition::HiddenDivergence,
        Condition::ObvUptrend,
        Condition::BuyWallStack,
        Condition::VwapRetest,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Persisted identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::ProTraderBuyVolume => "pro_trader_buy_volume",
            Condition::NetWhaleFlow => "net_whale_flow",
            Condition::ObvSpike => "obv_spike",
            Condition::WhaleCluster => "whale_cluster",
            Condition::AccumulationPattern => "accumulation_pattern",
            Condition::VolumeAcceleration => "volume_acceleration",
            Condition::Consolidation => "consolidation",
            Condition::PatternMatch => "pattern_match",
            Condition::ShockwaveEngine => "shockwave_engine",
            Condition::ExplosionOdds => "explosion_odds",
            Condition::CandlePattern => "candle_pattern",
            Condition::VwapConfirmation => "vwap_confirmation",
            Condition::TimeframeConvergence => "timeframe_convergence",
            Condition::ScalpingMode => "scalping_mode",
            Condition::InstantBuyPressure => "instant_buy_pressure",
            Condition::VolumeSpike => "volume_spike",
            Condition::MicroRange => "micro_range",
            Condition::VduSpike => "vdu_spike",
            Condition::FlashAbsorption => "flash_absorption",
            Condition::TrapRun => "trap_run",
            Condition::ShakeoutBar => "shakeout_bar",
            Condition::SupplyAbsorption => "supply_absorption",
            Condition::VolumeStaircase => "volume_staircase",
            Condition::DarvasBox => "darvas_box",
            Condition::BoxBreakout => "box_breakout",
            Condition::HiddenDivergence => "hidden_divergence",
            Condition::ObvUptrend => "obv_uptrend",
            Condition::BuyWallStack => "buy_wall_stack",
            Condition::VwapRetest => "vwap_retest",
        }
    }

    /// Look up a condition by its persisted identifier.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    /// Points contributed when active at weight 1.0.
    pub fn base_score(&self) -> f64 {
        match self {
            Condition::AccumulationPattern => 25.0,
            Condition::NetWhaleFlow => 20.0,
            Condition::WhaleCluster | Condition::PatternMatch | Condition::ProTraderBuyVolume => {
                15.0
            }
            Condition::ExplosionOdds => 12.0,
            Condition::VolumeAcceleration
            | Condition::ShockwaveEngine
            | Condition::VwapConfirmation
            | Condition::TimeframeConvergence
            | Condition::ObvSpike => 10.0,
            Condition::Consolidation | Condition::CandlePattern => 8.0,
            _ => 5.0,
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Boolean value for every [`Condition`]
///
/// Serialises as an `{name: bool}` map. Unknown names in stored records are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(from = "BTreeMap<SmolStr, bool>", into = "BTreeMap<Condition, bool>")]
pub struct ConditionSet([bool; Condition::COUNT]);

impl ConditionSet {
    pub fn is_active(&self, condition: Condition) -> bool {
        self.0[condition.index()]
    }

    pub fn set(&mut self, condition: Condition, active: bool) {
        self.0[condition.index()] = active;
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.set(condition, true);
        self
    }

    pub fn active(&self) -> impl Iterator<Item = Condition> + '_ {
        Condition::ALL.into_iter().filter(|c| self.is_active(*c))
    }

    pub fn active_count(&self) -> usize {
        self.0.iter().filter(|active| **active).count()
    }
}

impl FromIterator<Condition> for ConditionSet {
    fn from_iter<T: IntoIterator<Item = Condition>>(iter: T) -> Self {
        iter.into_iter().fold(Self::default(), Self::with)
    }
}

impl From<BTreeMap<SmolStr, bool>> for ConditionSet {
    fn from(map: BTreeMap<SmolStr, bool>) -> Self {
        let mut set = Self::default();
        for (name, active) in map {
            match Condition::from_name(&name) {
                Some(condition) => set.set(condition, active),
                None => debug!(%name, "ignoring unknown condition"),
            }
        }
        set
    }
}

impl From<ConditionSet> for BTreeMap<Condition, bool> {
    fn from(set: ConditionSet) -> Self {
        Condition::ALL
            .into_iter()
            .map(|c| (c, set.is_active(c)))
            .collect()
    }
}

/// Buy/sell aggregates over the transaction list for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStats {
    pub total_buy: f64,
    pub total_sell: f64,
    pub net_flow: f64,
    /// 0 when there is no flow
    pub buy_pressure: f64,
    pub sell_pressure: f64,
    /// buy / (sell + 1)
    pub accumulation_ratio: f64,
    pub is_accumulating: bool,
    pub whale_cluster: bool,
    pub holders: f64,
    pub pro_traders: f64,
    /// Change against the oldest pro-trader count in the last 15s
    pub pro_traders_change: f64,
}

impl FlowStats {
    pub fn from_transactions(
        now: TimestampMs,
        transactions: &[TransactionRecord],
        config: &DetectorConfig,
    ) -> Self {
        let (total_buy, total_sell) = transactions.iter().fold((0.0, 0.0), |(buy, sell), tx| {
            if tx.side.is_buy() {
                (buy + tx.value, sell)
            } else {
                (buy, sell + tx.value)
            }
        });

        let total = total_buy + total_sell;
        let (buy_pressure, sell_pressure) = if total > 0.0 {
            (total_buy / total, total_sell / total)
        } else {
            (0.0, 0.0)
        };

        let accumulation_ratio = total_buy / (total_sell + 1.0);
        let is_accumulating = accumulation_ratio > config.accumulation_ratio_threshold
            && total_buy > config.min_accumulation_buy;

        let recent_buys = transactions
            .iter()
            .filter(|tx| tx.side.is_buy() && now - tx.detected_time < config.cluster_time_window)
            .count();

        Self {
            total_buy,
            total_sell,
            net_flow: total_buy - total_sell,
            buy_pressure,
            sell_pressure,
            accumulation_ratio,
            is_accumulating,
            whale_cluster: recent_buys >= config.min_cluster_size,
            ..Default::default()
        }
    }

    pub fn with_holder_stats(mut self, holders: f64, pro_traders: f64, change: f64) -> Self {
        self.holders = holders;
        self.pro_traders = pro_traders;
        self.pro_traders_change = change;
        self
    }
}

/// Rolling 15-second record of pro-trader counts
#[derive(Debug, Clone, Default)]
pub struct ProTraderHistory {
    entries: VecDeque<(TimestampMs, f64)>,
}

impl ProTraderHistory {
    /// Record the latest count and return its change against the oldest retained count.
    pub fn record(&mut self, now: TimestampMs, pro_traders: f64) -> f64 {
        self.entries.push_back((now, pro_traders));
        while let Some((time, _)) = self.entries.front() {
            if now - time > PRO_TRADER_WINDOW_MS {
                self.entries.pop_front();
            } else {
                break;
            }
        }

        match self.entries.front() {
            Some((_, oldest)) if self.entries.len() > 1 => pro_traders - oldest,
            _ => 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Low-volatility sideways regime
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consolidation {
    pub detected: bool,
    /// Periods the regime has been confirmed over
    pub duration: usize,
    pub start_price: f64,
    pub end_price: f64,
}

impl Consolidation {
    /// Range/average of the last `consolidationPeriod + 1` prices under the volatility threshold.
    pub fn detect(prices: &[f64], config: &DetectorConfig) -> Self {
        let period = config.consolidation_period;
        if prices.len() < period + 2 {
            return Self::default();
        }

        let recent = tail(prices, period + 1);
        if volatility(recent) < config.volatility_threshold {
            Self {
                detected: true,
                duration: period,
                start_price: recent[0],
                end_price: recent[recent.len() - 1],
            }
        } else {
            Self::default()
        }
    }
}

/// Everything the evaluator reads for one tick
#[derive(Debug, Clone, Copy)]
pub struct ConditionInputs<'a> {
    pub config: &'a DetectorConfig,
    pub flow: &'a FlowStats,
    pub indicators: &'a IndicatorSet,
    pub patterns: &'a PatternFlags,
    pub vwap: &'a VwapAnalysis,
    pub consolidation: &'a Consolidation,
    pub timeframe_converged: bool,
    /// Current tick volume
    pub volume: f64,
    /// Volume window including the current tick
    pub volumes: &'a [f64],
}

impl ConditionSet {
    pub fn evaluate(inputs: &ConditionInputs<'_>) -> Self {
        let config = inputs.config;
        let flow = inputs.flow;
        let patterns = inputs.patterns;
        let odds = inputs.indicators.explosion_odds;
        let recent_volume = mean(tail(inputs.volumes, 5));

        let mut set = Self::default();
        let mut mark = |condition: Condition, active: bool| set.set(condition, active);

        mark(
            Condition::ProTraderBuyVolume,
            flow.total_buy > config.pro_trader_min_amount,
        );
        mark(
            Condition::NetWhaleFlow,
            flow.net_flow > config.min_whale_net_flow,
        );
        mark(
            Condition::ObvSpike,
            inputs.indicators.obv > inputs.volume * 1.8,
        );
        mark(Condition::WhaleCluster, flow.whale_cluster);
        mark(Condition::AccumulationPattern, flow.is_accumulating);
        mark(
            Condition::VolumeAcceleration,
            inputs.indicators.volume_acceleration > 0.25,
        );
        mark(Condition::Consolidation, inputs.consolidation.detected);
        mark(Condition::PatternMatch, patterns.headline().is_some());
        mark(Condition::ShockwaveEngine, odds > 70.0);
        mark(Condition::ExplosionOdds, odds > 80.0);
        mark(
            Condition::CandlePattern,
            patterns.is_set(Pattern::Marubozu) || patterns.is_set(Pattern::BullishEngulfing),
        );
        mark(Condition::VwapConfirmation, inputs.vwap.confirmed());
        mark(Condition::TimeframeConvergence, inputs.timeframe_converged);
        mark(Condition::ScalpingMode, config.scalping_mode);
        mark(
            Condition::InstantBuyPressure,
            flow.buy_pressure > config.instant_buy_pressure_threshold,
        );
        mark(
            Condition::VolumeSpike,
            inputs.volume > recent_volume * config.min_instant_volume_ratio,
        );

        for (condition, pattern) in [
            (Condition::MicroRange, Pattern::MicroRange),
            (Condition::VduSpike, Pattern::VduSpike),
            (Condition::FlashAbsorption, Pattern::FlashAbsorption),
            (Condition::TrapRun, Pattern::TrapRun),
            (Condition::ShakeoutBar, Pattern::ShakeoutBar),
            (Condition::SupplyAbsorption, Pattern::SupplyAbsorption),
            (Condition::VolumeStaircase, Pattern::VolumeStaircase),
            (Condition::DarvasBox, Pattern::DarvasBox),
            (Condition::BoxBreakout, Pattern::BoxBreakoutRetest),
            (Condition::HiddenDivergence, Pattern::HiddenBullishDivergence),
            (Condition::ObvUptrend, Pattern::ObvUptrend),
            (Condition::BuyWallStack, Pattern::BuyWallStack),
            (Condition::VwapRetest, Pattern::VwapRetestSuccess),
        ] {
            mark(condition, patterns.is_set(pattern));
        }

        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn tx(side: Side, value: f64, detected_time: TimestampMs) -> TransactionRecord {
        TransactionRecord {
            side,
            value,
            detected_time,
        }
    }

    #[test]
    fn test_condition_names_round_trip() {
        for condition in Condition::ALL {
            assert_eq!(Condition::from_name(condition.as_str()), Some(condition));
            assert_eq!(
                serde_json::to_value(condition).unwrap(),
                serde_json::Value::String(condition.to_string())
            );
        }
        assert_eq!(Condition::from_name("explosion"), None);
    }

    #[test]
    fn test_base_scores() {
        struct TestCase {
            input: Condition,
            expected: f64,
        }

        let tests = vec![
            TestCase {
                // TC0
                input: Condition::AccumulationPattern,
                expected: 25.0,
            },
            TestCase {
                // TC1
                input: Condition::NetWhaleFlow,
                expected: 20.0,
            },
            TestCase {
                // TC2
                input: Condition::PatternMatch,
                expected: 15.0,
            },
            TestCase {
                // TC3
                input: Condition::ExplosionOdds,
                expected: 12.0,
            },
            TestCase {
                // TC4
                input: Condition::ObvSpike,
                expected: 10.0,
            },
            TestCase {
                // TC5
                input: Condition::CandlePattern,
                expected: 8.0,
            },
            TestCase {
                // TC6: everything unlisted scores 5
                input: Condition::BuyWallStack,
                expected: 5.0,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            assert_eq!(test.input.base_score(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_condition_set_ignores_unknown_names() {
        let set: ConditionSet =
            serde_json::from_str(r#"{"whale_cluster": true, "explosion": true, "obv_spike": false}"#)
                .unwrap();

        assert!(set.is_active(Condition::WhaleCluster));
        assert_eq!(set.active_count(), 1);

        let value = serde_json::to_value(set).unwrap();
        assert_eq!(value.as_object().unwrap().len(), Condition::COUNT);
    }

    #[test]
    fn test_flow_stats() {
        let config = DetectorConfig::default();
        let now = 10_000;
        let transactions = vec![
            tx(Side::Buy, 100_000.0, 9_000),
            tx(Side::Buy, 30_000.0, 2_000),
            tx(Side::Sell, 9_999.0, 9_500),
        ];

        let flow = FlowStats::from_transactions(now, &transactions, &config);
        assert_eq!(flow.total_buy, 130_000.0);
        assert_eq!(flow.net_flow, 120_001.0);
        assert!((flow.accumulation_ratio - 13.0).abs() < 1e-9);
        assert!(flow.is_accumulating);
        assert!(!flow.whale_cluster);
        assert!((flow.buy_pressure + flow.sell_pressure - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_flow_stats_without_transactions() {
        let flow = FlowStats::from_transactions(0, &[], &DetectorConfig::default());
        assert_eq!(flow.buy_pressure, 0.0);
        assert_eq!(flow.sell_pressure, 0.0);
        assert!(!flow.is_accumulating);
    }

    #[test]
    fn test_whale_cluster_window() {
        let config = DetectorConfig::default();
        let now = 100_000;
        let transactions = (0..5)
            .map(|i| tx(Side::Buy, 10.0, now - 1_000 * i))
            .collect::<Vec<_>>();

        assert!(FlowStats::from_transactions(now, &transactions, &config).whale_cluster);
        // The oldest buy falls outside the window once time moves on
        assert!(!FlowStats::from_transactions(now + 600, &transactions, &config).whale_cluster);
    }

    #[test]
    fn test_pro_trader_history() {
        let mut history = ProTraderHistory::default();
        assert_eq!(history.record(0, 10.0), 0.0);
        assert_eq!(history.record(5_000, 14.0), 4.0);
        assert_eq!(history.record(15_000, 12.0), 2.0);
        // First entry is now older than 15s
        assert_eq!(history.record(16_000, 13.0), -1.0);
    }

    #[test]
    fn test_consolidation() {
        let config = DetectorConfig::default();
        let flat = vec![1.0, 1.01, 1.0, 1.02, 1.01, 1.0, 1.01];
        let detected = Consolidation::detect(&flat, &config);
        assert!(detected.detected);
        assert_eq!(detected.duration, 5);
        assert_eq!(detected.end_price, 1.01);

        let short = vec![1.0; 6];
        assert!(!Consolidation::detect(&short, &config).detected);

        let wild = vec![1.0, 1.0, 1.5, 0.8, 1.2, 1.0, 1.3];
        assert!(!Consolidation::detect(&wild, &config).detected);
    }

    #[test]
    fn test_evaluate_maps_inputs() {
        let config = DetectorConfig::default();
        let flow = FlowStats {
            total_buy: 7_000.0,
            net_flow: 7_000.0,
            buy_pressure: 1.0,
            ..Default::default()
        };
        let indicators = IndicatorSet {
            obv: 1_000.0,
            explosion_odds: 75.0,
            ..Default::default()
        };
        let mut patterns = PatternFlags::default();
        patterns.set(Pattern::TrapRun, true);
        patterns.set(Pattern::DarvasBox, true);
        let volumes = vec![100.0, 100.0, 100.0, 100.0, 500.0];

        let set = ConditionSet::evaluate(&ConditionInputs {
            config: &config,
            flow: &flow,
            indicators: &indicators,
            patterns: &patterns,
            vwap: &VwapAnalysis::default(),
            consolidation: &Consolidation::default(),
            timeframe_converged: false,
            volume: 500.0,
            volumes: &volumes,
        });

        assert!(set.is_active(Condition::ProTraderBuyVolume));
        assert!(set.is_active(Condition::NetWhaleFlow));
        assert!(set.is_active(Condition::ObvSpike));
        assert!(set.is_active(Condition::ShockwaveEngine));
        assert!(!set.is_active(Condition::ExplosionOdds));
        assert!(set.is_active(Condition::PatternMatch));
        assert!(set.is_active(Condition::TrapRun));
        assert!(set.is_active(Condition::DarvasBox));
        assert!(set.is_active(Condition::InstantBuyPressure));
        assert!(set.is_active(Condition::ScalpingMode));
        // 500 vs 180 * 3
        assert!(!set.is_active(Condition::VolumeSpike));
        assert!(!set.is_active(Condition::CandlePattern));
    }
}
