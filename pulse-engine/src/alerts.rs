//! Alert kinds, their decay timers and cooldowns.
//!
//! The four alert kinds are tracked independently. Explosion and Hyperspeed fire
//! from a 4-sample acceleration check, Mega from a vote over seven preconditions,
//! and Accumulation from the composite score. Hyperspeed suppresses Explosion,
//! and any active burst (Explosion, Hyperspeed, Mega) holds back Accumulation.

use crate::{
    config::DetectorConfig,
    indicators::{change_and_acceleration, max_of, mean, relative_change, tail},
    learner::SignalKind,
    lifecycle::LifecycleEvent,
    types::TimestampMs,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Minimum acceleration for a standard explosion.
const EXPLOSION_MIN_ACCELERATION: f64 = 0.05;

/// Minimum acceleration for a hyperspeed explosion.
const HYPERSPEED_MIN_ACCELERATION: f64 = 0.1;

/// Volume multiple of the reference volume a hyperspeed needs.
const HYPERSPEED_VOLUME_MULTIPLE: f64 = 3.2;

/// Mega decays over this multiple of `minStrengthDuration`.
const MEGA_DECAY_MULTIPLE: f64 = 1.5;

/// Strong-buy-pressure scalping signals are spaced at least this far apart.
const SCALP_PRESSURE_SPACING_MS: TimestampMs = 2_000;

/// Volume multiple of the last-5 average a micro-range breakout needs.
const SCALP_BREAKOUT_VOLUME_MULTIPLE: f64 = 2.5;

/// Status band below `minAccumulationScore` reported as early accumulation.
pub const EARLY_ACCUMULATION_BAND: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Accumulation,
    Explosion,
    Hyperspeed,
    MegaAccumulation,
}

impl AlertKind {
    pub const ALL: [AlertKind; 4] = [
        AlertKind::Accumulation,
        AlertKind::Explosion,
        AlertKind::Hyperspeed,
        AlertKind::MegaAccumulation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Accumulation => "accumulation",
            AlertKind::Explosion => "explosion",
            AlertKind::Hyperspeed => "hyperspeed",
            AlertKind::MegaAccumulation => "mega_accumulation",
        }
    }

    /// Kind recorded on the [`Signal`](crate::learner::Signal) a fire emits.
    pub fn signal_kind(&self) -> SignalKind {
        match self {
            AlertKind::Accumulation => SignalKind::Accumulation,
            AlertKind::Explosion => SignalKind::Explosion,
            AlertKind::Hyperspeed => SignalKind::HyperspeedExplosion,
            AlertKind::MegaAccumulation => SignalKind::MegaAccumulation,
        }
    }

    /// Time until the alert auto-deactivates, `None` for Accumulation.
    pub fn decay_ms(&self, config: &DetectorConfig) -> Option<TimestampMs> {
        match self {
            AlertKind::Accumulation => None,
            AlertKind::Explosion | AlertKind::Hyperspeed => Some(config.min_strength_duration),
            AlertKind::MegaAccumulation => Some(
                (config.min_strength_duration as f64 * MEGA_DECAY_MULTIPLE) as TimestampMs,
            ),
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Timer state of one alert kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertState {
    pub kind: AlertKind,
    pub active: bool,
    pub start_time: Option<TimestampMs>,
    pub last_fire: Option<TimestampMs>,
}

impl AlertState {
    pub fn new(kind: AlertKind) -> Self {
        Self {
            kind,
            active: false,
            start_time: None,
            last_fire: None,
        }
    }

    fn fire(&mut self, now: TimestampMs) {
        self.active = true;
        self.start_time = Some(now);
        self.last_fire = Some(now);
    }

    /// `now - last_fire > cooldown`, true when it never fired.
    pub fn cooldown_elapsed(&self, now: TimestampMs, cooldown: TimestampMs) -> bool {
        self.last_fire
            .map(|last| now - last > cooldown)
            .unwrap_or(true)
    }

    /// Remaining strength in percent, decaying linearly to zero.
    pub fn strength(&self, now: TimestampMs, config: &DetectorConfig) -> f64 {
        if !self.active {
            return 0.0;
        }
        match (self.kind.decay_ms(config), self.start_time) {
            (Some(duration), Some(start)) if duration > 0 => {
                let elapsed = (now - start) as f64;
                ((1.0 - elapsed / duration as f64) * 100.0).clamp(0.0, 100.0)
            }
            _ => 100.0,
        }
    }

    /// Deactivate once the decay duration has been exceeded. Returns whether it expired.
    fn expire(&mut self, now: TimestampMs, config: &DetectorConfig) -> bool {
        let (Some(duration), Some(start)) = (self.kind.decay_ms(config), self.start_time) else {
            return false;
        };
        if self.active && now - start > duration {
            self.active = false;
            return true;
        }
        false
    }
}

/// Reported strength of one kind for a tick
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStrength {
    pub kind: AlertKind,
    pub active: bool,
    /// Remaining strength, 0-100
    pub strength: f64,
}

/// Headline detector state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorStatus {
    #[default]
    Scanning,
    EarlyAccumulation,
    Accumulation,
    Explosion,
    Hyperspeed,
    MegaAccumulation,
}

impl DetectorStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DetectorStatus::Scanning => "Scanning for accumulation patterns",
            DetectorStatus::EarlyAccumulation => "Early accumulation detected",
            DetectorStatus::Accumulation => "Strong accumulation detected",
            DetectorStatus::Explosion => "Explosion imminent",
            DetectorStatus::Hyperspeed => "Hyperspeed explosion detected",
            DetectorStatus::MegaAccumulation => "Mega accumulation detected",
        }
    }
}

impl std::fmt::Display for DetectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Something the detector wants a display/notification collaborator to surface
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "event", content = "detail", rename_all = "snake_case")]
pub enum AlertEvent {
    Fired {
        kind: AlertKind,
        price: f64,
        confidence: f64,
    },
    Expired {
        kind: AlertKind,
    },
    InstantExplosionPredicted {
        price: f64,
        confidence: f64,
        prediction_time: TimestampMs,
    },
    StrongBuyPressure {
        price: f64,
    },
    MicroRangeBreakout {
        price: f64,
    },
    Lifecycle(LifecycleEvent),
}

/// Instant-explosion prediction from positive second differences
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct InstantPrediction {
    pub predicted: bool,
    pub confidence: f64,
}

impl InstantPrediction {
    /// Σ positive second differences of the relative changes over the last
    /// `hyperspeedDetectionWindow + 1` prices, divided by the number of differences.
    pub fn predict(prices: &[f64], config: &DetectorConfig) -> Self {
        let window = config.hyperspeed_detection_window;
        if prices.len() < window + 1 {
            return Self::default();
        }

        let changes = tail(prices, window + 1)
            .windows(2)
            .map(|pair| relative_change(pair[0], pair[1]))
            .collect::<Vec<_>>();
        let second_differences = changes
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect::<Vec<_>>();
        if second_differences.is_empty() {
            return Self::default();
        }

        let positive = second_differences.iter().filter(|d| **d > 0.0).sum::<f64>();
        let confidence = positive / second_differences.len() as f64;

        Self {
            predicted: confidence > config.hyperspeed_confidence_threshold,
            confidence,
        }
    }
}

/// The seven mega-accumulation preconditions
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MegaInputs {
    pub score: f64,
    pub pro_traders: f64,
    pub total_buy: f64,
    pub consolidation_detected: bool,
    pub consolidation_duration: usize,
    pub volatility: f64,
    pub pattern_match: bool,
    pub volume: f64,
    /// Average of the last 10 volumes
    pub average_volume: f64,
}

impl MegaInputs {
    /// Minimum consolidation duration counted as a precondition.
    const MIN_CONSOLIDATION: usize = 3;

    pub fn preconditions(&self, config: &DetectorConfig) -> [bool; 7] {
        [
            self.score >= config.mega_accumulation_threshold,
            self.pro_traders >= config.mega_pro_traders_threshold,
            self.total_buy >= config.mega_buy_volume_threshold,
            self.consolidation_detected && self.consolidation_duration >= Self::MIN_CONSOLIDATION,
            self.volatility < config.mega_volatility_threshold,
            self.pattern_match,
            self.volume > self.average_volume * config.mega_volume_ratio,
        ]
    }

    /// Fraction of satisfied preconditions.
    pub fn confidence(&self, config: &DetectorConfig) -> f64 {
        let preconditions = self.preconditions(config);
        let satisfied = preconditions.iter().filter(|p| **p).count();
        satisfied as f64 / preconditions.len() as f64
    }
}

/// A burst alert that fired on this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstFire {
    pub kind: AlertKind,
    /// Blended price acceleration, used as the signal confidence
    pub acceleration: f64,
}

/// Inputs for the scalping-mode signals
#[derive(Debug, Clone, Copy)]
pub struct ScalpingInputs<'a> {
    pub price: f64,
    pub volume: f64,
    pub instant_buy_pressure: bool,
    pub volume_spike: bool,
    pub micro_range: bool,
    /// Price window including the current tick
    pub prices: &'a [f64],
    /// Volume window including the current tick
    pub volumes: &'a [f64],
}

/// Independent per-kind alert timers plus the shared accumulation cooldown clock
#[derive(Debug, Clone)]
pub struct AlertStateMachine {
    states: [AlertState; 4],
    /// Last accumulation or scalping signal
    last_signal_time: Option<TimestampMs>,
    confirmed_signals: u64,
    successful_signals: u64,
}

impl Default for AlertStateMachine {
    fn default() -> Self {
        Self {
            states: AlertKind::ALL.map(AlertState::new),
            last_signal_time: None,
            confirmed_signals: 0,
            successful_signals: 0,
        }
    }
}

impl AlertStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, kind: AlertKind) -> &AlertState {
        &self.states[kind as usize]
    }

    fn state_mut(&mut self, kind: AlertKind) -> &mut AlertState {
        &mut self.states[kind as usize]
    }

    pub fn is_active(&self, kind: AlertKind) -> bool {
        self.state(kind).active
    }

    /// Explosion, Hyperspeed or Mega is active.
    pub fn burst_active(&self) -> bool {
        self.is_active(AlertKind::Explosion)
            || self.is_active(AlertKind::Hyperspeed)
            || self.is_active(AlertKind::MegaAccumulation)
    }

    /// Accumulation signals emitted.
    pub fn confirmed_signals(&self) -> u64 {
        self.confirmed_signals
    }

    /// Explosion, Hyperspeed and Mega signals emitted.
    pub fn successful_signals(&self) -> u64 {
        self.successful_signals
    }

    pub fn last_signal_time(&self) -> Option<TimestampMs> {
        self.last_signal_time
    }

    /// Fire Mega when the precondition vote reaches `megaPatternWeight` outside its cooldown.
    pub fn try_mega(&mut self, now: TimestampMs, confidence: f64, config: &DetectorConfig) -> bool {
        let state = self.state_mut(AlertKind::MegaAccumulation);
        if confidence < config.mega_pattern_weight
            || !state.cooldown_elapsed(now, config.mega_accumulation_cooldown)
        {
            return false;
        }

        state.fire(now);
        self.successful_signals += 1;
        info!(confidence, "mega accumulation fired");
        true
    }

    /// 4-sample acceleration check. Hyperspeed is tested first and suppresses Explosion.
    pub fn try_burst(
        &mut self,
        now: TimestampMs,
        prices: &[f64],
        volume: f64,
        volume_reference: f64,
        config: &DetectorConfig,
    ) -> Vec<BurstFire> {
        let Some((change, acceleration)) = change_and_acceleration(prices) else {
            return Vec::new();
        };
        let mut fired = Vec::new();

        if change > config.hyperspeed_threshold
            && acceleration > HYPERSPEED_MIN_ACCELERATION
            && volume > volume_reference * HYPERSPEED_VOLUME_MULTIPLE
        {
            self.state_mut(AlertKind::Hyperspeed).fire(now);
            self.successful_signals += 1;
            info!(change, acceleration, volume, "hyperspeed explosion fired");
            fired.push(BurstFire {
                kind: AlertKind::Hyperspeed,
                acceleration,
            });
        }

        if change > config.explosion_threshold
            && acceleration > EXPLOSION_MIN_ACCELERATION
            && !self.is_active(AlertKind::Hyperspeed)
        {
            self.state_mut(AlertKind::Explosion).fire(now);
            self.successful_signals += 1;
            info!(change, acceleration, "explosion fired");
            fired.push(BurstFire {
                kind: AlertKind::Explosion,
                acceleration,
            });
        }

        fired
    }

    /// Deactivate every decayed kind, returning those that expired.
    pub fn expire(&mut self, now: TimestampMs, config: &DetectorConfig) -> Vec<AlertKind> {
        self.states
            .iter_mut()
            .filter_map(|state| state.expire(now, config).then_some(state.kind))
            .inspect(|kind| debug!(%kind, "alert decayed"))
            .collect()
    }

    /// Scalping-mode signals; both refresh the accumulation cooldown clock.
    pub fn try_scalping(&mut self, now: TimestampMs, inputs: &ScalpingInputs<'_>) -> Vec<AlertEvent> {
        let mut events = Vec::new();

        let spaced = self
            .last_signal_time
            .map(|last| now - last > SCALP_PRESSURE_SPACING_MS)
            .unwrap_or(true);
        if inputs.instant_buy_pressure && inputs.volume_spike && spaced {
            self.last_signal_time = Some(now);
            info!(price = inputs.price, "scalping: strong buy pressure");
            events.push(AlertEvent::StrongBuyPressure {
                price: inputs.price,
            });
        }

        // Breakout over the five samples preceding the current one
        let previous = &inputs.prices[..inputs.prices.len().saturating_sub(1)];
        let breakout = max_of(tail(previous, 5)).is_some_and(|high| inputs.price > high);
        let volume_surge = inputs.volume
            > mean(tail(inputs.volumes, 5)) * SCALP_BREAKOUT_VOLUME_MULTIPLE;
        if inputs.micro_range && breakout && volume_surge {
            self.last_signal_time = Some(now);
            info!(price = inputs.price, "scalping: micro range breakout");
            events.push(AlertEvent::MicroRangeBreakout {
                price: inputs.price,
            });
        }

        events
    }

    /// Fire Accumulation when the score clears the minimum outside the cooldown and
    /// no burst is active. The accumulation state otherwise tracks whether the
    /// score still holds above the minimum.
    pub fn try_accumulation(&mut self, now: TimestampMs, score: f64, config: &DetectorConfig) -> bool {
        let qualifies = score >= config.min_accumulation_score && !self.burst_active();
        let cooled = self
            .last_signal_time
            .map(|last| now - last > config.cooldown_period)
            .unwrap_or(true);

        if qualifies && cooled {
            self.state_mut(AlertKind::Accumulation).fire(now);
            self.last_signal_time = Some(now);
            self.confirmed_signals += 1;
            info!(score, "accumulation fired");
            return true;
        }

        self.state_mut(AlertKind::Accumulation).active &= qualifies;
        false
    }

    /// Headline status, strongest active kind first.
    pub fn status(&self, score: f64, config: &DetectorConfig) -> DetectorStatus {
        if self.is_active(AlertKind::MegaAccumulation) {
            DetectorStatus::MegaAccumulation
        } else if self.is_active(AlertKind::Hyperspeed) {
            DetectorStatus::Hyperspeed
        } else if self.is_active(AlertKind::Explosion) {
            DetectorStatus::Explosion
        } else if self.is_active(AlertKind::Accumulation) {
            DetectorStatus::Accumulation
        } else if score >= config.min_accumulation_score - EARLY_ACCUMULATION_BAND {
            DetectorStatus::EarlyAccumulation
        } else {
            DetectorStatus::Scanning
        }
    }

    pub fn strengths(&self, now: TimestampMs, config: &DetectorConfig) -> Vec<AlertStrength> {
        self.states
            .iter()
            .map(|state| AlertStrength {
                kind: state.kind,
                active: state.active,
                strength: state.strength(now, config),
            })
            .collect()
    }

    /// Deactivate every kind and clear timers and counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    #[test]
    fn test_accumulation_cooldown() {
        let config = config();
        let mut machine = AlertStateMachine::new();

        assert!(machine.try_accumulation(10_000, 95.0, &config));
        assert!(!machine.try_accumulation(12_000, 96.0, &config));
        assert!(!machine.try_accumulation(15_000, 96.0, &config));
        assert!(machine.try_accumulation(15_001, 93.0, &config));
        assert_eq!(machine.confirmed_signals(), 2);
    }

    #[test]
    fn test_accumulation_held_back_by_burst() {
        let config = config();
        let mut machine = AlertStateMachine::new();

        assert!(machine.try_mega(1_000, 1.0, &config));
        assert!(!machine.try_accumulation(1_000, 99.0, &config));
        assert_eq!(machine.status(99.0, &config), DetectorStatus::MegaAccumulation);

        // Mega decays after 1.5 × 3200ms
        assert!(machine.expire(5_800, &config).is_empty());
        assert_eq!(machine.expire(5_801, &config), vec![AlertKind::MegaAccumulation]);
        assert!(machine.try_accumulation(5_801, 99.0, &config));
    }

    #[test]
    fn test_accumulation_state_follows_score() {
        let config = config();
        let mut machine = AlertStateMachine::new();

        machine.try_accumulation(0, 95.0, &config);
        machine.try_accumulation(1_000, 94.0, &config);
        assert_eq!(machine.status(94.0, &config), DetectorStatus::Accumulation);

        machine.try_accumulation(2_000, 80.0, &config);
        assert_eq!(machine.status(80.0, &config), DetectorStatus::EarlyAccumulation);
        assert_eq!(machine.status(70.0, &config), DetectorStatus::Scanning);
    }

    #[test]
    fn test_mega_cooldown() {
        let config = config();
        let mut machine = AlertStateMachine::new();

        assert!(!machine.try_mega(0, 0.8, &config));
        assert!(machine.try_mega(0, 6.0 / 7.0, &config));
        assert!(!machine.try_mega(30_000, 1.0, &config));
        assert!(machine.try_mega(30_001, 1.0, &config));
        assert_eq!(machine.successful_signals(), 2);
    }

    #[test]
    fn test_burst_detection() {
        struct TestCase {
            prices: Vec<f64>,
            volume: f64,
            volume_reference: f64,
            expected: Vec<AlertKind>,
        }

        let tests = vec![
            TestCase {
                // TC0: too few prices
                prices: vec![1.0, 3.0, 9.0],
                volume: 100.0,
                volume_reference: 10.0,
                expected: vec![],
            },
            TestCase {
                // TC1: >102.8% jump without volume surge is a standard explosion
                prices: vec![1.0, 1.0, 1.0, 2.5],
                volume: 100.0,
                volume_reference: 100.0,
                expected: vec![AlertKind::Explosion],
            },
            TestCase {
                // TC2: same jump on 3.2× reference volume is hyperspeed, which suppresses explosion
                prices: vec![1.0, 1.0, 1.0, 2.5],
                volume: 400.0,
                volume_reference: 100.0,
                expected: vec![AlertKind::Hyperspeed],
            },
            TestCase {
                // TC3: ordinary moves never qualify
                prices: vec![100.0, 101.0, 103.0, 106.0],
                volume: 400.0,
                volume_reference: 100.0,
                expected: vec![],
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let mut machine = AlertStateMachine::new();
            let fired = machine
                .try_burst(0, &test.prices, test.volume, test.volume_reference, &config())
                .into_iter()
                .map(|f| f.kind)
                .collect::<Vec<_>>();
            assert_eq!(fired, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_strength_decays_linearly() {
        let config = config();
        let mut machine = AlertStateMachine::new();
        machine.try_burst(0, &[1.0, 1.0, 1.0, 2.5], 1.0, 1.0, &config);

        let strength = |machine: &AlertStateMachine, now| {
            machine.state(AlertKind::Explosion).strength(now, &config)
        };
        assert_eq!(strength(&machine, 0), 100.0);
        assert!((strength(&machine, 1_600) - 50.0).abs() < 1e-9);
        assert_eq!(machine.status(0.0, &config), DetectorStatus::Explosion);

        assert_eq!(machine.expire(3_201, &config), vec![AlertKind::Explosion]);
        assert_eq!(strength(&machine, 3_201), 0.0);
    }

    #[test]
    fn test_scalping_signals_refresh_cooldown() {
        let config = config();
        let mut machine = AlertStateMachine::new();
        let prices = [1.0, 1.0, 1.0, 1.0, 1.0, 1.01];
        let volumes = [10.0, 10.0, 10.0, 10.0, 10.0, 100.0];
        let inputs = ScalpingInputs {
            price: 1.01,
            volume: 100.0,
            instant_buy_pressure: true,
            volume_spike: true,
            micro_range: true,
            prices: &prices,
            volumes: &volumes,
        };

        let events = machine.try_scalping(1_000, &inputs);
        assert_eq!(events.len(), 2);
        assert_eq!(machine.last_signal_time(), Some(1_000));

        // Pressure signal is rate limited, breakout is not
        let events = machine.try_scalping(2_000, &inputs);
        assert_eq!(events, vec![AlertEvent::MicroRangeBreakout { price: 1.01 }]);

        // Accumulation waits out the cooldown from the last scalping signal
        assert!(!machine.try_accumulation(6_000, 95.0, &config));
        assert!(machine.try_accumulation(7_001, 95.0, &config));
    }

    #[test]
    fn test_instant_prediction() {
        let config = config();

        let flat = InstantPrediction::predict(&[1.0, 1.0, 1.0, 1.0], &config);
        assert!(!flat.predicted);
        assert_eq!(flat.confidence, 0.0);

        // changes 0, 0, 2.0 => second differences 0, 2.0 => confidence 1.0
        let spike = InstantPrediction::predict(&[1.0, 1.0, 1.0, 3.0], &config);
        assert!(spike.predicted);
        assert!((spike.confidence - 1.0).abs() < 1e-12);

        assert!(!InstantPrediction::predict(&[1.0, 2.0], &config).predicted);
    }

    #[test]
    fn test_mega_confidence() {
        let config = config();
        let inputs = MegaInputs {
            score: 96.0,
            pro_traders: 20.0,
            total_buy: 300_000.0,
            consolidation_detected: true,
            consolidation_duration: 5,
            volatility: 0.01,
            pattern_match: true,
            volume: 10.0,
            average_volume: 10.0,
        };

        assert!((inputs.confidence(&config) - 6.0 / 7.0).abs() < 1e-12);
        assert!(inputs.confidence(&config) >= config.mega_pattern_weight);
    }
}
