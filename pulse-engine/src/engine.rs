//! The per-tick detection pipeline.
//!
//! [`AccumulationEngine`] owns every piece of mutable detector state. A host loop
//! calls [`AccumulationEngine::tick`] once per interval with the time and the
//! collaborator's readings; nothing else mutates the state between ticks.

use crate::{
    alerts::{
        AlertEvent, AlertKind, AlertStateMachine, AlertStrength, DetectorStatus,
        InstantPrediction, MegaInputs, ScalpingInputs,
    },
    buffer::SampleBuffer,
    conditions::{
        Condition, ConditionInputs, ConditionSet, Consolidation, FlowStats, ProTraderHistory,
    },
    config::DetectorConfig,
    error::{EngineError, StoreError},
    export::{ExportFormat, export_history},
    indicators::{ExplosionOdds, IndicatorSet, OddsInputs, VwapAnalysis, mean, tail, volatility},
    learner::{AdaptiveWeightLearner, Signal, SignalKind},
    lifecycle::{DumpCheck, TradeLifecycle},
    patterns::{Pattern, PatternFlags, PatternRegistry, PatternWindow},
    scoring::{FalseSignalCheck, Score, ScoringEngine},
    store::{KeyValueStore, PersistedState},
    timeframe::{Convergence, MultiTimeframeAggregator},
    types::{Sample, TickInput, TimestampMs},
};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::{debug, info};

/// Volumes averaged for the mega volume precondition.
const MEGA_VOLUME_WINDOW: usize = 10;

/// Volumes averaged for the panic-sell dump condition.
const DUMP_VOLUME_WINDOW: usize = 5;

/// Everything the engine produced for one processed tick
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub time: TimestampMs,
    pub price: f64,
    pub volume: f64,
    pub status: DetectorStatus,
    pub score: Score,
    pub conditions: ConditionSet,
    pub indicators: IndicatorSet,
    pub patterns: PatternFlags,
    pub flow: FlowStats,
    pub consolidation: Consolidation,
    pub convergence: Convergence,
    pub instant_prediction: InstantPrediction,
    /// Fraction of mega preconditions satisfied
    pub mega_confidence: f64,
    pub alerts: Vec<AlertStrength>,
    /// Signals emitted on this tick
    pub signals: Vec<Signal>,
    pub events: Vec<AlertEvent>,
    /// Pending signals resolved on this tick
    pub resolved: usize,
}

impl TickReport {
    pub fn fired(&self, kind: SignalKind) -> bool {
        self.signals.iter().any(|s| s.kind == kind)
    }
}

/// Reporting counters and learning statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub confirmed_signals: u64,
    pub successful_signals: u64,
    pub pending_signals: usize,
    /// Percentage of retained signals that resolved successfully
    pub ml_success_rate: Option<f64>,
    pub best_condition: Option<(Condition, f64)>,
}

/// Single-owner detector state driven one tick at a time
#[derive(Debug)]
pub struct AccumulationEngine {
    config: DetectorConfig,
    buffer: SampleBuffer,
    registry: PatternRegistry,
    odds: ExplosionOdds,
    pro_traders: ProTraderHistory,
    scoring: ScoringEngine,
    learner: AdaptiveWeightLearner,
    alerts: AlertStateMachine,
    lifecycle: TradeLifecycle,
    timeframes: MultiTimeframeAggregator,
    context: Option<SmolStr>,
    ticks: u64,
    skipped_ticks: u64,
}

impl AccumulationEngine {
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_state(PersistedState {
            config,
            ..Default::default()
        })
    }

    /// Build from restored weights, signal history and config.
    pub fn with_state(state: PersistedState) -> Self {
        let PersistedState {
            weights,
            history,
            config,
        } = state;

        Self {
            buffer: SampleBuffer::new(config.history_capacity()),
            registry: PatternRegistry::standard(),
            odds: ExplosionOdds::new(),
            pro_traders: ProTraderHistory::default(),
            scoring: ScoringEngine::new(&config),
            learner: AdaptiveWeightLearner::restore(weights, history, &config),
            alerts: AlertStateMachine::new(),
            lifecycle: TradeLifecycle::new(),
            timeframes: MultiTimeframeAggregator::new(),
            context: None,
            ticks: 0,
            skipped_ticks: 0,
            config,
        }
    }

    /// Load persisted state from `store`, defaulting whatever is missing or corrupt.
    pub fn from_store(store: &dyn KeyValueStore) -> Self {
        Self::with_state(PersistedState::load(store))
    }

    /// Replace the pattern registry, e.g. to add custom detectors.
    pub fn with_registry(mut self, registry: PatternRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn learner(&self) -> &AdaptiveWeightLearner {
        &self.learner
    }

    pub fn alerts(&self) -> &AlertStateMachine {
        &self.alerts
    }

    pub fn lifecycle(&self) -> &TradeLifecycle {
        &self.lifecycle
    }

    pub fn context(&self) -> Option<&SmolStr> {
        self.context.as_ref()
    }

    /// Apply a new config, resizing windows for the operating mode.
    pub fn set_config(&mut self, config: DetectorConfig) {
        if config.scalping_mode != self.config.scalping_mode {
            info!(scalping = config.scalping_mode, "operating mode changed");
        }
        self.buffer.set_capacity(config.history_capacity());
        self.scoring.set_capacity(config.max_false_signal_history);
        self.config = config;
    }

    /// Tear down per-context state. Weights and signal history survive.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.odds.reset();
        self.pro_traders.clear();
        self.scoring.reset();
        self.alerts.reset();
        self.lifecycle.reset();
        self.timeframes.clear();
    }

    /// Switch to another asset/page, resetting if it differs from the current one.
    pub fn change_context(&mut self, context: SmolStr) -> bool {
        if self.context.as_ref() == Some(&context) {
            return false;
        }
        info!(from = ?self.context, to = %context, "context changed, resetting detector");
        self.reset();
        self.context = Some(context);
        true
    }

    /// Run the pipeline for one tick.
    ///
    /// Returns `None` when price or volume is missing; the sample windows are left
    /// untouched and no signal can fire.
    pub fn tick(&mut self, now: TimestampMs, input: &TickInput) -> Option<TickReport> {
        if let Some(context) = &input.context {
            self.change_context(context.clone());
        }

        if !self.buffer.append(Sample::new(now, input.price, input.volume)) {
            self.skipped_ticks += 1;
            debug!(
                now,
                price = input.price,
                volume = input.volume,
                "skipping tick: price or volume unavailable"
            );
            return None;
        }
        self.buffer.set_transactions(input.recent_transactions());
        self.ticks += 1;

        let config = &self.config;
        let price = input.price;
        let volume = input.volume;
        let prices = self.buffer.prices();
        let volumes = self.buffer.volumes();
        let mut signals = Vec::new();
        let mut events = Vec::new();

        let resolved = self.learner.resolve(now, &self.buffer, config);

        let pro_traders_change = self.pro_traders.record(now, input.stats.pro_traders);
        let flow = FlowStats::from_transactions(now, self.buffer.transactions(), config)
            .with_holder_stats(input.stats.holders, input.stats.pro_traders, pro_traders_change);

        let window = PatternWindow::new(&prices, &volumes, self.buffer.transactions(), config);
        let patterns = self.registry.evaluate(&window);

        let mut indicators = IndicatorSet::compute(&prices, &volumes);
        let vwap = VwapAnalysis::analyze(&prices, &volumes, config.vwap_retest_threshold);
        indicators.explosion_odds = self.odds.update(OddsInputs {
            sample_count: prices.len(),
            volume_acceleration: indicators.volume_acceleration,
            bullish_pattern: patterns.bullish_setup(),
            vwap_confirmed: vwap.confirmed(),
            rsi: indicators.rsi,
            rsi_overbought: config.rsi_overbought_threshold,
            recent_false_signals: self.scoring.recent_false_signals(now),
        });

        // Convergence reflects the series before this tick's sample is ingested
        let convergence = self
            .timeframes
            .convergence(config.timeframe_convergence_threshold);
        let consolidation = Consolidation::detect(&prices, config);

        let conditions = ConditionSet::evaluate(&ConditionInputs {
            config,
            flow: &flow,
            indicators: &indicators,
            patterns: &patterns,
            vwap: &vwap,
            consolidation: &consolidation,
            timeframe_converged: convergence.converged,
            volume,
            volumes: &volumes,
        });

        let false_signal = FalseSignalCheck {
            prices: &prices,
            rsi: indicators.rsi,
            recent_explosion: self.learner.fired_within(
                now,
                SignalKind::Explosion,
                config.cooldown_period * 3,
            ),
        }
        .tripped(config);
        let score = self
            .scoring
            .score(now, &conditions, self.learner.weights(), false_signal);

        let signal = |kind: SignalKind, confidence: f64| {
            Signal::new(
                now,
                price,
                kind,
                confidence,
                conditions,
                config.ml_evaluation_period,
            )
        };

        let instant_prediction = InstantPrediction::predict(&prices, config);
        if instant_prediction.predicted
            && !self.alerts.is_active(AlertKind::Explosion)
            && !self.alerts.is_active(AlertKind::Hyperspeed)
        {
            let prediction_time = now + config.instant_explosion_prediction_seconds * 1000;
            info!(
                confidence = instant_prediction.confidence,
                prediction_time,
                "instant explosion predicted"
            );
            signals.push(
                signal(SignalKind::InstantExplosion, instant_prediction.confidence)
                    .with_prediction_time(prediction_time),
            );
            events.push(AlertEvent::InstantExplosionPredicted {
                price,
                confidence: instant_prediction.confidence,
                prediction_time,
            });
        }

        let mega_confidence = MegaInputs {
            score: score.value,
            pro_traders: flow.pro_traders,
            total_buy: flow.total_buy,
            consolidation_detected: consolidation.detected,
            consolidation_duration: consolidation.duration,
            volatility: volatility(tail(&prices, MEGA_VOLUME_WINDOW)),
            pattern_match: conditions.is_active(Condition::PatternMatch),
            volume,
            average_volume: mean(tail(&volumes, MEGA_VOLUME_WINDOW)),
        }
        .confidence(config);

        let mut fired = Vec::new();
        if self.alerts.try_mega(now, mega_confidence, config) {
            fired.push((AlertKind::MegaAccumulation, mega_confidence));
        }

        let volume_reference = input.volume_reference.unwrap_or(volume);
        fired.extend(
            self.alerts
                .try_burst(now, &prices, volume, volume_reference, config)
                .into_iter()
                .map(|burst| (burst.kind, burst.acceleration)),
        );

        for kind in self.alerts.expire(now, config) {
            events.push(AlertEvent::Expired { kind });
        }

        if config.nova_pulse_alert {
            let dump = DumpCheck {
                sell_pressure: flow.sell_pressure,
                volume,
                average_volume: mean(tail(&volumes, DUMP_VOLUME_WINDOW)),
                supply_absorption: patterns.is_set(Pattern::SupplyAbsorption),
            };
            events.extend(
                self.lifecycle
                    .update(now, score.value, &dump, config)
                    .into_iter()
                    .map(AlertEvent::Lifecycle),
            );
        }

        if config.scalping_mode {
            events.extend(self.alerts.try_scalping(
                now,
                &ScalpingInputs {
                    price,
                    volume,
                    instant_buy_pressure: conditions.is_active(Condition::InstantBuyPressure),
                    volume_spike: conditions.is_active(Condition::VolumeSpike),
                    micro_range: patterns.is_set(Pattern::MicroRange),
                    prices: &prices,
                    volumes: &volumes,
                },
            ));
        }

        if self.alerts.try_accumulation(now, score.value, config) {
            fired.push((AlertKind::Accumulation, score.value));
        }

        for (kind, confidence) in fired {
            signals.push(signal(kind.signal_kind(), confidence));
            events.push(AlertEvent::Fired {
                kind,
                price,
                confidence,
            });
            self.lifecycle.open(now);
        }

        for signal in &signals {
            self.learner.record(signal.clone());
        }

        self.timeframes.ingest(now, price, volume);

        let status = self.alerts.status(score.value, config);
        debug!(
            now,
            price,
            score = score.value,
            active = conditions.active_count(),
            %status,
            "tick processed"
        );

        Some(TickReport {
            time: now,
            price,
            volume,
            status,
            score,
            conditions,
            indicators,
            patterns,
            flow,
            consolidation,
            convergence,
            instant_prediction,
            mega_confidence,
            alerts: self.alerts.strengths(now, config),
            signals,
            events,
            resolved,
        })
    }

    /// Write weights and history if they changed since the last flush.
    pub fn persist(&mut self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        let (weights_dirty, history_dirty) = self.learner.take_dirty();

        if weights_dirty {
            if let Err(error) = PersistedState::save_weights(store, self.learner.weights()) {
                self.learner.mark_dirty(true, history_dirty);
                return Err(error);
            }
        }
        if history_dirty {
            if let Err(error) = PersistedState::save_history(store, self.learner.history()) {
                self.learner.mark_dirty(false, true);
                return Err(error);
            }
        }
        Ok(())
    }

    /// Serialise the full signal history.
    pub fn export(&self, format: ExportFormat) -> Result<String, EngineError> {
        export_history(format, self.learner.history())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            ticks: self.ticks,
            skipped_ticks: self.skipped_ticks,
            confirmed_signals: self.alerts.confirmed_signals(),
            successful_signals: self.alerts.successful_signals(),
            pending_signals: self.learner.pending().count(),
            ml_success_rate: self.learner.success_rate(),
            best_condition: self.learner.performance().best(),
        }
    }
}
