use pulse_engine::{
    AccumulationEngine, Condition, DetectorConfig, MemoryStore, PersistedState, SignalKind,
    TickInput, TimestampMs, TransactionRecord,
    learner::{LEARNING_RATE, MAX_WEIGHT, MIN_WEIGHT},
    types::Side,
};
use rand::{Rng, SeedableRng, rngs::StdRng};

const TICK_MS: TimestampMs = 1000;

fn whale_buys(now: TimestampMs) -> Vec<TransactionRecord> {
    (0..6)
        .map(|_| TransactionRecord {
            side: Side::Buy,
            value: 25_000.0,
            detected_time: now,
        })
        .collect()
}

// Oscillates between 1.00 and 1.12 under steady whale buying
fn accumulating_tick(index: i64) -> (TimestampMs, TickInput) {
    let now = index * TICK_MS;
    let price = if index % 2 == 0 { 1.0 } else { 1.12 };
    let input = TickInput {
        price,
        volume: 100.0,
        ..Default::default()
    }
    .with_transactions(whale_buys(now))
    .with_stats(0.0, 0.0);
    (now, input)
}

#[test]
fn test_accumulation_fires_resolves_and_adapts_weights() {
    let config = DetectorConfig::default();
    let mut engine = AccumulationEngine::new(config.clone());

    let mut accumulation_times = Vec::new();
    for index in 0..=10 {
        let (now, input) = accumulating_tick(index);
        let report = engine.tick(now, &input).unwrap();

        assert!(!report.fired(SignalKind::Explosion), "explosion at {now}");
        assert!(!report.fired(SignalKind::HyperspeedExplosion), "hyperspeed at {now}");
        assert!(report.flow.whale_cluster);
        assert!(report.flow.is_accumulating);
        if report.fired(SignalKind::Accumulation) {
            assert!(report.score.value >= config.min_accumulation_score);
            accumulation_times.push(now);
        }
    }

    // Consolidation completes on the seventh sample at the latest
    let first = *accumulation_times.first().expect("accumulation never fired");
    assert!(first <= 6 * TICK_MS);
    for pair in accumulation_times.windows(2) {
        assert!(pair[1] - pair[0] > config.cooldown_period);
    }
    assert!(engine.lifecycle().in_trade);

    let weight_before = engine.learner().weights().get(Condition::NetWhaleFlow);
    assert_eq!(weight_before, 1.0);

    // Carry on until the first signal's evaluation window has closed
    let deadline = first + config.ml_evaluation_period;
    let mut resolved = 0;
    for index in 11..=(deadline / TICK_MS) {
        let (now, input) = accumulating_tick(index);
        resolved += engine.tick(now, &input).unwrap().resolved;
    }
    assert!(resolved >= 1);

    let signal = engine
        .learner()
        .history()
        .iter()
        .find(|s| s.kind == SignalKind::Accumulation && s.time == first)
        .unwrap();

    // Fired at the trough the following peak clears the threshold, at the peak it cannot
    let expected_success = signal.price < 1.05;
    assert_eq!(signal.success, Some(expected_success));
    assert!(signal.active_conditions.is_active(Condition::NetWhaleFlow));

    let weight_after = engine.learner().weights().get(Condition::NetWhaleFlow);
    if expected_success {
        assert!(weight_after >= weight_before + LEARNING_RATE - 1e-9);
    } else {
        assert!(weight_after <= weight_before - LEARNING_RATE + 1e-9);
    }
}

#[test]
fn test_learning_state_survives_restart() {
    let store = MemoryStore::new();
    let mut engine = AccumulationEngine::from_store(&store);

    for index in 0..=40 {
        let (now, input) = accumulating_tick(index);
        engine.tick(now, &input).unwrap();
    }
    engine.persist(&store).unwrap();

    let restored = AccumulationEngine::from_store(&store);
    assert_eq!(
        restored.learner().history().len(),
        engine.learner().history().len()
    );
    assert_eq!(
        restored.learner().history().iter().filter(|s| s.success.is_some()).count(),
        engine.learner().history().iter().filter(|s| s.success.is_some()).count()
    );
    for condition in Condition::ALL {
        let (a, b) = (
            restored.learner().weights().get(condition),
            engine.learner().weights().get(condition),
        );
        assert!((a - b).abs() < 1e-9, "{condition} weight {a} != {b}");
    }

    let state = PersistedState::load(&store);
    assert_eq!(state.config, DetectorConfig::default());
}

#[test]
fn test_missing_data_never_fires() {
    let mut engine = AccumulationEngine::new(DetectorConfig::default());

    for index in 0..20 {
        let now = index * TICK_MS;
        let input = TickInput::default().with_transactions(whale_buys(now));
        assert!(engine.tick(now, &input).is_none());
    }

    assert!(engine.buffer().is_empty());
    assert!(engine.learner().history().is_empty());
    assert_eq!(engine.stats().skipped_ticks, 20);
}

#[test]
fn test_score_and_weights_stay_bounded() {
    for scalping_mode in [true, false] {
        let config = DetectorConfig {
            scalping_mode,
            ..DetectorConfig::default()
        };
        let capacity = config.history_capacity();
        let mut engine = AccumulationEngine::new(config);
        let mut rng = StdRng::seed_from_u64(42);
        let mut price = 0.002;

        for index in 0..600 {
            let now = index * 500;
            price *= 0.9 + rng.random::<f64>() * 0.25;
            let volume = if rng.random::<f64>() < 0.05 {
                0.0
            } else {
                1000.0 + rng.random::<f64>() * 50_000.0
            };
            let transactions = (0..(rng.random::<f64>() * 12.0) as usize)
                .map(|_| TransactionRecord {
                    side: if rng.random::<f64>() < 0.7 {
                        Side::Buy
                    } else {
                        Side::Sell
                    },
                    value: rng.random::<f64>() * 40_000.0,
                    detected_time: now - (rng.random::<f64>() * 8000.0) as TimestampMs,
                })
                .collect();
            let input = TickInput {
                price,
                volume,
                volume_reference: Some(volume * (0.5 + rng.random::<f64>())),
                ..Default::default()
            }
            .with_transactions(transactions)
            .with_stats(100.0, rng.random::<f64>() * 30.0);

            if let Some(report) = engine.tick(now, &input) {
                assert!(
                    (0.0..=100.0).contains(&report.score.value),
                    "score {} out of range at {now}",
                    report.score.value
                );
                assert!((0.0..=100.0).contains(&report.indicators.rsi));
                for alert in &report.alerts {
                    assert!((0.0..=100.0).contains(&alert.strength));
                }
            }

            assert!(engine.buffer().len() <= capacity);
            for condition in Condition::ALL {
                let weight = engine.learner().weights().get(condition);
                assert!((MIN_WEIGHT..=MAX_WEIGHT).contains(&weight));
            }
        }
    }
}
