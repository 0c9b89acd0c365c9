use super::{FnDetector, Pattern, PatternWindow};
use crate::{
    indicators::{calculate_obv, calculate_rsi, calculate_vwap, max_of, mean, min_of, tail},
    types::TransactionRecord,
};
use itertools::Itertools;

/// History required before any micro pattern is evaluated.
pub const MIN_MICRO_HISTORY: usize = 10;

/// Samples in a darvas box.
const BOX_LEN: usize = 5;

fn ready(window: &PatternWindow<'_>) -> bool {
    window.prices.len() >= MIN_MICRO_HISTORY && window.volumes.len() >= MIN_MICRO_HISTORY
}

fn range(values: &[f64]) -> Option<f64> {
    Some(max_of(values)? - min_of(values)?)
}

/// Last five prices trade in a far tighter band than the five before them.
pub fn micro_range(window: &PatternWindow<'_>) -> bool {
    if !ready(window) {
        return false;
    }
    let n = window.prices.len();
    let (Some(recent), Some(previous)) = (
        range(&window.prices[n - 5..]),
        range(&window.prices[n - 10..n - 5]),
    ) else {
        return false;
    };
    recent < previous * window.config.micro_range_threshold
}

/// Volume dry-up followed by a spike on an up tick.
pub fn vdu_spike(window: &PatternWindow<'_>) -> bool {
    if !ready(window) {
        return false;
    }
    let (Some(volume), Some(price), Some(prev_price)) = (
        window.volume_back(0),
        window.price_back(0),
        window.price_back(1),
    ) else {
        return false;
    };
    let average = mean(tail(window.volumes, 10));
    volume > average * window.config.vdu_spike_threshold && price > prev_price
}

/// Volume more than doubles while price barely moves.
pub fn flash_absorption(window: &PatternWindow<'_>) -> bool {
    if !ready(window) {
        return false;
    }
    let (Some(volume), Some(prev_volume), Some(price), Some(prev_price)) = (
        window.volume_back(0),
        window.volume_back(1),
        window.price_back(0),
        window.price_back(1),
    ) else {
        return false;
    };
    if prev_volume <= 0.0 || prev_price <= 0.0 {
        return false;
    }
    let volume_change = (volume - prev_volume) / prev_volume;
    let price_change = (price - prev_price) / prev_price;
    volume_change > 1.5 && price_change.abs() < 0.01
}

/// Dip that traps sellers, then a higher close on a volume burst.
pub fn trap_run(window: &PatternWindow<'_>) -> bool {
    if !ready(window) {
        return false;
    }
    let (Some(p3), Some(p2), Some(p1), Some(volume), Some(prev_volume)) = (
        window.price_back(2),
        window.price_back(1),
        window.price_back(0),
        window.volume_back(0),
        window.volume_back(1),
    ) else {
        return false;
    };
    p3 > p2 && p1 > p3 && volume > prev_volume * window.config.trap_run_volume_ratio
}

/// Close pinned at the bottom of the three-sample range.
pub fn shakeout_bar(window: &PatternWindow<'_>) -> bool {
    if !ready(window) {
        return false;
    }
    let last3 = tail(window.prices, 3);
    let (Some(high), Some(low), Some(price)) = (max_of(last3), min_of(last3), window.price_back(0))
    else {
        return false;
    };
    high > low && (price - low) / (high - low) < window.config.shakeout_bar_threshold
}

/// Sellers dominate the tail of the transaction list yet price still rises.
pub fn supply_absorption(window: &PatternWindow<'_>) -> bool {
    if !ready(window) || window.transactions.len() <= 5 {
        return false;
    }
    let start = window.transactions.len() - 5;
    let sells = window.transactions[start..]
        .iter()
        .filter(|tx| tx.side.is_sell())
        .count();
    let (Some(price), Some(prev_price)) = (window.price_back(0), window.price_back(1)) else {
        return false;
    };
    sells > 3 && price > prev_price
}

/// Volume strictly rising over the last `volumeStaircaseMinSteps` steps.
pub fn volume_staircase(window: &PatternWindow<'_>) -> bool {
    let steps = window.config.volume_staircase_min_steps;
    if !ready(window) || window.volumes.len() <= steps + 1 {
        return false;
    }
    tail(window.volumes, steps + 1)
        .iter()
        .tuple_windows()
        .all(|(a, b)| b > a)
}

pub fn darvas_box(window: &PatternWindow<'_>) -> bool {
    if !ready(window) {
        return false;
    }
    let last5 = tail(window.prices, BOX_LEN);
    let (Some(high), Some(low)) = (max_of(last5), min_of(last5)) else {
        return false;
    };
    low > 0.0 && (high - low) / low < window.config.darvas_box_size
}

/// Break above the prior box, pull back inside, then reclaim the box high.
///
/// The box is the five samples preceding the breakout bar.
pub fn box_breakout_retest(window: &PatternWindow<'_>) -> bool {
    if !ready(window) {
        return false;
    }
    let n = window.prices.len();
    let Some(box_high) = max_of(&window.prices[n - 3 - BOX_LEN..n - 3]) else {
        return false;
    };
    let (breakout, retest, reclaim) = (
        window.prices[n - 3],
        window.prices[n - 2],
        window.prices[n - 1],
    );
    breakout > box_high * window.config.box_breakout_threshold
        && retest < box_high
        && reclaim > box_high
}

/// Price prints a lower low while RSI prints a higher low.
///
/// The two lowest prices in the last `hiddenDivergencePeriod` samples are
/// compared against the RSI values computed at the same samples.
pub fn hidden_bullish_divergence(window: &PatternWindow<'_>) -> bool {
    let period = window.config.hidden_divergence_period;
    let n = window.prices.len();
    if !ready(window) || period < 2 || n <= period {
        return false;
    }

    let rsi = calculate_rsi(window.prices, period);
    // rsi[j] belongs to price index j + period
    let rsi_at = |price_index: usize| price_index.checked_sub(period).and_then(|j| rsi.get(j));

    let start = n - period;
    let lows = (start..n)
        .sorted_by(|a, b| {
            window.prices[*a]
                .total_cmp(&window.prices[*b])
                .then_with(|| b.cmp(a))
        })
        .take(2)
        .collect::<Vec<_>>();
    let &[lowest, second] = lows.as_slice() else {
        return false;
    };
    if lowest <= second {
        return false;
    }

    match (rsi_at(lowest), rsi_at(second)) {
        (Some(rsi_lowest), Some(rsi_second)) => {
            window.prices[lowest] < window.prices[second] && rsi_lowest > rsi_second
        }
        _ => false,
    }
}

pub fn obv_uptrend(window: &PatternWindow<'_>) -> bool {
    ready(window) && calculate_obv(window.prices, window.volumes) > 0.0
}

/// Last three listed transactions are all buys.
pub fn buy_wall_stack(window: &PatternWindow<'_>) -> bool {
    ready(window)
        && window.transactions.len() >= 3
        && tail_transactions(window, 3).iter().all(|tx| tx.side.is_buy())
}

fn tail_transactions<'a>(window: &PatternWindow<'a>, n: usize) -> &'a [TransactionRecord] {
    &window.transactions[window.transactions.len().saturating_sub(n)..]
}

/// Price crossed up through VWAP on the last step.
pub fn vwap_retest_success(window: &PatternWindow<'_>) -> bool {
    if !ready(window) {
        return false;
    }
    let (Some(price), Some(prev_price)) = (window.price_back(0), window.price_back(1)) else {
        return false;
    };
    let vwap = calculate_vwap(window.prices, window.volumes);
    price > vwap && prev_price < vwap
}

pub(super) fn detectors() -> Vec<FnDetector> {
    vec![
        FnDetector::new(Pattern::MicroRange, micro_range),
        FnDetector::new(Pattern::VduSpike, vdu_spike),
        FnDetector::new(Pattern::FlashAbsorption, flash_absorption),
        FnDetector::new(Pattern::TrapRun, trap_run),
        FnDetector::new(Pattern::ShakeoutBar, shakeout_bar),
        FnDetector::new(Pattern::SupplyAbsorption, supply_absorption),
        FnDetector::new(Pattern::VolumeStaircase, volume_staircase),
        FnDetector::new(Pattern::DarvasBox, darvas_box),
        FnDetector::new(Pattern::BoxBreakoutRetest, box_breakout_retest),
        FnDetector::new(Pattern::HiddenBullishDivergence, hidden_bullish_divergence),
        FnDetector::new(Pattern::ObvUptrend, obv_uptrend),
        FnDetector::new(Pattern::BuyWallStack, buy_wall_stack),
        FnDetector::new(Pattern::VwapRetestSuccess, vwap_retest_success),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::DetectorConfig,
        patterns::{PatternWindow, test_utils::window},
        types::{Side, TransactionRecord},
    };

    fn flat_prices() -> Vec<f64> {
        vec![1.0; 10]
    }

    fn flat_volumes() -> Vec<f64> {
        vec![100.0; 10]
    }

    fn transactions(sides: &[Side]) -> Vec<TransactionRecord> {
        sides
            .iter()
            .map(|side| TransactionRecord {
                side: *side,
                value: 500.0,
                detected_time: 0,
            })
            .collect()
    }

    #[test]
    fn test_micro_range_compression() {
        let config = DetectorConfig::default();
        let prices = vec![
            1.00, 1.20, 0.90, 1.10, 1.00, 1.0500, 1.0501, 1.0502, 1.0501, 1.0500,
        ];
        assert!(micro_range(&window(&prices, &flat_volumes(), &config)));

        let wide = vec![1.0, 1.01, 1.0, 1.01, 1.0, 1.0, 1.01, 1.0, 1.01, 1.0];
        assert!(!micro_range(&window(&wide, &flat_volumes(), &config)));
    }

    #[test]
    fn test_vdu_spike() {
        let config = DetectorConfig::default();
        let mut prices = flat_prices();
        prices[9] = 1.01;
        let mut volumes = vec![10.0; 10];
        volumes[9] = 1000.0;
        // average 109 * 4.5 = 490.5
        assert!(vdu_spike(&window(&prices, &volumes, &config)));

        prices[9] = 0.99;
        assert!(!vdu_spike(&window(&prices, &volumes, &config)));
    }

    #[test]
    fn test_flash_absorption() {
        let config = DetectorConfig::default();
        let mut prices = flat_prices();
        prices[9] = 1.005;
        let mut volumes = flat_volumes();
        volumes[9] = 260.0;
        assert!(flash_absorption(&window(&prices, &volumes, &config)));

        volumes[9] = 240.0;
        assert!(!flash_absorption(&window(&prices, &volumes, &config)));
    }

    #[test]
    fn test_trap_run() {
        let config = DetectorConfig::default();
        let mut prices = flat_prices();
        prices[7] = 1.00;
        prices[8] = 0.97;
        prices[9] = 1.02;
        let mut volumes = flat_volumes();
        volumes[9] = 301.0;
        assert!(trap_run(&window(&prices, &volumes, &config)));
    }

    #[test]
    fn test_shakeout_bar_needs_range() {
        let config = DetectorConfig::default();
        assert!(!shakeout_bar(&window(&flat_prices(), &flat_volumes(), &config)));

        let mut prices = flat_prices();
        prices[7] = 1.02;
        prices[8] = 1.05;
        prices[9] = 1.00;
        assert!(shakeout_bar(&window(&prices, &flat_volumes(), &config)));
    }

    #[test]
    fn test_supply_absorption_and_buy_wall() {
        let config = DetectorConfig::default();
        let mut prices = flat_prices();
        prices[9] = 1.01;
        let volumes = flat_volumes();

        let sells = transactions(&[
            Side::Buy,
            Side::Buy,
            Side::Sell,
            Side::Sell,
            Side::Sell,
            Side::Sell,
        ]);
        let w = PatternWindow::new(&prices, &volumes, &sells, &config);
        assert!(supply_absorption(&w));
        assert!(!buy_wall_stack(&w));

        let buys = transactions(&[Side::Sell, Side::Buy, Side::Buy, Side::Buy]);
        let w = PatternWindow::new(&prices, &volumes, &buys, &config);
        assert!(!supply_absorption(&w));
        assert!(buy_wall_stack(&w));
    }

    #[test]
    fn test_volume_staircase() {
        let config = DetectorConfig::default();
        let mut volumes = flat_volumes();
        volumes[6] = 100.0;
        volumes[7] = 110.0;
        volumes[8] = 120.0;
        volumes[9] = 130.0;
        assert!(volume_staircase(&window(&flat_prices(), &volumes, &config)));

        volumes[8] = 110.0;
        assert!(!volume_staircase(&window(&flat_prices(), &volumes, &config)));
    }

    #[test]
    fn test_darvas_box() {
        let config = DetectorConfig::default();
        assert!(darvas_box(&window(&flat_prices(), &flat_volumes(), &config)));

        let mut prices = flat_prices();
        prices[9] = 1.02;
        assert!(!darvas_box(&window(&prices, &flat_volumes(), &config)));
    }

    #[test]
    fn test_box_breakout_retest() {
        let config = DetectorConfig::default();
        let prices = vec![1.0, 1.0, 0.99, 1.00, 0.98, 1.00, 0.99, 1.03, 0.995, 1.01];
        assert!(box_breakout_retest(&window(&prices, &flat_volumes(), &config)));

        let weak = vec![1.0, 1.0, 0.99, 1.00, 0.98, 1.00, 0.99, 1.01, 0.995, 1.01];
        assert!(!box_breakout_retest(&window(&weak, &flat_volumes(), &config)));
    }

    #[test]
    fn test_hidden_divergence_lower_low_higher_rsi() {
        let config = DetectorConfig {
            hidden_divergence_period: 4,
            ..Default::default()
        };
        // Sharp drop to the first low, then a slow grind to a marginally lower low
        let prices = vec![2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 1.0, 1.5, 1.2, 0.99];
        let volumes = flat_volumes();
        let w = window(&prices, &volumes, &config);

        let rsi = calculate_rsi(&prices, 4);
        // lows at index 9 (0.99) and 6 (1.0)
        assert!(rsi[9 - 4] > rsi[6 - 4]);
        assert!(hidden_bullish_divergence(&w));
    }

    #[test]
    fn test_hidden_divergence_absent_when_low_is_older() {
        let config = DetectorConfig {
            hidden_divergence_period: 4,
            ..Default::default()
        };
        let prices = vec![2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 0.9, 1.5, 1.2, 1.0];
        let volumes = flat_volumes();
        let w = window(&prices, &volumes, &config);
        assert!(!hidden_bullish_divergence(&w));
    }

    #[test]
    fn test_vwap_cross_and_obv() {
        let config = DetectorConfig::default();
        let mut prices = flat_prices();
        prices[8] = 0.98;
        prices[9] = 1.02;
        let volumes = flat_volumes();
        let w = window(&prices, &volumes, &config);

        assert!(vwap_retest_success(&w));
        // -100 on the dip, +100 on the recovery
        assert!(!obv_uptrend(&w));
    }

    #[test]
    fn test_micro_patterns_need_ten_samples() {
        let config = DetectorConfig::default();
        let prices = vec![1.0, 1.1, 1.2];
        let volumes = vec![1.0, 2.0, 3.0];
        let w = window(&prices, &volumes, &config);

        for detector in detectors() {
            assert!(
                !crate::patterns::PatternDetector::detect(&detector, &w),
                "{:?}",
                detector
            );
        }
    }
}
