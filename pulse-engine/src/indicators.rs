/// Technical indicators recomputed from the sample buffer every tick
///
/// All functions degrade to a neutral value (0, 50 or `false`) instead of failing
/// when the window is too short or a denominator is zero.
use serde::{Deserialize, Serialize};

/// RSI period used for the headline indicator.
pub const RSI_PERIOD: usize = 14;

/// Minimum points for a regression slope.
pub const MIN_REGRESSION_POINTS: usize = 10;

/// Minimum points before explosion odds are computed.
pub const MIN_ODDS_POINTS: usize = 10;

/// Neutral RSI reported before enough history exists.
pub const NEUTRAL_RSI: f64 = 50.0;

/// Snapshot of every indicator for one tick
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorSet {
    pub rsi: f64,
    pub vwap: f64,
    pub obv: f64,
    pub regression_slope: f64,
    pub volume_acceleration: f64,
    pub price_acceleration: f64,
    pub explosion_odds: f64,
}

impl Default for IndicatorSet {
    fn default() -> Self {
        Self {
            rsi: NEUTRAL_RSI,
            vwap: 0.0,
            obv: 0.0,
            regression_slope: 0.0,
            volume_acceleration: 0.0,
            price_acceleration: 0.0,
            explosion_odds: 0.0,
        }
    }
}

impl IndicatorSet {
    /// Compute every buffer-derived indicator. Explosion odds depend on pattern
    /// flags and are filled in by [`ExplosionOdds::update`].
    pub fn compute(prices: &[f64], volumes: &[f64]) -> Self {
        Self {
            rsi: latest_rsi(prices, RSI_PERIOD),
            vwap: calculate_vwap(prices, volumes),
            obv: calculate_obv(prices, volumes),
            regression_slope: regression_slope(prices),
            volume_acceleration: acceleration(volumes),
            price_acceleration: acceleration(prices),
            explosion_odds: 0.0,
        }
    }
}

/// Simplified running-sum RSI.
///
/// Gains and losses accumulate over the window; once `period` changes are in,
/// each step emits `100 - 100 / (1 + RS)` and then subtracts the oldest change.
/// RS is 100 when the average loss is zero.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    let mut values = Vec::with_capacity(prices.len().saturating_sub(period));
    let mut gains = 0.0;
    let mut losses = 0.0;

    for i in 1..prices.len() {
        let change = prices[i] - prices[i - 1];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }

        if i >= period {
            let avg_gain = gains / period as f64;
            let avg_loss = losses / period as f64;
            let rs = if avg_loss <= 0.0 { 100.0 } else { avg_gain / avg_loss };
            let rsi = 100.0 - (100.0 / (1.0 + rs));
            values.push(rsi.clamp(0.0, 100.0));

            let old_change = prices[i - period + 1] - prices[i - period];
            if old_change > 0.0 {
                gains -= old_change;
            } else {
                losses += old_change;
            }
        }
    }

    values
}

/// Most recent RSI value, neutral when the window is too short.
pub fn latest_rsi(prices: &[f64], period: usize) -> f64 {
    calculate_rsi(prices, period)
        .last()
        .copied()
        .unwrap_or(NEUTRAL_RSI)
}

/// Volume-Weighted Average Price over the whole window
///
/// VWAP = Σ(Price × Volume) / Σ(Volume), 0 when there is no volume.
pub fn calculate_vwap(prices: &[f64], volumes: &[f64]) -> f64 {
    let mut sum_pv = 0.0;
    let mut sum_v = 0.0;

    for (price, volume) in prices.iter().zip(volumes.iter()) {
        sum_pv += price * volume;
        sum_v += volume;
    }

    if sum_v > 0.0 { sum_pv / sum_v } else { 0.0 }
}

/// On-balance volume starting from 0.
pub fn calculate_obv(prices: &[f64], volumes: &[f64]) -> f64 {
    let mut obv = 0.0;
    for i in 1..prices.len().min(volumes.len()) {
        if prices[i] > prices[i - 1] {
            obv += volumes[i];
        } else if prices[i] < prices[i - 1] {
            obv -= volumes[i];
        }
    }
    obv
}

/// Ordinary least squares slope of price against index.
pub fn regression_slope(prices: &[f64]) -> f64 {
    if prices.len() < MIN_REGRESSION_POINTS {
        return 0.0;
    }

    let n = prices.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = prices.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for (i, price) in prices.iter().enumerate() {
        let dx = i as f64 - mean_x;
        cov += dx * (price - mean_y);
        var_x += dx * dx;
    }

    if var_x > 0.0 { cov / var_x } else { 0.0 }
}

/// Relative change from `from` to `to`, 0 when `from` is zero.
#[inline]
pub fn relative_change(from: f64, to: f64) -> f64 {
    if from != 0.0 { (to - from) / from } else { 0.0 }
}

/// Last-step relative change and the weighted blend of the last three changes.
///
/// Returns `(Δ1, (Δ1 + 0.7·Δ2 + 0.5·Δ3) / 2.2)` or `None` below 4 points.
pub fn change_and_acceleration(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 4 {
        return None;
    }
    let n = values.len();
    let change1 = relative_change(values[n - 2], values[n - 1]);
    let change2 = relative_change(values[n - 3], values[n - 2]);
    let change3 = relative_change(values[n - 4], values[n - 3]);
    Some((change1, (change1 + change2 * 0.7 + change3 * 0.5) / 2.2))
}

/// Weighted second difference over the last four values.
pub fn acceleration(values: &[f64]) -> f64 {
    change_and_acceleration(values)
        .map(|(_, accel)| accel)
        .unwrap_or(0.0)
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// The last `n` values (fewer if the slice is shorter).
#[inline]
pub fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

/// Highest value, `None` for an empty slice.
pub fn max_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

/// Lowest value, `None` for an empty slice.
pub fn min_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// Range divided by average price, 0 when undefined.
pub fn volatility(prices: &[f64]) -> f64 {
    let (Some(high), Some(low)) = (max_of(prices), min_of(prices)) else {
        return 0.0;
    };
    let avg = mean(prices);
    if avg > 0.0 { (high - low) / avg } else { 0.0 }
}

/// VWAP retest/bounce state
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct VwapAnalysis {
    pub vwap: f64,
    /// Price within `retest_threshold` of VWAP
    pub retest: bool,
    /// Retest with a rising price above VWAP
    pub bounce: bool,
}

impl VwapAnalysis {
    pub fn analyze(prices: &[f64], volumes: &[f64], retest_threshold: f64) -> Self {
        let Some(&current) = prices.last() else {
            return Self::default();
        };
        let previous = if prices.len() > 1 {
            prices[prices.len() - 2]
        } else {
            current
        };

        let vwap = calculate_vwap(prices, volumes);
        let retest = (current - vwap).abs() < vwap * retest_threshold;
        let bounce = retest && current > previous && current > vwap;

        Self {
            vwap,
            retest,
            bounce,
        }
    }

    /// Both retest and bounce hold
    pub fn confirmed(&self) -> bool {
        self.retest && self.bounce
    }
}

/// Inputs for one explosion-odds update
#[derive(Debug, Clone, Copy, Default)]
pub struct OddsInputs {
    pub sample_count: usize,
    pub volume_acceleration: f64,
    pub bullish_pattern: bool,
    pub vwap_confirmed: bool,
    pub rsi: f64,
    pub rsi_overbought: f64,
    pub recent_false_signals: usize,
}

/// First-order filter over the explosion odds (0-100)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExplosionOdds {
    previous: f64,
}

impl ExplosionOdds {
    /// Weight applied to the previous value.
    const CARRY_OVER: f64 = 0.3;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f64 {
        self.previous
    }

    /// Blend fresh evidence with the previous odds and store the result.
    pub fn update(&mut self, inputs: OddsInputs) -> f64 {
        if inputs.sample_count < MIN_ODDS_POINTS {
            self.previous = 0.0;
            return 0.0;
        }

        let mut odds = (self.previous / 100.0) * Self::CARRY_OVER;
        odds += (inputs.volume_acceleration * 0.5).min(0.3);

        if inputs.bullish_pattern {
            odds += 0.15;
        }
        if inputs.vwap_confirmed {
            odds += 0.15;
        }

        if inputs.rsi < inputs.rsi_overbought - 10.0 {
            odds += 0.1;
        } else if inputs.rsi > inputs.rsi_overbought {
            odds -= 0.2;
        }

        odds -= (inputs.recent_false_signals as f64 * 0.05).min(0.2);

        self.previous = (odds * 100.0).clamp(0.0, 100.0);
        self.previous
    }

    pub fn reset(&mut self) {
        self.previous = 0.0;
    }
}
