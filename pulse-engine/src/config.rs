//! Detector configuration.
//!
//! Every threshold the engine consults lives here. The serialised form keeps the
//! camelCase key names of the persisted settings record, and every field falls back
//! to its default, so a partial saved record merges over the defaults.

use crate::export::ExportFormat;
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

/// Buffer capacity used outside scalping mode.
pub const STANDARD_HISTORY_SIZE: usize = 60;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorConfig {
    // Core detection
    pub scan_interval: u64,
    pub min_accumulation_score: f64,
    pub volume_spike_multiplier: f64,
    pub min_whale_net_flow: f64,
    pub min_accumulation_buy: f64,
    pub accumulation_ratio_threshold: f64,
    pub whale_activity_threshold: f64,
    pub pro_trader_min_amount: f64,
    pub cluster_time_window: i64,
    pub min_cluster_size: usize,
    pub explosion_threshold: f64,
    pub hyperspeed_threshold: f64,
    pub min_strength_duration: i64,
    pub confirmation_candles: usize,
    pub min_volume_for_signal: f64,
    pub cooldown_period: i64,
    pub volatility_threshold: f64,
    pub consolidation_period: usize,

    // Shockwave
    pub shockwave_threshold: f64,
    pub shockwave_duration: i64,
    pub explosion_odds_factor: f64,
    pub max_false_signal_history: usize,
    pub rsi_overbought_threshold: f64,
    pub rsi_oversold_threshold: f64,
    pub vwap_retest_threshold: f64,
    pub vwap_bounce_threshold: f64,
    pub timeframe_convergence_threshold: f64,

    // Scalping mode
    pub scalping_mode: bool,
    /// Seconds between ticks in scalping mode
    pub scalping_timeframe: u64,
    pub instant_buy_pressure_threshold: f64,
    pub min_instant_volume_ratio: f64,
    pub max_history_size: usize,

    // Scalping pattern thresholds
    pub micro_range_threshold: f64,
    pub vdu_spike_threshold: f64,
    pub flash_absorption_ratio: f64,
    pub trap_run_volume_ratio: f64,
    pub shakeout_bar_threshold: f64,
    pub supply_absorption_ratio: f64,
    pub volume_staircase_min_steps: usize,
    pub darvas_box_size: f64,
    pub box_breakout_threshold: f64,
    pub hidden_divergence_period: usize,

    // Accumulation end detection
    pub dump_confirmation_threshold: f64,
    pub panic_sell_volume_multiplier: f64,
    pub accumulation_end_confirmation: f64,
    pub reassurance_interval: i64,

    // Mega accumulation
    pub mega_accumulation_threshold: f64,
    pub mega_pro_traders_threshold: f64,
    pub mega_buy_volume_threshold: f64,
    pub mega_volatility_threshold: f64,
    pub mega_pattern_weight: f64,
    pub mega_volume_ratio: f64,
    pub mega_accumulation_cooldown: i64,

    /// Enables the trade-lifecycle narrative
    #[serde(rename = "NovaPulseAlert")]
    pub nova_pulse_alert: bool,

    // Instant explosion / learning
    pub hyperspeed_detection_window: usize,
    pub hyperspeed_confidence_threshold: f64,
    pub instant_explosion_prediction_seconds: i64,
    pub ml_success_threshold: f64,
    pub ml_evaluation_period: i64,
    pub export_history_format: ExportFormat,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            scan_interval: 500,
            min_accumulation_score: 92.0,
            volume_spike_multiplier: 2.8,
            min_whale_net_flow: 6000.0,
            min_accumulation_buy: 120_000.0,
            accumulation_ratio_threshold: 3.25,
            whale_activity_threshold: 6500.0,
            pro_trader_min_amount: 6000.0,
            cluster_time_window: 4500,
            min_cluster_size: 5,
            explosion_threshold: 1.028,
            hyperspeed_threshold: 1.012,
            min_strength_duration: 3200,
            confirmation_candles: 2,
            min_volume_for_signal: 12_500.0,
            cooldown_period: 5000,
            volatility_threshold: 0.15,
            consolidation_period: 5,

            shockwave_threshold: 0.85,
            shockwave_duration: 3000,
            explosion_odds_factor: 0.75,
            max_false_signal_history: 20,
            rsi_overbought_threshold: 70.0,
            rsi_oversold_threshold: 30.0,
            vwap_retest_threshold: 0.01,
            vwap_bounce_threshold: 0.005,
            timeframe_convergence_threshold: 0.7,

            scalping_mode: true,
            scalping_timeframe: 5,
            instant_buy_pressure_threshold: 0.75,
            min_instant_volume_ratio: 3.0,
            max_history_size: 120,

            micro_range_threshold: 0.008,
            vdu_spike_threshold: 4.5,
            flash_absorption_ratio: 2.2,
            trap_run_volume_ratio: 3.0,
            shakeout_bar_threshold: 0.05,
            supply_absorption_ratio: 1.8,
            volume_staircase_min_steps: 3,
            darvas_box_size: 0.015,
            box_breakout_threshold: 1.02,
            hidden_divergence_period: 10,

            dump_confirmation_threshold: 0.60,
            panic_sell_volume_multiplier: 3.0,
            accumulation_end_confirmation: 2.5,
            reassurance_interval: 10_000,

            mega_accumulation_threshold: 95.0,
            mega_pro_traders_threshold: 15.0,
            mega_buy_volume_threshold: 250_000.0,
            mega_volatility_threshold: 0.08,
            mega_pattern_weight: 0.85,
            mega_volume_ratio: 4.2,
            mega_accumulation_cooldown: 30_000,

            nova_pulse_alert: true,

            hyperspeed_detection_window: 3,
            hyperspeed_confidence_threshold: 0.85,
            instant_explosion_prediction_seconds: 3,
            ml_success_threshold: 0.02,
            ml_evaluation_period: 30_000,
            export_history_format: ExportFormat::Json,
        }
    }
}

impl DetectorConfig {
    /// Sliding-window capacity for the current operating mode.
    pub fn history_capacity(&self) -> usize {
        if self.scalping_mode {
            self.max_history_size.max(1)
        } else {
            STANDARD_HISTORY_SIZE
        }
    }

    /// Time between ticks for the current operating mode.
    pub fn tick_interval(&self) -> Duration {
        let millis = if self.scalping_mode {
            self.scalping_timeframe.saturating_mul(1000)
        } else {
            self.scan_interval
        };
        Duration::from_millis(millis.max(1))
    }

    /// Decode a saved record, merging it over the defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Read an environment variable, falling back to `default` when unset or unparsable.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_record_merges_over_defaults() {
        let config = DetectorConfig::from_json(
            r#"{"minAccumulationScore": 80, "scalpingMode": false, "NovaPulseAlert": false}"#,
        )
        .unwrap();

        assert_eq!(config.min_accumulation_score, 80.0);
        assert!(!config.scalping_mode);
        assert!(!config.nova_pulse_alert);
        assert_eq!(config.cooldown_period, 5000);
        assert_eq!(config.export_history_format, ExportFormat::Json);
    }

    #[test]
    fn test_history_capacity_by_mode() {
        let mut config = DetectorConfig::default();
        assert_eq!(config.history_capacity(), 120);

        config.scalping_mode = false;
        assert_eq!(config.history_capacity(), STANDARD_HISTORY_SIZE);
    }

    #[test]
    fn test_tick_interval_by_mode() {
        let mut config = DetectorConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(5));

        config.scalping_mode = false;
        assert_eq!(config.tick_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_serialised_keys_use_saved_names() {
        let value = serde_json::to_value(DetectorConfig::default()).unwrap();
        assert!(value.get("mlEvaluationPeriod").is_some());
        assert!(value.get("NovaPulseAlert").is_some());
        assert_eq!(value["exportHistoryFormat"], "json");
    }

    #[test]
    fn test_env_var_or_default() {
        assert_eq!(env_var_or("PULSE_TEST_UNSET_VARIABLE", 42usize), 42);
    }
}
