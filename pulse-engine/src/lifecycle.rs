//! Trade-lifecycle narrative layered over the alert states.
//!
//! Once an alert opens a trade the lifecycle reassures while accumulation holds,
//! watches for a confirmed dump with hysteresis, repeats an exit alert a bounded
//! number of times and force-closes the trade after 30 minutes.

use crate::{config::DetectorConfig, types::TimestampMs};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Hard exit after this long in a trade.
pub const MAX_TRADE_DURATION_MS: TimestampMs = 30 * 60 * 1000;

/// Score above which an inactive accumulation resumes.
pub const RESUME_SCORE: f64 = 75.0;

/// Score below which the dump test runs.
pub const WEAKENING_SCORE: f64 = 60.0;

/// End alerts stop repeating after this many.
pub const MAX_END_ALERTS: u32 = 5;

/// Dump conditions required out of three.
const MIN_DUMP_CONDITIONS: usize = 2;

const REASSURANCE_MESSAGES: [&str; 5] = [
    "Accumulation still strong, hold position",
    "Smart money still accumulating, be patient",
    "Whale activity confirms accumulation, stay in trade",
    "Patterns indicate continuation, do not sell early",
    "Momentum rising steadily",
];

const END_MESSAGES: [&str; 4] = [
    "Accumulation has ended, consider exiting",
    "Dump confirmed, protect profits",
    "Panic selling detected, exit position",
    "Whales are selling, time to exit",
];

/// Lifecycle transitions surfaced to the notification collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Reassurance { sequence: u32 },
    Resumed,
    Ended,
    EndReminder { count: u32 },
    TradeExpired,
}

impl LifecycleEvent {
    pub fn message(&self) -> &'static str {
        match self {
            LifecycleEvent::Reassurance { sequence } => {
                REASSURANCE_MESSAGES[*sequence as usize % REASSURANCE_MESSAGES.len()]
            }
            LifecycleEvent::Resumed => "Accumulation resumed, hold position",
            LifecycleEvent::Ended => "Accumulation ended, exit position",
            LifecycleEvent::EndReminder { count } => {
                END_MESSAGES[*count as usize % END_MESSAGES.len()]
            }
            LifecycleEvent::TradeExpired => "Trade duration expired, consider exiting position",
        }
    }
}

/// The three dump conditions for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DumpCheck {
    pub sell_pressure: f64,
    pub volume: f64,
    /// Average of the last 5 volumes
    pub average_volume: f64,
    pub supply_absorption: bool,
}

impl DumpCheck {
    /// At least two of: heavy sell pressure, panic volume, no supply absorption.
    pub fn confirmed(&self, config: &DetectorConfig) -> bool {
        let conditions = [
            self.sell_pressure > config.dump_confirmation_threshold,
            self.volume > self.average_volume * config.panic_sell_volume_multiplier,
            !self.supply_absorption,
        ];
        conditions.iter().filter(|c| **c).count() >= MIN_DUMP_CONDITIONS
    }
}

/// Hysteresis sub-state of an open trade
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeLifecycle {
    pub in_trade: bool,
    pub accumulation_active: bool,
    pub end_alert_active: bool,
    /// Consecutive-dump counter, decremented (floored at 0) on non-dump ticks
    pub end_counter: f64,
    pub trade_start_time: Option<TimestampMs>,
    pub last_reassurance: Option<TimestampMs>,
    pub end_alert_count: u32,
    pub end_last_alert: Option<TimestampMs>,
    reassurance_sequence: u32,
}

impl TradeLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// An alert fired: enter (or restart) the trade with accumulation active.
    pub fn open(&mut self, now: TimestampMs) {
        if !self.in_trade {
            info!("trade opened");
        }
        self.in_trade = true;
        self.trade_start_time = Some(now);
        self.accumulation_active = true;
        self.end_alert_active = false;
    }

    /// Advance the narrative for one tick. No-op outside a trade.
    pub fn update(
        &mut self,
        now: TimestampMs,
        score: f64,
        dump: &DumpCheck,
        config: &DetectorConfig,
    ) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        if !self.in_trade {
            return events;
        }
        let interval_elapsed = |last: Option<TimestampMs>| {
            last.map(|t| now - t > config.reassurance_interval)
                .unwrap_or(true)
        };

        if self.accumulation_active && interval_elapsed(self.last_reassurance) {
            events.push(LifecycleEvent::Reassurance {
                sequence: self.reassurance_sequence,
            });
            self.reassurance_sequence = self.reassurance_sequence.wrapping_add(1);
            self.last_reassurance = Some(now);
        }

        if score > RESUME_SCORE && !self.accumulation_active {
            self.accumulation_active = true;
            self.end_alert_active = false;
            self.last_reassurance = Some(now);
            info!(score, "accumulation resumed");
            events.push(LifecycleEvent::Resumed);
        } else if score < WEAKENING_SCORE && self.accumulation_active {
            if dump.confirmed(config) {
                self.end_counter += 1.0;
                if self.end_counter >= config.accumulation_end_confirmation {
                    self.accumulation_active = false;
                    self.end_counter = 0.0;
                    self.end_alert_active = true;
                    self.end_alert_count = 0;
                    self.end_last_alert = Some(now);
                    info!(score, "accumulation ended");
                    events.push(LifecycleEvent::Ended);
                }
            } else {
                self.end_counter = (self.end_counter - 1.0).max(0.0);
            }
        } else {
            self.end_counter = 0.0;
        }

        if self.end_alert_active && interval_elapsed(self.end_last_alert) {
            self.end_alert_count += 1;
            self.end_last_alert = Some(now);
            events.push(LifecycleEvent::EndReminder {
                count: self.end_alert_count,
            });
            if self.end_alert_count >= MAX_END_ALERTS {
                self.end_alert_active = false;
            }
        }

        if self
            .trade_start_time
            .is_some_and(|start| now - start > MAX_TRADE_DURATION_MS)
        {
            self.in_trade = false;
            self.accumulation_active = false;
            self.end_alert_active = false;
            info!("trade expired");
            events.push(LifecycleEvent::TradeExpired);
        }

        events
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
