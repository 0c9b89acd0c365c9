//! Signal history export.
//!
//! The history serialises either as a JSON array of
//! `{time, price, type, success, confidence}` objects or as CSV with the header
//! `Time,Price,Type,Success,Confidence`.

use crate::{
    error::EngineError,
    learner::{Signal, SignalKind},
    types::{TimestampMs, to_datetime},
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// CSV header row.
pub const CSV_HEADER: &str = "Time,Price,Type,Success,Confidence";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// Default output file name for this format.
    pub fn file_name(&self) -> String {
        format!("signal_history.{}", self.extension())
    }
}

#[derive(Debug, Serialize)]
struct ExportRecord {
    time: TimestampMs,
    price: f64,
    #[serde(rename = "type")]
    kind: SignalKind,
    success: Option<bool>,
    confidence: f64,
}

impl From<&Signal> for ExportRecord {
    fn from(signal: &Signal) -> Self {
        Self {
            time: signal.time,
            price: signal.price,
            kind: signal.kind,
            success: signal.success,
            confidence: signal.confidence,
        }
    }
}

/// Render the history in the requested format.
pub fn export_history(format: ExportFormat, signals: &[Signal]) -> Result<String, EngineError> {
    match format {
        ExportFormat::Json => export_json(signals),
        ExportFormat::Csv => Ok(export_csv(signals)),
    }
}

/// Pretty-printed JSON array, one object per signal.
pub fn export_json(signals: &[Signal]) -> Result<String, EngineError> {
    let records = signals.iter().map(ExportRecord::from).collect::<Vec<_>>();
    Ok(serde_json::to_string_pretty(&records)?)
}

/// CSV with ISO-8601 UTC timestamps. Pending signals leave `Success` empty.
pub fn export_csv(signals: &[Signal]) -> String {
    let mut csv = String::with_capacity(CSV_HEADER.len() + 1 + signals.len() * 64);
    csv.push_str(CSV_HEADER);
    csv.push('\n');

    for signal in signals {
        let time = to_datetime(signal.time).to_rfc3339_opts(SecondsFormat::Millis, true);
        let success = signal.success.map(|s| s.to_string()).unwrap_or_default();
        let _ = writeln!(
            csv,
            "{},{},{},{},{}",
            time, signal.price, signal.kind, success, signal.confidence
        );
    }

    csv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::ConditionSet;

    fn signal(time: TimestampMs, kind: SignalKind, success: Option<bool>) -> Signal {
        let mut signal = Signal::new(time, 0.0025, kind, 93.5, ConditionSet::default(), 30_000);
        signal.success = success;
        signal
    }

    #[test]
    fn test_export_csv_rows() {
        let history = vec![
            signal(1_700_000_000_000, SignalKind::Accumulation, Some(true)),
            signal(1_700_000_001_500, SignalKind::HyperspeedExplosion, None),
        ];

        let csv = export_csv(&history);
        let lines = csv.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "2023-11-14T22:13:20.000Z,0.0025,accumulation,true,93.5");
        assert_eq!(
            lines[2],
            "2023-11-14T22:13:21.500Z,0.0025,hyperspeed_explosion,,93.5"
        );
    }

    #[test]
    fn test_export_csv_empty_history() {
        assert_eq!(export_csv(&[]), format!("{CSV_HEADER}\n"));
    }

    #[test]
    fn test_export_json_fields() {
        let history = vec![signal(1_000, SignalKind::MegaAccumulation, Some(false))];
        let json = export_history(ExportFormat::Json, &history).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        let record = &value[0];
        assert_eq!(record["time"], 1_000);
        assert_eq!(record["type"], "mega_accumulation");
        assert_eq!(record["success"], false);
        assert_eq!(record["confidence"], 93.5);
        assert!(record.get("activeConditions").is_none());
    }

    #[test]
    fn test_export_format_file_name() {
        assert_eq!(ExportFormat::Csv.file_name(), "signal_history.csv");
        assert_eq!(
            serde_json::from_str::<ExportFormat>(r#""csv""#).unwrap(),
            ExportFormat::Csv
        );
    }
}
