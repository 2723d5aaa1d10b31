//! Message payloads sent to destinations.
//!
//! One JSON object per delivered truth or reading:
//!
//! ```text
//! {"meta":"<assembly>:<view>","signal":"s","value":5,
//!  "event_time":"2024-01-01 00:00:01","arrival_time":"2024-01-01 00:00:01.250000"}
//! ```
//!
//! `arrival_time` is present on readings only.

use crate::error::{RunError, RunResult};
use chrono::{NaiveDateTime, Timelike};
use iotsim_core::Value;
use iotsim_env::DataView;
use serde::{Deserialize, Serialize};

/// Wire format of outgoing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Json,
}

/// A single outgoing message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub meta: String,
    pub signal: String,
    pub value: Value,
    pub event_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<String>,
}

impl Message {
    pub fn truth(assembly: &str, signal: &str, value: &Value, event_time: NaiveDateTime) -> Self {
        Self {
            meta: meta(assembly, DataView::Truth),
            signal: signal.to_string(),
            value: value.clone(),
            event_time: format_timestamp(&event_time),
            arrival_time: None,
        }
    }

    pub fn reading(
        assembly: &str,
        signal: &str,
        value: &Value,
        event_time: NaiveDateTime,
        arrival_time: NaiveDateTime,
    ) -> Self {
        Self {
            meta: meta(assembly, DataView::Reading),
            signal: signal.to_string(),
            value: value.clone(),
            event_time: format_timestamp(&event_time),
            arrival_time: Some(format_timestamp(&arrival_time)),
        }
    }

    pub fn encode(&self, format: MessageFormat) -> RunResult<String> {
        match format {
            MessageFormat::Json => {
                serde_json::to_string(self).map_err(|e| RunError::Encode(e.to_string()))
            }
        }
    }
}

fn meta(assembly: &str, view: DataView) -> String {
    format!("{}:{}", assembly, view)
}

/// `YYYY-MM-DD HH:MM:SS`, with microseconds only when the time has a fraction.
pub fn format_timestamp(t: &NaiveDateTime) -> String {
    if t.nanosecond() == 0 {
        t.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        t.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Seconds as a microsecond-resolution duration; `None` when out of range.
pub fn try_seconds(secs: f64) -> Option<chrono::Duration> {
    let micros = (secs * 1e6).round();
    // i64::MAX as f64 rounds up to 2^63, so the bound is exclusive
    if micros.is_finite() && micros.abs() < i64::MAX as f64 {
        Some(chrono::Duration::microseconds(micros as i64))
    } else {
        None
    }
}

/// `t` shifted by `secs`; `None` when the result leaves chrono's range.
pub fn shift_timestamp(t: NaiveDateTime, secs: f64) -> Option<NaiveDateTime> {
    try_seconds(secs).and_then(|d| t.checked_add_signed(d))
}

/// Parses the timestamp forms accepted for `start_time`.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s.trim(), f).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
