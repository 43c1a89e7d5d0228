//! Row codec for the remote sheet.
//!
//! Layout (one timer per row, fixed header in row 1):
//!
//! | id | name | referenceDurationSeconds | elapsedSeconds | running | lastUpdated |
//!
//! The sheet may hand values back as strings or numbers depending on how
//! the cells were edited, so decoding accepts both. Rows that cannot be
//! decoded are skipped individually.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SyncError;
use crate::timer::Timer;

pub const HEADER: [&str; 6] = [
    "id",
    "name",
    "referenceDurationSeconds",
    "elapsedSeconds",
    "running",
    "lastUpdated",
];

pub fn header_row() -> Vec<Value> {
    HEADER.iter().map(|h| Value::String((*h).to_string())).collect()
}

/// Encode a timer as of `now`. Running timers report their live elapsed.
pub fn encode_row(timer: &Timer, now: DateTime<Utc>) -> Vec<Value> {
    let elapsed_secs = timer.current_elapsed_ms(now) as f64 / 1000.0;
    vec![
        Value::String(timer.id.to_string()),
        Value::String(timer.name.clone()),
        Value::from(timer.reference_duration_secs),
        serde_json::Number::from_f64(elapsed_secs)
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(0)),
        Value::String(if timer.running { "TRUE" } else { "FALSE" }.to_string()),
        Value::String(now.to_rfc3339()),
    ]
}

/// The full sheet body: header followed by one row per timer.
pub fn encode_rows(timers: &[Timer], now: DateTime<Utc>) -> Vec<Vec<Value>> {
    std::iter::once(header_row())
        .chain(timers.iter().map(|t| encode_row(t, now)))
        .collect()
}

/// Decode one row. `Ok(None)` for the header and blank rows.
///
/// Decoded timers are idle: the remote running flag is informational and
/// never starts a local timer.
pub fn decode_row(index: usize, row: &[Value]) -> Result<Option<Timer>, SyncError> {
    let fail = |reason: String| SyncError::DecodeFailure { row: index, reason };

    if row.iter().all(is_blank) {
        return Ok(None);
    }
    if text(row.first()).as_deref() == Some(HEADER[0]) {
        return Ok(None);
    }

    let id_text = text(row.first()).ok_or_else(|| fail("missing id".into()))?;
    let id = Uuid::parse_str(id_text.trim()).map_err(|e| fail(format!("bad id '{id_text}': {e}")))?;

    let name = text(row.get(1)).unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Err(fail("empty name".into()));
    }

    let reference_secs = match row.get(2).filter(|v| !is_blank(v)) {
        None => 0.0,
        Some(v) => seconds(v).ok_or_else(|| fail(format!("bad reference duration {v}")))?,
    };
    let elapsed_secs = match row.get(3).filter(|v| !is_blank(v)) {
        None => 0.0,
        Some(v) => seconds(v).ok_or_else(|| fail(format!("bad elapsed {v}")))?,
    };

    Ok(Some(Timer {
        id,
        name,
        reference_duration_secs: reference_secs.round() as u64,
        accumulated_ms: (elapsed_secs * 1000.0).round() as u64,
        running: false,
        run_started_at: None,
        last_reset_at: None,
    }))
}

/// Decode every row, logging and skipping the malformed ones.
pub fn decode_rows(rows: &[Vec<Value>]) -> Vec<Timer> {
    rows.iter()
        .enumerate()
        .filter_map(|(index, row)| match decode_row(index, row) {
            Ok(timer) => timer,
            Err(e) => {
                tracing::warn!(error = %e, "skipping remote row");
                None
            }
        })
        .collect()
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A non-negative, finite number of seconds.
fn seconds(value: &Value) -> Option<f64> {
    let secs = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (secs.is_finite() && secs >= 0.0).then_some(secs)
}
