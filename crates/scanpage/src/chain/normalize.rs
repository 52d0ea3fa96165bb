//! Normalization of time bounds, provider timestamps and block ranges.

use crate::chain::Chain;
use crate::collect::{BlockRange, TimeWindow};
use serde_json::Value;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

const SECS_PER_DAY: i64 = 86_400;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("invalid time: {0}")]
    InvalidTime(String),
    #[error("invalid timestamp field: {0}")]
    InvalidTimestamp(String),
}

/// Parse a window bound: Unix seconds, `YYYY-MM-DD` (midnight UTC) or RFC3339.
pub fn parse_time_bound(s: &str) -> Result<i64, NormalizeError> {
    let s = s.trim();
    if let Ok(ts) = s.parse::<i64>() {
        return Ok(ts);
    }
    if let Ok(date) = Date::parse(s, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_utc().unix_timestamp());
    }
    let dt = OffsetDateTime::parse(s, &Rfc3339)
        .map_err(|e| NormalizeError::InvalidTime(format!("{s}: {e}")))?;
    Ok(dt.unix_timestamp())
}

/// Read a provider Unix-time field. Accounts endpoints send decimal strings, logs send `0x` hex.
pub fn parse_unix_field(value: &Value) -> Result<i64, NormalizeError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| NormalizeError::InvalidTimestamp(n.to_string())),
        Value::String(s) => {
            let s = s.trim();
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => s.parse::<i64>(),
            };
            parsed.map_err(|_| NormalizeError::InvalidTimestamp(s.to_string()))
        }
        other => Err(NormalizeError::InvalidTimestamp(other.to_string())),
    }
}

/// `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn format_datetime(ts: i64) -> Result<String, NormalizeError> {
    let dt = OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|_| NormalizeError::InvalidTimestamp(ts.to_string()))?;
    dt.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .map_err(|e| NormalizeError::InvalidTimestamp(e.to_string()))
}

/// Window covering the last `days` days up to `now`. Zero days means no window.
pub fn lookback_window(days: u32, now: OffsetDateTime) -> Option<TimeWindow> {
    if days == 0 {
        return None;
    }
    let end = now.unix_timestamp();
    Some(TimeWindow::new(end - i64::from(days) * SECS_PER_DAY, end))
}

/// Narrow a block range to roughly cover `window`, counting back from `head` at the
/// chain's nominal block rate. Only the start block moves; client-side time filtering
/// still decides which records are kept.
pub fn estimate_block_range(
    window: &TimeWindow,
    chain: Chain,
    head: u64,
    now: OffsetDateTime,
) -> BlockRange {
    let span_secs = (now.unix_timestamp() - window.start).max(0) as u64;
    let blocks_back = span_secs.saturating_mul(chain.approx_blocks_per_day()) / SECS_PER_DAY as u64;
    BlockRange::new(head.saturating_sub(blocks_back), head)
}
