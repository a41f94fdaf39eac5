//! Freshness filtering and signature-tag stripping.

use chrono::{DateTime, FixedOffset, Utc};

use crate::client::Message;

/// Signature tag stripped from every forwarded message.
pub const SIGNATURE_TAG: &str = "Published By: @last_satoshi";

/// Keep the messages worth forwarding from one fetched batch.
///
/// Input is newest-first (as fetched); output is oldest-first so sends
/// preserve the original chronological order. A message survives iff it has
/// non-empty text and its timestamp lies strictly within `window_secs` of
/// now. "Now" is taken in the timezone of the first message, which is the
/// channel's timezone for the whole batch. Surrounding whitespace is left
/// untouched after tag removal.
pub fn filter_new(window_secs: u64, messages: &[Message]) -> Vec<String> {
    let Some(first) = messages.first() else {
        return Vec::new();
    };
    let now: DateTime<FixedOffset> = Utc::now().with_timezone(first.date.offset());
    let window_ms = window_secs as i64 * 1000;

    let mut fresh: Vec<String> = messages
        .iter()
        .filter(|m| {
            now.signed_duration_since(m.date)
                .num_milliseconds()
                .abs()
                < window_ms
        })
        .filter_map(|m| m.text.as_deref())
        .filter(|t| !t.is_empty())
        .map(|t| t.replace(SIGNATURE_TAG, ""))
        .collect();

    fresh.reverse();
    fresh
}
