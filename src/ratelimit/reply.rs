//! Decoding of decision script replies.
//!
//! This is the only place that sees the loosely typed wire reply; everything
//! past [`decode`] works with [`RateLimitResult`].

use std::time::Duration;

use redis::Value;

use super::limit::{Limit, RateLimitResult};
use super::script::NO_RETRY;
use crate::error::{RedrateError, Result};

/// Decode a four-element script reply into a result for `limit`.
pub fn decode(limit: Limit, reply: Value) -> Result<RateLimitResult> {
    let items = match reply {
        Value::Bulk(items) => items,
        other => return Err(malformed(format!("expected an array, got {:?}", other))),
    };

    let [allowed, remaining, retry_after, reset_after]: [Value; 4] =
        items.try_into().map_err(|items: Vec<Value>| {
            malformed(format!("expected 4 elements, got {}", items.len()))
        })?;

    let allowed = count("allowed", allowed)?;
    let remaining = count("remaining", remaining)?.min(limit.burst);
    let retry_after = match seconds("retry_after", retry_after)? {
        s if s == NO_RETRY => None,
        s => Some(duration("retry_after", s)?),
    };
    let reset_after = duration("reset_after", seconds("reset_after", reset_after)?)?;

    Ok(RateLimitResult {
        limit,
        allowed,
        remaining,
        retry_after,
        reset_after,
    })
}

fn malformed(msg: String) -> RedrateError {
    RedrateError::MalformedReply(msg)
}

fn count(field: &str, value: Value) -> Result<u64> {
    match value {
        Value::Int(n) => u64::try_from(n)
            .map_err(|_| malformed(format!("{} is negative: {}", field, n))),
        other => Err(malformed(format!("{} is not an integer: {:?}", field, other))),
    }
}

fn seconds(field: &str, value: Value) -> Result<f64> {
    let text = match value {
        Value::Data(bytes) => String::from_utf8(bytes)
            .map_err(|_| malformed(format!("{} is not valid UTF-8", field)))?,
        Value::Status(text) => text,
        other => return Err(malformed(format!("{} is not a string: {:?}", field, other))),
    };
    text.trim()
        .parse::<f64>()
        .map_err(|_| malformed(format!("{} is not a number: {:?}", field, text)))
}

fn duration(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| malformed(format!("{} is not a valid duration: {}", field, secs)))
}
