mod message;
mod session;
mod user;

pub use message::*;
pub use session::*;
pub use user::*;

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp as fixed-width RFC 3339 UTC with microseconds,
/// e.g. `2026-10-16T09:54:01.123456Z`. Lexical order equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time truncated to the microsecond precision used in storage.
pub fn now_micros() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// Parse a timestamp written by [`format_timestamp`] (any RFC 3339 offset is accepted).
pub fn parse_timestamp(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
