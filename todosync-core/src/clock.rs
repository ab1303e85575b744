//! Clock normalization.
//!
//! Two encodings are recognised:
//!
//! ```text
//! 2020-03-22T14:33:23Z    remote (server-side, UTC)
//! 2020-03-22 14:33:23     local-derived (local wall clock)
//! ```
//!
//! Remote-sourced instants are shifted by the configured UTC offset so they
//! land on the local wall clock; local instants are never shifted.

use std::time::SystemTime;

use chrono::{DateTime, Duration, Local, NaiveDateTime, Timelike};

use crate::error::ClockError;
use crate::types::{Side, Stamp};

const REMOTE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
const LOCAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Converts raw timestamps from either side into comparable [`Stamp`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockNormalizer {
    remote_offset: Duration,
}

impl ClockNormalizer {
    /// Normalizer with an explicit remote offset (local time minus UTC).
    pub fn new(remote_offset: Duration) -> Self {
        Self { remote_offset }
    }

    /// Normalizer using the offset in minutes, or the system's current local
    /// offset when `None`.
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        let offset = match minutes {
            Some(m) => Duration::minutes(i64::from(m)),
            None => Duration::seconds(i64::from(Local::now().offset().local_minus_utc())),
        };
        Self::new(offset)
    }

    pub fn remote_offset(&self) -> Duration {
        self.remote_offset
    }

    /// Parse `raw` in either recognised encoding and normalize it for `origin`.
    pub fn normalize(&self, raw: &str, origin: Side) -> Result<Stamp, ClockError> {
        let raw = raw.trim();
        let parsed = NaiveDateTime::parse_from_str(raw, REMOTE_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, LOCAL_FORMAT))
            .map_err(|source| ClockError::Unrecognised {
                raw: raw.to_string(),
                source,
            })?;
        Ok(self.shift(parsed, origin))
    }

    /// Local filesystem modification time, truncated to whole seconds.
    pub fn local_from_system(&self, time: SystemTime) -> Stamp {
        let local: DateTime<Local> = time.into();
        let naive = local.naive_local();
        Stamp(naive.with_nanosecond(0).unwrap_or(naive))
    }

    fn shift(&self, naive: NaiveDateTime, origin: Side) -> Stamp {
        match origin {
            Side::Local => Stamp(naive),
            Side::Remote => Stamp(naive + self.remote_offset),
        }
    }
}

/// Format a stamp in the local-derived encoding.
pub fn format_local(stamp: Stamp) -> String {
    stamp.0.format(LOCAL_FORMAT).to_string()
}
