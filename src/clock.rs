//! Millisecond tick arithmetic and the cached wall clock.
//!
//! Every timer in the controller is a 32-bit millisecond [`Tick`] taken
//! from a free-running counter that wraps roughly every 49.7 days.
//! [`elapsed_since`] is the only place where two ticks are subtracted.
//!
//! ```text
//!  start                      u32::MAX │ 0                 now
//!    ├─────── (MAX - start) ───────────┼───── now + 1 ─────┤
//! ```
//!
//! The wall clock is never read from an RTC: the backend stamps its
//! messages with an ISO-8601 time and [`WallClock`] extrapolates from the
//! last one it saw using the tick counter.

use core::fmt::Write;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::MessageError;

/// Monotonic milliseconds since boot, truncated to 32 bits.
pub type Tick = u32;

/// Milliseconds from `start` to `now`, correct across one counter wrap.
///
/// Equivalent to `now - start` when `now >= start`, and to
/// `(Tick::MAX - start) + now + 1` after the counter has wrapped.
#[inline]
pub const fn elapsed_since(now: Tick, start: Tick) -> Tick {
    now.wrapping_sub(start)
}

/// Rendered timestamp, e.g. `2025-03-01T12:00:02.500Z`.
pub type Timestamp = heapless::String<32>;

// ── WallClock ─────────────────────────────────────────────────

/// Server time anchored to the local tick counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WallClock {
    anchor: Option<Anchor>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Anchor {
    epoch_ms: i64,
    at: Tick,
}

impl WallClock {
    pub const fn new() -> Self {
        Self { anchor: None }
    }

    /// Adopt `iso` as the current time at tick `now`.
    ///
    /// Accepts `YYYY-MM-DDTHH:MM:SS`, optionally followed by a fraction and
    /// a trailing `Z`. A rejected string leaves the previous anchor intact.
    pub fn sync(&mut self, iso: &str, now: Tick) -> Result<(), MessageError> {
        let epoch_ms = parse_iso8601_ms(iso).ok_or(MessageError::BadTimestamp)?;
        self.anchor = Some(Anchor { epoch_ms, at: now });
        Ok(())
    }

    pub fn is_synced(&self) -> bool {
        self.anchor.is_some()
    }

    /// Unix milliseconds at tick `now`, if a sync has happened.
    pub fn epoch_ms(&self, now: Tick) -> Option<i64> {
        self.anchor
            .map(|a| a.epoch_ms + i64::from(elapsed_since(now, a.at)))
    }

    /// ISO-8601 rendering at tick `now`; empty until the first sync.
    pub fn timestamp(&self, now: Tick) -> Timestamp {
        let mut out = Timestamp::new();
        if let Some(dt) = self.epoch_ms(now).and_then(DateTime::<Utc>::from_timestamp_millis) {
            // 24 characters always fit.
            let _ = write!(out, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.3fZ"));
        }
        out
    }
}

// ── Parsing ───────────────────────────────────────────────────

/// `YYYY-MM-DDTHH:MM:SS[.fff][Z]`, `T` or space between date and time.
/// The fraction may carry any number of digits; only UTC is accepted.
fn parse_iso8601_ms(s: &str) -> Option<i64> {
    let s = s.trim();
    let s = s.strip_suffix('Z').unwrap_or(s);
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.and_utc().timestamp_millis())
}
