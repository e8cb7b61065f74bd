use std::cmp::Ordering;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// A `(utc-instant, uniquifier)` pair. Ordering is lexicographic: instant
/// first, uniquifier second. Two timestamps from the same [`TimestampSource`]
/// are always strictly increasing under this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub instant: DateTime<Utc>,
    pub uniquifier: u8,
}

impl Timestamp {
    pub fn new(instant: DateTime<Utc>, uniquifier: u8) -> Self {
        Self { instant, uniquifier }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant
            .cmp(&other.instant)
            .then(self.uniquifier.cmp(&other.uniquifier))
    }
}

/// Issues strictly-increasing [`Timestamp`]s for a single source (a monitor,
/// or the process-wide external-log path).
///
/// The uniquifier saturates at `u8::MAX` rather than wrapping if more than
/// 256 timestamps are requested within the same instant: wrapping would
/// silently violate the strictly-increasing invariant, while saturating only
/// degrades to "no longer distinct within this instant", which downstream
/// readers already tolerate (duplicate timestamps sort stably by arrival
/// order in any single file).
#[derive(Debug, Default)]
pub struct TimestampSource {
    last: Mutex<Option<Timestamp>>,
}

impl TimestampSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes the next timestamp given the current wall-clock time.
    ///
    /// `now` is truncated to millisecond resolution before comparison and
    /// storage: the wire format (`write_timestamp`) only persists
    /// `timestamp_millis()`, so comparing at full nanosecond resolution would
    /// let two sub-millisecond-apart instants both keep uniquifier 0 and
    /// collide to an equal `(millis, uniquifier)` pair once round-tripped
    /// through the codec.
    pub fn next(&self, now: DateTime<Utc>) -> Timestamp {
        let now = truncate_to_millis(now);
        let mut last = self.last.lock();
        let next = match *last {
            Some(prev) if now <= prev.instant => {
                Timestamp::new(prev.instant, prev.uniquifier.saturating_add(1))
            },
            _ => Timestamp::new(now, 0),
        };
        *last = Some(next);
        next
    }

    /// Convenience for callers that want to stamp against the real clock.
    pub fn next_now(&self) -> Timestamp {
        self.next(Utc::now())
    }
}

fn truncate_to_millis(instant: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(instant.timestamp_millis())
        .single()
        .unwrap_or(instant)
}
