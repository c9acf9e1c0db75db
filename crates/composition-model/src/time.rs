//! Half-open presentation time ranges.

use framefx_common::clock::{ns_to_secs, secs_to_ns, TimestampNs};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open range `[start_ns, end_ns)` on the presentation timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeRange")]
pub struct TimeRange {
    start_ns: TimestampNs,
    end_ns: TimestampNs,
}

#[derive(Deserialize)]
struct RawTimeRange {
    start_ns: TimestampNs,
    end_ns: TimestampNs,
}

impl TryFrom<RawTimeRange> for TimeRange {
    type Error = String;

    fn try_from(raw: RawTimeRange) -> Result<Self, Self::Error> {
        TimeRange::new(raw.start_ns, raw.end_ns).ok_or_else(|| {
            format!(
                "time range end {} precedes start {}",
                raw.end_ns, raw.start_ns
            )
        })
    }
}

impl TimeRange {
    /// Create a range. Returns `None` if `end_ns < start_ns`.
    pub fn new(start_ns: TimestampNs, end_ns: TimestampNs) -> Option<Self> {
        (end_ns >= start_ns).then_some(Self { start_ns, end_ns })
    }

    /// Create a range from seconds. Returns `None` if `end < start`.
    pub fn from_secs(start: f64, end: f64) -> Option<Self> {
        Self::new(secs_to_ns(start), secs_to_ns(end))
    }

    pub fn start_ns(&self) -> TimestampNs {
        self.start_ns
    }

    pub fn end_ns(&self) -> TimestampNs {
        self.end_ns
    }

    pub fn duration_ns(&self) -> TimestampNs {
        self.end_ns - self.start_ns
    }

    pub fn is_empty(&self) -> bool {
        self.start_ns == self.end_ns
    }

    /// Whether `t` falls in `[start, end)`.
    pub fn contains(&self, t: TimestampNs) -> bool {
        t >= self.start_ns && t < self.end_ns
    }

    /// Whether the two ranges share at least one instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_ns < other.end_ns && other.start_ns < self.end_ns
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.3}s, {:.3}s)",
            ns_to_secs(self.start_ns),
            ns_to_secs(self.end_ns)
        )
    }
}
