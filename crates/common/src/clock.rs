//! Presentation-time helpers.
//!
//! All framefx timestamps are nanoseconds on the asset's presentation
//! timeline. The playback clock itself lives with the caller; this module
//! only converts between units.

/// Presentation timestamp in nanoseconds.
pub type TimestampNs = u64;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Convert a nanosecond value to seconds.
pub fn ns_to_secs(ns: TimestampNs) -> f64 {
    ns as f64 / NANOS_PER_SEC as f64
}

/// Convert seconds to nanoseconds. Negative input clamps to zero.
pub fn secs_to_ns(secs: f64) -> TimestampNs {
    if secs <= 0.0 {
        return 0;
    }
    (secs * NANOS_PER_SEC as f64).round() as TimestampNs
}

/// Presentation time of a frame index at a constant frame rate.
pub fn frame_to_ns(frame: u64, fps: u32) -> TimestampNs {
    if fps == 0 {
        return 0;
    }
    frame.saturating_mul(NANOS_PER_SEC) / fps as u64
}

/// Frame index containing a presentation time at a constant frame rate.
pub fn ns_to_frame(ns: TimestampNs, fps: u32) -> u64 {
    (ns as u128 * fps as u128 / NANOS_PER_SEC as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_to_secs_conversion() {
        assert!((ns_to_secs(1_500_000_000) - 1.5).abs() < 1e-9);
        assert_eq!(secs_to_ns(2.0), 2_000_000_000);
        assert_eq!(secs_to_ns(-1.0), 0);
    }

    #[test]
    fn test_frame_conversions() {
        assert_eq!(frame_to_ns(30, 30), NANOS_PER_SEC);
        assert_eq!(frame_to_ns(1, 0), 0);
        assert_eq!(ns_to_frame(frame_to_ns(30, 60), 60), 30);
        assert_eq!(ns_to_frame(983_400_000, 60), 59);
        assert_eq!(ns_to_frame(NANOS_PER_SEC / 2, 24), 12);
    }
}
