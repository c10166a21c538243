//! Timeline time ranges.
//!
//! Times are seconds as `f64`, matching the frame times used by the render
//! pipeline. Ranges are half-open: `[start, end)`.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    /// Zero-width range at a single instant.
    pub fn at(time: f64) -> Self {
        Self {
            start: time,
            end: time,
        }
    }

    /// Range covering the whole timeline.
    pub fn all() -> Self {
        Self {
            start: f64::MIN,
            end: f64::MAX,
        }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, time: f64) -> bool {
        if self.start == self.end {
            return time == self.start;
        }
        time >= self.start && time < self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        // Zero-width ranges still overlap ranges that contain their instant.
        if self.start == self.end {
            return other.contains(self.start) || *self == *other;
        }
        if other.start == other.end {
            return self.contains(other.start);
        }
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` lies entirely within this range.
    pub fn covers(&self, other: &TimeRange) -> bool {
        self.start <= other.start && self.end >= other.end
    }

    pub fn union(&self, other: &TimeRange) -> TimeRange {
        TimeRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn shifted(&self, delta: f64) -> TimeRange {
        TimeRange {
            start: self.start + delta,
            end: self.end + delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_normalizes() {
        let r = TimeRange::new(3.0, 1.0);
        assert_eq!(r.start, 1.0);
        assert_eq!(r.end, 3.0);
    }

    #[test]
    fn test_overlap_and_cover() {
        let a = TimeRange::new(0.0, 2.0);
        let b = TimeRange::new(1.0, 3.0);
        let c = TimeRange::new(2.0, 4.0);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(a.covers(&TimeRange::new(0.5, 1.5)));
        assert!(!a.covers(&b));
    }

    #[test]
    fn test_shift() {
        let r = TimeRange::new(0.0, 1.0).shifted(1.0);
        assert_eq!(r, TimeRange::new(1.0, 2.0));
    }
}
