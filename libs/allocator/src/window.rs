//! Time windows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ReservationError, ReservationResult};

/// A half-open `[start, end)` interval with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawWindow> for TimeWindow {
    type Error = ReservationError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ReservationResult<Self> {
        if start >= end {
            return Err(ReservationError::InvalidWindow(format!(
                "start {start} is not before end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// The window widened by `margin` on both ends.
    pub fn with_margin(&self, margin: Duration) -> ReservationResult<Self> {
        let overflow = || ReservationError::InvalidWindow(format!("margin {margin} overflows"));
        let start = self.start.checked_sub_signed(margin).ok_or_else(overflow)?;
        let end = self.end.checked_add_signed(margin).ok_or_else(overflow)?;
        Self::new(start, end)
    }

    /// True if `other` lies entirely within this window.
    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The common part of both windows, if any.
    pub fn intersection(&self, other: &TimeWindow) -> Option<TimeWindow> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(TimeWindow { start, end })
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, 0).unwrap()
    }

    fn window(from: u32, to: u32) -> TimeWindow {
        TimeWindow::new(at(from, 0), at(to, 0)).unwrap()
    }

    #[test]
    fn test_rejects_empty_or_inverted() {
        assert!(TimeWindow::new(at(10, 0), at(10, 0)).is_err());
        assert!(TimeWindow::new(at(11, 0), at(10, 0)).is_err());
    }

    #[test]
    fn test_with_margin() {
        let effective = window(10, 14).with_margin(Duration::minutes(30)).unwrap();
        assert_eq!(effective.start(), at(9, 30));
        assert_eq!(effective.end(), at(14, 30));
        assert_eq!(window(10, 14).with_margin(Duration::zero()).unwrap(), window(10, 14));
    }

    #[test]
    fn test_contains_and_overlaps() {
        assert!(window(10, 14).contains(&window(10, 12)));
        assert!(!window(10, 14).contains(&window(9, 12)));
        assert!(window(10, 14).overlaps(&window(13, 15)));
        // half-open: touching windows do not overlap
        assert!(!window(10, 14).overlaps(&window(14, 15)));
    }

    #[test]
    fn test_intersection() {
        assert_eq!(window(10, 14).intersection(&window(12, 16)), Some(window(12, 14)));
        assert_eq!(window(10, 12).intersection(&window(12, 16)), None);
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: TimeWindow = serde_json::from_str(
            r#"{"start":"2026-03-01T10:00:00Z","end":"2026-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(ok, window(10, 12));

        let bad = serde_json::from_str::<TimeWindow>(
            r#"{"start":"2026-03-01T12:00:00Z","end":"2026-03-01T10:00:00Z"}"#,
        );
        assert!(bad.is_err());
    }
}
