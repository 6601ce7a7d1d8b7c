//! Query windows and reconstructed resource lifetimes

use crate::error::{CostvalError, Result};
use crate::prometheus::RawSample;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// The time range a validation run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(CostvalError::InvalidWindow {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Window of `duration` ending at `end`
    pub fn ending_at(end: DateTime<Utc>, duration: Duration) -> Result<Self> {
        let start = end
            .checked_sub_signed(duration)
            .ok_or_else(|| CostvalError::InvalidDuration {
                input: duration.to_string(),
                reason: format!("window ending at {} starts before the earliest time", end),
            })?;
        Self::new(start, end)
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
}

/// Observed lifetime of one resource unit
///
/// Only ever widened; `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ResourceInterval {
    /// Create an interval; an `end` before `start` collapses to zero length
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn minutes(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / MILLIS_PER_MINUTE
    }

    pub fn hours(&self) -> f64 {
        self.minutes() / 60.0
    }

    /// True when the interval has no duration
    pub fn is_degenerate(&self) -> bool {
        self.end <= self.start
    }

    /// Smallest interval covering both
    pub fn union(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Widen in place to also cover `other`
    pub fn widen(&mut self, other: &Self) {
        *self = self.union(other);
    }
}

/// Reconstruct when a unit existed from its samples
///
/// A single observation stands for one resolution period centred on it. The
/// result is clamped to the window and to `now`; if clamping would invert it,
/// the interval collapses to zero length at the violated window boundary.
pub fn calculate_start_and_end(
    samples: &[RawSample],
    resolution: Duration,
    window: &Window,
    now: DateTime<Utc>,
) -> Result<ResourceInterval> {
    let mut timestamps = samples.iter().filter_map(RawSample::datetime);
    let first = timestamps.next().ok_or(CostvalError::EmptySeries)?;
    let (mut start, mut end) = timestamps.fold((first, first), |(lo, hi), ts| {
        (lo.min(ts), hi.max(ts))
    });

    let upper = window.end().min(now);

    // Widening past the representable range lands outside the window anyway.
    if start == end {
        let half = resolution / 2;
        start = start.checked_sub_signed(half).unwrap_or(window.start());
        end = end.checked_add_signed(half).unwrap_or(window.end());
    }

    start = start.max(window.start());
    end = end.min(upper);

    if end < start {
        let point = if end < window.start() {
            window.start()
        } else {
            upper
        };
        return Ok(ResourceInterval {
            start: point,
            end: point,
        });
    }

    Ok(ResourceInterval { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn samples(timestamps: &[i64]) -> Vec<RawSample> {
        timestamps
            .iter()
            .map(|ts| RawSample::new(*ts as f64, "1"))
            .collect()
    }

    #[test]
    fn test_single_sample_widens_by_half_resolution() {
        let window = Window::new(at(1_699_999_000), at(1_700_001_000)).unwrap();
        let interval = calculate_start_and_end(
            &[RawSample::new(1_700_000_000.0, "4")],
            Duration::minutes(5),
            &window,
            at(1_800_000_000),
        )
        .unwrap();

        assert_eq!(interval.start, at(1_699_999_850));
        assert_eq!(interval.end, at(1_700_000_150));
        assert_eq!(interval.minutes(), 5.0);
    }

    #[test]
    fn test_multiple_samples_span_first_to_last() {
        let window = Window::new(at(0), at(10_000)).unwrap();
        let interval = calculate_start_and_end(
            &samples(&[1_000, 1_300, 1_600]),
            Duration::minutes(5),
            &window,
            at(20_000),
        )
        .unwrap();

        assert_eq!(interval.start, at(1_000));
        assert_eq!(interval.end, at(1_600));
    }

    #[test]
    fn test_clamped_to_window() {
        let window = Window::new(at(1_000), at(2_000)).unwrap();
        let interval = calculate_start_and_end(
            &samples(&[500, 2_500]),
            Duration::minutes(5),
            &window,
            at(10_000),
        )
        .unwrap();

        assert_eq!(interval.start, at(1_000));
        assert_eq!(interval.end, at(2_000));
    }

    #[test]
    fn test_single_sample_at_window_edge_is_clamped_on_one_side() {
        let window = Window::new(at(1_000), at(2_000)).unwrap();
        let interval = calculate_start_and_end(
            &samples(&[1_000]),
            Duration::minutes(5),
            &window,
            at(10_000),
        )
        .unwrap();

        assert_eq!(interval.start, at(1_000));
        assert_eq!(interval.end, at(1_150));
    }

    #[test]
    fn test_end_never_passes_now() {
        let window = Window::new(at(0), at(10_000)).unwrap();
        let interval = calculate_start_and_end(
            &samples(&[1_000, 9_000]),
            Duration::minutes(5),
            &window,
            at(5_000),
        )
        .unwrap();

        assert_eq!(interval.end, at(5_000));
    }

    #[test]
    fn test_inverted_interval_collapses_at_boundary() {
        let window = Window::new(at(1_000), at(2_000)).unwrap();

        let after = calculate_start_and_end(
            &samples(&[5_000, 6_000]),
            Duration::minutes(5),
            &window,
            at(10_000),
        )
        .unwrap();
        assert_eq!(after.start, at(2_000));
        assert!(after.is_degenerate());

        let before = calculate_start_and_end(
            &samples(&[100, 200]),
            Duration::minutes(5),
            &window,
            at(10_000),
        )
        .unwrap();
        assert_eq!(before.start, at(1_000));
        assert_eq!(before.end, at(1_000));
    }

    #[test]
    fn test_bounds_hold_for_arbitrary_samples() {
        let window = Window::new(at(10_000), at(20_000)).unwrap();
        let now = at(18_000);
        let cases: &[&[i64]] = &[
            &[0],
            &[9_990],
            &[10_010],
            &[15_000],
            &[19_990],
            &[25_000],
            &[5_000, 30_000],
            &[12_000, 12_000, 17_500],
            &[17_999, 18_001],
        ];

        for case in cases {
            for resolution in [Duration::seconds(1), Duration::minutes(5), Duration::hours(2)] {
                let interval =
                    calculate_start_and_end(&samples(case), resolution, &window, now).unwrap();
                assert!(interval.start >= window.start(), "case {case:?}");
                assert!(interval.end <= window.end(), "case {case:?}");
                assert!(interval.end <= now, "case {case:?}");
                assert!(interval.start <= interval.end, "case {case:?}");
            }
        }
    }

    #[test]
    fn test_empty_samples_are_rejected() {
        let window = Window::new(at(0), at(100)).unwrap();
        let result = calculate_start_and_end(&[], Duration::minutes(5), &window, at(100));
        assert!(matches!(result, Err(CostvalError::EmptySeries)));
    }

    #[test]
    fn test_union_only_widens() {
        let mut interval = ResourceInterval::new(at(100), at(200));
        interval.widen(&ResourceInterval::new(at(150), at(180)));
        assert_eq!(interval, ResourceInterval::new(at(100), at(200)));

        interval.widen(&ResourceInterval::new(at(50), at(300)));
        assert_eq!(interval, ResourceInterval::new(at(50), at(300)));
    }

    #[test]
    fn test_huge_resolution_clamps_to_window() {
        let window = Window::new(at(0), at(10_000)).unwrap();
        let resolution = crate::query::parse_duration("100000000y").unwrap();
        let interval =
            calculate_start_and_end(&samples(&[5_000]), resolution, &window, at(10_000)).unwrap();

        assert_eq!(interval.start, at(0));
        assert_eq!(interval.end, at(10_000));
    }

    #[test]
    fn test_huge_window_is_rejected() {
        let duration = crate::query::parse_duration("100000000y").unwrap();
        let result = Window::ending_at(at(1_700_000_000), duration);
        assert!(matches!(result, Err(CostvalError::InvalidDuration { .. })));
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        assert!(Window::new(at(10), at(5)).is_err());
        let window = Window::ending_at(at(86_400), Duration::hours(24)).unwrap();
        assert_eq!(window.start(), at(0));
    }
}
