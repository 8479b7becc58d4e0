//! Picking a dependency value at a timestamp the dependency was not sampled at.

use crate::types::{AlignmentStrategy, TimeSeriesEntry, Timestamp};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentError {
    #[error("series has no points")]
    EmptySeries,
    #[error("no point at or before {timestamp}")]
    NoPrevious { timestamp: Timestamp },
    #[error("no point at or after {timestamp}")]
    NoNext { timestamp: Timestamp },
}

/// Value of the series at `timestamp` according to `strategy`.
///
/// `entries` must be sorted by timestamp in ascending order. An entry at
/// exactly `timestamp` is returned regardless of the strategy.
pub fn value_at(
    timestamp: Timestamp,
    entries: &[TimeSeriesEntry],
    strategy: AlignmentStrategy,
) -> Result<f64, AlignmentError> {
    if entries.is_empty() {
        return Err(AlignmentError::EmptySeries);
    }
    // first entry with `entry.timestamp >= timestamp`
    let split = entries.partition_point(|e| e.timestamp < timestamp);
    if let Some(exact) = entries.get(split).filter(|e| e.timestamp == timestamp) {
        return Ok(exact.value);
    }
    let prev = split.checked_sub(1).and_then(|i| entries.get(i));
    let next = entries.get(split);

    match strategy {
        AlignmentStrategy::Previous => prev
            .map(|p| p.value)
            .ok_or(AlignmentError::NoPrevious { timestamp }),
        AlignmentStrategy::Future => next
            .map(|n| n.value)
            .ok_or(AlignmentError::NoNext { timestamp }),
        AlignmentStrategy::Nearest => match (prev, next) {
            (Some(p), Some(n)) => {
                // i128 to stay clear of overflow on extreme timestamps
                let to_prev = timestamp as i128 - p.timestamp as i128;
                let to_next = n.timestamp as i128 - timestamp as i128;
                if to_prev <= to_next {
                    Ok(p.value)
                } else {
                    Ok(n.value)
                }
            }
            (Some(only), None) | (None, Some(only)) => Ok(only.value),
            (None, None) => Err(AlignmentError::EmptySeries),
        },
        AlignmentStrategy::Interpolate => match (prev, next) {
            (Some(p), Some(n)) => Ok(interpolate(timestamp, p, n)),
            (Some(only), None) | (None, Some(only)) => Ok(only.value),
            (None, None) => Err(AlignmentError::EmptySeries),
        },
    }
}

fn interpolate(timestamp: Timestamp, prev: &TimeSeriesEntry, next: &TimeSeriesEntry) -> f64 {
    let span = (next.timestamp as i128 - prev.timestamp as i128) as f64;
    let fraction = (timestamp as i128 - prev.timestamp as i128) as f64 / span;
    prev.value + fraction * (next.value - prev.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{tests::point_construction::e, types::AlignmentStrategy::*};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn series() -> Vec<TimeSeriesEntry> {
        vec![e(100, 1.0), e(200, 3.0), e(400, 7.0)]
    }

    #[rstest]
    fn exact_match_wins(
        #[values(Previous, Future, Nearest, Interpolate)] strategy: AlignmentStrategy,
    ) {
        for entry in series() {
            assert_eq!(
                value_at(entry.timestamp, &series(), strategy),
                Ok(entry.value)
            );
        }
    }

    #[rstest]
    #[case(Previous, 150, Ok(1.0))]
    #[case(Previous, 500, Ok(7.0))]
    #[case(Previous, 50, Err(AlignmentError::NoPrevious { timestamp: 50 }))]
    #[case(Future, 150, Ok(3.0))]
    #[case(Future, 50, Ok(1.0))]
    #[case(Future, 500, Err(AlignmentError::NoNext { timestamp: 500 }))]
    #[case(Nearest, 140, Ok(1.0))]
    #[case(Nearest, 160, Ok(3.0))]
    #[case(Nearest, 300, Ok(3.0))]
    #[case(Nearest, 50, Ok(1.0))]
    #[case(Nearest, 1_000, Ok(7.0))]
    #[case(Interpolate, 150, Ok(2.0))]
    #[case(Interpolate, 250, Ok(4.0))]
    #[case(Interpolate, 50, Ok(1.0))]
    #[case(Interpolate, 1_000, Ok(7.0))]
    fn resolves_by_strategy(
        #[case] strategy: AlignmentStrategy,
        #[case] timestamp: Timestamp,
        #[case] expected: Result<f64, AlignmentError>,
    ) {
        assert_eq!(value_at(timestamp, &series(), strategy), expected);
    }

    #[rstest]
    fn empty_series_fails(
        #[values(Previous, Future, Nearest, Interpolate)] strategy: AlignmentStrategy,
    ) {
        assert_eq!(
            value_at(10, &[], strategy),
            Err(AlignmentError::EmptySeries)
        );
    }

    #[test]
    fn interpolation_stays_within_bracket() {
        let entries = vec![e(1_000, 10.0), e(2_000, -5.0)];
        for timestamp in (1_000..=2_000).step_by(37) {
            let value = value_at(timestamp, &entries, Interpolate).unwrap();
            assert!(
                (-5.0..=10.0).contains(&value),
                "value {value} at {timestamp} is out of bounds"
            );
        }
        assert_eq!(value_at(1_000, &entries, Interpolate), Ok(10.0));
        assert_eq!(value_at(2_000, &entries, Interpolate), Ok(-5.0));
        assert_eq!(value_at(1_500, &entries, Interpolate), Ok(2.5));
    }

    #[rstest]
    #[case(Nearest, 10.0)]
    #[case(Interpolate, 5.0)]
    fn extreme_timestamps_do_not_overflow(
        #[case] strategy: AlignmentStrategy,
        #[case] expected: f64,
    ) {
        let entries = vec![
            e(-5_000_000_000_000_000_000, 0.0),
            e(5_000_000_000_000_000_000, 10.0),
        ];
        let value = value_at(1, &entries, strategy).unwrap();
        assert!((value - expected).abs() < 1e-9, "{value}");
    }
}
