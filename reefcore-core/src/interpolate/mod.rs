//! One-dimensional interpolation of sampled forcing curves.
//!
//! Query points outside the sampled range are clamped onto the nearest bound
//! before interpolating; no strategy extrapolates.

pub mod strategies;

use crate::errors::ReefResult;
use crate::timeseries::{FloatValue, Time};
use serde::{Deserialize, Serialize};
use strategies::{CubicSplineStrategy, Interp1DStrategy, LinearSplineStrategy};

/// Interpolation policy selected in configuration for a forcing variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationKind {
    #[default]
    Linear,
    Cubic,
}

/// A prepared interpolation strategy.
///
/// Strategies that need a fit (the cubic spline) are fitted once when the
/// strategy is built and reused for every query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InterpolationStrategy {
    Linear(LinearSplineStrategy),
    Cubic(CubicSplineStrategy),
}

impl InterpolationStrategy {
    pub fn build(kind: InterpolationKind, time: &[Time], y: &[FloatValue]) -> ReefResult<Self> {
        Ok(match kind {
            InterpolationKind::Linear => InterpolationStrategy::Linear(LinearSplineStrategy),
            InterpolationKind::Cubic => {
                InterpolationStrategy::Cubic(CubicSplineStrategy::fit(time, y)?)
            }
        })
    }

    pub fn kind(&self) -> InterpolationKind {
        match self {
            InterpolationStrategy::Linear(_) => InterpolationKind::Linear,
            InterpolationStrategy::Cubic(_) => InterpolationKind::Cubic,
        }
    }
}

impl Interp1DStrategy for InterpolationStrategy {
    fn interpolate(&self, time: &[Time], y: &[FloatValue], time_target: Time) -> FloatValue {
        match self {
            InterpolationStrategy::Linear(s) => s.interpolate(time, y, time_target),
            InterpolationStrategy::Cubic(s) => s.interpolate(time, y, time_target),
        }
    }
}

/// Index `i` of the segment `[time[i], time[i + 1]]` that holds `time_target`.
///
/// `time` must be strictly increasing with at least two entries and
/// `time_target` must already be clamped into its range.
pub(crate) fn segment_index(time: &[Time], time_target: Time) -> usize {
    let upper = time.partition_point(|t| *t <= time_target);
    upper.saturating_sub(1).min(time.len() - 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_lookup() {
        let time = [0.0, 10.0, 20.0, 30.0];
        assert_eq!(segment_index(&time, 0.0), 0);
        assert_eq!(segment_index(&time, 5.0), 0);
        assert_eq!(segment_index(&time, 10.0), 1);
        assert_eq!(segment_index(&time, 29.0), 2);
        assert_eq!(segment_index(&time, 30.0), 2);
    }

    #[test]
    fn kind_round_trip() {
        let strategy =
            InterpolationStrategy::build(InterpolationKind::Cubic, &[0.0, 1.0], &[1.0, 2.0])
                .unwrap();
        assert_eq!(strategy.kind(), InterpolationKind::Cubic);

        let kind: InterpolationKind = serde_json::from_str("\"linear\"").unwrap();
        assert_eq!(kind, InterpolationKind::Linear);
    }
}
