//! Sampled curves over time and their ingestion from flat files.
//!
//! Forcing files hold two whitespace-separated columns, time then value, sorted by
//! increasing time and without a header.
//! Blank lines and lines starting with `#` are skipped.

use crate::errors::{ReefError, ReefResult};
use crate::interpolate::strategies::Interp1DStrategy;
use crate::interpolate::{InterpolationKind, InterpolationStrategy};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub type Time = f64;
pub type FloatValue = f64;

/// Strictly increasing sample times of a curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeAxis")]
pub struct TimeAxis {
    values: Vec<Time>,
}

#[derive(Deserialize)]
struct RawTimeAxis {
    values: Vec<Time>,
}

impl TryFrom<RawTimeAxis> for TimeAxis {
    type Error = ReefError;

    fn try_from(raw: RawTimeAxis) -> ReefResult<Self> {
        Self::from_values(raw.values)
    }
}

impl TimeAxis {
    pub fn from_values(values: Vec<Time>) -> ReefResult<Self> {
        if values.is_empty() {
            return Err(ReefError::InvalidTimeseries(
                "a time axis needs at least one value".to_string(),
            ));
        }
        if let Some(t) = values.iter().find(|t| !t.is_finite()) {
            return Err(ReefError::InvalidTimeseries(format!(
                "time values must be finite, got {}",
                t
            )));
        }
        if let Some(w) = values.windows(2).find(|w| w[1] <= w[0]) {
            return Err(ReefError::InvalidTimeseries(format!(
                "time values must be strictly increasing ({} followed by {})",
                w[0], w[1]
            )));
        }
        Ok(Self { values })
    }

    /// Evenly spaced axis from `start` to `end` inclusive.
    ///
    /// The number of intervals is `(end - start) / step` rounded to the nearest
    /// integer, so the final value is exactly `end` rather than an accumulation of
    /// `step` increments.
    pub fn range(start: Time, end: Time, step: Time) -> ReefResult<Self> {
        if step.is_nan() || step <= 0.0 || end < start {
            return Err(ReefError::InvalidTimeseries(format!(
                "cannot build a range from {} to {} with step {}",
                start, end, step
            )));
        }
        let n = ((end - start) / step).round() as usize;
        let values = (0..=n)
            .map(|i| if i == n { end } else { start + i as Time * step })
            .collect();
        Self::from_values(values)
    }

    pub fn values(&self) -> ArrayView1<'_, Time> {
        ArrayView1::from(&self.values[..])
    }

    pub fn as_slice(&self) -> &[Time] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn at(&self, index: usize) -> Option<Time> {
        self.values.get(index).copied()
    }

    pub fn first(&self) -> Time {
        self.values[0]
    }

    pub fn last(&self) -> Time {
        self.values[self.values.len() - 1]
    }

    pub fn contains(&self, time: Time) -> bool {
        time >= self.first() && time <= self.last()
    }

    /// Clamp `time` onto the sampled range.
    pub fn clamp(&self, time: Time) -> Time {
        time.clamp(self.first(), self.last())
    }
}

/// A curve sampled at discrete times with a continuous interpolant.
///
/// Deserialised curves are revalidated and their interpolant refitted from the
/// samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTimeseries")]
pub struct Timeseries {
    values: Vec<FloatValue>,
    time_axis: Arc<TimeAxis>,
    strategy: InterpolationStrategy,
}

#[derive(Deserialize)]
struct RawTimeseries {
    values: Vec<FloatValue>,
    time_axis: TimeAxis,
    strategy: InterpolationStrategy,
}

impl TryFrom<RawTimeseries> for Timeseries {
    type Error = ReefError;

    fn try_from(raw: RawTimeseries) -> ReefResult<Self> {
        Self::new(raw.values, Arc::new(raw.time_axis), raw.strategy.kind())
    }
}

impl Timeseries {
    /// Build a linearly interpolated timeseries.
    pub fn from_values(values: Vec<FloatValue>, time: Vec<Time>) -> ReefResult<Self> {
        Self::new(values, Arc::new(TimeAxis::from_values(time)?), InterpolationKind::Linear)
    }

    pub fn new(
        values: Vec<FloatValue>,
        time_axis: Arc<TimeAxis>,
        kind: InterpolationKind,
    ) -> ReefResult<Self> {
        if values.len() != time_axis.len() {
            return Err(ReefError::InvalidTimeseries(format!(
                "{} values supplied for {} times",
                values.len(),
                time_axis.len()
            )));
        }
        if let Some(v) = values.iter().find(|v| !v.is_finite()) {
            return Err(ReefError::InvalidTimeseries(format!(
                "values must be finite, got {}",
                v
            )));
        }
        let strategy = InterpolationStrategy::build(kind, time_axis.as_slice(), &values)?;
        Ok(Self {
            values,
            time_axis,
            strategy,
        })
    }

    /// Replace the interpolation policy, refitting if needed.
    pub fn with_interpolation(self, kind: InterpolationKind) -> ReefResult<Self> {
        Self::new(self.values, self.time_axis, kind)
    }

    /// Read a two column forcing file.
    pub fn from_file(path: &Path, kind: InterpolationKind) -> ReefResult<Self> {
        let contents = fs::read_to_string(path).map_err(|source| ReefError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents, path, kind)
    }

    /// Parse the contents of a forcing file.
    ///
    /// `path` is only used to label errors.
    pub fn parse(contents: &str, path: &Path, kind: InterpolationKind) -> ReefResult<Self> {
        let mut time = Vec::new();
        let mut values = Vec::new();

        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let malformed = |message: String| ReefError::CurveFile {
                path: path.to_path_buf(),
                line: idx + 1,
                message,
            };

            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() != 2 {
                return Err(malformed(format!(
                    "expected 2 columns, found {}",
                    columns.len()
                )));
            }
            let t: Time = columns[0]
                .parse()
                .map_err(|e| malformed(format!("invalid time '{}': {}", columns[0], e)))?;
            let v: FloatValue = columns[1]
                .parse()
                .map_err(|e| malformed(format!("invalid value '{}': {}", columns[1], e)))?;
            time.push(t);
            values.push(v);
        }

        if time.is_empty() {
            return Err(ReefError::CurveFile {
                path: path.to_path_buf(),
                line: 0,
                message: "no samples found".to_string(),
            });
        }

        let time_axis = TimeAxis::from_values(time).map_err(|e| ReefError::CurveFile {
            path: path.to_path_buf(),
            line: 0,
            message: e.to_string(),
        })?;
        Self::new(values, Arc::new(time_axis), kind)
    }

    /// Resample onto an evenly spaced axis from the first to the last sample time,
    /// keeping the interpolation policy.
    pub fn resample(&self, step: Time) -> ReefResult<Self> {
        let axis = TimeAxis::range(self.time_axis.first(), self.time_axis.last(), step)?;
        let values = axis.as_slice().iter().map(|t| self.at_time(*t)).collect();
        Self::new(values, Arc::new(axis), self.interpolation())
    }

    /// Value at `time`, clamped onto the sampled range.
    pub fn at_time(&self, time: Time) -> FloatValue {
        let time = self.time_axis.clamp(time);
        self.strategy
            .interpolate(self.time_axis.as_slice(), &self.values, time)
    }

    pub fn values(&self) -> ArrayView1<'_, FloatValue> {
        ArrayView1::from(&self.values[..])
    }

    pub fn time_axis(&self) -> Arc<TimeAxis> {
        self.time_axis.clone()
    }

    pub fn interpolation(&self) -> InterpolationKind {
        self.strategy.kind()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn peak() -> Timeseries {
        Timeseries::from_values(vec![0.0, 1.0, 0.0], vec![0.0, 50.0, 100.0]).unwrap()
    }

    #[test]
    fn axis_rejects_unsorted() {
        assert!(TimeAxis::from_values(vec![0.0, 2.0, 1.0]).is_err());
        assert!(TimeAxis::from_values(vec![0.0, 0.0]).is_err());
        assert!(TimeAxis::from_values(vec![]).is_err());
        assert!(TimeAxis::from_values(vec![0.0, f64::NAN]).is_err());
    }

    #[test]
    fn axis_range_is_inclusive() {
        let axis = TimeAxis::range(0.0, 100.0, 10.0).unwrap();
        assert_eq!(axis.len(), 11);
        assert_eq!(axis.last(), 100.0);
        assert_eq!(axis.at(3), Some(30.0));

        let fine = TimeAxis::range(0.0, 1.0, 0.1).unwrap();
        assert_eq!(fine.len(), 11);
        assert_eq!(fine.last(), 1.0);
    }

    #[test]
    fn clamps_outside_range() {
        let ts = peak();
        assert_eq!(ts.at_time(-10.0), 0.0);
        assert_eq!(ts.at_time(1000.0), 0.0);
        assert_relative_eq!(ts.at_time(25.0), 0.5);
    }

    #[test]
    fn cubic_is_strictly_inside() {
        let ts = peak().with_interpolation(InterpolationKind::Cubic).unwrap();
        let v = ts.at_time(25.0);
        assert!(v > 0.0 && v < 1.0, "got {}", v);
    }

    #[test]
    fn parse_two_columns() {
        let contents = "# sea level\n0 0.0\n50   1.0\n\n100\t0.0\n";
        let ts = Timeseries::parse(contents, &PathBuf::from("sea.csv"), InterpolationKind::Linear)
            .unwrap();
        assert_eq!(ts.len(), 3);
        assert_relative_eq!(ts.at_time(25.0), 0.5);
    }

    #[test]
    fn parse_reports_line() {
        let contents = "0 0.0\n50 one\n";
        let err = Timeseries::parse(contents, &PathBuf::from("sea.csv"), InterpolationKind::Linear)
            .unwrap_err();
        match err {
            ReefError::CurveFile { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn parse_rejects_extra_columns() {
        let contents = "0 0.0 1.0\n";
        assert!(
            Timeseries::parse(contents, &PathBuf::from("x"), InterpolationKind::Linear).is_err()
        );
    }

    #[test]
    fn missing_file() {
        let err = Timeseries::from_file(
            &PathBuf::from("/nonexistent/reefcore/sea.csv"),
            InterpolationKind::Linear,
        )
        .unwrap_err();
        assert!(matches!(err, ReefError::Io { .. }));
    }

    #[test]
    fn mismatched_lengths() {
        assert!(Timeseries::from_values(vec![1.0], vec![0.0, 1.0]).is_err());
    }

    #[test]
    fn resample_keeps_ends_and_policy() {
        let ts = peak().resample(10.0).unwrap();
        assert_eq!(ts.len(), 11);
        assert_eq!(ts.time_axis().first(), 0.0);
        assert_eq!(ts.time_axis().last(), 100.0);
        assert_eq!(ts.interpolation(), InterpolationKind::Linear);
        assert_relative_eq!(ts.values()[3], 0.6);
        assert_relative_eq!(ts.at_time(25.0), 0.5);

        let cubic = peak().with_interpolation(InterpolationKind::Cubic).unwrap();
        let resampled = cubic.resample(5.0).unwrap();
        assert_eq!(resampled.interpolation(), InterpolationKind::Cubic);
        assert_relative_eq!(resampled.at_time(25.0), cubic.at_time(25.0), epsilon = 1e-12);

        assert!(peak().resample(0.0).is_err());
    }

    #[test]
    fn deserialise_validates() {
        let axis: TimeAxis = serde_json::from_str(r#"{"values": [0.0, 1.0]}"#).unwrap();
        assert_eq!(axis.len(), 2);
        assert!(serde_json::from_str::<TimeAxis>(r#"{"values": []}"#).is_err());
        assert!(serde_json::from_str::<TimeAxis>(r#"{"values": [1.0, 0.0]}"#).is_err());

        let json = serde_json::to_string(&peak()).unwrap();
        let ts: Timeseries = serde_json::from_str(&json).unwrap();
        assert_relative_eq!(ts.at_time(25.0), 0.5);

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["values"] = serde_json::json!([0.0, 1.0]);
        assert!(serde_json::from_value::<Timeseries>(value).is_err());
    }
}
