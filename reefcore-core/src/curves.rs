//! Synthetic environmental forcing curves.
//!
//! A curve is a linear trend between a start and end value with a superimposed
//! cosine whose amplitude and period also vary linearly over the interval:
//!
//! $$ f(t) = s(t) + A(t) \cos\left( \frac{2 \pi (t - t_0)}{P(t)} \right) $$
//!
//! The curve is evaluated on a coarse time step, then refined with a cubic spline
//! at a tenth of that step.

use crate::errors::{ReefError, ReefResult};
use crate::interpolate::InterpolationKind;
use crate::timeseries::{FloatValue, Time, TimeAxis, Timeseries};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;

const REFINEMENT: f64 = 10.0;

/// Parameters of a synthetic forcing curve.
///
/// Each pair holds the value at the start and at the end of the time extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveParameters {
    /// Start and end time (yr).
    pub time: (Time, Time),
    /// Sampling step of the coarse curve (yr).
    pub step: Time,
    /// Trend value at start and end.
    pub value: (FloatValue, FloatValue),
    /// Oscillation amplitude at start and end.
    pub amplitude: (FloatValue, FloatValue),
    /// Oscillation period at start and end (yr).
    pub period: (FloatValue, FloatValue),
}

fn linear_between(
    (t0, t1): (Time, Time),
    (v0, v1): (FloatValue, FloatValue),
    t: Time,
) -> FloatValue {
    let slope = (v1 - v0) / (t1 - t0);
    v0 + slope * (t - t0)
}

/// Build the refined synthetic curve.
pub fn build_curve(params: &CurveParameters) -> ReefResult<Timeseries> {
    let (t0, t1) = params.time;
    if t1 <= t0 {
        return Err(ReefError::config(
            "time",
            format!("curve end time {} must be after start time {}", t1, t0),
        ));
    }
    if params.step.is_nan() || params.step <= 0.0 {
        return Err(ReefError::config("step", "curve time step must be positive"));
    }
    let periods_positive = params.period.0 > 0.0 && params.period.1 > 0.0;
    if !periods_positive {
        return Err(ReefError::config("period", "curve periods must be positive"));
    }

    let coarse = Arc::new(TimeAxis::range(t0, t1, params.step)?);
    let values = coarse
        .as_slice()
        .iter()
        .map(|&t| {
            let trend = linear_between(params.time, params.value, t);
            let amplitude = linear_between(params.time, params.amplitude, t);
            let period = linear_between(params.time, params.period, t);
            trend + amplitude * (2.0 * PI * (t - t0) / period).cos()
        })
        .collect();
    let coarse_curve = Timeseries::new(values, coarse.clone(), InterpolationKind::Cubic)?;

    let fine = Arc::new(TimeAxis::range(
        coarse.first(),
        coarse.last(),
        params.step / REFINEMENT,
    )?);
    let refined = fine
        .as_slice()
        .iter()
        .map(|&t| coarse_curve.at_time(t))
        .collect();
    Timeseries::new(refined, fine, InterpolationKind::Linear)
}

/// Render a curve in the two column forcing file layout.
///
/// Times are multiplied by `time_factor` (e.g. 1e6 to go from Ma to years) and
/// rounded to whole years; values are rounded to three decimals.
pub fn format_curve(curve: &Timeseries, time_factor: f64) -> String {
    let mut out = String::new();
    let time_axis = curve.time_axis();
    for (t, v) in time_axis.as_slice().iter().zip(curve.values().iter()) {
        // Writing into a String cannot fail
        let _ = writeln!(out, "{:.0} {:.3}", t * time_factor, v);
    }
    out
}

/// Write a curve to `path` in the forcing file layout.
pub fn write_curve(path: &Path, curve: &Timeseries, time_factor: f64) -> ReefResult<()> {
    fs::write(path, format_curve(curve, time_factor)).map_err(|source| ReefError::Io {
        path: path.to_path_buf(),
        source,
    })
}
