use super::segment_index;
use crate::errors::ReefResult;
use crate::timeseries::{FloatValue, Time};
use crate::utils::linear_algebra::thomas_solve;
use serde::{Deserialize, Serialize};

/// Interpolates a sampled curve at a target time.
///
/// Implementations may assume `time` is strictly increasing, `time` and `y` share
/// a length of at least one, and `time_target` lies within `[time[0], time[n-1]]`.
pub trait Interp1DStrategy {
    fn interpolate(&self, time: &[Time], y: &[FloatValue], time_target: Time) -> FloatValue;
}

/// Piecewise linear interpolation between neighbouring samples.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinearSplineStrategy;

impl Interp1DStrategy for LinearSplineStrategy {
    fn interpolate(&self, time: &[Time], y: &[FloatValue], time_target: Time) -> FloatValue {
        if time.len() == 1 {
            return y[0];
        }
        let i = segment_index(time, time_target);
        let (t0, t1) = (time[i], time[i + 1]);
        let frac = (time_target - t0) / (t1 - t0);

        y[i] + frac * (y[i + 1] - y[i])
    }
}

/// Natural cubic spline through every sample.
///
/// Holds the second derivative of the spline at each knot, with zero curvature at
/// both ends. Fewer than three samples give zero curvature everywhere, which
/// reduces to linear interpolation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CubicSplineStrategy {
    second_derivatives: Vec<FloatValue>,
}

impl CubicSplineStrategy {
    /// Fit the knot curvatures for the samples `(time, y)`.
    ///
    /// For interior knot $i$ with spacings $h_{i-1}, h_i$:
    /// $$ h_{i-1} M_{i-1} + 2(h_{i-1} + h_i) M_i + h_i M_{i+1} =
    ///    6 \left( \frac{y_{i+1} - y_i}{h_i} - \frac{y_i - y_{i-1}}{h_{i-1}} \right) $$
    pub fn fit(time: &[Time], y: &[FloatValue]) -> ReefResult<Self> {
        let n = time.len();
        let mut second_derivatives = vec![0.0; n];
        if n < 3 {
            return Ok(Self { second_derivatives });
        }

        let m = n - 2;
        let mut a = vec![0.0; m];
        let mut b = vec![0.0; m];
        let mut c = vec![0.0; m];
        let mut d = vec![0.0; m];
        for k in 0..m {
            let i = k + 1;
            let h_prev = time[i] - time[i - 1];
            let h_next = time[i + 1] - time[i];
            a[k] = h_prev;
            b[k] = 2.0 * (h_prev + h_next);
            c[k] = h_next;
            d[k] = 6.0 * ((y[i + 1] - y[i]) / h_next - (y[i] - y[i - 1]) / h_prev);
        }

        let interior = thomas_solve(&a, &b, &c, &d)?;
        second_derivatives[1..n - 1].copy_from_slice(&interior);

        Ok(Self { second_derivatives })
    }
}

impl Interp1DStrategy for CubicSplineStrategy {
    fn interpolate(&self, time: &[Time], y: &[FloatValue], time_target: Time) -> FloatValue {
        if time.len() == 1 {
            return y[0];
        }
        let i = segment_index(time, time_target);
        let (t0, t1) = (time[i], time[i + 1]);
        let h = t1 - t0;
        let (m0, m1) = (self.second_derivatives[i], self.second_derivatives[i + 1]);
        let left = t1 - time_target;
        let right = time_target - t0;

        m0 * left.powi(3) / (6.0 * h)
            + m1 * right.powi(3) / (6.0 * h)
            + (y[i] - m0 * h * h / 6.0) * left / h
            + (y[i + 1] - m1 * h * h / 6.0) * right / h
    }
}
