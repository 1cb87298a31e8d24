//! Nonlinear least-squares fit of exponential decay curves.
//!
//! Used to turn a handful of (elevation, value) control points into a smooth
//! closed-form relation $f(x) = a e^{-b x} + c$.

use crate::errors::{ReefError, ReefResult};
use crate::timeseries::FloatValue;
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_ITERATIONS: usize = 500;
const STEP_TOLERANCE: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e16;

/// Exponential decay $f(x) = a e^{-b x} + c$.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpDecay {
    pub a: FloatValue,
    pub b: FloatValue,
    pub c: FloatValue,
}

impl ExpDecay {
    pub fn evaluate(&self, x: FloatValue) -> FloatValue {
        self.a * (-self.b * x).exp() + self.c
    }

    /// Fit the curve to at least three control points with Levenberg-Marquardt.
    ///
    /// Points may be supplied in any order. Control points sharing a single value
    /// give a flat curve (`a = b = 0`).
    pub fn fit(x: &[FloatValue], y: &[FloatValue]) -> ReefResult<Self> {
        if x.len() != y.len() {
            return Err(ReefError::Error(format!(
                "decay fit needs matching control points ({} x, {} y)",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 3 {
            return Err(ReefError::Error(format!(
                "decay fit needs at least 3 control points, got {}",
                x.len()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(ReefError::Error(
                "decay control points must be finite".to_string(),
            ));
        }

        let mut points: Vec<(FloatValue, FloatValue)> =
            x.iter().copied().zip(y.iter().copied()).collect();
        points.sort_by(|p, q| p.0.total_cmp(&q.0));

        let (y_min, y_max) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.1), hi.max(p.1))
            });
        if y_max - y_min <= f64::EPSILON * y_max.abs().max(1.0) {
            return Ok(Self {
                a: 0.0,
                b: 0.0,
                c: points[0].1,
            });
        }

        let energy: f64 = points.iter().map(|p| p.1 * p.1).sum::<f64>().max(1.0);
        let mut params = initial_guess(&points);
        let mut cost = sum_of_squares(&points, &params);
        let mut damping = 1e-3;

        for iteration in 0..MAX_ITERATIONS {
            let mut jtj = Matrix3::<f64>::zeros();
            let mut jtr = Vector3::<f64>::zeros();
            for &(xi, yi) in &points {
                let decay = (-params.b * xi).exp();
                let jac = Vector3::new(decay, -params.a * xi * decay, 1.0);
                let residual = params.evaluate(xi) - yi;
                jtj += jac * jac.transpose();
                jtr += jac * residual;
            }

            let mut damped = jtj;
            for i in 0..3 {
                damped[(i, i)] += damping * jtj[(i, i)].max(1e-12);
            }
            let delta = match damped.lu().solve(&(-jtr)) {
                Some(delta) => delta,
                None => {
                    damping *= 10.0;
                    continue;
                }
            };

            let candidate = Self {
                a: params.a + delta[0],
                b: params.b + delta[1],
                c: params.c + delta[2],
            };
            let candidate_cost = sum_of_squares(&points, &candidate);

            if candidate_cost.is_finite() && candidate_cost <= cost {
                let scale = params.a.abs() + params.b.abs() + params.c.abs() + STEP_TOLERANCE;
                let undamped = damping < 1.0;
                params = candidate;
                cost = candidate_cost;
                damping = (damping / 10.0).max(1e-12);

                if cost <= f64::EPSILON * energy
                    || (undamped && delta.norm() <= STEP_TOLERANCE * scale)
                {
                    debug!(iteration, cost, ?params, "Exponential decay fit converged");
                    return Ok(params);
                }
            } else {
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    // No descent direction left: params sit in a minimum
                    debug!(iteration, cost, ?params, "Exponential decay fit stalled");
                    return Ok(params);
                }
            }
        }

        Err(ReefError::FitNotConverged {
            iterations: MAX_ITERATIONS,
            residual: cost,
        })
    }
}

/// Starting point from the first, middle and last control points.
fn initial_guess(points: &[(FloatValue, FloatValue)]) -> ExpDecay {
    let (x0, y0) = points[0];
    let (xm, ym) = points[points.len() / 2];
    let (xn, yn) = points[points.len() - 1];

    let c = yn;
    let span = y0 - c;
    let ratio = if span.abs() > 0.0 {
        ((ym - c) / span).clamp(1e-6, 1.0 - 1e-6)
    } else {
        0.5
    };
    let dx = if xm > x0 { xm - x0 } else { (xn - x0).max(1.0) };
    let b = -ratio.ln() / dx;
    let a = span * (b * x0).exp();

    ExpDecay { a, b, c }
}

fn sum_of_squares(points: &[(FloatValue, FloatValue)], params: &ExpDecay) -> f64 {
    points
        .iter()
        .map(|&(x, y)| (params.evaluate(x) - y).powi(2))
        .sum()
}
