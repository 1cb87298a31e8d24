//! Initial value problems and their adaptive integration.
//!
//! A right-hand side is described by implementing [`IVP`]; wrapping it in an
//! [`IVPBuilder`] exposes it as an [`ode_solvers::System`] so it can be driven by the
//! embedded Runge-Kutta-Fehlberg 4(5) integrator in this module.

use crate::errors::{ReefError, ReefResult};
use crate::timeseries::{FloatValue, Time};
use is_close::is_close;
use nalgebra::DVector;
use ode_solvers::System;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// State vector of a dynamically sized system.
pub type State = DVector<FloatValue>;

/// Right-hand side of an ordinary differential equation $dy/dt = f(t, y)$.
pub trait IVP<T, S> {
    fn calculate_dy_dt(&self, t: T, y: &S, dy_dt: &mut S);
}

/// Pairs a right-hand side with its initial condition.
pub struct IVPBuilder<C, S> {
    // This needs to be an Arc so the same parameters can be reused across windows
    component: Arc<C>,
    pub y0: S,
}

impl<C> System<Time, State> for IVPBuilder<C, State>
where
    C: IVP<Time, State>,
{
    fn system(&self, t: Time, y: &State, dy: &mut State) {
        self.component.calculate_dy_dt(t, y, dy)
    }
}

impl<C> IVPBuilder<C, State>
where
    C: IVP<Time, State>,
{
    pub fn new(component: Arc<C>, y0: State) -> Self {
        Self { component, y0 }
    }

    /// Build an adaptive Fehlberg integrator over `[t0, t1]`.
    ///
    /// The solution is reported on `n_output + 1` evenly spaced times including both
    /// ends; the step size between those points is chosen adaptively.
    pub fn to_rkf45(
        self,
        t0: Time,
        t1: Time,
        n_output: usize,
        options: Rkf45Options,
    ) -> Rkf45<Self> {
        let y0 = self.y0.clone();
        Rkf45::new(self, t0, t1, n_output, y0, options)
    }
}

/// Tolerances and limits for [`Rkf45`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rkf45Options {
    /// Relative tolerance on each state component.
    /// Default: 1e-6
    pub rtol: FloatValue,
    /// Absolute tolerance on each state component.
    /// Default: 1e-6
    pub atol: FloatValue,
    /// Smallest step size the integrator may take before giving up.
    /// Default: 1e-4
    pub min_step: FloatValue,
    /// Upper bound on attempted steps for a single call to `integrate`.
    /// Default: 100000
    pub max_steps: usize,
}

impl Default for Rkf45Options {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-6,
            min_step: 1e-4,
            max_steps: 100_000,
        }
    }
}

/// Counters collected while integrating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub num_eval: usize,
    pub accepted_steps: usize,
    pub rejected_steps: usize,
}

/// Dense output of an integration: the state at each requested time.
#[derive(Debug, Clone)]
pub struct SolverResult<S> {
    times: Vec<Time>,
    states: Vec<S>,
}

// Not derived as that would require `S: Default`, which `DVector` lacks
impl<S> Default for SolverResult<S> {
    fn default() -> Self {
        Self {
            times: vec![],
            states: vec![],
        }
    }
}

impl<S> SolverResult<S> {
    fn push(&mut self, t: Time, y: S) {
        self.times.push(t);
        self.states.push(y);
    }

    pub fn get(&self) -> (&Vec<Time>, &Vec<S>) {
        (&self.times, &self.states)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

// Fehlberg 4(5) tableau
const C2: f64 = 1.0 / 4.0;
const C3: f64 = 3.0 / 8.0;
const C4: f64 = 12.0 / 13.0;
const C6: f64 = 1.0 / 2.0;

const A21: f64 = 1.0 / 4.0;
const A31: f64 = 3.0 / 32.0;
const A32: f64 = 9.0 / 32.0;
const A41: f64 = 1932.0 / 2197.0;
const A42: f64 = -7200.0 / 2197.0;
const A43: f64 = 7296.0 / 2197.0;
const A51: f64 = 439.0 / 216.0;
const A52: f64 = -8.0;
const A53: f64 = 3680.0 / 513.0;
const A54: f64 = -845.0 / 4104.0;
const A61: f64 = -8.0 / 27.0;
const A62: f64 = 2.0;
const A63: f64 = -3544.0 / 2565.0;
const A64: f64 = 1859.0 / 4104.0;
const A65: f64 = -11.0 / 40.0;

// Fifth order weights, used to advance the solution
const B1: f64 = 16.0 / 135.0;
const B3: f64 = 6656.0 / 12825.0;
const B4: f64 = 28561.0 / 56430.0;
const B5: f64 = -9.0 / 50.0;
const B6: f64 = 2.0 / 55.0;

// Difference between the fifth and fourth order weights
const E1: f64 = 1.0 / 360.0;
const E3: f64 = -128.0 / 4275.0;
const E4: f64 = -2197.0 / 75240.0;
const E5: f64 = 1.0 / 50.0;
const E6: f64 = 2.0 / 55.0;

const SAFETY: f64 = 0.9;
const FAC_MIN: f64 = 0.2;
const FAC_MAX: f64 = 5.0;

/// Explicit Runge-Kutta-Fehlberg 4(5) integrator with adaptive step control.
///
/// Each step computes a fourth and fifth order estimate; their difference, scaled
/// component-wise by `atol + rtol * max(|y|, |y_new|)`, must not exceed one for the
/// step to be accepted. Steps are shrunk on rejection down to `min_step`; a step
/// rejected at `min_step` aborts the integration with
/// [`ReefError::StepSizeTooSmall`].
pub struct Rkf45<F> {
    f: F,
    t0: Time,
    t_end: Time,
    n_output: usize,
    y0: State,
    options: Rkf45Options,
    results: SolverResult<State>,
    stats: Stats,
}

impl<F> Rkf45<F>
where
    F: System<Time, State>,
{
    pub fn new(
        f: F,
        t0: Time,
        t_end: Time,
        n_output: usize,
        y0: State,
        options: Rkf45Options,
    ) -> Self {
        Self {
            f,
            t0,
            t_end,
            n_output: n_output.max(1),
            y0,
            options,
            results: SolverResult::default(),
            stats: Stats::default(),
        }
    }

    pub fn results(&self) -> &SolverResult<State> {
        &self.results
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Integrate from `t0` to `t_end`, recording the state at each output time.
    pub fn integrate(&mut self) -> ReefResult<Stats> {
        self.results = SolverResult::default();
        self.stats = Stats::default();

        let mut t = self.t0;
        let mut y = self.y0.clone();
        self.results.push(t, y.clone());
        if self.t_end <= self.t0 {
            return Ok(self.stats);
        }

        let span = self.t_end - self.t0;
        let mut h = span / self.n_output as f64;
        let mut attempts = 0usize;

        for i in 1..=self.n_output {
            let t_target = if i == self.n_output {
                self.t_end
            } else {
                self.t0 + span * i as f64 / self.n_output as f64
            };

            while t < t_target {
                attempts += 1;
                if attempts > self.options.max_steps {
                    return Err(ReefError::MaxStepsReached {
                        t,
                        max_steps: self.options.max_steps,
                    });
                }

                let remaining = t_target - t;
                let last = h >= remaining;
                let step = if last { remaining } else { h };

                let (y_new, error_ratio) = self.attempt(t, &y, step);
                if error_ratio <= 1.0 {
                    self.stats.accepted_steps += 1;
                    t = if last { t_target } else { t + step };
                    y = y_new;
                    // Only grow the step from one that was not truncated to hit the target
                    if !last || step >= h {
                        h = step * step_factor(error_ratio);
                    }
                } else {
                    self.stats.rejected_steps += 1;
                    if step <= self.options.min_step {
                        return Err(ReefError::StepSizeTooSmall {
                            t,
                            min_step: self.options.min_step,
                            error_ratio,
                        });
                    }
                    h = (step * step_factor(error_ratio)).max(self.options.min_step);
                }
            }

            self.results.push(t_target, y.clone());
        }

        Ok(self.stats)
    }

    /// Take one trial step of size `h`, returning the fifth order estimate and the
    /// scaled error ratio. Non-finite estimates report an infinite ratio.
    fn attempt(&mut self, t: Time, y: &State, h: Time) -> (State, f64) {
        let n = y.len();
        let mut k1 = State::zeros(n);
        let mut k2 = State::zeros(n);
        let mut k3 = State::zeros(n);
        let mut k4 = State::zeros(n);
        let mut k5 = State::zeros(n);
        let mut k6 = State::zeros(n);

        self.f.system(t, y, &mut k1);
        self.f.system(t + C2 * h, &stage(y, h, &[(&k1, A21)]), &mut k2);
        self.f
            .system(t + C3 * h, &stage(y, h, &[(&k1, A31), (&k2, A32)]), &mut k3);
        self.f.system(
            t + C4 * h,
            &stage(y, h, &[(&k1, A41), (&k2, A42), (&k3, A43)]),
            &mut k4,
        );
        self.f.system(
            t + h,
            &stage(y, h, &[(&k1, A51), (&k2, A52), (&k3, A53), (&k4, A54)]),
            &mut k5,
        );
        self.f.system(
            t + C6 * h,
            &stage(
                y,
                h,
                &[(&k1, A61), (&k2, A62), (&k3, A63), (&k4, A64), (&k5, A65)],
            ),
            &mut k6,
        );
        self.stats.num_eval += 6;

        let y_new = stage(
            y,
            h,
            &[(&k1, B1), (&k3, B3), (&k4, B4), (&k5, B5), (&k6, B6)],
        );

        let mut error_ratio: f64 = 0.0;
        for i in 0..n {
            let err = h * (E1 * k1[i] + E3 * k3[i] + E4 * k4[i] + E5 * k5[i] + E6 * k6[i]);
            let scale = self.options.atol + self.options.rtol * y[i].abs().max(y_new[i].abs());
            let ratio = (err / scale).abs();
            if !ratio.is_finite() || !y_new[i].is_finite() {
                return (y_new, f64::INFINITY);
            }
            error_ratio = error_ratio.max(ratio);
        }

        (y_new, error_ratio)
    }
}

/// `y + h * sum(coeff * k)`
fn stage(y: &State, h: Time, terms: &[(&State, f64)]) -> State {
    let mut out = y.clone();
    for &(k, coeff) in terms {
        out.axpy(h * coeff, k, 1.0);
    }
    out
}

fn step_factor(error_ratio: f64) -> f64 {
    if error_ratio <= 0.0 {
        FAC_MAX
    } else {
        (SAFETY * error_ratio.powf(-0.2)).clamp(FAC_MIN, FAC_MAX)
    }
}

/// Final state of an integration, checking it was reported at `t_expected`.
pub fn get_last_step<S>(results: &SolverResult<S>, t_expected: Time) -> ReefResult<&S> {
    let (t, y) = results.get();
    match (t.last(), y.last()) {
        (Some(t_last), Some(y_last)) if is_close!(*t_last, t_expected) => Ok(y_last),
        (Some(t_last), _) => Err(ReefError::Error(format!(
            "integration ended at t={} but t={} was expected",
            t_last, t_expected
        ))),
        _ => Err(ReefError::Error("integration produced no output".to_string())),
    }
}
