//! Trapezoidal fuzzy membership curves.
//!
//! Each species carries, per environmental variable, a trapezoid describing how
//! suitable a value of that variable is for growth. The curves of all species
//! share one sampling grid spanning `[0, max breakpoint]`.

use ndarray::Array1;
use reefcore_core::errors::{ReefError, ReefResult};
use reefcore_core::timeseries::FloatValue;
use serde::{Deserialize, Serialize};

/// Number of evenly spaced samples in a membership grid.
pub const DEFAULT_SAMPLE_COUNT: usize = 1001;

/// Breakpoints `a <= b <= c <= d` of a trapezoidal membership function.
///
/// The membership is 0 below `a`, ramps up to 1 on `[a, b]`, stays at 1 on
/// `[b, c]`, ramps down to 0 on `[c, d]` and is 0 above `d`. A vertical edge
/// (`a == b` or `c == d`) belongs to the plateau.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[FloatValue; 4]", into = "[FloatValue; 4]")]
pub struct Trapezoid {
    a: FloatValue,
    b: FloatValue,
    c: FloatValue,
    d: FloatValue,
}

impl Trapezoid {
    pub fn new(breakpoints: [FloatValue; 4]) -> ReefResult<Self> {
        let [a, b, c, d] = breakpoints;
        if breakpoints.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ReefError::Error(format!(
                "trapezoid breakpoints must be finite and non-negative, got {:?}",
                breakpoints
            )));
        }
        if !(a <= b && b <= c && c <= d) {
            return Err(ReefError::Error(format!(
                "trapezoid breakpoints must be non-decreasing, got {:?}",
                breakpoints
            )));
        }
        Ok(Self { a, b, c, d })
    }

    pub fn breakpoints(&self) -> [FloatValue; 4] {
        [self.a, self.b, self.c, self.d]
    }

    /// True when the rising edge is a step, so values below the curve domain are
    /// fully suitable.
    pub fn open_below(&self) -> bool {
        self.a == self.b
    }

    /// True when the falling edge is a step, so values above the curve domain are
    /// fully suitable.
    pub fn open_above(&self) -> bool {
        self.c == self.d
    }

    /// Exact degree of membership at `x`.
    pub fn evaluate(&self, x: FloatValue) -> FloatValue {
        if x < self.a || x > self.d {
            0.0
        } else if x < self.b {
            (x - self.a) / (self.b - self.a)
        } else if x <= self.c {
            1.0
        } else {
            (self.d - x) / (self.d - self.c)
        }
    }
}

impl TryFrom<[FloatValue; 4]> for Trapezoid {
    type Error = ReefError;

    fn try_from(value: [FloatValue; 4]) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Trapezoid> for [FloatValue; 4] {
    fn from(value: Trapezoid) -> Self {
        value.breakpoints()
    }
}

/// Sample `shape` on every point of `grid`.
pub fn build_trapezoid(shape: &Trapezoid, grid: &[FloatValue]) -> Vec<FloatValue> {
    grid.iter().map(|x| shape.evaluate(*x)).collect()
}

/// Degree of membership at `query` from a sampled curve.
///
/// Linearly interpolates between the two grid points bracketing `query`; when
/// those coincide the sampled value is returned as is. Queries outside the grid
/// are clamped onto it, callers are expected to apply the edge rule of
/// [`MembershipSet::factor`] first. An empty curve has no membership anywhere.
pub fn membership_at(grid: &[FloatValue], curve: &[FloatValue], query: FloatValue) -> FloatValue {
    let n = grid.len().min(curve.len());
    if n == 0 {
        return 0.0;
    }
    let grid = &grid[..n];
    let query = query.clamp(grid[0], grid[n - 1]);

    let upper = grid.partition_point(|x| *x < query).min(n - 1);
    let lower = grid.partition_point(|x| *x <= query).saturating_sub(1);
    let (x1, x2) = (grid[lower], grid[upper]);

    if lower >= upper || x1 == x2 {
        return curve[lower];
    }
    let slope = (curve[upper] - curve[lower]) / (x2 - x1);
    slope * (query - x1) + curve[lower]
}

/// Membership curves of every species for one environmental variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipSet {
    shapes: Vec<Trapezoid>,
    grid: Vec<FloatValue>,
    curves: Vec<Vec<FloatValue>>,
}

impl MembershipSet {
    pub fn new(shapes: Vec<Trapezoid>) -> ReefResult<Self> {
        Self::with_sample_count(shapes, DEFAULT_SAMPLE_COUNT)
    }

    /// Sample the curves of all species on a shared grid.
    ///
    /// The grid holds `sample_count` evenly spaced points over
    /// `[0, max breakpoint]` plus every breakpoint of every species, so the
    /// sampled curves reproduce the trapezoids exactly between grid points.
    pub fn with_sample_count(shapes: Vec<Trapezoid>, sample_count: usize) -> ReefResult<Self> {
        if shapes.is_empty() {
            return Err(ReefError::Error(
                "a membership set needs at least one species shape".to_string(),
            ));
        }
        if sample_count < 2 {
            return Err(ReefError::Error(format!(
                "a membership grid needs at least 2 samples, got {}",
                sample_count
            )));
        }

        let domain_max = shapes
            .iter()
            .flat_map(|s| s.breakpoints())
            .fold(0.0, FloatValue::max);

        let mut grid = Array1::linspace(0.0, domain_max, sample_count).to_vec();
        grid.extend(shapes.iter().flat_map(|s| s.breakpoints()));
        grid.sort_by(|p, q| p.total_cmp(q));
        grid.dedup();

        let curves = shapes.iter().map(|s| build_trapezoid(s, &grid)).collect();

        Ok(Self {
            shapes,
            grid,
            curves,
        })
    }

    pub fn species_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn shapes(&self) -> &[Trapezoid] {
        &self.shapes
    }

    pub fn grid(&self) -> &[FloatValue] {
        &self.grid
    }

    pub fn curve(&self, species: usize) -> &[FloatValue] {
        &self.curves[species]
    }

    /// Limiting factor of one species for the environmental `value`.
    ///
    /// Values below the grid resolve to 1 when the rising edge is a step and 0
    /// otherwise; values above the grid use the falling edge the same way.
    pub fn factor(&self, species: usize, value: FloatValue) -> FloatValue {
        let shape = &self.shapes[species];
        let (lo, hi) = (self.grid[0], self.grid[self.grid.len() - 1]);

        if value < lo {
            if shape.open_below() {
                1.0
            } else {
                0.0
            }
        } else if value > hi {
            if shape.open_above() {
                1.0
            } else {
                0.0
            }
        } else {
            membership_at(&self.grid, &self.curves[species], value)
        }
    }

    /// Limiting factors of all species for the environmental `value`.
    pub fn factors(&self, value: FloatValue) -> Array1<FloatValue> {
        (0..self.shapes.len())
            .map(|s| self.factor(s, value))
            .collect()
    }
}
