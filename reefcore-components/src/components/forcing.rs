//! Environmental forcing.
//!
//! Converts sea level, tectonic, sediment, flow, temperature, pH and nutrient
//! forcing into per-species growth limiting factors.
//!
//! Every query is a pure function of its arguments. Quantities that depend on the
//! previous step (the previous sea level, the time of the previous tectonic
//! update) are carried by the caller and passed in explicitly.

use crate::components::membership::MembershipSet;
use ndarray::Array1;
use reefcore_core::errors::{ReefError, ReefResult};
use reefcore_core::fitting::ExpDecay;
use reefcore_core::timeseries::{FloatValue, Time, Timeseries};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Closed-form relation between bed elevation and a forcing level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElevationFunction {
    /// $a e^{-b x} + c$ fitted to control points, valid over their elevation range.
    ExpDecay {
        curve: ExpDecay,
        domain: (FloatValue, FloatValue),
    },
    /// $a x + b$, valid for elevations in `[0, max_elevation]`.
    Linear {
        a: FloatValue,
        b: FloatValue,
        max_elevation: FloatValue,
    },
}

impl ElevationFunction {
    /// Fit an exponential decay through `(elevation, value)` control points.
    pub fn fit_exp_decay(elevations: &[FloatValue], values: &[FloatValue]) -> ReefResult<Self> {
        let curve = ExpDecay::fit(elevations, values)?;
        let domain = elevations
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
                (lo.min(*x), hi.max(*x))
            });
        Ok(ElevationFunction::ExpDecay { curve, domain })
    }

    /// Level at `elevation`; zero outside the valid range and never negative.
    pub fn evaluate(&self, elevation: FloatValue) -> FloatValue {
        let level = match self {
            ElevationFunction::ExpDecay {
                curve,
                domain: (lo, hi),
            } => {
                if elevation < *lo || elevation > *hi {
                    0.0
                } else {
                    curve.evaluate(elevation)
                }
            }
            ElevationFunction::Linear {
                a,
                b,
                max_elevation,
            } => {
                if elevation < 0.0 || elevation > *max_elevation {
                    0.0
                } else {
                    a * elevation + b
                }
            }
        };
        level.max(0.0)
    }
}

/// Where the level of a forcing variable comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum ForcingSource {
    /// The variable does not limit growth.
    #[default]
    Disabled,
    Constant(FloatValue),
    /// Interpolated in time, clamped to the sampled range.
    TimeSeries(Timeseries),
    /// Driven by bed elevation rather than time.
    Functional(ElevationFunction),
}

impl ForcingSource {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ForcingSource::Disabled)
    }

    /// Level at `time` and bed `elevation`, or `None` when disabled.
    pub fn level(&self, time: Time, elevation: FloatValue) -> Option<FloatValue> {
        match self {
            ForcingSource::Disabled => None,
            ForcingSource::Constant(value) => Some(*value),
            ForcingSource::TimeSeries(ts) => Some(ts.at_time(time)),
            ForcingSource::Functional(f) => Some(f.evaluate(elevation)),
        }
    }

    fn covers(&self, start: Time, end: Time) -> bool {
        match self {
            ForcingSource::TimeSeries(ts) => {
                let axis = ts.time_axis();
                axis.contains(start) && axis.contains(end)
            }
            _ => true,
        }
    }
}

/// Environmental variables that limit growth through their own membership curves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentalVariable {
    Sediment,
    Flow,
    Temperature,
    Ph,
    Nutrient,
}

impl EnvironmentalVariable {
    pub const ALL: [EnvironmentalVariable; 5] = [
        EnvironmentalVariable::Sediment,
        EnvironmentalVariable::Flow,
        EnvironmentalVariable::Temperature,
        EnvironmentalVariable::Ph,
        EnvironmentalVariable::Nutrient,
    ];

    /// Whether the level may be a function of bed elevation.
    pub fn allows_elevation_function(&self) -> bool {
        matches!(
            self,
            EnvironmentalVariable::Sediment | EnvironmentalVariable::Flow
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            EnvironmentalVariable::Sediment => "sediment",
            EnvironmentalVariable::Flow => "flow",
            EnvironmentalVariable::Temperature => "temperature",
            EnvironmentalVariable::Ph => "ph",
            EnvironmentalVariable::Nutrient => "nutrient",
        }
    }

    fn index(&self) -> usize {
        match self {
            EnvironmentalVariable::Sediment => 0,
            EnvironmentalVariable::Flow => 1,
            EnvironmentalVariable::Temperature => 2,
            EnvironmentalVariable::Ph => 3,
            EnvironmentalVariable::Nutrient => 4,
        }
    }
}

impl fmt::Display for EnvironmentalVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An enabled variable and the curves that limit growth on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForcingChannel {
    source: ForcingSource,
    membership: MembershipSet,
}

/// Result of a sea level query.
#[derive(Debug, Clone, PartialEq)]
pub struct SeaLevelStep {
    pub level: FloatValue,
    /// Bed-top depth after applying the change in sea level.
    pub top: FloatValue,
    pub factors: Array1<FloatValue>,
}

/// Result of a tectonic query.
#[derive(Debug, Clone, PartialEq)]
pub struct TectonicStep {
    /// Uplift rate applied over the elapsed interval (m/yr).
    pub rate: FloatValue,
    /// Bed-top depth after tectonic movement.
    pub top: FloatValue,
    pub factors: Array1<FloatValue>,
}

/// Result of a query for one of the [`EnvironmentalVariable`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentalStep {
    pub level: FloatValue,
    pub factors: Array1<FloatValue>,
}

/// All forcing acting on the simulated column.
///
/// Built once from configuration and queried, never mutated, while a simulation
/// runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentalForcing {
    species_count: usize,
    sea: ForcingSource,
    tectonic: ForcingSource,
    depth: Option<MembershipSet>,
    channels: [Option<ForcingChannel>; 5],
}

impl EnvironmentalForcing {
    /// Forcing with every variable disabled.
    pub fn new(species_count: usize) -> Self {
        Self {
            species_count,
            sea: ForcingSource::Disabled,
            tectonic: ForcingSource::Disabled,
            depth: None,
            channels: Default::default(),
        }
    }

    pub fn species_count(&self) -> usize {
        self.species_count
    }

    pub fn with_sea(mut self, source: ForcingSource) -> ReefResult<Self> {
        if matches!(source, ForcingSource::Functional(_)) {
            return Err(ReefError::config(
                "forcing.sea",
                "sea level cannot be a function of bed elevation",
            ));
        }
        self.sea = source;
        Ok(self)
    }

    pub fn with_tectonic(mut self, source: ForcingSource) -> ReefResult<Self> {
        if matches!(source, ForcingSource::Functional(_)) {
            return Err(ReefError::config(
                "forcing.tectonic",
                "tectonic rate cannot be a function of bed elevation",
            ));
        }
        self.tectonic = source;
        Ok(self)
    }

    /// Depth membership curves used by both sea level and tectonic queries.
    pub fn with_depth_shapes(mut self, membership: MembershipSet) -> ReefResult<Self> {
        self.check_species_count("shapes.depth", &membership)?;
        self.depth = Some(membership);
        Ok(self)
    }

    pub fn with_channel(
        mut self,
        variable: EnvironmentalVariable,
        source: ForcingSource,
        membership: Option<MembershipSet>,
    ) -> ReefResult<Self> {
        if matches!(source, ForcingSource::Functional(_)) && !variable.allows_elevation_function()
        {
            return Err(ReefError::config(
                format!("forcing.{}", variable),
                "only sediment and flow may be functions of bed elevation",
            ));
        }
        if let Some(membership) = &membership {
            self.check_species_count(&format!("shapes.{}", variable), membership)?;
        }
        self.channels[variable.index()] = match (source.is_enabled(), membership) {
            (false, _) => None,
            (true, Some(membership)) => Some(ForcingChannel { source, membership }),
            (true, None) => {
                return Err(ReefError::config(
                    format!("shapes.{}", variable),
                    format!("{} forcing is enabled but no shape curves are defined", variable),
                ))
            }
        };
        Ok(self)
    }

    /// Check that every enabled forcing has membership curves.
    pub fn validate(&self) -> ReefResult<()> {
        if (self.sea.is_enabled() || self.tectonic.is_enabled()) && self.depth.is_none() {
            return Err(ReefError::config(
                "shapes.depth",
                "sea level or tectonic forcing is enabled but no depth shape curves are defined",
            ));
        }
        Ok(())
    }

    fn check_species_count(&self, parameter: &str, membership: &MembershipSet) -> ReefResult<()> {
        if membership.species_count() != self.species_count {
            return Err(ReefError::config(
                parameter,
                format!(
                    "{} shape curves defined for {} species",
                    membership.species_count(),
                    self.species_count
                ),
            ));
        }
        Ok(())
    }

    pub fn sea_enabled(&self) -> bool {
        self.sea.is_enabled()
    }

    pub fn tectonic_enabled(&self) -> bool {
        self.tectonic.is_enabled()
    }

    pub fn is_enabled(&self, variable: EnvironmentalVariable) -> bool {
        self.channels[variable.index()]
            .as_ref()
            .is_some_and(|channel| channel.source.is_enabled())
    }

    fn ones(&self) -> Array1<FloatValue> {
        Array1::ones(self.species_count)
    }

    fn depth_factors(&self, top: FloatValue) -> Array1<FloatValue> {
        match &self.depth {
            Some(depth) => depth.factors(top),
            None => self.ones(),
        }
    }

    /// Sea level at `time` and the bed-top depth it implies.
    ///
    /// The depth changes by the difference between the new level and
    /// `previous_level`; without a previous level `prior_top` is kept as is.
    /// Depth factors are evaluated at the updated depth.
    pub fn sea(
        &self,
        time: Time,
        prior_top: FloatValue,
        previous_level: Option<FloatValue>,
    ) -> SeaLevelStep {
        match self.sea.level(time, prior_top) {
            None => SeaLevelStep {
                level: 0.0,
                top: prior_top,
                factors: self.ones(),
            },
            Some(level) => {
                let top = match previous_level {
                    Some(previous) => prior_top + (level - previous),
                    None => prior_top,
                };
                SeaLevelStep {
                    level,
                    top,
                    factors: self.depth_factors(top),
                }
            }
        }
    }

    /// Tectonic movement between `prior_time` and `time`.
    ///
    /// The depth decreases by `rate * (time - prior_time)`; the rate is reported as
    /// zero when no time has elapsed.
    pub fn tectonic(&self, time: Time, prior_time: Time, prior_top: FloatValue) -> TectonicStep {
        match self.tectonic.level(time, prior_top) {
            None => TectonicStep {
                rate: 0.0,
                top: prior_top,
                factors: self.ones(),
            },
            Some(rate) => {
                let elapsed = time - prior_time;
                let rate = if elapsed == 0.0 { 0.0 } else { rate };
                let top = prior_top - rate * elapsed;
                TectonicStep {
                    rate,
                    top,
                    factors: self.depth_factors(top),
                }
            }
        }
    }

    /// Level of `variable` at `time` and bed `elevation`, with its factors.
    ///
    /// Disabled variables report a zero level and neutral factors.
    pub fn environment(
        &self,
        variable: EnvironmentalVariable,
        time: Time,
        elevation: FloatValue,
    ) -> EnvironmentalStep {
        let enabled = self.channels[variable.index()].as_ref().and_then(|channel| {
            channel
                .source
                .level(time, elevation)
                .map(|level| (level, &channel.membership))
        });
        match enabled {
            Some((level, membership)) => EnvironmentalStep {
                level,
                factors: membership.factors(level),
            },
            None => EnvironmentalStep {
                level: 0.0,
                factors: self.ones(),
            },
        }
    }

    pub fn sediment(&self, time: Time, elevation: FloatValue) -> EnvironmentalStep {
        self.environment(EnvironmentalVariable::Sediment, time, elevation)
    }

    pub fn flow(&self, time: Time, elevation: FloatValue) -> EnvironmentalStep {
        self.environment(EnvironmentalVariable::Flow, time, elevation)
    }

    pub fn temperature(&self, time: Time) -> EnvironmentalStep {
        self.environment(EnvironmentalVariable::Temperature, time, 0.0)
    }

    pub fn ph(&self, time: Time) -> EnvironmentalStep {
        self.environment(EnvironmentalVariable::Ph, time, 0.0)
    }

    pub fn nutrient(&self, time: Time) -> EnvironmentalStep {
        self.environment(EnvironmentalVariable::Nutrient, time, 0.0)
    }

    /// Log a warning for every time series that does not span `[start, end]`.
    ///
    /// Queries outside a series are clamped to its nearest sample, which is
    /// rarely what was intended for a whole run.
    pub fn warn_uncovered(&self, start: Time, end: Time) {
        let named = [("sea", &self.sea), ("tectonic", &self.tectonic)]
            .into_iter()
            .chain(EnvironmentalVariable::ALL.iter().filter_map(|v| {
                self.channels[v.index()]
                    .as_ref()
                    .map(|channel| (v.name(), &channel.source))
            }));
        for (name, source) in named {
            if !source.covers(start, end) {
                warn!(
                    variable = name,
                    start, end, "Forcing curve does not span the simulation; values will be clamped"
                );
            }
        }
    }
}
