//! TOML configuration of a simulation.
//!
//! ```toml
//! [time]
//! start = 0.0
//! end = 500.0
//! carbonate_step = 10.0
//! layer_duration = 50.0
//!
//! [habitat]
//! initial_depth = 10.0
//! community_matrix = [[-0.01]]
//!
//! [[habitat.species]]
//! name = "branching"
//! malthus = 0.05
//! population = 1.0
//! production = 0.005
//!
//! [shapes]
//! depth = [[0.0, 0.0, 5.0, 20.0]]
//!
//! [forcing.sea]
//! kind = "curve"
//! path = "sealevel.csv"
//! ```
//!
//! Forcing tables that are absent disable the corresponding variable. Relative
//! forcing file paths are resolved against the directory of the configuration file.

use crate::components::forcing::{
    ElevationFunction, EnvironmentalForcing, EnvironmentalVariable, ForcingSource,
};
use crate::components::glv::{PopulationSolver, DEFAULT_SUBSTEPS};
use crate::components::membership::{MembershipSet, Trapezoid};
use crate::components::simulation::{Simulation, SimulationClock, SiteParameters};
use crate::components::species::{Species, SpeciesSet};
use ndarray::Array2;
use reefcore_core::errors::{ReefError, ReefResult};
use reefcore_core::interpolate::InterpolationKind;
use reefcore_core::ivp::Rkf45Options;
use reefcore_core::timeseries::{FloatValue, Time, TimeAxis, Timeseries};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Simulated time span and step sizes
/// unit: yr
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeParameters {
    pub start: Time,
    pub end: Time,
    /// Duration of one population integration window
    pub carbonate_step: Time,
    /// Duration of a stratigraphic layer, defaults to the carbonate step
    #[serde(default)]
    pub layer_duration: Option<Time>,
    /// Interval between progress log messages
    #[serde(default)]
    pub display_interval: Option<Time>,
}

impl TimeParameters {
    pub fn layer_duration(&self) -> Time {
        self.layer_duration.unwrap_or(self.carbonate_step)
    }
}

/// Integrator settings for the population solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverParameters {
    pub rtol: FloatValue,
    pub atol: FloatValue,
    pub min_step: FloatValue,
    pub max_steps: usize,
    /// Output sub-steps per carbonate step
    pub substeps: usize,
}

impl Default for SolverParameters {
    fn default() -> Self {
        let options = Rkf45Options::default();
        Self {
            rtol: options.rtol,
            atol: options.atol,
            min_step: options.min_step,
            max_steps: options.max_steps,
            substeps: DEFAULT_SUBSTEPS,
        }
    }
}

impl SolverParameters {
    pub fn options(&self) -> Rkf45Options {
        Rkf45Options {
            rtol: self.rtol,
            atol: self.atol,
            min_step: self.min_step,
            max_steps: self.max_steps,
        }
    }

    fn validate(&self) -> ReefResult<()> {
        for (name, value) in [
            ("solver.rtol", self.rtol),
            ("solver.atol", self.atol),
            ("solver.min_step", self.min_step),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ReefError::config(name, format!("must be positive, got {value}")));
            }
        }
        if self.substeps == 0 {
            return Err(ReefError::config("solver.substeps", "must be at least 1"));
        }
        if self.max_steps == 0 {
            return Err(ReefError::config("solver.max_steps", "must be at least 1"));
        }
        Ok(())
    }
}

fn default_max_population() -> FloatValue {
    20.0
}

fn default_optimal_factor() -> FloatValue {
    1.0
}

/// Site description and species assemblage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HabitatParameters {
    /// Water depth above the initial bed top
    /// unit: m
    pub initial_depth: FloatValue,
    /// Cap on the population of every species
    #[serde(default = "default_max_population")]
    pub max_population: FloatValue,
    /// Erosion rate of exposed carbonate
    /// unit: m / yr
    #[serde(default)]
    pub karst_rate: FloatValue,
    /// Limiting factor at or above which an extinct species is reseeded
    #[serde(default = "default_optimal_factor")]
    pub optimal_factor: FloatValue,
    /// Expected number of species, checked against the species list
    #[serde(default)]
    pub species_count: Option<usize>,
    /// Row `i` holds the effect of every species on species `i`
    pub community_matrix: Vec<Vec<FloatValue>>,
    pub species: Vec<Species>,
}

impl HabitatParameters {
    pub fn site(&self) -> SiteParameters {
        SiteParameters {
            initial_depth: self.initial_depth,
            karst_rate: self.karst_rate,
            optimal_factor: self.optimal_factor,
        }
    }

    /// Species and community matrix, validated for shape and finiteness.
    pub fn species_set(&self) -> ReefResult<SpeciesSet> {
        let n = self.species.len();
        if let Some(expected) = self.species_count {
            if expected != n {
                return Err(ReefError::config(
                    "habitat.species_count",
                    format!("{expected} species declared but {n} defined"),
                ));
            }
        }
        if self.community_matrix.len() != n {
            return Err(ReefError::config(
                "habitat.community_matrix",
                format!(
                    "expected {n} rows, one per species, got {}",
                    self.community_matrix.len()
                ),
            ));
        }
        if let Some((i, row)) = self
            .community_matrix
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != n)
        {
            return Err(ReefError::config(
                "habitat.community_matrix",
                format!("row {i} has {} entries, expected {n}", row.len()),
            ));
        }

        let values = self.community_matrix.iter().flatten().copied().collect();
        let community = Array2::from_shape_vec((n, n), values)
            .map_err(|e| ReefError::config("habitat.community_matrix", e.to_string()))?;
        SpeciesSet::new(self.species.clone(), community, self.max_population)
    }
}

/// Membership curves per environmental variable, one `[a, b, c, d]` row per species
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShapeParameters {
    pub depth: Option<Vec<Trapezoid>>,
    pub sediment: Option<Vec<Trapezoid>>,
    pub flow: Option<Vec<Trapezoid>>,
    pub temperature: Option<Vec<Trapezoid>>,
    pub ph: Option<Vec<Trapezoid>>,
    pub nutrient: Option<Vec<Trapezoid>>,
}

impl ShapeParameters {
    pub fn get(&self, variable: EnvironmentalVariable) -> Option<&Vec<Trapezoid>> {
        match variable {
            EnvironmentalVariable::Sediment => self.sediment.as_ref(),
            EnvironmentalVariable::Flow => self.flow.as_ref(),
            EnvironmentalVariable::Temperature => self.temperature.as_ref(),
            EnvironmentalVariable::Ph => self.ph.as_ref(),
            EnvironmentalVariable::Nutrient => self.nutrient.as_ref(),
        }
    }
}

fn membership(shapes: Option<&Vec<Trapezoid>>) -> ReefResult<Option<MembershipSet>> {
    shapes.map(|s| MembershipSet::new(s.clone())).transpose()
}

/// How the level of a forcing variable is obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForcingSpec {
    Constant {
        value: FloatValue,
    },
    /// Two column (time, value) file, optionally resampled onto an even step
    Curve {
        path: PathBuf,
        #[serde(default)]
        interpolation: InterpolationKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resample: Option<Time>,
    },
    /// Samples given inline
    Samples {
        times: Vec<Time>,
        values: Vec<FloatValue>,
        #[serde(default)]
        interpolation: InterpolationKind,
    },
    /// Exponential decay with bed elevation fitted to control points
    ExpDecay {
        elevations: Vec<FloatValue>,
        values: Vec<FloatValue>,
    },
    /// Linear relation with bed elevation, `a * x + b` up to `max_elevation`
    Linear {
        a: FloatValue,
        b: FloatValue,
        max_elevation: FloatValue,
    },
}

impl ForcingSpec {
    /// Resolve into a forcing source, reading files relative to `base_dir`.
    pub fn build(&self, parameter: &str, base_dir: &Path) -> ReefResult<ForcingSource> {
        let source = match self {
            ForcingSpec::Constant { value } => {
                if !value.is_finite() {
                    return Err(ReefError::config(parameter, "constant must be finite"));
                }
                ForcingSource::Constant(*value)
            }
            ForcingSpec::Curve {
                path,
                interpolation,
                resample,
            } => {
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    base_dir.join(path)
                };
                let ts = Timeseries::from_file(&path, *interpolation)?;
                let ts = match resample {
                    Some(step) if !(step.is_finite() && *step > 0.0) => {
                        return Err(ReefError::config(
                            parameter,
                            format!("resample step must be positive, got {step}"),
                        ))
                    }
                    Some(step) => ts
                        .resample(*step)
                        .map_err(|e| ReefError::config(parameter, e.to_string()))?,
                    None => ts,
                };
                ForcingSource::TimeSeries(ts)
            }
            ForcingSpec::Samples {
                times,
                values,
                interpolation,
            } => {
                let axis = TimeAxis::from_values(times.clone())
                    .map_err(|e| ReefError::config(parameter, e.to_string()))?;
                let ts = Timeseries::new(values.clone(), Arc::new(axis), *interpolation)
                    .map_err(|e| ReefError::config(parameter, e.to_string()))?;
                ForcingSource::TimeSeries(ts)
            }
            ForcingSpec::ExpDecay { elevations, values } => {
                if elevations.len() != values.len() {
                    return Err(ReefError::config(
                        parameter,
                        format!(
                            "{} elevations but {} values",
                            elevations.len(),
                            values.len()
                        ),
                    ));
                }
                let function = ElevationFunction::fit_exp_decay(elevations, values)
                    .map_err(|e| ReefError::config(parameter, e.to_string()))?;
                ForcingSource::Functional(function)
            }
            ForcingSpec::Linear {
                a,
                b,
                max_elevation,
            } => {
                if ![*a, *b, *max_elevation].iter().all(|v| v.is_finite()) || *max_elevation < 0.0
                {
                    return Err(ReefError::config(
                        parameter,
                        "coefficients must be finite and max_elevation non-negative",
                    ));
                }
                ForcingSource::Functional(ElevationFunction::Linear {
                    a: *a,
                    b: *b,
                    max_elevation: *max_elevation,
                })
            }
        };
        Ok(source)
    }
}

/// Forcing per variable; an absent entry disables the variable
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForcingParameters {
    pub sea: Option<ForcingSpec>,
    pub tectonic: Option<ForcingSpec>,
    pub sediment: Option<ForcingSpec>,
    pub flow: Option<ForcingSpec>,
    pub temperature: Option<ForcingSpec>,
    pub ph: Option<ForcingSpec>,
    pub nutrient: Option<ForcingSpec>,
}

impl ForcingParameters {
    pub fn get(&self, variable: EnvironmentalVariable) -> Option<&ForcingSpec> {
        match variable {
            EnvironmentalVariable::Sediment => self.sediment.as_ref(),
            EnvironmentalVariable::Flow => self.flow.as_ref(),
            EnvironmentalVariable::Temperature => self.temperature.as_ref(),
            EnvironmentalVariable::Ph => self.ph.as_ref(),
            EnvironmentalVariable::Nutrient => self.nutrient.as_ref(),
        }
    }
}

fn build_source(
    spec: Option<&ForcingSpec>,
    parameter: &str,
    base_dir: &Path,
) -> ReefResult<ForcingSource> {
    spec.map(|s| s.build(parameter, base_dir))
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Complete description of a simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReefConfig {
    pub time: TimeParameters,
    #[serde(default)]
    pub solver: SolverParameters,
    pub habitat: HabitatParameters,
    #[serde(default)]
    pub shapes: ShapeParameters,
    #[serde(default)]
    pub forcing: ForcingParameters,
    /// Directory relative forcing paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl ReefConfig {
    /// Parse a configuration document, resolving relative paths against `base_dir`.
    pub fn from_toml_str(contents: &str, base_dir: &Path) -> ReefResult<Self> {
        let mut config: ReefConfig = toml::from_str(contents)
            .map_err(|e| ReefError::config("document", e.to_string()))?;
        config.base_dir = base_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ReefResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ReefError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&contents, base_dir)
    }

    /// Checks that do not need forcing files to be read.
    pub fn validate(&self) -> ReefResult<()> {
        self.clock()?;
        self.solver.validate()?;
        self.habitat.species_set()?;
        if let Some(interval) = self.time.display_interval {
            if !(interval.is_finite() && interval > 0.0) {
                return Err(ReefError::config(
                    "time.display_interval",
                    format!("must be positive, got {interval}"),
                ));
            }
        }
        Ok(())
    }

    pub fn clock(&self) -> ReefResult<SimulationClock> {
        SimulationClock::new(
            self.time.start,
            self.time.end,
            self.time.carbonate_step,
            self.time.layer_duration(),
        )
    }

    /// Read forcing inputs and assemble the forcing provider.
    pub fn forcing(&self, species_count: usize) -> ReefResult<EnvironmentalForcing> {
        let mut forcing = EnvironmentalForcing::new(species_count)
            .with_sea(build_source(
                self.forcing.sea.as_ref(),
                "forcing.sea",
                &self.base_dir,
            )?)?
            .with_tectonic(build_source(
                self.forcing.tectonic.as_ref(),
                "forcing.tectonic",
                &self.base_dir,
            )?)?;
        if let Some(depth) = membership(self.shapes.depth.as_ref())? {
            forcing = forcing.with_depth_shapes(depth)?;
        }
        for variable in EnvironmentalVariable::ALL {
            let source = build_source(
                self.forcing.get(variable),
                &format!("forcing.{variable}"),
                &self.base_dir,
            )?;
            forcing =
                forcing.with_channel(variable, source, membership(self.shapes.get(variable))?)?;
        }
        forcing.validate()?;
        Ok(forcing)
    }

    /// Build a simulation ready to run from the start time.
    pub fn build_simulation(&self) -> ReefResult<Simulation> {
        let species = self.habitat.species_set()?;
        let forcing = self.forcing(species.len())?;
        let solver = PopulationSolver::new(
            species.community().clone(),
            self.solver.options(),
            self.solver.substeps,
        );

        info!(
            species = species.len(),
            start = self.time.start,
            end = self.time.end,
            "Simulation configured"
        );
        Ok(Simulation::new(self.clock()?, species, forcing, solver, self.habitat.site())?
            .with_display_interval(self.time.display_interval))
    }
}
