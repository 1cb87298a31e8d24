//! Time stepping of the coupled population, forcing and stratigraphy model.

use crate::components::core_record::CoreRecord;
use crate::components::forcing::{EnvironmentalForcing, EnvironmentalVariable};
use crate::components::glv::{apply_population_rules, PopulationSolver};
use crate::components::species::SpeciesSet;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Zip};
use reefcore_core::errors::{ReefError, ReefResult};
use reefcore_core::timeseries::{FloatValue, Time, TimeAxis};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Relative tolerance used when checking that intervals divide exactly.
const MULTIPLE_TOLERANCE: f64 = 1e-9;

/// Number of whole `step`s in `span`, or `None` if `span` is not a multiple of `step`.
pub fn exact_multiple(span: Time, step: Time) -> Option<usize> {
    if !(step > 0.0 && span.is_finite()) || span < 0.0 {
        return None;
    }
    let n = (span / step).round();
    if (n * step - span).abs() <= MULTIPLE_TOLERANCE * span.abs().max(step) {
        Some(n as usize)
    } else {
        None
    }
}

/// Position of a simulation in time.
///
/// Time is tracked as an integer carbonate step index so that layer membership is
/// exact: step `k` belongs to layer `k / steps_per_layer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationClock {
    time_axis: Arc<TimeAxis>,
    dt: Time,
    steps_per_layer: usize,
    step_index: usize,
}

impl SimulationClock {
    pub fn new(start: Time, end: Time, dt: Time, layer_duration: Time) -> ReefResult<Self> {
        if !(start.is_finite() && end.is_finite()) || end <= start {
            return Err(ReefError::config(
                "time",
                format!("end time {end} must be after start time {start}"),
            ));
        }
        if dt.is_nan() || dt <= 0.0 {
            return Err(ReefError::config(
                "time.carbonate_step",
                format!("must be positive, got {dt}"),
            ));
        }
        let steps_per_layer = exact_multiple(layer_duration, dt)
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ReefError::config(
                    "time.layer_duration",
                    format!("{layer_duration} is not a multiple of the carbonate step {dt}"),
                )
            })?;
        exact_multiple(end - start, layer_duration).ok_or_else(|| {
            ReefError::config(
                "time.layer_duration",
                format!(
                    "simulation length {} is not a multiple of the layer duration {layer_duration}",
                    end - start
                ),
            )
        })?;

        Ok(Self {
            time_axis: Arc::new(TimeAxis::range(start, end, dt)?),
            dt,
            steps_per_layer,
            step_index: 0,
        })
    }

    pub fn start(&self) -> Time {
        self.time_axis.first()
    }

    pub fn end(&self) -> Time {
        self.time_axis.last()
    }

    pub fn dt(&self) -> Time {
        self.dt
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    /// Number of carbonate steps in the whole simulation.
    pub fn step_count(&self) -> usize {
        self.time_axis.len() - 1
    }

    pub fn steps_per_layer(&self) -> usize {
        self.steps_per_layer
    }

    pub fn layer_count(&self) -> usize {
        self.step_count() / self.steps_per_layer
    }

    /// Layer receiving the deposits of the current step.
    pub fn layer_index(&self) -> usize {
        (self.step_index / self.steps_per_layer).min(self.layer_count().saturating_sub(1))
    }

    /// Time at the start of the current step.
    pub fn current_time(&self) -> Time {
        self.time_axis.at(self.step_index).unwrap_or(self.end())
    }

    /// Time at the end of the current step.
    pub fn next_time(&self) -> Time {
        self.time_axis.at(self.step_index + 1).unwrap_or(self.end())
    }

    pub fn time_axis(&self) -> Arc<TimeAxis> {
        Arc::clone(&self.time_axis)
    }

    /// Boundaries of the stratigraphic layers, one more than the number of layers.
    pub fn layer_axis(&self) -> ReefResult<TimeAxis> {
        TimeAxis::range(
            self.start(),
            self.end(),
            self.dt * self.steps_per_layer as f64,
        )
    }

    pub fn finished(&self) -> bool {
        self.step_index >= self.step_count()
    }

    fn advance(&mut self) {
        self.step_index += 1;
    }
}

/// Site and stratigraphy parameters that are not tied to a species.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteParameters {
    /// Water depth above the bed top at the start of the run
    /// unit: m
    pub initial_depth: FloatValue,
    /// Erosion rate while the bed top is exposed
    /// unit: m / yr
    pub karst_rate: FloatValue,
    /// Limiting factor at or above which an extinct species recolonises the site
    pub optimal_factor: FloatValue,
}

impl Default for SiteParameters {
    fn default() -> Self {
        Self {
            initial_depth: 0.0,
            karst_rate: 0.0,
            optimal_factor: 1.0,
        }
    }
}

/// Environmental levels recorded for every layer.
///
/// Each entry holds the level seen by the last step deposited in that layer;
/// disabled variables stay at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecords {
    pub sea_level: Array1<FloatValue>,
    pub tectonic_rate: Array1<FloatValue>,
    pub sediment: Array1<FloatValue>,
    pub flow: Array1<FloatValue>,
    pub temperature: Array1<FloatValue>,
    pub ph: Array1<FloatValue>,
    pub nutrient: Array1<FloatValue>,
}

impl LayerRecords {
    fn new(layer_count: usize) -> Self {
        Self {
            sea_level: Array1::zeros(layer_count),
            tectonic_rate: Array1::zeros(layer_count),
            sediment: Array1::zeros(layer_count),
            flow: Array1::zeros(layer_count),
            temperature: Array1::zeros(layer_count),
            ph: Array1::zeros(layer_count),
            nutrient: Array1::zeros(layer_count),
        }
    }

    pub fn get(&self, variable: EnvironmentalVariable) -> ArrayView1<FloatValue> {
        self.array(variable).view()
    }

    fn array(&self, variable: EnvironmentalVariable) -> &Array1<FloatValue> {
        match variable {
            EnvironmentalVariable::Sediment => &self.sediment,
            EnvironmentalVariable::Flow => &self.flow,
            EnvironmentalVariable::Temperature => &self.temperature,
            EnvironmentalVariable::Ph => &self.ph,
            EnvironmentalVariable::Nutrient => &self.nutrient,
        }
    }

    fn array_mut(&mut self, variable: EnvironmentalVariable) -> &mut Array1<FloatValue> {
        match variable {
            EnvironmentalVariable::Sediment => &mut self.sediment,
            EnvironmentalVariable::Flow => &mut self.flow,
            EnvironmentalVariable::Temperature => &mut self.temperature,
            EnvironmentalVariable::Ph => &mut self.ph,
            EnvironmentalVariable::Nutrient => &mut self.nutrient,
        }
    }
}

/// Snapshot of everything a simulation has produced so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResults {
    pub species: Vec<String>,
    /// Start of each carbonate step plus the end time
    pub carbonate_time: Array1<Time>,
    /// Population per species (rows) at each carbonate time (columns)
    pub population: Array2<FloatValue>,
    /// Sea level per carbonate step
    pub sea_level: Array1<FloatValue>,
    /// Accommodation space at the start of each carbonate step
    pub accommodation: Array1<FloatValue>,
    /// Layer boundaries
    pub layer_time: Array1<Time>,
    pub thickness: Array1<FloatValue>,
    pub composition: Array2<FloatValue>,
    pub karst_erosion: Array1<FloatValue>,
    pub layers: LayerRecords,
    /// Final depth of the bed top below sea level
    pub top: FloatValue,
    /// Number of completed carbonate steps
    pub completed_steps: usize,
}

/// A single run of the carbonate core model.
///
/// Each step queries the forcing at the current bed-top depth, limits the growth
/// of every species by its least favourable environmental factor, integrates the
/// populations over the step and deposits (or erodes) the resulting carbonate.
#[derive(Debug, Clone)]
pub struct Simulation {
    clock: SimulationClock,
    species: SpeciesSet,
    forcing: EnvironmentalForcing,
    solver: PopulationSolver,
    site: SiteParameters,
    core: CoreRecord,
    display_interval: Option<Time>,

    trajectory: Array2<FloatValue>,
    sea_level: Array1<FloatValue>,
    accommodation: Array1<FloatValue>,
    layers: LayerRecords,

    previous_sea_level: Option<FloatValue>,
    previous_tectonic_time: Time,
    exposed: bool,
}

impl Simulation {
    pub fn new(
        clock: SimulationClock,
        species: SpeciesSet,
        forcing: EnvironmentalForcing,
        solver: PopulationSolver,
        site: SiteParameters,
    ) -> ReefResult<Self> {
        if forcing.species_count() != species.len() {
            return Err(ReefError::config(
                "habitat.species",
                format!(
                    "forcing is defined for {} species but {} are configured",
                    forcing.species_count(),
                    species.len()
                ),
            ));
        }
        forcing.validate()?;
        if !(site.initial_depth.is_finite() && site.initial_depth >= 0.0) {
            return Err(ReefError::config(
                "habitat.initial_depth",
                format!("must be non-negative, got {}", site.initial_depth),
            ));
        }
        if !(site.karst_rate.is_finite() && site.karst_rate >= 0.0) {
            return Err(ReefError::config(
                "habitat.karst_rate",
                format!("must be non-negative, got {}", site.karst_rate),
            ));
        }
        if !site.optimal_factor.is_finite() {
            return Err(ReefError::config("habitat.optimal_factor", "must be finite"));
        }

        forcing.warn_uncovered(clock.start(), clock.end());

        let n = species.len();
        let steps = clock.step_count();
        let layer_count = clock.layer_count();
        let core = CoreRecord::new(
            layer_count,
            site.initial_depth,
            clock.dt(),
            species.production_rates(),
            species.self_interaction(),
        )?;

        let mut trajectory = Array2::zeros((n, steps + 1));
        trajectory
            .column_mut(0)
            .assign(&Array1::from(species.initial_population()));

        Ok(Self {
            previous_tectonic_time: clock.start(),
            clock,
            species,
            forcing,
            solver,
            site,
            core,
            display_interval: None,
            trajectory,
            sea_level: Array1::zeros(steps),
            accommodation: Array1::zeros(steps),
            layers: LayerRecords::new(layer_count),
            previous_sea_level: None,
            exposed: false,
        })
    }

    /// Log progress every `interval` years of simulated time.
    pub fn with_display_interval(mut self, interval: Option<Time>) -> Self {
        self.display_interval = interval.filter(|i| *i > 0.0);
        self
    }

    pub fn current_time(&self) -> Time {
        self.clock.current_time()
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    pub fn species(&self) -> &SpeciesSet {
        &self.species
    }

    pub fn forcing(&self) -> &EnvironmentalForcing {
        &self.forcing
    }

    pub fn core(&self) -> &CoreRecord {
        &self.core
    }

    pub fn population(&self) -> ArrayView2<FloatValue> {
        self.trajectory.view()
    }

    pub fn sea_level(&self) -> ArrayView1<FloatValue> {
        self.sea_level.view()
    }

    pub fn accommodation(&self) -> ArrayView1<FloatValue> {
        self.accommodation.view()
    }

    pub fn layers(&self) -> &LayerRecords {
        &self.layers
    }

    pub fn finished(&self) -> bool {
        self.clock.finished()
    }

    /// Advance the simulation by one carbonate step.
    ///
    /// State is only updated once the whole step has succeeded, so after an error
    /// the records reflect the last completed step.
    pub fn step(&mut self) -> ReefResult<()> {
        if self.clock.finished() {
            return Err(ReefError::Error(format!(
                "simulation already reached its end time {}",
                self.clock.end()
            )));
        }

        let k = self.clock.step_index();
        let layer = self.clock.layer_index();
        let t = self.clock.current_time();
        let t_next = self.clock.next_time();
        let n = self.species.len();

        let mut top = self.core.top();
        let mut factors = Array1::<FloatValue>::ones(n);

        let mut tectonic_rate = 0.0;
        if self.forcing.tectonic_enabled() {
            let tectonic = self
                .forcing
                .tectonic(t, self.previous_tectonic_time, top);
            tectonic_rate = tectonic.rate;
            top = tectonic.top;
            factors = tectonic.factors;
        }

        let mut sea_level = None;
        if self.forcing.sea_enabled() {
            let sea = self.forcing.sea(t, top, self.previous_sea_level);
            sea_level = Some(sea.level);
            top = sea.top;
            factors = sea.factors;
        }

        let mut levels = Vec::with_capacity(EnvironmentalVariable::ALL.len());
        for variable in EnvironmentalVariable::ALL {
            if !self.forcing.is_enabled(variable) {
                continue;
            }
            let env = self.forcing.environment(variable, t, top);
            Zip::from(&mut factors)
                .and(&env.factors)
                .for_each(|f, e| *f = f.min(*e));
            levels.push((variable, env.level));
        }

        let epsilon: Array1<FloatValue> = Array1::from(self.species.malthus()) * &factors;

        let exhausted = top <= 0.0;
        let population = if exhausted {
            Array1::zeros(n)
        } else {
            let mut population =
                self.solver
                    .solve(epsilon.view(), self.trajectory.column(k), t, t_next)?;
            apply_population_rules(
                &mut population,
                epsilon.view(),
                factors.view(),
                self.species.max_population(),
                self.site.optimal_factor,
            );
            population
        };
        let production = if exhausted {
            None
        } else {
            Some(self.core.production(population.view(), epsilon.view(), t)?)
        };

        // Commit the step
        self.core.set_top(top);
        match production {
            Some(production) => {
                self.core.deposit(layer, production.view())?;
            }
            None => {
                let erosion = self.core.erode(layer, self.site.karst_rate)?;
                if !self.exposed {
                    warn!(
                        time = t,
                        top,
                        erosion,
                        "Accommodation space exhausted; production replaced by karst erosion"
                    );
                }
            }
        }
        self.exposed = exhausted;

        self.trajectory.column_mut(k + 1).assign(&population);
        self.accommodation[k] = top;
        if self.forcing.tectonic_enabled() {
            self.previous_tectonic_time = t;
            self.layers.tectonic_rate[layer] = tectonic_rate;
        }
        if let Some(level) = sea_level {
            self.previous_sea_level = Some(level);
            self.sea_level[k] = level;
            self.layers.sea_level[layer] = level;
        }
        for (variable, level) in levels {
            self.layers.array_mut(variable)[layer] = level;
        }

        debug!(
            time = t,
            layer,
            top = self.core.top(),
            deposited = self.core.thickness()[layer],
            "Carbonate step complete"
        );

        self.clock.advance();
        Ok(())
    }

    /// Step until `time` is reached.
    ///
    /// A target after the configured end time is truncated to it.
    pub fn run_to_time(&mut self, time: Time) -> ReefResult<()> {
        let mut target = time;
        if target > self.clock.end() {
            warn!(
                requested = time,
                end = self.clock.end(),
                "Requested time is after the simulation end; the run stops at the end time"
            );
            target = self.clock.end();
        }

        info!(time = self.current_time(), target, "Running simulation");
        let mut next_report = self.display_interval.map(|i| self.current_time() + i);

        while !self.clock.finished() && self.current_time() < target {
            self.step()?;

            if let (Some(report), Some(interval)) = (next_report, self.display_interval) {
                if self.current_time() >= report {
                    info!(
                        time = self.current_time(),
                        top = self.core.top(),
                        thickness = self.core.total_thickness(),
                        "Simulation progress"
                    );
                    next_report = Some(self.current_time() + interval);
                }
            }
        }

        info!(
            time = self.current_time(),
            thickness = self.core.total_thickness(),
            "Simulation paused"
        );
        Ok(())
    }

    /// Step until the configured end time.
    pub fn run(&mut self) -> ReefResult<()> {
        self.run_to_time(self.clock.end())
    }

    pub fn results(&self) -> ReefResult<SimulationResults> {
        Ok(SimulationResults {
            species: self.species.names(),
            carbonate_time: self.clock.time_axis().values().to_owned(),
            population: self.trajectory.clone(),
            sea_level: self.sea_level.clone(),
            accommodation: self.accommodation.clone(),
            layer_time: self.clock.layer_axis()?.values().to_owned(),
            thickness: self.core.thickness().to_owned(),
            composition: self.core.composition().to_owned(),
            karst_erosion: self.core.karst_erosion().to_owned(),
            layers: self.layers.clone(),
            top: self.core.top(),
            completed_steps: self.clock.step_index(),
        })
    }
}
