//! Synthetic coral reef carbonate cores.
//!
//! Species populations follow generalised Lotka-Volterra dynamics whose growth
//! rates are limited by environmental forcing through trapezoidal suitability
//! curves. The carbonate they produce is accumulated into a layered stratigraphic
//! record while sea level, tectonics and deposition change the accommodation space
//! above the bed.
//!
//! ```no_run
//! use std::path::Path;
//!
//! let results = reefcore::run_from_file(Path::new("reef.toml")).unwrap();
//! println!("{} m of carbonate", results.thickness.sum());
//! ```

pub use reefcore_components::components::core_record::CoreRecord;
pub use reefcore_components::components::forcing::{
    ElevationFunction, EnvironmentalForcing, EnvironmentalVariable, ForcingSource,
};
pub use reefcore_components::components::membership::{MembershipSet, Trapezoid};
pub use reefcore_components::components::simulation::{
    LayerRecords, Simulation, SimulationClock, SimulationResults, SiteParameters,
};
pub use reefcore_components::components::species::{Species, SpeciesSet};
pub use reefcore_components::config::ReefConfig;
pub use reefcore_core::curves::{build_curve, write_curve, CurveParameters};
pub use reefcore_core::errors::{ReefError, ReefResult};
pub use reefcore_core::interpolate::InterpolationKind;
pub use reefcore_core::timeseries::{Time, Timeseries};

use std::path::Path;
use tracing::info;

/// Load a configuration file and run the simulation it describes to completion.
pub fn run_from_file(path: &Path) -> ReefResult<SimulationResults> {
    info!(path = %path.display(), "Loading configuration");
    let config = ReefConfig::from_file(path)?;
    let mut simulation = config.build_simulation()?;
    simulation.run()?;
    simulation.results()
}
