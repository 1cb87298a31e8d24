//! Components of the reefcore carbonate core model.
//!
//! - [`components::membership`]: trapezoidal suitability curves
//! - [`components::forcing`]: environmental forcing and limiting factors
//! - [`components::glv`]: generalised Lotka-Volterra population dynamics
//! - [`components::core_record`]: stratigraphic accumulation
//! - [`components::simulation`]: the coupled time stepping loop
//! - [`config`]: TOML configuration

pub mod components;
pub mod config;
