//! Numerical building blocks for the reefcore carbonate core model.
//!
//! - [`timeseries`]: sampled forcing curves and their file format
//! - [`interpolate`]: linear and cubic spline interpolation
//! - [`ivp`]: initial value problems and the adaptive Fehlberg integrator
//! - [`fitting`]: exponential decay fits for elevation driven forcing
//! - [`curves`]: synthetic forcing curve generation

pub mod curves;
pub mod fitting;
pub mod interpolate;
pub mod ivp;
pub mod timeseries;
pub mod utils;

pub mod errors;
