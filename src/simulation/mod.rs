//! DC operating point analysis.
//!
//! A [`BiasingSimulation`] owns a [`RealSolver`](crate::solver::RealSolver)
//! and a list of [`Behavior`]s. Behaviors bind once to allocate variables
//! and matrix elements, then stamp their linearization on every
//! Newton-Raphson iteration. When plain iteration does not converge the
//! search falls back to Gmin stepping and source stepping.

mod behavior;
mod config;
mod newton;
mod operating_point;
mod state;
mod variables;

pub use behavior::{Behavior, BindContext, LoadState};
pub use config::BiasingConfig;
pub use newton::BiasingSimulation;
pub use operating_point::Phase;
pub use state::{BiasingState, InitializationMode, SparseFlags, Statistics};
pub use variables::{Variable, VariableKind, VariableMap, GROUND_NAMES};

/// Default minimum conductance across junctions (siemens)
pub const DEFAULT_GMIN: f64 = 1e-12;

/// Default number of Gmin steps
pub const DEFAULT_GMIN_STEPS: usize = 10;

/// Default number of source steps
pub const DEFAULT_SOURCE_STEPS: usize = 10;

/// Default maximum Newton-Raphson iterations
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Default relative tolerance
pub const DEFAULT_RELATIVE_TOLERANCE: f64 = 1e-3;

/// Default absolute current tolerance (amperes)
pub const DEFAULT_ABSOLUTE_TOLERANCE: f64 = 1e-12;

/// Default absolute voltage tolerance (volts)
pub const DEFAULT_VOLTAGE_TOLERANCE: f64 = 1e-6;

/// Diagonal weight of a node set on a row that also carries branch currents
pub const NODE_SET_WEIGHT: f64 = 1e10;
