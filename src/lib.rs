//! # Nodal Core
//!
//! A sparse linear solver and DC operating point driver for circuit
//! simulation.
//!
//! This library provides:
//! - Linked sparse matrices with stable element handles
//! - LU factorization with Markowitz pivoting, for real and complex systems
//! - A Newton-Raphson driver with Gmin and source stepping
//! - Parallel loading of device contributions
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`sparse`] - Sparse matrix and vector storage
//! - [`solver`] - Pivoting, factorization and substitution
//! - [`simulation`] - Behaviors and the operating point search
//! - [`parallel`] - Work distribution and element bridging for concurrent loads
//! - [`components`] - Reference devices (resistor, sources, diode)
//!
//! ## Usage
//!
//! ```
//! use nodal_core::components::{Diode, DiodeParams, Resistor, VoltageSource};
//! use nodal_core::simulation::{BiasingConfig, BiasingSimulation};
//!
//! let mut sim = BiasingSimulation::new(BiasingConfig::default());
//! sim.add_behavior(VoltageSource::new("V1", "in", "0", 5.0));
//! sim.add_behavior(Resistor::new("R1", "in", "out", 1e3));
//! sim.add_behavior(Diode::new("D1", "out", "0", DiodeParams::default()));
//! sim.run().unwrap();
//!
//! let v = sim.voltage("out").unwrap();
//! assert!(v > 0.5 && v < 0.9);
//! ```
//!
//! ## Solution Method
//!
//! Every Newton-Raphson iteration:
//!
//! 1. Loads the linearized device equations into the sparse matrix and right-hand side
//! 2. Factors the matrix, reusing the previous pivot order when it is still valid
//! 3. Solves for node voltages and branch currents and checks convergence
//!
//! Index 0 is ground everywhere. It is never part of the system and writes
//! to it are discarded.

pub mod components;
pub mod error;
pub mod parallel;
pub mod simulation;
pub mod solver;
pub mod sparse;

// Re-export main types for convenience
pub use error::{NodalError, Result};
pub use simulation::BiasingSimulation;
pub use solver::{ComplexSolver, RealSolver, SparseLuSolver};

/// Thermal voltage at room temperature (approximately 26mV)
pub const THERMAL_VOLTAGE: f64 = 0.0258;
