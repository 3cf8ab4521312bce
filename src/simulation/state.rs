//! Iteration state and statistics.

use std::fmt;
use std::time::Duration;

use crate::parallel::SharedFlag;
use crate::sparse::DenseVector;

/// How devices should pick their starting point in an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitializationMode {
    /// Junctions start at their critical voltage
    Junction,
    /// Junctions are linearized at the last solution, node sets still apply
    Fix,
    /// Plain Newton-Raphson
    Float,
    /// First iteration of a time point
    Transient,
}

/// Bookkeeping of the solver's pivot order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SparseFlags {
    /// The matrix was preordered for modified nodal analysis
    pub did_preorder: bool,
    /// The next factorization must search new pivots
    pub should_reorder: bool,
}

/// State of a biasing simulation between iterations.
#[derive(Debug)]
pub struct BiasingState {
    /// Latest solution
    pub solution: DenseVector<f64>,
    /// Solution of the previous iteration
    pub old_solution: DenseVector<f64>,
    pub mode: InitializationMode,
    pub sparse: SparseFlags,
    /// Cleared by anything that decides the current iteration is not done
    pub convergence: SharedFlag,
    /// Conductance devices add across their junctions
    pub gmin: f64,
    /// Conductance added to every node diagonal (Gmin stepping)
    pub diagonal_gmin: f64,
    /// Scale applied to independent sources (source stepping)
    pub source_factor: f64,
    pub had_node_set: bool,
}

impl BiasingState {
    /// Create the state for `size` unknowns.
    pub fn new(size: usize, gmin: f64) -> Self {
        Self {
            solution: DenseVector::new(size),
            old_solution: DenseVector::new(size),
            mode: InitializationMode::Junction,
            sparse: SparseFlags::default(),
            convergence: SharedFlag::new(true),
            gmin,
            diagonal_gmin: 0.0,
            source_factor: 1.0,
            had_node_set: false,
        }
    }

    /// The current solution becomes the old solution.
    pub fn store_solution(&mut self) {
        self.old_solution.copy_from(&self.solution);
    }
}

/// Counters and timings collected by a simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statistics {
    /// Newton-Raphson iterations over all attempts
    pub iterations: usize,
    pub reorders: usize,
    pub factorizations: usize,
    pub solves: usize,
    pub load_time: Duration,
    pub reorder_time: Duration,
    pub factor_time: Duration,
    pub solve_time: Duration,
}

impl Statistics {
    /// Reset all counters.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "iterations:      {}", self.iterations)?;
        writeln!(f, "reorders:        {} ({:?})", self.reorders, self.reorder_time)?;
        writeln!(f, "factorizations:  {} ({:?})", self.factorizations, self.factor_time)?;
        writeln!(f, "solves:          {} ({:?})", self.solves, self.solve_time)?;
        write!(f, "load time:       {:?}", self.load_time)
    }
}
