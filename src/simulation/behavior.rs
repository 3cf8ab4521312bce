//! The contract between the iteration driver and the devices it loads.

use crate::error::Result;
use crate::parallel::SharedFlag;
use crate::solver::{ElementProvider, Stamps};
use crate::sparse::{DenseVector, ElementId, MatrixLocation, VectorElementId};

use super::state::InitializationMode;
use super::variables::VariableMap;

/// Something that contributes equations to the system.
///
/// A behavior binds once: it asks for the variables it touches and for
/// handles to the matrix and right-hand side elements it will stamp.
/// Afterwards it is loaded on every Newton-Raphson iteration.
pub trait Behavior: Send + Sync {
    /// Name used in log messages.
    fn name(&self) -> &str;

    /// Allocate variables and element handles.
    fn bind(&mut self, context: &mut BindContext<'_>) -> Result<()>;

    /// Stamp the linearized contribution at the current solution.
    fn load(&mut self, state: &LoadState<'_>, stamps: &mut dyn Stamps<f64>);

    /// Device-level convergence check after the node test passed.
    fn is_convergent(&self, state: &LoadState<'_>) -> bool {
        let _ = state;
        true
    }
}

/// What a behavior may reach while binding.
pub struct BindContext<'a> {
    variables: &'a mut VariableMap,
    provider: &'a mut dyn ElementProvider,
}

impl<'a> BindContext<'a> {
    /// Create a context over a variable map and an element provider.
    pub fn new(variables: &'a mut VariableMap, provider: &'a mut dyn ElementProvider) -> Self {
        Self { variables, provider }
    }

    /// Index of a node voltage.
    pub fn node(&mut self, name: &str) -> usize {
        self.variables.node(name)
    }

    /// Index of a branch current.
    pub fn branch(&mut self, name: &str) -> usize {
        self.variables.branch(name)
    }

    /// Handle to the matrix element at `(row, column)`.
    pub fn matrix(&mut self, row: usize, column: usize) -> ElementId {
        self.provider.matrix_element(MatrixLocation::new(row, column))
    }

    /// Handle to the right-hand side element of `row`.
    pub fn rhs(&mut self, row: usize) -> VectorElementId {
        self.provider.rhs_element(row)
    }

    /// Split into the variable map and the element provider.
    pub fn parts(&mut self) -> (&mut VariableMap, &mut dyn ElementProvider) {
        (&mut *self.variables, &mut *self.provider)
    }
}

/// What a behavior may read while loading.
#[derive(Clone, Copy)]
pub struct LoadState<'a> {
    /// Solution of the previous iteration
    pub solution: &'a DenseVector<f64>,
    pub mode: InitializationMode,
    /// Scale for independent sources
    pub source_factor: f64,
    /// Conductance to put across junctions
    pub gmin: f64,
    /// Conductance the driver adds to every node diagonal
    pub diagonal_gmin: f64,
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    convergence: &'a SharedFlag,
}

impl<'a> LoadState<'a> {
    /// Create a load state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        solution: &'a DenseVector<f64>,
        mode: InitializationMode,
        source_factor: f64,
        gmin: f64,
        diagonal_gmin: f64,
        relative_tolerance: f64,
        absolute_tolerance: f64,
        convergence: &'a SharedFlag,
    ) -> Self {
        Self {
            solution,
            mode,
            source_factor,
            gmin,
            diagonal_gmin,
            relative_tolerance,
            absolute_tolerance,
            convergence,
        }
    }

    /// Value of a variable in the previous solution, 0 for ground.
    pub fn value(&self, index: usize) -> f64 {
        if index == 0 {
            0.0
        } else {
            self.solution[index]
        }
    }

    /// Report that this iteration cannot be the last one, e.g. because a
    /// junction voltage had to be limited.
    pub fn mark_nonconvergent(&self) {
        self.convergence.set(false);
    }
}
