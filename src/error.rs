//! Error types for the nodal solver.
//!
//! This module provides a unified error type [`NodalError`] that covers
//! all error conditions that can occur while building, factoring and solving
//! sparse systems, and while driving the Newton-Raphson iteration.

use thiserror::Error;

/// Result type alias using [`NodalError`].
pub type Result<T> = std::result::Result<T, NodalError>;

/// Unified error type for all nodal operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodalError {
    // ============ Algebra Errors ============
    /// An index was outside the range the structure can address
    #[error("Invalid index {index} (valid range is 1..={size})")]
    InvalidIndex { index: usize, size: usize },

    /// A zero or missing pivot was found while reusing a pivot order
    #[error("Invalid pivot at row {row}, column {column}")]
    InvalidPivot { row: usize, column: usize },

    /// No admissible pivot remained in the active submatrix
    #[error("Singular matrix at row {row}, column {column} - circuit may have a floating node or a voltage loop")]
    SingularMatrix { row: usize, column: usize },

    /// Solve was requested before a successful factorization
    #[error("Solver is not factored, cannot {operation}")]
    NotFactored { operation: &'static str },

    /// A vector's length did not agree with the solver size
    #[error("Vector length {actual} does not match solver size {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    // ============ Simulation Errors ============
    /// Newton-Raphson iteration did not converge
    #[error("Newton-Raphson did not converge after {iterations} iterations{}", problem_suffix(.variable))]
    NonConvergence {
        iterations: usize,
        variable: Option<String>,
    },

    /// A solution value became NaN
    #[error("Non-convergence, variable '{variable}' is not a number")]
    NotANumber { variable: String },

    /// Neither direct iteration nor any continuation method found a solution
    #[error("Could not determine operating point ({method} failed)")]
    OperatingPointNotFound { method: &'static str },

    /// A simulation has not been set up before use
    #[error("Simulation is not set up, call setup() first")]
    NotSetUp,

    // ============ Configuration Errors ============
    /// Invalid configuration parameter
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// Unknown variable (node or branch) name
    #[error("Variable '{name}' not found")]
    VariableNotFound { name: String },
}

fn problem_suffix(variable: &Option<String>) -> String {
    match variable {
        Some(name) => format!(" (problem variable '{}')", name),
        None => String::new(),
    }
}

impl NodalError {
    /// Create an invalid index error
    pub fn invalid_index(index: usize, size: usize) -> Self {
        Self::InvalidIndex { index, size }
    }

    /// Create a length mismatch error
    pub fn length_mismatch(expected: usize, actual: usize) -> Self {
        Self::LengthMismatch { expected, actual }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    /// Create a non-convergence error
    pub fn non_convergence(iterations: usize, variable: Option<String>) -> Self {
        Self::NonConvergence {
            iterations,
            variable,
        }
    }

    /// Check whether this error can be recovered from by reordering the matrix.
    pub fn is_recoverable_by_reordering(&self) -> bool {
        matches!(self, Self::InvalidPivot { .. })
    }
}
