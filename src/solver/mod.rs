//! Sparse LU solver.
//!
//! This module provides the numerical engine that every Newton-Raphson
//! iteration leans on.
//!
//! ## Factorization
//!
//! The system `A·x = b` is factored in place as `P·A·Q = L·U`, where the row
//! and column permutations `P` and `Q` are chosen on the fly:
//!
//! ```text
//!   external index --Translation--> internal index --> SparseMatrix
//! ```
//!
//! - [`SparseLuSolver::order_and_factor`] searches pivots with the
//!   [`Markowitz`] strategy, trading fill-in against stability
//! - [`SparseLuSolver::factor`] reuses the previous order, which is the
//!   common case when only values change between iterations
//! - [`SparseLuSolver::solve`] and [`SparseLuSolver::solve_transposed`]
//!   substitute through the factors
//!
//! The engine is generic over [`Scalar`], implemented for `f64` and
//! [`Complex64`](num_complex::Complex64).

mod lu;
mod markowitz;
mod scalar;
mod stamp;
mod substitution;
mod translation;

use num_complex::Complex64;

pub use lu::SparseLuSolver;
pub use markowitz::{
    Markowitz, Pivot, PivotConfig, DEFAULT_ABSOLUTE_THRESHOLD, DEFAULT_RELATIVE_THRESHOLD,
    MAX_MARKOWITZ_TIES, TIES_MULTIPLIER,
};
pub use scalar::Scalar;
pub use stamp::{ElementProvider, Stamps};
pub use translation::Translation;

/// Solver for real-valued systems (DC and transient analysis).
pub type RealSolver = SparseLuSolver<f64>;

/// Solver for complex-valued systems (small-signal analysis).
pub type ComplexSolver = SparseLuSolver<Complex64>;
