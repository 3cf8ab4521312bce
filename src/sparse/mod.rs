//! Sparse storage for the linear systems built during simulation.
//!
//! The matrix is a grid of elements linked in both directions along every
//! row and column. All elements live in an arena owned by the
//! [`SparseMatrix`] and are addressed through stable [`ElementId`]s, so
//! collaborators can keep a handle to a location and write into it on every
//! iteration without looking it up again.
//!
//! ```text
//!            col 1      col 2      col 4
//!   row 1  [ a11 ] <-> [ a12 ] <-> [ a14 ]
//!             |                       |
//!   row 3  [ a31 ] <-------------> [ a34 ]
//! ```
//!
//! Index 0 is the reference (ground) line. Requests for it hand out a
//! trash element that absorbs writes and is never linked into the structure.

mod dense;
mod matrix;
mod vector;

pub use dense::DenseVector;
pub use matrix::{ElementId, MatrixLocation, SparseMatrix};
pub use vector::{SparseVector, VectorElementId};
