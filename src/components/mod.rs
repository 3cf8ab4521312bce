//! Reference device loaders.
//!
//! This module provides a small set of devices that implement
//! [`Behavior`](crate::simulation::Behavior):
//! - Linear: Resistor
//! - Sources: Voltage Source, Current Source (both scaled by the source factor)
//! - Nonlinear: Diode
//!
//! Devices refer to their terminals by node name and resolve them while
//! binding.

mod diode;
mod linear;
mod sources;

pub use diode::{Diode, DiodeParams};
pub use linear::Resistor;
pub use sources::{CurrentSource, VoltageSource};

use crate::simulation::BindContext;
use crate::solver::Stamps;
use crate::sparse::ElementId;

/// Element handles of a conductance between two nodes.
#[derive(Debug, Clone, Copy)]
pub struct ConductanceStamp {
    pos_pos: ElementId,
    pos_neg: ElementId,
    neg_pos: ElementId,
    neg_neg: ElementId,
}

impl ConductanceStamp {
    /// Allocate the four elements of a conductance between `pos` and `neg`.
    pub fn bind(context: &mut BindContext<'_>, pos: usize, neg: usize) -> Self {
        Self {
            pos_pos: context.matrix(pos, pos),
            pos_neg: context.matrix(pos, neg),
            neg_pos: context.matrix(neg, pos),
            neg_neg: context.matrix(neg, neg),
        }
    }

    /// Stamp a conductance `g`.
    pub fn load(&self, stamps: &mut dyn Stamps<f64>, g: f64) {
        stamps.add_matrix(self.pos_pos, g);
        stamps.add_matrix(self.neg_neg, g);
        stamps.add_matrix(self.pos_neg, -g);
        stamps.add_matrix(self.neg_pos, -g);
    }
}
