//! Independent voltage and current sources.
//!
//! Both scale their value by the source factor so that source stepping can
//! ramp them up from zero.

use crate::error::Result;
use crate::simulation::{Behavior, BindContext, LoadState};
use crate::solver::Stamps;
use crate::sparse::{ElementId, VectorElementId};

#[derive(Debug, Clone, Copy)]
struct BranchStamp {
    pos_branch: ElementId,
    neg_branch: ElementId,
    branch_pos: ElementId,
    branch_neg: ElementId,
    rhs: VectorElementId,
}

/// A voltage source component.
///
/// Voltage sources add a branch current unknown named `<name>#branch`.
/// The source enforces: V+ - V- = V_source
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub name: String,
    pub nodes: [String; 2], // [positive, negative]
    pub dc_value: f64,
    stamp: Option<BranchStamp>,
}

impl VoltageSource {
    /// Create a new voltage source.
    pub fn new(name: impl Into<String>, pos: &str, neg: &str, dc_value: f64) -> Self {
        Self {
            name: name.into(),
            nodes: [pos.to_string(), neg.to_string()],
            dc_value,
            stamp: None,
        }
    }

    /// Name of the branch current unknown.
    pub fn branch_name(&self) -> String {
        format!("{}#branch", self.name)
    }
}

impl Behavior for VoltageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, context: &mut BindContext<'_>) -> Result<()> {
        let pos = context.node(&self.nodes[0]);
        let neg = context.node(&self.nodes[1]);
        let branch = context.branch(&self.branch_name());
        self.stamp = Some(BranchStamp {
            pos_branch: context.matrix(pos, branch),
            neg_branch: context.matrix(neg, branch),
            branch_pos: context.matrix(branch, pos),
            branch_neg: context.matrix(branch, neg),
            rhs: context.rhs(branch),
        });
        Ok(())
    }

    fn load(&mut self, state: &LoadState<'_>, stamps: &mut dyn Stamps<f64>) {
        let Some(stamp) = &self.stamp else {
            return;
        };
        stamps.add_matrix(stamp.pos_branch, 1.0);
        stamps.add_matrix(stamp.branch_pos, 1.0);
        stamps.add_matrix(stamp.neg_branch, -1.0);
        stamps.add_matrix(stamp.branch_neg, -1.0);
        stamps.add_rhs(stamp.rhs, self.dc_value * state.source_factor);
    }
}

/// A current source component.
///
/// Current flows from the positive node through the source to the
/// negative node.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    pub nodes: [String; 2], // [positive, negative]
    pub dc_value: f64,
    rhs: Option<[VectorElementId; 2]>,
}

impl CurrentSource {
    /// Create a new current source.
    pub fn new(name: impl Into<String>, pos: &str, neg: &str, dc_value: f64) -> Self {
        Self {
            name: name.into(),
            nodes: [pos.to_string(), neg.to_string()],
            dc_value,
            rhs: None,
        }
    }
}

impl Behavior for CurrentSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, context: &mut BindContext<'_>) -> Result<()> {
        let pos = context.node(&self.nodes[0]);
        let neg = context.node(&self.nodes[1]);
        self.rhs = Some([context.rhs(pos), context.rhs(neg)]);
        Ok(())
    }

    fn load(&mut self, state: &LoadState<'_>, stamps: &mut dyn Stamps<f64>) {
        if let Some([pos, neg]) = self.rhs {
            let current = self.dc_value * state.source_factor;
            stamps.add_rhs(pos, -current);
            stamps.add_rhs(neg, current);
        }
    }
}
