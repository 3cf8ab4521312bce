//! Linear passive components.

use crate::error::{NodalError, Result};
use crate::simulation::{Behavior, BindContext, LoadState};
use crate::solver::Stamps;

use super::ConductanceStamp;

/// A resistor between two nodes.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    pub nodes: [String; 2], // [positive, negative]
    pub resistance: f64,
    stamp: Option<ConductanceStamp>,
}

impl Resistor {
    /// Create a new resistor.
    pub fn new(name: impl Into<String>, pos: &str, neg: &str, resistance: f64) -> Self {
        Self {
            name: name.into(),
            nodes: [pos.to_string(), neg.to_string()],
            resistance,
            stamp: None,
        }
    }

    /// Get the conductance (1/R).
    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }
}

impl Behavior for Resistor {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, context: &mut BindContext<'_>) -> Result<()> {
        if !(self.resistance.is_finite() && self.resistance != 0.0) {
            return Err(NodalError::invalid_parameter(
                "resistance",
                format!("{} has resistance {}", self.name, self.resistance),
            ));
        }
        let pos = context.node(&self.nodes[0]);
        let neg = context.node(&self.nodes[1]);
        self.stamp = Some(ConductanceStamp::bind(context, pos, neg));
        Ok(())
    }

    fn load(&mut self, _state: &LoadState<'_>, stamps: &mut dyn Stamps<f64>) {
        if let Some(stamp) = &self.stamp {
            stamp.load(stamps, self.conductance());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::SharedFlag;
    use crate::simulation::{InitializationMode, VariableMap};
    use crate::solver::RealSolver;
    use crate::sparse::{DenseVector, MatrixLocation};

    #[test]
    fn test_resistor_stamp() {
        let mut variables = VariableMap::new();
        let mut solver = RealSolver::new();
        let mut resistor = Resistor::new("R1", "a", "b", 250.0);
        resistor
            .bind(&mut BindContext::new(&mut variables, &mut solver))
            .unwrap();
        assert_eq!(variables.len(), 2);

        let solution = DenseVector::new(2);
        let flag = SharedFlag::new(true);
        let state = LoadState::new(
            &solution,
            InitializationMode::Float,
            1.0,
            0.0,
            0.0,
            1e-3,
            1e-12,
            &flag,
        );
        resistor.load(&state, &mut solver);
        let at = |solver: &RealSolver, row, column| {
            solver
                .find_element(MatrixLocation::new(row, column))
                .map(|id| solver[id])
        };
        assert_eq!(at(&solver, 1, 1), Some(4e-3));
        assert_eq!(at(&solver, 1, 2), Some(-4e-3));
        assert_eq!(at(&solver, 2, 1), Some(-4e-3));
        assert_eq!(at(&solver, 2, 2), Some(4e-3));
    }

    #[test]
    fn test_zero_resistance_rejected() {
        let mut variables = VariableMap::new();
        let mut solver = RealSolver::new();
        let mut resistor = Resistor::new("R1", "a", "0", 0.0);
        let result = resistor.bind(&mut BindContext::new(&mut variables, &mut solver));
        assert!(matches!(
            result,
            Err(NodalError::InvalidParameter { name: "resistance", .. })
        ));
    }
}
