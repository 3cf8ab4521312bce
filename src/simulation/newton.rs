//! Newton-Raphson iteration over a set of behaviors.
//!
//! Each iteration clears the system, lets every behavior stamp its
//! linearization at the latest solution, factors and solves:
//!
//! ```text
//!   load ─► preorder (once) ─► reorder? ─┬─ yes ─► order_and_factor
//!                                        └─ no ──► factor ──(bad pivot)──► reorder next time
//!        ─► solve ─► convergence test ─► next initialization mode
//! ```
//!
//! The initialization mode walks `Junction → Fix → Float` and the iteration
//! only ends in `Float`.

use std::time::Instant;

use tracing::{debug, trace};

use crate::error::{NodalError, Result};
use crate::solver::RealSolver;
use crate::sparse::{DenseVector, ElementId, MatrixLocation, VectorElementId};

use super::behavior::{Behavior, BindContext, LoadState};
use super::config::BiasingConfig;
use super::state::{BiasingState, InitializationMode, Statistics};
use super::variables::{Variable, VariableKind, VariableMap};
use super::NODE_SET_WEIGHT;

/// A node voltage forced during the first iterations.
#[derive(Debug, Clone, Copy)]
struct NodeSet {
    index: usize,
    diagonal: ElementId,
    rhs: VectorElementId,
    value: f64,
}

/// Finds the DC operating point of a set of behaviors.
///
/// # Example
///
/// ```
/// use nodal_core::components::{Resistor, VoltageSource};
/// use nodal_core::simulation::{BiasingConfig, BiasingSimulation};
///
/// let mut sim = BiasingSimulation::new(BiasingConfig::default());
/// sim.add_behavior(VoltageSource::new("V1", "in", "0", 1.0));
/// sim.add_behavior(Resistor::new("R1", "in", "out", 1e3));
/// sim.add_behavior(Resistor::new("R2", "out", "0", 1e3));
/// sim.run().unwrap();
/// assert!((sim.voltage("out").unwrap() - 0.5).abs() < 1e-9);
/// ```
pub struct BiasingSimulation {
    pub(super) config: BiasingConfig,
    pub(super) solver: RealSolver,
    variables: VariableMap,
    behaviors: Vec<Box<dyn Behavior>>,
    pub(super) state: BiasingState,
    pub(super) statistics: Statistics,
    node_sets: Vec<NodeSet>,
    is_set_up: bool,
    problem_variable: Option<usize>,
}

impl BiasingSimulation {
    /// Create an empty simulation.
    pub fn new(config: BiasingConfig) -> Self {
        let solver = RealSolver::with_config(config.pivot);
        let state = BiasingState::new(0, config.gmin);
        Self {
            config,
            solver,
            variables: VariableMap::new(),
            behaviors: Vec::new(),
            state,
            statistics: Statistics::default(),
            node_sets: Vec::new(),
            is_set_up: false,
            problem_variable: None,
        }
    }

    /// Add a behavior. The simulation has to be set up again afterwards.
    pub fn add_behavior(&mut self, behavior: impl Behavior + 'static) {
        self.add_boxed(Box::new(behavior));
    }

    /// Add a boxed behavior.
    pub fn add_boxed(&mut self, behavior: Box<dyn Behavior>) {
        self.behaviors.push(behavior);
        self.is_set_up = false;
    }

    pub fn config(&self) -> &BiasingConfig {
        &self.config
    }

    /// Replace the configuration. The simulation has to be set up again.
    pub fn set_config(&mut self, config: BiasingConfig) {
        self.config = config;
        self.is_set_up = false;
    }

    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    pub fn solver(&self) -> &RealSolver {
        &self.solver
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn state(&self) -> &BiasingState {
        &self.state
    }

    pub fn is_set_up(&self) -> bool {
        self.is_set_up
    }

    /// The variable that last failed the convergence test.
    pub fn problem_variable(&self) -> Option<&Variable> {
        self.problem_variable.and_then(|index| self.variables.get(index))
    }

    /// Bind every behavior and size the system.
    pub fn setup(&mut self) -> Result<()> {
        self.config.validate()?;
        self.is_set_up = false;
        self.solver.clear();
        self.solver.set_pivot_config(self.config.pivot);
        self.variables.clear();
        self.node_sets.clear();
        self.statistics.clear();
        self.problem_variable = None;

        for behavior in &mut self.behaviors {
            let mut context = BindContext::new(&mut self.variables, &mut self.solver);
            behavior.bind(&mut context)?;
        }

        // Every node gets a diagonal for Gmin and every unknown a right-hand side
        for variable in self.variables.iter() {
            if variable.kind == VariableKind::Voltage {
                self.solver
                    .get_element(MatrixLocation::new(variable.index, variable.index));
            }
            self.solver.get_rhs_element(variable.index);
        }

        for (name, value) in &self.config.node_sets {
            let index = self.variables.index_of(name)?;
            if index == 0 {
                debug!(node = %name, "ignoring node set on ground");
                continue;
            }
            self.node_sets.push(NodeSet {
                index,
                diagonal: self.solver.get_element(MatrixLocation::new(index, index)),
                rhs: self.solver.get_rhs_element(index),
                value: *value,
            });
        }

        self.state = BiasingState::new(self.solver.size(), self.config.gmin);
        self.state.had_node_set = !self.node_sets.is_empty();
        self.is_set_up = true;
        debug!(
            variables = self.variables.len(),
            behaviors = self.behaviors.len(),
            "simulation set up"
        );
        Ok(())
    }

    /// Value of a variable in the latest solution.
    pub fn value(&self, name: &str) -> Result<f64> {
        if !self.is_set_up {
            return Err(NodalError::NotSetUp);
        }
        let index = self.variables.index_of(name)?;
        Ok(if index == 0 { 0.0 } else { self.state.solution[index] })
    }

    /// Voltage of a node in the latest solution.
    pub fn voltage(&self, node: &str) -> Result<f64> {
        self.value(node)
    }

    /// Latest solution indexed by variable.
    pub fn solution(&self) -> &DenseVector<f64> {
        &self.state.solution
    }

    /// Run Newton-Raphson iterations starting in the current mode.
    ///
    /// Returns `Ok(false)` when `max_iterations` were exceeded without
    /// convergence and `Ok(true)` once the solution settled in the `Float`
    /// mode.
    pub fn iterate(&mut self, max_iterations: usize) -> Result<bool> {
        if !self.is_set_up {
            return Err(NodalError::NotSetUp);
        }
        let mut iteration = 0;
        let mut pass = false;

        loop {
            self.state.convergence.set(true);
            self.load();
            iteration += 1;

            if !self.state.sparse.did_preorder {
                self.solver.preorder_modified_nodal_analysis();
                self.state.sparse.did_preorder = true;
            }
            if matches!(
                self.state.mode,
                InitializationMode::Junction | InitializationMode::Transient
            ) {
                self.state.sparse.should_reorder = true;
            }

            if self.state.sparse.should_reorder {
                let started = Instant::now();
                self.solver.apply_diagonal_gmin(self.state.diagonal_gmin);
                self.solver.set_needs_reordering(true);
                let order = self.solver.order_and_factor();
                self.statistics.reorder_time += started.elapsed();
                self.statistics.reorders += 1;
                self.state.sparse.should_reorder = false;

                if order < self.solver.order() {
                    self.statistics.iterations += iteration;
                    let location = self
                        .solver
                        .internal_to_external(MatrixLocation::new(order + 1, order + 1));
                    return Err(NodalError::SingularMatrix {
                        row: location.row,
                        column: location.column,
                    });
                }
            } else {
                let started = Instant::now();
                self.solver.apply_diagonal_gmin(self.state.diagonal_gmin);
                let factored = self.solver.factor();
                self.statistics.factor_time += started.elapsed();
                self.statistics.factorizations += 1;

                match factored {
                    Ok(()) => {}
                    Err(err) if err.is_recoverable_by_reordering() => {
                        debug!(%err, "pivot order no longer usable, reordering");
                        self.state.sparse.should_reorder = true;
                        iteration -= 1;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }

            self.state.store_solution();

            let started = Instant::now();
            self.solver.solve(&mut self.state.solution)?;
            self.statistics.solve_time += started.elapsed();
            self.statistics.solves += 1;

            self.state.solution[0] = 0.0;
            self.state.old_solution[0] = 0.0;

            if iteration > max_iterations {
                self.statistics.iterations += iteration;
                return Ok(false);
            }

            let mut convergent = if self.state.convergence.get() && iteration != 1 {
                match self.is_convergent() {
                    Ok(convergent) => convergent,
                    Err(err) => {
                        self.statistics.iterations += iteration;
                        return Err(err);
                    }
                }
            } else {
                false
            };
            trace!(iteration, mode = ?self.state.mode, convergent, "newton iteration");

            match self.state.mode {
                InitializationMode::Float => {
                    if self.state.had_node_set {
                        // One more pass after the node sets were released
                        if pass {
                            convergent = false;
                        }
                        pass = false;
                    }
                    if convergent {
                        self.state.convergence.set(true);
                        self.statistics.iterations += iteration;
                        return Ok(true);
                    }
                }
                InitializationMode::Junction => {
                    self.state.mode = InitializationMode::Fix;
                    self.state.sparse.should_reorder = true;
                }
                InitializationMode::Fix => {
                    if convergent {
                        self.state.mode = InitializationMode::Float;
                    }
                    pass = true;
                }
                InitializationMode::Transient => {
                    if iteration <= 1 {
                        self.state.sparse.should_reorder = true;
                    }
                    self.state.mode = InitializationMode::Float;
                }
            }
            self.state.convergence.set(convergent);
        }
    }

    fn load(&mut self) {
        let started = Instant::now();
        self.solver.reset();

        let state = load_state(&self.state, &self.config);
        for behavior in &mut self.behaviors {
            behavior.load(&state, &mut self.solver);
        }

        if matches!(
            self.state.mode,
            InitializationMode::Junction | InitializationMode::Fix
        ) {
            self.load_node_sets();
        }
        self.statistics.load_time += started.elapsed();
    }

    fn load_node_sets(&mut self) {
        for node_set in &self.node_sets {
            let weight = if zero_noncurrent_row(&mut self.solver, &self.variables, node_set.index) {
                NODE_SET_WEIGHT
            } else {
                1.0
            };
            if node_set.value != 0.0 {
                self.solver[node_set.rhs] = weight * node_set.value;
            }
            self.solver[node_set.diagonal] = weight;
        }
    }

    fn is_convergent(&mut self) -> Result<bool> {
        for variable in self.variables.iter() {
            let new = self.state.solution[variable.index];
            let old = self.state.old_solution[variable.index];
            if new.is_nan() {
                self.problem_variable = Some(variable.index);
                return Err(NodalError::NotANumber {
                    variable: variable.name.clone(),
                });
            }

            let floor = match variable.kind {
                VariableKind::Voltage => self.config.voltage_tolerance,
                VariableKind::Current => self.config.absolute_tolerance,
            };
            let tolerance = self.config.relative_tolerance * new.abs().max(old.abs()) + floor;
            if (new - old).abs() > tolerance {
                self.problem_variable = Some(variable.index);
                return Ok(false);
            }
        }

        let state = load_state(&self.state, &self.config);
        Ok(self.behaviors.iter().all(|behavior| behavior.is_convergent(&state)))
    }
}

fn load_state<'a>(state: &'a BiasingState, config: &BiasingConfig) -> LoadState<'a> {
    LoadState::new(
        &state.solution,
        state.mode,
        state.source_factor,
        state.gmin,
        state.diagonal_gmin,
        config.relative_tolerance,
        config.absolute_tolerance,
        &state.convergence,
    )
}

/// Zero the voltage entries of a row. Returns true if a branch current
/// also has a nonzero entry in it.
fn zero_noncurrent_row(solver: &mut RealSolver, variables: &VariableMap, row: usize) -> bool {
    let mut currents = false;
    for variable in variables.iter() {
        let Some(id) = solver.find_element(MatrixLocation::new(row, variable.index)) else {
            continue;
        };
        if solver[id] == 0.0 {
            continue;
        }
        match variable.kind {
            VariableKind::Current => currents = true,
            VariableKind::Voltage => solver[id] = 0.0,
        }
    }
    currents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{CurrentSource, Resistor, VoltageSource};
    use approx::assert_relative_eq;

    fn divider(config: BiasingConfig) -> BiasingSimulation {
        let mut sim = BiasingSimulation::new(config);
        sim.add_behavior(VoltageSource::new("V1", "in", "0", 1.0));
        sim.add_behavior(Resistor::new("R1", "in", "out", 1e3));
        sim.add_behavior(Resistor::new("R2", "out", "0", 1e3));
        sim
    }

    #[test]
    fn test_requires_setup() {
        let mut sim = divider(BiasingConfig::default());
        assert_eq!(sim.iterate(10), Err(NodalError::NotSetUp));
        assert_eq!(sim.voltage("out"), Err(NodalError::NotSetUp));
    }

    #[test]
    fn test_setup_binds_variables() {
        let mut sim = divider(BiasingConfig::default());
        sim.setup().unwrap();
        // in, V1#branch, out
        assert_eq!(sim.variables().len(), 3);
        assert_eq!(sim.solver().size(), 3);
        assert_eq!(sim.state().solution.len(), 3);
    }

    #[test]
    fn test_divider_iterations() {
        let mut sim = divider(BiasingConfig::default());
        sim.setup().unwrap();
        assert!(sim.iterate(100).unwrap());
        assert_relative_eq!(sim.voltage("out").unwrap(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(sim.voltage("in").unwrap(), 1.0, epsilon = 1e-12);
        // Source current flows out of the positive terminal
        assert_relative_eq!(sim.value("V1#branch").unwrap(), -5e-4, epsilon = 1e-15);
        // Junction, Fix, Float
        assert_eq!(sim.statistics().iterations, 3);
        assert_eq!(sim.state().mode, InitializationMode::Float);
    }

    #[test]
    fn test_iteration_limit() {
        let mut sim = divider(BiasingConfig::default());
        sim.setup().unwrap();
        assert!(!sim.iterate(1).unwrap());
        assert_eq!(sim.statistics().iterations, 2);
    }

    #[test]
    fn test_node_set_needs_extra_pass() {
        let mut sim = divider(BiasingConfig::default().with_node_set("out", 0.3));
        sim.setup().unwrap();
        assert!(sim.iterate(100).unwrap());
        assert_relative_eq!(sim.voltage("out").unwrap(), 0.5, epsilon = 1e-12);
        assert_eq!(sim.statistics().iterations, 4);
    }

    #[test]
    fn test_node_set_on_unknown_node() {
        let mut sim = divider(BiasingConfig::default().with_node_set("missing", 1.0));
        assert!(matches!(sim.setup(), Err(NodalError::VariableNotFound { .. })));
    }

    #[test]
    fn test_floating_node_is_singular() {
        let mut sim = BiasingSimulation::new(BiasingConfig::default());
        sim.add_behavior(CurrentSource::new("I1", "0", "float", 1e-3));
        sim.setup().unwrap();
        assert_eq!(
            sim.iterate(10),
            Err(NodalError::SingularMatrix { row: 1, column: 1 })
        );
    }

    #[test]
    fn test_problem_variable() {
        let mut sim = divider(BiasingConfig::default());
        sim.setup().unwrap();
        sim.state.mode = InitializationMode::Float;
        sim.state.solution[3] = 10.0;
        // First iteration is never convergent, the second one compares
        // two identical solutions
        assert!(sim.iterate(100).unwrap());
        assert!(sim.problem_variable().is_none());

        sim.state.solution[3] = 10.0;
        sim.state.store_solution();
        sim.state.solution[3] = 0.5;
        assert!(!sim.is_convergent().unwrap());
        assert_eq!(sim.problem_variable().unwrap().name, "out");
    }
}
