//! Operating point search with continuation fallbacks.
//!
//! Plain iteration is tried first. When it fails, the search escalates:
//!
//! ```text
//!   Direct ──fail──► GminStepping(0..=steps) ──► GminFinal ──fail──► SourceStepping(0..=steps)
//!     │                                              │                      │
//!     └── ok ──────────────────────────────────────── ok ───────────────── ok ──► converged
//! ```
//!
//! Gmin stepping adds a large conductance to every node diagonal and shrinks
//! it by a decade per step until it reaches `gmin`, then runs once more
//! without it. Source stepping ramps every independent source from zero to
//! its full value.

use tracing::{debug, info, warn};

use crate::error::{NodalError, Result};

use super::newton::BiasingSimulation;
use super::state::InitializationMode;

/// Stage of the operating point search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Plain Newton-Raphson from the junction start values
    Direct,
    /// Diagonal conductance `gmin · 10^(steps - step)`
    GminStepping { step: usize },
    /// One more run with the diagonal conductance removed
    GminFinal,
    /// Sources scaled by `step / steps`
    SourceStepping { step: usize },
}

enum Transition {
    Converged,
    Continue(Phase),
}

impl BiasingSimulation {
    /// Set up and find the operating point.
    pub fn run(&mut self) -> Result<()> {
        self.setup()?;
        self.operating_point()
    }

    /// Find the operating point of an already set up simulation.
    pub fn operating_point(&mut self) -> Result<()> {
        if !self.is_set_up() {
            return Err(NodalError::NotSetUp);
        }
        self.state.mode = InitializationMode::Junction;
        self.state.diagonal_gmin = 0.0;
        self.state.source_factor = 1.0;

        let mut phase = if self.config.skip_direct_iterations {
            self.escalate_from_direct()?
        } else {
            Phase::Direct
        };

        loop {
            match self.advance(phase)? {
                Transition::Converged => {
                    info!(
                        iterations = self.statistics.iterations,
                        phase = ?phase,
                        "operating point found"
                    );
                    return Ok(());
                }
                Transition::Continue(next) => phase = next,
            }
        }
    }

    fn advance(&mut self, phase: Phase) -> Result<Transition> {
        let max_iterations = self.config.max_iterations;
        match phase {
            Phase::Direct => {
                if self.iterate(max_iterations)? {
                    return Ok(Transition::Converged);
                }
                self.escalate_from_direct().map(Transition::Continue)
            }

            Phase::GminStepping { step } => {
                let steps = self.config.gmin_steps;
                let exponent = i32::try_from(steps - step).unwrap_or(i32::MAX);
                self.state.diagonal_gmin = self.config.gmin * 10f64.powi(exponent);
                debug!(step, gmin = self.state.diagonal_gmin, "gmin step");

                if !self.iterate(max_iterations)? {
                    warn!(step, "gmin stepping failed");
                    return Ok(Transition::Continue(Phase::GminFinal));
                }
                self.state.mode = InitializationMode::Float;
                Ok(Transition::Continue(if step < steps {
                    Phase::GminStepping { step: step + 1 }
                } else {
                    Phase::GminFinal
                }))
            }

            Phase::GminFinal => {
                self.state.diagonal_gmin = 0.0;
                if self.iterate(max_iterations)? {
                    return Ok(Transition::Converged);
                }
                self.escalate_from_gmin().map(Transition::Continue)
            }

            Phase::SourceStepping { step } => {
                let steps = self.config.source_steps;
                self.state.source_factor = step as f64 / steps as f64;
                debug!(step, factor = self.state.source_factor, "source step");

                if !self.iterate(max_iterations)? {
                    self.state.source_factor = 1.0;
                    warn!(step, "source stepping failed");
                    return Err(NodalError::OperatingPointNotFound {
                        method: "source stepping",
                    });
                }
                if step < steps {
                    Ok(Transition::Continue(Phase::SourceStepping { step: step + 1 }))
                } else {
                    self.state.source_factor = 1.0;
                    Ok(Transition::Converged)
                }
            }
        }
    }

    fn escalate_from_direct(&mut self) -> Result<Phase> {
        if self.config.gmin_steps > 1 {
            warn!(steps = self.config.gmin_steps, "starting gmin stepping");
            self.state.mode = InitializationMode::Junction;
            return Ok(Phase::GminStepping { step: 0 });
        }
        if self.config.source_steps > 1 {
            return Ok(self.start_source_stepping());
        }
        if self.config.skip_direct_iterations {
            return Err(NodalError::OperatingPointNotFound {
                method: "direct iteration",
            });
        }
        Err(NodalError::non_convergence(
            self.statistics.iterations,
            self.problem_variable().map(|variable| variable.name.clone()),
        ))
    }

    fn escalate_from_gmin(&mut self) -> Result<Phase> {
        if self.config.source_steps > 1 {
            return Ok(self.start_source_stepping());
        }
        Err(NodalError::OperatingPointNotFound {
            method: "gmin stepping",
        })
    }

    fn start_source_stepping(&mut self) -> Phase {
        warn!(steps = self.config.source_steps, "starting source stepping");
        self.state.mode = InitializationMode::Junction;
        self.state.diagonal_gmin = 0.0;
        Phase::SourceStepping { step: 0 }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use parking_lot::Mutex;

    use super::*;
    use crate::components::{CurrentSource, Diode, DiodeParams, Resistor, VoltageSource};
    use crate::simulation::{Behavior, BiasingConfig, BindContext, LoadState};
    use crate::solver::Stamps;
    use crate::sparse::{ElementId, VectorElementId};

    /// A 1 mS conductance fed by 1 mA that only reports convergence after
    /// it has seen a diagonal conductance, recording the one of every load.
    struct Stubborn {
        node: String,
        handles: Option<(ElementId, VectorElementId)>,
        gmin_log: Arc<Mutex<Vec<f64>>>,
        can_converge: bool,
        seen_gmin: bool,
    }

    impl Stubborn {
        fn new(can_converge: bool) -> (Self, Arc<Mutex<Vec<f64>>>) {
            let log = Arc::new(Mutex::new(Vec::new()));
            let device = Self {
                node: "a".to_string(),
                handles: None,
                gmin_log: Arc::clone(&log),
                can_converge,
                seen_gmin: false,
            };
            (device, log)
        }
    }

    impl Behavior for Stubborn {
        fn name(&self) -> &str {
            "stubborn"
        }

        fn bind(&mut self, context: &mut BindContext<'_>) -> Result<()> {
            let node = context.node(&self.node);
            self.handles = Some((context.matrix(node, node), context.rhs(node)));
            Ok(())
        }

        fn load(&mut self, state: &LoadState<'_>, stamps: &mut dyn Stamps<f64>) {
            self.gmin_log.lock().push(state.diagonal_gmin);
            if state.diagonal_gmin > 0.0 {
                self.seen_gmin = true;
            }
            if let Some((diagonal, rhs)) = self.handles {
                stamps.add_matrix(diagonal, 1e-3);
                stamps.add_rhs(rhs, 1e-3 * state.source_factor);
            }
        }

        fn is_convergent(&self, _state: &LoadState<'_>) -> bool {
            self.can_converge && self.seen_gmin
        }
    }

    #[test]
    fn test_divider() {
        let mut sim = BiasingSimulation::new(BiasingConfig::default());
        sim.add_behavior(VoltageSource::new("V1", "in", "0", 1.0));
        sim.add_behavior(Resistor::new("R1", "in", "out", 1e3));
        sim.add_behavior(Resistor::new("R2", "out", "0", 1e3));
        sim.run().unwrap();
        assert_relative_eq!(sim.voltage("out").unwrap(), 0.5, epsilon = 1e-12);
        assert_eq!(sim.statistics().iterations, 3);
    }

    #[test]
    fn test_gmin_stepping_ramps_down() {
        let (device, log) = Stubborn::new(true);
        let config = BiasingConfig::default().with_max_iterations(10);
        let mut sim = BiasingSimulation::new(config);
        sim.add_behavior(device);
        sim.run().unwrap();
        assert_relative_eq!(sim.voltage("a").unwrap(), 1.0, epsilon = 1e-12);

        let mut values = log.lock().clone();
        values.dedup();
        // Direct attempt, 11 decades from 1e-2 down to 1e-12, final run
        assert_eq!(values.len(), 13);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[12], 0.0);
        assert_relative_eq!(values[1], 1e-2, max_relative = 1e-12);
        assert_relative_eq!(values[11], 1e-12, max_relative = 1e-12);
        for pair in values[1..12].windows(2) {
            assert_relative_eq!(pair[0] / pair[1], 10.0, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_direct_failure_without_escalation() {
        let (device, _) = Stubborn::new(false);
        let config = BiasingConfig::default()
            .with_max_iterations(5)
            .with_gmin_steps(0)
            .with_source_steps(0);
        let mut sim = BiasingSimulation::new(config);
        sim.add_behavior(device);
        let err = sim.run().unwrap_err();
        assert!(matches!(err, NodalError::NonConvergence { iterations: 6, .. }));
    }

    #[test]
    fn test_escalation_exhausted() {
        let (device, _) = Stubborn::new(false);
        let config = BiasingConfig::default()
            .with_max_iterations(5)
            .with_gmin_steps(3)
            .with_source_steps(0);
        let mut sim = BiasingSimulation::new(config);
        sim.add_behavior(device);
        assert_eq!(
            sim.run(),
            Err(NodalError::OperatingPointNotFound {
                method: "gmin stepping"
            })
        );

        let (device, _) = Stubborn::new(false);
        let config = BiasingConfig::default()
            .with_max_iterations(5)
            .with_gmin_steps(0)
            .with_source_steps(4);
        let mut sim = BiasingSimulation::new(config);
        sim.add_behavior(device);
        assert_eq!(
            sim.run(),
            Err(NodalError::OperatingPointNotFound {
                method: "source stepping"
            })
        );
        assert_eq!(sim.state().source_factor, 1.0);
    }

    #[test]
    fn test_skip_direct_iterations() {
        let (device, log) = Stubborn::new(true);
        let config = BiasingConfig::default().with_skip_direct_iterations(true);
        let mut sim = BiasingSimulation::new(config);
        sim.add_behavior(device);
        sim.run().unwrap();
        assert_relative_eq!(log.lock()[0], 1e-2, max_relative = 1e-12);
    }

    #[test]
    fn test_diode_forward_bias() {
        let mut sim = BiasingSimulation::new(BiasingConfig::default());
        sim.add_behavior(VoltageSource::new("V1", "in", "0", 5.0));
        sim.add_behavior(Resistor::new("R1", "in", "d", 1e3));
        sim.add_behavior(Diode::new("D1", "d", "0", DiodeParams::default()));
        sim.run().unwrap();

        let vd = sim.voltage("d").unwrap();
        assert!(vd > 0.5 && vd < 0.9, "diode voltage {}", vd);
        let params = DiodeParams::default();
        let diode_current = params.is * ((vd / params.n_vt()).exp() - 1.0);
        let resistor_current = (5.0 - vd) / 1e3;
        assert_relative_eq!(diode_current, resistor_current, max_relative = 1e-2);
    }

    #[test]
    fn test_source_stepping_reaches_full_value() {
        let config = BiasingConfig::default()
            .with_skip_direct_iterations(true)
            .with_gmin_steps(0)
            .with_source_steps(5);
        let mut sim = BiasingSimulation::new(config);
        sim.add_behavior(CurrentSource::new("I1", "0", "a", 2e-3));
        sim.add_behavior(Resistor::new("R1", "a", "0", 1e3));
        sim.run().unwrap();
        assert_relative_eq!(sim.voltage("a").unwrap(), 2.0, epsilon = 1e-12);
        assert_eq!(sim.state().source_factor, 1.0);
    }
}
