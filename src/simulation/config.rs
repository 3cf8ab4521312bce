//! Configuration of the operating point search.

use crate::error::{NodalError, Result};
use crate::solver::PivotConfig;

use super::{
    DEFAULT_ABSOLUTE_TOLERANCE, DEFAULT_GMIN, DEFAULT_GMIN_STEPS, DEFAULT_MAX_ITERATIONS,
    DEFAULT_RELATIVE_TOLERANCE, DEFAULT_SOURCE_STEPS, DEFAULT_VOLTAGE_TOLERANCE,
};

/// Configuration for a biasing simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct BiasingConfig {
    /// Minimum conductance devices put across junctions.
    pub gmin: f64,
    /// Number of Gmin steps, stepping is skipped unless larger than 1.
    pub gmin_steps: usize,
    /// Number of source steps, stepping is skipped unless larger than 1.
    pub source_steps: usize,
    /// Maximum Newton-Raphson iterations per attempt.
    pub max_iterations: usize,
    /// Relative tolerance on every unknown.
    pub relative_tolerance: f64,
    /// Absolute tolerance on branch currents (amperes).
    pub absolute_tolerance: f64,
    /// Absolute tolerance on node voltages (volts).
    pub voltage_tolerance: f64,
    /// Go straight to the continuation methods.
    pub skip_direct_iterations: bool,
    /// Initial guesses for node voltages, by node name.
    pub node_sets: Vec<(String, f64)>,
    /// Pivoting thresholds of the solver.
    pub pivot: PivotConfig,
}

impl Default for BiasingConfig {
    fn default() -> Self {
        Self {
            gmin: DEFAULT_GMIN,
            gmin_steps: DEFAULT_GMIN_STEPS,
            source_steps: DEFAULT_SOURCE_STEPS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            relative_tolerance: DEFAULT_RELATIVE_TOLERANCE,
            absolute_tolerance: DEFAULT_ABSOLUTE_TOLERANCE,
            voltage_tolerance: DEFAULT_VOLTAGE_TOLERANCE,
            skip_direct_iterations: false,
            node_sets: Vec::new(),
            pivot: PivotConfig::default(),
        }
    }
}

impl BiasingConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the junction conductance.
    pub fn with_gmin(mut self, gmin: f64) -> Self {
        self.gmin = gmin;
        self
    }

    /// Set the number of Gmin steps.
    pub fn with_gmin_steps(mut self, steps: usize) -> Self {
        self.gmin_steps = steps;
        self
    }

    /// Set the number of source steps.
    pub fn with_source_steps(mut self, steps: usize) -> Self {
        self.source_steps = steps;
        self
    }

    /// Set the maximum Newton-Raphson iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative tolerance.
    pub fn with_relative_tolerance(mut self, tolerance: f64) -> Self {
        self.relative_tolerance = tolerance;
        self
    }

    /// Set the absolute current tolerance.
    pub fn with_absolute_tolerance(mut self, tolerance: f64) -> Self {
        self.absolute_tolerance = tolerance;
        self
    }

    /// Set the absolute voltage tolerance.
    pub fn with_voltage_tolerance(mut self, tolerance: f64) -> Self {
        self.voltage_tolerance = tolerance;
        self
    }

    /// Skip plain iteration and start with Gmin stepping.
    pub fn with_skip_direct_iterations(mut self, skip: bool) -> Self {
        self.skip_direct_iterations = skip;
        self
    }

    /// Add an initial guess for a node voltage.
    pub fn with_node_set(mut self, node: impl Into<String>, voltage: f64) -> Self {
        self.node_sets.push((node.into(), voltage));
        self
    }

    /// Set the pivoting thresholds.
    pub fn with_pivot(mut self, pivot: PivotConfig) -> Self {
        self.pivot = pivot;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.gmin >= 0.0 && self.gmin.is_finite()) {
            return Err(NodalError::invalid_parameter("gmin", "must be finite and non-negative"));
        }
        if self.max_iterations == 0 {
            return Err(NodalError::invalid_parameter("max_iterations", "must be at least 1"));
        }
        let tolerances = [
            ("relative_tolerance", self.relative_tolerance),
            ("absolute_tolerance", self.absolute_tolerance),
            ("voltage_tolerance", self.voltage_tolerance),
        ];
        for (name, value) in tolerances {
            if !(value > 0.0 && value.is_finite()) {
                return Err(NodalError::invalid_parameter(name, "must be finite and positive"));
            }
        }
        for (node, value) in &self.node_sets {
            if !value.is_finite() {
                return Err(NodalError::invalid_parameter(
                    "node_sets",
                    format!("guess for '{}' is not finite", node),
                ));
            }
        }
        self.pivot.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BiasingConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.gmin_steps, 10);
        assert_eq!(config.max_iterations, 100);
    }

    #[test]
    fn test_builder() {
        let config = BiasingConfig::new()
            .with_max_iterations(20)
            .with_gmin_steps(0)
            .with_node_set("out", 1.5);
        assert_eq!(config.max_iterations, 20);
        assert_eq!(config.gmin_steps, 0);
        assert_eq!(config.node_sets, vec![("out".to_string(), 1.5)]);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            BiasingConfig::new().with_max_iterations(0).validate(),
            Err(NodalError::InvalidParameter { name: "max_iterations", .. })
        ));
        assert!(BiasingConfig::new().with_relative_tolerance(0.0).validate().is_err());
        assert!(BiasingConfig::new().with_gmin(f64::NAN).validate().is_err());
        assert!(BiasingConfig::new().with_node_set("a", f64::INFINITY).validate().is_err());
    }
}
