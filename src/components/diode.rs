//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = Is * (exp(V / (n * Vt)) - 1)
//!
//! For Newton-Raphson iteration, we linearize around the current operating point:
//!   I ≈ I0 + G_d * (V - V0)
//!
//! where G_d = dI/dV = Is/(n*Vt) * exp(V0/(n*Vt))
//!
//! Large forward steps are limited logarithmically above the critical
//! voltage, and an iteration that had to limit cannot be the last one.

use std::f64::consts::{E, SQRT_2};

use crate::error::{NodalError, Result};
use crate::simulation::{Behavior, BindContext, InitializationMode, LoadState};
use crate::solver::Stamps;
use crate::sparse::VectorElementId;
use crate::THERMAL_VOLTAGE;

use super::ConductanceStamp;

/// Parameters for a diode model.
#[derive(Debug, Clone, PartialEq)]
pub struct DiodeParams {
    /// Saturation current (Is), typically 1e-14 to 1e-12 A
    pub is: f64,
    /// Ideality factor (n), typically 1.0 to 2.0
    pub n: f64,
}

impl Default for DiodeParams {
    fn default() -> Self {
        Self { is: 1e-14, n: 1.0 }
    }
}

impl DiodeParams {
    /// Create parameters for a germanium diode (lower forward voltage).
    pub fn germanium() -> Self {
        Self { is: 1e-9, n: 1.5 }
    }

    /// Thermal voltage times ideality factor.
    pub fn n_vt(&self) -> f64 {
        self.n * THERMAL_VOLTAGE
    }

    /// Voltage above which forward steps are limited.
    pub fn v_crit(&self) -> f64 {
        let n_vt = self.n_vt();
        n_vt * (n_vt / (SQRT_2 * self.is)).ln()
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.is > 0.0 && self.is.is_finite()) {
            return Err(NodalError::invalid_parameter(
                "is",
                format!("{} has saturation current {}", name, self.is),
            ));
        }
        if !(self.n > 0.0 && self.n.is_finite()) {
            return Err(NodalError::invalid_parameter(
                "n",
                format!("{} has ideality factor {}", name, self.n),
            ));
        }
        Ok(())
    }
}

/// Limit a junction voltage update.
///
/// Returns the limited voltage and whether limiting happened.
pub fn limit_junction(v_new: f64, v_old: f64, n_vt: f64, v_crit: f64) -> (f64, bool) {
    if v_new <= v_crit || (v_new - v_old).abs() <= 2.0 * n_vt {
        return (v_new, false);
    }
    if v_old > 0.0 {
        let arg = 1.0 + (v_new - v_old) / n_vt;
        if arg > 0.0 {
            (v_old + n_vt * arg.ln(), true)
        } else {
            (v_crit, true)
        }
    } else {
        (n_vt * (v_new / n_vt).ln(), true)
    }
}

#[derive(Debug, Clone, Copy)]
struct DiodeStamp {
    conductance: ConductanceStamp,
    anode: usize,
    cathode: usize,
    rhs_anode: VectorElementId,
    rhs_cathode: VectorElementId,
}

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    pub name: String,
    pub nodes: [String; 2], // [anode, cathode]
    pub params: DiodeParams,
    stamp: Option<DiodeStamp>,
    /// Junction voltage of the last load
    v_op: f64,
    /// Current and conductance at `v_op`
    i_op: f64,
    g_op: f64,
}

impl Diode {
    /// Create a new diode.
    pub fn new(name: impl Into<String>, anode: &str, cathode: &str, params: DiodeParams) -> Self {
        Self {
            name: name.into(),
            nodes: [anode.to_string(), cathode.to_string()],
            params,
            stamp: None,
            v_op: 0.0,
            i_op: 0.0,
            g_op: 0.0,
        }
    }

    /// Junction voltage at the last load.
    pub fn voltage(&self) -> f64 {
        self.v_op
    }

    /// Diode current at the last load.
    pub fn current(&self) -> f64 {
        self.i_op
    }

    /// Small-signal conductance at the last load.
    pub fn conductance(&self) -> f64 {
        self.g_op
    }

    /// Current and conductance at a junction voltage, including `gmin`.
    pub fn evaluate(&self, v: f64, gmin: f64) -> (f64, f64) {
        let is = self.params.is;
        let n_vt = self.params.n_vt();
        if v >= -3.0 * n_vt {
            let ev = (v / n_vt).exp();
            (is * (ev - 1.0) + gmin * v, is * ev / n_vt + gmin)
        } else {
            // Reverse bias approaches -Is smoothly
            let arg = 3.0 * n_vt / (v * E);
            let arg = arg * arg * arg;
            (-is * (1.0 + arg) + gmin * v, is * 3.0 * arg / v + gmin)
        }
    }
}

impl Behavior for Diode {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, context: &mut BindContext<'_>) -> Result<()> {
        self.params.validate(&self.name)?;
        let anode = context.node(&self.nodes[0]);
        let cathode = context.node(&self.nodes[1]);
        self.stamp = Some(DiodeStamp {
            conductance: ConductanceStamp::bind(context, anode, cathode),
            anode,
            cathode,
            rhs_anode: context.rhs(anode),
            rhs_cathode: context.rhs(cathode),
        });
        self.v_op = 0.0;
        Ok(())
    }

    fn load(&mut self, state: &LoadState<'_>, stamps: &mut dyn Stamps<f64>) {
        let Some(stamp) = self.stamp else {
            return;
        };
        let v_crit = self.params.v_crit();
        let v = match state.mode {
            InitializationMode::Junction => v_crit,
            _ => {
                let v_new = state.value(stamp.anode) - state.value(stamp.cathode);
                let (v, limited) = limit_junction(v_new, self.v_op, self.params.n_vt(), v_crit);
                if limited {
                    state.mark_nonconvergent();
                }
                v
            }
        };

        let (i, g) = self.evaluate(v, state.gmin);
        self.v_op = v;
        self.i_op = i;
        self.g_op = g;

        let i_eq = i - g * v;
        stamp.conductance.load(stamps, g);
        stamps.add_rhs(stamp.rhs_anode, -i_eq);
        stamps.add_rhs(stamp.rhs_cathode, i_eq);
    }

    fn is_convergent(&self, state: &LoadState<'_>) -> bool {
        let Some(stamp) = &self.stamp else {
            return true;
        };
        let v = state.value(stamp.anode) - state.value(stamp.cathode);
        let predicted = self.i_op + self.g_op * (v - self.v_op);
        let tolerance = state.relative_tolerance * predicted.abs().max(self.i_op.abs())
            + state.absolute_tolerance;
        (predicted - self.i_op).abs() <= tolerance
    }
}
