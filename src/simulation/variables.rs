//! Unknowns of the system of equations.

use std::collections::HashMap;
use std::fmt;

use crate::error::{NodalError, Result};

/// Names that refer to the reference node.
pub const GROUND_NAMES: [&str; 3] = ["0", "gnd", "GND"];

/// What an unknown measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// Node voltage
    Voltage,
    /// Branch current (voltage sources and other branch equations)
    Current,
}

/// An unknown of the system.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    /// Row and column of the variable, 0 for ground
    pub index: usize,
    pub kind: VariableKind,
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            VariableKind::Voltage => write!(f, "V({})", self.name),
            VariableKind::Current => write!(f, "I({})", self.name),
        }
    }
}

/// Maps variable names to equation indices.
///
/// Index 0 is the ground node and always exists. Other variables are
/// numbered `1..=len()` in creation order.
#[derive(Debug, Clone)]
pub struct VariableMap {
    variables: Vec<Variable>,
    by_name: HashMap<String, usize>,
}

impl Default for VariableMap {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableMap {
    /// Create a map holding only ground.
    pub fn new() -> Self {
        let mut map = Self {
            variables: Vec::new(),
            by_name: HashMap::new(),
        };
        map.clear();
        map
    }

    /// Check if a name refers to ground.
    pub fn is_ground(name: &str) -> bool {
        GROUND_NAMES.contains(&name)
    }

    /// Number of variables, not counting ground.
    pub fn len(&self) -> usize {
        self.variables.len() - 1
    }

    /// Check if only ground exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn create(&mut self, name: &str, kind: VariableKind) -> usize {
        if Self::is_ground(name) {
            return 0;
        }
        if let Some(&index) = self.by_name.get(name) {
            return index;
        }
        let index = self.variables.len();
        self.variables.push(Variable {
            name: name.to_string(),
            index,
            kind,
        });
        self.by_name.insert(name.to_string(), index);
        index
    }

    /// Index of a node voltage, created on first use.
    pub fn node(&mut self, name: &str) -> usize {
        self.create(name, VariableKind::Voltage)
    }

    /// Index of a branch current, created on first use.
    pub fn branch(&mut self, name: &str) -> usize {
        self.create(name, VariableKind::Current)
    }

    /// Index of an existing variable.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        if Self::is_ground(name) {
            return Ok(0);
        }
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| NodalError::VariableNotFound {
                name: name.to_string(),
            })
    }

    /// The variable at an index.
    pub fn get(&self, index: usize) -> Option<&Variable> {
        self.variables.get(index)
    }

    /// Iterate over all variables except ground.
    pub fn iter(&self) -> impl Iterator<Item = &Variable> + '_ {
        self.variables.iter().skip(1)
    }

    /// Forget everything but ground.
    pub fn clear(&mut self) {
        self.variables.clear();
        self.by_name.clear();
        self.variables.push(Variable {
            name: GROUND_NAMES[0].to_string(),
            index: 0,
            kind: VariableKind::Voltage,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ground_aliases() {
        let mut map = VariableMap::new();
        assert_eq!(map.node("0"), 0);
        assert_eq!(map.node("gnd"), 0);
        assert_eq!(map.index_of("GND").unwrap(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn test_creation_order() {
        let mut map = VariableMap::new();
        assert_eq!(map.node("in"), 1);
        assert_eq!(map.branch("V1#branch"), 2);
        assert_eq!(map.node("in"), 1);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(2).unwrap().kind, VariableKind::Current);
        assert_eq!(map.get(1).unwrap().to_string(), "V(in)");
        assert!(matches!(map.index_of("out"), Err(NodalError::VariableNotFound { .. })));
    }
}
