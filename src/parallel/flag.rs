//! A boolean shared between workers.

use parking_lot::RwLock;

/// A boolean behind a read/write lock.
///
/// Used to collect "still convergent" results from behaviors that may run
/// on several threads at once. Any number of readers may look at the value
/// concurrently, writers are serialized and the last write wins.
#[derive(Debug, Default)]
pub struct SharedFlag {
    value: RwLock<bool>,
}

impl SharedFlag {
    /// Create a flag with an initial value.
    pub fn new(value: bool) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    /// Read the current value.
    pub fn get(&self) -> bool {
        *self.value.read()
    }

    /// Overwrite the value.
    pub fn set(&self, value: bool) {
        *self.value.write() = value;
    }
}
