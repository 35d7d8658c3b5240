//! Per-package-name install deduplication.
//!
//! The check-and-insert is atomic under one lock, so two near-simultaneous
//! traversals of the same package name cannot both start an install from this
//! process. The registry's own `is_installing` flag stays advisory for
//! installs started by other processes.

use std::collections::HashSet;
use std::sync::Mutex;

/// Set of package names with an install currently in flight.
#[derive(Debug, Default)]
pub struct InFlight {
    names: Mutex<HashSet<String>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`, returning a token that releases the claim on drop.
    ///
    /// Returns `None` if an install for `name` is already in flight.
    pub fn begin(&self, name: &str) -> Option<InFlightToken<'_>> {
        let mut names = self.names.lock().expect("in-flight lock poisoned");
        if !names.insert(name.to_string()) {
            return None;
        }
        Some(InFlightToken {
            set: self,
            name: name.to_string(),
        })
    }

    /// Whether an install for `name` is currently in flight.
    pub fn contains(&self, name: &str) -> bool {
        self.names
            .lock()
            .expect("in-flight lock poisoned")
            .contains(name)
    }

    fn finish(&self, name: &str) {
        self.names
            .lock()
            .expect("in-flight lock poisoned")
            .remove(name);
    }
}

/// RAII claim on a package name; dropping it releases the claim.
#[derive(Debug)]
pub struct InFlightToken<'a> {
    set: &'a InFlight,
    name: String,
}

impl Drop for InFlightToken<'_> {
    fn drop(&mut self) {
        self.set.finish(&self.name);
    }
}
