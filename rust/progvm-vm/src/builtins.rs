//! Host builtin registry.
//!
//! Builtins are numbered from QuakeC-style declarations (`#7` compiles
//! to a function record whose first-statement field is `-7`). The host
//! registers a callback per number; number 0 is a catch-all that
//! receives any unmatched dispatch. A callback returning `false` fails
//! the whole top-level invocation.

use std::collections::HashMap;
use std::sync::Arc;

use crate::vm::Vm;

/// A builtin callback. It receives the VM and the builtin number, and
/// may use the whole host API, including re-entering script functions.
pub type BuiltinFn = Arc<dyn Fn(&mut Vm, i32) -> bool + Send + Sync>;

#[derive(Default)]
pub(crate) struct BuiltinRegistry {
    callbacks: HashMap<i32, BuiltinFn>,
}

impl BuiltinRegistry {
    /// Register a callback, replacing any previous one for the number.
    pub fn add(&mut self, number: i32, callback: BuiltinFn) {
        self.callbacks.insert(number, callback);
    }

    /// Remove a registration; nothing happens if none exists.
    pub fn remove(&mut self, number: i32) {
        self.callbacks.remove(&number);
    }

    /// The callback for a number, falling back to the catch-all at 0.
    /// The `Arc` is cloned out so the caller can invoke it while holding
    /// `&mut Vm`.
    pub fn lookup(&self, number: i32) -> Option<BuiltinFn> {
        self.callbacks
            .get(&number)
            .or_else(|| self.callbacks.get(&0))
            .cloned()
    }
}

impl std::fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut numbers: Vec<i32> = self.callbacks.keys().copied().collect();
        numbers.sort_unstable();
        f.debug_struct("BuiltinRegistry")
            .field("numbers", &numbers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> BuiltinFn {
        Arc::new(|_, _| true)
    }

    #[test]
    fn exact_match_beats_catch_all() {
        let mut reg = BuiltinRegistry::default();
        reg.add(0, noop());
        reg.add(5, noop());
        assert!(reg.lookup(5).is_some());
        assert!(reg.lookup(6).is_some()); // catch-all
        reg.remove(0);
        assert!(reg.lookup(6).is_none());
        assert!(reg.lookup(5).is_some());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut reg = BuiltinRegistry::default();
        reg.remove(3);
        reg.add(3, noop());
        reg.remove(3);
        reg.remove(3);
        assert!(reg.lookup(3).is_none());
    }
}
