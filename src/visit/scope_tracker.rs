//! Scope tracking for nested binding constructs during tree traversal.
//!
//! Rewriting passes keep scope-local state keyed by identity (a [`Variable`] or a
//! [`LabelTarget`]) with proper nesting semantics: a block pushes a scope, its
//! declarations are inserted, and lookups search from the innermost scope outwards.
//!
//! # Examples
//!
//! ```rust
//! use exprlower::tree::{Type, Variable};
//! use exprlower::visit::scope_tracker::ScopeTracker;
//!
//! let x = Variable::new("x", Type::Int);
//! let x2 = x.fresh_like();
//!
//! let mut tracker = ScopeTracker::new();
//! tracker.push_scope();
//! tracker.insert(x.clone(), x.clone());
//!
//! // A nested scope redeclares `x`; references resolve to the replacement.
//! tracker.push_scope();
//! tracker.insert(x.clone(), x2.clone());
//! assert_eq!(tracker.lookup(&x), Some(&x2));
//!
//! tracker.pop_scope();
//! assert_eq!(tracker.lookup(&x), Some(&x));
//! ```
//!
//! [`Variable`]: crate::tree::Variable
//! [`LabelTarget`]: crate::tree::LabelTarget

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct ScopeTracker<K, V> {
    scopes: Vec<HashMap<K, V>>,
}

impl<K: Eq + Hash, V> ScopeTracker<K, V> {
    /// Create a tracker with no scopes. Call `push_scope()` before inserting.
    pub fn new() -> Self {
        Self { scopes: Vec::new() }
    }

    pub fn with_initial_scope() -> Self {
        let mut tracker = Self::new();
        tracker.push_scope();
        tracker
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pop the innermost scope, returning its contents.
    pub fn pop_scope(&mut self) -> Option<HashMap<K, V>> {
        self.scopes.pop()
    }

    /// Insert a binding into the innermost scope.
    ///
    /// # Panics
    ///
    /// Panics if there are no scopes.
    pub fn insert(&mut self, key: K, value: V) {
        self.scopes
            .last_mut()
            .expect("ScopeTracker::insert called with no active scope")
            .insert(key, value);
    }

    /// Look up a binding, searching from innermost to outermost scope.
    pub fn lookup(&self, key: &K) -> Option<&V> {
        self.scopes.iter().rev().find_map(|scope| scope.get(key))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lookup(key).is_some()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

impl<K: Eq + Hash, V> Default for ScopeTracker<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// ==============================================================================
// Tests
// ==============================================================================
