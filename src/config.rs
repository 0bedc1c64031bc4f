//! Engine configuration
//!
//! This module provides the tunables of the type graph: recursion caps for lazy
//! population and specialization, initial table sizes, and the point at which the
//! instantiation cache starts complaining about mangled-name collisions.

/// Configuration for a [`crate::metadata::context::TypeContext`]
///
/// None of these values affect correctness of a well-formed graph. They bound how much
/// work the engine is willing to do on adversarial or partially malformed input before it
/// settles for a best-effort result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum depth of nested-type population on one call stack (default: 20)
    ///
    /// Past this depth `nested_types()` returns whatever the type currently holds instead
    /// of invoking its provider again.
    pub max_nesting_depth: usize,

    /// Maximum depth of type substitution while specializing a template (default: 64)
    pub max_instantiation_depth: usize,

    /// Number of mangled-name disambiguation attempts after which a warning is logged
    /// (default: 8)
    pub disambiguation_warn_threshold: usize,

    /// Initial slot count of per-module caches (default: 16)
    pub initial_cache_capacity: usize,

    /// Initial slot count of the name interner (default: 1024)
    pub initial_intern_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 20,
            max_instantiation_depth: 64,
            disambiguation_warn_threshold: 8,
            initial_cache_capacity: 16,
            initial_intern_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with small tables and tight recursion caps
    ///
    /// Suited for tests and for tools that only look at a handful of types.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            max_nesting_depth: 4,
            max_instantiation_depth: 16,
            disambiguation_warn_threshold: 2,
            initial_cache_capacity: 16,
            initial_intern_capacity: 64,
        }
    }

    /// Creates a configuration that gives up early on deeply recursive input
    #[must_use]
    pub fn strict() -> Self {
        Self {
            max_nesting_depth: 8,
            max_instantiation_depth: 32,
            disambiguation_warn_threshold: 1,
            ..Self::default()
        }
    }

    /// Override the nested-type population cap
    #[must_use]
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Override the specialization depth cap
    #[must_use]
    pub fn with_max_instantiation_depth(mut self, depth: usize) -> Self {
        self.max_instantiation_depth = depth;
        self
    }
}
