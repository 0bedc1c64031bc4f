//! Injectable services shared by one graph of modules.
//!
//! A [`TypeContext`] bundles what would otherwise be process-wide global state: the name
//! [`Interner`], the unique [`KeyAllocator`], the coarse [`PopulationLock`] and the
//! [`EngineConfig`]. Every node keeps an `Arc` to the context it was created in, so nodes
//! of independent contexts (for example two tests running in parallel) never share keys,
//! names or locks.
//!
//! # Examples
//!
//! ```rust
//! use cilgraph::{config::EngineConfig, metadata::context::TypeContext};
//!
//! let context = TypeContext::with_config(EngineConfig::minimal());
//! let name = context.intern("Int32");
//! assert_eq!(context.intern("Int32"), name);
//! assert_eq!(context.config().max_nesting_depth, 4);
//! ```

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, RwLock,
};

use crate::{
    config::EngineConfig,
    metadata::{
        interner::{Identifier, Interner, WeakCacheMap},
        key::KeyAllocator,
        sync::PopulationLock,
        typesystem::{TypeNode, TypeNodeRc},
    },
};

/// Shared services of a module graph
pub struct TypeContext {
    interner: Interner,
    keys: KeyAllocator,
    population: PopulationLock,
    config: EngineConfig,
    nesting_depth: AtomicUsize,
    instantiation_depth: AtomicUsize,
    definitions: AtomicU64,
    directory: RwLock<WeakCacheMap<TypeNode>>,
}

impl TypeContext {
    /// Create a context with the default configuration
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_config(EngineConfig::default())
    }

    /// Create a context with the provided configuration
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Arc<Self> {
        Arc::new(TypeContext {
            interner: Interner::with_capacity(config.initial_intern_capacity),
            keys: KeyAllocator::new(),
            population: PopulationLock::new(),
            nesting_depth: AtomicUsize::new(0),
            instantiation_depth: AtomicUsize::new(0),
            definitions: AtomicU64::new(0),
            directory: RwLock::new(WeakCacheMap::with_capacity(config.initial_cache_capacity)),
            config,
        })
    }

    /// The name interner
    #[must_use]
    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    /// Shorthand for `self.interner().intern(text)`
    pub fn intern(&self, text: &str) -> Identifier {
        self.interner.intern(text)
    }

    /// The unique key allocator
    #[must_use]
    pub fn keys(&self) -> &KeyAllocator {
        &self.keys
    }

    /// The coarse lock guarding population and first-time instantiation
    #[must_use]
    pub fn population_lock(&self) -> &PopulationLock {
        &self.population
    }

    /// The engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Record `node` in the key directory
    pub(crate) fn register_node(&self, node: &TypeNodeRc) {
        let key = node.unique_key();
        if let Err(error) = write_lock!(self.directory).set(key, node) {
            log::error!("failed to register type node {key}: {error}");
        }
    }

    /// Find a live type node by its unique key
    #[must_use]
    pub fn lookup_node(&self, key: i32) -> Option<TypeNodeRc> {
        read_lock!(self.directory).get(key)
    }

    /// Enter one level of nested-type population
    ///
    /// Returns `None` once the configured depth is reached. Only called while holding the
    /// population lock.
    pub(crate) fn enter_nesting(&self) -> Option<NestingGuard<'_>> {
        let depth = self.nesting_depth.load(Ordering::Acquire);
        if depth >= self.config.max_nesting_depth {
            return None;
        }

        self.nesting_depth.store(depth + 1, Ordering::Release);
        Some(NestingGuard {
            counter: &self.nesting_depth,
        })
    }

    /// Enter one level of generic instantiation
    ///
    /// Returns `None` once [`EngineConfig::max_instantiation_depth`] instantiations are
    /// in progress on the thread holding the population lock.
    pub(crate) fn enter_instantiation(&self) -> Option<NestingGuard<'_>> {
        let depth = self.instantiation_depth.load(Ordering::Acquire);
        if depth >= self.config.max_instantiation_depth {
            return None;
        }

        self.instantiation_depth.store(depth + 1, Ordering::Release);
        Some(NestingGuard {
            counter: &self.instantiation_depth,
        })
    }

    /// Record that a module of this context defined a new top-level type
    ///
    /// Cached resolution results older than the returned epoch are stale.
    pub(crate) fn bump_definitions(&self) -> u64 {
        self.definitions.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Number of top-level type definitions made so far
    pub(crate) fn definitions_epoch(&self) -> u64 {
        self.definitions.load(Ordering::Acquire)
    }

    /// Current nested-type population depth
    #[must_use]
    pub fn nesting_depth(&self) -> usize {
        self.nesting_depth.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for TypeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeContext")
            .field("interner", &self.interner)
            .field("keys", &self.keys)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One level of nested population or instantiation, released on drop
pub(crate) struct NestingGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for NestingGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
