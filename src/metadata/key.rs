//! Process-wide unique keys for graph nodes.
//!
//! Every node of the graph ([`crate::metadata::typesystem::TypeNode`],
//! [`crate::metadata::typesystem::Member`], [`crate::metadata::module::Module`]) owns a
//! [`NodeKey`] that is assigned on first access from a shared [`KeyAllocator`]. Keys are
//! strictly positive, monotonic and never reused within one allocator, which makes them
//! valid [`crate::metadata::interner::CacheMap`] keys.
//!
//! # Examples
//!
//! ```rust
//! use cilgraph::metadata::key::{KeyAllocator, NodeKey};
//!
//! let keys = KeyAllocator::new();
//! let node = NodeKey::new();
//!
//! let first = node.get(&keys);
//! assert!(first > 0);
//! assert_eq!(node.get(&keys), first);
//! ```

use std::{
    fmt,
    sync::atomic::{AtomicI32, Ordering},
};

use strum::{Display, EnumCount, EnumIter};

/// Lock-free source of unique keys
pub struct KeyAllocator {
    last: AtomicI32,
}

impl KeyAllocator {
    /// Create an allocator whose first key is `1`
    #[must_use]
    pub fn new() -> Self {
        KeyAllocator {
            last: AtomicI32::new(0),
        }
    }

    /// Hand out the next key
    ///
    /// Once the `i32` range is used up the allocator keeps returning `i32::MAX`; identity
    /// comparisons past that point are no longer reliable, which is logged once per call.
    pub fn allocate(&self) -> i32 {
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let Some(next) = current.checked_add(1) else {
                log::error!("unique key space exhausted, keys are no longer distinct");
                debug_assert!(false, "unique key space exhausted");
                return i32::MAX;
            };

            match self
                .last
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }

    /// The most recently allocated key, `0` if none was handed out yet
    #[must_use]
    pub fn last(&self) -> i32 {
        self.last.load(Ordering::Acquire)
    }
}

impl Default for KeyAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyAllocator(last: {})", self.last())
    }
}

/// Lazily assigned unique key of a single node
///
/// Holds `0` until the first call to [`NodeKey::get`]. Concurrent first calls race on a
/// compare-exchange; the loser discards its freshly allocated key and adopts the winner's,
/// so every observer sees the same value.
pub struct NodeKey(AtomicI32);

impl NodeKey {
    /// An unassigned key
    #[must_use]
    pub const fn new() -> Self {
        NodeKey(AtomicI32::new(0))
    }

    /// Return the key, assigning it from `allocator` on first access
    pub fn get(&self, allocator: &KeyAllocator) -> i32 {
        let current = self.0.load(Ordering::Acquire);
        if current != 0 {
            return current;
        }

        let candidate = allocator.allocate();
        match self
            .0
            .compare_exchange(0, candidate, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => candidate,
            Err(winner) => winner,
        }
    }

    /// The key if it was already assigned
    #[must_use]
    pub fn peek(&self) -> Option<i32> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            key => Some(key),
        }
    }
}

impl Default for NodeKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peek() {
            Some(key) => write!(f, "NodeKey({key})"),
            None => write!(f, "NodeKey(unassigned)"),
        }
    }
}

/// Tag distinguishing the concrete kind of a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum NodeType {
    /// A module or assembly
    Module,
    /// A nominal type: class, interface, struct, enum or delegate
    Type,
    /// An array, pointer, reference or modified type
    ConstructedType,
    /// A type-level or method-level generic parameter
    TypeParameter,
    /// A generic instance of a nominal type
    GenericInstance,
    /// A field
    Field,
    /// A method or constructor
    Method,
    /// A property
    Property,
    /// An event
    Event,
}
