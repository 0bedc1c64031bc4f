//! The type graph and the services around it.
//!
//! # Key Components
//!
//! - [`interner`] - canonical names and the integer-keyed caches built on them
//! - [`key`] - lazily assigned unique keys for graph entities
//! - [`sync`] - the coarse re-entrant lock that serializes population and instantiation
//! - [`context`] - services shared by every module of one graph
//! - [`typesystem`] - type nodes, members, attributes, lazy population and equivalence
//! - [`generics`] - canonical instantiation of generic types and methods
//! - [`module`] - node ownership, constructed-type caches and namespace resolution
//!
//! # Examples
//!
//! ```rust
//! use cilgraph::prelude::*;
//!
//! let context = TypeContext::new();
//! let corlib = Module::core_library(&context);
//!
//! let object = corlib.resolve_full_name("System.Object").unwrap();
//! let string = corlib.resolve("System", "String").unwrap();
//! assert!(std::sync::Arc::ptr_eq(&string.base_type().unwrap(), &object));
//! ```

/// Services shared by all modules of one type graph
pub mod context;
/// Canonical instantiation of generic types and methods
pub mod generics;
/// Name interning and integer-keyed caches
pub mod interner;
/// Unique keys of graph entities
pub mod key;
/// Modules: node ownership and namespace resolution
pub mod module;
/// Coarse population lock
pub mod sync;
/// Type nodes, members and their lazily populated collections
pub mod typesystem;
