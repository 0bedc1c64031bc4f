//! # cilgraph Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the type graph. Import this module to get quick access to everything needed to
//! define types, instantiate generics and resolve names.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilgraph operations
pub use crate::Error;

/// The result type used throughout cilgraph
pub use crate::Result;

/// Tunables of a type context
pub use crate::config::EngineConfig;

// ================================================================================================
// Graph Services
// ================================================================================================

/// Services shared by the modules of one graph
pub use crate::metadata::context::TypeContext;

/// Interned names and the caches keyed by them
pub use crate::metadata::interner::{CacheMap, Identifier, Interner};

/// Modules and their core library
pub use crate::metadata::module::{Module, ModuleRc, CORE_LIBRARY_NAME};

// ================================================================================================
// Type System
// ================================================================================================

/// Type nodes and their structural payload
pub use crate::metadata::typesystem::{
    ArrayDimensions, ModifierKind, TypeFlags, TypeKind, TypeNode, TypeNodeRc, TypeNodeRef,
    Visibility,
};

/// Members of types
pub use crate::metadata::typesystem::{
    Member, MemberFlags, MemberKind, MemberRc, MethodSignature, Parameter,
};

/// Attributes, resources and primitive values
pub use crate::metadata::typesystem::{
    Attribute, AttributeArgument, PrimitiveKind, PrimitiveValue, Resource,
};

/// Lazy population
pub use crate::metadata::typesystem::{
    MetadataProvider, ModuleProvider, PopulationState, ProviderHandle,
};

/// Structural equivalence
pub use crate::metadata::typesystem::{equivalent, equivalent_lists, StructuralEquivalence};

/// Fluent type construction
pub use crate::metadata::typesystem::TypeBuilder;

// ================================================================================================
// Generics
// ================================================================================================

/// Generic instantiation
pub use crate::metadata::generics::{mangled_name, Instantiator};
