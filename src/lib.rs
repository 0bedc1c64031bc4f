// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # cilgraph
//!
//! An in-memory type-identity and generics-instantiation engine for CLI-style type systems.
//!
//! `cilgraph` models the types of a set of modules as a graph: nominal classes, interfaces,
//! structs, enums and delegates, the constructed types built from them (arrays, pointers,
//! by-refs, modified types), type parameters, and generic instances. It answers the questions
//! a compiler front end, decompiler or analyzer keeps asking about such a graph:
//!
//! - *Is this the same type?* Identity is pointer identity for nominal types and structural
//!   equivalence for everything constructed.
//! - *What is `Dictionary<string, List<T>>` with `T := int`?* Generic instantiation
//!   substitutes every reachable occurrence and caches one canonical node per distinct
//!   instance.
//! - *What does `System.Collections.Generic.List`1` refer to from here?* Namespace
//!   resolution searches a module and its references in order.
//!
//! Members, attributes and nested types are populated lazily from pluggable providers,
//! safely under concurrency and re-entrancy.
//!
//! ## Features
//!
//! - **Interned names** - ordinal, case-sensitive interning with open-addressing caches keyed
//!   by the interned key
//! - **Lazy population** - on-demand, thread-safe, re-entrant member and attribute loading
//! - **Canonical instances** - one node per `(template, arguments)` pair, including nested
//!   generics and self-referential constraints such as `Node<T> : IEquatable<Node<T>>`
//! - **Structural equivalence** - recursive comparison of constructed types across modules
//!
//! ## Quick Start
//!
//! ```rust
//! use cilgraph::prelude::*;
//!
//! let context = TypeContext::new();
//! let corlib = Module::core_library(&context);
//! let app = Module::new(&context, "App");
//! app.add_reference(&corlib);
//!
//! let list = TypeBuilder::new(app.clone())
//!     .class("App.Collections", "List`1", TypeFlags::PUBLIC)?
//!     .generic_parameters(&["T"])?
//!     .build()?;
//!
//! let int32 = app.resolve("System", "Int32").unwrap();
//! let first = app.instantiate(&list, &[int32.clone()]);
//! let second = app.instantiate(&list, &[int32]);
//!
//! assert!(std::sync::Arc::ptr_eq(&first, &second));
//! assert_eq!(first.full_name(), "App.Collections.List`1<System.Int32>");
//! # Ok::<(), cilgraph::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata::interner`] - name interning and the integer-keyed caches
//! - [`metadata::typesystem`] - the node graph, lazy population and structural equivalence
//! - [`metadata::generics`] - instantiation and specialization of generic templates
//! - [`metadata::module`] - ownership of nodes and namespace resolution
//! - [`metadata::context`] - services shared between modules
//! - [`config`] - engine tunables
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result<T>`](Result). Graph anomalies such as self-reference
//! or runaway nesting are resolved internally and logged through the [`log`] facade instead
//! of surfacing as errors.
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Engine tunables
///
/// See [`config::EngineConfig`] for the recursion caps, cache sizes and warning thresholds
/// a [`metadata::context::TypeContext`] is created with.
pub mod config;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cilgraph::prelude::*;
///
/// let context = TypeContext::new();
/// let corlib = Module::core_library(&context);
/// assert!(corlib.resolve("System", "Object").is_some());
/// ```
pub mod prelude;

/// The type graph: interning, nodes, modules, generics and resolution
pub mod metadata;

/// `cilgraph` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilgraph` Error type
///
/// # Examples
///
/// ```rust
/// use cilgraph::{prelude::*, Error};
///
/// let context = TypeContext::new();
/// let empty = Module::new(&context, "Empty");
/// match TypeBuilder::new(empty).primitive(PrimitiveKind::I4) {
///     Err(Error::TypeNotFound(name)) => assert_eq!(name, "System.Int32"),
///     _ => unreachable!(),
/// }
/// ```
pub use error::Error;

/// Engine configuration, see [`config::EngineConfig`]
pub use config::EngineConfig;
