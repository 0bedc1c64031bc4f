//! Builder for type graphs.
//!
//! This module provides the [`TypeBuilder`] struct, which offers a fluent API for constructing
//! nominal types, constructed types (pointers, references, arrays, modified types) and generic
//! instances inside a [`Module`]. Every step registers the created node with the module, so the
//! result is indistinguishable from a node created through the module directly.
//!
//! # Example
//!
//! ```rust
//! use cilgraph::prelude::*;
//!
//! let context = TypeContext::new();
//! let corlib = Module::core_library(&context);
//!
//! let jagged = TypeBuilder::new(corlib.clone())
//!     .primitive(PrimitiveKind::I4)?
//!     .array()?
//!     .array()?
//!     .build()?;
//! assert_eq!(jagged.full_name(), "System.Int32[][]");
//! # Ok::<(), cilgraph::Error>(())
//! ```

use std::sync::Arc;

use crate::{
    metadata::{
        module::Module,
        typesystem::{
            ArrayDimensions, Member, MemberFlags, ModifierKind, PrimitiveKind, TypeFlags, TypeKind,
            TypeNodeRc,
        },
    },
    Error::{TypeError, TypeNotFound},
    Result,
};

/// Provides a fluent API for building types
pub struct TypeBuilder {
    /// Module owning every node the builder creates
    module: Arc<Module>,
    /// Current type being built
    current_type: Option<TypeNodeRc>,
}

impl TypeBuilder {
    /// Create a new builder with the given module
    ///
    /// ## Arguments
    /// * 'module' - The module that owns the created types
    #[must_use]
    pub fn new(module: Arc<Module>) -> Self {
        TypeBuilder {
            module,
            current_type: None,
        }
    }

    /// Continue building from an existing type
    ///
    /// ## Arguments
    /// * 'existing' - The type to use as current type
    #[must_use]
    pub fn from_type(mut self, existing: &TypeNodeRc) -> Self {
        self.current_type = Some(existing.clone());
        self
    }

    fn current(&self) -> Result<&TypeNodeRc> {
        self.current_type
            .as_ref()
            .ok_or_else(|| TypeError("no current type".to_string()))
    }

    fn take_current(&mut self) -> Result<TypeNodeRc> {
        self.current_type
            .take()
            .ok_or_else(|| TypeError("no current type".to_string()))
    }

    fn define(mut self, kind: TypeKind, namespace: &str, name: &str, flags: TypeFlags) -> Self {
        self.current_type = Some(self.module.define_type(kind, namespace, name, flags));
        self
    }

    /// Start a primitive type of the core library
    ///
    /// ## Arguments
    /// * 'kind' - The primitive to resolve through the builder's module
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if neither the module nor its references define
    /// the primitive.
    pub fn primitive(mut self, kind: PrimitiveKind) -> Result<Self> {
        let primitive = self
            .module
            .resolve(kind.namespace(), kind.name())
            .ok_or_else(|| TypeNotFound(kind.full_name()))?;

        self.current_type = Some(primitive);
        Ok(self)
    }

    /// Start a class
    ///
    /// ## Arguments
    /// * 'namespace' - The namespace of the class
    /// * 'name'      - The name of the class
    /// * 'flags'     - Visibility and layout attributes
    ///
    /// # Errors
    /// Currently always succeeds.
    pub fn class(self, namespace: &str, name: &str, flags: TypeFlags) -> Result<Self> {
        Ok(self.define(TypeKind::Class, namespace, name, flags))
    }

    /// Start an interface
    ///
    /// ## Arguments
    /// * 'namespace' - The namespace of the interface
    /// * 'name'      - The name of the interface
    /// * 'flags'     - Visibility attributes; `INTERFACE | ABSTRACT` are always added
    ///
    /// # Errors
    /// Currently always succeeds.
    pub fn interface(self, namespace: &str, name: &str, flags: TypeFlags) -> Result<Self> {
        Ok(self.define(
            TypeKind::Interface,
            namespace,
            name,
            flags | TypeFlags::INTERFACE | TypeFlags::ABSTRACT,
        ))
    }

    /// Start a value type deriving from `System.ValueType`
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if `System.ValueType` cannot be resolved.
    pub fn value_type(self, namespace: &str, name: &str, flags: TypeFlags) -> Result<Self> {
        self.sealed_with_base(TypeKind::Struct, namespace, name, flags, "ValueType")
    }

    /// Start an enum deriving from `System.Enum`
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if `System.Enum` cannot be resolved.
    pub fn enum_type(self, namespace: &str, name: &str, flags: TypeFlags) -> Result<Self> {
        self.sealed_with_base(TypeKind::Enum, namespace, name, flags, "Enum")
    }

    /// Start a delegate deriving from `System.MulticastDelegate`
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeNotFound`] if `System.MulticastDelegate` cannot be resolved.
    pub fn delegate(self, namespace: &str, name: &str, flags: TypeFlags) -> Result<Self> {
        self.sealed_with_base(TypeKind::Delegate, namespace, name, flags, "MulticastDelegate")
    }

    fn sealed_with_base(
        self,
        kind: TypeKind,
        namespace: &str,
        name: &str,
        flags: TypeFlags,
        base_name: &str,
    ) -> Result<Self> {
        let base = self
            .module
            .resolve("System", base_name)
            .ok_or_else(|| TypeNotFound(format!("System.{base_name}")))?;

        let builder = self.define(kind, namespace, name, flags | TypeFlags::SEALED);
        builder.current()?.set_base_type(&base)?;
        Ok(builder)
    }

    /// Start a type nested in `outer`
    ///
    /// ## Arguments
    /// * 'outer' - The enclosing type
    /// * 'kind'  - The nominal kind of the nested type
    /// * 'name'  - The simple name of the nested type
    /// * 'flags' - Nested visibility and layout attributes
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeError`] if `kind` is not a nominal kind.
    pub fn nested(mut self, outer: &TypeNodeRc, kind: TypeKind, name: &str, flags: TypeFlags) -> Result<Self> {
        if !kind.is_nominal() {
            return Err(TypeError(format!(
                "nested type {name} must be nominal, got {}",
                kind.label()
            )));
        }

        self.current_type = Some(self.module.define_nested_type(outer, kind, name, flags));
        Ok(self)
    }

    /// Create a pointer to the current type
    ///
    /// # Errors
    /// Returns an error if no current type is set.
    pub fn pointer(mut self) -> Result<Self> {
        let element = self.take_current()?;
        self.current_type = Some(self.module.pointer_to(&element));
        Ok(self)
    }

    /// Create a managed reference to the current type
    ///
    /// # Errors
    /// Returns an error if no current type is set.
    pub fn by_ref(mut self) -> Result<Self> {
        let element = self.take_current()?;
        self.current_type = Some(self.module.reference_to(&element));
        Ok(self)
    }

    /// Create a 1D array of the current type
    ///
    /// # Errors
    /// Returns an error if no current type is set.
    pub fn array(mut self) -> Result<Self> {
        let element = self.take_current()?;
        self.current_type = Some(self.module.szarray_of(&element));
        Ok(self)
    }

    /// Create a multi-dimensional array of the current type
    ///
    /// ## Arguments
    /// * 'rank'       - The number of dimensions
    /// * 'dimensions' - Declared sizes and lower bounds, may be shorter than `rank`
    ///
    /// # Errors
    /// Returns an error if no current type is set, if `rank` is zero or if more dimensions
    /// than `rank` are declared.
    pub fn multi_dimensional_array(mut self, rank: u32, dimensions: Vec<ArrayDimensions>) -> Result<Self> {
        if rank == 0 || dimensions.len() > rank as usize {
            return Err(TypeError(format!(
                "invalid array shape: rank {rank} with {} declared dimensions",
                dimensions.len()
            )));
        }

        let element = self.take_current()?;
        self.current_type = Some(self.module.array_of(&element, rank, dimensions));
        Ok(self)
    }

    /// Wrap the current type in a required modifier
    ///
    /// ## Arguments
    /// * `modifier` - The modifier class, for example `IsVolatile`
    ///
    /// # Errors
    /// Returns an error if no current type is set.
    pub fn required_modifier(self, modifier: &TypeNodeRc) -> Result<Self> {
        self.modify(ModifierKind::Required, modifier)
    }

    /// Wrap the current type in an optional modifier
    ///
    /// ## Arguments
    /// * `modifier` - The modifier class
    ///
    /// # Errors
    /// Returns an error if no current type is set.
    pub fn optional_modifier(self, modifier: &TypeNodeRc) -> Result<Self> {
        self.modify(ModifierKind::Optional, modifier)
    }

    fn modify(mut self, kind: ModifierKind, modifier: &TypeNodeRc) -> Result<Self> {
        let inner = self.take_current()?;
        self.current_type = Some(self.module.modified(kind, modifier, &inner));
        Ok(self)
    }

    /// Specify a base type for the current type
    ///
    /// ## Arguments
    /// * `base` - Set the base of the type
    ///
    /// # Errors
    /// Returns an error if no current type is set or if the base type is already set.
    pub fn extends(self, base: &TypeNodeRc) -> Result<Self> {
        self.current()?.set_base_type(base)?;
        Ok(self)
    }

    /// Add an implemented interface to the current type
    ///
    /// # Errors
    /// Returns an error if no current type is set.
    pub fn implements(self, interface: &TypeNodeRc) -> Result<Self> {
        self.current()?.add_interface(interface);
        Ok(self)
    }

    /// Declare type-level parameters on the current type
    ///
    /// Parameters are appended after the existing ones.
    ///
    /// ## Arguments
    /// * `names` - The parameter names in declaration order
    ///
    /// # Errors
    /// Returns an error if no current type is set or if the current type is not nominal.
    pub fn generic_parameters(self, names: &[&str]) -> Result<Self> {
        let owner = self.current()?;
        if !owner.kind.is_nominal() || owner.generic_instance().is_some() {
            return Err(TypeError(format!(
                "{} cannot declare type parameters",
                owner.full_name()
            )));
        }

        let first = owner.template_parameter_count();
        for (offset, name) in names.iter().enumerate() {
            let index = u32::try_from(first + offset)
                .map_err(|_| malformed_error!("Too many type parameters on {}", owner.name))?;
            self.module.define_type_parameter(owner, index, name);
        }
        Ok(self)
    }

    /// Add a field to the current type
    ///
    /// # Errors
    /// Returns an error if no current type is set.
    pub fn field(self, name: &str, field_type: &TypeNodeRc, flags: MemberFlags) -> Result<Self> {
        let owner = self.current()?;
        owner.add_member(Member::field(owner, name, field_type, flags));
        Ok(self)
    }

    /// Replace the current generic template by its instance over `arguments`
    ///
    /// ## Arguments
    /// * `arguments` - The consolidated arguments, enclosing types' arguments first
    ///
    /// # Errors
    /// Returns an error if no current type is set, or if the number of arguments does not
    /// match the consolidated parameter count of the template.
    pub fn generic_instance(mut self, arguments: &[TypeNodeRc]) -> Result<Self> {
        let template = self.take_current()?;
        let expected = template.consolidated_template_parameters().len();
        if expected == 0 || expected != arguments.len() {
            return Err(TypeError(format!(
                "{} expects {expected} type arguments, got {}",
                template.full_name(),
                arguments.len()
            )));
        }

        self.current_type = Some(self.module.instantiate(&template, arguments));
        Ok(self)
    }

    /// Finalize and return the built type
    ///
    /// # Errors
    /// Returns an error if no type has been built.
    pub fn build(self) -> Result<TypeNodeRc> {
        match self.current_type {
            Some(t) => Ok(t),
            None => Err(TypeError("Failed to build requested Type".to_string())),
        }
    }
}
