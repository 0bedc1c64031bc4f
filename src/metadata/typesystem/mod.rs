//! Type graph of the engine.
//!
//! This module provides the entity model of the graph: [`TypeNode`] for every syntactic
//! category of type, [`Member`] for fields, methods, properties and events, and
//! [`Attribute`] / [`Resource`] for the remaining lazily populated collections.
//!
//! # Key Components
//!
//! - [`TypeNode`]: nominal types, constructed types, type parameters and generic instances
//! - [`TypeKind`]: the tagged syntactic category of a node with its structural payload
//! - [`TypeNodeRef`]: non-owning edge between nodes
//! - [`Lazy`] / [`MetadataProvider`]: on-demand population of members, attributes and nested types
//! - [`equivalent`]: structural equivalence of independently constructed types
//! - [`TypeBuilder`]: fluent construction of type graphs
//!
//! # Ownership
//!
//! Nodes are owned by their [`crate::metadata::module::Module`]. Every edge between nodes
//! (declaring type, base type, interfaces, element types, template arguments) is a
//! [`TypeNodeRef`] that does not keep its target alive, so releasing a module releases its
//! whole graph at once.
//!
//! # Examples
//!
//! ```rust
//! use cilgraph::prelude::*;
//!
//! let context = TypeContext::new();
//! let corlib = Module::core_library(&context);
//! let int32 = corlib.resolve("System", "Int32").unwrap();
//!
//! let array = corlib.szarray_of(&int32);
//! assert_eq!(array.full_name(), "System.Int32[]");
//! assert!(equivalent(&array, &corlib.szarray_of(&int32)));
//! ```

mod attribute;
mod base;
mod builder;
mod equivalence;
mod lazy;
mod member;
mod primitives;

use std::sync::{atomic::AtomicBool, Arc, OnceLock, Weak};

pub use attribute::{Attribute, AttributeArgument, NamedArgument, Resource};
pub(crate) use base::UNLOADED_NAME;
pub use base::{
    ArrayDimensions, ModifierKind, TypeFlags, TypeKind, TypeNodeRef, Visibility,
    TYPE_VISIBILITY_MASK,
};
pub use builder::TypeBuilder;
pub use equivalence::{equivalent, equivalent_lists, StructuralEquivalence};
pub use lazy::{
    Derived, Lazy, MetadataProvider, ModuleProvider, Population, PopulationState, ProviderBinding,
    ProviderHandle,
};
pub use member::{
    Member, MemberFlags, MemberKind, MemberList, MemberRc, MemberRef, MethodInstance,
    MethodSignature, Parameter, CONSTRUCTOR_NAME, EXPLICIT_OPERATOR_NAME, IMPLICIT_OPERATOR_NAME,
    TYPE_INITIALIZER_NAME,
};
pub use primitives::{PrimitiveKind, PrimitiveValue};

use crate::{
    metadata::{
        context::TypeContext,
        interner::{CacheMap, Identifier},
        key::{NodeKey, NodeType},
        module::Module,
    },
    Result,
};

/// Reference to a `TypeNode`
pub type TypeNodeRc = Arc<TypeNode>;
/// A snapshot of a list of owned type nodes
pub type TypeNodeList = Arc<Vec<TypeNodeRc>>;
/// A snapshot of the attributes of a node
pub type AttributeList = Arc<Vec<Attribute>>;

/// Template, arguments and derived properties of a generic instance
#[derive(Clone, Debug)]
pub struct GenericInstance {
    /// The template this instance was created from
    pub template: TypeNodeRef,
    /// The instance's own arguments, without those of enclosing instances
    pub arguments: Vec<TypeNodeRef>,
    /// `false` if any argument is, or embeds, a type parameter
    pub fully_specialized: bool,
    /// Narrowest visibility of the template and all fully specialized arguments
    pub visibility: Visibility,
}

/// A node of the type graph
///
/// Nominal types, constructed types (arrays, pointers, references, modified types), type
/// parameters and generic instances all share this representation; [`TypeNode::kind`]
/// distinguishes them.
pub struct TypeNode {
    key: NodeKey,
    context: Arc<TypeContext>,
    module: Weak<Module>,
    self_ref: Weak<TypeNode>,
    /// Syntactic category and structural payload
    pub kind: TypeKind,
    /// Namespace, empty for nested and constructed types
    pub namespace: Identifier,
    /// Simple name; the mangled name for generic instances
    pub name: Identifier,
    /// Type attributes
    pub flags: TypeFlags,
    declaring_type: OnceLock<TypeNodeRef>,
    declaring_method: OnceLock<MemberRef>,
    /// The template a nested type inside a generic instance was specialized from
    origin: OnceLock<TypeNodeRef>,
    /// Base type; for type parameters the base-type constraint
    base: OnceLock<TypeNodeRef>,
    /// Implemented interfaces; for type parameters the interface constraints
    interfaces: boxcar::Vec<TypeNodeRef>,
    /// Own formal parameters, without those of enclosing types
    template_parameters: boxcar::Vec<TypeNodeRef>,
    instance: Option<GenericInstance>,
    members: Lazy<MemberRc>,
    attributes: Lazy<Attribute>,
    nested_types: Lazy<TypeNodeRc>,
    provider: OnceLock<ProviderBinding<dyn MetadataProvider>>,
    /// Instances of this template created against its own module
    instances: boxcar::Vec<TypeNodeRef>,
    pub(crate) instantiating: AtomicBool,
    constructors: Derived<MemberList>,
    coercion_operators: Derived<MemberList>,
    members_by_name: Derived<Arc<CacheMap<Vec<MemberRc>>>>,
}

impl TypeNode {
    /// Create a node owned by `module`
    ///
    /// The node is not registered anywhere; [`Module`] does that for every node it creates.
    pub(crate) fn create(
        module: &Arc<Module>,
        kind: TypeKind,
        namespace: Identifier,
        name: Identifier,
        flags: TypeFlags,
        instance: Option<GenericInstance>,
    ) -> TypeNodeRc {
        Arc::new_cyclic(|self_ref| TypeNode {
            key: NodeKey::new(),
            context: module.context().clone(),
            module: Arc::downgrade(module),
            self_ref: self_ref.clone(),
            kind,
            namespace,
            name,
            flags,
            declaring_type: OnceLock::new(),
            declaring_method: OnceLock::new(),
            origin: OnceLock::new(),
            base: OnceLock::new(),
            interfaces: boxcar::Vec::new(),
            template_parameters: boxcar::Vec::new(),
            instance,
            members: Lazy::new("members"),
            attributes: Lazy::new("attributes"),
            nested_types: Lazy::new("nested types"),
            provider: OnceLock::new(),
            instances: boxcar::Vec::new(),
            instantiating: AtomicBool::new(false),
            constructors: Derived::new(),
            coercion_operators: Derived::new(),
            members_by_name: Derived::new(),
        })
    }

    /// The unique key of this node, assigned on first access
    pub fn unique_key(&self) -> i32 {
        self.key.get(self.context.keys())
    }

    /// The node tag of this type
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            _ if self.instance.is_some() => NodeType::GenericInstance,
            TypeKind::TypeParameter { .. } => NodeType::TypeParameter,
            TypeKind::Array { .. }
            | TypeKind::Pointer { .. }
            | TypeKind::Reference { .. }
            | TypeKind::Modified { .. } => NodeType::ConstructedType,
            _ => NodeType::Type,
        }
    }

    /// The context this node was created in
    #[must_use]
    pub fn context(&self) -> &Arc<TypeContext> {
        &self.context
    }

    /// The owning module, `None` once it was released
    #[must_use]
    pub fn module(&self) -> Option<Arc<Module>> {
        self.module.upgrade()
    }

    /// A non-owning reference to this node
    #[must_use]
    pub fn handle(&self) -> TypeNodeRef {
        TypeNodeRef::from_weak(self.self_ref.clone())
    }

    /// Returns `true` if `self` and `other` are the same node
    #[must_use]
    pub fn is(&self, other: &TypeNode) -> bool {
        std::ptr::eq(self, other)
    }

    /// Returns the full name of the type
    ///
    /// `Namespace.Name` for top-level types, `Declaring+Name` for nested types, and the
    /// element's full name with a suffix for constructed types.
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.kind {
            TypeKind::Array {
                element,
                rank,
                dimensions,
            } => format!("{}{}", element.full_name(), array_suffix(*rank, dimensions)),
            TypeKind::Pointer { element } => format!("{}*", element.full_name()),
            TypeKind::Reference { element } => format!("{}&", element.full_name()),
            TypeKind::Modified {
                kind,
                modifier,
                inner,
            } => format!("{} {kind}({})", inner.full_name(), modifier.full_name()),
            TypeKind::TypeParameter { .. } => self.name.to_string(),
            _ => match self.declaring_type() {
                Some(declaring) => format!("{}+{}", declaring.full_name(), self.name),
                None if self.namespace.is_empty() => self.name.to_string(),
                None => format!("{}.{}", self.namespace, self.name),
            },
        }
    }

    /// The enclosing type of a nested type or type-level parameter
    #[must_use]
    pub fn declaring_type(&self) -> Option<TypeNodeRc> {
        self.declaring_type.get().and_then(TypeNodeRef::upgrade)
    }

    pub(crate) fn set_declaring_type(&self, declaring: &TypeNodeRc) {
        if self.declaring_type.set(declaring.into()).is_err() {
            log::warn!("declaring type of {} is already set", self.name);
        }
    }

    /// Returns `true` if this type is nested in another type
    #[must_use]
    pub fn is_nested(&self) -> bool {
        !matches!(self.kind, TypeKind::TypeParameter { .. }) && self.declaring_type.get().is_some()
    }

    /// The generic method declaring a method-level type parameter
    #[must_use]
    pub fn declaring_method(&self) -> Option<MemberRc> {
        self.declaring_method.get().and_then(MemberRef::upgrade)
    }

    pub(crate) fn bind_declaring_method(&self, method: &MemberRc) {
        if self.declaring_method.set(MemberRef::new(method)).is_err() {
            log::warn!("type parameter {} is already bound to a method", self.name);
        }
    }

    /// The generic definition this type ultimately stems from
    ///
    /// Instances report their template's definition, nested types specialized inside an
    /// instance report the nested type they were copied from, everything else reports itself.
    #[must_use]
    pub fn generic_definition(&self) -> Option<TypeNodeRc> {
        if let Some(instance) = &self.instance {
            return instance.template.upgrade()?.generic_definition();
        }
        match self.origin.get() {
            Some(origin) => origin.upgrade()?.generic_definition(),
            None => self.self_ref.upgrade(),
        }
    }

    /// The nested type this type was copied from when its declaring instance was created
    #[must_use]
    pub fn origin(&self) -> Option<TypeNodeRc> {
        self.origin.get().and_then(TypeNodeRef::upgrade)
    }

    pub(crate) fn set_origin(&self, origin: &TypeNodeRc) {
        if self.origin.set(origin.into()).is_err() {
            log::warn!("origin of {} is already set", self.name);
        }
    }

    /// Access the base type of this type, if it exists
    ///
    /// For type parameters this is the base-type constraint.
    #[must_use]
    pub fn base_type(&self) -> Option<TypeNodeRc> {
        self.base.get().and_then(TypeNodeRef::upgrade)
    }

    /// Set the base type
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the base type was already set.
    pub fn set_base_type(&self, base: &TypeNodeRc) -> Result<()> {
        self.base
            .set(base.into())
            .map_err(|_| malformed_error!("base type of {} is already set", self.full_name()))
    }

    /// The implemented interfaces; for type parameters the interface constraints
    #[must_use]
    pub fn interfaces(&self) -> Vec<TypeNodeRc> {
        self.interfaces
            .iter()
            .filter_map(|(_, interface)| interface.upgrade())
            .collect()
    }

    /// Interfaces and interface constraints as non-owning references
    pub(crate) fn interface_refs(&self) -> impl Iterator<Item = &TypeNodeRef> + '_ {
        self.interfaces.iter().map(|(_, interface)| interface)
    }

    /// Add an implemented interface or an interface constraint
    pub fn add_interface(&self, interface: &TypeNodeRc) {
        self.interfaces.push(interface.into());
    }

    /// The own formal parameters of this type
    #[must_use]
    pub fn template_parameters(&self) -> Vec<TypeNodeRc> {
        self.template_parameters
            .iter()
            .filter_map(|(_, parameter)| parameter.upgrade())
            .collect()
    }

    /// Number of own formal parameters
    #[must_use]
    pub fn template_parameter_count(&self) -> usize {
        self.template_parameters.count()
    }

    pub(crate) fn add_template_parameter(&self, parameter: &TypeNodeRc) {
        self.template_parameters.push(parameter.into());
    }

    /// Formal parameters of every enclosing type, outermost first, followed by the own ones
    #[must_use]
    pub fn consolidated_template_parameters(&self) -> Vec<TypeNodeRc> {
        let mut parameters = self
            .declaring_type()
            .map(|declaring| declaring.consolidated_template_parameters())
            .unwrap_or_default();
        parameters.extend(self.template_parameters());
        parameters
    }

    /// Returns `true` if this type declares own formal parameters
    #[must_use]
    pub fn is_generic_template(&self) -> bool {
        self.template_parameter_count() > 0
    }

    /// Instance data, if this type is a generic instance
    #[must_use]
    pub fn generic_instance(&self) -> Option<&GenericInstance> {
        self.instance.as_ref()
    }

    /// The instance's own arguments
    #[must_use]
    pub fn template_arguments(&self) -> Vec<TypeNodeRc> {
        self.instance
            .as_ref()
            .map(|instance| {
                instance
                    .arguments
                    .iter()
                    .filter_map(TypeNodeRef::upgrade)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Arguments of every enclosing instance, outermost first, followed by the own ones
    #[must_use]
    pub fn consolidated_template_arguments(&self) -> Vec<TypeNodeRc> {
        let mut arguments = self
            .declaring_type()
            .map(|declaring| declaring.consolidated_template_arguments())
            .unwrap_or_default();
        arguments.extend(self.template_arguments());
        arguments
    }

    /// Returns `false` for type parameters and for types embedding one
    #[must_use]
    pub fn is_fully_specialized(&self) -> bool {
        if let Some(instance) = &self.instance {
            return instance.fully_specialized;
        }

        match &self.kind {
            TypeKind::TypeParameter { .. } => false,
            // a nested type copied into an instance depends on the enclosing arguments
            _ if self.origin.get().is_some() => self
                .declaring_type()
                .map_or(true, |declaring| declaring.is_fully_specialized()),
            kind => kind
                .element()
                .and_then(TypeNodeRef::upgrade)
                .map_or(true, |element| element.is_fully_specialized()),
        }
    }

    /// Effective visibility, narrowed by enclosing types
    #[must_use]
    pub fn visibility(&self) -> Visibility {
        if let Some(instance) = &self.instance {
            return instance.visibility;
        }

        match &self.kind {
            TypeKind::TypeParameter { .. } => Visibility::Public,
            kind if kind.element().is_some() => kind
                .element()
                .and_then(TypeNodeRef::upgrade)
                .map_or(Visibility::Public, |element| element.visibility()),
            _ => {
                let own = Visibility::from_flags(self.flags);
                match self.declaring_type() {
                    Some(declaring) => own.narrowest(declaring.visibility()),
                    None => own,
                }
            }
        }
    }

    /// Bind the provider that populates members, attributes and nested types
    ///
    /// Returns `false` if a provider was already bound.
    pub fn set_provider(&self, provider: Arc<dyn MetadataProvider>, handle: ProviderHandle) -> bool {
        self.provider
            .set(ProviderBinding { provider, handle })
            .is_ok()
    }

    /// Returns `true` if a provider is bound to this type
    #[must_use]
    pub fn has_provider(&self) -> bool {
        self.provider.get().is_some()
    }

    /// The members of this type, populated on first access
    #[must_use]
    pub fn members(&self) -> MemberList {
        let Some(binding) = self.provider.get() else {
            return self.members.current();
        };

        self.members
            .get_or_populate(self.context.population_lock(), || {
                match self.self_ref.upgrade() {
                    Some(owner) => binding.provider.members(&owner, &binding.handle).into(),
                    None => Population::Deferred,
                }
            })
    }

    /// Population state of the members
    #[must_use]
    pub fn members_state(&self) -> PopulationState {
        self.members.state()
    }

    /// Replace all members, invalidating every cache derived from them
    pub fn set_members(&self, members: Vec<MemberRc>) {
        self.members
            .replace(self.context.population_lock(), members);
        self.invalidate_member_caches();
    }

    /// Append a member, invalidating every cache derived from the members
    pub fn add_member(&self, member: MemberRc) {
        self.members.push(self.context.population_lock(), member);
        self.invalidate_member_caches();
    }

    fn invalidate_member_caches(&self) {
        self.constructors.invalidate();
        self.coercion_operators.invalidate();
        self.members_by_name.invalidate();
    }

    /// The generation of the member list, bumped by every replacement
    #[must_use]
    pub fn members_generation(&self) -> u64 {
        self.members.generation()
    }

    /// Instance constructors and the type initializer
    #[must_use]
    pub fn constructors(&self) -> MemberList {
        self.members();
        let (generation, members) = self.members.snapshot();
        self.constructors.get_or_compute(generation, || {
            Arc::new(
                members
                    .iter()
                    .filter(|member| member.is_constructor())
                    .cloned()
                    .collect(),
            )
        })
    }

    /// Implicit and explicit conversion operators
    #[must_use]
    pub fn coercion_operators(&self) -> MemberList {
        self.members();
        let (generation, members) = self.members.snapshot();
        self.coercion_operators.get_or_compute(generation, || {
            Arc::new(
                members
                    .iter()
                    .filter(|member| member.is_coercion_operator())
                    .cloned()
                    .collect(),
            )
        })
    }

    /// All members called `name`
    #[must_use]
    pub fn members_named(&self, name: &str) -> Vec<MemberRc> {
        let Some(name) = self.context.interner().lookup(name) else {
            return Vec::new();
        };

        self.members();
        let (generation, members) = self.members.snapshot();
        let index = self.members_by_name.get_or_compute(generation, || {
            let mut index: CacheMap<Vec<MemberRc>> = CacheMap::new();
            for member in members.iter() {
                let key = member.name.key();
                match index.get_mut(key) {
                    Some(overloads) => overloads.push(member.clone()),
                    None => {
                        // interned keys are always positive
                        let _ = index.set(key, vec![member.clone()]);
                    }
                }
            }
            Arc::new(index)
        });

        index.get(name.key()).cloned().unwrap_or_default()
    }

    /// The attributes applied to this type, populated on first access
    #[must_use]
    pub fn attributes(&self) -> AttributeList {
        let Some(binding) = self.provider.get() else {
            return self.attributes.current();
        };

        self.attributes
            .get_or_populate(self.context.population_lock(), || {
                match self.self_ref.upgrade() {
                    Some(owner) => binding.provider.attributes(&owner, &binding.handle).into(),
                    None => Population::Deferred,
                }
            })
    }

    /// Population state of the attributes
    #[must_use]
    pub fn attributes_state(&self) -> PopulationState {
        self.attributes.state()
    }

    /// Replace all attributes
    pub fn set_attributes(&self, attributes: Vec<Attribute>) {
        self.attributes
            .replace(self.context.population_lock(), attributes);
    }

    /// Append an attribute
    pub fn add_attribute(&self, attribute: Attribute) {
        self.attributes
            .push(self.context.population_lock(), attribute);
    }

    /// The types nested in this type, populated on first access
    ///
    /// Population of nested types that recursively populate further nested types stops at
    /// [`crate::config::EngineConfig::max_nesting_depth`]; types past the cap return their
    /// current (possibly empty) list and are populated again on a later, shallower access.
    #[must_use]
    pub fn nested_types(&self) -> TypeNodeList {
        let Some(binding) = self.provider.get() else {
            return self.nested_types.current();
        };

        self.nested_types
            .get_or_populate(self.context.population_lock(), || {
                let Some(owner) = self.self_ref.upgrade() else {
                    return Population::Deferred;
                };
                let Some(_depth) = self.context.enter_nesting() else {
                    log::warn!(
                        "nested types of {} not populated, nesting depth {} reached",
                        self.full_name(),
                        self.context.config().max_nesting_depth
                    );
                    return Population::Deferred;
                };

                binding.provider.nested_types(&owner, &binding.handle).into()
            })
    }

    /// Population state of the nested types
    #[must_use]
    pub fn nested_types_state(&self) -> PopulationState {
        self.nested_types.state()
    }

    /// Append a nested type
    pub fn add_nested_type(&self, nested: &TypeNodeRc) {
        self.nested_types
            .push(self.context.population_lock(), nested.clone());
    }

    /// Find a nested type by simple name
    #[must_use]
    pub fn nested_type(&self, name: &Identifier) -> Option<TypeNodeRc> {
        self.nested_types()
            .iter()
            .find(|nested| nested.name == *name)
            .cloned()
    }

    /// Instances of this template created against its own module
    #[must_use]
    pub fn instances(&self) -> Vec<TypeNodeRc> {
        self.instances
            .iter()
            .filter_map(|(_, instance)| instance.upgrade())
            .collect()
    }

    pub(crate) fn record_instance(&self, instance: &TypeNodeRc) {
        self.instances.push(instance.into());
    }
}

pub(crate) fn array_suffix(rank: u32, dimensions: &[ArrayDimensions]) -> String {
    let mut suffix = String::from("[");
    for dimension in 0..rank.max(1) {
        if dimension > 0 {
            suffix.push(',');
        }
        if let Some(declared) = dimensions.get(dimension as usize) {
            match (declared.lower_bound, declared.size) {
                (Some(lower), Some(size)) if lower != 0 => {
                    suffix.push_str(&format!("{lower}...{}", i64::from(lower) + i64::from(size) - 1));
                }
                (_, Some(size)) => suffix.push_str(&size.to_string()),
                (Some(lower), None) if lower != 0 => suffix.push_str(&format!("{lower}...")),
                _ => {}
            }
        }
    }
    suffix.push(']');
    suffix
}

impl std::fmt::Debug for TypeNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeNode")
            .field("key", &self.key)
            .field("name", &self.full_name())
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
