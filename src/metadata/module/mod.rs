//! Modules: owners of type graphs.
//!
//! A [`Module`] owns every node created in it: the types it defines, their nested types and
//! type parameters, the constructed types (arrays, pointers, references, modified types) it
//! builds, and the generic instances requested through it. All other edges of the graph are
//! weak, so dropping the last `Arc<Module>` releases the whole graph of the module.
//!
//! # Storage
//!
//! - owned nodes live in a lock-free [`SkipMap`] keyed by unique key;
//! - top-level definitions are appended to a [`boxcar::Vec`] that backs name resolution;
//! - constructed types and generic instances are memoized in [`CacheMap`]s keyed by interned
//!   signature names;
//! - instances are additionally indexed by their display name in a [`DashMap`].
//!
//! # Examples
//!
//! ```rust
//! use cilgraph::prelude::*;
//!
//! let context = TypeContext::new();
//! let corlib = Module::core_library(&context);
//! let app = Module::new(&context, "App");
//! app.add_reference(&corlib);
//!
//! let object = app.resolve("System", "Object").unwrap();
//! let widget = app.define_type(TypeKind::Class, "App", "Widget", TypeFlags::PUBLIC);
//! widget.set_base_type(&object)?;
//!
//! assert!(std::sync::Arc::ptr_eq(&app.resolve("App", "Widget").unwrap(), &widget));
//! # Ok::<(), cilgraph::Error>(())
//! ```

mod resolve;

use std::{
    fmt,
    sync::{Arc, OnceLock, RwLock, Weak},
};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use rayon::prelude::*;

use crate::metadata::{
    context::TypeContext,
    generics::Instantiator,
    interner::{CacheMap, Identifier},
    key::{NodeKey, NodeType},
    typesystem::{
        array_suffix, ArrayDimensions, Attribute, AttributeList, GenericInstance, Lazy, MemberRc,
        ModifierKind, ModuleProvider, Population, PopulationState, PrimitiveKind, ProviderBinding,
        ProviderHandle, Resource, TypeFlags, TypeKind, TypeNode, TypeNodeRc, TypeNodeRef,
    },
};

use resolve::{NamespaceTable, Resolution};

/// Reference to a `Module`
pub type ModuleRc = Arc<Module>;

/// Name of the module created by [`Module::core_library`]
pub const CORE_LIBRARY_NAME: &str = "mscorlib";

/// A unit of type definitions, owner of every node created in it
pub struct Module {
    key: NodeKey,
    context: Arc<TypeContext>,
    self_ref: Weak<Module>,
    /// Module name
    pub name: Identifier,
    references: boxcar::Vec<ModuleRc>,
    owned: SkipMap<i32, TypeNodeRc>,
    types: boxcar::Vec<TypeNodeRef>,
    constructed: RwLock<CacheMap<TypeNodeRc>>,
    pub(crate) instance_cache: RwLock<CacheMap<TypeNodeRc>>,
    /// Instances under construction by the thread holding the population lock
    pub(crate) pending_instances: RwLock<CacheMap<TypeNodeRc>>,
    instances_by_name: DashMap<String, TypeNodeRef>,
    namespaces: RwLock<Option<Arc<NamespaceTable>>>,
    resolutions: DashMap<(i32, i32), Resolution>,
    attributes: Lazy<Attribute>,
    resources: Lazy<Resource>,
    provider: OnceLock<ProviderBinding<dyn ModuleProvider>>,
}

impl Module {
    /// Create an empty module in `context`
    ///
    /// ## Arguments
    /// * `context` - The services shared with every module this one references
    /// * `name`    - The module name
    #[must_use]
    pub fn new(context: &Arc<TypeContext>, name: &str) -> ModuleRc {
        let capacity = context.config().initial_cache_capacity;
        Arc::new_cyclic(|self_ref| Module {
            key: NodeKey::new(),
            context: context.clone(),
            self_ref: self_ref.clone(),
            name: context.intern(name),
            references: boxcar::Vec::new(),
            owned: SkipMap::new(),
            types: boxcar::Vec::new(),
            constructed: RwLock::new(CacheMap::with_capacity(capacity)),
            instance_cache: RwLock::new(CacheMap::with_capacity(capacity)),
            pending_instances: RwLock::new(CacheMap::new()),
            instances_by_name: DashMap::new(),
            namespaces: RwLock::new(None),
            resolutions: DashMap::new(),
            attributes: Lazy::new("module attributes"),
            resources: Lazy::new("resources"),
            provider: OnceLock::new(),
        })
    }

    /// Create the core library: `System.Object`, `System.ValueType`, `System.Enum`,
    /// `System.Array`, the delegate base types and every [`PrimitiveKind`]
    #[must_use]
    pub fn core_library(context: &Arc<TypeContext>) -> ModuleRc {
        let module = Module::new(context, CORE_LIBRARY_NAME);
        let public = TypeFlags::PUBLIC;

        let object = module.define_type(TypeKind::Class, "System", "Object", public);
        let derive = |kind: TypeKind, name: &str, flags: TypeFlags, base: &TypeNodeRc| {
            let node = module.define_type(kind, "System", name, flags);
            // nodes fresh from define_type have no base yet
            let _ = node.set_base_type(base);
            node
        };

        let value_type = derive(TypeKind::Class, "ValueType", public | TypeFlags::ABSTRACT, &object);
        derive(TypeKind::Class, "Enum", public | TypeFlags::ABSTRACT, &value_type);
        derive(TypeKind::Class, "Array", public | TypeFlags::ABSTRACT, &object);
        let delegate = derive(TypeKind::Class, "Delegate", public | TypeFlags::ABSTRACT, &object);
        derive(TypeKind::Class, "MulticastDelegate", public | TypeFlags::ABSTRACT, &delegate);

        for primitive in [
            PrimitiveKind::Void,
            PrimitiveKind::Boolean,
            PrimitiveKind::Char,
            PrimitiveKind::I1,
            PrimitiveKind::U1,
            PrimitiveKind::I2,
            PrimitiveKind::U2,
            PrimitiveKind::I4,
            PrimitiveKind::U4,
            PrimitiveKind::I8,
            PrimitiveKind::U8,
            PrimitiveKind::R4,
            PrimitiveKind::R8,
            PrimitiveKind::I,
            PrimitiveKind::U,
            PrimitiveKind::TypedReference,
        ] {
            derive(
                TypeKind::Struct,
                primitive.name(),
                public | TypeFlags::SEALED | TypeFlags::SEQUENTIAL_LAYOUT,
                &value_type,
            );
        }
        derive(TypeKind::Class, "String", public | TypeFlags::SEALED, &object);

        module
    }

    /// The unique key of this module
    pub fn unique_key(&self) -> i32 {
        self.key.get(self.context.keys())
    }

    /// Always [`NodeType::Module`]
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        NodeType::Module
    }

    /// The context this module was created in
    #[must_use]
    pub fn context(&self) -> &Arc<TypeContext> {
        &self.context
    }

    /// Make the types of `module` resolvable from this module
    ///
    /// References are searched in the order they were added. The referenced module is kept
    /// alive by this module.
    pub fn add_reference(&self, module: &ModuleRc) {
        if self.references.iter().any(|(_, existing)| Arc::ptr_eq(existing, module)) {
            return;
        }
        self.references.push(module.clone());
        self.context.bump_definitions();
    }

    /// The referenced modules in search order
    #[must_use]
    pub fn references(&self) -> Vec<ModuleRc> {
        self.references.iter().map(|(_, module)| module.clone()).collect()
    }

    /// Create a node owned by this module and register it with the context
    pub(crate) fn create_node(
        self: &Arc<Self>,
        kind: TypeKind,
        namespace: Identifier,
        name: Identifier,
        flags: TypeFlags,
        instance: Option<GenericInstance>,
    ) -> TypeNodeRc {
        let node = TypeNode::create(self, kind, namespace, name, flags, instance);
        self.owned.insert(node.unique_key(), node.clone());
        self.context.register_node(&node);
        node
    }

    /// Define a top-level type
    ///
    /// The type is resolvable through [`Module::resolve`] right away.
    ///
    /// ## Arguments
    /// * `kind`      - The nominal kind of the type
    /// * `namespace` - The namespace, may be empty
    /// * `name`      - The simple name, including the arity suffix for generic types
    /// * `flags`     - Visibility, layout and semantics attributes
    pub fn define_type(
        self: &Arc<Self>,
        kind: TypeKind,
        namespace: &str,
        name: &str,
        flags: TypeFlags,
    ) -> TypeNodeRc {
        let node = self.create_node(
            kind,
            self.context.intern(namespace),
            self.context.intern(name),
            flags,
            None,
        );
        self.types.push(node.handle());
        self.invalidate_namespaces();
        node
    }

    /// Define a type nested in `outer` and append it to `outer`'s nested types
    pub fn define_nested_type(
        self: &Arc<Self>,
        outer: &TypeNodeRc,
        kind: TypeKind,
        name: &str,
        flags: TypeFlags,
    ) -> TypeNodeRc {
        let node = self.create_node(
            kind,
            self.context.intern(""),
            self.context.intern(name),
            flags,
            None,
        );
        node.set_declaring_type(outer);
        outer.add_nested_type(&node);
        node
    }

    /// Define the type-level parameter `index` of `owner`
    ///
    /// Constraints are added through [`TypeNode::set_base_type`] and
    /// [`TypeNode::add_interface`] on the returned node.
    pub fn define_type_parameter(self: &Arc<Self>, owner: &TypeNodeRc, index: u32, name: &str) -> TypeNodeRc {
        let parameter = self.create_node(
            TypeKind::TypeParameter {
                index,
                method_level: false,
            },
            self.context.intern(""),
            self.context.intern(name),
            TypeFlags::empty(),
            None,
        );
        parameter.set_declaring_type(owner);
        owner.add_template_parameter(&parameter);
        parameter
    }

    /// Define a method-level type parameter
    ///
    /// The parameter is bound to its method by
    /// [`crate::metadata::typesystem::Member::method`].
    pub fn define_method_type_parameter(self: &Arc<Self>, index: u32, name: &str) -> TypeNodeRc {
        self.create_node(
            TypeKind::TypeParameter {
                index,
                method_level: true,
            },
            self.context.intern(""),
            self.context.intern(name),
            TypeFlags::empty(),
            None,
        )
    }

    /// Return the memoized constructed type for `signature`, creating it on first request
    fn constructed<F>(self: &Arc<Self>, signature: &str, name: &str, kind: F) -> TypeNodeRc
    where
        F: FnOnce() -> TypeKind,
    {
        let key = self.context.intern(signature).key();
        if let Some(existing) = read_lock!(self.constructed).get(key) {
            return existing.clone();
        }

        let mut constructed = write_lock!(self.constructed);
        if let Some(existing) = constructed.get(key) {
            return existing.clone();
        }

        let node = self.create_node(
            kind(),
            self.context.intern(""),
            self.context.intern(name),
            TypeFlags::empty(),
            None,
        );
        if let Err(error) = constructed.set(key, node.clone()) {
            log::error!("cannot memoize {signature}: {error}");
        }
        node
    }

    /// An array of `element` with `rank` dimensions
    ///
    /// Requests with the same element, rank and dimensions return the same node.
    pub fn array_of(
        self: &Arc<Self>,
        element: &TypeNodeRc,
        rank: u32,
        dimensions: Vec<ArrayDimensions>,
    ) -> TypeNodeRc {
        let rank = rank.max(1);
        let suffix = array_suffix(rank, &dimensions);
        let signature = format!("{}{suffix}:{rank}:{dimensions:?}", element.unique_key());
        self.constructed(&signature, &format!("{}{suffix}", element.name), || {
            TypeKind::Array {
                element: element.handle(),
                rank,
                dimensions,
            }
        })
    }

    /// A single-dimensional, zero-based array of `element`
    pub fn szarray_of(self: &Arc<Self>, element: &TypeNodeRc) -> TypeNodeRc {
        self.array_of(element, 1, Vec::new())
    }

    /// An unmanaged pointer to `element`
    pub fn pointer_to(self: &Arc<Self>, element: &TypeNodeRc) -> TypeNodeRc {
        self.constructed(
            &format!("{}*", element.unique_key()),
            &format!("{}*", element.name),
            || TypeKind::Pointer {
                element: element.handle(),
            },
        )
    }

    /// A managed reference to `element`
    pub fn reference_to(self: &Arc<Self>, element: &TypeNodeRc) -> TypeNodeRc {
        self.constructed(
            &format!("{}&", element.unique_key()),
            &format!("{}&", element.name),
            || TypeKind::Reference {
                element: element.handle(),
            },
        )
    }

    /// `inner` decorated with a `modreq` or `modopt` of class `modifier`
    pub fn modified(
        self: &Arc<Self>,
        kind: ModifierKind,
        modifier: &TypeNodeRc,
        inner: &TypeNodeRc,
    ) -> TypeNodeRc {
        self.constructed(
            &format!("{} {kind}({})", inner.unique_key(), modifier.unique_key()),
            &format!("{} {kind}({})", inner.name, modifier.full_name()),
            || TypeKind::Modified {
                kind,
                modifier: modifier.handle(),
                inner: inner.handle(),
            },
        )
    }

    /// Instantiate `template` over its consolidated `arguments` in this module
    ///
    /// See [`Instantiator::instantiate`].
    pub fn instantiate(self: &Arc<Self>, template: &TypeNodeRc, arguments: &[TypeNodeRc]) -> TypeNodeRc {
        Instantiator::new(self).instantiate(template, arguments)
    }

    /// Instantiate the generic method `method` over `arguments`
    ///
    /// See [`Instantiator::instantiate_method`].
    pub fn instantiate_method(self: &Arc<Self>, method: &MemberRc, arguments: &[TypeNodeRc]) -> MemberRc {
        Instantiator::new(self).instantiate_method(method, arguments)
    }

    /// Index a finished instance under its display name; the first instance wins
    pub(crate) fn index_instance(&self, instance: &TypeNodeRc) {
        self.instances_by_name
            .entry(instance.full_name())
            .or_insert_with(|| instance.handle());
    }

    /// Find an instance created in this module by its full display name, for example
    /// `System.Collections.Generic.List`1<System.Int32>`
    #[must_use]
    pub fn find_instance(&self, full_name: &str) -> Option<TypeNodeRc> {
        self.instances_by_name
            .get(full_name)
            .and_then(|entry| entry.value().upgrade())
    }

    /// Number of generic instances cached in this module
    #[must_use]
    pub fn instance_count(&self) -> usize {
        read_lock!(self.instance_cache).len()
    }

    /// Look up a node owned by this module by its unique key
    #[must_use]
    pub fn get_by_key(&self, key: i32) -> Option<TypeNodeRc> {
        self.owned.get(&key).map(|entry| entry.value().clone())
    }

    /// Number of nodes owned by this module
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.owned.len()
    }

    /// The top-level types defined in this module, in definition order
    #[must_use]
    pub fn types(&self) -> Vec<TypeNodeRc> {
        self.types
            .iter()
            .filter_map(|(_, node)| node.upgrade())
            .collect()
    }

    /// Populate members, attributes and nested types of every owned node in parallel
    ///
    /// Returns the number of nodes visited. Must not be called from inside a provider.
    pub fn populate_all(&self) -> usize {
        let nodes: Vec<TypeNodeRc> = self.owned.iter().map(|entry| entry.value().clone()).collect();
        nodes.par_iter().for_each(|node| {
            node.members();
            node.attributes();
            node.nested_types();
        });
        self.attributes();
        self.resources();
        nodes.len()
    }

    /// Bind the provider of module attributes and resources
    ///
    /// Returns `false` if a provider was already bound.
    pub fn set_provider(&self, provider: Arc<dyn ModuleProvider>, handle: ProviderHandle) -> bool {
        self.provider
            .set(ProviderBinding { provider, handle })
            .is_ok()
    }

    /// The module-level attributes, populated on first access
    #[must_use]
    pub fn attributes(&self) -> AttributeList {
        let Some(binding) = self.provider.get() else {
            return self.attributes.current();
        };

        self.attributes
            .get_or_populate(self.context.population_lock(), || {
                match self.self_ref.upgrade() {
                    Some(module) => binding.provider.attributes(&module, &binding.handle).into(),
                    None => Population::Deferred,
                }
            })
    }

    /// Population state of the module attributes
    #[must_use]
    pub fn attributes_state(&self) -> PopulationState {
        self.attributes.state()
    }

    /// Append a module-level attribute
    pub fn add_attribute(&self, attribute: Attribute) {
        self.attributes
            .push(self.context.population_lock(), attribute);
    }

    /// The resources of this module, populated on first access
    #[must_use]
    pub fn resources(&self) -> Arc<Vec<Resource>> {
        let Some(binding) = self.provider.get() else {
            return self.resources.current();
        };

        self.resources
            .get_or_populate(self.context.population_lock(), || {
                match self.self_ref.upgrade() {
                    Some(module) => binding.provider.resources(&module, &binding.handle).into(),
                    None => Population::Deferred,
                }
            })
    }

    /// Population state of the resources
    #[must_use]
    pub fn resources_state(&self) -> PopulationState {
        self.resources.state()
    }

    /// Find a resource by name
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<Resource> {
        self.resources()
            .iter()
            .find(|resource| resource.name == name)
            .cloned()
    }

    /// Append a resource
    pub fn add_resource(&self, resource: Resource) {
        self.resources.push(self.context.population_lock(), resource);
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("types", &self.types.count())
            .field("nodes", &self.owned.len())
            .field("references", &self.references.count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::metadata::typesystem::{MetadataProvider, PrimitiveValue};

    #[test]
    fn test_core_library() {
        let context = TypeContext::new();
        let corlib = Module::core_library(&context);

        let int32 = corlib.resolve("System", "Int32").unwrap();
        assert!(matches!(int32.kind, TypeKind::Struct));
        assert_eq!(int32.base_type().unwrap().full_name(), "System.ValueType");
        assert_eq!(
            corlib.resolve("System", "ValueType").unwrap().base_type().unwrap().full_name(),
            "System.Object"
        );
        assert!(corlib.resolve("System", "Object").unwrap().base_type().is_none());
        assert!(corlib.resolve("System", "String").unwrap().flags.contains(TypeFlags::SEALED));
        assert_eq!(corlib.name, CORE_LIBRARY_NAME);
        assert_eq!(corlib.node_type(), NodeType::Module);
    }

    #[test]
    fn test_constructed_types_memoized() {
        let context = TypeContext::new();
        let corlib = Module::core_library(&context);
        let int32 = corlib.resolve("System", "Int32").unwrap();

        assert!(Arc::ptr_eq(&corlib.szarray_of(&int32), &corlib.szarray_of(&int32)));
        assert!(Arc::ptr_eq(&corlib.array_of(&int32, 1, vec![]), &corlib.szarray_of(&int32)));
        assert!(!Arc::ptr_eq(&corlib.array_of(&int32, 2, vec![]), &corlib.szarray_of(&int32)));
        assert!(Arc::ptr_eq(&corlib.pointer_to(&int32), &corlib.pointer_to(&int32)));
        assert!(!Arc::ptr_eq(&corlib.pointer_to(&int32), &corlib.reference_to(&int32)));
        assert_eq!(corlib.szarray_of(&int32).name, "Int32[]");
    }

    #[test]
    fn test_nodes_owned_and_registered() {
        let context = TypeContext::new();
        let module = Module::new(&context, "Sample");
        let widget = module.define_type(TypeKind::Class, "Sample", "Widget", TypeFlags::PUBLIC);

        assert!(Arc::ptr_eq(&module.get_by_key(widget.unique_key()).unwrap(), &widget));
        assert!(Arc::ptr_eq(&context.lookup_node(widget.unique_key()).unwrap(), &widget));
        assert_eq!(module.types().len(), 1);
        assert!(Arc::ptr_eq(&widget.module().unwrap(), &module));
    }

    #[test]
    fn test_release_drops_graph() {
        let context = TypeContext::new();
        let module = Module::new(&context, "Transient");
        let widget = module.define_type(TypeKind::Class, "Sample", "Widget", TypeFlags::PUBLIC);
        let key = widget.unique_key();
        let handle = widget.handle();
        drop(widget);

        assert!(handle.is_valid());
        drop(module);
        assert!(!handle.is_valid());
        assert!(context.lookup_node(key).is_none());
    }

    #[test]
    fn test_module_provider() {
        struct Assets(AtomicUsize);
        impl ModuleProvider for Assets {
            fn resources(&self, _: &Arc<Module>, handle: &ProviderHandle) -> Option<Vec<Resource>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                let name = handle.downcast_ref::<&str>()?;
                Some(vec![Resource::new(*name, true, vec![1u8, 2, 3])])
            }
        }

        let context = TypeContext::new();
        let module = Module::new(&context, "Assets");
        let provider = Arc::new(Assets(AtomicUsize::new(0)));
        assert!(module.set_provider(provider.clone(), ProviderHandle::new("logo.png")));

        assert_eq!(module.resources_state(), PopulationState::Unpopulated);
        assert_eq!(module.resource("logo.png").unwrap().data.len(), 3);
        assert!(module.resource("missing").is_none());
        assert!(module.attributes().is_empty());
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_module_attributes_without_provider() {
        let context = TypeContext::new();
        let corlib = Module::core_library(&context);
        let object = corlib.resolve("System", "Object").unwrap();

        corlib.add_attribute(Attribute::new(&object).with_literal(PrimitiveValue::from("core")));
        assert_eq!(corlib.attributes().len(), 1);
        assert_eq!(corlib.attributes()[0].arguments.len(), 1);
    }

    #[test]
    fn test_populate_all_runs_every_provider() {
        struct Counting(AtomicUsize);
        impl MetadataProvider for Counting {
            fn members(&self, _: &TypeNodeRc, _: &ProviderHandle) -> Option<Vec<MemberRc>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Some(Vec::new())
            }
        }

        let context = TypeContext::new();
        let module = Module::new(&context, "Eager");
        let provider = Arc::new(Counting(AtomicUsize::new(0)));
        for index in 0..32 {
            let node = module.define_type(TypeKind::Class, "Eager", &format!("T{index}"), TypeFlags::PUBLIC);
            node.set_provider(provider.clone(), ProviderHandle::empty());
        }

        assert_eq!(module.populate_all(), 32);
        assert_eq!(provider.0.load(Ordering::SeqCst), 32);
        assert!(module
            .types()
            .iter()
            .all(|node| node.members_state() == PopulationState::Populated));
    }
}
