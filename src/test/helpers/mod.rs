//! Helper functions and fixtures for testing
//!
//! [`CoreFixture`] sets up a fresh context with a core library and an empty application
//! module that references it. [`CountingProvider`] is a metadata provider that records how
//! often it was asked for each collection.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{
    config::EngineConfig,
    metadata::{
        context::TypeContext,
        module::{Module, ModuleRc},
        typesystem::{
            Attribute, Member, MemberFlags, MemberRc, MetadataProvider, ProviderHandle, TypeFlags,
            TypeKind, TypeNodeRc,
        },
    },
};

/// A context with a core library and an application module referencing it
pub struct CoreFixture {
    pub context: Arc<TypeContext>,
    pub corlib: ModuleRc,
    pub module: ModuleRc,
    pub object: TypeNodeRc,
    pub value_type: TypeNodeRc,
    pub int32: TypeNodeRc,
    pub int64: TypeNodeRc,
    pub string: TypeNodeRc,
}

impl CoreFixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let context = TypeContext::with_config(config);
        let corlib = Module::core_library(&context);
        let module = Module::new(&context, "Sample");
        module.add_reference(&corlib);

        let system = |name: &str| corlib.resolve("System", name).unwrap();
        CoreFixture {
            object: system("Object"),
            value_type: system("ValueType"),
            int32: system("Int32"),
            int64: system("Int64"),
            string: system("String"),
            context,
            corlib,
            module,
        }
    }

    /// A public class deriving from `System.Object`
    pub fn class(&self, namespace: &str, name: &str) -> TypeNodeRc {
        let node = self
            .module
            .define_type(TypeKind::Class, namespace, name, TypeFlags::PUBLIC);
        node.set_base_type(&self.object).unwrap();
        node
    }

    /// A public generic class with one type parameter per entry of `parameters`
    pub fn generic_class(&self, namespace: &str, name: &str, parameters: &[&str]) -> TypeNodeRc {
        let node = self.class(namespace, name);
        for (index, parameter) in parameters.iter().enumerate() {
            self.module
                .define_type_parameter(&node, index as u32, parameter);
        }
        node
    }
}

/// Provider producing one field per name and counting its invocations
pub struct CountingProvider {
    fields: Vec<String>,
    field_type: TypeNodeRc,
    attributes: Vec<Attribute>,
    member_calls: AtomicUsize,
    attribute_calls: AtomicUsize,
}

impl CountingProvider {
    pub fn with_fields(fields: &[&str], field_type: TypeNodeRc) -> Self {
        CountingProvider {
            fields: fields.iter().map(|field| (*field).to_string()).collect(),
            field_type,
            attributes: Vec::new(),
            member_calls: AtomicUsize::new(0),
            attribute_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_attributes(mut self, attributes: Vec<Attribute>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn member_calls(&self) -> usize {
        self.member_calls.load(Ordering::SeqCst)
    }

    pub fn attribute_calls(&self) -> usize {
        self.attribute_calls.load(Ordering::SeqCst)
    }
}

impl MetadataProvider for CountingProvider {
    fn members(&self, owner: &TypeNodeRc, _handle: &ProviderHandle) -> Option<Vec<MemberRc>> {
        self.member_calls.fetch_add(1, Ordering::SeqCst);
        Some(
            self.fields
                .iter()
                .map(|name| Member::field(owner, name, &self.field_type, MemberFlags::PUBLIC))
                .collect(),
        )
    }

    fn attributes(&self, _owner: &TypeNodeRc, _handle: &ProviderHandle) -> Option<Vec<Attribute>> {
        self.attribute_calls.fetch_add(1, Ordering::SeqCst);
        Some(self.attributes.clone())
    }
}
