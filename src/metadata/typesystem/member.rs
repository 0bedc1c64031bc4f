use std::{
    fmt,
    sync::{atomic::AtomicBool, Arc, OnceLock, RwLock, Weak},
};

use bitflags::bitflags;

use crate::metadata::{
    context::TypeContext,
    interner::{CacheMap, Identifier},
    key::{NodeKey, NodeType},
    typesystem::{TypeNodeRc, TypeNodeRef, UNLOADED_NAME},
};

/// A reference to a `Member`
pub type MemberRc = Arc<Member>;
/// A snapshot of the members of a type
pub type MemberList = Arc<Vec<MemberRc>>;

/// Name of instance constructors
pub const CONSTRUCTOR_NAME: &str = ".ctor";
/// Name of type initializers
pub const TYPE_INITIALIZER_NAME: &str = ".cctor";
/// Name of implicit conversion operators
pub const IMPLICIT_OPERATOR_NAME: &str = "op_Implicit";
/// Name of explicit conversion operators
pub const EXPLICIT_OPERATOR_NAME: &str = "op_Explicit";

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Member attributes, using the ECMA-335 `MethodAttributes` bit layout
    pub struct MemberFlags: u32 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessible by sub-types only in this assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Accessible by anyone in the assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessible by sub-types anywhere, plus anyone in assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Accessible by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method may not be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// Runtime should check name encoding
        const RT_SPECIAL_NAME = 0x1000;
    }
}

/// A smart reference to a `Member` that does not keep it alive
#[derive(Clone)]
pub struct MemberRef {
    weak_ref: Weak<Member>,
}

impl MemberRef {
    /// Create a new `MemberRef` from a strong reference
    pub fn new(strong_ref: &MemberRc) -> Self {
        Self {
            weak_ref: Arc::downgrade(strong_ref),
        }
    }

    /// Get a strong reference to the member, returning None if it has been dropped
    #[must_use]
    pub fn upgrade(&self) -> Option<MemberRc> {
        self.weak_ref.upgrade()
    }

    /// Check if this reference points at `other`
    #[must_use]
    pub fn ptr_eq(&self, other: &MemberRc) -> bool {
        std::ptr::eq(self.weak_ref.as_ptr(), Arc::as_ptr(other))
    }

    /// Check if two references point at the same member
    #[must_use]
    pub fn same_member(&self, other: &MemberRef) -> bool {
        Weak::ptr_eq(&self.weak_ref, &other.weak_ref)
    }
}

impl fmt::Debug for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(member) => write!(f, "MemberRef({})", member.full_name()),
            None => write!(f, "MemberRef({UNLOADED_NAME})"),
        }
    }
}

/// A named, typed method parameter
#[derive(Clone, Debug)]
pub struct Parameter {
    /// Parameter name
    pub name: Identifier,
    /// Parameter type
    pub parameter_type: TypeNodeRef,
}

/// Return and parameter types of a method
#[derive(Clone, Debug, Default)]
pub struct MethodSignature {
    /// Return type, `None` for `void`
    pub return_type: Option<TypeNodeRef>,
    /// Parameters in declaration order
    pub parameters: Vec<Parameter>,
}

/// The kind of a member together with the types it references
#[derive(Clone, Debug)]
pub enum MemberKind {
    /// A field of type `field_type`
    Field {
        /// Field type
        field_type: TypeNodeRef,
    },
    /// A method or constructor
    Method(MethodSignature),
    /// A property of type `property_type`
    Property {
        /// Property type
        property_type: TypeNodeRef,
    },
    /// An event whose handlers have type `handler_type`
    Event {
        /// Delegate type of the handlers
        handler_type: TypeNodeRef,
    },
}

/// Template and arguments of an instantiated generic method
#[derive(Clone, Debug)]
pub struct MethodInstance {
    /// The generic method definition
    pub template: MemberRef,
    /// The method-level arguments
    pub arguments: Vec<TypeNodeRef>,
}

/// A field, method, property or event declared by a type
pub struct Member {
    key: NodeKey,
    context: Arc<TypeContext>,
    /// Member name
    pub name: Identifier,
    /// Member kind and the types it references
    pub kind: MemberKind,
    /// Member attributes
    pub flags: MemberFlags,
    declaring_type: OnceLock<TypeNodeRef>,
    template_parameters: boxcar::Vec<TypeNodeRef>,
    method_instance: Option<MethodInstance>,
    pub(crate) instantiating: AtomicBool,
    pub(crate) instances: RwLock<CacheMap<MemberRc>>,
}

impl Member {
    pub(crate) fn create(
        context: &Arc<TypeContext>,
        name: Identifier,
        kind: MemberKind,
        flags: MemberFlags,
        method_instance: Option<MethodInstance>,
    ) -> MemberRc {
        Arc::new(Member {
            key: NodeKey::new(),
            context: context.clone(),
            name,
            kind,
            flags,
            declaring_type: OnceLock::new(),
            template_parameters: boxcar::Vec::new(),
            method_instance,
            instantiating: AtomicBool::new(false),
            instances: RwLock::new(CacheMap::new()),
        })
    }

    fn declared(owner: &TypeNodeRc, name: &str, kind: MemberKind, flags: MemberFlags) -> MemberRc {
        let context = owner.context();
        let member = Self::create(context, context.intern(name), kind, flags, None);
        member.set_declaring_type(owner);
        member
    }

    /// Create a field of `owner`
    ///
    /// The member is not added to `owner`; providers return it from
    /// [`crate::metadata::typesystem::MetadataProvider::members`] or callers use
    /// [`crate::metadata::typesystem::TypeNode::add_member`].
    #[must_use]
    pub fn field(owner: &TypeNodeRc, name: &str, field_type: &TypeNodeRc, flags: MemberFlags) -> MemberRc {
        Self::declared(
            owner,
            name,
            MemberKind::Field {
                field_type: field_type.into(),
            },
            flags,
        )
    }

    /// Create a method of `owner`
    ///
    /// ## Arguments
    /// * `return_type` - The return type, `None` for `void`
    /// * `parameters` - Parameter names and types in declaration order
    /// * `template_parameters` - Method-level type parameters created with
    ///   [`crate::metadata::module::Module::define_method_type_parameter`]; they are bound to
    ///   the new method
    #[must_use]
    pub fn method(
        owner: &TypeNodeRc,
        name: &str,
        return_type: Option<&TypeNodeRc>,
        parameters: &[(&str, &TypeNodeRc)],
        template_parameters: &[TypeNodeRc],
        flags: MemberFlags,
    ) -> MemberRc {
        let context = owner.context();
        let signature = MethodSignature {
            return_type: return_type.map(TypeNodeRef::new),
            parameters: parameters
                .iter()
                .map(|(name, parameter_type)| Parameter {
                    name: context.intern(name),
                    parameter_type: TypeNodeRef::new(parameter_type),
                })
                .collect(),
        };

        let member = Self::declared(owner, name, MemberKind::Method(signature), flags);
        for parameter in template_parameters {
            member.add_template_parameter(parameter);
        }
        member
    }

    /// Create a property of `owner`
    #[must_use]
    pub fn property(owner: &TypeNodeRc, name: &str, property_type: &TypeNodeRc, flags: MemberFlags) -> MemberRc {
        Self::declared(
            owner,
            name,
            MemberKind::Property {
                property_type: property_type.into(),
            },
            flags,
        )
    }

    /// Create an event of `owner`
    #[must_use]
    pub fn event(owner: &TypeNodeRc, name: &str, handler_type: &TypeNodeRc, flags: MemberFlags) -> MemberRc {
        Self::declared(
            owner,
            name,
            MemberKind::Event {
                handler_type: handler_type.into(),
            },
            flags,
        )
    }

    /// The unique key of this member
    pub fn unique_key(&self) -> i32 {
        self.key.get(self.context.keys())
    }

    /// The context this member was created in
    #[must_use]
    pub fn context(&self) -> &Arc<TypeContext> {
        &self.context
    }

    /// The node tag of this member
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            MemberKind::Field { .. } => NodeType::Field,
            MemberKind::Method(_) => NodeType::Method,
            MemberKind::Property { .. } => NodeType::Property,
            MemberKind::Event { .. } => NodeType::Event,
        }
    }

    /// The type declaring this member
    #[must_use]
    pub fn declaring_type(&self) -> Option<TypeNodeRc> {
        self.declaring_type.get().and_then(TypeNodeRef::upgrade)
    }

    pub(crate) fn set_declaring_type(&self, owner: &TypeNodeRc) {
        if self.declaring_type.set(owner.into()).is_err() {
            log::warn!("member {} already has a declaring type", self.name);
        }
    }

    /// `Declaring.Type::Name`
    #[must_use]
    pub fn full_name(&self) -> String {
        match self.declaring_type() {
            Some(owner) => format!("{}::{}", owner.full_name(), self.name),
            None => self.name.to_string(),
        }
    }

    /// The method signature, if this member is a method
    #[must_use]
    pub fn signature(&self) -> Option<&MethodSignature> {
        match &self.kind {
            MemberKind::Method(signature) => Some(signature),
            _ => None,
        }
    }

    /// The type of a field, property or event, or the return type of a method
    #[must_use]
    pub fn member_type(&self) -> Option<TypeNodeRc> {
        match &self.kind {
            MemberKind::Field { field_type } => field_type.upgrade(),
            MemberKind::Method(signature) => signature.return_type.as_ref()?.upgrade(),
            MemberKind::Property { property_type } => property_type.upgrade(),
            MemberKind::Event { handler_type } => handler_type.upgrade(),
        }
    }

    /// The method-level type parameters of a generic method definition
    #[must_use]
    pub fn template_parameters(&self) -> Vec<TypeNodeRc> {
        self.template_parameters
            .iter()
            .filter_map(|(_, parameter)| parameter.upgrade())
            .collect()
    }

    pub(crate) fn add_template_parameter(self: &Arc<Self>, parameter: &TypeNodeRc) {
        parameter.bind_declaring_method(self);
        self.template_parameters.push(parameter.into());
    }

    /// Share the type parameters of another method without rebinding them
    pub(crate) fn share_template_parameters(&self, source: &Member) {
        for (_, parameter) in source.template_parameters.iter() {
            self.template_parameters.push(parameter.clone());
        }
    }

    /// Returns `true` if this method declares its own type parameters
    #[must_use]
    pub fn is_generic_template(&self) -> bool {
        self.template_parameters.count() > 0
    }

    /// Template and arguments, if this member is an instantiated generic method
    #[must_use]
    pub fn method_instance(&self) -> Option<&MethodInstance> {
        self.method_instance.as_ref()
    }

    /// The method instances created from this definition so far
    #[must_use]
    pub fn instances(&self) -> Vec<MemberRc> {
        read_lock!(self.instances).values().cloned().collect()
    }

    /// Returns `true` for `.ctor` and `.cctor`
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        matches!(self.kind, MemberKind::Method(_))
            && (self.name == CONSTRUCTOR_NAME || self.name == TYPE_INITIALIZER_NAME)
    }

    /// Returns `true` for `op_Implicit` and `op_Explicit`
    #[must_use]
    pub fn is_coercion_operator(&self) -> bool {
        matches!(self.kind, MemberKind::Method(_))
            && (self.name == IMPLICIT_OPERATOR_NAME || self.name == EXPLICIT_OPERATOR_NAME)
    }

    /// Returns `true` if the member is defined on the type rather than per instance
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.full_name())
            .field("kind", &self.node_type())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::helpers::CoreFixture;

    #[test]
    fn test_member_kinds() {
        let core = CoreFixture::new();
        let owner = core.class("Sample", "Widget");

        let field = Member::field(&owner, "count", &core.int32, MemberFlags::PRIVATE);
        let ctor = Member::method(
            &owner,
            CONSTRUCTOR_NAME,
            None,
            &[("count", &core.int32)],
            &[],
            MemberFlags::PUBLIC | MemberFlags::RT_SPECIAL_NAME | MemberFlags::SPECIAL_NAME,
        );
        let implicit = Member::method(
            &owner,
            IMPLICIT_OPERATOR_NAME,
            Some(&core.int32),
            &[("value", &owner)],
            &[],
            MemberFlags::PUBLIC | MemberFlags::STATIC,
        );

        assert_eq!(field.node_type(), NodeType::Field);
        assert_eq!(field.full_name(), "Sample.Widget::count");
        assert!(ctor.is_constructor());
        assert!(!ctor.is_coercion_operator());
        assert!(implicit.is_coercion_operator());
        assert!(implicit.is_static());
        assert!(Arc::ptr_eq(&implicit.member_type().unwrap(), &core.int32));
        assert_eq!(ctor.signature().unwrap().parameters.len(), 1);
        assert!(ctor.member_type().is_none());
    }

    #[test]
    fn test_generic_method_parameters_bind() {
        let core = CoreFixture::new();
        let owner = core.class("Sample", "Util");
        let t = core.module.define_method_type_parameter(0, "T");

        let identity = Member::method(
            &owner,
            "Identity",
            Some(&t),
            &[("value", &t)],
            std::slice::from_ref(&t),
            MemberFlags::PUBLIC | MemberFlags::STATIC,
        );

        assert!(identity.is_generic_template());
        assert!(Arc::ptr_eq(&t.declaring_method().unwrap(), &identity));
        assert!(Arc::ptr_eq(&identity.declaring_type().unwrap(), &owner));
    }

    #[test]
    fn test_member_keys_unique() {
        let core = CoreFixture::new();
        let owner = core.class("Sample", "Keys");
        let a = Member::field(&owner, "a", &core.int32, MemberFlags::PUBLIC);
        let b = Member::field(&owner, "b", &core.int32, MemberFlags::PUBLIC);
        assert_ne!(a.unique_key(), b.unique_key());
        assert_eq!(a.unique_key(), a.unique_key());
    }
}
