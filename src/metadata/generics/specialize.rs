//! Substitution of template parameters.
//!
//! A [`Substitution`] maps formal parameters (by unique key) to arguments. The [`Specializer`]
//! rebuilds a type with every mapped parameter replaced, creating constructed types and
//! generic instances in the scope module as needed. Types that embed no parameter are returned
//! as they are.
//!
//! Instances do not copy their template's members, attributes and nested types up front.
//! [`SpecializingProvider`] is bound to every instance instead and specializes the template's
//! collections on first access.

use std::sync::{Arc, Weak};

use crate::metadata::{
    generics::Instantiator,
    interner::CacheMap,
    module::Module,
    typesystem::{
        Attribute, AttributeArgument, Member, MemberKind, MemberRc, MetadataProvider,
        MethodSignature, NamedArgument, Parameter, ProviderHandle, TypeKind, TypeNode, TypeNodeRc,
        TypeNodeRef,
    },
};

/// Parameter to argument mapping, keyed by the parameter's unique key
#[derive(Default)]
pub(crate) struct Substitution {
    map: CacheMap<TypeNodeRef>,
}

impl Substitution {
    /// Map `parameters[i]` to `arguments[i]`; surplus entries on either side are ignored
    pub(crate) fn from_pairs(parameters: &[TypeNodeRc], arguments: &[TypeNodeRc]) -> Self {
        let mut substitution = Substitution::default();
        substitution.bind_all(parameters, arguments);
        substitution
    }

    /// A copy of this substitution with additional mappings
    pub(crate) fn extended(&self, parameters: &[TypeNodeRc], arguments: &[TypeNodeRc]) -> Self {
        let mut map = CacheMap::with_capacity(self.map.capacity());
        for (key, argument) in self.map.iter() {
            // keys come from a valid map
            let _ = map.set(key, argument.clone());
        }

        let mut substitution = Substitution { map };
        substitution.bind_all(parameters, arguments);
        substitution
    }

    fn bind_all(&mut self, parameters: &[TypeNodeRc], arguments: &[TypeNodeRc]) {
        for (parameter, argument) in parameters.iter().zip(arguments) {
            if let Err(error) = self.map.set(parameter.unique_key(), argument.handle()) {
                log::error!("cannot bind {}: {error}", parameter.name);
            }
        }
    }

    /// The argument bound to `parameter`
    pub(crate) fn get(&self, parameter: &TypeNode) -> Option<TypeNodeRc> {
        self.map.get(parameter.unique_key()).and_then(TypeNodeRef::upgrade)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Rebuilds types under a [`Substitution`]
pub(crate) struct Specializer<'a> {
    substitution: &'a Substitution,
    scope: &'a Arc<Module>,
}

impl<'a> Specializer<'a> {
    pub(crate) fn new(substitution: &'a Substitution, scope: &'a Arc<Module>) -> Self {
        Specializer {
            substitution,
            scope,
        }
    }

    /// `ty` with every bound parameter replaced by its argument
    pub(crate) fn specialize(&self, ty: &TypeNodeRc) -> TypeNodeRc {
        if self.substitution.is_empty() || ty.is_fully_specialized() {
            return ty.clone();
        }

        if ty.generic_instance().is_some() {
            return self.specialize_instance(ty);
        }

        match &ty.kind {
            TypeKind::TypeParameter { .. } => {
                self.substitution.get(ty).unwrap_or_else(|| ty.clone())
            }
            TypeKind::Array {
                element,
                rank,
                dimensions,
            } => match self.changed(element) {
                Some(element) => self.scope.array_of(&element, *rank, dimensions.clone()),
                None => ty.clone(),
            },
            TypeKind::Pointer { element } => match self.changed(element) {
                Some(element) => self.scope.pointer_to(&element),
                None => ty.clone(),
            },
            TypeKind::Reference { element } => match self.changed(element) {
                Some(element) => self.scope.reference_to(&element),
                None => ty.clone(),
            },
            TypeKind::Modified {
                kind,
                modifier,
                inner,
            } => {
                let new_modifier = self.changed(modifier);
                let new_inner = self.changed(inner);
                if new_modifier.is_none() && new_inner.is_none() {
                    return ty.clone();
                }

                match (
                    new_modifier.or_else(|| modifier.upgrade()),
                    new_inner.or_else(|| inner.upgrade()),
                ) {
                    (Some(modifier), Some(inner)) => self.scope.modified(*kind, &modifier, &inner),
                    _ => ty.clone(),
                }
            }
            _ => self.specialize_nested(ty),
        }
    }

    /// The specialized target of `reference`, `None` if nothing changed
    fn changed(&self, reference: &TypeNodeRef) -> Option<TypeNodeRc> {
        let original = reference.upgrade()?;
        let specialized = self.specialize(&original);
        (!Arc::ptr_eq(&original, &specialized)).then_some(specialized)
    }

    /// Same as [`Specializer::specialize`] for a non-owning reference
    pub(crate) fn specialize_ref(&self, reference: &TypeNodeRef) -> TypeNodeRef {
        match self.changed(reference) {
            Some(specialized) => specialized.handle(),
            None => reference.clone(),
        }
    }

    fn specialize_instance(&self, instance: &TypeNodeRc) -> TypeNodeRc {
        let Some(definition) = instance.generic_definition() else {
            return instance.clone();
        };

        let arguments = instance.consolidated_template_arguments();
        let specialized: Vec<TypeNodeRc> = arguments
            .iter()
            .map(|argument| self.specialize(argument))
            .collect();
        if arguments
            .iter()
            .zip(&specialized)
            .all(|(before, after)| Arc::ptr_eq(before, after))
        {
            return instance.clone();
        }

        Instantiator::new(self.scope).instantiate(&definition, &specialized)
    }

    /// A nested type copied into an instance follows its declaring type
    fn specialize_nested(&self, ty: &TypeNodeRc) -> TypeNodeRc {
        if ty.origin().is_none() {
            return ty.clone();
        }
        let Some(declaring) = ty.declaring_type() else {
            return ty.clone();
        };

        let specialized = self.specialize(&declaring);
        if Arc::ptr_eq(&declaring, &specialized) {
            return ty.clone();
        }

        specialized.nested_type(&ty.name).unwrap_or_else(|| {
            log::warn!(
                "{} has no nested type {}, keeping the unspecialized type",
                specialized.full_name(),
                ty.name
            );
            ty.clone()
        })
    }

    pub(crate) fn specialize_signature(&self, signature: &MethodSignature) -> MethodSignature {
        MethodSignature {
            return_type: signature
                .return_type
                .as_ref()
                .map(|return_type| self.specialize_ref(return_type)),
            parameters: signature
                .parameters
                .iter()
                .map(|parameter| Parameter {
                    name: parameter.name.clone(),
                    parameter_type: self.specialize_ref(&parameter.parameter_type),
                })
                .collect(),
        }
    }

    pub(crate) fn specialize_member_kind(&self, kind: &MemberKind) -> MemberKind {
        match kind {
            MemberKind::Field { field_type } => MemberKind::Field {
                field_type: self.specialize_ref(field_type),
            },
            MemberKind::Method(signature) => MemberKind::Method(self.specialize_signature(signature)),
            MemberKind::Property { property_type } => MemberKind::Property {
                property_type: self.specialize_ref(property_type),
            },
            MemberKind::Event { handler_type } => MemberKind::Event {
                handler_type: self.specialize_ref(handler_type),
            },
        }
    }

    /// Copy `member` into `owner` with a specialized signature
    ///
    /// Method-level parameters of generic methods are shared with the original.
    fn specialize_member(&self, member: &MemberRc, owner: &TypeNodeRc) -> MemberRc {
        let copy = Member::create(
            owner.context(),
            member.name.clone(),
            self.specialize_member_kind(&member.kind),
            member.flags,
            None,
        );
        copy.set_declaring_type(owner);
        copy.share_template_parameters(member);
        copy
    }

    fn specialize_argument(&self, argument: &AttributeArgument) -> AttributeArgument {
        match argument {
            AttributeArgument::Literal(value) => AttributeArgument::Literal(value.clone()),
            AttributeArgument::Type(reference) => {
                AttributeArgument::Type(self.specialize_ref(reference))
            }
            AttributeArgument::Array(items) => AttributeArgument::Array(
                items
                    .iter()
                    .map(|item| self.specialize_argument(item))
                    .collect(),
            ),
        }
    }

    fn specialize_attribute(&self, attribute: &Attribute) -> Attribute {
        Attribute {
            attribute_type: self.specialize_ref(&attribute.attribute_type),
            arguments: attribute
                .arguments
                .iter()
                .map(|argument| self.specialize_argument(argument))
                .collect(),
            named_arguments: attribute
                .named_arguments
                .iter()
                .map(|named| NamedArgument {
                    name: named.name.clone(),
                    is_field: named.is_field,
                    value: self.specialize_argument(&named.value),
                })
                .collect(),
        }
    }
}

/// Copy the nested type `nested` into the instance `owner`
///
/// The copy gets fresh own type parameters; the substitution of its provider maps the
/// enclosing instance's parameters to their arguments and the original own parameters to
/// the fresh ones.
fn copy_nested_type(
    nested: &TypeNodeRc,
    owner: &TypeNodeRc,
    substitution: &Substitution,
    scope: &Arc<Module>,
) -> TypeNodeRc {
    let copy = scope.create_node(
        nested.kind.clone(),
        nested.namespace.clone(),
        nested.name.clone(),
        nested.flags,
        None,
    );
    copy.set_declaring_type(owner);
    copy.set_origin(nested);

    let own = nested.template_parameters();
    let fresh: Vec<TypeNodeRc> = own
        .iter()
        .map(|parameter| {
            let index = match parameter.kind {
                TypeKind::TypeParameter { index, .. } => index,
                _ => 0,
            };
            scope.define_type_parameter(&copy, index, parameter.name.as_str())
        })
        .collect();

    let substitution = substitution.extended(&own, &fresh);
    {
        let specializer = Specializer::new(&substitution, scope);
        for (original, parameter) in own.iter().zip(&fresh) {
            copy_constraints(&specializer, original, parameter);
        }
        copy_constraints(&specializer, nested, &copy);
    }

    copy.set_provider(
        Arc::new(SpecializingProvider::new(nested, substitution, scope)),
        ProviderHandle::empty(),
    );
    copy
}

/// Specialize the base type and interfaces of `from` onto `to`
pub(crate) fn copy_constraints(specializer: &Specializer<'_>, from: &TypeNode, to: &TypeNodeRc) {
    if let Some(base) = from.base_type() {
        if let Err(error) = to.set_base_type(&specializer.specialize(&base)) {
            log::warn!("{error}");
        }
    }
    for interface in from.interfaces() {
        to.add_interface(&specializer.specialize(&interface));
    }
}

/// Populates the collections of an instance from its template
pub(crate) struct SpecializingProvider {
    template: TypeNodeRef,
    substitution: Substitution,
    scope: Weak<Module>,
}

impl SpecializingProvider {
    pub(crate) fn new(template: &TypeNodeRc, substitution: Substitution, scope: &Arc<Module>) -> Self {
        SpecializingProvider {
            template: template.handle(),
            substitution,
            scope: Arc::downgrade(scope),
        }
    }

    fn source(&self) -> Option<(TypeNodeRc, Arc<Module>)> {
        match (self.template.upgrade(), self.scope.upgrade()) {
            (Some(template), Some(scope)) => Some((template, scope)),
            _ => {
                log::debug!("template or scope of a specialized type was released");
                None
            }
        }
    }
}

impl MetadataProvider for SpecializingProvider {
    fn members(&self, owner: &TypeNodeRc, _handle: &ProviderHandle) -> Option<Vec<MemberRc>> {
        let Some((template, scope)) = self.source() else {
            return Some(Vec::new());
        };

        let specializer = Specializer::new(&self.substitution, &scope);
        Some(
            template
                .members()
                .iter()
                .map(|member| specializer.specialize_member(member, owner))
                .collect(),
        )
    }

    fn attributes(&self, _owner: &TypeNodeRc, _handle: &ProviderHandle) -> Option<Vec<Attribute>> {
        let Some((template, scope)) = self.source() else {
            return Some(Vec::new());
        };

        let specializer = Specializer::new(&self.substitution, &scope);
        Some(
            template
                .attributes()
                .iter()
                .map(|attribute| specializer.specialize_attribute(attribute))
                .collect(),
        )
    }

    fn nested_types(&self, owner: &TypeNodeRc, _handle: &ProviderHandle) -> Option<Vec<TypeNodeRc>> {
        let Some((template, scope)) = self.source() else {
            return Some(Vec::new());
        };

        Some(
            template
                .nested_types()
                .iter()
                .map(|nested| copy_nested_type(nested, owner, &self.substitution, &scope))
                .collect(),
        )
    }
}
