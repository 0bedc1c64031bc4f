//! Structural equivalence of type nodes.
//!
//! Two independently constructed nodes are equivalent when they denote the same type shape:
//!
//! | Category of both operands | Equivalent iff |
//! |---|---|
//! | Array | element types equivalent, equal rank, equal declared sizes and lower bounds |
//! | Pointer / Reference | element types equivalent |
//! | Modified type | same modifier kind, modifiers equivalent, inner types equivalent |
//! | Generic instance | same generic definition, own arguments pairwise equivalent, declaring types equivalent |
//! | Nested type copied into an instance | copied from the same nested type, declaring instances equivalent |
//! | Type parameter | same level and index, identical constraints, same declaring method for method-level parameters |
//! | Nominal type | identity |
//!
//! Operands of different categories are never equivalent. Type parameter constraints are
//! compared by identity only, which keeps self-referential constraints such as
//! `T : IComparable<T>` from recursing.

use std::sync::Arc;

use crate::metadata::typesystem::{
    ArrayDimensions, GenericInstance, TypeKind, TypeNode, TypeNodeRc, TypeNodeRef,
};

/// Shape-based equality between type representations
pub trait StructuralEquivalence {
    /// Returns `true` if `self` and `other` denote the same type shape
    fn is_structurally_equivalent(&self, other: &Self) -> bool;
}

impl StructuralEquivalence for TypeNode {
    fn is_structurally_equivalent(&self, other: &Self) -> bool {
        equivalent(self, other)
    }
}

impl StructuralEquivalence for TypeNodeRef {
    fn is_structurally_equivalent(&self, other: &Self) -> bool {
        refs_equivalent(self, other)
    }
}

/// Decide whether `a` and `b` denote the same type shape
#[must_use]
pub fn equivalent(a: &TypeNode, b: &TypeNode) -> bool {
    if a.is(b) {
        return true;
    }

    match (a.generic_instance(), b.generic_instance()) {
        (Some(first), Some(second)) => return instances_equivalent(a, first, b, second),
        (None, None) => {}
        _ => return false,
    }

    match (a.origin(), b.origin()) {
        (Some(first), Some(second)) => {
            return Arc::ptr_eq(&first, &second) && declaring_equivalent(a, b)
        }
        (None, None) => {}
        _ => return false,
    }

    match (&a.kind, &b.kind) {
        (
            TypeKind::Array {
                element: first_element,
                rank: first_rank,
                dimensions: first_dimensions,
            },
            TypeKind::Array {
                element: second_element,
                rank: second_rank,
                dimensions: second_dimensions,
            },
        ) => {
            first_rank == second_rank
                && dimensions_equal(first_dimensions, second_dimensions)
                && refs_equivalent(first_element, second_element)
        }
        (TypeKind::Pointer { element: first }, TypeKind::Pointer { element: second })
        | (TypeKind::Reference { element: first }, TypeKind::Reference { element: second }) => {
            refs_equivalent(first, second)
        }
        (
            TypeKind::Modified {
                kind: first_kind,
                modifier: first_modifier,
                inner: first_inner,
            },
            TypeKind::Modified {
                kind: second_kind,
                modifier: second_modifier,
                inner: second_inner,
            },
        ) => {
            first_kind == second_kind
                && refs_equivalent(first_modifier, second_modifier)
                && refs_equivalent(first_inner, second_inner)
        }
        (
            TypeKind::TypeParameter {
                index: first_index,
                method_level: first_level,
            },
            TypeKind::TypeParameter {
                index: second_index,
                method_level: second_level,
            },
        ) => {
            first_index == second_index
                && first_level == second_level
                && constraints_identical(a, b)
                && (!*first_level || same_declaring_method(a, b))
        }
        // nominal types are only equivalent to themselves, handled above
        _ => false,
    }
}

/// Pairwise equivalence of two ordered type lists
#[must_use]
pub fn equivalent_lists(first: &[TypeNodeRc], second: &[TypeNodeRc]) -> bool {
    first.len() == second.len()
        && first
            .iter()
            .zip(second)
            .all(|(a, b)| equivalent(a, b))
}

fn refs_equivalent(first: &TypeNodeRef, second: &TypeNodeRef) -> bool {
    if first.same_node(second) {
        return first.is_valid();
    }

    match (first.upgrade(), second.upgrade()) {
        (Some(a), Some(b)) => equivalent(&a, &b),
        _ => false,
    }
}

fn dimensions_equal(first: &[ArrayDimensions], second: &[ArrayDimensions]) -> bool {
    let unspecified = ArrayDimensions::default();
    (0..first.len().max(second.len())).all(|index| {
        first.get(index).unwrap_or(&unspecified) == second.get(index).unwrap_or(&unspecified)
    })
}

fn instances_equivalent(
    a: &TypeNode,
    first: &GenericInstance,
    b: &TypeNode,
    second: &GenericInstance,
) -> bool {
    let same_definition = match (a.generic_definition(), b.generic_definition()) {
        (Some(x), Some(y)) => Arc::ptr_eq(&x, &y),
        _ => false,
    };
    if !same_definition || first.arguments.len() != second.arguments.len() {
        return false;
    }

    let arguments_match = first
        .arguments
        .iter()
        .zip(&second.arguments)
        .all(|(x, y)| refs_equivalent(x, y));
    if !arguments_match {
        return false;
    }

    declaring_equivalent(a, b)
}

fn declaring_equivalent(a: &TypeNode, b: &TypeNode) -> bool {
    match (a.declaring_type(), b.declaring_type()) {
        (Some(x), Some(y)) => equivalent(&x, &y),
        (None, None) => true,
        _ => false,
    }
}

fn constraints_identical(a: &TypeNode, b: &TypeNode) -> bool {
    let bases_match = match (a.base_type(), b.base_type()) {
        (Some(x), Some(y)) => Arc::ptr_eq(&x, &y),
        (None, None) => true,
        _ => false,
    };

    bases_match && {
        let first: Vec<&TypeNodeRef> = a.interface_refs().collect();
        let second: Vec<&TypeNodeRef> = b.interface_refs().collect();
        first.len() == second.len()
            && first
                .iter()
                .zip(&second)
                .all(|(x, y)| x.same_node(y))
    }
}

fn same_declaring_method(a: &TypeNode, b: &TypeNode) -> bool {
    match (a.declaring_method(), b.declaring_method()) {
        (Some(x), Some(y)) => Arc::ptr_eq(&x, &y),
        (None, None) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            module::Module,
            typesystem::{Member, MemberFlags, ModifierKind, TypeFlags},
        },
        test::helpers::CoreFixture,
    };

    #[test]
    fn test_reflexive_for_every_category() {
        let core = CoreFixture::new();
        let module = &core.module;
        let list = core.generic_class("Sample", "List`1", &["T"]);
        let modifier = core.class("System.Runtime.CompilerServices", "IsVolatile");

        let nodes = vec![
            core.int32.clone(),
            module.szarray_of(&core.int32),
            module.array_of(&core.int32, 3, vec![]),
            module.pointer_to(&core.int32),
            module.reference_to(&core.int32),
            module.modified(ModifierKind::Required, &modifier, &core.int32),
            list.template_parameters()[0].clone(),
            module.instantiate(&list, &[core.int32.clone()]),
        ];

        for node in &nodes {
            assert!(equivalent(node, node), "{} is not reflexive", node.full_name());
            assert!(node.is_structurally_equivalent(node));
        }
    }

    #[test]
    fn test_arrays() {
        let core = CoreFixture::new();
        let other = Module::new(&core.context, "Other");
        other.add_reference(&core.module);

        let vector = core.module.szarray_of(&core.int32);
        let independent = other.szarray_of(&core.int32);
        assert!(!Arc::ptr_eq(&vector, &independent));
        assert!(equivalent(&vector, &independent));

        assert!(!equivalent(&vector, &core.module.array_of(&core.int32, 2, vec![])));
        assert!(!equivalent(&vector, &core.module.szarray_of(&core.int64)));
    }

    #[test]
    fn test_array_bounds() {
        let core = CoreFixture::new();
        let sized = |size| {
            core.module.array_of(
                &core.int32,
                2,
                vec![ArrayDimensions {
                    size: Some(size),
                    lower_bound: Some(0),
                }],
            )
        };

        assert!(equivalent(&sized(4), &sized(4)));
        assert!(!equivalent(&sized(4), &sized(5)));
        assert!(!equivalent(&sized(4), &core.module.array_of(&core.int32, 2, vec![])));
    }

    #[test]
    fn test_pointer_and_reference() {
        let core = CoreFixture::new();
        let other = Module::new(&core.context, "Other");

        let pointer = core.module.pointer_to(&core.int32);
        let reference = core.module.reference_to(&core.int32);
        assert!(equivalent(&pointer, &other.pointer_to(&core.int32)));
        assert!(equivalent(&reference, &other.reference_to(&core.int32)));
        assert!(!equivalent(&pointer, &reference));
        assert!(!equivalent(&pointer, &core.module.pointer_to(&core.int64)));
        assert!(!equivalent(&pointer, &core.int32));
    }

    #[test]
    fn test_modified_types() {
        let core = CoreFixture::new();
        let other = Module::new(&core.context, "Other");
        let volatile = core.class("System.Runtime.CompilerServices", "IsVolatile");
        let constant = core.class("System.Runtime.CompilerServices", "IsConst");

        let modreq = core.module.modified(ModifierKind::Required, &volatile, &core.int32);
        assert!(equivalent(
            &modreq,
            &other.modified(ModifierKind::Required, &volatile, &core.int32)
        ));
        assert!(!equivalent(
            &modreq,
            &core.module.modified(ModifierKind::Optional, &volatile, &core.int32)
        ));
        assert!(!equivalent(
            &modreq,
            &core.module.modified(ModifierKind::Required, &constant, &core.int32)
        ));
        assert!(!equivalent(
            &modreq,
            &core.module.modified(ModifierKind::Required, &volatile, &core.int64)
        ));
    }

    #[test]
    fn test_nominal_identity() {
        let core = CoreFixture::new();
        let first = core.class("Sample", "Twin");
        let second = core.class("Sample", "Twin");

        assert!(equivalent(&first, &first));
        assert!(!equivalent(&first, &second));
    }

    #[test]
    fn test_type_parameters() {
        let core = CoreFixture::new();
        let first = core.generic_class("Sample", "First`1", &["T"]);
        let second = core.generic_class("Sample", "Second`2", &["T", "U"]);
        let t_first = first.template_parameters()[0].clone();
        let t_second = second.template_parameters()[0].clone();
        let u_second = second.template_parameters()[1].clone();

        assert!(equivalent(&t_first, &t_second));
        assert!(!equivalent(&t_first, &u_second));

        let comparable = core.module.define_type(
            crate::metadata::typesystem::TypeKind::Interface,
            "System",
            "IComparable",
            TypeFlags::PUBLIC | TypeFlags::INTERFACE | TypeFlags::ABSTRACT,
        );
        let constrained = core.generic_class("Sample", "Sorted`1", &["T"]);
        let t_constrained = constrained.template_parameters()[0].clone();
        t_constrained.add_interface(&comparable);
        assert!(!equivalent(&t_first, &t_constrained));
    }

    #[test]
    fn test_method_parameters_need_same_method() {
        let core = CoreFixture::new();
        let owner = core.class("Sample", "Util");
        let m1 = core.module.define_method_type_parameter(0, "T");
        let m2 = core.module.define_method_type_parameter(0, "T");
        let first = Member::method(&owner, "First", None, &[], std::slice::from_ref(&m1), MemberFlags::PUBLIC);
        let second = Member::method(&owner, "Second", None, &[], std::slice::from_ref(&m2), MemberFlags::PUBLIC);
        owner.set_members(vec![first, second]);

        let type_level = core.generic_class("Sample", "Box`1", &["T"]).template_parameters()[0].clone();
        assert!(!equivalent(&m1, &m2));
        assert!(!equivalent(&m1, &type_level));
    }

    #[test]
    fn test_nested_copies_follow_declaring_instance() {
        let core = CoreFixture::new();
        let other = Module::new(&core.context, "Other");
        other.add_reference(&core.module);
        let outer = core.generic_class("Sample", "Outer`1", &["T"]);
        let inner = core.module.define_nested_type(
            &outer,
            crate::metadata::typesystem::TypeKind::Class,
            "Inner",
            TypeFlags::NESTED_PUBLIC,
        );

        let local = core.module.instantiate(&inner, &[core.int32.clone()]);
        let foreign = other.instantiate(&inner, &[core.int32.clone()]);
        let wider = core.module.instantiate(&inner, &[core.int64.clone()]);

        assert!(!Arc::ptr_eq(&local, &foreign));
        assert!(equivalent(&local, &foreign));
        assert!(equivalent(&foreign, &local));
        assert!(!equivalent(&local, &wider));
        assert!(!equivalent(&local, &inner));
    }

    #[test]
    fn test_symmetric() {
        let core = CoreFixture::new();
        let a = core.module.szarray_of(&core.int32);
        let b = core.module.pointer_to(&core.int32);
        let c = core.module.szarray_of(&core.int64);
        for x in [&a, &b, &c] {
            for y in [&a, &b, &c] {
                assert_eq!(equivalent(x, y), equivalent(y, x));
            }
        }
    }
}
