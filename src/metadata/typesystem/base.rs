use std::{
    fmt,
    sync::{Arc, Weak},
};

use bitflags::bitflags;
use strum::{Display, EnumIter};

use crate::metadata::{
    interner::Identifier,
    typesystem::{TypeNode, TypeNodeRc},
};

/// Placeholder rendered for references into a released module
pub(crate) const UNLOADED_NAME: &str = "<unloaded>";

/// A smart reference to a `TypeNode` that automatically handles weak references
/// to prevent circular reference memory leaks while providing a clean API
#[derive(Clone)]
pub struct TypeNodeRef {
    weak_ref: Weak<TypeNode>,
}

impl TypeNodeRef {
    /// Create a new `TypeNodeRef` from a strong reference
    pub fn new(strong_ref: &TypeNodeRc) -> Self {
        Self {
            weak_ref: Arc::downgrade(strong_ref),
        }
    }

    /// Create a `TypeNodeRef` from an existing weak reference
    pub(crate) fn from_weak(weak_ref: Weak<TypeNode>) -> Self {
        Self { weak_ref }
    }

    /// Get a strong reference to the type, returning None if the type has been dropped
    #[must_use]
    pub fn upgrade(&self) -> Option<TypeNodeRc> {
        self.weak_ref.upgrade()
    }

    /// Check if the referenced type is still alive
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.weak_ref.strong_count() > 0
    }

    /// Check if this reference points at `other`
    #[must_use]
    pub fn ptr_eq(&self, other: &TypeNodeRc) -> bool {
        std::ptr::eq(self.weak_ref.as_ptr(), Arc::as_ptr(other))
    }

    /// Check if two references point at the same node
    #[must_use]
    pub fn same_node(&self, other: &TypeNodeRef) -> bool {
        Weak::ptr_eq(&self.weak_ref, &other.weak_ref)
    }

    /// Get the name of the referenced type (if still alive)
    #[must_use]
    pub fn name(&self) -> Option<Identifier> {
        self.upgrade().map(|t| t.name.clone())
    }

    /// Get the unique key of the referenced type (if still alive)
    #[must_use]
    pub fn unique_key(&self) -> Option<i32> {
        self.upgrade().map(|t| t.unique_key())
    }

    /// Get the full name of the referenced type, or a placeholder if it was released
    #[must_use]
    pub fn full_name(&self) -> String {
        self.upgrade()
            .map_or_else(|| UNLOADED_NAME.to_string(), |t| t.full_name())
    }
}

impl From<TypeNodeRc> for TypeNodeRef {
    fn from(strong_ref: TypeNodeRc) -> Self {
        Self::new(&strong_ref)
    }
}

impl From<&TypeNodeRc> for TypeNodeRef {
    fn from(strong_ref: &TypeNodeRc) -> Self {
        Self::new(strong_ref)
    }
}

impl fmt::Debug for TypeNodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeNodeRef({})", self.full_name())
    }
}

/// A single dimension of an array
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArrayDimensions {
    /// The size of this dimension
    pub size: Option<u32>,
    /// The lower bound of this dimension (lowest index that can be used to access an element)
    pub lower_bound: Option<i32>,
}

/// Distinguishes `modreq` from `modopt` modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ModifierKind {
    /// An optional modifier, ignorable by consumers that do not understand it
    #[strum(serialize = "modopt")]
    Optional,
    /// A required modifier
    #[strum(serialize = "modreq")]
    Required,
}

/// The syntactic category of a [`TypeNode`] together with its structural payload
///
/// Generic instances keep the kind of their template; they are recognized through
/// [`TypeNode::generic_instance`].
#[derive(Clone)]
pub enum TypeKind {
    /// A reference type
    Class,
    /// An interface
    Interface,
    /// A value type
    Struct,
    /// An enumeration
    Enum,
    /// A delegate
    Delegate,
    /// An array of `element`; single-dimensional zero-based arrays have rank 1 and no dimensions
    Array {
        /// The element type
        element: TypeNodeRef,
        /// Number of dimensions
        rank: u32,
        /// Declared sizes and lower bounds, possibly fewer than `rank`
        dimensions: Vec<ArrayDimensions>,
    },
    /// An unmanaged pointer to `element`
    Pointer {
        /// The pointee type
        element: TypeNodeRef,
    },
    /// A managed reference to `element`
    Reference {
        /// The referenced type
        element: TypeNodeRef,
    },
    /// `inner` decorated with a custom modifier
    Modified {
        /// Whether the modifier is required or optional
        kind: ModifierKind,
        /// The modifier type
        modifier: TypeNodeRef,
        /// The modified type
        inner: TypeNodeRef,
    },
    /// A formal generic parameter of a type or a method
    TypeParameter {
        /// Position within the declaring type's or method's own parameter list
        index: u32,
        /// `true` for method-level parameters
        method_level: bool,
    },
}

impl TypeKind {
    /// Returns `true` for class, interface, struct, enum and delegate
    #[must_use]
    pub fn is_nominal(&self) -> bool {
        matches!(
            self,
            TypeKind::Class
                | TypeKind::Interface
                | TypeKind::Struct
                | TypeKind::Enum
                | TypeKind::Delegate
        )
    }

    /// The element type of arrays, pointers and references, or the inner type of modifiers
    #[must_use]
    pub fn element(&self) -> Option<&TypeNodeRef> {
        match self {
            TypeKind::Array { element, .. }
            | TypeKind::Pointer { element }
            | TypeKind::Reference { element } => Some(element),
            TypeKind::Modified { inner, .. } => Some(inner),
            _ => None,
        }
    }

    /// Short label of the category, used in diagnostics
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Interface => "interface",
            TypeKind::Struct => "struct",
            TypeKind::Enum => "enum",
            TypeKind::Delegate => "delegate",
            TypeKind::Array { .. } => "array",
            TypeKind::Pointer { .. } => "pointer",
            TypeKind::Reference { .. } => "reference",
            TypeKind::Modified { .. } => "modified",
            TypeKind::TypeParameter { .. } => "type parameter",
        }
    }
}

impl fmt::Debug for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Array { element, rank, .. } => {
                write!(f, "Array({}, rank {rank})", element.full_name())
            }
            TypeKind::Pointer { element } => write!(f, "Pointer({})", element.full_name()),
            TypeKind::Reference { element } => write!(f, "Reference({})", element.full_name()),
            TypeKind::Modified {
                kind,
                modifier,
                inner,
            } => write!(
                f,
                "Modified({kind} {}, {})",
                modifier.full_name(),
                inner.full_name()
            ),
            TypeKind::TypeParameter {
                index,
                method_level,
            } => {
                let prefix = if *method_level { "!!" } else { "!" };
                write!(f, "TypeParameter({prefix}{index})")
            }
            other => f.write_str(other.label()),
        }
    }
}

/// Mask for extracting type visibility information from [`TypeFlags`]
pub const TYPE_VISIBILITY_MASK: u32 = 0x0000_0007;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Type attributes, using the ECMA-335 `TypeAttributes` bit layout
    pub struct TypeFlags: u32 {
        /// Type has public scope
        const PUBLIC = 0x0000_0001;
        /// Nested type with public visibility
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested type with private visibility
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested type with family visibility
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested type with assembly visibility
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Nested type with family AND assembly visibility
        const NESTED_FAM_AND_ASSEM = 0x0000_0006;
        /// Nested type with family OR assembly visibility
        const NESTED_FAM_OR_ASSEM = 0x0000_0007;
        /// Fields are laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Fields are laid out at explicit offsets
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type is abstract
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Type name is special
        const SPECIAL_NAME = 0x0000_0400;
        /// Type is imported
        const IMPORT = 0x0000_1000;
        /// Type is serializable
        const SERIALIZABLE = 0x0000_2000;
        /// Static initializer may run before first static field access
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

impl TypeFlags {
    /// The raw three visibility bits
    #[must_use]
    pub fn visibility_bits(self) -> u32 {
        self.bits() & TYPE_VISIBILITY_MASK
    }

    /// Replace the visibility bits with those of `visibility`
    #[must_use]
    pub fn with_visibility(self, visibility: Visibility, nested: bool) -> Self {
        Self::from_bits_retain((self.bits() & !TYPE_VISIBILITY_MASK) | visibility.to_bits(nested))
    }
}

/// Accessibility of a type, independent of whether it is nested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Visibility {
    /// Accessible from everywhere
    Public,
    /// Accessible to derived types or within the assembly
    FamilyOrAssembly,
    /// Accessible to derived types
    Family,
    /// Accessible within the assembly
    Assembly,
    /// Accessible to derived types within the assembly
    FamilyAndAssembly,
    /// Accessible within the enclosing type only
    Private,
}

impl Visibility {
    /// Decode the visibility bits of `flags`
    #[must_use]
    pub fn from_flags(flags: TypeFlags) -> Self {
        match flags.visibility_bits() {
            0x1 | 0x2 => Visibility::Public,
            0x3 => Visibility::Private,
            0x4 => Visibility::Family,
            0x6 => Visibility::FamilyAndAssembly,
            0x7 => Visibility::FamilyOrAssembly,
            _ => Visibility::Assembly,
        }
    }

    /// Encode as visibility bits
    ///
    /// Top-level types can only be public or assembly-visible; every narrower visibility
    /// collapses to "not public" when `nested` is false.
    #[must_use]
    pub fn to_bits(self, nested: bool) -> u32 {
        match (self, nested) {
            (Visibility::Public, false) => 0x1,
            (Visibility::Public, true) => 0x2,
            (_, false) => 0x0,
            (Visibility::Private, true) => 0x3,
            (Visibility::Family, true) => 0x4,
            (Visibility::Assembly, true) => 0x5,
            (Visibility::FamilyAndAssembly, true) => 0x6,
            (Visibility::FamilyOrAssembly, true) => 0x7,
        }
    }

    /// The visibility that admits exactly the accessors admitted by both `self` and `other`
    #[must_use]
    pub fn narrowest(self, other: Visibility) -> Visibility {
        use Visibility::{Assembly, Family, FamilyAndAssembly, FamilyOrAssembly, Private, Public};

        match (self, other) {
            (a, b) if a == b => a,
            (Private, _) | (_, Private) => Private,
            (Public, x) | (x, Public) => x,
            (FamilyOrAssembly, x) | (x, FamilyOrAssembly) => x,
            (Family, Assembly) | (Assembly, Family) => FamilyAndAssembly,
            (FamilyAndAssembly, _) | (_, FamilyAndAssembly) => FamilyAndAssembly,
            (a, _) => a,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_visibility_round_trip() {
        for visibility in Visibility::iter() {
            let flags = TypeFlags::from_bits_retain(visibility.to_bits(true));
            assert_eq!(Visibility::from_flags(flags), visibility);
        }

        assert_eq!(Visibility::from_flags(TypeFlags::PUBLIC), Visibility::Public);
        assert_eq!(Visibility::from_flags(TypeFlags::empty()), Visibility::Assembly);
    }

    #[test]
    fn test_narrowest() {
        use Visibility::*;

        assert_eq!(Public.narrowest(Assembly), Assembly);
        assert_eq!(Assembly.narrowest(Public), Assembly);
        assert_eq!(Family.narrowest(Assembly), FamilyAndAssembly);
        assert_eq!(FamilyOrAssembly.narrowest(Family), Family);
        assert_eq!(FamilyAndAssembly.narrowest(Public), FamilyAndAssembly);
        assert_eq!(Private.narrowest(Public), Private);

        for a in Visibility::iter() {
            assert_eq!(a.narrowest(a), a);
            assert_eq!(a.narrowest(Public), a);
            for b in Visibility::iter() {
                assert_eq!(a.narrowest(b), b.narrowest(a));
            }
        }
    }

    #[test]
    fn test_with_visibility_keeps_other_bits() {
        let flags = TypeFlags::PUBLIC | TypeFlags::SEALED | TypeFlags::SERIALIZABLE;

        let narrowed = flags.with_visibility(Visibility::Assembly, false);
        assert_eq!(narrowed.visibility_bits(), 0);
        assert!(narrowed.contains(TypeFlags::SEALED | TypeFlags::SERIALIZABLE));

        let nested = flags.with_visibility(Visibility::Family, true);
        assert_eq!(Visibility::from_flags(nested), Visibility::Family);
    }

    #[test]
    fn test_modifier_kind_display() {
        assert_eq!(ModifierKind::Required.to_string(), "modreq");
        assert_eq!(ModifierKind::Optional.to_string(), "modopt");
    }
}
