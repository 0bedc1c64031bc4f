use std::sync::Arc;

use crate::metadata::{
    interner::Identifier,
    typesystem::{PrimitiveValue, TypeNodeRc, TypeNodeRef},
};

/// A positional or named value passed to an attribute constructor
#[derive(Clone, Debug)]
pub enum AttributeArgument {
    /// A primitive literal
    Literal(PrimitiveValue),
    /// A `typeof(...)` argument
    Type(TypeNodeRef),
    /// An array of arguments
    Array(Vec<AttributeArgument>),
}

impl AttributeArgument {
    fn collect_types(&self, out: &mut Vec<TypeNodeRc>) {
        match self {
            AttributeArgument::Literal(_) => {}
            AttributeArgument::Type(reference) => out.extend(reference.upgrade()),
            AttributeArgument::Array(items) => {
                for item in items {
                    item.collect_types(out);
                }
            }
        }
    }
}

/// A field or property assignment of an attribute
#[derive(Clone, Debug)]
pub struct NamedArgument {
    /// Name of the field or property
    pub name: Identifier,
    /// `true` for fields, `false` for properties
    pub is_field: bool,
    /// The assigned value
    pub value: AttributeArgument,
}

/// A custom attribute applied to a type or module
#[derive(Clone, Debug)]
pub struct Attribute {
    /// The attribute class
    pub attribute_type: TypeNodeRef,
    /// Positional constructor arguments
    pub arguments: Vec<AttributeArgument>,
    /// Field and property assignments
    pub named_arguments: Vec<NamedArgument>,
}

impl Attribute {
    /// An attribute of class `attribute_type` without arguments
    #[must_use]
    pub fn new(attribute_type: &TypeNodeRc) -> Self {
        Attribute {
            attribute_type: attribute_type.into(),
            arguments: Vec::new(),
            named_arguments: Vec::new(),
        }
    }

    /// Append a positional argument
    #[must_use]
    pub fn with_argument(mut self, argument: AttributeArgument) -> Self {
        self.arguments.push(argument);
        self
    }

    /// Append a positional literal argument
    #[must_use]
    pub fn with_literal(self, value: impl Into<PrimitiveValue>) -> Self {
        self.with_argument(AttributeArgument::Literal(value.into()))
    }

    /// Append a positional `typeof(...)` argument
    #[must_use]
    pub fn with_type(self, argument: &TypeNodeRc) -> Self {
        self.with_argument(AttributeArgument::Type(argument.into()))
    }

    /// Append a field or property assignment
    #[must_use]
    pub fn with_named(mut self, name: Identifier, is_field: bool, value: AttributeArgument) -> Self {
        self.named_arguments.push(NamedArgument {
            name,
            is_field,
            value,
        });
        self
    }

    /// Every live type referenced by the arguments, in order of appearance
    #[must_use]
    pub fn referenced_types(&self) -> Vec<TypeNodeRc> {
        let mut types = Vec::new();
        for argument in &self.arguments {
            argument.collect_types(&mut types);
        }
        for named in &self.named_arguments {
            named.value.collect_types(&mut types);
        }
        types
    }
}

/// A resource embedded in or linked from a module
#[derive(Clone, Debug)]
pub struct Resource {
    /// Resource name
    pub name: String,
    /// `true` if the resource is visible outside its assembly
    pub public: bool,
    /// Resource payload
    pub data: Arc<[u8]>,
}

impl Resource {
    /// Create a resource
    pub fn new(name: impl Into<String>, public: bool, data: impl Into<Arc<[u8]>>) -> Self {
        Resource {
            name: name.into(),
            public,
            data: data.into(),
        }
    }
}
