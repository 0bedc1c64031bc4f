use std::fmt;

use strum::{EnumCount, EnumIter};

/// The built-in types of the core library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
pub enum PrimitiveKind {
    /// `System.Void`
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Char`
    Char,
    /// `System.SByte`
    I1,
    /// `System.Byte`
    U1,
    /// `System.Int16`
    I2,
    /// `System.UInt16`
    U2,
    /// `System.Int32`
    I4,
    /// `System.UInt32`
    U4,
    /// `System.Int64`
    I8,
    /// `System.UInt64`
    U8,
    /// `System.Single`
    R4,
    /// `System.Double`
    R8,
    /// `System.IntPtr`
    I,
    /// `System.UIntPtr`
    U,
    /// `System.Object`
    Object,
    /// `System.String`
    String,
    /// `System.TypedReference`
    TypedReference,
    /// `System.ValueType`
    ValueType,
}

impl PrimitiveKind {
    /// Get the namespace of this type
    #[must_use]
    pub fn namespace(&self) -> &'static str {
        "System"
    }

    /// Get the short name (without namespace)
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PrimitiveKind::Void => "Void",
            PrimitiveKind::Boolean => "Boolean",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::I1 => "SByte",
            PrimitiveKind::U1 => "Byte",
            PrimitiveKind::I2 => "Int16",
            PrimitiveKind::U2 => "UInt16",
            PrimitiveKind::I4 => "Int32",
            PrimitiveKind::U4 => "UInt32",
            PrimitiveKind::I8 => "Int64",
            PrimitiveKind::U8 => "UInt64",
            PrimitiveKind::R4 => "Single",
            PrimitiveKind::R8 => "Double",
            PrimitiveKind::I => "IntPtr",
            PrimitiveKind::U => "UIntPtr",
            PrimitiveKind::Object => "Object",
            PrimitiveKind::String => "String",
            PrimitiveKind::TypedReference => "TypedReference",
            PrimitiveKind::ValueType => "ValueType",
        }
    }

    /// Get the full name (with namespace)
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace(), self.name())
    }

    /// Is this a value type
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        !matches!(
            self,
            PrimitiveKind::Object | PrimitiveKind::String | PrimitiveKind::ValueType
        )
    }
}

/// A literal value, as carried by attribute arguments and constants
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PrimitiveValue {
    /// The null reference
    #[default]
    Null,
    /// Boolean value
    Boolean(bool),
    /// Character value
    Char(char),
    /// 8-bit signed integer
    I1(i8),
    /// 8-bit unsigned integer
    U1(u8),
    /// 16-bit signed integer
    I2(i16),
    /// 16-bit unsigned integer
    U2(u16),
    /// 32-bit signed integer
    I4(i32),
    /// 32-bit unsigned integer
    U4(u32),
    /// 64-bit signed integer
    I8(i64),
    /// 64-bit unsigned integer
    U8(u64),
    /// 32-bit floating point
    R4(f32),
    /// 64-bit floating point
    R8(f64),
    /// String value
    String(String),
}

impl PrimitiveValue {
    /// The primitive type of this value, `None` for null
    #[must_use]
    pub fn kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            PrimitiveValue::Null => return None,
            PrimitiveValue::Boolean(_) => PrimitiveKind::Boolean,
            PrimitiveValue::Char(_) => PrimitiveKind::Char,
            PrimitiveValue::I1(_) => PrimitiveKind::I1,
            PrimitiveValue::U1(_) => PrimitiveKind::U1,
            PrimitiveValue::I2(_) => PrimitiveKind::I2,
            PrimitiveValue::U2(_) => PrimitiveKind::U2,
            PrimitiveValue::I4(_) => PrimitiveKind::I4,
            PrimitiveValue::U4(_) => PrimitiveKind::U4,
            PrimitiveValue::I8(_) => PrimitiveKind::I8,
            PrimitiveValue::U8(_) => PrimitiveKind::U8,
            PrimitiveValue::R4(_) => PrimitiveKind::R4,
            PrimitiveValue::R8(_) => PrimitiveKind::R8,
            PrimitiveValue::String(_) => PrimitiveKind::String,
        })
    }

    /// Try to convert to a boolean value
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            PrimitiveValue::Boolean(value) => Some(*value),
            PrimitiveValue::I4(value) => Some(*value != 0),
            PrimitiveValue::U4(value) => Some(*value != 0),
            PrimitiveValue::I8(value) => Some(*value != 0),
            PrimitiveValue::U8(value) => Some(*value != 0),
            _ => None,
        }
    }

    /// Try to convert to a 64-bit integer value
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PrimitiveValue::Boolean(value) => Some(i64::from(*value)),
            PrimitiveValue::Char(value) => Some(i64::from(u32::from(*value))),
            PrimitiveValue::I1(value) => Some(i64::from(*value)),
            PrimitiveValue::U1(value) => Some(i64::from(*value)),
            PrimitiveValue::I2(value) => Some(i64::from(*value)),
            PrimitiveValue::U2(value) => Some(i64::from(*value)),
            PrimitiveValue::I4(value) => Some(i64::from(*value)),
            PrimitiveValue::U4(value) => Some(i64::from(*value)),
            PrimitiveValue::I8(value) => Some(*value),
            PrimitiveValue::U8(value) => i64::try_from(*value).ok(),
            _ => None,
        }
    }

    /// Try to convert to an integer value
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        self.as_i64().and_then(|value| i32::try_from(value).ok())
    }

    /// Try to get the string value
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PrimitiveValue::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveValue::Null => write!(f, "null"),
            PrimitiveValue::Boolean(value) => write!(f, "{value}"),
            PrimitiveValue::Char(value) => write!(f, "'{value}'"),
            PrimitiveValue::I1(value) => write!(f, "{value}"),
            PrimitiveValue::U1(value) => write!(f, "{value}"),
            PrimitiveValue::I2(value) => write!(f, "{value}"),
            PrimitiveValue::U2(value) => write!(f, "{value}"),
            PrimitiveValue::I4(value) => write!(f, "{value}"),
            PrimitiveValue::U4(value) => write!(f, "{value}"),
            PrimitiveValue::I8(value) => write!(f, "{value}"),
            PrimitiveValue::U8(value) => write!(f, "{value}"),
            PrimitiveValue::R4(value) => write!(f, "{value}"),
            PrimitiveValue::R8(value) => write!(f, "{value}"),
            PrimitiveValue::String(value) => write!(f, "\"{value}\""),
        }
    }
}

impl From<bool> for PrimitiveValue {
    fn from(value: bool) -> Self {
        PrimitiveValue::Boolean(value)
    }
}

impl From<i32> for PrimitiveValue {
    fn from(value: i32) -> Self {
        PrimitiveValue::I4(value)
    }
}

impl From<i64> for PrimitiveValue {
    fn from(value: i64) -> Self {
        PrimitiveValue::I8(value)
    }
}

impl From<f64> for PrimitiveValue {
    fn from(value: f64) -> Self {
        PrimitiveValue::R8(value)
    }
}

impl From<&str> for PrimitiveValue {
    fn from(value: &str) -> Self {
        PrimitiveValue::String(value.to_string())
    }
}

impl From<String> for PrimitiveValue {
    fn from(value: String) -> Self {
        PrimitiveValue::String(value)
    }
}
