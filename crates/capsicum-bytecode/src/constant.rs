//! Constant pool values.
//!
//! A code unit's constants are shared behind [`Arc`], so the translator can
//! key its accessor table on object identity: the same constant object
//! always maps to the same accessor, while two equal but distinct objects
//! get separate ones.

use std::fmt;
use std::sync::Arc;

use ordered_float::OrderedFloat;

use crate::code_unit::CodeUnit;

/// A value stored in a code unit's constant pool.
#[derive(Debug, Clone)]
pub enum Constant {
    None,
    Ellipsis,
    Bool(bool),
    /// Integer that fits a C `long long`.
    Int(i64),
    /// Arbitrary-precision integer, as decimal digits with optional sign.
    BigInt(String),
    Float(OrderedFloat<f64>),
    Complex {
        real: OrderedFloat<f64>,
        imag: OrderedFloat<f64>,
    },
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Arc<Constant>>),
    FrozenSet(Vec<Arc<Constant>>),
    /// A nested routine (function, class body, comprehension, lambda).
    Code(Arc<CodeUnit>),
}

impl Constant {
    /// Interpreter singletons are referenced directly, never materialized.
    pub fn is_singleton(&self) -> bool {
        matches!(self, Constant::None | Constant::Ellipsis | Constant::Bool(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Constant::Int(v) => Some(*v),
            Constant::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Constant::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<&Arc<CodeUnit>> {
        match self {
            Constant::Code(code) => Some(code),
            _ => None,
        }
    }

    /// Strings of a tuple of strings (import from-lists, keyword names).
    ///
    /// `None` yields an empty list; anything else is not a name list.
    pub fn as_name_list(&self) -> Option<Vec<&str>> {
        match self {
            Constant::None => Some(Vec::new()),
            Constant::Tuple(items) => items.iter().map(|item| item.as_str()).collect(),
            _ => None,
        }
    }

    /// Interpreter type name, for diagnostics and generated comments.
    pub fn type_name(&self) -> &'static str {
        match self {
            Constant::None => "NoneType",
            Constant::Ellipsis => "ellipsis",
            Constant::Bool(_) => "bool",
            Constant::Int(_) | Constant::BigInt(_) => "int",
            Constant::Float(_) => "float",
            Constant::Complex { .. } => "complex",
            Constant::Str(_) => "str",
            Constant::Bytes(_) => "bytes",
            Constant::Tuple(_) => "tuple",
            Constant::FrozenSet(_) => "frozenset",
            Constant::Code(_) => "code",
        }
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        use Constant::*;
        match (self, other) {
            (None, None) | (Ellipsis, Ellipsis) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (BigInt(a), BigInt(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (
                Complex { real: ar, imag: ai },
                Complex { real: br, imag: bi },
            ) => ar == br && ai == bi,
            (Str(a), Str(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Tuple(a), Tuple(b)) | (FrozenSet(a), FrozenSet(b)) => a == b,
            // code objects compare by identity
            (Code(a), Code(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Constant {
    /// Short, comment-safe rendering.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::None => write!(f, "None"),
            Constant::Ellipsis => write!(f, "Ellipsis"),
            Constant::Bool(true) => write!(f, "True"),
            Constant::Bool(false) => write!(f, "False"),
            Constant::Int(v) => write!(f, "{v}"),
            Constant::BigInt(v) => write!(f, "{v}"),
            Constant::Float(v) => write!(f, "{:?}", v.0),
            Constant::Complex { real, imag } => write!(f, "({:?}+{:?}j)", real.0, imag.0),
            Constant::Str(s) => {
                let short: String = s.chars().take(24).filter(|c| !c.is_control()).collect();
                // keep generated comments well-formed
                write!(f, "'{}'", short.replace("*/", "* /"))
            }
            Constant::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Constant::Tuple(items) => write!(f, "<tuple of {}>", items.len()),
            Constant::FrozenSet(items) => write!(f, "<frozenset of {}>", items.len()),
            Constant::Code(code) => write!(f, "<code {}>", code.name()),
        }
    }
}
