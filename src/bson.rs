//! The dynamic BSON value model.

use std::collections::HashMap;

use crate::datetime::{DateTime, Timestamp};
use crate::document::Document;
use crate::oid::ObjectId;
use crate::spec::{self, BinarySubtype};

/// An ordered array of values.
pub type Array = Vec<Bson>;

/// Binary payload with its subtype byte.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Binary {
    pub subtype: BinarySubtype,
    pub bytes: Vec<u8>,
}

impl Binary {
    pub fn generic(bytes: impl Into<Vec<u8>>) -> Binary {
        Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.into(),
        }
    }
}

/// A regular expression: pattern and option letters, both C-strings on the
/// wire.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Regex {
    pub pattern: String,
    pub options: String,
}

/// A symbol (0x0E). Legacy, but still seen in the wild; interchangeable
/// with strings when decoding.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Symbol(pub String);

/// JavaScript code carrying its own scope document (0x0F).
#[derive(Clone, Debug, PartialEq, Default)]
pub struct JavaScriptCodeWithScope {
    pub code: String,
    pub scope: Document,
}

/// A dynamically typed BSON value, one variant per element kind.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Bson {
    Double(f64),
    String(String),
    Document(Document),
    Array(Array),
    Binary(Binary),
    Undefined,
    ObjectId(ObjectId),
    Boolean(bool),
    DateTime(DateTime),
    #[default]
    Null,
    Regex(Regex),
    JavaScriptCode(String),
    Symbol(Symbol),
    JavaScriptCodeWithScope(JavaScriptCodeWithScope),
    Int32(i32),
    Timestamp(Timestamp),
    Int64(i64),
    MaxKey,
    MinKey,
}

impl Bson {
    /// The element type byte this value encodes as.
    pub fn element_type(&self) -> u8 {
        match self {
            Bson::Double(..) => spec::ELEMENT_TYPE_DOUBLE,
            Bson::String(..) => spec::ELEMENT_TYPE_STRING,
            Bson::Document(..) => spec::ELEMENT_TYPE_DOCUMENT,
            Bson::Array(..) => spec::ELEMENT_TYPE_ARRAY,
            Bson::Binary(..) => spec::ELEMENT_TYPE_BINARY,
            Bson::Undefined => spec::ELEMENT_TYPE_UNDEFINED,
            Bson::ObjectId(..) => spec::ELEMENT_TYPE_OBJECT_ID,
            Bson::Boolean(..) => spec::ELEMENT_TYPE_BOOLEAN,
            Bson::DateTime(..) => spec::ELEMENT_TYPE_UTC_DATETIME,
            Bson::Null => spec::ELEMENT_TYPE_NULL,
            Bson::Regex(..) => spec::ELEMENT_TYPE_REGEX,
            Bson::JavaScriptCode(..) => spec::ELEMENT_TYPE_JAVASCRIPT,
            Bson::Symbol(..) => spec::ELEMENT_TYPE_SYMBOL,
            Bson::JavaScriptCodeWithScope(..) => spec::ELEMENT_TYPE_JAVASCRIPT_WITH_SCOPE,
            Bson::Int32(..) => spec::ELEMENT_TYPE_INT32,
            Bson::Timestamp(..) => spec::ELEMENT_TYPE_TIMESTAMP,
            Bson::Int64(..) => spec::ELEMENT_TYPE_INT64,
            Bson::MaxKey => spec::ELEMENT_TYPE_MAX_KEY,
            Bson::MinKey => spec::ELEMENT_TYPE_MIN_KEY,
        }
    }

    /// A human-readable kind name, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Bson::Double(..) => "double",
            Bson::String(..) => "string",
            Bson::Document(..) => "document",
            Bson::Array(..) => "array",
            Bson::Binary(..) => "binary",
            Bson::Undefined => "undefined",
            Bson::ObjectId(..) => "objectid",
            Bson::Boolean(..) => "bool",
            Bson::DateTime(..) => "datetime",
            Bson::Null => "null",
            Bson::Regex(..) => "regex",
            Bson::JavaScriptCode(..) => "javascript",
            Bson::Symbol(..) => "symbol",
            Bson::JavaScriptCodeWithScope(..) => "javascript with scope",
            Bson::Int32(..) => "int32",
            Bson::Timestamp(..) => "timestamp",
            Bson::Int64(..) => "int64",
            Bson::MaxKey => "maxkey",
            Bson::MinKey => "minkey",
        }
    }

    /// Whether this is the kind's zero value, for `omitempty` handling.
    pub fn is_zero(&self) -> bool {
        match self {
            Bson::Double(v) => *v == 0.0,
            Bson::String(s) => s.is_empty(),
            Bson::Document(d) => d.is_empty(),
            Bson::Array(a) => a.is_empty(),
            Bson::Boolean(v) => !v,
            Bson::DateTime(dt) => dt.nanos() == 0,
            Bson::Null => true,
            Bson::Symbol(Symbol(s)) => s.is_empty(),
            Bson::Int32(v) => *v == 0,
            Bson::Timestamp(Timestamp(v)) => *v == 0,
            Bson::Int64(v) => *v == 0,
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Bson::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Bson::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Bson::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Bson::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Bson::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Bson::Document(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Bson::Array(a) => Some(a),
            _ => None,
        }
    }
}

impl From<f32> for Bson {
    fn from(v: f32) -> Bson {
        Bson::Double(v as f64)
    }
}

impl From<f64> for Bson {
    fn from(v: f64) -> Bson {
        Bson::Double(v)
    }
}

impl From<&str> for Bson {
    fn from(v: &str) -> Bson {
        Bson::String(v.to_string())
    }
}

impl From<String> for Bson {
    fn from(v: String) -> Bson {
        Bson::String(v)
    }
}

impl From<bool> for Bson {
    fn from(v: bool) -> Bson {
        Bson::Boolean(v)
    }
}

impl From<i32> for Bson {
    fn from(v: i32) -> Bson {
        Bson::Int32(v)
    }
}

impl From<i64> for Bson {
    fn from(v: i64) -> Bson {
        Bson::Int64(v)
    }
}

impl From<u32> for Bson {
    fn from(v: u32) -> Bson {
        if v <= i32::MAX as u32 {
            Bson::Int32(v as i32)
        } else {
            Bson::Int64(v as i64)
        }
    }
}

impl From<Vec<u8>> for Bson {
    fn from(v: Vec<u8>) -> Bson {
        Bson::Binary(Binary::generic(v))
    }
}

impl From<&[u8]> for Bson {
    fn from(v: &[u8]) -> Bson {
        Bson::Binary(Binary::generic(v))
    }
}

impl From<Binary> for Bson {
    fn from(v: Binary) -> Bson {
        Bson::Binary(v)
    }
}

impl From<Regex> for Bson {
    fn from(v: Regex) -> Bson {
        Bson::Regex(v)
    }
}

impl From<Symbol> for Bson {
    fn from(v: Symbol) -> Bson {
        Bson::Symbol(v)
    }
}

impl From<JavaScriptCodeWithScope> for Bson {
    fn from(v: JavaScriptCodeWithScope) -> Bson {
        Bson::JavaScriptCodeWithScope(v)
    }
}

impl From<ObjectId> for Bson {
    fn from(v: ObjectId) -> Bson {
        Bson::ObjectId(v)
    }
}

impl From<DateTime> for Bson {
    fn from(v: DateTime) -> Bson {
        Bson::DateTime(v)
    }
}

impl From<Timestamp> for Bson {
    fn from(v: Timestamp) -> Bson {
        Bson::Timestamp(v)
    }
}

impl From<Document> for Bson {
    fn from(v: Document) -> Bson {
        Bson::Document(v)
    }
}

impl From<Array> for Bson {
    fn from(v: Array) -> Bson {
        Bson::Array(v)
    }
}

impl From<HashMap<String, Bson>> for Bson {
    fn from(v: HashMap<String, Bson>) -> Bson {
        Bson::Document(v.into_iter().collect())
    }
}

impl<T: Into<Bson>> From<Option<T>> for Bson {
    fn from(v: Option<T>) -> Bson {
        match v {
            Some(v) => v.into(),
            None => Bson::Null,
        }
    }
}
