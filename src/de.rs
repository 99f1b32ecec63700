//! Decoding: BSON bytes into dynamic values and typed records.

use std::collections::HashMap;

use crate::bson::{Binary, Bson, Regex, Symbol};
use crate::datetime::{DateTime, Timestamp};
use crate::document::Document;
use crate::error::Result;
use crate::oid::ObjectId;
use crate::raw::{self, Raw, RawDocument, RawRef};
use crate::spec;

/// Parses a framed document into `target`, which keeps any fields the
/// document does not mention.
pub fn decode<T: DecodeDocument + ?Sized>(bytes: &[u8], target: &mut T) -> Result<()> {
    let doc = RawDocument::from_bytes(bytes)?;
    target.decode_document(doc)
}

/// A mutable value a whole document can be decoded into.
pub trait DecodeDocument {
    fn decode_document(&mut self, doc: &RawDocument) -> Result<()>;
}

impl DecodeDocument for Document {
    fn decode_document(&mut self, doc: &RawDocument) -> Result<()> {
        for entry in doc.iter() {
            let (key, value) = entry?;
            self.insert(key, value.to_bson()?);
        }
        Ok(())
    }
}

impl<T: FromBson> DecodeDocument for HashMap<String, T> {
    fn decode_document(&mut self, doc: &RawDocument) -> Result<()> {
        for entry in doc.iter() {
            let (key, value) = entry?;
            // A skipped element leaves the key absent rather than zeroed.
            if let Decoded::Value(value) = T::from_bson(&value)? {
                self.insert(key.to_string(), value);
            }
        }
        Ok(())
    }
}

impl DecodeDocument for Raw {
    fn decode_document(&mut self, doc: &RawDocument) -> Result<()> {
        self.kind = spec::ELEMENT_TYPE_DOCUMENT;
        self.data = doc.as_bytes().to_vec();
        Ok(())
    }
}

/// The outcome of decoding one element into a typed target.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded<T> {
    /// The element converted; assign it.
    Value(T),
    /// The element has no sensible conversion; leave the target untouched.
    /// This is a signal, not an error.
    Skip,
}

impl<T> Decoded<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Decoded::Value(v) => Decoded::Value(f(v)),
            Decoded::Skip => Decoded::Skip,
        }
    }
}

/// A value one element can be decoded into.
///
/// Implementing this by hand is the decode-side extension hook: the
/// implementation receives the undecoded element and may produce a value,
/// skip, or fail; failures surface verbatim from the top-level decode.
pub trait FromBson: Sized {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>>;

    /// Offers an unmatched document key to this value. Only record types
    /// spliced with the `inline` option accept anything.
    #[doc(hidden)]
    fn accept_inline(&mut self, _key: &str, _raw: &RawRef<'_>) -> Result<bool> {
        Ok(false)
    }
}

/// Assigns a decoded element to a record field; returns whether it was
/// consumed.
pub fn assign_field<T: FromBson>(field: &mut T, raw: &RawRef<'_>) -> Result<bool> {
    match T::from_bson(raw)? {
        Decoded::Value(value) => {
            *field = value;
            Ok(true)
        }
        Decoded::Skip => Ok(false),
    }
}

/// Widens any numeric-ish element to an i64, if it has one.
fn element_to_i64(raw: &RawRef<'_>) -> Result<Option<i64>> {
    let value = match raw.kind {
        spec::ELEMENT_TYPE_DOUBLE => Some(f64::from_bits(raw::u64_at(raw.data, 0)?) as i64),
        spec::ELEMENT_TYPE_BOOLEAN => {
            if raw.data.is_empty() {
                return Err(crate::error::Error::CorruptedDocument);
            }
            Some(i64::from(raw.data[0] != 0))
        }
        // Datetimes surface as milliseconds.
        spec::ELEMENT_TYPE_UTC_DATETIME => Some(raw::i64_at(raw.data, 0)?),
        spec::ELEMENT_TYPE_INT32 => Some(raw::i32_at(raw.data, 0)? as i64),
        spec::ELEMENT_TYPE_INT64 => Some(raw::i64_at(raw.data, 0)?),
        _ => None,
    };
    Ok(value)
}

macro_rules! from_bson_int {
    ($($t:ty)*) => {$(
        impl FromBson for $t {
            fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
                match element_to_i64(raw)? {
                    Some(wide) => match <$t>::try_from(wide) {
                        Ok(value) => Ok(Decoded::Value(value)),
                        Err(_) => Ok(Decoded::Skip),
                    },
                    None => Ok(Decoded::Skip),
                }
            }
        }
    )*};
}

from_bson_int!(i8 i16 i32 i64 isize u8 u16 u32 u64 usize);

impl FromBson for f64 {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        if raw.kind == spec::ELEMENT_TYPE_DOUBLE {
            return Ok(Decoded::Value(f64::from_bits(raw::u64_at(raw.data, 0)?)));
        }
        Ok(element_to_i64(raw)?.map_or(Decoded::Skip, |v| Decoded::Value(v as f64)))
    }
}

impl FromBson for f32 {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        Ok(f64::from_bson(raw)?.map(|v| v as f32))
    }
}

impl FromBson for bool {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        if raw.kind == spec::ELEMENT_TYPE_DOUBLE {
            let v = f64::from_bits(raw::u64_at(raw.data, 0)?);
            return Ok(Decoded::Value(v != 0.0));
        }
        Ok(element_to_i64(raw)?.map_or(Decoded::Skip, |v| Decoded::Value(v != 0)))
    }
}

impl FromBson for String {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        match raw.kind {
            spec::ELEMENT_TYPE_STRING | spec::ELEMENT_TYPE_SYMBOL => {
                let (s, _) = raw::parse_lenstr(raw.data)?;
                Ok(Decoded::Value(s.to_string()))
            }
            spec::ELEMENT_TYPE_BINARY => {
                let (_, inner) = raw::parse_binary(raw.data)?;
                match std::str::from_utf8(inner) {
                    Ok(s) => Ok(Decoded::Value(s.to_string())),
                    Err(_) => Ok(Decoded::Skip),
                }
            }
            _ => Ok(Decoded::Skip),
        }
    }
}

impl FromBson for Symbol {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        Ok(String::from_bson(raw)?.map(Symbol))
    }
}

impl FromBson for Binary {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        match raw.kind {
            spec::ELEMENT_TYPE_BINARY => {
                let (subtype, inner) = raw::parse_binary(raw.data)?;
                Ok(Decoded::Value(Binary {
                    subtype: subtype.into(),
                    bytes: inner.to_vec(),
                }))
            }
            spec::ELEMENT_TYPE_STRING => {
                let (s, _) = raw::parse_lenstr(raw.data)?;
                Ok(Decoded::Value(Binary::generic(s.as_bytes())))
            }
            _ => Ok(Decoded::Skip),
        }
    }
}

impl FromBson for ObjectId {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        if raw.kind != spec::ELEMENT_TYPE_OBJECT_ID {
            return Ok(Decoded::Skip);
        }
        Ok(Decoded::Value(ObjectId::from_slice(raw.data)?))
    }
}

impl FromBson for DateTime {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        match raw.kind {
            spec::ELEMENT_TYPE_UTC_DATETIME => {
                Ok(Decoded::Value(DateTime::from_millis(raw::i64_at(raw.data, 0)?)))
            }
            // Plain integers are taken as milliseconds.
            spec::ELEMENT_TYPE_INT32 | spec::ELEMENT_TYPE_INT64 => {
                match element_to_i64(raw)? {
                    Some(ms) => Ok(Decoded::Value(DateTime::from_millis(ms))),
                    None => Ok(Decoded::Skip),
                }
            }
            _ => Ok(Decoded::Skip),
        }
    }
}

impl FromBson for Timestamp {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        if raw.kind != spec::ELEMENT_TYPE_TIMESTAMP {
            return Ok(Decoded::Skip);
        }
        Ok(Decoded::Value(Timestamp(raw::i64_at(raw.data, 0)?)))
    }
}

impl FromBson for Regex {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        if raw.kind != spec::ELEMENT_TYPE_REGEX {
            return Ok(Decoded::Skip);
        }
        match raw.to_bson()? {
            Bson::Regex(re) => Ok(Decoded::Value(re)),
            _ => Ok(Decoded::Skip),
        }
    }
}

impl FromBson for Document {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        if raw.kind != spec::ELEMENT_TYPE_DOCUMENT {
            return Ok(Decoded::Skip);
        }
        Ok(Decoded::Value(Document::from_slice(raw.data)?))
    }
}

impl<T: FromBson> FromBson for HashMap<String, T> {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        if raw.kind != spec::ELEMENT_TYPE_DOCUMENT {
            return Ok(Decoded::Skip);
        }
        let doc = RawDocument::from_bytes(raw.data)?;
        let mut map = HashMap::new();
        map.decode_document(doc)?;
        Ok(Decoded::Value(map))
    }
}

impl<T: FromBson> FromBson for Vec<T> {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        if raw.kind != spec::ELEMENT_TYPE_ARRAY {
            return Ok(Decoded::Skip);
        }
        let doc = RawDocument::from_bytes(raw.data)?;
        let mut values = Vec::new();
        for entry in doc.iter() {
            let (_, value) = entry?;
            // Unconvertible members are dropped, matching field semantics.
            if let Decoded::Value(value) = T::from_bson(&value)? {
                values.push(value);
            }
        }
        Ok(Decoded::Value(values))
    }
}

impl<T: FromBson> FromBson for Option<T> {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        // An explicit null resets the option, even if it was set before.
        if raw.kind == spec::ELEMENT_TYPE_NULL {
            return Ok(Decoded::Value(None));
        }
        Ok(T::from_bson(raw)?.map(Some))
    }
}

impl<T: FromBson> FromBson for Box<T> {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        Ok(T::from_bson(raw)?.map(Box::new))
    }
}

impl FromBson for Bson {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        Ok(Decoded::Value(raw.to_bson()?))
    }
}

impl FromBson for Raw {
    fn from_bson(raw: &RawRef<'_>) -> Result<Decoded<Self>> {
        Ok(Decoded::Value(raw.to_raw()))
    }
}
