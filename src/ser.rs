//! Encoding: dynamic values and typed records to BSON bytes.

use std::collections::HashMap;

use crate::bson::{Binary, Bson};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::raw::{Raw, RawDocument, RawRef};
use crate::record::FieldDescriptor;
use crate::spec;

/// Serializes a document-shaped value to a framed byte vector.
pub fn encode<T: EncodeDocument + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    value.encode_into(&mut buf)?;
    Ok(buf)
}

/// A value that can stand as a whole BSON document.
pub trait EncodeDocument {
    /// Appends the framed document to `buf`.
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()>;
}

impl<T: EncodeDocument + ?Sized> EncodeDocument for &T {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        (**self).encode_into(buf)
    }
}

impl EncodeDocument for Document {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        append_document(buf, self.iter().map(|(k, v)| (k.as_str(), v)))
    }
}

impl<T: ToBson> EncodeDocument for HashMap<String, T> {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        let mut pairs = Vec::with_capacity(self.len());
        for (k, v) in self {
            pairs.push((k.as_str(), v.to_bson()?));
        }
        append_document(buf, pairs.iter().map(|(k, v)| (*k, v)))
    }
}

impl EncodeDocument for Bson {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            Bson::Document(doc) => doc.encode_into(buf),
            other => Err(Error::NotDocumentShaped {
                kind: other.kind_name(),
            }),
        }
    }
}

impl EncodeDocument for RawDocument {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.extend_from_slice(self.as_bytes());
        Ok(())
    }
}

impl EncodeDocument for Raw {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        self.as_raw_ref().encode_into(buf)
    }
}

impl EncodeDocument for RawRef<'_> {
    fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        if self.kind != spec::ELEMENT_TYPE_DOCUMENT {
            return Err(Error::RawNotDocument { kind: self.kind });
        }
        // Emitted verbatim; only the outer frame is checked.
        RawDocument::from_bytes(self.data)?;
        buf.extend_from_slice(self.data);
        Ok(())
    }
}

/// Appends one element (kind byte, key, payload).
pub fn append_element(buf: &mut Vec<u8>, key: &str, value: &Bson) -> Result<()> {
    buf.push(value.element_type());
    append_cstring(buf, key);
    append_value(buf, value)
}

/// Frames and appends a document from an element iterator: the length
/// prefix is reserved, elements written, the terminator appended, and the
/// prefix back-patched.
pub fn append_document<'a, I>(buf: &mut Vec<u8>, elements: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a Bson)>,
{
    let start = buf.len();
    buf.extend_from_slice(&[0; 4]);
    for (key, value) in elements {
        append_element(buf, key, value)?;
    }
    buf.push(0);
    let len = (buf.len() - start) as i32;
    patch_i32(buf, start, len);
    Ok(())
}

fn append_array(buf: &mut Vec<u8>, values: &[Bson]) -> Result<()> {
    let start = buf.len();
    buf.extend_from_slice(&[0; 4]);
    for (index, value) in values.iter().enumerate() {
        append_element(buf, &index.to_string(), value)?;
    }
    buf.push(0);
    let len = (buf.len() - start) as i32;
    patch_i32(buf, start, len);
    Ok(())
}

fn append_value(buf: &mut Vec<u8>, value: &Bson) -> Result<()> {
    match value {
        Bson::Double(v) => buf.extend_from_slice(&v.to_bits().to_le_bytes()),
        Bson::String(s) | Bson::JavaScriptCode(s) => append_lenstr(buf, s),
        Bson::Document(doc) => {
            append_document(buf, doc.iter().map(|(k, v)| (k.as_str(), v)))?;
        }
        Bson::Array(values) => append_array(buf, values)?,
        Bson::Binary(Binary { subtype, bytes }) => {
            let subtype = u8::from(*subtype);
            if subtype == spec::BINARY_SUBTYPE_BINARY_OLD {
                // The old subtype carries a redundant inner length.
                append_i32(buf, bytes.len() as i32 + 4);
                buf.push(subtype);
                append_i32(buf, bytes.len() as i32);
            } else {
                append_i32(buf, bytes.len() as i32);
                buf.push(subtype);
            }
            buf.extend_from_slice(bytes);
        }
        Bson::Undefined | Bson::Null | Bson::MaxKey | Bson::MinKey => {}
        Bson::ObjectId(id) => buf.extend_from_slice(&id.bytes()),
        Bson::Boolean(v) => buf.push(u8::from(*v)),
        Bson::DateTime(dt) => append_i64(buf, dt.millis()),
        Bson::Regex(re) => {
            append_cstring(buf, &re.pattern);
            append_cstring(buf, &re.options);
        }
        Bson::Symbol(sym) => append_lenstr(buf, &sym.0),
        Bson::JavaScriptCodeWithScope(js) => {
            let start = buf.len();
            buf.extend_from_slice(&[0; 4]);
            append_lenstr(buf, &js.code);
            append_document(buf, js.scope.iter().map(|(k, v)| (k.as_str(), v)))?;
            let len = (buf.len() - start) as i32;
            patch_i32(buf, start, len);
        }
        Bson::Int32(v) => append_i32(buf, *v),
        Bson::Timestamp(ts) => append_i64(buf, ts.0),
        Bson::Int64(v) => append_i64(buf, *v),
    }
    Ok(())
}

pub(crate) fn append_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn append_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn append_cstring(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

/// Length-prefixed string; the count includes the trailing NUL.
pub(crate) fn append_lenstr(buf: &mut Vec<u8>, s: &str) {
    append_i32(buf, s.len() as i32 + 1);
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

pub(crate) fn patch_i32(buf: &mut [u8], at: usize, v: i32) {
    buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// A value that can stand as one element of a document.
///
/// Implementing this by hand is the encode-side extension hook: the mapper
/// encodes whatever surrogate [`Bson`] the implementation returns.
pub trait ToBson {
    #[doc(hidden)]
    const IS_RECORD: bool = false;

    fn to_bson(&self) -> Result<Bson>;
}

impl<T: ToBson + ?Sized> ToBson for &T {
    const IS_RECORD: bool = T::IS_RECORD;

    fn to_bson(&self) -> Result<Bson> {
        (**self).to_bson()
    }
}

impl<T: ToBson + ?Sized> ToBson for Box<T> {
    const IS_RECORD: bool = T::IS_RECORD;

    fn to_bson(&self) -> Result<Bson> {
        (**self).to_bson()
    }
}

impl<T: ToBson> ToBson for Option<T> {
    fn to_bson(&self) -> Result<Bson> {
        match self {
            Some(value) => value.to_bson(),
            None => Ok(Bson::Null),
        }
    }
}

macro_rules! to_bson_int32 {
    ($($t:ty)*) => {$(
        impl ToBson for $t {
            fn to_bson(&self) -> Result<Bson> {
                Ok(Bson::Int32(*self as i32))
            }
        }
    )*};
}

to_bson_int32!(i8 i16 i32 u8 u16);

impl ToBson for i64 {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::Int64(*self))
    }
}

impl ToBson for isize {
    fn to_bson(&self) -> Result<Bson> {
        match i32::try_from(*self) {
            Ok(v) => Ok(Bson::Int32(v)),
            Err(_) => Ok(Bson::Int64(*self as i64)),
        }
    }
}

impl ToBson for u32 {
    fn to_bson(&self) -> Result<Bson> {
        if *self <= i32::MAX as u32 {
            Ok(Bson::Int32(*self as i32))
        } else {
            Ok(Bson::Int64(*self as i64))
        }
    }
}

impl ToBson for u64 {
    fn to_bson(&self) -> Result<Bson> {
        if *self > i64::MAX as u64 {
            return Err(Error::UnsignedTooLarge);
        }
        Ok(Bson::Int64(*self as i64))
    }
}

impl ToBson for usize {
    fn to_bson(&self) -> Result<Bson> {
        (*self as u64).to_bson()
    }
}

impl ToBson for f32 {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::Double(*self as f64))
    }
}

impl ToBson for f64 {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::Double(*self))
    }
}

impl ToBson for bool {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::Boolean(*self))
    }
}

impl ToBson for str {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::String(self.to_string()))
    }
}

impl ToBson for String {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::String(self.clone()))
    }
}

impl<T: ToBson> ToBson for [T] {
    fn to_bson(&self) -> Result<Bson> {
        let mut values = Vec::with_capacity(self.len());
        for item in self {
            values.push(item.to_bson()?);
        }
        Ok(Bson::Array(values))
    }
}

impl<T: ToBson> ToBson for Vec<T> {
    fn to_bson(&self) -> Result<Bson> {
        self.as_slice().to_bson()
    }
}

impl<T: ToBson> ToBson for HashMap<String, T> {
    fn to_bson(&self) -> Result<Bson> {
        let mut doc = Document::new();
        for (k, v) in self {
            doc.insert(k.clone(), v.to_bson()?);
        }
        Ok(Bson::Document(doc))
    }
}

impl ToBson for Document {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::Document(self.clone()))
    }
}

impl ToBson for Bson {
    fn to_bson(&self) -> Result<Bson> {
        Ok(self.clone())
    }
}

impl ToBson for crate::oid::ObjectId {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::ObjectId(*self))
    }
}

impl ToBson for crate::datetime::DateTime {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::DateTime(*self))
    }
}

impl ToBson for crate::datetime::Timestamp {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::Timestamp(*self))
    }
}

impl ToBson for Binary {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::Binary(self.clone()))
    }
}

impl ToBson for crate::bson::Regex {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::Regex(self.clone()))
    }
}

impl ToBson for crate::bson::Symbol {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::Symbol(self.clone()))
    }
}

impl ToBson for crate::bson::JavaScriptCodeWithScope {
    fn to_bson(&self) -> Result<Bson> {
        Ok(Bson::JavaScriptCodeWithScope(self.clone()))
    }
}

impl ToBson for Raw {
    fn to_bson(&self) -> Result<Bson> {
        self.as_raw_ref().to_bson()
    }
}

/// Collects a record's fields into a document, applying field options and
/// detecting key collisions.
pub struct StructEncoder {
    record: &'static str,
    doc: Document,
}

impl StructEncoder {
    pub(crate) fn new(record: &'static str) -> StructEncoder {
        StructEncoder {
            record,
            doc: Document::new(),
        }
    }

    /// Encodes one field according to its descriptor.
    pub fn field<T: ToBson + ?Sized>(&mut self, fd: &FieldDescriptor, value: &T) -> Result<()> {
        if fd.inline {
            if !T::IS_RECORD {
                return Err(Error::InlineNotRecord);
            }
            match value.to_bson()? {
                Bson::Document(doc) => {
                    for (key, value) in doc {
                        self.insert(key, value)?;
                    }
                    return Ok(());
                }
                _ => return Err(Error::InlineNotRecord),
            }
        }

        let mut value = value.to_bson()?;
        if fd.omit_empty && value.is_zero() {
            return Ok(());
        }
        if fd.min_size {
            if let Bson::Int64(v) = value {
                if let Ok(narrow) = i32::try_from(v) {
                    value = Bson::Int32(narrow);
                }
            }
        }
        self.insert(fd.key.clone(), value)
    }

    fn insert(&mut self, key: String, value: Bson) -> Result<()> {
        if self.doc.insert(key.clone(), value).is_some() {
            return Err(Error::DuplicatedKey {
                key,
                record: self.record,
            });
        }
        Ok(())
    }

    pub(crate) fn into_document(self) -> Document {
        self.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn hello_world_bytes() {
        let doc = doc! { "hello" => "world" };
        let bytes = encode(&doc).unwrap();
        assert_eq!(
            bytes,
            b"\x16\x00\x00\x00\x02hello\x00\x06\x00\x00\x00world\x00\x00"
        );
    }

    #[test]
    fn prefix_and_terminator_invariant() {
        let doc = doc! { "a" => 1i32, "b" => true, "c" => ["x", "y"] };
        let bytes = encode(&doc).unwrap();
        let total = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
        assert_eq!(total as usize, bytes.len());
        assert_eq!(*bytes.last().unwrap(), 0);
    }

    #[test]
    fn non_document_root_is_rejected() {
        let err = encode(&Bson::Int64(123)).unwrap_err();
        assert_eq!(err.to_string(), "Can't marshal int64 as a BSON document");
    }

    #[test]
    fn raw_root_must_be_a_document() {
        let raw = Raw::new(crate::spec::ELEMENT_TYPE_NULL, vec![]);
        let err = encode(&raw).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Attempted to unmarshal Raw kind 10 as a document"
        );
    }

    #[test]
    fn raw_document_root_is_verbatim() {
        let frame = b"\x0f\x00\x00\x00\x10byte\x00\x08\x00\x00\x00\x00".to_vec();
        let raw = Raw::new(crate::spec::ELEMENT_TYPE_DOCUMENT, frame.clone());
        assert_eq!(encode(&raw).unwrap(), frame);
    }

    #[test]
    fn uint64_overflow_is_fatal() {
        let err = (1u64 << 63).to_bson().unwrap_err();
        assert_eq!(
            err.to_string(),
            "BSON has no uint64 type, and value is too large to fit correctly in an int64"
        );
    }
}
