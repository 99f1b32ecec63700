//! Lazily decoded views over BSON bytes.
//!
//! [`RawDocument`] borrows a framed document and iterates its elements
//! without materializing values; each element is surfaced as a [`RawRef`],
//! an undecoded `(kind, payload)` window that can be turned into a
//! [`Bson`] or decoded straight into a typed target. [`Raw`] is the owned
//! counterpart, usable as a record field to defer decoding.
//!
//! For the document and array kinds the payload bytes are the full frame,
//! including the length prefix and the trailing terminator.

use std::any::type_name;
use std::str;

use crate::bson::{Binary, Bson, JavaScriptCodeWithScope, Regex, Symbol};
use crate::datetime::{DateTime, Timestamp};
use crate::de::{Decoded, FromBson};
use crate::document::Document;
use crate::error::{Error, Result};
use crate::oid::ObjectId;
use crate::spec;

/// A validated, borrowed BSON document frame.
///
/// Only the outer frame is checked up front; elements are validated as the
/// iterator reaches them.
#[repr(transparent)]
pub struct RawDocument {
    bytes: [u8],
}

impl RawDocument {
    /// Borrows `bytes` as a document. The length prefix must match the
    /// slice length exactly and the frame must end with the terminator.
    pub fn from_bytes(bytes: &[u8]) -> Result<&RawDocument> {
        if bytes.len() < 5 {
            return Err(Error::CorruptedDocument);
        }
        let total = i32_at(bytes, 0)?;
        if total < 5 || total as usize != bytes.len() || bytes[bytes.len() - 1] != 0 {
            return Err(Error::CorruptedDocument);
        }
        // Safety: RawDocument is repr(transparent) over [u8].
        Ok(unsafe { &*(bytes as *const [u8] as *const RawDocument) })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Iterates `(key, element)` pairs in wire order.
    pub fn iter(&self) -> Elements<'_> {
        Elements {
            doc: self,
            offset: 4,
            valid: true,
        }
    }
}

impl<'a> IntoIterator for &'a RawDocument {
    type Item = Result<(&'a str, RawRef<'a>)>;
    type IntoIter = Elements<'a>;

    fn into_iter(self) -> Elements<'a> {
        self.iter()
    }
}

/// An iterator over a raw document's elements.
///
/// The first framing inconsistency is returned as an error, after which the
/// iterator fuses.
pub struct Elements<'a> {
    doc: &'a RawDocument,
    offset: usize,
    valid: bool,
}

impl<'a> Elements<'a> {
    fn step(&mut self) -> Result<Option<(&'a str, RawRef<'a>)>> {
        let bytes = self.doc.as_bytes();
        let end = bytes.len() - 1;

        if self.offset == end {
            return Ok(None);
        }
        if self.offset > end {
            return Err(Error::CorruptedDocument);
        }

        let kind = bytes[self.offset];
        let key_start = self.offset + 1;
        let key_len = bytes[key_start..end]
            .iter()
            .position(|b| *b == 0)
            .ok_or(Error::CorruptedDocument)?;
        let key = str::from_utf8(&bytes[key_start..key_start + key_len])
            .map_err(|_| Error::CorruptedDocument)?;

        let value_start = key_start + key_len + 1;
        let avail = end - value_start;
        let size = element_size(kind, &bytes[value_start..end])?;
        if size > avail {
            return Err(Error::CorruptedDocument);
        }

        let data = &bytes[value_start..value_start + size];
        self.offset = value_start + size;
        Ok(Some((key, RawRef { kind, data })))
    }
}

impl<'a> Iterator for Elements<'a> {
    type Item = Result<(&'a str, RawRef<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.valid {
            return None;
        }
        match self.step() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(err) => {
                self.valid = false;
                Some(Err(err))
            }
        }
    }
}

/// Computes the payload size of an element of `kind` whose payload starts
/// at `data[0]`, validating internal framing along the way. `data` runs up
/// to (not including) the enclosing document's terminator.
fn element_size(kind: u8, data: &[u8]) -> Result<usize> {
    let size = match kind {
        spec::ELEMENT_TYPE_DOUBLE
        | spec::ELEMENT_TYPE_UTC_DATETIME
        | spec::ELEMENT_TYPE_TIMESTAMP
        | spec::ELEMENT_TYPE_INT64 => 8,
        spec::ELEMENT_TYPE_INT32 => 4,
        spec::ELEMENT_TYPE_BOOLEAN => 1,
        spec::ELEMENT_TYPE_OBJECT_ID => 12,
        spec::ELEMENT_TYPE_UNDEFINED
        | spec::ELEMENT_TYPE_NULL
        | spec::ELEMENT_TYPE_MAX_KEY
        | spec::ELEMENT_TYPE_MIN_KEY => 0,
        spec::ELEMENT_TYPE_STRING
        | spec::ELEMENT_TYPE_JAVASCRIPT
        | spec::ELEMENT_TYPE_SYMBOL => {
            let slen = i32_at(data, 0)?;
            if slen < 1 {
                return Err(Error::CorruptedDocument);
            }
            let total = 4 + slen as usize;
            if total > data.len() || data[total - 1] != 0 {
                return Err(Error::CorruptedDocument);
            }
            total
        }
        spec::ELEMENT_TYPE_DOCUMENT | spec::ELEMENT_TYPE_ARRAY => {
            let dlen = i32_at(data, 0)?;
            if dlen < 5 {
                return Err(Error::CorruptedDocument);
            }
            let total = dlen as usize;
            if total > data.len() || data[total - 1] != 0 {
                return Err(Error::CorruptedDocument);
            }
            total
        }
        spec::ELEMENT_TYPE_BINARY => {
            let blen = i32_at(data, 0)?;
            if blen < 0 {
                return Err(Error::CorruptedDocument);
            }
            let total = 4 + 1 + blen as usize;
            if total > data.len() {
                return Err(Error::CorruptedDocument);
            }
            // Subtype 0x02 carries a redundant inner length.
            if data[4] == spec::BINARY_SUBTYPE_BINARY_OLD && (blen < 4 || i32_at(data, 5)? != blen - 4) {
                return Err(Error::CorruptedDocument);
            }
            total
        }
        spec::ELEMENT_TYPE_REGEX => {
            let first = data
                .iter()
                .position(|b| *b == 0)
                .ok_or(Error::CorruptedDocument)?;
            let second = data[first + 1..]
                .iter()
                .position(|b| *b == 0)
                .ok_or(Error::CorruptedDocument)?;
            first + 1 + second + 1
        }
        spec::ELEMENT_TYPE_JAVASCRIPT_WITH_SCOPE => {
            let total = i32_at(data, 0)?;
            if total < 14 || total as usize > data.len() {
                return Err(Error::CorruptedDocument);
            }
            let slen = i32_at(data, 4)?;
            if slen < 1 {
                return Err(Error::CorruptedDocument);
            }
            let scope_at = 8 + slen as usize;
            if scope_at + 4 > total as usize || data[scope_at - 1] != 0 {
                return Err(Error::CorruptedDocument);
            }
            let dlen = i32_at(data, scope_at)?;
            // The leading total must agree with the computed consumption.
            if dlen < 5 || 8 + slen as usize + dlen as usize != total as usize {
                return Err(Error::CorruptedDocument);
            }
            if data[total as usize - 1] != 0 {
                return Err(Error::CorruptedDocument);
            }
            total as usize
        }
        _ => return Err(Error::UnknownElementKind { kind }),
    };
    Ok(size)
}

/// An undecoded element: its kind byte and payload bytes, without the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawRef<'a> {
    pub kind: u8,
    pub data: &'a [u8],
}

impl<'a> RawRef<'a> {
    pub fn new(kind: u8, data: &'a [u8]) -> RawRef<'a> {
        RawRef { kind, data }
    }

    /// Copies into an owned [`Raw`].
    pub fn to_raw(&self) -> Raw {
        Raw {
            kind: self.kind,
            data: self.data.to_vec(),
        }
    }

    /// Fully decodes the payload into a dynamic value.
    pub fn to_bson(&self) -> Result<Bson> {
        let data = self.data;
        let value = match self.kind {
            spec::ELEMENT_TYPE_DOUBLE => Bson::Double(f64::from_bits(u64_at(data, 0)?)),
            spec::ELEMENT_TYPE_STRING => {
                let (s, used) = parse_lenstr(data)?;
                if used != data.len() {
                    return Err(Error::CorruptedDocument);
                }
                Bson::String(s.to_string())
            }
            spec::ELEMENT_TYPE_DOCUMENT => Bson::Document(Document::from_slice(data)?),
            spec::ELEMENT_TYPE_ARRAY => {
                let raw = RawDocument::from_bytes(data)?;
                let mut array = Vec::new();
                for entry in raw.iter() {
                    // Array keys are decimal indices; only order matters.
                    let (_, value) = entry?;
                    array.push(value.to_bson()?);
                }
                Bson::Array(array)
            }
            spec::ELEMENT_TYPE_BINARY => {
                let (subtype, inner) = parse_binary(data)?;
                Bson::Binary(Binary {
                    subtype: subtype.into(),
                    bytes: inner.to_vec(),
                })
            }
            spec::ELEMENT_TYPE_UNDEFINED => Bson::Undefined,
            spec::ELEMENT_TYPE_OBJECT_ID => Bson::ObjectId(ObjectId::from_slice(data)?),
            spec::ELEMENT_TYPE_BOOLEAN => {
                if data.len() != 1 {
                    return Err(Error::CorruptedDocument);
                }
                Bson::Boolean(data[0] != 0)
            }
            spec::ELEMENT_TYPE_UTC_DATETIME => {
                Bson::DateTime(DateTime::from_millis(i64_at(data, 0)?))
            }
            spec::ELEMENT_TYPE_NULL => Bson::Null,
            spec::ELEMENT_TYPE_REGEX => {
                let (pattern, used) = parse_cstr(data, 0)?;
                let (options, end) = parse_cstr(data, used)?;
                if end != data.len() {
                    return Err(Error::CorruptedDocument);
                }
                Bson::Regex(Regex {
                    pattern: pattern.to_string(),
                    options: options.to_string(),
                })
            }
            spec::ELEMENT_TYPE_JAVASCRIPT => {
                let (s, used) = parse_lenstr(data)?;
                if used != data.len() {
                    return Err(Error::CorruptedDocument);
                }
                Bson::JavaScriptCode(s.to_string())
            }
            spec::ELEMENT_TYPE_SYMBOL => {
                let (s, used) = parse_lenstr(data)?;
                if used != data.len() {
                    return Err(Error::CorruptedDocument);
                }
                Bson::Symbol(Symbol(s.to_string()))
            }
            spec::ELEMENT_TYPE_JAVASCRIPT_WITH_SCOPE => {
                let total = i32_at(data, 0)?;
                if total as usize != data.len() {
                    return Err(Error::CorruptedDocument);
                }
                let (code, used) = parse_lenstr(&data[4..])?;
                let scope = Document::from_slice(&data[4 + used..])?;
                Bson::JavaScriptCodeWithScope(JavaScriptCodeWithScope {
                    code: code.to_string(),
                    scope,
                })
            }
            spec::ELEMENT_TYPE_INT32 => {
                if data.len() != 4 {
                    return Err(Error::CorruptedDocument);
                }
                Bson::Int32(i32_at(data, 0)?)
            }
            spec::ELEMENT_TYPE_TIMESTAMP => Bson::Timestamp(Timestamp(i64_at(data, 0)?)),
            spec::ELEMENT_TYPE_INT64 => {
                if data.len() != 8 {
                    return Err(Error::CorruptedDocument);
                }
                Bson::Int64(i64_at(data, 0)?)
            }
            spec::ELEMENT_TYPE_MAX_KEY => Bson::MaxKey,
            spec::ELEMENT_TYPE_MIN_KEY => Bson::MinKey,
            kind => return Err(Error::UnknownElementKind { kind }),
        };
        Ok(value)
    }

    /// Decodes this view into `target`.
    ///
    /// A null view is a no-op: the target keeps its current value. A kind
    /// with no conversion into the target type is an error.
    pub fn decode_into<T: FromBson>(&self, target: &mut T) -> Result<()> {
        if self.kind == spec::ELEMENT_TYPE_NULL {
            return Ok(());
        }
        match T::from_bson(self)? {
            Decoded::Value(value) => {
                *target = value;
                Ok(())
            }
            Decoded::Skip => Err(Error::IncompatibleKind {
                kind: self.kind,
                target: type_name::<T>(),
            }),
        }
    }
}

/// An owned undecoded element, for storage in record fields or for holding
/// reply documents past their read buffer.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Raw {
    pub kind: u8,
    pub data: Vec<u8>,
}

impl Raw {
    pub fn new(kind: u8, data: Vec<u8>) -> Raw {
        Raw { kind, data }
    }

    pub fn as_raw_ref(&self) -> RawRef<'_> {
        RawRef {
            kind: self.kind,
            data: &self.data,
        }
    }

    pub fn to_bson(&self) -> Result<Bson> {
        self.as_raw_ref().to_bson()
    }

    /// See [`RawRef::decode_into`].
    pub fn decode_into<T: FromBson>(&self, target: &mut T) -> Result<()> {
        self.as_raw_ref().decode_into(target)
    }
}

pub(crate) fn i32_at(data: &[u8], at: usize) -> Result<i32> {
    let bytes: [u8; 4] = data
        .get(at..at + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::CorruptedDocument)?;
    Ok(i32::from_le_bytes(bytes))
}

pub(crate) fn i64_at(data: &[u8], at: usize) -> Result<i64> {
    let bytes: [u8; 8] = data
        .get(at..at + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::CorruptedDocument)?;
    Ok(i64::from_le_bytes(bytes))
}

pub(crate) fn u64_at(data: &[u8], at: usize) -> Result<u64> {
    Ok(i64_at(data, at)? as u64)
}

/// Parses a length-prefixed string, returning it and the bytes consumed.
pub(crate) fn parse_lenstr(data: &[u8]) -> Result<(&str, usize)> {
    let slen = i32_at(data, 0)?;
    if slen < 1 {
        return Err(Error::CorruptedDocument);
    }
    let total = 4 + slen as usize;
    if total > data.len() || data[total - 1] != 0 {
        return Err(Error::CorruptedDocument);
    }
    let s = str::from_utf8(&data[4..total - 1]).map_err(|_| Error::CorruptedDocument)?;
    Ok((s, total))
}

/// Parses a NUL-terminated string starting at `at`, returning it and the
/// offset just past its terminator.
pub(crate) fn parse_cstr(data: &[u8], at: usize) -> Result<(&str, usize)> {
    let rest = data.get(at..).ok_or(Error::CorruptedDocument)?;
    let len = rest
        .iter()
        .position(|b| *b == 0)
        .ok_or(Error::CorruptedDocument)?;
    let s = str::from_utf8(&rest[..len]).map_err(|_| Error::CorruptedDocument)?;
    Ok((s, at + len + 1))
}

/// Splits a binary payload into its subtype and inner bytes. Subtype 0x02
/// has its redundant inner length verified and stripped.
pub(crate) fn parse_binary(data: &[u8]) -> Result<(u8, &[u8])> {
    let blen = i32_at(data, 0)?;
    if blen < 0 || 5 + blen as usize != data.len() {
        return Err(Error::CorruptedDocument);
    }
    let subtype = data[4];
    let payload = &data[5..];
    if subtype == spec::BINARY_SUBTYPE_BINARY_OLD {
        if blen < 4 || i32_at(data, 5)? != blen - 4 {
            return Err(Error::CorruptedDocument);
        }
        return Ok((subtype, &payload[4..]));
    }
    Ok((subtype, payload))
}
