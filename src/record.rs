//! Structural records: schema descriptors and the traits the
//! [`bson_record!`](crate::bson_record) macro implements.
//!
//! A record's field tags are parsed once per type into a
//! [`RecordDescriptor`] held in a `once_cell` static; encoding and
//! decoding consult the cached descriptor instead of re-parsing tags.

use std::collections::HashMap;

use crate::document::Document;
use crate::error::{Error, Result};
use crate::raw::{RawDocument, RawRef};
use crate::ser::StructEncoder;

/// Per-field schema data: the emitted key and the option flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// The document key: the declared name lowercased, unless renamed.
    pub key: String,
    /// Skip the field when it carries the zero value.
    pub omit_empty: bool,
    /// Encode an int64 that fits as an int32.
    pub min_size: bool,
    /// Splice the field's own fields into the parent document.
    pub inline: bool,
}

/// Per-record schema data, built once per type.
#[derive(Clone, Debug)]
pub struct RecordDescriptor {
    pub name: &'static str,
    fields: Vec<FieldDescriptor>,
    index: HashMap<String, usize>,
    duplicate: Option<String>,
}

impl RecordDescriptor {
    /// Parses `(field name, tag)` pairs. A tag is `"<name>[,option…]"`;
    /// an empty name keeps the default. Unknown options are a caller bug.
    pub fn build(name: &'static str, fields: &[(&'static str, &'static str)]) -> RecordDescriptor {
        let mut parsed = Vec::with_capacity(fields.len());
        let mut index = HashMap::with_capacity(fields.len());
        let mut duplicate = None;

        for (position, (field_name, tag)) in fields.iter().enumerate() {
            let mut parts = tag.split(',');
            let rename = parts.next().unwrap_or("");
            let mut fd = FieldDescriptor {
                key: if rename.is_empty() {
                    field_name.to_lowercase()
                } else {
                    rename.to_string()
                },
                omit_empty: false,
                min_size: false,
                inline: false,
            };
            for option in parts {
                match option {
                    "omitempty" => fd.omit_empty = true,
                    "minsize" => fd.min_size = true,
                    "inline" => fd.inline = true,
                    "" => {}
                    other => panic!("Unsupported flag {:?} in tag {:?}", other, tag),
                }
            }
            if !fd.inline && index.insert(fd.key.clone(), position).is_some() && duplicate.is_none()
            {
                duplicate = Some(fd.key.clone());
            }
            parsed.push(fd);
        }

        RecordDescriptor {
            name,
            fields: parsed,
            index,
            duplicate,
        }
    }

    pub fn field(&self, index: usize) -> &FieldDescriptor {
        &self.fields[index]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up a document key among the record's own (non-inline) fields.
    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    fn check_duplicates(&self) -> Result<()> {
        match &self.duplicate {
            Some(key) => Err(Error::DuplicatedKey {
                key: key.clone(),
                record: self.name,
            }),
            None => Ok(()),
        }
    }
}

/// A struct with a BSON schema. Implemented by
/// [`bson_record!`](crate::bson_record); not meant to be hand-written.
pub trait Record: Default {
    fn descriptor() -> &'static RecordDescriptor;

    /// Feeds every field to the encoder in declaration order.
    fn encode_fields(&self, enc: &mut StructEncoder) -> Result<()>;

    /// Routes one document element to the matching field; returns whether
    /// it was consumed.
    fn decode_field(&mut self, key: &str, raw: &RawRef<'_>) -> Result<bool>;
}

/// Encodes a record to a [`Document`], applying field options and raising
/// on duplicated keys.
pub fn to_document<T: Record>(value: &T) -> Result<Document> {
    let desc = T::descriptor();
    desc.check_duplicates()?;
    let mut enc = StructEncoder::new(desc.name);
    value.encode_fields(&mut enc)?;
    Ok(enc.into_document())
}

/// Decodes a raw document into a record in place. Unmatched document
/// fields are offered to inline children, then dropped.
pub fn decode_record<T: Record>(value: &mut T, doc: &RawDocument) -> Result<()> {
    T::descriptor().check_duplicates()?;
    for entry in doc.iter() {
        let (key, raw) = entry?;
        value.decode_field(key, &raw)?;
    }
    Ok(())
}
