//! A BSON document represented as an associative map with insertion
//! ordering.

use std::fmt::{self, Debug, Display, Formatter};
use std::io::Write;

use indexmap::IndexMap;

use crate::bson::Bson;
use crate::error::Result;
use crate::raw::RawDocument;
use crate::ser;

/// An insertion-ordered map of string keys to [`Bson`] values.
///
/// Field order is significant on the wire, so this is the Rust analog of an
/// ordered key/value sequence; use `HashMap<String, Bson>` where order does
/// not matter.
#[derive(Clone, PartialEq, Default)]
pub struct Document {
    inner: IndexMap<String, Bson>,
}

impl Document {
    pub fn new() -> Document {
        Document {
            inner: IndexMap::new(),
        }
    }

    /// Inserts a key/value pair, returning the previous value for the key
    /// if any. Re-inserting an existing key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Bson>) -> Option<Bson> {
        self.inner.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.inner.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Bson> {
        self.inner.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Removes a key, preserving the order of the remaining entries.
    pub fn remove(&mut self, key: &str) -> Option<Bson> {
        self.inner.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&mut self) {
        self.inner.clear()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Bson> {
        self.inner.iter()
    }

    pub fn keys(&self) -> indexmap::map::Keys<'_, String, Bson> {
        self.inner.keys()
    }

    pub fn values(&self) -> indexmap::map::Values<'_, String, Bson> {
        self.inner.values()
    }

    /// Serializes to a framed byte vector.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ser::append_document(&mut buf, self.iter().map(|(k, v)| (k.as_str(), v)))?;
        Ok(buf)
    }

    /// Serializes into a writer.
    pub fn to_writer(&self, writer: &mut dyn Write) -> Result<()> {
        let buf = self.to_vec()?;
        writer.write_all(&buf)?;
        Ok(())
    }

    /// Parses a framed document, taking ownership of the values.
    pub fn from_slice(bytes: &[u8]) -> Result<Document> {
        let raw = RawDocument::from_bytes(bytes)?;
        let mut doc = Document::new();
        for entry in raw.iter() {
            let (key, value) = entry?;
            doc.insert(key, value.to_bson()?);
        }
        Ok(doc)
    }
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        let mut first = true;
        for (k, v) in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "\"{}\": {:?}", k, v)?;
        }
        f.write_str("}")
    }
}

impl Debug for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Document({})", self)
    }
}

impl IntoIterator for Document {
    type Item = (String, Bson);
    type IntoIter = indexmap::map::IntoIter<String, Bson>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Bson);
    type IntoIter = indexmap::map::Iter<'a, String, Bson>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl<K: Into<String>, V: Into<Bson>> FromIterator<(K, V)> for Document {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl<K: Into<String>, V: Into<Bson>> Extend<(K, V)> for Document {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}
