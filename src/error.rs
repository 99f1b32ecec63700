use std::sync::Arc;

use thiserror::Error;

/// Alias for `Result<T, mongowire::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// An error raised by the codec or the wire socket.
///
/// The display strings are a stable contract: callers match on them, so they
/// must not be reworded. The type is `Clone` because a socket death reason is
/// fanned out to every pending reply callback.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Any framing inconsistency while reading BSON bytes.
    #[error("Document is corrupted")]
    CorruptedDocument,

    /// An element type byte outside the supported set.
    #[error("Unknown element kind (0x{kind:02X})")]
    UnknownElementKind { kind: u8 },

    /// The root value handed to [`encode`](crate::encode) is not
    /// document-shaped.
    #[error("Can't marshal {kind} as a BSON document")]
    NotDocumentShaped { kind: &'static str },

    /// A raw value of a non-document kind was used as a document root.
    #[error("Attempted to unmarshal Raw kind {kind} as a document")]
    RawNotDocument { kind: u8 },

    /// A raw view's kind has no conversion into the requested target type.
    #[error("BSON kind 0x{kind:02X} isn't compatible with type {target}")]
    IncompatibleKind { kind: u8, target: &'static str },

    /// Two record fields map to the same document key after renaming.
    #[error("Duplicated key '{key}' in struct {record}")]
    DuplicatedKey { key: String, record: &'static str },

    /// The `inline` option was applied to something that is not a record
    /// value.
    #[error("Option ,inline needs a struct value field")]
    InlineNotRecord,

    #[error("BSON has no uint64 type, and value is too large to fit correctly in an int64")]
    UnsignedTooLarge,

    #[error("ObjectIDs must be exactly 12 bytes long (got {len})")]
    ObjectIdLength { len: usize },

    /// A JSON object-id string of the wrong length.
    #[error("Invalid ObjectId in JSON: \"{value}\"")]
    ObjectIdJson { value: String },

    /// A JSON object-id string containing a non-hex character.
    #[error("Invalid ObjectId in JSON: \"{value}\" (invalid hex char: {ch})")]
    ObjectIdJsonChar { value: String, ch: u8 },

    /// The reason recorded by [`Socket::close`](crate::wire::Socket::close).
    #[error("Closed explicitly")]
    Closed,

    /// The reader task saw an inbound opcode other than OP_REPLY.
    #[error("opcode != 1, corrupted data?")]
    CorruptedReply,

    /// An I/O failure on the underlying stream.
    #[error("{0}")]
    Io(Arc<std::io::Error>),

    /// A free-form failure, typically raised by a user decode hook.
    #[error("{0}")]
    Message(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(Arc::new(err))
    }
}

impl Error {
    /// Builds a free-form error; the message is surfaced verbatim.
    pub fn message(msg: impl Into<String>) -> Error {
        Error::Message(msg.into())
    }
}
