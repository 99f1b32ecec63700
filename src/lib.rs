//! A client-side core for a BSON document database: the codec and the
//! wire socket.
//!
//! The codec maps between Rust values and the binary BSON format.
//! Dynamic documents use the [`Bson`] value enum together with the
//! insertion-ordered [`Document`] map (or `HashMap<String, Bson>` when
//! order does not matter):
//!
//! ```rust
//! use mongowire::{doc, decode, encode, Document};
//!
//! let value = doc! { "hello" => "world" };
//! let bytes = encode(&value).unwrap();
//! assert_eq!(
//!     bytes,
//!     b"\x16\x00\x00\x00\x02hello\x00\x06\x00\x00\x00world\x00\x00"
//! );
//!
//! let mut decoded = Document::new();
//! decode(&bytes, &mut decoded).unwrap();
//! assert_eq!(decoded, value);
//! ```
//!
//! Typed records are declared with [`bson_record!`], which attaches a
//! schema (key renaming, `omitempty`, `minsize`, `inline`) parsed once per
//! type:
//!
//! ```rust
//! use mongowire::{bson_record, decode, encode};
//!
//! bson_record! {
//!     #[derive(Debug, Default, PartialEq)]
//!     pub struct Event {
//!         pub name: String,
//!         pub count: i64 => ",minsize",
//!         pub note: String => "n,omitempty",
//!     }
//! }
//!
//! let event = Event { name: "boot".into(), count: 1, note: String::new() };
//! let bytes = encode(&event).unwrap();
//! let mut back = Event::default();
//! decode(&bytes, &mut back).unwrap();
//! assert_eq!(back, event);
//! ```
//!
//! Custom field types hook into the mapper by implementing
//! [`ToBson`](ser::ToBson) (encode a surrogate value) or
//! [`FromBson`](de::FromBson) (consume the undecoded element). [`Raw`]
//! and [`RawDocument`] defer decoding until a target type is known.
//!
//! The [`wire`] module speaks the database's wire protocol: it frames
//! request operations, multiplexes them over one TCP connection with
//! per-request reply callbacks, and demultiplexes the replies on a
//! dedicated reader thread.

#[macro_use]
mod macros;

mod bson;
mod datetime;
pub mod de;
mod document;
pub mod error;
mod oid;
mod raw;
pub mod record;
pub mod ser;
pub mod spec;
pub mod wire;

pub use self::bson::{Array, Binary, Bson, JavaScriptCodeWithScope, Regex, Symbol};
pub use self::datetime::{DateTime, Timestamp};
pub use self::de::decode;
pub use self::document::Document;
pub use self::error::{Error, Result};
pub use self::oid::ObjectId;
pub use self::raw::{Raw, RawDocument, RawRef};
pub use self::ser::encode;

#[doc(hidden)]
pub mod __private {
    pub use once_cell::sync::OnceCell;
}
