//! The wire protocol: request operations, the message envelope, and the
//! multiplexed socket.
//!
//! Every message is wrapped in a 16-byte envelope: `totalLen | requestId |
//! responseTo | opcode`, all little-endian int32. The total length is
//! back-patched once the payload is serialized; request ids are patched
//! later, under the socket mutex, so one batch gets a contiguous run.

pub mod socket;
pub mod stats;

pub use socket::{ServerPool, Socket};

use byteorder::{ByteOrder, LittleEndian};

use crate::document::Document;
use crate::error::Result;
use crate::ser::{self, EncodeDocument};

pub const OP_REPLY: i32 = 1;
pub const OP_UPDATE: i32 = 2001;
pub const OP_INSERT: i32 = 2002;
pub const OP_QUERY: i32 = 2004;
pub const OP_GET_MORE: i32 = 2005;
pub const OP_DELETE: i32 = 2006;

/// Offset of the request id field within the envelope.
const REQUEST_ID_OFFSET: usize = 4;

/// The fixed fields of an inbound OP_REPLY, following its envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplyOp {
    pub flags: u32,
    pub cursor_id: i64,
    pub first_doc: i32,
    pub reply_docs: i32,
}

/// One delivery to a reply callback: the reply header, the document index
/// within the reply (or -1 when the reply carries none), and the document
/// bytes.
#[derive(Clone, Copy, Debug)]
pub struct ReplyFrame<'a> {
    pub op: ReplyOp,
    pub doc_index: i32,
    pub doc: Option<&'a [u8]>,
}

/// Invoked once per inbound document, once with index -1 for an empty
/// reply, or once with the death reason if the socket dies first.
pub type ReplyFunc = Box<dyn FnMut(Result<ReplyFrame<'_>>) + Send>;

pub struct UpdateOp {
    /// Full namespace, `"database.collection"`.
    pub collection: String,
    pub selector: Document,
    pub update: Document,
    pub flags: u32,
}

pub struct InsertOp {
    pub collection: String,
    pub documents: Vec<Document>,
}

pub struct QueryOp {
    pub collection: String,
    pub query: Document,
    pub skip: i32,
    pub limit: i32,
    pub selector: Option<Document>,
    pub flags: u32,
    pub reply_func: Option<ReplyFunc>,
}

impl QueryOp {
    pub fn new(collection: impl Into<String>, query: Document) -> QueryOp {
        QueryOp {
            collection: collection.into(),
            query,
            skip: 0,
            limit: 0,
            selector: None,
            flags: 0,
            reply_func: None,
        }
    }
}

pub struct GetMoreOp {
    pub collection: String,
    pub limit: i32,
    pub cursor_id: i64,
    pub reply_func: Option<ReplyFunc>,
}

pub struct DeleteOp {
    pub collection: String,
    pub selector: Document,
    pub flags: u32,
}

/// A request operation ready to be framed and sent.
pub enum Op {
    Update(UpdateOp),
    Insert(InsertOp),
    Query(QueryOp),
    GetMore(GetMoreOp),
    Delete(DeleteOp),
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Update(..) => "update",
            Op::Insert(..) => "insert",
            Op::Query(..) => "query",
            Op::GetMore(..) => "get-more",
            Op::Delete(..) => "delete",
        }
    }
}

/// Serializes one op into `buf`, back-patching its total length. The reply
/// callback, if any, is handed back so the socket can register it once the
/// request id is known.
pub(crate) fn serialize_op(buf: &mut Vec<u8>, op: Op) -> Result<Option<ReplyFunc>> {
    let start = buf.len();
    let mut reply_func = None;

    match op {
        Op::Update(op) => {
            append_header(buf, OP_UPDATE);
            ser::append_i32(buf, 0); // reserved
            ser::append_cstring(buf, &op.collection);
            ser::append_i32(buf, op.flags as i32);
            op.selector.encode_into(buf)?;
            op.update.encode_into(buf)?;
        }
        Op::Insert(op) => {
            append_header(buf, OP_INSERT);
            ser::append_i32(buf, 0); // reserved
            ser::append_cstring(buf, &op.collection);
            for doc in &op.documents {
                doc.encode_into(buf)?;
            }
        }
        Op::Query(mut op) => {
            append_header(buf, OP_QUERY);
            ser::append_i32(buf, op.flags as i32);
            ser::append_cstring(buf, &op.collection);
            ser::append_i32(buf, op.skip);
            ser::append_i32(buf, op.limit);
            op.query.encode_into(buf)?;
            if let Some(selector) = &op.selector {
                selector.encode_into(buf)?;
            }
            reply_func = op.reply_func.take();
        }
        Op::GetMore(mut op) => {
            append_header(buf, OP_GET_MORE);
            ser::append_i32(buf, 0); // reserved
            ser::append_cstring(buf, &op.collection);
            ser::append_i32(buf, op.limit);
            ser::append_i64(buf, op.cursor_id);
            reply_func = op.reply_func.take();
        }
        Op::Delete(op) => {
            append_header(buf, OP_DELETE);
            ser::append_i32(buf, 0); // reserved
            ser::append_cstring(buf, &op.collection);
            ser::append_i32(buf, op.flags as i32);
            op.selector.encode_into(buf)?;
        }
    }

    let len = (buf.len() - start) as i32;
    ser::patch_i32(buf, start, len);
    Ok(reply_func)
}

/// Patches the request id of the envelope starting at `start`.
pub(crate) fn patch_request_id(buf: &mut [u8], start: usize, request_id: u32) {
    ser::patch_i32(buf, start + REQUEST_ID_OFFSET, request_id as i32);
}

fn append_header(buf: &mut Vec<u8>, opcode: i32) {
    ser::append_i32(buf, 0); // totalLen, patched afterwards
    ser::append_i32(buf, 0); // requestId, patched under the socket mutex
    ser::append_i32(buf, 0); // responseTo
    ser::append_i32(buf, opcode);
}

pub(crate) fn get_i32(buf: &[u8], at: usize) -> i32 {
    LittleEndian::read_i32(&buf[at..at + 4])
}

pub(crate) fn get_i64(buf: &[u8], at: usize) -> i64 {
    LittleEndian::read_i64(&buf[at..at + 8])
}

/// Parses the twenty reply-specific bytes that follow the envelope.
pub(crate) fn parse_reply(fields: &[u8]) -> ReplyOp {
    ReplyOp {
        flags: get_i32(fields, 0) as u32,
        cursor_id: get_i64(fields, 4),
        first_doc: get_i32(fields, 12),
        reply_docs: get_i32(fields, 16),
    }
}
