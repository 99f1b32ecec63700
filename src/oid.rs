//! ObjectId

use std::{
    fmt,
    io::Cursor,
    sync::atomic::{AtomicU32, Ordering},
    time::SystemTime,
};

use byteorder::{BigEndian, ReadBytesExt};
use once_cell::sync::Lazy;
use rand::{thread_rng, Rng};
use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{Serialize, Serializer};

use crate::error::{Error, Result};

const MAX_U24: u32 = 0xFF_FFFF;

// Uniqueness across processes on the same host comes from the random seed;
// within a process the counter provides it.
static MACHINE_ID: Lazy<[u8; 3]> = Lazy::new(|| {
    let mut bytes = [0u8; 3];
    thread_rng().fill(&mut bytes[..]);
    bytes
});

static OID_COUNTER: Lazy<AtomicU32> =
    Lazy::new(|| AtomicU32::new(thread_rng().gen_range(0..=MAX_U24)));

/// A 12-byte unique document identifier.
///
/// Layout: 4-byte big-endian seconds since the Unix epoch, 3-byte machine
/// id, 2-byte big-endian process id, 3-byte big-endian counter.
#[derive(Clone, Copy, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct ObjectId {
    id: [u8; 12],
}

impl Default for ObjectId {
    fn default() -> Self {
        ObjectId { id: [0; 12] }
    }
}

impl ObjectId {
    /// Generates a fresh id from the current time, the per-process machine
    /// id and pid, and an incrementing 24-bit counter.
    pub fn new() -> ObjectId {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);
        let counter = OID_COUNTER.fetch_add(1, Ordering::SeqCst) & MAX_U24;
        let pid = std::process::id() as u16;

        let mut id = [0u8; 12];
        id[0..4].copy_from_slice(&secs.to_be_bytes());
        id[4..7].copy_from_slice(&MACHINE_ID[..]);
        id[7..9].copy_from_slice(&pid.to_be_bytes());
        id[9..12].copy_from_slice(&counter.to_be_bytes()[1..4]);
        ObjectId { id }
    }

    /// Builds an id carrying only a timestamp; machine id, pid and counter
    /// are zero. Useful as a range bound for time-based queries.
    pub fn new_with_seconds(secs: u32) -> ObjectId {
        let mut id = [0u8; 12];
        id[0..4].copy_from_slice(&secs.to_be_bytes());
        ObjectId { id }
    }

    /// Wraps a raw 12-byte representation.
    pub fn from_bytes(bytes: [u8; 12]) -> ObjectId {
        ObjectId { id: bytes }
    }

    /// Builds an id from a byte slice, which must be exactly 12 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<ObjectId> {
        let id: [u8; 12] = bytes
            .try_into()
            .map_err(|_| Error::ObjectIdLength { len: bytes.len() })?;
        Ok(ObjectId { id })
    }

    /// Parses a 24-character lowercase or uppercase hex string.
    pub fn from_hex(s: &str) -> Result<ObjectId> {
        let bytes = hex::decode(s).map_err(|_| Error::message(format!(
            "Invalid ObjectId hex string: \"{}\"",
            s
        )))?;
        ObjectId::from_slice(&bytes)
    }

    /// The raw byte representation.
    pub fn bytes(&self) -> [u8; 12] {
        self.id
    }

    /// The canonical 24-character lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// The creation time, in seconds since the Unix epoch.
    pub fn timestamp(&self) -> u32 {
        let mut rdr = Cursor::new(&self.id[0..4]);
        rdr.read_u32::<BigEndian>().unwrap_or(0)
    }

    /// The 3-byte machine id part.
    pub fn machine(&self) -> [u8; 3] {
        [self.id[4], self.id[5], self.id[6]]
    }

    /// The process id part.
    pub fn pid(&self) -> u16 {
        let mut rdr = Cursor::new(&self.id[7..9]);
        rdr.read_u16::<BigEndian>().unwrap_or(0)
    }

    /// The 24-bit counter part, widened to an i32.
    pub fn counter(&self) -> i32 {
        let mut rdr = Cursor::new(&self.id[9..12]);
        rdr.read_u24::<BigEndian>().unwrap_or(0) as i32
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId(\"{}\")", self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

struct ObjectIdVisitor;

impl Visitor<'_> for ObjectIdVisitor {
    type Value = ObjectId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a 24-character hex string")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<ObjectId, E> {
        if value.len() != 24 {
            return Err(E::custom(Error::ObjectIdJson {
                value: value.to_string(),
            }));
        }
        if let Some(bad) = value.bytes().find(|b| !b.is_ascii_hexdigit()) {
            return Err(E::custom(Error::ObjectIdJsonChar {
                value: value.to_string(),
                ch: bad,
            }));
        }
        ObjectId::from_hex(value).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<ObjectId, D::Error> {
        deserializer.deserialize_str(ObjectIdVisitor)
    }
}
