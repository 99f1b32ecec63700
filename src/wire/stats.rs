//! Process-wide socket statistics.
//!
//! Counters take signed deltas and are safe for concurrent update; the
//! snapshot is advisory only.

use std::sync::atomic::{AtomicI64, Ordering};

static SOCKETS_ALIVE: AtomicI64 = AtomicI64::new(0);
static SOCKETS_IN_USE: AtomicI64 = AtomicI64::new(0);
static SOCKET_REFS: AtomicI64 = AtomicI64::new(0);
static SENT_OPS: AtomicI64 = AtomicI64::new(0);
static RECEIVED_OPS: AtomicI64 = AtomicI64::new(0);
static RECEIVED_DOCS: AtomicI64 = AtomicI64::new(0);

pub fn sockets_alive(delta: i64) {
    SOCKETS_ALIVE.fetch_add(delta, Ordering::Relaxed);
}

pub fn sockets_in_use(delta: i64) {
    SOCKETS_IN_USE.fetch_add(delta, Ordering::Relaxed);
}

pub fn socket_refs(delta: i64) {
    SOCKET_REFS.fetch_add(delta, Ordering::Relaxed);
}

pub fn sent_ops(delta: i64) {
    SENT_OPS.fetch_add(delta, Ordering::Relaxed);
}

pub fn received_ops(delta: i64) {
    RECEIVED_OPS.fetch_add(delta, Ordering::Relaxed);
}

pub fn received_docs(delta: i64) {
    RECEIVED_DOCS.fetch_add(delta, Ordering::Relaxed);
}

/// A point-in-time copy of every counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub sockets_alive: i64,
    pub sockets_in_use: i64,
    pub socket_refs: i64,
    pub sent_ops: i64,
    pub received_ops: i64,
    pub received_docs: i64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        sockets_alive: SOCKETS_ALIVE.load(Ordering::Relaxed),
        sockets_in_use: SOCKETS_IN_USE.load(Ordering::Relaxed),
        socket_refs: SOCKET_REFS.load(Ordering::Relaxed),
        sent_ops: SENT_OPS.load(Ordering::Relaxed),
        received_ops: RECEIVED_OPS.load(Ordering::Relaxed),
        received_docs: RECEIVED_DOCS.load(Ordering::Relaxed),
    }
}

/// Zeroes every counter. Meant for tests.
pub fn reset() {
    SOCKETS_ALIVE.store(0, Ordering::Relaxed);
    SOCKETS_IN_USE.store(0, Ordering::Relaxed);
    SOCKET_REFS.store(0, Ordering::Relaxed);
    SENT_OPS.store(0, Ordering::Relaxed);
    RECEIVED_OPS.store(0, Ordering::Relaxed);
    RECEIVED_DOCS.store(0, Ordering::Relaxed);
}
