//! A framed, multiplexed, full-duplex connection to the server.
//!
//! One mutex guards the connection's mutable state, and the stream is only
//! written while it is held, so request-id allocation and the write are
//! atomic per batch. A dedicated reader thread owns the inbound direction
//! for the socket's lifetime and takes the mutex only to look callbacks up.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::mem;
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::wire::{self, stats, Op, QueryOp, ReplyFrame, ReplyFunc};

/// The server that owns this socket, seen only through what the socket
/// needs: master status and a place to return released sockets to.
pub trait ServerPool: Send + Sync {
    fn is_master(&self) -> bool;
    fn recycle(&self, socket: Arc<Socket>);
}

type SharedReplyFunc = Arc<Mutex<ReplyFunc>>;

struct State {
    server: Option<Arc<dyn ServerPool>>,
    references: usize,
    next_request_id: u32,
    reply_funcs: HashMap<u32, SharedReplyFunc>,
    dead: Option<Error>,
    logout_pending: Vec<Op>,
    cached_nonce: Option<String>,
}

/// A connected socket. Created acquired; may be acquired and released many
/// times, and killed exactly once.
pub struct Socket {
    addr: String,
    conn: TcpStream,
    state: Mutex<State>,
    got_nonce: Condvar,
}

impl Socket {
    /// Wraps a connected stream, acquires it for `server`, and starts the
    /// reader thread.
    pub fn new(server: Arc<dyn ServerPool>, conn: TcpStream) -> Result<Arc<Socket>> {
        let addr = conn
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_string());

        let socket = Arc::new(Socket {
            addr,
            conn,
            state: Mutex::new(State {
                server: None,
                references: 0,
                next_request_id: 0,
                reply_funcs: HashMap::new(),
                dead: None,
                logout_pending: Vec::new(),
                cached_nonce: None,
            }),
            got_nonce: Condvar::new(),
        });

        socket.acquire(server)?;
        stats::sockets_alive(1);
        debug!(addr = %socket.addr, "socket initialized");

        let reader = Arc::clone(&socket);
        thread::Builder::new()
            .name("mongowire-reader".to_string())
            .spawn(move || reader.read_loop())?;

        Ok(socket)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Puts the socket in use for `server`, right after connecting or when
    /// taken back out of the pool.
    ///
    /// Panics if the socket is still owned; that is a pool bug.
    pub fn acquire(&self, server: Arc<dyn ServerPool>) -> Result<()> {
        let mut st = self.state();
        if st.server.is_some() {
            panic!("Attempting to reacquire an owned socket.");
        }
        if let Some(dead) = &st.dead {
            return Err(dead.clone());
        }
        if st.references > 0 {
            panic!("Socket acquired out of cache with references");
        }
        st.server = Some(server);
        st.references = 1;
        stats::sockets_in_use(1);
        stats::socket_refs(1);
        Ok(())
    }

    /// Takes one more reference to an already-acquired socket; the socket
    /// is only recycled once released as many times as acquired. Returns
    /// whether the owning server is the master.
    pub fn acquire_again(&self) -> bool {
        let mut st = self.state();
        if st.references == 0 {
            panic!("Socket::acquire_again with references == 0");
        }
        st.references += 1;
        stats::socket_refs(1);
        let server = st.server.clone();
        drop(st);
        server.map(|s| s.is_master()).unwrap_or(false)
    }

    /// Drops one reference; at zero the socket is handed back to its
    /// server's pool.
    pub fn release(self: &Arc<Self>) {
        let mut st = self.state();
        if st.references == 0 {
            panic!("Socket::release with references == 0");
        }
        st.references -= 1;
        stats::socket_refs(-1);
        if st.references == 0 {
            stats::sockets_in_use(-1);
            let server = st.server.take();
            drop(st);
            if let Some(server) = server {
                server.recycle(Arc::clone(self));
            }
        }
    }

    /// Terminates the socket.
    pub fn close(&self) {
        self.kill(Error::Closed);
    }

    /// The reason this socket died, if it has.
    pub fn dead_reason(&self) -> Option<Error> {
        self.state().dead.clone()
    }

    /// Marks the socket dead, closes the stream, and fires every pending
    /// reply callback once with `err`. Idempotent; later sends fail with
    /// the same reason.
    pub fn kill(&self, err: Error) {
        let stolen = {
            let mut st = self.state();
            if let Some(prev) = &st.dead {
                debug!(addr = %self.addr, reason = %err, previously = %prev, "socket killed again");
                return;
            }
            debug!(addr = %self.addr, reason = %err, "socket closing");
            st.dead = Some(err.clone());
            let _ = self.conn.shutdown(Shutdown::Both);
            stats::sockets_alive(-1);
            mem::take(&mut st.reply_funcs)
        };

        // Nonce waiters must observe the death.
        self.got_nonce.notify_all();

        for (_, func) in stolen {
            let mut func = func.lock().unwrap_or_else(|e| e.into_inner());
            (*func)(Err(err.clone()));
        }
    }

    /// Queues a logout op to be sent ahead of the next batch.
    pub fn schedule_logout(&self, op: Op) {
        self.state().logout_pending.push(op);
    }

    /// Caches the server nonce and wakes any waiter.
    pub fn store_nonce(&self, nonce: String) {
        self.state().cached_nonce = Some(nonce);
        self.got_nonce.notify_all();
    }

    /// Forgets the cached nonce; the next waiter blocks until a fresh one
    /// arrives.
    pub fn reset_nonce(&self) {
        self.state().cached_nonce = None;
    }

    /// Blocks until a nonce is cached, consuming it, or until the socket
    /// dies.
    pub fn nonce(&self) -> Result<String> {
        let mut st = self.state();
        loop {
            if let Some(dead) = &st.dead {
                return Err(dead.clone());
            }
            if let Some(nonce) = st.cached_nonce.take() {
                return Ok(nonce);
            }
            st = self
                .got_nonce
                .wait(st)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Serializes `ops` back-to-back, then atomically allocates their
    /// request ids, registers their reply callbacks, and writes the whole
    /// buffer.
    ///
    /// Id 0 is reserved for ops that expect no reply; allocation wraps
    /// past it. On a dead socket every callback in the batch is fired with
    /// the death reason, which is also returned.
    pub fn query(&self, ops: Vec<Op>) -> Result<()> {
        let mut ops = ops;
        let pending = mem::take(&mut self.state().logout_pending);
        if !pending.is_empty() {
            let mut all = pending;
            all.append(&mut ops);
            ops = all;
        }

        // Serialize before taking the lock; only the id patching and the
        // write need to exclude other senders.
        let op_count = ops.len();
        let mut buf = Vec::with_capacity(256);
        let mut requests: Vec<(usize, Option<ReplyFunc>)> = Vec::with_capacity(op_count);
        for op in ops {
            trace!(addr = %self.addr, op = op.name(), "serializing op");
            let start = buf.len();
            let func = wire::serialize_op(&mut buf, op)?;
            requests.push((start, func));
        }

        let mut st = self.state();
        if let Some(dead) = st.dead.clone() {
            drop(st);
            debug!(addr = %self.addr, reason = %dead, "failing query, socket already closed");
            for (_, func) in requests {
                if let Some(mut func) = func {
                    (func)(Err(dead.clone()));
                }
            }
            return Err(dead);
        }

        // Every op in the batch gets an id from one contiguous run; id 0
        // is reserved, so allocation wraps past it.
        let mut request_id = st.next_request_id;
        for (start, func) in requests {
            request_id = request_id.wrapping_add(1);
            if request_id == 0 {
                request_id = 1;
            }
            wire::patch_request_id(&mut buf, start, request_id);
            if let Some(func) = func {
                st.reply_funcs
                    .insert(request_id, Arc::new(Mutex::new(func)));
            }
        }
        st.next_request_id = request_id;

        debug!(addr = %self.addr, ops = op_count, bytes = buf.len(), "sending ops");
        stats::sent_ops(op_count as i64);

        (&self.conn).write_all(&buf)?;
        Ok(())
    }

    /// Sends one query and blocks for its reply, returning the first
    /// document's bytes (`None` when the reply carries no documents).
    pub fn simple_query(&self, mut op: QueryOp) -> Result<Option<Vec<u8>>> {
        let (tx, rx) = mpsc::sync_channel::<Result<Option<Vec<u8>>>>(1);
        op.reply_func = Some(Box::new(move |reply: Result<ReplyFrame<'_>>| {
            let message = reply.map(|frame| frame.doc.map(<[u8]>::to_vec));
            let _ = tx.try_send(message);
        }));
        self.query(vec![Op::Query(op)])?;
        match rx.recv() {
            Ok(reply) => reply,
            Err(_) => Err(Error::message("reply callback dropped")),
        }
    }

    /// The inbound half: reads reply frames for the socket's lifetime and
    /// dispatches them to their callbacks. Any read error kills the
    /// socket.
    fn read_loop(&self) {
        // 16 envelope bytes plus the 20 fixed OP_REPLY fields.
        let mut header = [0u8; 36];
        let mut size = [0u8; 4];
        loop {
            if let Err(err) = (&self.conn).read_exact(&mut header) {
                self.kill(Error::from(err));
                return;
            }

            let total_len = wire::get_i32(&header, 0);
            let response_to = wire::get_i32(&header, 8) as u32;
            let op_code = wire::get_i32(&header, 12);

            trace!(addr = %self.addr, bytes = total_len, "got reply");

            if op_code != wire::OP_REPLY {
                self.kill(Error::CorruptedReply);
                return;
            }

            let reply = wire::parse_reply(&header[16..36]);
            stats::received_ops(1);
            stats::received_docs(reply.reply_docs as i64);

            let reply_func = self.state().reply_funcs.get(&response_to).cloned();

            if reply.reply_docs == 0 {
                if let Some(func) = &reply_func {
                    let mut func = func.lock().unwrap_or_else(|e| e.into_inner());
                    (*func)(Ok(ReplyFrame {
                        op: reply,
                        doc_index: -1,
                        doc: None,
                    }));
                }
            } else {
                for index in 0..reply.reply_docs {
                    if let Err(err) = (&self.conn).read_exact(&mut size) {
                        self.kill(Error::from(err));
                        return;
                    }
                    let doc_len = wire::get_i32(&size, 0);
                    if doc_len < 5 {
                        self.kill(Error::CorruptedDocument);
                        return;
                    }

                    let mut doc = vec![0u8; doc_len as usize];
                    doc[..4].copy_from_slice(&size);
                    if let Err(err) = (&self.conn).read_exact(&mut doc[4..]) {
                        self.kill(Error::from(err));
                        return;
                    }

                    if let Some(func) = &reply_func {
                        let mut func = func.lock().unwrap_or_else(|e| e.into_inner());
                        (*func)(Ok(ReplyFrame {
                            op: reply,
                            doc_index: index,
                            doc: Some(&doc),
                        }));
                    }
                }
            }

            // Removed only after the iteration so a concurrent kill still
            // sees the entry and fans the error out.
            if reply_func.is_some() {
                self.state().reply_funcs.remove(&response_to);
            }
        }
    }
}
