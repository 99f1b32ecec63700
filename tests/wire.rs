//! Socket tests against a scripted peer on localhost.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use mongowire::wire::{
    DeleteOp, InsertOp, Op, QueryOp, ServerPool, Socket, OP_DELETE, OP_INSERT, OP_QUERY, OP_REPLY,
};
use mongowire::{decode, doc, encode, Document, Error};

#[derive(Default)]
struct FakePool {
    master: bool,
    recycled: AtomicUsize,
}

impl ServerPool for FakePool {
    fn is_master(&self) -> bool {
        self.master
    }

    fn recycle(&self, _socket: Arc<Socket>) {
        self.recycled.fetch_add(1, Ordering::SeqCst);
    }
}

fn connect() -> (Arc<Socket>, TcpStream, Arc<FakePool>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    let pool = Arc::new(FakePool {
        master: true,
        recycled: AtomicUsize::new(0),
    });
    let socket = Socket::new(pool.clone(), client).unwrap();
    (socket, server, pool)
}

fn get_i32(buf: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
}

/// Reads one length-prefixed wire message.
fn read_message(stream: &mut TcpStream) -> Vec<u8> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).unwrap();
    let total = i32::from_le_bytes(len) as usize;
    let mut message = len.to_vec();
    message.resize(total, 0);
    stream.read_exact(&mut message[4..]).unwrap();
    message
}

/// Writes an OP_REPLY answering `response_to`, carrying `docs`.
fn write_reply(stream: &mut TcpStream, response_to: i32, cursor_id: i64, docs: &[Vec<u8>]) {
    let doc_bytes: usize = docs.iter().map(Vec::len).sum();
    let total = 36 + doc_bytes;
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&(total as i32).to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes()); // request id
    buf.extend_from_slice(&response_to.to_le_bytes());
    buf.extend_from_slice(&OP_REPLY.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes()); // flags
    buf.extend_from_slice(&cursor_id.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes()); // first doc
    buf.extend_from_slice(&(docs.len() as i32).to_le_bytes());
    for doc in docs {
        buf.extend_from_slice(doc);
    }
    stream.write_all(&buf).unwrap();
}

#[test]
fn batch_ids_are_contiguous_and_kill_fans_out() {
    let (socket, mut server, _pool) = connect();

    let (tx, rx) = mpsc::channel::<String>();
    let mut query = QueryOp::new("db.c", doc! {});
    query.reply_func = Some(Box::new(move |reply| {
        let event = match reply {
            Ok(frame) => format!("doc {}", frame.doc_index),
            Err(err) => err.to_string(),
        };
        let _ = tx.send(event);
    }));

    let insert = Op::Insert(InsertOp {
        collection: "db.c".to_string(),
        documents: vec![doc! { "a" => 1i32 }],
    });
    socket.query(vec![insert, Op::Query(query)]).unwrap();

    let first = read_message(&mut server);
    let second = read_message(&mut server);
    assert_eq!(get_i32(&first, 12), OP_INSERT);
    assert_eq!(get_i32(&second, 12), OP_QUERY);

    let insert_id = get_i32(&first, 4);
    let query_id = get_i32(&second, 4);
    assert_ne!(insert_id, 0);
    assert_eq!(query_id, insert_id + 1);

    // Kill fans the reason out to the pending callback exactly once, and
    // later sends fail with the same reason.
    socket.kill(Error::message("boom"));
    assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "boom");

    let err = socket
        .query(vec![Op::Delete(DeleteOp {
            collection: "db.c".to_string(),
            selector: doc! {},
            flags: 0,
        })])
        .unwrap_err();
    assert_eq!(err.to_string(), "boom");

    thread::sleep(Duration::from_millis(50));
    assert!(rx.try_recv().is_err(), "callback fired more than once");
}

#[test]
fn simple_query_returns_the_first_document() {
    let (socket, mut server, _pool) = connect();

    let server_thread = thread::spawn(move || {
        let message = read_message(&mut server);
        assert_eq!(get_i32(&message, 12), OP_QUERY);
        let request_id = get_i32(&message, 4);
        let reply_doc = encode(&doc! { "ok" => 1i32 }).unwrap();
        write_reply(&mut server, request_id, 0, &[reply_doc]);
        server
    });

    let data = socket
        .simple_query(QueryOp::new("db.$cmd", doc! { "ping" => 1i32 }))
        .unwrap()
        .expect("reply should carry a document");

    let mut reply = Document::new();
    decode(&data, &mut reply).unwrap();
    assert_eq!(reply, doc! { "ok" => 1i32 });

    server_thread.join().unwrap();
}

#[test]
fn empty_replies_dispatch_once_with_no_document() {
    let (socket, mut server, _pool) = connect();

    let server_thread = thread::spawn(move || {
        let message = read_message(&mut server);
        let request_id = get_i32(&message, 4);
        write_reply(&mut server, request_id, 0, &[]);
        server
    });

    let data = socket
        .simple_query(QueryOp::new("db.c", doc! {}))
        .unwrap();
    assert_eq!(data, None);

    server_thread.join().unwrap();
}

#[test]
fn multi_document_replies_invoke_the_callback_per_document() {
    let (socket, mut server, _pool) = connect();

    let (tx, rx) = mpsc::channel::<(i32, Vec<u8>)>();
    let mut query = QueryOp::new("db.c", doc! {});
    query.reply_func = Some(Box::new(move |reply| {
        if let Ok(frame) = reply {
            let _ = tx.send((frame.doc_index, frame.doc.unwrap_or_default().to_vec()));
        }
    }));
    socket.query(vec![Op::Query(query)]).unwrap();

    let message = read_message(&mut server);
    let request_id = get_i32(&message, 4);
    let docs = vec![
        encode(&doc! { "i" => 0i32 }).unwrap(),
        encode(&doc! { "i" => 1i32 }).unwrap(),
    ];
    write_reply(&mut server, request_id, 7, &docs);

    for expected in 0..2 {
        let (index, data) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(index, expected);
        let mut doc = Document::new();
        decode(&data, &mut doc).unwrap();
        assert_eq!(doc, doc! { "i" => expected });
    }
}

#[test]
fn bad_opcode_kills_the_socket() {
    let (socket, mut server, _pool) = connect();

    let (tx, rx) = mpsc::channel::<String>();
    let mut query = QueryOp::new("db.c", doc! {});
    query.reply_func = Some(Box::new(move |reply| {
        if let Err(err) = reply {
            let _ = tx.send(err.to_string());
        }
    }));
    socket.query(vec![Op::Query(query)]).unwrap();

    let message = read_message(&mut server);
    let request_id = get_i32(&message, 4);

    // An inbound opcode other than OP_REPLY is corruption.
    let mut reply = Vec::new();
    reply.extend_from_slice(&36i32.to_le_bytes());
    reply.extend_from_slice(&0i32.to_le_bytes());
    reply.extend_from_slice(&request_id.to_le_bytes());
    reply.extend_from_slice(&2i32.to_le_bytes());
    reply.extend_from_slice(&[0u8; 20]);
    server.write_all(&reply).unwrap();

    assert_eq!(
        rx.recv_timeout(Duration::from_secs(5)).unwrap(),
        "opcode != 1, corrupted data?"
    );
    assert_eq!(
        socket.dead_reason().unwrap().to_string(),
        "opcode != 1, corrupted data?"
    );
}

#[test]
fn peer_disconnect_kills_the_socket() {
    let (socket, server, _pool) = connect();

    let (tx, rx) = mpsc::channel::<Result<i32, String>>();
    let mut query = QueryOp::new("db.c", doc! {});
    query.reply_func = Some(Box::new(move |reply| {
        let _ = tx.send(match reply {
            Ok(frame) => Ok(frame.doc_index),
            Err(err) => Err(err.to_string()),
        });
    }));
    socket.query(vec![Op::Query(query)]).unwrap();

    drop(server);

    let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(event.is_err());
    assert!(socket.dead_reason().is_some());
}

#[test]
fn release_recycles_at_zero_references() {
    let (socket, _server, pool) = connect();

    assert!(socket.acquire_again());
    socket.release();
    assert_eq!(pool.recycled.load(Ordering::SeqCst), 0);
    socket.release();
    assert_eq!(pool.recycled.load(Ordering::SeqCst), 1);

    socket.close();
    assert_eq!(socket.dead_reason().unwrap().to_string(), "Closed explicitly");
}

#[test]
fn acquire_after_death_reports_the_reason() {
    let (socket, _server, pool) = connect();

    socket.release();
    assert_eq!(pool.recycled.load(Ordering::SeqCst), 1);

    socket.kill(Error::message("gone"));
    let err = socket.acquire(pool.clone()).unwrap_err();
    assert_eq!(err.to_string(), "gone");
}

#[test]
fn scheduled_logout_is_sent_ahead_of_the_batch() {
    let (socket, mut server, _pool) = connect();

    socket.schedule_logout(Op::Delete(DeleteOp {
        collection: "db.$cmd".to_string(),
        selector: doc! { "logout" => 1i32 },
        flags: 0,
    }));
    socket
        .query(vec![Op::Insert(InsertOp {
            collection: "db.c".to_string(),
            documents: vec![doc! { "a" => 1i32 }],
        })])
        .unwrap();

    let first = read_message(&mut server);
    let second = read_message(&mut server);
    assert_eq!(get_i32(&first, 12), OP_DELETE);
    assert_eq!(get_i32(&second, 12), OP_INSERT);
    // Prepending keeps the batch contiguous.
    assert_eq!(get_i32(&second, 4), get_i32(&first, 4) + 1);
}

#[test]
fn nonce_waits_for_arrival_and_observes_death() {
    let (socket, _server, _pool) = connect();

    let waiter = {
        let socket = socket.clone();
        thread::spawn(move || socket.nonce())
    };
    thread::sleep(Duration::from_millis(50));
    socket.store_nonce("abc123".to_string());
    assert_eq!(waiter.join().unwrap().unwrap(), "abc123");

    socket.reset_nonce();
    let waiter = {
        let socket = socket.clone();
        thread::spawn(move || socket.nonce())
    };
    thread::sleep(Duration::from_millis(50));
    socket.kill(Error::message("dead"));
    assert_eq!(waiter.join().unwrap().unwrap_err().to_string(), "dead");
}
