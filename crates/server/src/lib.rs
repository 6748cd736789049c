//! # Server — RESP2 front end for the StrataKV engine
//!
//! Accepts Redis-protocol clients over TCP and maps three verbs onto the
//! engine:
//!
//! ```text
//! SET key value   -> +OK            (engine put; -ERR on rejection)
//! GET key         -> $len\r\n<val>  ($-1 on a miss or deleted key)
//! DEL key         -> +OK            (engine delete; -ERR on rejection)
//! PING            -> +PONG
//! ```
//!
//! Unknown verbs and malformed frames get an `-ERR …` line and the
//! connection continues. One thread per connection: client threads call the
//! engine synchronously and block on its locks, which is exactly the
//! threading model the engine coordinates.

pub mod resp;

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use engine::Store;

use resp::Request;

/// Serves clients on `listener` until the process exits.
pub fn serve(listener: TcpListener, store: Arc<Store>) -> anyhow::Result<()> {
    for conn in listener.incoming() {
        match conn {
            Ok(stream) => {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, store) {
                        log::debug!("client dropped: {e}");
                    }
                });
            }
            Err(e) => log::warn!("accept failed: {e}"),
        }
    }
    Ok(())
}

fn handle_client(stream: TcpStream, store: Arc<Store>) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    log::debug!("client connected: {peer}");

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    loop {
        let reply = match resp::read_request(&mut reader) {
            Ok(Request::Closed) => break,
            Ok(Request::Malformed(why)) => resp::err(why),
            Ok(Request::Command(args)) => dispatch(&store, &args),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };
        writer.write_all(&reply)?;
        writer.flush()?;
    }

    log::debug!("client disconnected: {peer}");
    Ok(())
}

/// Executes one parsed command against the engine.
pub fn dispatch(store: &Store, args: &[Vec<u8>]) -> Vec<u8> {
    let verb = args[0].to_ascii_uppercase();
    match (verb.as_slice(), args.len()) {
        (b"SET", 3) => match store.put(&args[1], &args[2]) {
            Ok(()) => resp::OK.to_vec(),
            Err(e) => resp::err(&e.to_string()),
        },
        (b"GET", 2) => match store.get(&args[1]) {
            Ok(Some(value)) => resp::bulk(&value),
            Ok(None) => resp::NIL.to_vec(),
            Err(e) => resp::err(&e.to_string()),
        },
        (b"DEL", 2) => match store.delete(&args[1]) {
            Ok(()) => resp::OK.to_vec(),
            Err(e) => resp::err(&e.to_string()),
        },
        (b"PING", 1) => resp::PONG.to_vec(),
        (b"SET", _) => resp::err("usage: SET key value"),
        (b"GET", _) => resp::err("usage: GET key"),
        (b"DEL", _) => resp::err("usage: DEL key"),
        _ => resp::err("unknown command"),
    }
}
