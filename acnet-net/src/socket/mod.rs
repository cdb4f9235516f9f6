//! Socket transport: non-blocking TCP sockets polled once per tick.
//!
//! Raw bytes are reported through an event sink passed to `update`; the sink runs on the
//! caller's thread before `update` returns. Each ready socket gets at most one read per tick.

mod client;
mod server;

pub use client::{ClientSocketEvents, SocketClient};
pub use server::{ServerSocketEvents, SocketServer};

use std::io::{self, Read, Write};
use std::net::TcpStream;

use crate::config::TransportConfig;

/// Sink verdict after consuming a received buffer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReadControl {
    Continue,
    /// Close the connection (e.g. the bytes violated the protocol).
    Close,
}

/// Result of one zero-timeout readiness check on a stream.
#[derive(Debug)]
enum Readiness {
    Data(usize),
    NotReady,
    /// Peer closed (`None`) or the read failed; both mean disconnected.
    Closed(Option<io::Error>),
}

fn poll_read(stream: &mut TcpStream, buf: &mut [u8]) -> Readiness {
    match stream.read(buf) {
        Ok(0) => Readiness::Closed(None),
        Ok(n) => Readiness::Data(n),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Readiness::NotReady
        }
        Err(e) => Readiness::Closed(Some(e)),
    }
}

/// Synchronous send of the whole range on a non-blocking stream, bounded by the write timeout.
///
/// Any error, including failing to restore non-blocking mode, leaves the stream unusable:
/// a frame may be torn, or the next readiness check would block.
fn send_all(stream: &mut TcpStream, data: &[u8]) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    let result = stream.write_all(data).and_then(|_| stream.flush());
    let restored = stream.set_nonblocking(true);
    result.and(restored)
}

fn prepare_stream(stream: &TcpStream, config: &TransportConfig) -> io::Result<()> {
    stream.set_nonblocking(true)?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(config.send_timeout())?;
    Ok(())
}

fn close_stream(stream: TcpStream) {
    // Peer may already be gone; nothing left to report.
    let _ = stream.shutdown(std::net::Shutdown::Both);
}
