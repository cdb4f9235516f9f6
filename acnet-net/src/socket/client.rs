//! Client socket: one outbound TCP connection.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use tracing::{debug, info, warn};

use super::{close_stream, poll_read, prepare_stream, send_all, ReadControl, Readiness};
use crate::config::TransportConfig;
use crate::error::TransportError;

/// Consumer of raw bytes read by [`SocketClient::update`].
pub trait ClientSocketEvents {
    fn on_buffer_received(&mut self, data: &[u8]) -> ReadControl;

    /// The connection was lost: peer closed, read error, `Close`, or a failed `send`
    /// (reported on the next `update`). Never fired for an explicit `disconnect`.
    fn on_disconnected(&mut self) {}
}

/// Owns at most one connection and a fixed receive buffer.
pub struct SocketClient {
    stream: Option<TcpStream>,
    /// Set when a send failure dropped the connection; cleared once reported.
    lost_on_send: bool,
    recv_buf: Vec<u8>,
    config: TransportConfig,
}

impl SocketClient {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            stream: None,
            lost_on_send: false,
            recv_buf: vec![0u8; config.effective_recv_buffer_size()],
            config,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    /// Resolve `host` and connect to the first address that accepts.
    /// Fails with `AlreadyConnected` (leaving the live connection alone) if connected.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Err(TransportError::AlreadyConnected);
        }
        let addrs: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
            Ok(a) => a.collect(),
            Err(source) => {
                warn!("could not resolve {}:{}: {}", host, port, source);
                return Err(TransportError::Resolve {
                    host: host.to_string(),
                    source,
                });
            }
        };
        if addrs.is_empty() {
            warn!("no address found for {}:{}", host, port);
            return Err(TransportError::NoAddress(host.to_string()));
        }

        let mut last_err = None;
        for addr in addrs {
            let attempt = match self.config.connect_timeout() {
                Some(t) => TcpStream::connect_timeout(&addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt.and_then(|s| prepare_stream(&s, &self.config).map(|_| s)) {
                Ok(stream) => {
                    info!("connected to {}", addr);
                    self.stream = Some(stream);
                    self.lost_on_send = false;
                    return Ok(());
                }
                Err(e) => {
                    debug!("connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                }
            }
        }
        let err = last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no address tried"));
        warn!("could not connect to {}:{}: {}", host, port, err);
        Err(TransportError::Io(err))
    }

    /// Close the connection. Returns false if there was none; safe to call repeatedly.
    /// Also discards a pending send-failure notification.
    pub fn disconnect(&mut self) -> bool {
        self.lost_on_send = false;
        self.close()
    }

    fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(stream) => {
                debug!("disconnecting");
                close_stream(stream);
                true
            }
            None => false,
        }
    }

    /// Write the exact byte range. Silently dropped when not connected.
    /// A failed write disconnects at once; `on_disconnected` fires on the next `update`.
    pub fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            debug!("dropping {} bytes: not connected", data.len());
            return Ok(());
        };
        if let Err(e) = send_all(stream, data) {
            warn!("send failed, disconnecting: {}", e);
            self.close();
            self.lost_on_send = true;
            return Err(e);
        }
        Ok(())
    }

    /// One zero-timeout readiness check and at most one read.
    pub fn update<E: ClientSocketEvents + ?Sized>(&mut self, events: &mut E) {
        let Some(stream) = self.stream.as_mut() else {
            if std::mem::take(&mut self.lost_on_send) {
                events.on_disconnected();
            }
            return;
        };
        let control = match poll_read(stream, &mut self.recv_buf) {
            Readiness::NotReady => return,
            Readiness::Data(n) => events.on_buffer_received(&self.recv_buf[..n]),
            Readiness::Closed(err) => {
                match err {
                    Some(e) => info!("connection lost: {}", e),
                    None => info!("connection closed by peer"),
                }
                ReadControl::Close
            }
        };
        if control == ReadControl::Close {
            self.close();
            events.on_disconnected();
        }
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::pump;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[derive(Default)]
    struct Recorder {
        received: Vec<u8>,
        disconnects: usize,
        close_after_read: bool,
    }

    impl ClientSocketEvents for Recorder {
        fn on_buffer_received(&mut self, data: &[u8]) -> ReadControl {
            self.received.extend_from_slice(data);
            if self.close_after_read {
                ReadControl::Close
            } else {
                ReadControl::Continue
            }
        }

        fn on_disconnected(&mut self) {
            self.disconnects += 1;
        }
    }

    fn listener() -> (TcpListener, u16) {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = l.local_addr().unwrap().port();
        (l, port)
    }

    #[test]
    fn connect_send_receive() {
        let (l, port) = listener();
        let mut client = SocketClient::new(TransportConfig::default());
        client.connect("127.0.0.1", port).unwrap();
        assert!(client.is_connected());
        let (mut peer, _) = l.accept().unwrap();

        client.send(b"hello").unwrap();
        let mut buf = [0u8; 5];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        peer.write_all(b"world").unwrap();
        let mut rec = Recorder::default();
        pump(|| {
            client.update(&mut rec);
            rec.received.len() == 5
        });
        assert_eq!(rec.received, b"world");
        assert_eq!(rec.disconnects, 0);
    }

    #[test]
    fn connect_while_connected_fails_fast() {
        let (_l, port) = listener();
        let mut client = SocketClient::new(TransportConfig::default());
        client.connect("127.0.0.1", port).unwrap();
        let before = client.peer_addr();
        assert!(matches!(
            client.connect("127.0.0.1", port),
            Err(TransportError::AlreadyConnected)
        ));
        assert!(client.is_connected());
        assert_eq!(client.peer_addr(), before);
    }

    #[test]
    fn connect_refused_leaves_disconnected() {
        let port = {
            let (l, port) = listener();
            drop(l);
            port
        };
        let mut client = SocketClient::new(TransportConfig::default());
        assert!(client.connect("127.0.0.1", port).is_err());
        assert!(!client.is_connected());
    }

    #[test]
    fn update_and_send_are_noops_when_disconnected() {
        let mut client = SocketClient::new(TransportConfig::default());
        let mut rec = Recorder::default();
        client.update(&mut rec);
        assert!(client.send(b"dropped").is_ok());
        assert!(rec.received.is_empty());
        assert_eq!(rec.disconnects, 0);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (_l, port) = listener();
        let mut client = SocketClient::new(TransportConfig::default());
        client.connect("127.0.0.1", port).unwrap();
        assert!(client.disconnect());
        assert!(!client.disconnect());
        assert!(!client.is_connected());
    }

    #[test]
    fn peer_close_disconnects_once() {
        let (l, port) = listener();
        let mut client = SocketClient::new(TransportConfig::default());
        client.connect("127.0.0.1", port).unwrap();
        let (peer, _) = l.accept().unwrap();
        drop(peer);

        let mut rec = Recorder::default();
        pump(|| {
            client.update(&mut rec);
            !client.is_connected()
        });
        client.update(&mut rec);
        assert_eq!(rec.disconnects, 1);
    }

    #[test]
    fn failed_send_disconnects_and_reports_once() {
        let (l, port) = listener();
        let config = TransportConfig {
            send_timeout_ms: 5,
            ..TransportConfig::default()
        };
        let mut client = SocketClient::new(config);
        client.connect("127.0.0.1", port).unwrap();
        // Accepted but never read, so the socket buffers fill up.
        let (_peer, _) = l.accept().unwrap();

        let chunk = vec![0xAB; 64 * 1024];
        let mut failed = None;
        for _ in 0..10_000 {
            if let Err(e) = client.send(&chunk) {
                failed = Some(e);
                break;
            }
        }
        assert!(failed.is_some());
        assert!(!client.is_connected());
        assert!(client.send(b"after").is_ok());

        let mut rec = Recorder::default();
        client.update(&mut rec);
        client.update(&mut rec);
        assert_eq!(rec.disconnects, 1);
    }

    #[test]
    fn explicit_disconnect_discards_send_failure_notice() {
        let (l, port) = listener();
        let config = TransportConfig {
            send_timeout_ms: 5,
            ..TransportConfig::default()
        };
        let mut client = SocketClient::new(config);
        client.connect("127.0.0.1", port).unwrap();
        let (_peer, _) = l.accept().unwrap();

        let chunk = vec![0; 64 * 1024];
        for _ in 0..10_000 {
            if client.send(&chunk).is_err() {
                break;
            }
        }
        assert!(!client.is_connected());
        assert!(!client.disconnect());

        let mut rec = Recorder::default();
        client.update(&mut rec);
        assert_eq!(rec.disconnects, 0);
    }

    #[test]
    fn sink_close_disconnects() {
        let (l, port) = listener();
        let mut client = SocketClient::new(TransportConfig::default());
        client.connect("127.0.0.1", port).unwrap();
        let (mut peer, _) = l.accept().unwrap();
        peer.write_all(b"bad").unwrap();

        let mut rec = Recorder {
            close_after_read: true,
            ..Recorder::default()
        };
        pump(|| {
            client.update(&mut rec);
            !client.is_connected()
        });
        assert_eq!(rec.disconnects, 1);
        assert!(!rec.received.is_empty());
    }
}
