//! Server socket: a listener plus a bounded pool of accepted connections.

use std::io;
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};

use tracing::{debug, info, warn};

use super::{close_stream, poll_read, prepare_stream, send_all, ReadControl, Readiness};
use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::handle::{ClientHandle, Slots};

/// Consumer of per-client events raised by [`SocketServer::update`].
pub trait ServerSocketEvents {
    fn on_client_connected(&mut self, _client: ClientHandle, _addr: SocketAddr) {}

    fn on_buffer_received(&mut self, client: ClientHandle, data: &[u8]) -> ReadControl;

    /// Fired once per connection, before its socket is removed and closed.
    fn on_client_disconnected(&mut self, _client: ClientHandle) {}
}

struct Connection {
    stream: TcpStream,
    addr: SocketAddr,
    /// A send failed, possibly mid-frame. Nothing more is written; the next `update`
    /// runs disconnect handling.
    broken: bool,
}

/// Listening socket and accepted connections, all polled by one `update` per tick.
///
/// The connection arena is also the poll set: a connection is polled exactly while it
/// is addressable by its handle.
pub struct SocketServer {
    listener: Option<TcpListener>,
    clients: Slots<Connection>,
    /// Shared by every read in a tick; each read is fully consumed before the next.
    recv_buf: Vec<u8>,
    config: TransportConfig,
}

impl SocketServer {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            listener: None,
            clients: Slots::with_capacity(config.max_clients),
            recv_buf: vec![0u8; config.effective_recv_buffer_size()],
            config,
        }
    }

    /// Bind and listen on `port` on all interfaces.
    pub fn open(&mut self, port: u16) -> Result<(), TransportError> {
        self.open_on(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }

    pub fn open_on(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        if self.listener.is_some() {
            return Err(TransportError::AlreadyOpen);
        }
        let listener = TcpListener::bind(addr).map_err(|e| {
            warn!("could not listen on {}: {}", addr, e);
            e
        })?;
        listener.set_nonblocking(true)?;
        info!("listening on {}", listener.local_addr()?);
        self.listener = Some(listener);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.listener.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn clients(&self) -> Vec<ClientHandle> {
        self.clients.handles()
    }

    /// False for unknown handles and for connections whose last send failed.
    pub fn is_client_connected(&self, client: ClientHandle) -> bool {
        self.clients.get(client).map_or(false, |c| !c.broken)
    }

    pub fn peer_addr(&self, client: ClientHandle) -> Option<SocketAddr> {
        self.clients.get(client).map(|c| c.addr)
    }

    /// Write the exact byte range to one client. Unknown handles are silently dropped.
    ///
    /// A failed write shuts the connection down at once so no later frame follows a
    /// partial one; `on_client_disconnected` fires on the next `update`.
    pub fn send(&mut self, client: ClientHandle, data: &[u8]) -> io::Result<()> {
        let Some(conn) = self.clients.get_mut(client).filter(|c| !c.broken) else {
            debug!("dropping {} bytes for {}: not connected", data.len(), client);
            return Ok(());
        };
        send_all(&mut conn.stream, data).map_err(|e| {
            warn!("send to {} failed, dropping connection: {}", client, e);
            conn.broken = true;
            let _ = conn.stream.shutdown(Shutdown::Both);
            e
        })
    }

    /// Read every ready client once, then accept at most one new connection.
    pub fn update<E: ServerSocketEvents + ?Sized>(&mut self, events: &mut E) {
        if self.listener.is_none() {
            return;
        }
        for client in self.clients.handles() {
            let Some(conn) = self.clients.get_mut(client) else {
                continue;
            };
            if conn.broken {
                self.close_client_connection(events, client);
                continue;
            }
            let control = match poll_read(&mut conn.stream, &mut self.recv_buf) {
                Readiness::NotReady => continue,
                Readiness::Data(n) => events.on_buffer_received(client, &self.recv_buf[..n]),
                Readiness::Closed(err) => {
                    match err {
                        Some(e) => info!("{} lost: {}", client, e),
                        None => info!("{} closed by peer", client),
                    }
                    ReadControl::Close
                }
            };
            if control == ReadControl::Close {
                self.close_client_connection(events, client);
            }
        }
        self.accept_one(events);
    }

    fn accept_one<E: ServerSocketEvents + ?Sized>(&mut self, events: &mut E) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };
        let (stream, addr) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
                return;
            }
            Err(e) => {
                warn!("accept failed: {}", e);
                return;
            }
        };
        if self.clients.len() >= self.config.max_clients {
            warn!(
                "rejecting {}: {} clients connected (max {})",
                addr,
                self.clients.len(),
                self.config.max_clients
            );
            close_stream(stream);
            return;
        }
        if let Err(e) = prepare_stream(&stream, &self.config) {
            warn!("could not configure socket for {}: {}", addr, e);
            close_stream(stream);
            return;
        }
        let client = self.clients.insert(Connection {
            stream,
            addr,
            broken: false,
        });
        info!("{} connected from {}", client, addr);
        events.on_client_connected(client, addr);
    }

    /// Server-initiated disconnect: callback, then remove, then close.
    /// Returns false without any callback for an unknown or already-closed handle.
    pub fn close_client_connection<E: ServerSocketEvents + ?Sized>(
        &mut self,
        events: &mut E,
        client: ClientHandle,
    ) -> bool {
        if !self.clients.contains(client) {
            return false;
        }
        events.on_client_disconnected(client);
        if let Some(conn) = self.clients.remove(client) {
            debug!("closing {}", client);
            close_stream(conn.stream);
        }
        true
    }

    /// Close every client (firing their disconnect events) and stop listening.
    pub fn close<E: ServerSocketEvents + ?Sized>(&mut self, events: &mut E) {
        for client in self.clients.handles() {
            self.close_client_connection(events, client);
        }
        if self.listener.take().is_some() {
            info!("stopped listening");
        }
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        for client in self.clients.handles() {
            if let Some(conn) = self.clients.remove(client) {
                close_stream(conn.stream);
            }
        }
    }
}
