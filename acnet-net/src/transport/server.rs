//! Server message transport: frames typed messages over a [`SocketServer`].

use std::collections::HashMap;
use std::net::SocketAddr;

use acnet_core::{encode_frame_with_limit, FrameDecoder, Message, MessageRef, RegistrationInfo};
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::handle::ClientHandle;
use crate::socket::{ReadControl, ServerSocketEvents, SocketServer};

/// Application callbacks for the dedicated server. Called synchronously from `update`.
pub trait ServerHandler {
    fn on_client_connected(&mut self, _client: ClientHandle, _addr: SocketAddr) {}

    /// An opaque message arrived from `client`. `payload` is only valid for this call.
    fn on_message(&mut self, _client: ClientHandle, _payload: &[u8]) {}

    /// A client identified itself.
    fn on_new_client(&mut self, _client: ClientHandle, _info: RegistrationInfo) {}

    /// Fired once per connection, whether the peer left or the server closed it.
    fn on_client_disconnected(&mut self, _client: ClientHandle) {}
}

/// Server side of the framed link. Each connection keeps its own reassembly buffer.
pub struct ServerTransport {
    socket: SocketServer,
    decoders: HashMap<ClientHandle, FrameDecoder>,
    max_frame_len: usize,
}

impl ServerTransport {
    pub fn new(config: TransportConfig) -> Self {
        let max_frame_len = config.send_buffer_size;
        Self {
            decoders: HashMap::with_capacity(config.max_clients),
            socket: SocketServer::new(config),
            max_frame_len,
        }
    }

    /// Listen on `port` on all interfaces.
    pub fn open(&mut self, port: u16) -> Result<(), TransportError> {
        self.socket.open(port)
    }

    pub fn open_on(&mut self, addr: SocketAddr) -> Result<(), TransportError> {
        self.socket.open_on(addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn client_count(&self) -> usize {
        self.socket.client_count()
    }

    pub fn clients(&self) -> Vec<ClientHandle> {
        self.socket.clients()
    }

    pub fn is_client_connected(&self, client: ClientHandle) -> bool {
        self.socket.is_client_connected(client)
    }

    pub fn peer_addr(&self, client: ClientHandle) -> Option<SocketAddr> {
        self.socket.peer_addr(client)
    }

    /// Encode and send one message to `client`. Unknown handles are silently dropped.
    /// After an I/O failure the client is dropped and `on_client_disconnected` fires
    /// on the next `update`.
    pub fn send(&mut self, client: ClientHandle, msg: &Message) -> Result<(), TransportError> {
        let frame = encode_frame_with_limit(msg, self.max_frame_len)?;
        debug!("sending {:?} frame ({} bytes) to {}", msg.kind(), frame.len(), client);
        self.socket.send(client, &frame)?;
        Ok(())
    }

    /// Poll every connection once, dispatching complete messages, then accept one client.
    pub fn update<H: ServerHandler + ?Sized>(&mut self, handler: &mut H) {
        let mut dispatch = Dispatch {
            decoders: &mut self.decoders,
            handler,
            max_frame_len: self.max_frame_len,
        };
        self.socket.update(&mut dispatch);
    }

    /// Disconnect one client. `on_client_disconnected` fires before the socket closes.
    /// Returns false, with no callback, if the handle is unknown or already closed.
    pub fn close_client_connection<H: ServerHandler + ?Sized>(
        &mut self,
        client: ClientHandle,
        handler: &mut H,
    ) -> bool {
        let mut dispatch = Dispatch {
            decoders: &mut self.decoders,
            handler,
            max_frame_len: self.max_frame_len,
        };
        self.socket.close_client_connection(&mut dispatch, client)
    }

    /// Disconnect every client and stop listening.
    pub fn close<H: ServerHandler + ?Sized>(&mut self, handler: &mut H) {
        let mut dispatch = Dispatch {
            decoders: &mut self.decoders,
            handler,
            max_frame_len: self.max_frame_len,
        };
        self.socket.close(&mut dispatch);
    }
}

struct Dispatch<'a, H: ?Sized> {
    decoders: &'a mut HashMap<ClientHandle, FrameDecoder>,
    handler: &'a mut H,
    max_frame_len: usize,
}

impl<H: ServerHandler + ?Sized> ServerSocketEvents for Dispatch<'_, H> {
    fn on_client_connected(&mut self, client: ClientHandle, addr: SocketAddr) {
        self.decoders
            .insert(client, FrameDecoder::with_max_frame_len(self.max_frame_len));
        self.handler.on_client_connected(client, addr);
    }

    fn on_buffer_received(&mut self, client: ClientHandle, data: &[u8]) -> ReadControl {
        let max_frame_len = self.max_frame_len;
        let decoder = self
            .decoders
            .entry(client)
            .or_insert_with(|| FrameDecoder::with_max_frame_len(max_frame_len));
        decoder.feed(data);
        loop {
            let frame = match decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return ReadControl::Continue,
                Err(e) => {
                    warn!("protocol violation from {}: {}", client, e);
                    return ReadControl::Close;
                }
            };
            debug!("received {:?} frame from {}", frame.kind(), client);
            match frame {
                MessageRef::Opaque(payload) => self.handler.on_message(client, payload),
                MessageRef::RegistrationInfo(info) => self.handler.on_new_client(client, info),
                MessageRef::ClientActionRequired(_) => {
                    warn!("ignoring ClientActionRequired sent by {}", client);
                }
            }
        }
    }

    fn on_client_disconnected(&mut self, client: ClientHandle) {
        self.decoders.remove(&client);
        self.handler.on_client_disconnected(client);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{loopback, pump};
    use crate::transport::{ClientHandler, ClientTransport};
    use acnet_core::{
        encode_frame, ActionReason, ClientAction, ClientActionRequired, Platform,
    };
    use std::io::Write;
    use std::net::TcpStream;

    #[derive(Default)]
    struct Recorder {
        connected: Vec<ClientHandle>,
        messages: Vec<(ClientHandle, Vec<u8>)>,
        registrations: Vec<(ClientHandle, RegistrationInfo)>,
        disconnected: Vec<ClientHandle>,
    }

    impl ServerHandler for Recorder {
        fn on_client_connected(&mut self, client: ClientHandle, _addr: SocketAddr) {
            self.connected.push(client);
        }

        fn on_message(&mut self, client: ClientHandle, payload: &[u8]) {
            self.messages.push((client, payload.to_vec()));
        }

        fn on_new_client(&mut self, client: ClientHandle, info: RegistrationInfo) {
            self.registrations.push((client, info));
        }

        fn on_client_disconnected(&mut self, client: ClientHandle) {
            self.disconnected.push(client);
        }
    }

    #[derive(Default)]
    struct ClientRecorder {
        actions: Vec<ClientActionRequired>,
        disconnects: usize,
    }

    impl ClientHandler for ClientRecorder {
        fn on_client_action_required(&mut self, info: ClientActionRequired) {
            self.actions.push(info);
        }

        fn on_disconnected(&mut self) {
            self.disconnects += 1;
        }
    }

    fn open_server() -> ServerTransport {
        let mut server = ServerTransport::new(TransportConfig::default());
        server.open_on(loopback()).unwrap();
        server
    }

    fn connect_client(server: &ServerTransport) -> ClientTransport {
        let port = server.local_addr().unwrap().port();
        let mut client = ClientTransport::new(TransportConfig::default());
        client.connect("127.0.0.1", port).unwrap();
        client
    }

    fn registration(id: &str) -> RegistrationInfo {
        RegistrationInfo {
            product_user_id: id.into(),
            connect_id_token: "tok".into(),
            platform: Platform::Windows,
        }
    }

    #[test]
    fn registration_end_to_end() {
        let mut server = open_server();
        let mut client = connect_client(&server);
        client.send(&registration("u1").into()).unwrap();

        let mut rec = Recorder::default();
        pump(|| {
            server.update(&mut rec);
            !rec.registrations.is_empty()
        });
        for _ in 0..5 {
            server.update(&mut rec);
        }
        assert_eq!(rec.connected.len(), 1);
        assert_eq!(rec.registrations.len(), 1);
        let (sender, info) = &rec.registrations[0];
        assert_eq!(*sender, rec.connected[0]);
        assert_eq!(
            *info,
            RegistrationInfo {
                product_user_id: "u1".into(),
                connect_id_token: "tok".into(),
                platform: Platform::Windows,
            }
        );
    }

    #[test]
    fn many_frames_in_one_read_dispatch_in_order() {
        let mut server = open_server();
        let mut peer = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        let mut bytes = Vec::new();
        for i in 0..5u8 {
            bytes.extend_from_slice(&encode_frame(&Message::Opaque(vec![i; 3])).unwrap());
        }
        bytes.extend_from_slice(&encode_frame(&registration("u9").into()).unwrap());
        peer.write_all(&bytes).unwrap();

        let mut rec = Recorder::default();
        pump(|| {
            server.update(&mut rec);
            rec.registrations.len() == 1
        });
        let payloads: Vec<Vec<u8>> = rec.messages.iter().map(|(_, p)| p.clone()).collect();
        assert_eq!(payloads, (0..5u8).map(|i| vec![i; 3]).collect::<Vec<_>>());
    }

    #[test]
    fn multi_client_isolation() {
        let mut server = open_server();
        let mut rec = Recorder::default();
        let mut a = connect_client(&server);
        pump(|| {
            server.update(&mut rec);
            rec.connected.len() == 1
        });
        let mut b = connect_client(&server);
        pump(|| {
            server.update(&mut rec);
            rec.connected.len() == 2
        });
        let (ha, hb) = (rec.connected[0], rec.connected[1]);

        a.send(&Message::Opaque(b"alpha".to_vec())).unwrap();
        b.send(&Message::Opaque(b"bravo".to_vec())).unwrap();
        pump(|| {
            server.update(&mut rec);
            rec.messages.len() == 2
        });
        rec.messages.sort();
        let mut expected = vec![(ha, b"alpha".to_vec()), (hb, b"bravo".to_vec())];
        expected.sort();
        assert_eq!(rec.messages, expected);
    }

    #[test]
    fn frame_split_across_ticks_is_reassembled() {
        let mut server = open_server();
        let mut peer = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        peer.set_nodelay(true).unwrap();
        let frame = encode_frame(&registration("split").into()).unwrap();
        let mut rec = Recorder::default();

        peer.write_all(&frame[..3]).unwrap();
        pump(|| {
            server.update(&mut rec);
            rec.connected.len() == 1
        });
        for _ in 0..10 {
            server.update(&mut rec);
        }
        assert!(rec.registrations.is_empty());

        peer.write_all(&frame[3..]).unwrap();
        pump(|| {
            server.update(&mut rec);
            !rec.registrations.is_empty()
        });
        assert_eq!(rec.registrations[0].1, registration("split"));
        assert!(rec.disconnected.is_empty());
    }

    #[test]
    fn action_required_reaches_client_then_close() {
        let mut server = open_server();
        let mut client = connect_client(&server);
        let mut rec = Recorder::default();
        pump(|| {
            server.update(&mut rec);
            rec.connected.len() == 1
        });
        let handle = rec.connected[0];
        let kick = ClientActionRequired {
            action: ClientAction::RemovePlayer,
            reason: ActionReason::AuthenticationFailed,
            details: "bad token".into(),
        };
        server.send(handle, &kick.clone().into()).unwrap();
        assert!(server.close_client_connection(handle, &mut rec));
        assert!(!server.close_client_connection(handle, &mut rec));
        assert_eq!(rec.disconnected, vec![handle]);

        let mut crec = ClientRecorder::default();
        pump(|| {
            client.update(&mut crec);
            !client.is_connected()
        });
        assert_eq!(crec.actions, vec![kick]);
        assert_eq!(crec.disconnects, 1);
    }

    #[test]
    fn malformed_frame_closes_only_that_client() {
        let mut server = open_server();
        let mut rec = Recorder::default();
        let mut bad = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        pump(|| {
            server.update(&mut rec);
            rec.connected.len() == 1
        });
        let mut good = connect_client(&server);
        pump(|| {
            server.update(&mut rec);
            rec.connected.len() == 2
        });

        bad.write_all(&[2, 3, 0, 0, 0, b'x', b'y', b'z']).unwrap();
        pump(|| {
            server.update(&mut rec);
            rec.disconnected.len() == 1
        });
        assert_eq!(rec.disconnected, vec![rec.connected[0]]);

        good.send(&Message::Opaque(b"still here".to_vec())).unwrap();
        pump(|| {
            server.update(&mut rec);
            !rec.messages.is_empty()
        });
        assert_eq!(rec.messages[0], (rec.connected[1], b"still here".to_vec()));
    }

    #[test]
    fn failed_send_drops_client_without_torn_frames() {
        let mut server = ServerTransport::new(TransportConfig {
            send_timeout_ms: 5,
            ..TransportConfig::default()
        });
        server.open_on(loopback()).unwrap();
        let mut peer = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        let mut rec = Recorder::default();
        pump(|| {
            server.update(&mut rec);
            rec.connected.len() == 1
        });
        let handle = rec.connected[0];

        // The peer does not read until the server gives up on it.
        let big = Message::Opaque(vec![7; acnet_core::max_payload_len(4096)]);
        let mut sent = 0usize;
        let mut result = Ok(());
        for _ in 0..100_000 {
            result = server.send(handle, &big);
            if result.is_err() {
                break;
            }
            sent += 1;
        }
        assert!(matches!(result, Err(TransportError::Io(_))));
        assert!(!server.is_client_connected(handle));
        assert!(server.send(handle, &big).is_ok());

        server.update(&mut rec);
        server.update(&mut rec);
        assert_eq!(rec.disconnected, vec![handle]);
        assert_eq!(server.client_count(), 0);

        // Everything after the last complete frame is at most one partial frame.
        peer.set_read_timeout(Some(std::time::Duration::from_secs(5))).unwrap();
        let mut decoder = FrameDecoder::new();
        let mut frames = 0usize;
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = match std::io::Read::read(&mut peer, &mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => panic!("peer read failed: {}", e),
            };
            if n == 0 {
                break;
            }
            decoder.feed(&buf[..n]);
            while let Some(frame) = decoder.next_frame().unwrap() {
                assert_eq!(frame, MessageRef::Opaque(&[7; 4091][..]));
                frames += 1;
            }
        }
        assert_eq!(frames, sent);
        assert!(decoder.buffered() < 4096);
    }

    #[test]
    fn send_to_stale_handle_is_dropped() {
        let mut server = open_server();
        let mut rec = Recorder::default();
        let _client = connect_client(&server);
        pump(|| {
            server.update(&mut rec);
            rec.connected.len() == 1
        });
        let handle = rec.connected[0];
        server.close(&mut rec);
        assert!(server.send(handle, &Message::Opaque(vec![1])).is_ok());
        assert_eq!(server.client_count(), 0);
        assert_eq!(rec.disconnected, vec![handle]);
    }
}
