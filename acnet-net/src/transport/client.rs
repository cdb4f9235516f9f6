//! Client message transport: frames typed messages over a [`SocketClient`].

use acnet_core::{
    encode_frame_with_limit, ClientActionRequired, FrameDecoder, Message, MessageRef,
};
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::error::TransportError;
use crate::socket::{ClientSocketEvents, ReadControl, SocketClient};

/// Application callbacks for a client connection. Called synchronously from `update`.
pub trait ClientHandler {
    /// An opaque message arrived. `payload` is only valid for this call.
    fn on_message(&mut self, _payload: &[u8]) {}

    fn on_client_action_required(&mut self, _info: ClientActionRequired) {}

    /// The server closed the connection or the stream broke.
    fn on_disconnected(&mut self) {}
}

/// Client side of the framed link: one connection, one reassembly buffer.
pub struct ClientTransport {
    socket: SocketClient,
    decoder: FrameDecoder,
    max_frame_len: usize,
}

impl ClientTransport {
    pub fn new(config: TransportConfig) -> Self {
        let max_frame_len = config.send_buffer_size;
        Self {
            socket: SocketClient::new(config),
            decoder: FrameDecoder::with_max_frame_len(max_frame_len),
            max_frame_len,
        }
    }

    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), TransportError> {
        self.socket.connect(host, port)?;
        self.decoder.clear();
        Ok(())
    }

    pub fn disconnect(&mut self) -> bool {
        self.decoder.clear();
        self.socket.disconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_connected()
    }

    /// Encode and send one message. Encoding errors are reported even when disconnected;
    /// a valid message sent while disconnected is dropped. An I/O failure disconnects,
    /// and `on_disconnected` fires on the next `update`.
    pub fn send(&mut self, msg: &Message) -> Result<(), TransportError> {
        let frame = encode_frame_with_limit(msg, self.max_frame_len)?;
        debug!("sending {:?} frame ({} bytes)", msg.kind(), frame.len());
        self.socket.send(&frame)?;
        Ok(())
    }

    /// Poll the socket once and dispatch every complete message received.
    pub fn update<H: ClientHandler + ?Sized>(&mut self, handler: &mut H) {
        let mut dispatch = Dispatch {
            decoder: &mut self.decoder,
            handler,
        };
        self.socket.update(&mut dispatch);
    }
}

struct Dispatch<'a, H: ?Sized> {
    decoder: &'a mut FrameDecoder,
    handler: &'a mut H,
}

impl<H: ClientHandler + ?Sized> ClientSocketEvents for Dispatch<'_, H> {
    fn on_buffer_received(&mut self, data: &[u8]) -> ReadControl {
        self.decoder.feed(data);
        loop {
            let frame = match self.decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return ReadControl::Continue,
                Err(e) => {
                    warn!("protocol violation from server: {}", e);
                    return ReadControl::Close;
                }
            };
            debug!("received {:?} frame", frame.kind());
            match frame {
                MessageRef::Opaque(payload) => self.handler.on_message(payload),
                MessageRef::ClientActionRequired(info) => {
                    self.handler.on_client_action_required(info)
                }
                MessageRef::RegistrationInfo(_) => {
                    warn!("ignoring RegistrationInfo sent to a client");
                }
            }
        }
    }

    fn on_disconnected(&mut self) {
        self.decoder.clear();
        self.handler.on_disconnected();
    }
}
