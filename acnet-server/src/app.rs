//! Sample server logic: echo opaque payloads, check registrations.

use std::collections::HashMap;
use std::net::SocketAddr;

use acnet_core::{ActionReason, ClientAction, ClientActionRequired, Message, RegistrationInfo};
use acnet_net::{ClientHandle, ServerHandler, ServerTransport};
use tracing::{debug, info, warn};

/// Action for the tick loop to perform once `update` has returned.
#[derive(Debug, PartialEq, Eq)]
pub enum OutboundAction {
    Send(ClientHandle, Message),
    Close(ClientHandle),
}

/// Per-server state. Handler callbacks only queue work; `flush` applies it.
#[derive(Default)]
pub struct EchoServer {
    registered: HashMap<ClientHandle, RegistrationInfo>,
    outbox: Vec<OutboundAction>,
}

impl EchoServer {
    pub fn registered(&self) -> usize {
        self.registered.len()
    }

    pub fn take_actions(&mut self) -> Vec<OutboundAction> {
        std::mem::take(&mut self.outbox)
    }

    /// Apply queued actions. Closing a client may queue nothing further, so one pass suffices.
    pub fn flush(&mut self, transport: &mut ServerTransport) {
        for action in self.take_actions() {
            match action {
                OutboundAction::Send(client, msg) => {
                    if let Err(e) = transport.send(client, &msg) {
                        warn!("send to {} failed: {}", client, e);
                    }
                }
                OutboundAction::Close(client) => {
                    transport.close_client_connection(client, self);
                }
            }
        }
    }
}

impl ServerHandler for EchoServer {
    fn on_client_connected(&mut self, client: ClientHandle, addr: SocketAddr) {
        info!("{} connected from {}", client, addr);
    }

    fn on_message(&mut self, client: ClientHandle, payload: &[u8]) {
        debug!("echoing {} bytes to {}", payload.len(), client);
        self.outbox
            .push(OutboundAction::Send(client, Message::Opaque(payload.to_vec())));
    }

    fn on_new_client(&mut self, client: ClientHandle, info: RegistrationInfo) {
        if info.product_user_id.is_empty() || info.connect_id_token.is_empty() {
            warn!("{} sent incomplete credentials, removing", client);
            let kick = ClientActionRequired {
                action: ClientAction::RemovePlayer,
                reason: ActionReason::AuthenticationFailed,
                details: "missing product user id or token".into(),
            };
            self.outbox.push(OutboundAction::Send(client, kick.into()));
            self.outbox.push(OutboundAction::Close(client));
            return;
        }
        info!(
            "{} registered as {} ({:?})",
            client, info.product_user_id, info.platform
        );
        self.registered.insert(client, info);
    }

    fn on_client_disconnected(&mut self, client: ClientHandle) {
        match self.registered.remove(&client) {
            Some(info) => info!("{} ({}) disconnected", client, info.product_user_id),
            None => info!("{} disconnected", client),
        }
        self.outbox.retain(|a| match a {
            OutboundAction::Send(c, _) | OutboundAction::Close(c) => *c != client,
        });
    }
}
