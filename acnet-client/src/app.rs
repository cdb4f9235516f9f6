//! Sample client logic: register, heartbeat, react to server actions.

use acnet_core::{ClientAction, ClientActionRequired, Message};
use acnet_net::ClientHandler;
use tracing::{info, warn};

/// Ticks between opaque heartbeats.
pub const HEARTBEAT_TICKS: u64 = 100;

/// Why the tick loop should stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    Removed(ClientActionRequired),
    ServerGone,
}

#[derive(Default)]
pub struct GameClient {
    ticks: u64,
    echoes: u64,
    exit: Option<Exit>,
}

impl GameClient {
    pub fn exit(&self) -> Option<&Exit> {
        self.exit.as_ref()
    }

    pub fn echoes(&self) -> u64 {
        self.echoes
    }

    /// Advance one tick; returns the heartbeat to send, if one is due.
    pub fn tick(&mut self) -> Option<Message> {
        self.ticks += 1;
        if self.ticks % HEARTBEAT_TICKS != 0 {
            return None;
        }
        let beat = self.ticks / HEARTBEAT_TICKS;
        Some(Message::Opaque(format!("heartbeat {}", beat).into_bytes()))
    }
}

impl ClientHandler for GameClient {
    fn on_message(&mut self, payload: &[u8]) {
        self.echoes += 1;
        info!("echo: {}", String::from_utf8_lossy(payload));
    }

    fn on_client_action_required(&mut self, info: ClientActionRequired) {
        match info.action {
            ClientAction::RemovePlayer => {
                warn!("removed by server: {:?} ({})", info.reason, info.details);
                self.exit = Some(Exit::Removed(info));
            }
            ClientAction::Invalid => warn!("ignoring invalid action request"),
        }
    }

    fn on_disconnected(&mut self) {
        if self.exit.is_none() {
            self.exit = Some(Exit::ServerGone);
        }
    }
}
