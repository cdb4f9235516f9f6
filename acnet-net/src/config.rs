//! Transport tuning, embeddable as a `[transport]` table in the binaries' config files.

use std::time::Duration;

use serde::Deserialize;

/// Buffer sizes, connection limits and socket timeouts for both transport roles.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Bytes read per socket per tick (default 4096).
    #[serde(default = "default_buffer_size")]
    pub recv_buffer_size: usize,
    /// Upper bound on one encoded frame, header included (default 4096).
    #[serde(default = "default_buffer_size")]
    pub send_buffer_size: usize,
    /// Server only: accepted connections beyond this are dropped (default 64).
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Write timeout for a synchronous send, 0 = none (default 1000).
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Client only: TCP connect timeout, 0 = OS default (default 5000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_buffer_size() -> usize {
    acnet_core::DEFAULT_MAX_FRAME_LEN
}
fn default_max_clients() -> usize {
    64
}
fn default_send_timeout_ms() -> u64 {
    1000
}
fn default_connect_timeout_ms() -> u64 {
    5000
}

impl TransportConfig {
    pub fn send_timeout(&self) -> Option<Duration> {
        match self.send_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.connect_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// A zero-length read buffer would look like a closed peer.
    pub(crate) fn effective_recv_buffer_size(&self) -> usize {
        self.recv_buffer_size.max(1)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: default_buffer_size(),
            send_buffer_size: default_buffer_size(),
            max_clients: default_max_clients(),
            send_timeout_ms: default_send_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}
