//! acnet transports for a game client and its dedicated server.
//! Single-threaded and polled: the host calls `update` once per tick; nothing runs in the background.

pub mod config;
pub mod error;
pub mod handle;
pub mod socket;
pub mod transport;

pub use config::TransportConfig;
pub use error::TransportError;
pub use handle::ClientHandle;
pub use socket::{ReadControl, SocketClient, SocketServer};
pub use transport::{ClientHandler, ClientTransport, ServerHandler, ServerTransport};

#[cfg(test)]
pub(crate) mod testutil {
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    pub fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    /// Call `tick` until it returns true; panics after a few seconds.
    pub fn pump(mut tick: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !tick() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
