//! Message transport: typed messages over the socket transport.
//!
//! Raw reads are appended to a per-connection [`acnet_core::FrameDecoder`]; every complete
//! frame is dispatched to the application handler, in wire order, before `update` returns.

mod client;
mod server;

pub use client::{ClientHandler, ClientTransport};
pub use server::{ServerHandler, ServerTransport};
