use std::io;

use acnet_core::FrameEncodeError;

/// Error from a transport operation that the caller initiated.
///
/// Failures detected during `update` never surface here; they close the affected
/// connection and are reported through the handler's disconnect callback.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("already connected")]
    AlreadyConnected,
    #[error("server socket already open")]
    AlreadyOpen,
    #[error("could not resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("no address found for {0}")]
    NoAddress(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("encode error: {0}")]
    Encode(#[from] FrameEncodeError),
}
