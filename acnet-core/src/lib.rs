//! acnet protocol core.
//! Sans-IO: message types, frame encoding and stream reassembly; sockets live in acnet-net.

pub mod decoder;
pub mod protocol;
pub mod wire;

pub use decoder::FrameDecoder;
pub use protocol::{
    ActionReason, ClientAction, ClientActionRequired, Message, MessageKind, Platform,
    ProtocolError, RegistrationInfo,
};
pub use wire::{
    decode_frame, decode_frame_ref, encode_frame, encode_frame_with_limit, max_payload_len,
    FrameDecodeError, FrameEncodeError, MessageRef, DEFAULT_MAX_FRAME_LEN, HEADER_LEN,
};
