//! Framing: 1-byte kind tag + 4 bytes LE payload length + payload.
//!
//! Payload layouts:
//! - Opaque: raw bytes.
//! - RegistrationInfo: `{id}\0{token}\0{u32 platform}`.
//! - ClientActionRequired: `{u32 action}{u32 reason}{details}\0`.

use crate::protocol::{
    ActionReason, ClientAction, ClientActionRequired, Message, MessageKind, Platform,
    ProtocolError, RegistrationInfo,
};

/// Tag (1) + length (4).
pub const HEADER_LEN: usize = 5;

/// Default bound on a whole frame (header + payload), matching the 4 KiB staging buffer.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// Largest payload that fits in a frame bounded by `max_frame_len`.
pub fn max_payload_len(max_frame_len: usize) -> usize {
    max_frame_len.saturating_sub(HEADER_LEN)
}

/// A decoded message whose opaque payload borrows from the receive buffer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MessageRef<'a> {
    Opaque(&'a [u8]),
    RegistrationInfo(RegistrationInfo),
    ClientActionRequired(ClientActionRequired),
}

impl MessageRef<'_> {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageRef::Opaque(_) => MessageKind::Opaque,
            MessageRef::RegistrationInfo(_) => MessageKind::RegistrationInfo,
            MessageRef::ClientActionRequired(_) => MessageKind::ClientActionRequired,
        }
    }

    pub fn into_owned(self) -> Message {
        match self {
            MessageRef::Opaque(p) => Message::Opaque(p.to_vec()),
            MessageRef::RegistrationInfo(info) => Message::RegistrationInfo(info),
            MessageRef::ClientActionRequired(info) => Message::ClientActionRequired(info),
        }
    }
}

/// Encode a message into a single frame bounded by [`DEFAULT_MAX_FRAME_LEN`].
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, FrameEncodeError> {
    encode_frame_with_limit(msg, DEFAULT_MAX_FRAME_LEN)
}

/// Encode a message into a single frame. Fails before producing any bytes if the
/// frame would exceed `max_frame_len`.
pub fn encode_frame_with_limit(
    msg: &Message,
    max_frame_len: usize,
) -> Result<Vec<u8>, FrameEncodeError> {
    let payload_len = payload_len(msg)?;
    let frame_len = HEADER_LEN + payload_len;
    if frame_len > max_frame_len {
        return Err(FrameEncodeError::TooLarge {
            len: frame_len,
            max: max_frame_len,
        });
    }
    let len = u32::try_from(payload_len).map_err(|_| FrameEncodeError::TooLarge {
        len: frame_len,
        max: max_frame_len,
    })?;

    let mut out = Vec::with_capacity(frame_len);
    out.push(msg.kind().tag());
    out.extend_from_slice(&len.to_le_bytes());
    match msg {
        Message::Opaque(payload) => out.extend_from_slice(payload),
        Message::RegistrationInfo(info) => {
            put_cstr(&mut out, &info.product_user_id);
            put_cstr(&mut out, &info.connect_id_token);
            out.extend_from_slice(&info.platform.as_u32().to_le_bytes());
        }
        Message::ClientActionRequired(info) => {
            out.extend_from_slice(&info.action.as_u32().to_le_bytes());
            out.extend_from_slice(&info.reason.as_u32().to_le_bytes());
            put_cstr(&mut out, &info.details);
        }
    }
    debug_assert_eq!(out.len(), frame_len);
    Ok(out)
}

/// Payload size of `msg`, validating string fields on the way.
fn payload_len(msg: &Message) -> Result<usize, FrameEncodeError> {
    let len = match msg {
        Message::Opaque(payload) => payload.len(),
        Message::RegistrationInfo(info) => {
            cstr_len(&info.product_user_id)? + cstr_len(&info.connect_id_token)? + 4
        }
        Message::ClientActionRequired(info) => 8 + cstr_len(&info.details)?,
    };
    Ok(len)
}

fn cstr_len(s: &str) -> Result<usize, FrameEncodeError> {
    if s.as_bytes().contains(&0) {
        return Err(FrameEncodeError::InteriorNul);
    }
    Ok(s.len() + 1)
}

fn put_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Error encoding a message into a frame.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("frame of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },
    #[error("string field contains an interior NUL byte")]
    InteriorNul,
}

/// Decode one frame from the front of `bytes` into an owned message.
/// Returns the message and the number of bytes consumed.
pub fn decode_frame(bytes: &[u8]) -> Result<(Message, usize), FrameDecodeError> {
    let (msg, n) = decode_frame_ref(bytes, DEFAULT_MAX_FRAME_LEN)?;
    Ok((msg.into_owned(), n))
}

/// Decode one frame from the front of `bytes` without copying an opaque payload.
/// Returns `NeedMore` while the frame is incomplete; caller retries with more data.
pub fn decode_frame_ref(
    bytes: &[u8],
    max_frame_len: usize,
) -> Result<(MessageRef<'_>, usize), FrameDecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(FrameDecodeError::NeedMore);
    }
    let tag = bytes[0];
    let kind = MessageKind::from_tag(tag).ok_or(FrameDecodeError::UnknownKind(tag))?;
    let len = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
    let frame_len = HEADER_LEN.saturating_add(len);
    if frame_len > max_frame_len {
        return Err(FrameDecodeError::TooLarge {
            len: frame_len,
            max: max_frame_len,
        });
    }
    if bytes.len() < frame_len {
        return Err(FrameDecodeError::NeedMore);
    }
    let payload = &bytes[HEADER_LEN..frame_len];
    let msg = decode_payload(kind, payload).map_err(|source| FrameDecodeError::Payload {
        kind,
        source,
    })?;
    Ok((msg, frame_len))
}

fn decode_payload(kind: MessageKind, payload: &[u8]) -> Result<MessageRef<'_>, ProtocolError> {
    let mut r = PayloadReader::new(payload);
    let msg = match kind {
        MessageKind::Opaque => return Ok(MessageRef::Opaque(payload)),
        MessageKind::RegistrationInfo => {
            let product_user_id = r.cstr()?;
            let connect_id_token = r.cstr()?;
            let platform = Platform::try_from(r.u32()?)?;
            MessageRef::RegistrationInfo(RegistrationInfo {
                product_user_id,
                connect_id_token,
                platform,
            })
        }
        MessageKind::ClientActionRequired => {
            let action = ClientAction::try_from(r.u32()?)?;
            let reason = ActionReason::try_from(r.u32()?)?;
            let details = r.cstr()?;
            MessageRef::ClientActionRequired(ClientActionRequired {
                action,
                reason,
                details,
            })
        }
    };
    r.finish()?;
    Ok(msg)
}

/// Cursor over a fixed-layout payload.
struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn u32(&mut self) -> Result<u32, ProtocolError> {
        let rest = self.remaining();
        if rest.len() < 4 {
            return Err(ProtocolError::Truncated {
                need: 4,
                have: rest.len(),
            });
        }
        self.pos += 4;
        Ok(u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]))
    }

    fn cstr(&mut self) -> Result<String, ProtocolError> {
        let rest = self.remaining();
        let end = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::MissingNul)?;
        let s = std::str::from_utf8(&rest[..end]).map_err(|_| ProtocolError::InvalidUtf8)?;
        self.pos += end + 1;
        Ok(s.to_owned())
    }

    fn finish(&self) -> Result<(), ProtocolError> {
        match self.remaining().len() {
            0 => Ok(()),
            n => Err(ProtocolError::TrailingBytes(n)),
        }
    }
}

/// Error decoding a frame (need more bytes, bad header, or bad payload).
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("unknown message kind {0}")]
    UnknownKind(u8),
    #[error("frame of {len} bytes exceeds limit of {max}")]
    TooLarge { len: usize, max: usize },
    #[error("malformed {kind:?} payload: {source}")]
    Payload {
        kind: MessageKind,
        #[source]
        source: ProtocolError,
    },
}
