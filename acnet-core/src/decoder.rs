//! Stream reassembly: accumulate raw reads, yield whole frames.

use crate::wire::{decode_frame_ref, FrameDecodeError, MessageRef, DEFAULT_MAX_FRAME_LEN};

/// Incremental frame decoder for one connection.
///
/// Bytes from each read are appended with [`FrameDecoder::feed`]; complete frames are
/// pulled with [`FrameDecoder::next_frame`]. A frame split across reads stays buffered
/// until its last byte arrives.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Start of the first unconsumed byte in `buf`.
    pos: usize,
    max_frame_len: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            max_frame_len,
        }
    }

    /// Append received bytes. Consumed bytes from earlier frames are dropped first.
    pub fn feed(&mut self, bytes: &[u8]) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(bytes);
    }

    /// Decode the next complete frame, or `Ok(None)` if more bytes are needed.
    ///
    /// An opaque payload borrows from the decoder and is valid until the next call.
    /// On error the buffered bytes are skipped; the stream cannot be resynchronized
    /// and the caller should close the connection.
    pub fn next_frame(&mut self) -> Result<Option<MessageRef<'_>>, FrameDecodeError> {
        let start = self.pos;
        match decode_frame_ref(&self.buf[start..], self.max_frame_len) {
            Ok((msg, consumed)) => {
                self.pos = start + consumed;
                Ok(Some(msg))
            }
            Err(FrameDecodeError::NeedMore) => Ok(None),
            Err(e) => {
                // Skip everything buffered; `feed` compacts it away.
                self.pos = self.buf.len();
                Err(e)
            }
        }
    }

    /// Bytes of an incomplete frame waiting for the next read.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn has_partial(&self) -> bool {
        self.buffered() > 0
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
