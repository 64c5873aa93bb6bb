//! Fixed-size message header.
//!
//! Every message starts with an 8-byte header:
//!
//! ```text
//! ┌──────────────┬────────┬────────┬──────────┐
//! │  Word count  │  Type  │ Flags  │  Extra   │
//! │  (4 B, LE)   │ (1 B)  │ (1 B)  │ (2 B, LE)│
//! └──────────────┴────────┴────────┴──────────┘
//! ```
//!
//! The word count is the body length in 8-byte words.

use bytes::{Buf, BufMut};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 8;

/// Size of a body word in bytes. All body content is aligned to this.
pub const WORD_SIZE: usize = 8;

/// Protocol version sent by the client handshake.
pub const PROTOCOL_VERSION_LEGACY: u64 = 0x8610_4dd7_6043_3fe5;

/// Decoded message header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    /// Body length in words.
    pub words: u32,
    /// Message type code.
    pub mtype: u8,
    /// Reserved.
    pub flags: u8,
    /// Message-type-specific value.
    pub extra: u16,
}

impl Header {
    /// Encodes the header to its wire representation.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        let mut buf = &mut bytes[..];
        buf.put_u32_le(self.words);
        buf.put_u8(self.mtype);
        buf.put_u8(self.flags);
        buf.put_u16_le(self.extra);
        bytes
    }

    /// Decodes a header from its wire representation.
    pub fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut buf = &bytes[..];
        Self {
            words: buf.get_u32_le(),
            mtype: buf.get_u8(),
            flags: buf.get_u8(),
            extra: buf.get_u16_le(),
        }
    }

    /// Returns the body length in bytes.
    pub fn body_len(&self) -> usize {
        self.words as usize * WORD_SIZE
    }
}

/// Rounds `len` up to the next word boundary.
pub(crate) fn padded(len: usize) -> usize {
    len.div_ceil(WORD_SIZE) * WORD_SIZE
}
