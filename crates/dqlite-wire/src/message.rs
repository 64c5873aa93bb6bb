//! Messages with a two-tier body buffer.
//!
//! A [`Message`] owns a primary buffer of fixed capacity, allocated once and
//! reused across [`Message::reset`] calls, and an overflow buffer that only
//! exists when a body does not fit in the primary one. Small requests and
//! responses never allocate; bulk payloads (e.g. database dumps) spill into
//! an overflow buffer sized to the excess.
//!
//! Writing and reading use separate cursors. The read cursor walks the
//! primary bytes and then the overflow bytes as one logical body.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{WireError, WireResult};
use crate::header::{HEADER_SIZE, Header, WORD_SIZE, padded};

/// A wire message: header plus body.
#[derive(Debug, Clone)]
pub struct Message {
    header: Header,
    primary: Box<[u8]>,
    /// Bytes of `primary` in use, written or received.
    primary_len: usize,
    overflow: Option<BytesMut>,
    read_offset: usize,
}

impl Message {
    /// Creates an empty message whose primary buffer holds `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            header: Header::default(),
            primary: vec![0u8; capacity].into_boxed_slice(),
            primary_len: 0,
            overflow: None,
            read_offset: 0,
        }
    }

    /// Returns the primary buffer capacity.
    pub fn capacity(&self) -> usize {
        self.primary.len()
    }

    /// Returns the header.
    pub fn header(&self) -> Header {
        self.header
    }

    /// Returns the message type.
    pub fn mtype(&self) -> u8 {
        self.header.mtype
    }

    /// Returns the number of body bytes in use across both buffers.
    pub fn body_len(&self) -> usize {
        self.primary_len + self.overflow.as_ref().map_or(0, BytesMut::len)
    }

    /// Returns true if the body spilled into the overflow buffer.
    pub fn has_overflow(&self) -> bool {
        self.overflow.is_some()
    }

    /// Clears header and cursors and drops the overflow buffer.
    ///
    /// The primary buffer keeps its capacity.
    pub fn reset(&mut self) {
        self.header = Header::default();
        self.primary_len = 0;
        self.overflow = None;
        self.read_offset = 0;
    }

    // ------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------

    /// Finishes encoding by writing the header for the current body.
    pub fn put_header(&mut self, mtype: u8, extra: u16) -> WireResult<()> {
        let size = self.body_len();
        debug_assert_eq!(size % WORD_SIZE, 0, "body must be word aligned");

        let words = u32::try_from(size / WORD_SIZE).map_err(|_| WireError::BodyTooLarge { size })?;
        self.header = Header {
            words,
            mtype,
            flags: 0,
            extra,
        };
        Ok(())
    }

    /// Appends a 64-bit unsigned integer.
    pub fn put_u64(&mut self, value: u64) {
        let mut slot = self.write_slot(WORD_SIZE);
        slot.put_u64_le(value);
    }

    /// Appends a 64-bit signed integer.
    pub fn put_i64(&mut self, value: i64) {
        let mut slot = self.write_slot(WORD_SIZE);
        slot.put_i64_le(value);
    }

    /// Appends a nul-terminated string, zero-padded to the word boundary.
    pub fn put_string(&mut self, value: &str) -> WireResult<()> {
        if value.as_bytes().contains(&0) {
            return Err(WireError::InteriorNul);
        }

        let slot = self.write_slot(padded(value.len() + 1));
        slot[..value.len()].copy_from_slice(value.as_bytes());
        Ok(())
    }

    /// Appends a length-prefixed blob, zero-padded to the word boundary.
    pub fn put_blob(&mut self, data: &[u8]) {
        self.put_u64(data.len() as u64);
        let slot = self.write_slot(padded(data.len()));
        slot[..data.len()].copy_from_slice(data);
    }

    /// Reserves `size` zeroed bytes at the end of the body.
    ///
    /// Once the overflow buffer exists every write goes there, so the
    /// primary bytes always precede the overflow bytes.
    fn write_slot(&mut self, size: usize) -> &mut [u8] {
        if self.overflow.is_none() && self.primary_len + size <= self.primary.len() {
            let start = self.primary_len;
            self.primary_len += size;
            let slot = &mut self.primary[start..start + size];
            slot.fill(0);
            return slot;
        }

        let hint = size.max(self.primary.len());
        let overflow = self
            .overflow
            .get_or_insert_with(|| BytesMut::with_capacity(hint));
        let start = overflow.len();
        overflow.resize(start + size, 0);
        &mut overflow[start..]
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Returns the encoded header.
    pub fn header_bytes(&self) -> [u8; HEADER_SIZE] {
        self.header.encode()
    }

    /// Returns the body bytes to send: primary, then overflow if present.
    pub fn body_parts(&self) -> (&[u8], Option<&[u8]>) {
        (&self.primary[..self.primary_len], self.overflow.as_deref())
    }

    /// Installs a received header and clears any previous body.
    pub fn set_received_header(&mut self, bytes: &[u8; HEADER_SIZE]) {
        self.reset();
        self.header = Header::decode(bytes);
    }

    /// Sizes the buffers for the body announced by the header and returns
    /// them for filling.
    ///
    /// The primary buffer takes as much as fits; the overflow buffer is
    /// allocated only for the excess, sized exactly to it.
    pub fn body_buffers(&mut self) -> (&mut [u8], Option<&mut [u8]>) {
        let needed = self.header.body_len();
        let first = needed.min(self.primary.len());

        self.primary_len = first;
        self.read_offset = 0;
        self.overflow = (needed > first).then(|| BytesMut::zeroed(needed - first));

        (&mut self.primary[..first], self.overflow.as_deref_mut())
    }

    // ------------------------------------------------------------------
    // Decoding
    // ------------------------------------------------------------------

    /// Returns the number of unread body bytes.
    pub fn remaining(&self) -> usize {
        self.body_len().saturating_sub(self.read_offset)
    }

    /// Reads a 64-bit unsigned integer.
    pub fn get_u64(&mut self) -> WireResult<u64> {
        let mut word = [0u8; WORD_SIZE];
        self.read_into(&mut word)?;
        Ok(u64::from_le_bytes(word))
    }

    /// Reads a 64-bit signed integer.
    pub fn get_i64(&mut self) -> WireResult<i64> {
        let mut word = [0u8; WORD_SIZE];
        self.read_into(&mut word)?;
        Ok(i64::from_le_bytes(word))
    }

    /// Reads a nul-terminated, word-padded string.
    pub fn get_string(&mut self) -> WireResult<String> {
        let len = self
            .unread_bytes()
            .position(|b| b == 0)
            .ok_or(WireError::UnterminatedString)?;

        let mut bytes = vec![0u8; len];
        self.read_into(&mut bytes)?;
        self.skip(padded(len + 1) - len)?;

        String::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8)
    }

    /// Reads a length-prefixed, word-padded blob.
    pub fn get_blob(&mut self) -> WireResult<Bytes> {
        let len = self.get_u64()?;
        let len = usize::try_from(len).map_err(|_| WireError::Truncated {
            needed: usize::MAX,
            available: self.remaining(),
        })?;
        self.check_remaining(len)?;

        let mut data = vec![0u8; len];
        self.read_into(&mut data)?;
        self.skip(padded(len) - len)?;

        Ok(Bytes::from(data))
    }

    fn segments(&self) -> (&[u8], &[u8]) {
        (
            &self.primary[..self.primary_len],
            self.overflow.as_deref().unwrap_or(&[]),
        )
    }

    fn unread_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        let (first, second) = self.segments();
        first
            .iter()
            .chain(second.iter())
            .copied()
            .skip(self.read_offset)
    }

    /// Copies the next `out.len()` bytes, crossing from primary to overflow
    /// when needed.
    fn read_into(&mut self, out: &mut [u8]) -> WireResult<()> {
        self.check_remaining(out.len())?;

        let (first, second) = self.segments();
        let mut copied = 0;
        if self.read_offset < first.len() {
            copied = out.len().min(first.len() - self.read_offset);
            out[..copied].copy_from_slice(&first[self.read_offset..self.read_offset + copied]);
        }
        if copied < out.len() {
            let start = self.read_offset + copied - first.len();
            let rest = out.len() - copied;
            out[copied..].copy_from_slice(&second[start..start + rest]);
        }

        self.read_offset += out.len();
        Ok(())
    }

    fn skip(&mut self, n: usize) -> WireResult<()> {
        self.check_remaining(n)?;
        self.read_offset += n;
        Ok(())
    }

    fn check_remaining(&self, needed: usize) -> WireResult<()> {
        let available = self.remaining();
        if needed > available {
            return Err(WireError::Truncated { needed, available });
        }
        Ok(())
    }
}
