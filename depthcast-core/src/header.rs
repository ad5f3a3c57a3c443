//! Fixed-size message header.
//!
//! ## Wire format (44 bytes, little-endian)
//!
//! ```text
//! magic:          [u8; 4]  "DPC1"
//! kind:           u8       PayloadKind
//! flags:          u8       PayloadFlags
//! reserved:       u16      must be zero
//! checksum:       u32      first 4 bytes of blake3(payload)
//! frame_number:   u64
//! timestamp_us:   u64      capture time, µs since the UNIX epoch
//! width:          u32      source frame width
//! height:         u32      source frame height
//! count:          u32      points (PointCloud) or pixels (DepthMap)
//! payload_length: u32      bytes that follow the header
//! ```

use bytes::{Buf, BufMut};

use crate::error::StreamError;
use crate::flags::PayloadFlags;
use crate::message::PayloadKind;

/// Magic bytes at the start of every message.
pub const MAGIC: [u8; 4] = *b"DPC1";

/// Encoded size of [`MessageHeader`].
pub const HEADER_SIZE: usize = 44;

/// Metadata that precedes every payload on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub kind: PayloadKind,
    pub flags: PayloadFlags,
    pub checksum: u32,
    pub frame_number: u64,
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    pub count: u32,
    pub payload_length: u32,
}

impl MessageHeader {
    /// A header for `kind` with everything else zeroed.
    ///
    /// `checksum` and `payload_length` are filled in by
    /// [`Packet::new`](crate::packet::Packet::new).
    pub fn new(kind: PayloadKind) -> Self {
        Self {
            kind,
            flags: PayloadFlags::empty(),
            checksum: 0,
            frame_number: 0,
            timestamp_us: 0,
            width: 0,
            height: 0,
            count: 0,
            payload_length: 0,
        }
    }

    /// Serialize to bytes.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut out = &mut buf[..];
        out.put_slice(&MAGIC);
        out.put_u8(self.kind as u8);
        out.put_u8(self.flags.bits());
        out.put_u16_le(0);
        out.put_u32_le(self.checksum);
        out.put_u64_le(self.frame_number);
        out.put_u64_le(self.timestamp_us);
        out.put_u32_le(self.width);
        out.put_u32_le(self.height);
        out.put_u32_le(self.count);
        out.put_u32_le(self.payload_length);
        buf
    }

    /// Deserialize from the first [`HEADER_SIZE`] bytes of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        if data.len() < HEADER_SIZE {
            return Err(StreamError::InvalidHeader("header too short"));
        }
        if data[0..4] != MAGIC {
            return Err(StreamError::InvalidMagic);
        }

        let mut buf = &data[4..HEADER_SIZE];
        let kind = PayloadKind::try_from(buf.get_u8())?;
        let flags = PayloadFlags::try_from(buf.get_u8())?;
        if buf.get_u16_le() != 0 {
            return Err(StreamError::InvalidHeader("reserved bytes must be zero"));
        }

        Ok(Self {
            kind,
            flags,
            checksum: buf.get_u32_le(),
            frame_number: buf.get_u64_le(),
            timestamp_us: buf.get_u64_le(),
            width: buf.get_u32_le(),
            height: buf.get_u32_le(),
            count: buf.get_u32_le(),
            payload_length: buf.get_u32_le(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
