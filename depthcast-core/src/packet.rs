use bytes::Bytes;

use crate::error::StreamError;
use crate::flags::PayloadFlags;
use crate::header::{HEADER_SIZE, MessageHeader};
use crate::message::PayloadKind;

/// Largest payload a single message may carry (64 MiB).
///
/// An uncompressed 640×480 colored cloud is ~4.3 MiB, so this leaves room
/// for higher sensor resolutions while bounding what a peer can make us
/// buffer.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Largest complete message (header + payload).
pub const MAX_FRAME_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// One wire message: exactly one captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: MessageHeader,
    payload: Bytes,
}

impl Packet {
    /// Build a packet, filling in `payload_length` and `checksum`.
    pub fn new(mut header: MessageHeader, payload: impl Into<Bytes>) -> Result<Self, StreamError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(StreamError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        header.payload_length = payload.len() as u32;
        header.checksum = checksum(&payload);
        Ok(Self { header, payload })
    }

    /// Reassemble a packet that arrived off the wire.
    ///
    /// The header is trusted as-is; call [`validate`](Self::validate) to
    /// check the payload against it.
    pub(crate) fn from_parts(header: MessageHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn kind(&self) -> PayloadKind {
        self.header.kind
    }

    pub fn flags(&self) -> PayloadFlags {
        self.header.flags
    }

    pub fn frame_number(&self) -> u64 {
        self.header.frame_number
    }

    /// Size of this packet on the wire.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Check the payload length and checksum against the header.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.header.payload_length as usize != self.payload.len() {
            return Err(StreamError::InvalidPayload(format!(
                "header announces {} payload bytes, got {}",
                self.header.payload_length,
                self.payload.len()
            )));
        }
        if checksum(&self.payload) != self.header.checksum {
            return Err(StreamError::ChecksumMismatch);
        }
        Ok(())
    }
}

/// First four bytes of the blake3 digest, little-endian.
fn checksum(payload: &[u8]) -> u32 {
    let digest = blake3::hash(payload);
    let bytes = digest.as_bytes();
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_sets_length_and_checksum() {
        let header = MessageHeader::new(PayloadKind::PointCloud);
        let pkt = Packet::new(header, vec![1u8, 2, 3, 4]).unwrap();
        assert_eq!(pkt.header().payload_length, 4);
        assert_ne!(pkt.header().checksum, 0);
        assert_eq!(pkt.encoded_len(), HEADER_SIZE + 4);
        assert!(pkt.validate().is_ok());
    }

    #[test]
    fn tampered_payload_fails_validation() {
        let header = MessageHeader::new(PayloadKind::DepthMap);
        let pkt = Packet::new(header, vec![9u8; 16]).unwrap();
        let tampered = Packet::from_parts(*pkt.header(), Bytes::from(vec![8u8; 16]));
        assert!(matches!(
            tampered.validate(),
            Err(StreamError::ChecksumMismatch)
        ));
    }

    #[test]
    fn oversized_payload_rejected() {
        let header = MessageHeader::new(PayloadKind::PointCloud);
        let err = Packet::new(header, vec![0u8; MAX_PAYLOAD_SIZE + 1]).unwrap_err();
        assert!(matches!(err, StreamError::PayloadTooLarge { .. }));
    }
}
