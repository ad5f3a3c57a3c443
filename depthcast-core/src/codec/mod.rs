//! Length-framed codec for [`Packet`]s over a byte stream.
//!
//! The header carries the payload length, so a message is only yielded once
//! all of its bytes have arrived. Back-to-back messages in one read, or one
//! message spread over many reads, always decode to whole packets in order.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::StreamError;
use crate::header::{HEADER_SIZE, MessageHeader};
use crate::packet::{MAX_PAYLOAD_SIZE, Packet};

/// `tokio_util` codec for depthcast messages.
#[derive(Debug, Clone)]
pub struct DepthCodec {
    max_payload: usize,
}

impl DepthCodec {
    /// A codec that rejects payloads larger than `max_payload` bytes.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.min(MAX_PAYLOAD_SIZE),
        }
    }
}

impl Default for DepthCodec {
    fn default() -> Self {
        Self {
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }
}

impl Decoder for DepthCodec {
    type Item = Packet;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_SIZE {
            src.reserve(HEADER_SIZE - src.len());
            return Ok(None);
        }

        let header = MessageHeader::decode(&src[..HEADER_SIZE])?;
        let payload_len = header.payload_length as usize;

        // Reject before buffering anything the peer announces.
        if payload_len > self.max_payload {
            return Err(StreamError::PayloadTooLarge {
                size: payload_len,
                max: self.max_payload,
            });
        }

        let total = HEADER_SIZE + payload_len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let _ = src.split_to(HEADER_SIZE);
        let payload = src.split_to(payload_len).freeze();
        let packet = Packet::from_parts(header, payload);
        packet.validate()?;

        Ok(Some(packet))
    }
}

impl Encoder<Packet> for DepthCodec {
    type Error = StreamError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload().len() > self.max_payload {
            return Err(StreamError::PayloadTooLarge {
                size: item.payload().len(),
                max: self.max_payload,
            });
        }

        dst.reserve(item.encoded_len());
        dst.put_slice(&item.header().encode());
        dst.put_slice(item.payload());
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
