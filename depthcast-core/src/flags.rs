//! Per-message payload flags.

use bitflags::bitflags;

use crate::error::StreamError;

bitflags! {
    /// Bit set carried in byte 5 of every message header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PayloadFlags: u8 {
        /// The payload is a zstd frame and must be decompressed first.
        const ZSTD = 0x01;
        /// Per-point RGB triples follow the positions / depth values.
        const COLOR = 0x02;
    }
}

impl TryFrom<u8> for PayloadFlags {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        PayloadFlags::from_bits(value).ok_or(StreamError::UnknownVariant {
            type_name: "PayloadFlags",
            value: value as u64,
        })
    }
}
