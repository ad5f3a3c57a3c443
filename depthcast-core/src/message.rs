//! Payload kinds carried by depthcast messages.
//!
//! Uses a proper enum with `TryFrom`, so unknown values are an error rather
//! than a panic.

use std::fmt;

use crate::error::StreamError;

/// What the payload of a message describes.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// Projected point positions (`f32` xyz triples).
    PointCloud = 0x01,
    /// The raw depth map (`u16` per pixel); the receiver projects it.
    DepthMap = 0x02,
}

impl TryFrom<u8> for PayloadKind {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(PayloadKind::PointCloud),
            0x02 => Ok(PayloadKind::DepthMap),
            _ => Err(StreamError::UnknownVariant {
                type_name: "PayloadKind",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadKind::PointCloud => write!(f, "PointCloud"),
            PayloadKind::DepthMap => write!(f, "DepthMap"),
        }
    }
}
