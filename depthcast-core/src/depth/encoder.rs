//! Frame → wire packet.
//!
//! Two payload layouts are supported: a projected point cloud, or the raw
//! depth map for the receiver to project. Either may be zstd-compressed.

use bytes::{BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::depth::pointcloud::PointCloud;
use crate::depth::types::DepthFrame;
use crate::error::StreamError;
use crate::flags::PayloadFlags;
use crate::header::MessageHeader;
use crate::message::PayloadKind;
use crate::packet::Packet;

/// What the sender puts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadMode {
    /// Projected XYZ points.
    #[default]
    Points,
    /// Raw depth values; the receiver projects them.
    Depth,
}

/// Serialises frames into [`Packet`]s.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    compress: bool,
    level: i32,
}

impl FrameEncoder {
    pub fn new(compress: bool, level: i32) -> Self {
        Self { compress, level }
    }

    /// Encode a projected cloud. Size and timing come from `frame`.
    pub fn encode_points(
        &self,
        frame: &DepthFrame,
        cloud: &PointCloud,
    ) -> Result<Packet, StreamError> {
        let colors = cloud.colors();
        let mut buf = BytesMut::with_capacity(cloud.len() * 15);
        for &[x, y, z] in cloud.points() {
            buf.put_f32_le(x);
            buf.put_f32_le(y);
            buf.put_f32_le(z);
        }
        if let Some(colors) = colors {
            for rgb in colors {
                buf.put_slice(rgb);
            }
        }

        let mut header = self.header(PayloadKind::PointCloud, frame);
        header.count = cloud.len() as u32;
        if colors.is_some() {
            header.flags |= PayloadFlags::COLOR;
        }
        self.finish(header, buf)
    }

    /// Encode the raw depth map of `frame`.
    pub fn encode_depth(&self, frame: &DepthFrame) -> Result<Packet, StreamError> {
        let mut buf = BytesMut::with_capacity(frame.pixel_count() * 5);
        for &d in &frame.depth {
            buf.put_u16_le(d);
        }
        if let Some(color) = &frame.color {
            for rgb in color {
                buf.put_slice(rgb);
            }
        }

        let mut header = self.header(PayloadKind::DepthMap, frame);
        header.count = frame.pixel_count() as u32;
        if frame.color.is_some() {
            header.flags |= PayloadFlags::COLOR;
        }
        self.finish(header, buf)
    }

    fn header(&self, kind: PayloadKind, frame: &DepthFrame) -> MessageHeader {
        let mut header = MessageHeader::new(kind);
        header.frame_number = frame.frame_number;
        header.timestamp_us = frame.timestamp_us;
        header.width = frame.width;
        header.height = frame.height;
        header
    }

    fn finish(&self, mut header: MessageHeader, raw: BytesMut) -> Result<Packet, StreamError> {
        if !self.compress {
            return Packet::new(header, raw.freeze());
        }
        let compressed = zstd::encode_all(&raw[..], self.level)
            .map_err(|e| StreamError::Compression(e.to_string()))?;
        header.flags |= PayloadFlags::ZSTD;
        Packet::new(header, compressed)
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(true, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DepthFrame {
        DepthFrame::new(4, 2, vec![600, 700, 0, 2047, 800, 900, 1000, 650])
            .unwrap()
            .with_frame_number(9)
    }

    #[test]
    fn point_payload_layout() {
        let cloud = PointCloud::new(vec![[1.0, 2.0, 3.0]]);
        let pkt = FrameEncoder::new(false, 0)
            .encode_points(&frame(), &cloud)
            .unwrap();
        assert_eq!(pkt.kind(), PayloadKind::PointCloud);
        assert_eq!(pkt.header().count, 1);
        assert_eq!(pkt.frame_number(), 9);
        assert!(pkt.flags().is_empty());
        assert_eq!(&pkt.payload()[..4], &1.0f32.to_le_bytes());
        assert_eq!(pkt.payload().len(), 12);
    }

    #[test]
    fn color_sets_flag() {
        let cloud = PointCloud::with_colors(vec![[0.0; 3]], vec![[1, 2, 3]]).unwrap();
        let pkt = FrameEncoder::new(false, 0)
            .encode_points(&frame(), &cloud)
            .unwrap();
        assert!(pkt.flags().contains(PayloadFlags::COLOR));
        assert_eq!(&pkt.payload()[12..], &[1, 2, 3]);
    }

    #[test]
    fn depth_payload_layout() {
        let pkt = FrameEncoder::new(false, 0).encode_depth(&frame()).unwrap();
        assert_eq!(pkt.kind(), PayloadKind::DepthMap);
        assert_eq!(pkt.header().count, 8);
        assert_eq!((pkt.header().width, pkt.header().height), (4, 2));
        assert_eq!(&pkt.payload()[..2], &600u16.to_le_bytes());
    }

    #[test]
    fn compression_sets_flag() {
        let pkt = FrameEncoder::new(true, 3).encode_depth(&frame()).unwrap();
        assert!(pkt.flags().contains(PayloadFlags::ZSTD));
        pkt.validate().unwrap();
    }
}
