//! Wire packet → point cloud.

use bytes::Buf;

use crate::depth::pointcloud::PointCloud;
use crate::depth::projection::{ProjectionConfig, Projector};
use crate::depth::types::DepthFrame;
use crate::error::StreamError;
use crate::flags::PayloadFlags;
use crate::message::PayloadKind;
use crate::packet::{MAX_PAYLOAD_SIZE, Packet};

/// A decoded message, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub frame_number: u64,
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    pub cloud: PointCloud,
}

/// Turns packets back into point clouds, projecting depth maps locally.
#[derive(Debug, Clone, Default)]
pub struct PacketDecoder {
    projector: Projector,
}

impl PacketDecoder {
    pub fn new(projection: ProjectionConfig) -> Self {
        Self {
            projector: Projector::new(projection),
        }
    }

    pub fn decode(&self, packet: &Packet) -> Result<DecodedFrame, StreamError> {
        let header = packet.header();
        let count = header.count as usize;
        let color = header.flags.contains(PayloadFlags::COLOR);

        let element = match header.kind {
            PayloadKind::PointCloud => 12,
            PayloadKind::DepthMap => 2,
        };
        let expected = count.saturating_mul(element + if color { 3 } else { 0 });
        if expected > MAX_PAYLOAD_SIZE {
            return Err(StreamError::PayloadTooLarge {
                size: expected,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let decompressed;
        let payload: &[u8] = if header.flags.contains(PayloadFlags::ZSTD) {
            decompressed = zstd::bulk::decompress(packet.payload(), expected)
                .map_err(|e| StreamError::Compression(e.to_string()))?;
            &decompressed
        } else {
            packet.payload()
        };

        if payload.len() != expected {
            return Err(StreamError::InvalidPayload(format!(
                "{} payload of {count} elements needs {expected} bytes, got {}",
                header.kind,
                payload.len()
            )));
        }

        let mut buf = payload;
        let cloud = match header.kind {
            PayloadKind::PointCloud => {
                let points = (0..count)
                    .map(|_| [buf.get_f32_le(), buf.get_f32_le(), buf.get_f32_le()])
                    .collect();
                if color {
                    PointCloud::with_colors(points, read_colors(buf, count))?
                } else {
                    PointCloud::new(points)
                }
            }
            PayloadKind::DepthMap => {
                if header.width as usize * header.height as usize != count {
                    return Err(StreamError::InvalidPayload(format!(
                        "depth map {}x{} does not hold {count} pixels",
                        header.width, header.height
                    )));
                }
                let depth = (0..count).map(|_| buf.get_u16_le()).collect();
                let mut frame = DepthFrame::new(header.width, header.height, depth)?;
                if color {
                    frame = frame.with_color(read_colors(buf, count))?;
                }
                self.projector.project(&frame)
            }
        };

        Ok(DecodedFrame {
            frame_number: header.frame_number,
            timestamp_us: header.timestamp_us,
            width: header.width,
            height: header.height,
            cloud,
        })
    }
}

fn read_colors(buf: &[u8], count: usize) -> Vec<[u8; 3]> {
    buf.chunks_exact(3)
        .take(count)
        .map(|c| [c[0], c[1], c[2]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::encoder::FrameEncoder;
    use crate::header::MessageHeader;

    fn frame() -> DepthFrame {
        DepthFrame::new(4, 2, vec![600, 700, 0, 2047, 800, 900, 1000, 650])
            .unwrap()
            .with_frame_number(3)
    }

    #[test]
    fn points_survive_encoding() {
        let projector = Projector::default();
        let source = frame();
        let cloud = projector.project(&source);

        for compress in [false, true] {
            let pkt = FrameEncoder::new(compress, 3)
                .encode_points(&source, &cloud)
                .unwrap();
            let decoded = PacketDecoder::default().decode(&pkt).unwrap();
            assert_eq!(decoded.frame_number, 3);
            assert_eq!(decoded.cloud.len(), cloud.len());
            for (a, b) in decoded.cloud.points().iter().zip(cloud.points()) {
                for axis in 0..3 {
                    assert!((a[axis] - b[axis]).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn depth_map_is_projected_on_receipt() {
        let source = frame().with_color(vec![[9, 9, 9]; 8]).unwrap();
        let pkt = FrameEncoder::default().encode_depth(&source).unwrap();
        let decoded = PacketDecoder::default().decode(&pkt).unwrap();
        let local = Projector::default().project(&source);
        assert_eq!(decoded.cloud, local);
        assert_eq!(decoded.cloud.colors().unwrap().len(), decoded.cloud.len());
    }

    #[test]
    fn empty_cloud_decodes() {
        let source = DepthFrame::new(2, 2, vec![0; 4]).unwrap();
        let cloud = Projector::default().project(&source);
        let pkt = FrameEncoder::default().encode_points(&source, &cloud).unwrap();
        let decoded = PacketDecoder::default().decode(&pkt).unwrap();
        assert!(decoded.cloud.is_empty());
    }

    #[test]
    fn count_mismatch_rejected() {
        let mut header = MessageHeader::new(PayloadKind::PointCloud);
        header.count = 2;
        let pkt = Packet::new(header, vec![0u8; 12]).unwrap();
        assert!(matches!(
            PacketDecoder::default().decode(&pkt),
            Err(StreamError::InvalidPayload(_))
        ));
    }

    #[test]
    fn decompression_bomb_rejected() {
        let mut header = MessageHeader::new(PayloadKind::PointCloud);
        header.count = 1;
        header.flags = PayloadFlags::ZSTD;
        let big = zstd::encode_all(&[0u8; 4096][..], 3).unwrap();
        let pkt = Packet::new(header, big).unwrap();
        assert!(PacketDecoder::default().decode(&pkt).is_err());
    }

    #[test]
    fn depth_dimensions_must_match_count() {
        let mut header = MessageHeader::new(PayloadKind::DepthMap);
        header.count = 2;
        header.width = 3;
        header.height = 1;
        let pkt = Packet::new(header, vec![0u8; 4]).unwrap();
        assert!(PacketDecoder::default().decode(&pkt).is_err());
    }
}
