use std::io::{self, Read};

use byteorder::ReadBytesExt;

/// Codec identifier for AVC/H.264 in the video tag flags byte.
pub const CODEC_AVC: u8 = 7;

/// AVC packet type carried in the second byte of an AVC video tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    SequenceHeader = 0,
    Nalu = 1,
    EndOfSequence = 2,
}

impl AvcPacketType {
    pub fn new(value: u8) -> Option<Self> {
        match value {
            0 => Some(AvcPacketType::SequenceHeader),
            1 => Some(AvcPacketType::Nalu),
            2 => Some(AvcPacketType::EndOfSequence),
            _ => None,
        }
    }
}

/// Parsed prefix of a video tag payload: the flags byte plus, for AVC,
/// the packet type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoPrefix {
    pub frame_type: u8,
    pub codec_id: u8,
    pub avc_packet_type: Option<AvcPacketType>,
    /// Payload bytes consumed by the prefix (1 or 2).
    pub prefix_size: u32,
}

impl VideoPrefix {
    pub fn read_from<R: Read>(reader: &mut R, data_size: u32) -> io::Result<Self> {
        let flags = reader.read_u8()?;
        let codec_id = flags & 0x0F;

        let mut prefix = VideoPrefix {
            frame_type: flags >> 4,
            codec_id,
            avc_packet_type: None,
            prefix_size: 1,
        };
        if codec_id == CODEC_AVC && data_size >= 2 {
            prefix.avc_packet_type = AvcPacketType::new(reader.read_u8()?);
            prefix.prefix_size = 2;
        }
        Ok(prefix)
    }

    pub fn is_sequence_header(&self) -> bool {
        self.avc_packet_type == Some(AvcPacketType::SequenceHeader)
    }
}
