use std::io::{self, Read};

use byteorder::ReadBytesExt;

/// Sound format identifier for AAC in the audio tag flags byte.
pub const SOUND_FORMAT_AAC: u8 = 10;

/// AAC packet type carried in the second byte of an AAC audio tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    SequenceHeader = 0,
    Raw = 1,
}

impl AacPacketType {
    pub fn new(value: u8) -> Option<Self> {
        match value {
            0 => Some(AacPacketType::SequenceHeader),
            1 => Some(AacPacketType::Raw),
            _ => None,
        }
    }
}

/// Parsed prefix of an audio tag payload: the flags byte plus, for AAC,
/// the packet type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPrefix {
    pub sound_format: u8,
    pub sound_rate: u8,
    pub sound_size: u8,
    pub sound_type: u8,
    pub aac_packet_type: Option<AacPacketType>,
    /// Payload bytes consumed by the prefix (1 or 2).
    pub prefix_size: u32,
}

impl AudioPrefix {
    pub fn read_from<R: Read>(reader: &mut R, data_size: u32) -> io::Result<Self> {
        let flags = reader.read_u8()?;
        let sound_format = flags >> 4;

        let mut prefix = AudioPrefix {
            sound_format,
            sound_rate: flags >> 2 & 0b11,
            sound_size: flags >> 1 & 1,
            sound_type: flags & 1,
            aac_packet_type: None,
            prefix_size: 1,
        };
        if sound_format == SOUND_FORMAT_AAC && data_size >= 2 {
            prefix.aac_packet_type = AacPacketType::new(reader.read_u8()?);
            prefix.prefix_size = 2;
        }
        Ok(prefix)
    }

    pub fn is_sequence_header(&self) -> bool {
        self.aac_packet_type == Some(AacPacketType::SequenceHeader)
    }
}
