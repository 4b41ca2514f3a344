use std::io::{self, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::FlvError;

pub const FLV_SIGNATURE: &[u8; 3] = b"FLV";
pub const FLV_VERSION: u8 = 1;
pub const FILE_HEADER_SIZE: u32 = 9;

/// The 9-byte FLV file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvHeader {
    pub version: u8,
    pub has_audio: bool,
    pub has_video: bool,
}

impl FlvHeader {
    pub fn new(has_audio: bool, has_video: bool) -> Self {
        FlvHeader {
            version: FLV_VERSION,
            has_audio,
            has_video,
        }
    }

    /// Parses the file header and skips to the start of the FLV body,
    /// i.e. past the data offset and the initial previous-tag-size field.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, FlvError> {
        let mut signature = [0u8; 3];
        reader.read_exact(&mut signature)?;
        if &signature != FLV_SIGNATURE {
            return Err(FlvError::InvalidSignature);
        }

        let version = reader.read_u8()?;
        if version != FLV_VERSION {
            return Err(FlvError::UnsupportedVersion(version));
        }

        let flags = reader.read_u8()?;
        let has_audio = flags & 0b100 != 0;
        let has_video = flags & 0b001 != 0;

        // The data offset is usually 9 but may be larger; skip whatever
        // remains of the header plus the initial previous-tag-size field.
        let data_offset = reader.read_u32::<BigEndian>()?;
        if data_offset < FILE_HEADER_SIZE {
            return Err(FlvError::InvalidHeaderSize(data_offset));
        }
        let remainder = u64::from(data_offset - FILE_HEADER_SIZE) + 4;
        let skipped = io::copy(&mut reader.take(remainder), &mut io::sink())?;
        if skipped != remainder {
            return Err(FlvError::Io(io::ErrorKind::UnexpectedEof.into()));
        }

        Ok(FlvHeader {
            version,
            has_audio,
            has_video,
        })
    }
}
