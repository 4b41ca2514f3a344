//! FLV output writing.
//!
//! The writer tracks its own byte count instead of relying on `Seek`, so
//! the same code path serves regular files and unseekable destinations
//! such as stdout. Fragment bodies arrive pre-framed (tag headers and
//! trailing size fields included) and are committed with a single
//! [`FlvWriter::write_raw`] call.

use std::io::{self, Write};

use byteorder::{BigEndian, WriteBytesExt};

use crate::header::{FLV_SIGNATURE, FLV_VERSION};
use crate::tag::{TAG_HEADER_SIZE, TagHeader, TagType};

pub struct FlvWriter<W: Write> {
    writer: W,
    bytes_written: u64,
}

impl<W: Write> FlvWriter<W> {
    pub fn new(writer: W) -> Self {
        Self::with_position(writer, 0)
    }

    /// Wraps a destination that already holds `position` bytes of valid
    /// FLV data, as after a resume seek.
    pub fn with_position(writer: W, position: u64) -> Self {
        FlvWriter {
            writer,
            bytes_written: position,
        }
    }

    /// Writes the file header followed by the initial previous-tag-size
    /// field.
    pub fn write_header(&mut self, has_audio: bool, has_video: bool) -> io::Result<()> {
        self.writer.write_all(FLV_SIGNATURE)?;
        self.writer.write_u8(FLV_VERSION)?;
        self.writer
            .write_u8((has_audio as u8) << 2 | has_video as u8)?;
        self.writer.write_u32::<BigEndian>(9)?;
        self.writer.write_u32::<BigEndian>(0)?;
        self.bytes_written += 13;
        Ok(())
    }

    /// Writes a script tag carrying an opaque, already AMF0-encoded
    /// payload, with zero timestamp and stream id.
    pub fn write_script_tag(&mut self, data: &[u8]) -> io::Result<()> {
        let data_size = u32::try_from(data.len())
            .ok()
            .filter(|size| *size < 1 << 24)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "script tag too large"))?;

        TagHeader::new(TagType::ScriptData, data_size, 0).write_to(&mut self.writer)?;
        self.writer.write_all(data)?;
        self.writer
            .write_u32::<BigEndian>(TAG_HEADER_SIZE + data_size)?;
        self.bytes_written += u64::from(TAG_HEADER_SIZE + data_size) + 4;
        Ok(())
    }

    /// Appends pre-framed tag data verbatim.
    pub fn write_raw(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.bytes_written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FlvHeader;
    use std::io::Cursor;

    #[test]
    fn header_bytes() {
        let mut writer = FlvWriter::new(Vec::new());
        writer.write_header(true, true).unwrap();
        let buf = writer.into_inner().unwrap();
        assert_eq!(
            buf,
            [b'F', b'L', b'V', 1, 0x05, 0, 0, 0, 9, 0, 0, 0, 0]
        );
    }

    #[test]
    fn script_tag_framing() {
        let payload = [0xDE, 0xAD, 0xBE, 0xEF];
        let mut writer = FlvWriter::new(Vec::new());
        writer.write_header(true, true).unwrap();
        writer.write_script_tag(&payload).unwrap();
        assert_eq!(writer.position(), 13 + 11 + 4 + 4);

        let buf = writer.into_inner().unwrap();
        let mut reader = Cursor::new(&buf[..]);
        FlvHeader::read_from(&mut reader).unwrap();
        let tag = TagHeader::read_from(&mut reader).unwrap().unwrap();
        assert_eq!(tag.tag_type, TagType::ScriptData);
        assert_eq!(tag.data_size, 4);
        assert_eq!(tag.timestamp_ms, 0);
        assert_eq!(tag.stream_id, 0);
        assert!(!tag.filter);
        assert_eq!(&buf[13 + 11..13 + 15], &payload);
        assert_eq!(&buf[13 + 15..], &(11u32 + 4).to_be_bytes());
    }

    /// Writing a header and N tags produces a file whose length is
    /// 13 + sum of (11 + data + 4) and whose tags read back unchanged.
    #[test]
    fn framing_length_law() {
        let payloads: [&[u8]; 3] = [&[1], &[2, 3, 4, 5], &[6; 100]];
        let mut writer = FlvWriter::new(Vec::new());
        writer.write_header(true, true).unwrap();
        for payload in payloads {
            writer.write_script_tag(payload).unwrap();
        }

        let expected: u64 = 13 + payloads
            .iter()
            .map(|p| 11 + p.len() as u64 + 4)
            .sum::<u64>();
        assert_eq!(writer.position(), expected);

        let buf = writer.into_inner().unwrap();
        assert_eq!(buf.len() as u64, expected);

        let mut reader = Cursor::new(&buf[..]);
        FlvHeader::read_from(&mut reader).unwrap();
        for payload in payloads {
            let tag = TagHeader::read_from(&mut reader).unwrap().unwrap();
            assert_eq!(tag.data_size as usize, payload.len());
            let mut data = vec![0u8; payload.len() + 4];
            std::io::Read::read_exact(&mut reader, &mut data).unwrap();
            assert_eq!(&data[..payload.len()], payload);
        }
        assert!(TagHeader::read_from(&mut reader).unwrap().is_none());
    }

    #[test]
    fn resumed_position_is_carried() {
        let mut writer = FlvWriter::with_position(Vec::new(), 500);
        writer.write_raw(&[0u8; 25]).unwrap();
        assert_eq!(writer.position(), 525);
    }
}
