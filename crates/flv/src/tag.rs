use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

/// Size of an FLV tag header in bytes.
pub const TAG_HEADER_SIZE: u32 = 11;

/// FLV tag types. Anything outside the three defined values is carried
/// through untouched so that scanning over unknown tags still works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Audio,
    Video,
    ScriptData,
    Other(u8),
}

impl From<u8> for TagType {
    fn from(value: u8) -> Self {
        match value {
            8 => TagType::Audio,
            9 => TagType::Video,
            18 => TagType::ScriptData,
            other => TagType::Other(other),
        }
    }
}

impl From<TagType> for u8 {
    fn from(value: TagType) -> Self {
        match value {
            TagType::Audio => 8,
            TagType::Video => 9,
            TagType::ScriptData => 18,
            TagType::Other(other) => other,
        }
    }
}

/// The 11-byte FLV tag header.
///
/// The timestamp is stored on the wire as a 24-bit value plus a signed
/// extension byte holding bits 24..31, so it decodes to a signed 32-bit
/// millisecond count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub filter: bool,
    pub tag_type: TagType,
    pub data_size: u32,
    pub timestamp_ms: i32,
    pub stream_id: u32,
}

impl TagHeader {
    pub fn new(tag_type: TagType, data_size: u32, timestamp_ms: i32) -> Self {
        TagHeader {
            filter: false,
            tag_type,
            data_size,
            timestamp_ms,
            stream_id: 0,
        }
    }

    /// Reads a tag header. Returns `Ok(None)` when the stream is cleanly at
    /// EOF (no bytes at all); a short read after the first byte is an error.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Option<TagHeader>> {
        let mut flags = [0u8; 1];
        if reader.read(&mut flags)? == 0 {
            return Ok(None);
        }
        let flags = flags[0];

        let data_size = reader.read_u24::<BigEndian>()?;
        let timestamp = reader.read_u24::<BigEndian>()?;
        let extension = reader.read_i8()?;
        let stream_id = reader.read_u24::<BigEndian>()?;

        Ok(Some(TagHeader {
            filter: flags >> 5 & 1 != 0,
            tag_type: TagType::from(flags & 0x1F),
            data_size,
            timestamp_ms: timestamp as i32 | (i32::from(extension) << 24),
            stream_id,
        }))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        let flags = (self.filter as u8) << 5 | u8::from(self.tag_type) & 0x1F;
        writer.write_u8(flags)?;
        writer.write_u24::<BigEndian>(self.data_size)?;
        writer.write_u24::<BigEndian>(self.timestamp_ms as u32 & 0xFF_FFFF)?;
        writer.write_u8((self.timestamp_ms >> 24) as u8)?;
        writer.write_u24::<BigEndian>(self.stream_id)?;
        Ok(())
    }

    /// Total on-disk size of the tag: header plus data, excluding the
    /// trailing previous-tag-size field.
    pub fn total_size(&self) -> u32 {
        TAG_HEADER_SIZE + self.data_size
    }
}

/// Reads the tag that ends at the current position by following the 4-byte
/// trailing size field, and leaves the reader just past that tag's header.
///
/// Returns `None` when the size field is zero, which is the sentinel
/// written directly after the file header, i.e. the start of the body.
pub fn read_prev_tag<R: Read + Seek>(reader: &mut R) -> io::Result<Option<TagHeader>> {
    reader.seek(SeekFrom::Current(-4))?;
    let length = reader.read_u32::<BigEndian>()?;
    if length == 0 {
        return Ok(None);
    }
    reader.seek(SeekFrom::Current(-4 - i64::from(length)))?;
    match TagHeader::read_from(reader)? {
        Some(tag) => Ok(Some(tag)),
        None => Err(io::ErrorKind::UnexpectedEof.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn tag_header_round_trip() {
        let cases = [
            TagHeader::new(TagType::Audio, 128, 0),
            TagHeader::new(TagType::Video, 0xFF_FFFF, 0x12_3456),
            TagHeader::new(TagType::ScriptData, 1, 0),
            TagHeader {
                filter: true,
                tag_type: TagType::Other(7),
                data_size: 42,
                timestamp_ms: -1,
                stream_id: 5,
            },
        ];

        for tag in cases {
            let mut buf = Vec::new();
            tag.write_to(&mut buf).unwrap();
            assert_eq!(buf.len(), TAG_HEADER_SIZE as usize);
            let parsed = TagHeader::read_from(&mut Cursor::new(&buf[..]))
                .unwrap()
                .unwrap();
            assert_eq!(parsed, tag);
        }
    }

    #[test]
    fn timestamp_extension_is_signed() {
        // 0x80 in the extension byte makes the timestamp negative.
        let bytes = [8, 0, 0, 0, 0, 0, 0, 0x80, 0, 0, 0];
        let tag = TagHeader::read_from(&mut Cursor::new(&bytes[..]))
            .unwrap()
            .unwrap();
        assert_eq!(tag.timestamp_ms, i32::MIN);
    }

    #[test]
    fn clean_eof_yields_none() {
        let tag = TagHeader::read_from(&mut Cursor::new(&[][..])).unwrap();
        assert!(tag.is_none());
    }

    #[test]
    fn short_header_is_an_error() {
        let bytes = [8, 0, 0];
        assert!(TagHeader::read_from(&mut Cursor::new(&bytes[..])).is_err());
    }

    #[test]
    fn prev_tag_walks_backwards() {
        // Body: one audio tag with 3 payload bytes, then its trailing size.
        let mut buf = Vec::new();
        buf.extend_from_slice(&[0, 0, 0, 0]); // initial previous-tag-size
        let tag = TagHeader::new(TagType::Audio, 3, 1000);
        tag.write_to(&mut buf).unwrap();
        buf.extend_from_slice(&[1, 2, 3]);
        buf.extend_from_slice(&(TAG_HEADER_SIZE + 3).to_be_bytes());

        let mut reader = Cursor::new(&buf[..]);
        reader.seek(SeekFrom::End(0)).unwrap();
        let parsed = read_prev_tag(&mut reader).unwrap().unwrap();
        assert_eq!(parsed, tag);
        // Positioned just past the parsed tag header.
        assert_eq!(reader.position(), 4 + u64::from(TAG_HEADER_SIZE));

        // One more step back hits the initial zero sentinel.
        reader.seek(SeekFrom::Start(4)).unwrap();
        assert!(read_prev_tag(&mut reader).unwrap().is_none());
        assert_eq!(reader.position(), 4);
    }
}
