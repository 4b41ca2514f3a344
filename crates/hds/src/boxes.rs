//! Generic F4V/ISO base media box header parsing.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::HdsError;

/// A parsed box header: the four-character type and the payload size in
/// bytes (the header itself already consumed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub box_type: [u8; 4],
    pub size: u64,
}

/// Reads a box header. Returns `Ok(None)` when the stream is cleanly at
/// EOF; a short read after the first byte is an error.
pub fn read_box_header<R: Read>(reader: &mut R) -> Result<Option<BoxHeader>, HdsError> {
    let mut size32 = [0u8; 4];
    let read = read_available(reader, &mut size32)?;
    if read == 0 {
        return Ok(None);
    }
    if read < 4 {
        return Err(HdsError::Format("truncated box header".to_owned()));
    }

    let mut box_type = [0u8; 4];
    reader.read_exact(&mut box_type)?;

    let size32 = u32::from_be_bytes(size32);
    let size = if size32 == 1 {
        // 64-bit extended size: header is 16 bytes in total.
        reader.read_u64::<BigEndian>()?.checked_sub(16)
    } else {
        u64::from(size32).checked_sub(8)
    };
    let size = size.ok_or_else(|| HdsError::Format("box size smaller than its header".to_owned()))?;

    Ok(Some(BoxHeader { box_type, size }))
}

/// Reads one whole box and discards its payload.
pub fn skip_box<R: Read>(reader: &mut R) -> Result<(), HdsError> {
    let header = read_box_header(reader)?
        .ok_or_else(|| HdsError::Format("expected a box, found EOF".to_owned()))?;
    discard(reader, header.size)
}

/// Discards exactly `count` bytes from the reader.
pub fn discard<R: Read>(reader: &mut R, count: u64) -> Result<(), HdsError> {
    let copied = io::copy(&mut reader.take(count), &mut io::sink())?;
    if copied != count {
        return Err(HdsError::Format("box extends past end of data".to_owned()));
    }
    Ok(())
}

/// Writes a box header for a payload of the given size, choosing the
/// short or the 64-bit extended form as required.
pub fn write_box_header<W: Write>(
    writer: &mut W,
    box_type: [u8; 4],
    payload_size: u64,
) -> io::Result<()> {
    if payload_size < (1 << 32) - 8 {
        writer.write_u32::<BigEndian>(payload_size as u32 + 8)?;
        writer.write_all(&box_type)?;
    } else {
        writer.write_u32::<BigEndian>(1)?;
        writer.write_all(&box_type)?;
        writer.write_u64::<BigEndian>(payload_size + 16)?;
    }
    Ok(())
}

fn read_available<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn short_form_round_trip() {
        let mut buf = Vec::new();
        write_box_header(&mut buf, *b"mdat", 1000).unwrap();
        assert_eq!(buf.len(), 8);

        let header = read_box_header(&mut Cursor::new(&buf[..])).unwrap().unwrap();
        assert_eq!(&header.box_type, b"mdat");
        assert_eq!(header.size, 1000);
    }

    #[test]
    fn long_form_round_trip() {
        let payload_size = u64::from(u32::MAX);
        let mut buf = Vec::new();
        write_box_header(&mut buf, *b"mdat", payload_size).unwrap();
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[..4], &1u32.to_be_bytes());

        let header = read_box_header(&mut Cursor::new(&buf[..])).unwrap().unwrap();
        assert_eq!(&header.box_type, b"mdat");
        assert_eq!(header.size, payload_size);
    }

    #[test]
    fn form_boundary() {
        // The largest payload whose size still fits the 32-bit field.
        let mut buf = Vec::new();
        write_box_header(&mut buf, *b"mdat", (1 << 32) - 9).unwrap();
        assert_eq!(buf.len(), 8);
        assert_eq!(&buf[..4], &u32::MAX.to_be_bytes());

        // One byte more forces the extended form.
        let mut buf = Vec::new();
        write_box_header(&mut buf, *b"mdat", (1 << 32) - 8).unwrap();
        assert_eq!(buf.len(), 16);
        let header = read_box_header(&mut Cursor::new(&buf[..])).unwrap().unwrap();
        assert_eq!(header.size, (1 << 32) - 8);
    }

    #[test]
    fn clean_eof_yields_none() {
        assert!(read_box_header(&mut Cursor::new(&[][..])).unwrap().is_none());
    }

    #[test]
    fn partial_header_is_an_error() {
        let buf = [0u8, 0, 1];
        assert!(read_box_header(&mut Cursor::new(&buf[..])).is_err());
    }

    #[test]
    fn undersized_box_is_an_error() {
        // A 32-bit size of 4 cannot hold its own 8-byte header.
        let mut buf = Vec::new();
        buf.extend_from_slice(&4u32.to_be_bytes());
        buf.extend_from_slice(b"free");
        assert!(read_box_header(&mut Cursor::new(&buf[..])).is_err());
    }

    #[test]
    fn skip_box_consumes_payload() {
        let mut buf = Vec::new();
        write_box_header(&mut buf, *b"afra", 4).unwrap();
        buf.extend_from_slice(&[1, 2, 3, 4]);
        write_box_header(&mut buf, *b"mdat", 0).unwrap();

        let mut reader = Cursor::new(&buf[..]);
        skip_box(&mut reader).unwrap();
        let next = read_box_header(&mut reader).unwrap().unwrap();
        assert_eq!(&next.box_type, b"mdat");
    }
}
