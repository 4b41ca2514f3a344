//! Fragment download and muxing.
//!
//! An F4F fragment is a short sequence of boxes with the FLV tags inside
//! `mdat`. Downloading happens in two phases so that the resume logic can
//! inspect the first tag's timestamp before anything is committed:
//! [`FragmentStream::read_first_timestamp`] buffers just enough of the
//! body to see the first tag, [`FragmentStream::finish`] drains the rest
//! and muxes it. The parsed fragment is then committed to the output with
//! a single write, so a fragment lands either entirely or not at all.

use std::io::{Cursor, Seek, SeekFrom};

use bytes::{Bytes, BytesMut};
use flv::audio::AudioPrefix;
use flv::tag::{TAG_HEADER_SIZE, TagHeader, TagType, read_prev_tag};
use flv::video::VideoPrefix;
use reqwest::Response;
use tracing::{debug, trace};

use crate::boxes::read_box_header;
use crate::error::HdsError;

/// Tags above this size (payload plus trailing size field) abort the
/// fetch; nothing legitimate in these streams comes close.
const MAX_TAG_SIZE: u64 = 10_000_000;

/// Upper bound on boxes per fragment.
const MAX_BOXES: usize = 100;

/// A fully downloaded and muxed fragment, ready to commit.
#[derive(Debug, Clone)]
pub struct ParsedFragment {
    /// Timestamp of the first FLV tag in the fragment.
    pub first_timestamp: i32,
    /// Timestamp of the last tag kept in the body.
    pub last_timestamp: i32,
    /// The framed tag data (headers, payloads and trailing size fields).
    pub body: Bytes,
}

/// An in-flight fragment download.
pub struct FragmentStream {
    response: Response,
    buf: BytesMut,
}

impl FragmentStream {
    pub fn new(response: Response) -> Self {
        FragmentStream {
            response,
            buf: BytesMut::new(),
        }
    }

    /// Downloads until the first FLV tag header is visible and returns its
    /// timestamp. Dropping the stream afterwards abandons the transfer,
    /// which is how resume verification rejects a fragment cheaply.
    pub async fn read_first_timestamp(&mut self) -> Result<i32, HdsError> {
        loop {
            if let Some(tag) = peek_first_tag(&self.buf)? {
                trace!(timestamp = tag.timestamp_ms, "first tag of fragment");
                return Ok(tag.timestamp_ms);
            }
            match self.response.chunk().await? {
                Some(chunk) => self.buf.extend_from_slice(&chunk),
                None => return Err(HdsError::NoTags),
            }
        }
    }

    /// Downloads the remainder of the fragment and muxes it.
    pub async fn finish(mut self, strip_headers: bool) -> Result<ParsedFragment, HdsError> {
        while let Some(chunk) = self.response.chunk().await? {
            self.buf.extend_from_slice(&chunk);
        }
        parse_fragment(&self.buf.freeze(), strip_headers)
    }
}

/// Walks the first tag header out of a partially buffered fragment.
/// Returns `None` when more data is needed.
fn peek_first_tag(buf: &[u8]) -> Result<Option<TagHeader>, HdsError> {
    let mut pos: u64 = 0;
    let len = buf.len() as u64;
    for _ in 0..MAX_BOXES {
        if len < pos + 8 {
            return Ok(None);
        }
        let at = pos as usize;
        let size32 = u32::from_be_bytes(buf[at..at + 4].try_into().unwrap());
        let is_mdat = &buf[at + 4..at + 8] == b"mdat";
        let (header_size, payload) = if size32 == 1 {
            if len < pos + 16 {
                return Ok(None);
            }
            let size64 = u64::from_be_bytes(buf[at + 8..at + 16].try_into().unwrap());
            (16, size64.checked_sub(16))
        } else {
            (8, u64::from(size32).checked_sub(8))
        };
        let payload = payload
            .ok_or_else(|| HdsError::Format("box size smaller than its header".to_owned()))?;

        if is_mdat && payload > 0 {
            let tag_at = pos + header_size;
            if len < tag_at + u64::from(TAG_HEADER_SIZE) {
                return Ok(None);
            }
            let tag = TagHeader::read_from(&mut Cursor::new(&buf[tag_at as usize..]))?
                .expect("tag header bytes are buffered");
            return Ok(Some(tag));
        }

        // Skip empty mdat and foreign boxes alike.
        let next = (pos + header_size)
            .checked_add(payload)
            .ok_or_else(|| HdsError::Format("absurd box size in fragment".to_owned()))?;
        if next > len {
            return Ok(None);
        }
        pos = next;
    }
    Err(HdsError::TooManyBoxes)
}

/// Muxes a complete fragment: walks its boxes, copies the FLV tags out of
/// every `mdat`, and with `strip_headers` set drops the leading AAC/AVC
/// sequence-header tags (they already appeared in the first fragment).
pub fn parse_fragment(data: &Bytes, strip_headers: bool) -> Result<ParsedFragment, HdsError> {
    let mut cursor = Cursor::new(&data[..]);
    let mut body: Vec<u8> = Vec::with_capacity(data.len());
    let mut strip_audio = strip_headers;
    let mut strip_video = strip_headers;
    let mut first_timestamp: Option<i32> = None;
    let mut finished = false;

    for _ in 0..MAX_BOXES {
        let Some(header) = read_box_header(&mut cursor)? else {
            finished = true;
            break;
        };
        if &header.box_type != b"mdat" {
            advance(&mut cursor, data.len(), header.size)?;
            continue;
        }

        let mut box_remaining = i64::try_from(header.size)
            .map_err(|_| HdsError::Format("oversized mdat box".to_owned()))?;

        // Scanning tag headers is much slower than copying, so it stops
        // as soon as both strip candidates have been seen.
        while box_remaining > 0 && (strip_audio || strip_video || first_timestamp.is_none()) {
            let tag_start = cursor.position();
            let tag = TagHeader::read_from(&mut cursor)
                .map_err(|_| truncated())?
                .ok_or_else(truncated)?;
            if first_timestamp.is_none() {
                first_timestamp = Some(tag.timestamp_ms);
            }

            let mut skip = false;
            match tag.tag_type {
                TagType::Audio if strip_audio => {
                    strip_audio = false;
                    if tag.data_size >= 1 {
                        let prefix = AudioPrefix::read_from(&mut cursor, tag.data_size)
                            .map_err(|_| truncated())?;
                        skip = prefix.is_sequence_header();
                    }
                }
                TagType::Video if strip_video => {
                    strip_video = false;
                    if tag.data_size >= 1 {
                        let prefix = VideoPrefix::read_from(&mut cursor, tag.data_size)
                            .map_err(|_| truncated())?;
                        skip = prefix.is_sequence_header();
                    }
                }
                _ => {}
            }

            let consumed = cursor.position() - tag_start;
            box_remaining -= consumed as i64;
            let prefix_read = consumed - u64::from(TAG_HEADER_SIZE);
            let remaining = u64::from(tag.data_size) - prefix_read + 4;

            if skip {
                debug!(
                    timestamp = tag.timestamp_ms,
                    tag_type = ?tag.tag_type,
                    "stripping sequence header tag"
                );
                advance(&mut cursor, data.len(), remaining)?;
            } else if remaining > MAX_TAG_SIZE {
                return Err(HdsError::TagTooLarge);
            } else {
                body.extend_from_slice(&data[tag_start as usize..cursor.position() as usize]);
                copy(&mut cursor, data, remaining, &mut body)?;
            }

            box_remaining -= remaining as i64;
            if box_remaining < 0 {
                return Err(HdsError::Format("tag extends past end of box".to_owned()));
            }
        }

        copy(&mut cursor, data, box_remaining as u64, &mut body)?;
    }
    if !finished {
        return Err(HdsError::TooManyBoxes);
    }

    let first_timestamp = first_timestamp.ok_or(HdsError::NoTags)?;
    let last_timestamp = if body.is_empty() {
        first_timestamp
    } else {
        let mut reverse = Cursor::new(&body[..]);
        reverse.seek(SeekFrom::End(0))?;
        read_prev_tag(&mut reverse)?
            .map(|tag| tag.timestamp_ms)
            .unwrap_or(first_timestamp)
    };

    Ok(ParsedFragment {
        first_timestamp,
        last_timestamp,
        body: Bytes::from(body),
    })
}

fn truncated() -> HdsError {
    HdsError::Format("fragment data truncated".to_owned())
}

fn advance(cursor: &mut Cursor<&[u8]>, len: usize, count: u64) -> Result<(), HdsError> {
    let next = cursor
        .position()
        .checked_add(count)
        .filter(|next| *next <= len as u64)
        .ok_or_else(truncated)?;
    cursor.set_position(next);
    Ok(())
}

fn copy(
    cursor: &mut Cursor<&[u8]>,
    data: &Bytes,
    count: u64,
    body: &mut Vec<u8>,
) -> Result<(), HdsError> {
    let start = cursor.position();
    advance(cursor, data.len(), count)?;
    body.extend_from_slice(&data[start as usize..(start + count) as usize]);
    Ok(())
}
