//! Binary `abst` bootstrap box parsing.
//!
//! The bootstrap maps segment/fragment numbers to timestamps through two
//! run-length-encoded tables: the segment run table (`asrt`, fragments
//! per segment) and the fragment run table (`afrt`, start timestamps and
//! durations). Fragment-run timestamps and durations are scaled by 1000
//! here so that downstream code shares one unit with FLV millisecond
//! timestamps; comparisons then multiply the FLV side by the fragment
//! timescale instead.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::boxes::{discard, read_box_header, skip_box};
use crate::error::HdsError;

bitflags::bitflags! {
    /// Discontinuity indicator bits accumulated between fragment runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Discontinuities: u8 {
        const FRAGMENT_NUMBERING = 1;
        const TIMESTAMP = 2;
    }
}

/// Indicator value marking the end of the fragment stream.
pub const DISCONTINUITY_END: u8 = 0;

/// One segment run: starting at segment `first`, every segment holds
/// `frags_per_seg` fragments until the next run takes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRun {
    pub first: u32,
    pub frags_per_seg: u32,
}

/// One fragment run table record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentRunEntry {
    /// A run of fragments starting at `first`; `timestamp` and `duration`
    /// are pre-scaled (ticks × 1000).
    Run {
        first: u32,
        timestamp: u64,
        duration: u64,
    },
    /// A discontinuity marker carrying the raw indicator byte.
    Discontinuity(u8),
}

/// The decoded bootstrap.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub timescale: u32,
    /// Media time at the end of the bootstrapped stream, in timescale
    /// ticks.
    pub current_media_time: u64,
    pub movie_identifier: String,
    pub server_base_url: Option<String>,
    pub highest_quality: Option<String>,
    pub seg_runs: Vec<SegmentRun>,
    pub frag_runs: Vec<FragmentRunEntry>,
    pub frag_timescale: u32,
}

impl Bootstrap {
    pub fn parse(data: &[u8]) -> Result<Bootstrap, HdsError> {
        let mut reader = Cursor::new(data);

        let header = read_box_header(&mut reader)?
            .ok_or_else(|| HdsError::Format("empty bootstrap data".to_owned()))?;
        if &header.box_type != b"abst" {
            return Err(HdsError::Format(format!(
                "expected abst box, found {:?}",
                String::from_utf8_lossy(&header.box_type)
            )));
        }

        discard(&mut reader, 1 + 3 + 4)?; // version, flags, bootstrap version
        let _profile_live_update = reader.read_u8()?;

        let timescale = reader.read_u32::<BigEndian>()?;
        let current_media_time = reader.read_u64::<BigEndian>()?;
        discard(&mut reader, 8)?; // SMPTE timecode offset

        let movie_identifier = read_cstring(&mut reader)?;

        let mut server_base_url = None;
        for _ in 0..reader.read_u8()? {
            let entry = read_cstring(&mut reader)?;
            server_base_url.get_or_insert(entry);
        }

        let mut highest_quality = None;
        for _ in 0..reader.read_u8()? {
            let quality = read_cstring(&mut reader)?;
            highest_quality.get_or_insert(quality);
        }

        read_cstring(&mut reader)?; // DRM data
        read_cstring(&mut reader)?; // metadata

        // Keep the first run table of each kind whose quality filter is
        // empty or matches; skip every other table unread.
        let mut seg_runs = None;
        for _ in 0..reader.read_u8()? {
            if seg_runs.is_none() {
                if let Some((qualities, runs)) = read_asrt(&mut reader)? {
                    if quality_matches(&qualities, highest_quality.as_deref()) {
                        seg_runs = Some(runs);
                    }
                }
            } else {
                skip_box(&mut reader)?;
            }
        }
        let seg_runs = seg_runs.ok_or_else(|| HdsError::MissingRunTable {
            kind: "segment",
            quality: highest_quality.clone(),
        })?;

        let mut frag_runs = None;
        for _ in 0..reader.read_u8()? {
            if frag_runs.is_none() {
                if let Some((qualities, runs, frag_timescale)) = read_afrt(&mut reader)? {
                    if quality_matches(&qualities, highest_quality.as_deref()) {
                        frag_runs = Some((runs, frag_timescale));
                    }
                }
            } else {
                skip_box(&mut reader)?;
            }
        }
        let (frag_runs, frag_timescale) = frag_runs.ok_or_else(|| HdsError::MissingRunTable {
            kind: "fragment",
            quality: highest_quality.clone(),
        })?;

        Ok(Bootstrap {
            timescale,
            current_media_time,
            movie_identifier,
            server_base_url,
            highest_quality,
            seg_runs,
            frag_runs,
            frag_timescale,
        })
    }

    /// Stream duration derived from the bootstrap end time.
    pub fn duration_seconds(&self) -> Option<f64> {
        if self.current_media_time > 0 && self.timescale > 0 {
            Some(self.current_media_time as f64 / f64::from(self.timescale))
        } else {
            None
        }
    }
}

fn quality_matches(qualities: &[String], highest: Option<&str>) -> bool {
    qualities.is_empty() || highest.is_some_and(|h| qualities.iter().any(|q| q == h))
}

/// Reads one box expected to be `asrt`. A box of any other type is
/// consumed and reported as `None`.
fn read_asrt<R: Read>(reader: &mut R) -> Result<Option<(Vec<String>, Vec<SegmentRun>)>, HdsError> {
    let header = read_box_header(reader)?
        .ok_or_else(|| HdsError::Format("expected asrt box, found EOF".to_owned()))?;
    if &header.box_type != b"asrt" {
        discard(reader, header.size)?;
        return Ok(None);
    }
    let mut size = header.size as i64;

    discard(reader, 1 + 3)?; // version, flags
    size -= 1 + 3;

    let mut qualities = Vec::new();
    let count = reader.read_u8()?;
    size -= 1;
    for _ in 0..count {
        let quality = read_cstring(reader)?;
        size -= quality.len() as i64 + 1;
        qualities.push(quality);
    }

    let count = reader.read_u32::<BigEndian>()?;
    size -= 4;
    let mut runs = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        runs.push(SegmentRun {
            first: reader.read_u32::<BigEndian>()?,
            frags_per_seg: reader.read_u32::<BigEndian>()?,
        });
        size -= 8;
    }

    if size != 0 {
        return Err(HdsError::Format(format!(
            "asrt box size accounting off by {size}"
        )));
    }
    Ok(Some((qualities, runs)))
}

/// Reads one box expected to be `afrt`. A box of any other type is
/// consumed and reported as `None`.
fn read_afrt<R: Read>(
    reader: &mut R,
) -> Result<Option<(Vec<String>, Vec<FragmentRunEntry>, u32)>, HdsError> {
    let header = read_box_header(reader)?
        .ok_or_else(|| HdsError::Format("expected afrt box, found EOF".to_owned()))?;
    if &header.box_type != b"afrt" {
        discard(reader, header.size)?;
        return Ok(None);
    }
    let mut size = header.size as i64;

    discard(reader, 1 + 3)?; // version, flags
    let timescale = reader.read_u32::<BigEndian>()?;
    size -= 1 + 3 + 4;

    let mut qualities = Vec::new();
    let count = reader.read_u8()?;
    size -= 1;
    for _ in 0..count {
        let quality = read_cstring(reader)?;
        size -= quality.len() as i64 + 1;
        qualities.push(quality);
    }

    let count = reader.read_u32::<BigEndian>()?;
    size -= 4;
    let mut runs = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        let first = reader.read_u32::<BigEndian>()?;
        // Run table values drift from the actual fragment timestamps;
        // scale by 1000 to share a unit with FLV tag milliseconds.
        let timestamp = reader.read_u64::<BigEndian>()?.saturating_mul(1000);
        let duration = u64::from(reader.read_u32::<BigEndian>()?) * 1000;
        size -= 16;
        if duration == 0 {
            let indicator = reader.read_u8()?;
            size -= 1;
            runs.push(FragmentRunEntry::Discontinuity(indicator));
        } else {
            runs.push(FragmentRunEntry::Run {
                first,
                timestamp,
                duration,
            });
        }
    }

    if size != 0 {
        return Err(HdsError::Format(format!(
            "afrt box size accounting off by {size}"
        )));
    }
    Ok(Some((qualities, runs, timescale)))
}

fn read_cstring<R: Read>(reader: &mut R) -> Result<String, HdsError> {
    let mut buf = Vec::new();
    loop {
        let byte = reader.read_u8()?;
        if byte == 0 {
            break;
        }
        buf.push(byte);
    }
    String::from_utf8(buf)
        .map_err(|_| HdsError::Format("invalid UTF-8 string in bootstrap".to_owned()))
}
