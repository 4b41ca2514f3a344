//! Resumption against a partially written output file.
//!
//! The existing file is re-read through a second handle, its tags scanned
//! forward to find the last written timestamp, and the fragment run table
//! searched for the fragment containing it. That fragment is downloaded
//! again in full (its start may have been truncated), the writer is moved
//! back to just after the last tag that precedes the fragment, and the
//! download continues from there.

use std::io::{BufReader, Read, Seek, SeekFrom, Write};

use bytes::Bytes;
use flv::error::FlvError;
use flv::header::FlvHeader;
use flv::tag::{TAG_HEADER_SIZE, TagHeader, TagType, read_prev_tag};
use tracing::{debug, info, warn};

use crate::bootstrap::Bootstrap;
use crate::error::HdsError;
use crate::fetch::{FRAGMENT_TYPES, fragment_url};
use crate::fragment::FragmentStream;
use crate::progress::{OnProgress, report};
use crate::runs::{ExpandedRun, FragmentIter, SegmentIter, expand_frag_runs};
use crate::session::HttpSession;
use crate::sink::Sink;

/// Number of attempts at guessing the fragment containing a timestamp.
const SEARCH_ATTEMPTS: u32 = 3;

/// Determines the resume point for an existing output file.
///
/// Returns `None` when the destination cannot be resumed (not a file, or
/// its content does not match this download) and the fetch should start
/// fresh. On success the accepted fragment has already been committed and
/// the returned iterator continues after it; the second element is the
/// write position.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn resume_point(
    sink: &mut Sink,
    metadata: Option<&Bytes>,
    bootstrap: &Bootstrap,
    session: &HttpSession,
    media_url: &str,
    player_suffix: &str,
    duration: Option<f64>,
    on_progress: Option<&OnProgress>,
) -> Result<Option<(FragmentIter, u64)>, HdsError> {
    let Some(file) = sink.reopen_readable()? else {
        return Ok(None);
    };
    let mut reader = BufReader::new(file);

    reader.seek(SeekFrom::Start(0))?;
    let header = match FlvHeader::read_from(&mut reader) {
        Ok(header) => header,
        Err(FlvError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(None);
        }
        Err(err) => {
            warn!(error = %err, "existing output is not an FLV file, starting fresh");
            return Ok(None);
        }
    };
    if !(header.has_audio && header.has_video) {
        warn!("existing output has unexpected stream flags, starting fresh");
        return Ok(None);
    }

    info!("scanning existing FLV file");
    if let Some(metadata) = metadata {
        if !matching_metadata_tag(&mut reader, metadata)? {
            warn!("existing output metadata differs, starting fresh");
            return Ok(None);
        }
    }

    let Some((last_tag, scan_end)) = scan_last_tag(&mut reader)? else {
        return Ok(None);
    };
    let last_ts = last_tag.timestamp_ms;
    debug!(last_ts, scan_end, "existing output scanned");
    report(on_progress, scan_end, f64::from(last_ts) / 1000.0, duration);

    // Resume at the fragment containing the last timestamp. Usually the
    // last fragment is downloaded a second time, but that guarantees the
    // complete fragment is written out in case it was truncated before.
    let mut runs = expand_frag_runs(&bootstrap.frag_runs);
    let target = u64::from(last_ts.max(0) as u32) * u64::from(bootstrap.frag_timescale);

    let mut run_idx = 0;
    let mut ts_offset = 0;
    let mut ref_time: u64 = 0;
    let mut ref_offset: u64 = 0;
    for _ in 0..SEARCH_ATTEMPTS {
        if ref_offset == 0 {
            let Some((idx, offset)) = find_frag_run(&runs, target) else {
                return Err(HdsError::Format(
                    "no fragment run found with timestamp".to_owned(),
                ));
            };
            run_idx = idx;
            ts_offset = offset;
            ref_time = runs[run_idx].run_duration;
            ref_offset = u64::from(runs[run_idx].span);
        }
        if ref_time == 0 {
            break;
        }

        let offset = ts_offset * ref_offset / ref_time;
        let frag_index = runs[run_idx].frag_index + offset;
        let mut segs = SegmentIter::new(&bootstrap.seg_runs, frag_index);
        let Some(seg) = segs.next() else {
            return Err(HdsError::Format("segment run table exhausted".to_owned()));
        };
        let frag = u64::from(runs[run_idx].first) + offset;

        let url = fragment_url(media_url, seg, frag, player_suffix)?;
        let response = session.get(&url, FRAGMENT_TYPES).await?;
        let mut stream = FragmentStream::new(response);
        let first_ts = stream.read_first_timestamp().await?;

        if first_ts <= last_ts {
            let parsed = stream.finish(frag_index != 0).await?;

            // Timestamps in different fragments are assumed unequal.
            reader.seek(SeekFrom::Start(scan_end))?;
            seek_backwards(&mut reader, parsed.first_timestamp)?;
            let position = reader.stream_position()?;

            sink.seek_to(position)?;
            sink.truncate_to(position)?;
            sink.write_all(&parsed.body)?;
            let position = position + parsed.body.len() as u64;
            info!(frag, position, "resumed download");
            report(
                on_progress,
                position,
                f64::from(parsed.last_timestamp) / 1000.0,
                duration,
            );

            let iter = FragmentIter::resume(runs, run_idx, offset + 1, segs);
            return Ok(Some((iter, position)));
        }

        warn!(
            frag,
            "fragment starts at {:.3} s > {:.3} s",
            f64::from(first_ts) / 1000.0,
            f64::from(last_ts) / 1000.0,
        );
        drop(stream);
        ref_time = u64::from(first_ts.max(0) as u32) * u64::from(bootstrap.frag_timescale);
        ref_offset = offset;
        if ref_offset == 0 {
            // The run starts too late; patch its table entry and search
            // again for a run containing the timestamp.
            runs[run_idx].timestamp = ref_time;
        }
    }
    Err(HdsError::ResumeSearchFailed)
}

/// Checks the leading script tag against the configured metadata.
fn matching_metadata_tag<R: Read + Seek>(
    reader: &mut R,
    metadata: &Bytes,
) -> Result<bool, HdsError> {
    let Some(tag) = read_tag_or_eof(reader)? else {
        return Ok(false);
    };
    let expected = tag.tag_type == TagType::ScriptData
        && !tag.filter
        && tag.data_size as usize == metadata.len()
        && tag.timestamp_ms == 0
        && tag.stream_id == 0;
    if !expected {
        return Ok(false);
    }

    let mut payload = vec![0u8; metadata.len()];
    if let Err(err) = reader.read_exact(&mut payload) {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            return Ok(false);
        }
        return Err(err.into());
    }
    if payload != metadata[..] {
        return Ok(false);
    }
    reader.seek(SeekFrom::Current(4))?; // trailing tag size
    Ok(true)
}

/// Scans forward over the FLV body, enforcing monotonically non-decreasing
/// timestamps, and returns the last fully contained tag together with the
/// offset just past its trailing size field. Truncation inside a tag
/// reverts to the previous complete tag.
pub(crate) fn scan_last_tag<R: Read + Seek>(
    reader: &mut R,
) -> Result<Option<(TagHeader, u64)>, HdsError> {
    let start = reader.stream_position()?;
    let file_len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(start))?;

    let mut good: Option<(TagHeader, u64)> = None;
    let mut last_ts: Option<i32> = None;
    loop {
        let tag_start = reader.stream_position()?;
        let Some(tag) = read_tag_or_eof(reader)? else {
            break;
        };

        if last_ts.is_some_and(|prev| tag.timestamp_ms < prev) {
            return Err(HdsError::TimestampRegression(tag.timestamp_ms));
        }
        last_ts = Some(tag.timestamp_ms);

        let tag_end = tag_start + u64::from(TAG_HEADER_SIZE) + u64::from(tag.data_size) + 4;
        if tag_end > file_len {
            break;
        }
        reader.seek(SeekFrom::Start(tag_end))?;
        good = Some((tag, tag_end));
    }

    if let Some((_, end)) = good {
        reader.seek(SeekFrom::Start(end))?;
    }
    Ok(good)
}

/// Walks backwards from the current position and stops just after the
/// last tag whose timestamp is below `timestamp`.
pub(crate) fn seek_backwards<R: Read + Seek>(
    reader: &mut R,
    timestamp: i32,
) -> Result<(), HdsError> {
    loop {
        let Some(tag) = read_prev_tag(reader)? else {
            break;
        };
        if tag.timestamp_ms < timestamp {
            reader.seek(SeekFrom::Current(i64::from(tag.data_size) + 4))?;
            break;
        }
        reader.seek(SeekFrom::Current(-i64::from(TAG_HEADER_SIZE)))?;
    }
    Ok(())
}

/// Finds the expanded run whose time interval contains `target`
/// (timescale ticks × 1000), and the offset into it.
pub(crate) fn find_frag_run(runs: &[ExpandedRun], target: u64) -> Option<(usize, u64)> {
    runs.iter().enumerate().find_map(|(idx, run)| {
        let offset = target.checked_sub(run.timestamp)?;
        (offset < run.run_duration).then_some((idx, offset))
    })
}

fn read_tag_or_eof<R: Read>(reader: &mut R) -> Result<Option<TagHeader>, HdsError> {
    match TagHeader::read_from(reader) {
        Ok(tag) => Ok(tag),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(err) => Err(err.into()),
    }
}
