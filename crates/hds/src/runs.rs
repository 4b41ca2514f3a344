//! Expansion of the run-length-encoded bootstrap tables into the lazy
//! sequence of fragments to download.

use crate::bootstrap::{
    Bootstrap, DISCONTINUITY_END, Discontinuities, FragmentRunEntry, SegmentRun,
};

/// A fragment run enriched with its span and absolute position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandedRun {
    /// First fragment number of the run.
    pub first: u32,
    /// Start timestamp (ticks × 1000).
    pub timestamp: u64,
    /// Per-fragment duration (ticks × 1000).
    pub duration: u64,
    /// Number of fragments in the run.
    pub span: u32,
    /// Total duration of the run (ticks × 1000).
    pub run_duration: u64,
    /// Zero-based ordinal of the run's first fragment in the whole stream.
    pub frag_index: u64,
}

/// Expands the fragment run table.
///
/// Discontinuity markers between two runs accumulate into a bitset that
/// decides how the pending run is closed: a fragment-numbering break caps
/// the span at one, a timestamp break derives the run duration from the
/// stored per-fragment duration instead of the neighbouring timestamps.
/// The table is closed by a synthetic end marker, which sets both bits.
pub fn expand_frag_runs(entries: &[FragmentRunEntry]) -> Vec<ExpandedRun> {
    let mut expanded = Vec::new();
    let mut pending: Option<(u32, u64, u64)> = None;
    let mut flags = Discontinuities::empty();
    let mut frag_index: u64 = 0;

    let end = FragmentRunEntry::Discontinuity(DISCONTINUITY_END);
    for entry in entries.iter().copied().chain(std::iter::once(end)) {
        let next_run = match entry {
            FragmentRunEntry::Discontinuity(DISCONTINUITY_END) => {
                flags |= Discontinuities::all();
                None
            }
            FragmentRunEntry::Discontinuity(indicator) => {
                flags |= Discontinuities::from_bits_truncate(indicator);
                continue;
            }
            FragmentRunEntry::Run {
                first,
                timestamp,
                duration,
            } => Some((first, timestamp, duration)),
        };

        if let Some((first, timestamp, duration)) = pending {
            let span = if flags.contains(Discontinuities::FRAGMENT_NUMBERING) {
                1
            } else {
                next_run
                    .map(|(next_first, _, _)| next_first.saturating_sub(first))
                    .unwrap_or(1)
            };
            let run_duration = if flags.contains(Discontinuities::TIMESTAMP) {
                duration * u64::from(span)
            } else {
                next_run
                    .map(|(_, next_ts, _)| next_ts.saturating_sub(timestamp))
                    .unwrap_or(duration)
            };
            expanded.push(ExpandedRun {
                first,
                timestamp,
                duration,
                span,
                run_duration,
                frag_index,
            });
            frag_index += u64::from(span);
        }

        match next_run {
            Some(run) => {
                pending = Some(run);
                flags = Discontinuities::empty();
            }
            None => break,
        }
    }
    expanded
}

/// Maps fragment ordinals to the segment numbers they live in.
///
/// Each segment run covers segments up to the next run's first segment;
/// the final run has no end, so the iterator never finishes on it.
#[derive(Debug, Clone)]
pub struct SegmentIter {
    runs: Vec<SegmentRun>,
    idx: usize,
    seg: u32,
    pos: u32,
}

impl SegmentIter {
    /// An iterator positioned `start` fragments into the stream.
    pub fn new(seg_runs: &[SegmentRun], start: u64) -> Self {
        let runs = seg_runs.to_vec();
        let mut idx = 0;
        let mut seg = 0;
        let mut pos = 0;
        let mut start = start;
        while idx < runs.len() {
            let run = runs[idx];
            seg = run.first;
            if run.frags_per_seg == 0 {
                idx += 1;
                continue;
            }
            if idx + 1 < runs.len() {
                let end = runs[idx + 1].first;
                let total =
                    u64::from(end.saturating_sub(run.first)) * u64::from(run.frags_per_seg);
                if start >= total {
                    start -= total;
                    idx += 1;
                    continue;
                }
            }
            seg = run.first + (start / u64::from(run.frags_per_seg)) as u32;
            pos = (start % u64::from(run.frags_per_seg)) as u32;
            break;
        }
        SegmentIter {
            runs,
            idx,
            seg,
            pos,
        }
    }
}

impl Iterator for SegmentIter {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            let run = *self.runs.get(self.idx)?;
            if run.frags_per_seg == 0 {
                self.idx += 1;
                if let Some(next) = self.runs.get(self.idx) {
                    self.seg = next.first;
                    self.pos = 0;
                }
                continue;
            }
            if let Some(next) = self.runs.get(self.idx + 1) {
                if self.seg >= next.first {
                    self.idx += 1;
                    self.seg = next.first;
                    self.pos = 0;
                    continue;
                }
            }
            if self.pos < run.frags_per_seg {
                self.pos += 1;
                return Some(self.seg);
            }
            self.pos = 0;
            self.seg += 1;
        }
    }
}

/// One fragment to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentRef {
    /// Zero-based ordinal in the stream; 0 keeps its sequence headers.
    pub index: u64,
    /// Segment number for the URL template.
    pub seg: u32,
    /// Fragment number for the URL template.
    pub frag: u64,
}

/// The outer product of the expanded fragment runs and the segment
/// mapping.
#[derive(Debug, Clone)]
pub struct FragmentIter {
    runs: Vec<ExpandedRun>,
    run_idx: usize,
    offset: u64,
    segs: SegmentIter,
}

impl FragmentIter {
    pub fn new(bootstrap: &Bootstrap) -> Self {
        FragmentIter {
            runs: expand_frag_runs(&bootstrap.frag_runs),
            run_idx: 0,
            offset: 0,
            segs: SegmentIter::new(&bootstrap.seg_runs, 0),
        }
    }

    /// Continues iteration after a resume commit: `offset` fragments of
    /// run `run_idx` are already on disk and `segs` has been advanced
    /// past them.
    pub(crate) fn resume(
        runs: Vec<ExpandedRun>,
        run_idx: usize,
        offset: u64,
        segs: SegmentIter,
    ) -> Self {
        FragmentIter {
            runs,
            run_idx,
            offset,
            segs,
        }
    }
}

impl Iterator for FragmentIter {
    type Item = FragmentRef;

    fn next(&mut self) -> Option<FragmentRef> {
        loop {
            let run = *self.runs.get(self.run_idx)?;
            if self.offset >= u64::from(run.span) {
                self.run_idx += 1;
                self.offset = 0;
                continue;
            }
            let seg = self.segs.next()?;
            let item = FragmentRef {
                index: run.frag_index + self.offset,
                seg,
                frag: u64::from(run.first) + self.offset,
            };
            self.offset += 1;
            return Some(item);
        }
    }
}
