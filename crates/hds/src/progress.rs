use std::sync::Arc;

/// A snapshot of download progress, reported around each fragment.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Bytes written to the destination so far.
    pub bytes_written: u64,
    /// Media position in seconds of the most recent tag.
    pub seconds: f64,
    /// Total media duration in seconds, when known.
    pub duration: Option<f64>,
}

impl Progress {
    /// Fractional position in `0.0..=1.0`, when the duration is known.
    pub fn fraction(&self) -> Option<f64> {
        let duration = self.duration?;
        if duration > 0.0 {
            Some((self.seconds / duration).clamp(0.0, 1.0))
        } else {
            None
        }
    }
}

/// A callback function for progress updates.
pub type OnProgress = Arc<dyn Fn(&Progress) + Send + Sync>;

pub(crate) fn report(
    on_progress: Option<&OnProgress>,
    bytes_written: u64,
    seconds: f64,
    duration: Option<f64>,
) {
    if let Some(callback) = on_progress {
        callback(&Progress {
            bytes_written,
            seconds,
            duration,
        });
    }
}
