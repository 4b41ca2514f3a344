//! Output destinations.
//!
//! A fetch writes either to a real file, which supports the seek, read
//! and truncate operations resume needs, or to an opaque stream such as
//! stdout, which only supports appending and therefore always starts
//! fresh.

use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

/// The destination of a fetch.
pub enum Sink {
    File(File),
    Stream(Box<dyn Write + Send>),
}

impl Sink {
    pub fn file(file: File) -> Self {
        Sink::File(file)
    }

    pub fn stream(writer: impl Write + Send + 'static) -> Self {
        Sink::Stream(Box::new(writer))
    }

    /// A second readable handle over the same file, sharing the offset
    /// discipline with the writer: whoever touched the file last decides
    /// the position, and every write is preceded by an explicit seek.
    /// `None` for stream destinations.
    pub(crate) fn reopen_readable(&self) -> io::Result<Option<File>> {
        match self {
            Sink::File(file) => file.try_clone().map(Some),
            Sink::Stream(_) => Ok(None),
        }
    }

    pub(crate) fn seek_to(&mut self, position: u64) -> io::Result<()> {
        match self {
            Sink::File(file) => file.seek(SeekFrom::Start(position)).map(|_| ()),
            Sink::Stream(_) => Ok(()),
        }
    }

    /// Truncates the destination where the file type supports it.
    pub(crate) fn truncate_to(&mut self, length: u64) -> io::Result<()> {
        match self {
            Sink::File(file) => file.set_len(length),
            Sink::Stream(_) => Ok(()),
        }
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Sink::File(file) => file.write(buf),
            Sink::Stream(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Sink::File(file) => file.flush(),
            Sink::Stream(writer) => writer.flush(),
        }
    }
}
