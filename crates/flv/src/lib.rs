//! # FLV container codec
//!
//! Reading and writing of FLV (Flash Video) file structures: the file
//! header, tag headers, the audio/video tag flag prefixes, and AMF0 script
//! data. The writer side produces the standard layout of header, initial
//! previous-tag-size field and framed tags; the reader side supports both
//! forward scanning and walking backwards over the trailing tag-size
//! fields, which is what resumable downloads need.

pub mod audio;
pub mod error;
pub mod header;
pub mod script;
pub mod tag;
pub mod video;
pub mod writer;

pub use error::FlvError;
pub use header::FlvHeader;
pub use tag::{TagHeader, TagType, read_prev_tag};
pub use writer::FlvWriter;
