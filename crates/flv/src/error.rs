use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlvError {
    #[error("invalid FLV signature")]
    InvalidSignature,
    #[error("unsupported FLV version: {0}")]
    UnsupportedVersion(u8),
    #[error("invalid FLV header size: {0}")]
    InvalidHeaderSize(u32),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid script data: {0}")]
    ScriptData(&'static str),
}
