use reqwest::StatusCode;

/// Error type for HDS download operations.
#[derive(Debug, thiserror::Error)]
pub enum HdsError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status code {0}")]
    Status(StatusCode),

    #[error("unexpected content type {got:?}, expected one of {expected:?}")]
    ContentType { expected: Vec<String>, got: String },

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FLV error: {0}")]
    Flv(#[from] flv::FlvError),

    #[error("malformed stream data: {0}")]
    Format(String),

    #[error("{kind} run table not found (quality = {quality:?})")]
    MissingRunTable {
        kind: &'static str,
        quality: Option<String>,
    },

    #[error("child manifests (media href) are not implemented")]
    ChildManifest,

    #[error("100 or more boxes in fragment")]
    TooManyBoxes,

    #[error("FLV tag over 10 MB")]
    TagTooLarge,

    #[error("no FLV tags in fragment")]
    NoTags,

    #[error("timestamp regression at {0} ms in existing output file")]
    TimestampRegression(i32),

    #[error("failed estimating resume fragment after 3 tries")]
    ResumeSearchFailed,

    #[error("invalid proxy configuration: {0}")]
    Proxy(String),

    #[error("download aborted")]
    Aborted,
}
