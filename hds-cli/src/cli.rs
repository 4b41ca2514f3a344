use clap::Parser;

/// Define CLI arguments
#[derive(Parser)]
#[command(
    version,
    about = "Downloader for Adobe HDS (F4M/F4F) video-on-demand streams",
    long_about = "Fetches an F4M manifest, downloads the stream's F4F fragments over a \n\
                  persistent HTTP connection and muxes them into a single FLV file.\n\
                  \n\
                  An existing output file is resumed in place: its tags are scanned to \n\
                  find the last written timestamp and the download continues from the \n\
                  fragment containing it."
)]
pub struct CliArgs {
    /// Manifest URL (…/manifest.f4m)
    #[arg(required = true, help = "URL of the F4M manifest to download")]
    pub url: String,

    /// Output file
    #[arg(
        short,
        long,
        help = "Output file path, or '-' for stdout (stdout disables resume). \
                Defaults to a name derived from the manifest URL."
    )]
    pub output: Option<String>,

    /// Resume an existing output file
    #[arg(
        long,
        help = "Resume into an existing output file. Implicit whenever the output \
                exists and is seekable."
    )]
    pub resume: bool,

    /// Always start from scratch
    #[arg(
        long,
        conflicts_with = "resume",
        help = "Ignore any existing output content and download from the start"
    )]
    pub no_resume: bool,

    /// Suppress progress output
    #[arg(short, long, help = "No progress display; only errors are logged")]
    pub quiet: bool,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable detailed debug logging")]
    pub verbose: bool,

    /// Authentication token for the manifest request
    #[arg(
        long,
        value_name = "TOKEN",
        help = "hdnea token from the service's authentication handshake"
    )]
    pub hdnea: Option<String>,

    /// Player hash for Akamai player verification
    #[arg(
        long,
        value_name = "HASH",
        help = "Player hash (base64 SHA-256) used to sign the pvtoken parameter"
    )]
    pub player_hash: Option<String>,

    /// HMAC key for Akamai player verification
    #[arg(
        long,
        value_name = "BASE64",
        help = "HMAC-SHA256 key used to sign the pvtoken parameter, base64-encoded"
    )]
    pub akamai_key: Option<String>,

    /// SOCKS5 proxy for all requests
    #[arg(
        long,
        value_name = "PROXY",
        help = "Proxy for downloads, e.g. \"socks5://127.0.0.1:1080\" or \"host:port\""
    )]
    pub proxy: Option<String>,

    /// Overall timeout per HTTP request in seconds
    #[arg(
        long,
        default_value = "30",
        help = "Overall timeout in seconds for each HTTP request (0 disables)"
    )]
    pub timeout: u64,

    /// Override the User-Agent header
    #[arg(long, value_name = "AGENT", help = "Custom User-Agent header for all requests")]
    pub user_agent: Option<String>,
}
