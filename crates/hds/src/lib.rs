//! # hds
//!
//! A client for Adobe HTTP Dynamic Streaming (HDS) video-on-demand
//! streams: it fetches and parses the F4M manifest, decodes the binary
//! `abst` bootstrap describing segment/fragment geometry, downloads the
//! F4F fragments over a kept-alive HTTP session, strips the container
//! framing and muxes the embedded tags into a single FLV file, with
//! resumption against a partially written output.
//!
//! ## Features
//!
//! - Persistent HTTP session with single-retry semantics for idempotent
//!   requests and transparent gzip decoding
//! - Typed manifest and bootstrap models parsed once at the boundary
//! - Two-phase fragment downloads, so resume verification can reject a
//!   fragment after its first tag
//! - All-or-nothing fragment commits; resume relies on that invariant
//! - Akamai player verification (`pvtoken`/`hdntl`)

pub mod bootstrap;
pub mod boxes;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fragment;
pub mod manifest;
pub mod progress;
pub mod proxy;
pub mod resume;
pub mod runs;
pub mod session;
pub mod sink;
pub mod verification;

pub use bootstrap::Bootstrap;
pub use config::{HdsConfig, HdsConfigBuilder};
pub use error::HdsError;
pub use fetch::{FetchOptions, HdsDownloader};
pub use manifest::{BootstrapSource, Manifest, Media};
pub use progress::{OnProgress, Progress};
pub use proxy::ProxyConfig;
pub use runs::{FragmentIter, FragmentRef};
pub use session::HttpSession;
pub use sink::Sink;

// Cancellation is part of the public fetch surface.
pub use tokio_util::sync::CancellationToken;
