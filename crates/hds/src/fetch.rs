//! The fetch driver: manifest to finished FLV file.

use flv::script::ScriptData;
use flv::writer::FlvWriter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::bootstrap::Bootstrap;
use crate::config::HdsConfig;
use crate::error::HdsError;
use crate::fragment::FragmentStream;
use crate::manifest::{BootstrapSource, Manifest, Media};
use crate::progress::{OnProgress, report};
use crate::resume::resume_point;
use crate::runs::FragmentIter;
use crate::session::HttpSession;
use crate::sink::Sink;
use crate::verification::{QUERY_VALUE, player_verification};

pub(crate) const MANIFEST_TYPES: &[&str] = &["video/f4m"];
pub(crate) const BOOTSTRAP_TYPES: &[&str] = &["video/abst"];
pub(crate) const FRAGMENT_TYPES: &[&str] = &["video/f4f"];

/// Per-fetch options beyond the session configuration.
pub struct FetchOptions {
    /// The `hdnea` authentication token from the service handshake.
    pub hdnea: Option<String>,
    /// Whether to look for a resume point in an existing destination.
    pub allow_resume: bool,
    /// Progress callback, invoked around each fragment.
    pub on_progress: Option<OnProgress>,
    /// Cooperative cancellation; checked between fragment phases.
    pub cancel: CancellationToken,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            hdnea: None,
            allow_resume: true,
            on_progress: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// HDS downloader: one HTTP session, driving manifest, bootstrap and
/// fragment requests into a muxed FLV.
pub struct HdsDownloader {
    session: HttpSession,
    config: HdsConfig,
}

impl HdsDownloader {
    pub fn new() -> Result<Self, HdsError> {
        Self::with_config(HdsConfig::default())
    }

    pub fn with_config(config: HdsConfig) -> Result<Self, HdsError> {
        Ok(HdsDownloader {
            session: HttpSession::new(&config)?,
            config,
        })
    }

    /// Downloads the stream behind `url` into `sink`. Returns the number
    /// of bytes the destination holds on completion.
    pub async fn fetch(
        &self,
        url: &str,
        sink: &mut Sink,
        options: &FetchOptions,
    ) -> Result<u64, HdsError> {
        let manifest_url = manifest_url(url, options.hdnea.as_deref())?;
        info!(url = %manifest_url, "fetching manifest");
        let response = self.session.get(&manifest_url, MANIFEST_TYPES).await?;
        let manifest_xml = response.bytes().await?;
        let manifest = Manifest::parse(&String::from_utf8_lossy(&manifest_xml), &manifest_url)?;

        let player_suffix = player_verification(
            manifest.pv_2_0.as_deref(),
            self.config.player.as_deref(),
            self.config.akamai_key.as_deref(),
        )?;

        let media = manifest
            .select_media()
            .ok_or_else(|| HdsError::Format("manifest has no media entries".to_owned()))?;
        if media.href.is_some() {
            // A child manifest would have to be fetched and recursed into.
            return Err(HdsError::ChildManifest);
        }

        let bootstrap = self
            .get_bootstrap(media, &manifest.base_url, &player_suffix)
            .await?;
        let media_url = media_base_url(media, &bootstrap, &manifest.base_url)?;
        let duration = stream_duration(&manifest, &bootstrap, media);
        debug!(media_url = %media_url, duration, "stream resolved");

        let on_progress = options.on_progress.as_ref();

        let resumed = if options.allow_resume {
            resume_point(
                sink,
                media.metadata.as_ref(),
                &bootstrap,
                &self.session,
                &media_url,
                &player_suffix,
                duration,
                on_progress,
            )
            .await?
        } else {
            None
        };

        let (frags, mut writer) = match resumed {
            Some((frags, position)) => (frags, FlvWriter::with_position(&mut *sink, position)),
            None => {
                sink.seek_to(0)?;
                sink.truncate_to(0)?;
                let mut writer = FlvWriter::new(&mut *sink);
                // Audio and video tags are assumed to be present.
                writer.write_header(true, true)?;
                if let Some(metadata) = &media.metadata {
                    writer.write_script_tag(metadata)?;
                }
                report(on_progress, writer.position(), 0.0, duration);
                (FragmentIter::new(&bootstrap), writer)
            }
        };

        for fragment in frags {
            if options.cancel.is_cancelled() {
                return Err(HdsError::Aborted);
            }
            let url = fragment_url(&media_url, fragment.seg, fragment.frag, &player_suffix)?;
            debug!(index = fragment.index, url = %url, "fetching fragment");
            let response = self.session.get(&url, FRAGMENT_TYPES).await?;

            let mut stream = FragmentStream::new(response);
            let first_ts = stream.read_first_timestamp().await?;
            report(
                on_progress,
                writer.position(),
                f64::from(first_ts) / 1000.0,
                duration,
            );
            if options.cancel.is_cancelled() {
                return Err(HdsError::Aborted);
            }

            let parsed = stream.finish(fragment.index != 0).await?;
            if options.cancel.is_cancelled() {
                return Err(HdsError::Aborted);
            }

            writer.write_raw(&parsed.body)?;
            report(
                on_progress,
                writer.position(),
                f64::from(parsed.last_timestamp) / 1000.0,
                duration,
            );
        }

        writer.flush()?;
        let bytes_written = writer.position();
        info!(bytes_written, "download complete");
        Ok(bytes_written)
    }

    async fn get_bootstrap(
        &self,
        media: &Media,
        base_url: &str,
        player_suffix: &str,
    ) -> Result<Bootstrap, HdsError> {
        let data = match &media.bootstrap {
            BootstrapSource::Inline(data) => data.clone(),
            BootstrapSource::Remote(bootstrap_url) => {
                let mut url = Url::parse(base_url)?.join(bootstrap_url)?;
                if !player_suffix.is_empty() {
                    url = url.join(player_suffix)?;
                }
                info!(url = %url, "fetching bootstrap");
                let response = self.session.get(url.as_str(), BOOTSTRAP_TYPES).await?;
                response.bytes().await?
            }
        };
        let bootstrap = Bootstrap::parse(&data)?;
        debug!(
            movie_identifier = %bootstrap.movie_identifier,
            seg_runs = bootstrap.seg_runs.len(),
            frag_runs = bootstrap.frag_runs.len(),
            "bootstrap parsed"
        );
        Ok(bootstrap)
    }
}

/// Appends the `hdcore` (and `hdnea`) parameters the CDN requires,
/// keeping any query the URL already carries.
pub(crate) fn manifest_url(url: &str, hdnea: Option<&str>) -> Result<String, HdsError> {
    let mut parsed = Url::parse(url)?;

    // Requests without "hdcore" are answered with 403 Forbidden.
    let mut query = match parsed.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&"),
        _ => String::new(),
    };
    query.push_str("hdcore=");
    if let Some(hdnea) = hdnea {
        query.push_str("&hdnea=");
        query.extend(percent_encoding::utf8_percent_encode(hdnea, QUERY_VALUE));
    }
    parsed.set_query(Some(&query));
    Ok(parsed.into())
}

/// `<media_url>Seg<seg>-Frag<frag>`, with the player verification suffix
/// replacing any query.
pub(crate) fn fragment_url(
    media_url: &str,
    seg: u32,
    frag: u64,
    player_suffix: &str,
) -> Result<String, HdsError> {
    let url = format!("{media_url}Seg{seg}-Frag{frag}");
    if player_suffix.is_empty() {
        Ok(url)
    } else {
        Ok(Url::parse(&url)?.join(player_suffix)?.into())
    }
}

/// Joins the media path with the movie identifier and quality modifier,
/// then resolves it against the bootstrap server and the manifest base.
fn media_base_url(
    media: &Media,
    bootstrap: &Bootstrap,
    base_url: &str,
) -> Result<String, HdsError> {
    let mut path = format!("{}{}", media.url, bootstrap.movie_identifier);
    if let Some(quality) = &bootstrap.highest_quality {
        path.push_str(quality);
    }
    if let Some(server) = &bootstrap.server_base_url {
        match Url::parse(server) {
            Ok(server) => path = server.join(&path)?.into(),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                warn!(server = %server, "ignoring relative server base URL");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(Url::parse(base_url)?.join(&path)?.into())
}

/// Duration in seconds: the manifest value, else the bootstrap end time,
/// else the `onMetaData` duration; first positive one wins.
fn stream_duration(manifest: &Manifest, bootstrap: &Bootstrap, media: &Media) -> Option<f64> {
    if manifest.duration.is_some() {
        return manifest.duration;
    }
    if let Some(duration) = bootstrap.duration_seconds() {
        return Some(duration);
    }
    let metadata = media.metadata.as_ref()?;
    match ScriptData::demux(metadata) {
        Ok(script) if script.name == "onMetaData" => script.duration(),
        Ok(script) => {
            warn!(name = %script.name, "unexpected metadata script name");
            None
        }
        Err(err) => {
            warn!(error = %err, "undecodable media metadata");
            None
        }
    }
}
