//! F4M manifest parsing.
//!
//! The manifest is the XML document (namespace
//! `http://ns.adobe.com/f4m/1.0`) that names the media streams and either
//! embeds the bootstrap box as base64 or points at it with a URL. The
//! serde structs mirror the document; [`Manifest::parse`] resolves them
//! into the typed records the driver consumes.

use bytes::Bytes;
use serde::Deserialize;

use crate::error::HdsError;

#[derive(Debug, Deserialize)]
struct F4mDocument {
    #[serde(rename = "baseURL")]
    base_url: Option<String>,
    duration: Option<String>,
    #[serde(rename = "pv-2.0")]
    pv_2_0: Option<String>,
    #[serde(rename = "bootstrapInfo", default)]
    bootstrap_info: Vec<BootstrapInfoElement>,
    #[serde(default)]
    media: Vec<MediaElement>,
}

#[derive(Debug, Deserialize)]
struct BootstrapInfoElement {
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "$text")]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaElement {
    #[serde(rename = "@url")]
    url: String,
    #[serde(rename = "@bitrate")]
    bitrate: Option<u32>,
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@bootstrapInfoId")]
    bootstrap_info_id: Option<String>,
    metadata: Option<String>,
}

/// Where the bootstrap box for a media entry comes from.
#[derive(Debug, Clone)]
pub enum BootstrapSource {
    /// Base64 data embedded in the manifest, already decoded.
    Inline(Bytes),
    /// A URL (possibly relative to the manifest base URL) serving
    /// `video/abst`.
    Remote(String),
}

/// One `<media>` entry with its bootstrap attached.
#[derive(Debug, Clone)]
pub struct Media {
    pub url: String,
    pub bitrate: Option<u32>,
    /// Reference to a child manifest. Selecting such an entry is not
    /// implemented and must fail the fetch.
    pub href: Option<String>,
    /// Decoded `onMetaData` script payload.
    pub metadata: Option<Bytes>,
    pub bootstrap: BootstrapSource,
}

/// A parsed and resolved F4M manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub base_url: String,
    pub duration: Option<f64>,
    pub pv_2_0: Option<String>,
    pub media: Vec<Media>,
}

impl Manifest {
    /// Parses manifest XML fetched from `request_url`, which doubles as
    /// the base URL when the document does not carry one.
    pub fn parse(xml: &str, request_url: &str) -> Result<Manifest, HdsError> {
        let document: F4mDocument = quick_xml::de::from_str(xml)
            .map_err(|e| HdsError::Format(format!("invalid F4M manifest: {e}")))?;

        let duration = match &document.duration {
            Some(text) => {
                let value: f64 = text.trim().parse().map_err(|_| {
                    HdsError::Format(format!("invalid manifest duration {text:?}"))
                })?;
                (value > 0.0).then_some(value)
            }
            None => None,
        };

        let mut media = Vec::with_capacity(document.media.len());
        for element in &document.media {
            let bootstrap = document
                .bootstrap_info
                .iter()
                .find(|info| info.id == element.bootstrap_info_id)
                .ok_or_else(|| {
                    HdsError::Format(format!(
                        "media references unknown bootstrapInfo {:?}",
                        element.bootstrap_info_id
                    ))
                })?;
            let bootstrap = match (&bootstrap.url, &bootstrap.data) {
                (Some(url), _) => BootstrapSource::Remote(url.clone()),
                (None, Some(data)) => BootstrapSource::Inline(decode_base64(data)?),
                (None, None) => {
                    return Err(HdsError::Format(
                        "bootstrapInfo carries neither a URL nor data".to_owned(),
                    ));
                }
            };

            let metadata = element
                .metadata
                .as_deref()
                .map(decode_base64)
                .transpose()?;

            media.push(Media {
                url: element.url.clone(),
                bitrate: element.bitrate,
                href: element.href.clone(),
                metadata,
                bootstrap,
            });
        }

        Ok(Manifest {
            base_url: document
                .base_url
                .unwrap_or_else(|| request_url.to_owned()),
            duration,
            pv_2_0: document.pv_2_0,
            media,
        })
    }

    /// The media entry to download: the last one listed, which the service
    /// orders as the highest quality.
    pub fn select_media(&self) -> Option<&Media> {
        self.media.last()
    }
}

fn decode_base64(text: &str) -> Result<Bytes, HdsError> {
    use base64::Engine;

    // Element text regularly carries the XML document's own whitespace.
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let data = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| HdsError::Format(format!("invalid base64 in manifest: {e}")))?;
    Ok(Bytes::from(data))
}
