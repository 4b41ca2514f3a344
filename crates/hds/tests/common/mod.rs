//! A minimal HTTP/1.1 mock server and stream fixtures for the
//! end-to-end tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use flv::tag::{TAG_HEADER_SIZE, TagHeader, TagType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One canned response.
#[derive(Clone)]
pub struct CannedResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
    pub gzip: bool,
}

impl CannedResponse {
    pub fn new(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        CannedResponse {
            status: 200,
            content_type: content_type.to_owned(),
            body: body.into(),
            gzip: false,
        }
    }

    pub fn gzipped(mut self) -> Self {
        self.gzip = true;
        self
    }
}

/// Serves canned responses keyed by request path (query ignored) over
/// keep-alive connections, recording every request path seen.
pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub async fn start(routes: HashMap<String, CannedResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);

        let log = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let routes = routes.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    serve_connection(stream, routes, log).await;
                });
            }
        });

        MockServer { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    routes: Arc<HashMap<String, CannedResponse>>,
    log: Arc<Mutex<Vec<String>>>,
) {
    loop {
        let Some(head) = read_request_head(&mut stream).await else {
            return;
        };
        let Some(path) = request_path(&head) else {
            return;
        };
        log.lock().unwrap().push(path.clone());

        let payload = match routes.get(&path) {
            Some(response) => {
                let body = if response.gzip {
                    let mut encoder = flate2::write::GzEncoder::new(
                        Vec::new(),
                        flate2::Compression::default(),
                    );
                    encoder.write_all(&response.body).unwrap();
                    encoder.finish().unwrap()
                } else {
                    response.body.clone()
                };
                let encoding = if response.gzip {
                    "Content-Encoding: gzip\r\n"
                } else {
                    ""
                };
                let mut payload = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: {}\r\nContent-Length: {}\r\n{}Connection: keep-alive\r\n\r\n",
                    response.status,
                    response.content_type,
                    body.len(),
                    encoding,
                )
                .into_bytes();
                payload.extend_from_slice(&body);
                payload
            }
            None => b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: keep-alive\r\n\r\n"
                .to_vec(),
        };
        if stream.write_all(&payload).await.is_err() {
            return;
        }
    }
}

/// Reads one request head (through the blank line). `None` when the
/// client closed the connection.
pub async fn read_request_head(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let read = stream.read(&mut buf).await.ok()?;
        if read == 0 {
            return if head.is_empty() { None } else { Some(head) };
        }
        head.extend_from_slice(&buf[..read]);
        if head.windows(4).any(|window| window == b"\r\n\r\n") {
            return Some(head);
        }
    }
}

fn request_path(head: &[u8]) -> Option<String> {
    let line = head.split(|b| *b == b'\r').next()?;
    let line = std::str::from_utf8(line).ok()?;
    let target = line.split_whitespace().nth(1)?;
    Some(target.split('?').next().unwrap_or(target).to_owned())
}

// ---------------------------------------------------------------------
// Stream fixtures

/// Frames one FLV tag: header, payload, trailing size field.
pub fn make_tag(tag_type: TagType, timestamp_ms: i32, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    TagHeader::new(tag_type, payload.len() as u32, timestamp_ms)
        .write_to(&mut buf)
        .unwrap();
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&(TAG_HEADER_SIZE + payload.len() as u32).to_be_bytes());
    buf
}

pub fn aac_seq_tag(timestamp_ms: i32) -> Vec<u8> {
    make_tag(TagType::Audio, timestamp_ms, &[0xAF, 0x00, 0x12, 0x10])
}

pub fn aac_raw_tag(timestamp_ms: i32, filler: u8) -> Vec<u8> {
    make_tag(TagType::Audio, timestamp_ms, &[0xAF, 0x01, filler, filler])
}

pub fn avc_seq_tag(timestamp_ms: i32) -> Vec<u8> {
    make_tag(TagType::Video, timestamp_ms, &[0x17, 0x00, 0x01, 0x64, 0x00])
}

pub fn avc_nalu_tag(timestamp_ms: i32, filler: u8) -> Vec<u8> {
    make_tag(
        TagType::Video,
        timestamp_ms,
        &[0x27, 0x01, 0x00, 0x00, 0x00, filler],
    )
}

fn boxed(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(payload.len() as u32 + 8).to_be_bytes());
    buf.extend_from_slice(box_type);
    buf.extend_from_slice(payload);
    buf
}

/// An F4F fragment with both sequence headers, one audio and one video
/// data tag, all timestamped relative to `base`.
pub fn fragment(base: i32) -> Vec<u8> {
    let tags: Vec<u8> = [
        aac_seq_tag(base),
        avc_seq_tag(base),
        aac_raw_tag(base + 10, base as u8),
        avc_nalu_tag(base + 20, base as u8),
    ]
    .concat();
    let mut data = boxed(b"afra", &[0, 0, 0, 0]);
    data.extend_from_slice(&boxed(b"mdat", &tags));
    data
}

/// The tags the muxer keeps from [`fragment`].
pub fn fragment_kept_tags(base: i32, strip_headers: bool) -> Vec<u8> {
    let mut kept = Vec::new();
    if !strip_headers {
        kept.extend_from_slice(&aac_seq_tag(base));
        kept.extend_from_slice(&avc_seq_tag(base));
    }
    kept.extend_from_slice(&aac_raw_tag(base + 10, base as u8));
    kept.extend_from_slice(&avc_nalu_tag(base + 20, base as u8));
    kept
}

/// An `abst` bootstrap for a VOD stream: timescale 1000, 4-second
/// fragments enumerated one run each, one segment run with
/// `frags_per_seg` fragments per segment.
pub fn bootstrap_bytes(fragments: u32, frags_per_seg: u32) -> Vec<u8> {
    let mut asrt = vec![0, 0, 0, 0]; // version, flags
    asrt.push(0); // quality table
    asrt.extend_from_slice(&1u32.to_be_bytes());
    asrt.extend_from_slice(&1u32.to_be_bytes()); // first segment
    asrt.extend_from_slice(&frags_per_seg.to_be_bytes());

    let mut afrt = vec![0, 0, 0, 0];
    afrt.extend_from_slice(&1000u32.to_be_bytes()); // timescale
    afrt.push(0); // quality table
    afrt.extend_from_slice(&fragments.to_be_bytes());
    for i in 0..fragments {
        afrt.extend_from_slice(&(i + 1).to_be_bytes());
        afrt.extend_from_slice(&(u64::from(i) * 4000).to_be_bytes());
        afrt.extend_from_slice(&4000u32.to_be_bytes());
    }

    let mut payload = vec![0, 0, 0, 0]; // version, flags
    payload.extend_from_slice(&0u32.to_be_bytes()); // bootstrap version
    payload.push(0); // profile/live/update
    payload.extend_from_slice(&1000u32.to_be_bytes()); // timescale
    payload.extend_from_slice(&(u64::from(fragments) * 4000).to_be_bytes());
    payload.extend_from_slice(&0u64.to_be_bytes()); // SMPTE offset
    payload.push(0); // movie identifier ""
    payload.push(0); // server table
    payload.push(0); // quality table
    payload.push(0); // DRM data
    payload.push(0); // metadata
    payload.push(1);
    payload.extend_from_slice(&boxed(b"asrt", &asrt));
    payload.push(1);
    payload.extend_from_slice(&boxed(b"afrt", &afrt));

    boxed(b"abst", &payload)
}

/// An `onMetaData` script payload with just a duration.
pub fn onmetadata(duration: f64) -> Vec<u8> {
    use flv::script::{Amf0Encoder, Amf0Value};

    let mut buf = Vec::new();
    Amf0Encoder::encode_string(&mut buf, "onMetaData").unwrap();
    Amf0Encoder::encode(
        &mut buf,
        &Amf0Value::EcmaArray(vec![("duration".to_owned(), Amf0Value::Number(duration))]),
    )
    .unwrap();
    buf
}

fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// An F4M manifest with one media entry (`url="stream"`) and an inline
/// bootstrap.
pub fn manifest_xml(bootstrap: &[u8], metadata: Option<&[u8]>, media_attrs: &str) -> String {
    let metadata = match metadata {
        Some(metadata) => format!("\n    <metadata>{}</metadata>", encode_base64(metadata)),
        None => String::new(),
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest xmlns="http://ns.adobe.com/f4m/1.0">
  <id>show</id>
  <duration>12</duration>
  <bootstrapInfo profile="named" id="bootstrap1">{}</bootstrapInfo>
  <media url="stream" bitrate="1500" bootstrapInfoId="bootstrap1"{media_attrs}>{metadata}
  </media>
</manifest>"#,
        encode_base64(bootstrap),
    )
}
