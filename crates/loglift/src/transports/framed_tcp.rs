//! 🔌 The framed TCP transport: the "native binary" family.
//!
//! 🧠 Wire format, one request per connection:
//! ```text
//! ┌──────────────┬───────────────────────────────┐
//! │ u32 BE len   │ MessagePack body (named maps) │
//! └──────────────┴───────────────────────────────┘
//! ```
//! The client sends `Bulk` or `PutTemplate`, the backend answers `Ack { ok, reason }`.
//! That's the whole protocol. No per-item verdicts: a batch lands or it doesn't, atomically.
//! Because of that, this transport is synchronous from the dispatcher's point of view and the
//! whole batch goes to failover on any failure. 🦆
//!
//! ⚠️ Frames above 16 MiB are refused in both directions. A frame that big is either a bug or
//! an attack, and we're not in the business of finding out which.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

use crate::common::{BatchItem, BulkRequest, BulkResponse, IndexTemplate};
use crate::connection::endpoints::ServerEndpoint;
use crate::connection::provider::ClientProvider;
use crate::connection::settings::{Credentials, TransportSettings};
use crate::error::{ConfigurationError, TransportError};
use crate::transports::{TemplateAck, Transport};

/// 📏 Largest frame body either side will accept.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// 📦 Everything that travels over the framed socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    Bulk {
        auth: Option<Credentials>,
        items: Vec<BatchItem>,
    },
    PutTemplate {
        auth: Option<Credentials>,
        name: String,
        source_json: String,
    },
    Ack {
        ok: bool,
        reason: Option<String>,
    },
}

/// 🔧 Prefixes the payload with its big-endian length, or refuses if it's too big.
pub fn frame_payload(payload: &[u8], max_size: usize) -> Option<Vec<u8>> {
    if payload.len() > max_size {
        return None;
    }
    let len = u32::try_from(payload.len()).ok()?;
    let mut framed = Vec::with_capacity(payload.len().checked_add(4)?);
    framed.extend(len.to_be_bytes());
    framed.extend_from_slice(payload);
    Some(framed)
}

/// 📤 Encodes a frame as named-map MessagePack and length-prefixes it.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, TransportError> {
    let payload = rmp_serde::to_vec_named(frame).map_err(|e| TransportError::Codec(e.to_string()))?;
    frame_payload(&payload, MAX_FRAME_BYTES).ok_or_else(|| {
        TransportError::Codec(format!(
            "frame of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_FRAME_BYTES
        ))
    })
}

pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// 📥 Reads one length-prefixed frame. The length is checked before a single body byte is buffered.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, TransportError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_BYTES {
        return Err(TransportError::Codec(format!(
            "peer announced a {len} byte frame, limit is {MAX_FRAME_BYTES}"
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    rmp_serde::from_slice(&body).map_err(|e| TransportError::Codec(e.to_string()))
}

/// 🏭 Builds `FramedTcpTransport`s. Nothing is dialed until the first request.
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedTcpClientProvider;

#[async_trait]
impl ClientProvider for FramedTcpClientProvider {
    async fn create_client(
        &self,
        settings: TransportSettings,
    ) -> Result<Arc<dyn Transport>, ConfigurationError> {
        Ok(Arc::new(FramedTcpTransport::new(settings)?))
    }
}

/// 🔌 One request, one connection, one verdict.
#[derive(Debug)]
pub struct FramedTcpTransport {
    endpoints: Vec<ServerEndpoint>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    credentials: Option<Credentials>,
}

impl FramedTcpTransport {
    pub fn new(settings: TransportSettings) -> Result<Self, ConfigurationError> {
        if settings.endpoints.is_empty() {
            return Err(ConfigurationError::NoServers);
        }
        if settings.compression {
            debug!("🗜️ Compression is an HTTP thing; the framed transport ignores it");
        }
        if settings.discovery_enabled {
            warn!("🔍 Node discovery is only supported over HTTP; using the configured endpoints as-is");
        }
        if !settings.headers.is_empty() {
            debug!("📋 {} extra header(s) ignored by the framed transport", settings.headers.len());
        }
        Ok(Self {
            endpoints: settings.endpoints,
            connect_timeout: settings.connect_timeout,
            read_timeout: settings.read_timeout,
            credentials: settings.credentials,
        })
    }

    /// 🔌 Dials endpoints in configuration order until one picks up.
    async fn connect(&self) -> Result<TcpStream, TransportError> {
        let mut failures = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            let authority = endpoint.authority();
            match with_deadline(self.connect_timeout, TcpStream::connect(&authority)).await {
                Ok(stream) => {
                    trace!("🔌 Connected to {}", authority);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("🔌 {} didn't pick up: {}", authority, e);
                    failures.push(format!("{authority}: {e}"));
                }
            }
        }
        Err(TransportError::Connect(failures.join("; ")))
    }

    /// 📡 Send one frame, read one `Ack`.
    async fn round_trip(&self, frame: &Frame) -> Result<(bool, Option<String>), TransportError> {
        let mut stream = self.connect().await?;
        write_frame(&mut stream, frame).await?;
        match with_deadline(self.read_timeout, read_frame(&mut stream)).await? {
            Frame::Ack { ok, reason } => Ok((ok, reason)),
            other => Err(TransportError::Protocol(format!(
                "expected an Ack, the backend sent {other:?}"
            ))),
        }
    }
}

/// ⏱️ Runs the future under an optional deadline. `None` means "wait as long as it takes".
async fn with_deadline<T, E, F>(deadline: Option<Duration>, future: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, E>>,
    TransportError: From<E>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, future).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TransportError::Timeout(limit.as_millis() as u64)),
        },
        None => Ok(future.await?),
    }
}

#[async_trait]
impl Transport for FramedTcpTransport {
    fn name(&self) -> &'static str {
        "framed_tcp"
    }

    fn supports_async(&self) -> bool {
        false
    }

    async fn submit_bulk(&self, request: &BulkRequest) -> Result<BulkResponse, TransportError> {
        if request.is_empty() {
            return Ok(BulkResponse::accepted());
        }
        let frame = Frame::Bulk {
            auth: self.credentials.clone(),
            items: request.items().to_vec(),
        };
        let (ok, reason) = self.round_trip(&frame).await?;
        if ok {
            trace!("🚀 Framed backend took all {} items", request.len());
            Ok(BulkResponse::accepted())
        } else {
            Ok(BulkResponse::rejected(
                reason.unwrap_or_else(|| "backend refused the batch".to_string()),
            ))
        }
    }

    async fn put_template(&self, template: &IndexTemplate) -> Result<TemplateAck, TransportError> {
        let source_json =
            serde_json::to_string(&template.source).map_err(|e| TransportError::Codec(e.to_string()))?;
        let frame = Frame::PutTemplate {
            auth: self.credentials.clone(),
            name: template.name.clone(),
            source_json,
        };
        let (ok, reason) = self.round_trip(&frame).await?;
        Ok(if ok {
            TemplateAck::acknowledged()
        } else {
            TemplateAck::refused(reason.unwrap_or_else(|| "backend refused the template".to_string()))
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! 🧪 A tiny framed backend on a loopback port. Records what it receives, answers from a script.

    use std::collections::VecDeque;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use tokio::net::TcpListener;

    use super::*;

    pub(crate) struct StubBackend {
        pub(crate) addr: SocketAddr,
        pub(crate) received: Arc<Mutex<Vec<Frame>>>,
    }

    impl StubBackend {
        /// 🎭 Answers each connection with the next scripted `Ack`; `None` means "go silent".
        pub(crate) async fn start(script: Vec<Option<Frame>>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let received = Arc::new(Mutex::new(Vec::new()));
            let log = received.clone();
            let mut script: VecDeque<_> = script.into();
            tokio::spawn(async move {
                while let Some(reply) = script.pop_front() {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    let Ok(frame) = read_frame(&mut socket).await else {
                        continue;
                    };
                    log.lock().unwrap().push(frame);
                    match reply {
                        Some(ack) => {
                            let _ = write_frame(&mut socket, &ack).await;
                        }
                        None => {
                            // 🤐 hold the socket open and say nothing
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
            Self { addr, received }
        }

        pub(crate) fn uri(&self) -> String {
            format!("tcp://{}", self.addr)
        }
    }

    pub(crate) fn ack(ok: bool, reason: Option<&str>) -> Option<Frame> {
        Some(Frame::Ack {
            ok,
            reason: reason.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::test_support::{StubBackend, ack};
    use super::*;
    use crate::batch::BatchOperations;
    use crate::connection::settings::{ConnectionConfig, ConnectionSettings};

    fn transport_for(uris: &str) -> FramedTcpTransport {
        let config = ConnectionConfig::new(uris).unwrap();
        FramedTcpTransport::new(TransportSettings::from_config(&config)).unwrap()
    }

    fn two_item_batch() -> BulkRequest {
        let ops = BatchOperations::new();
        ops.build(vec![
            ops.create_batch_item("logs", r#"{"n":1}"#).with_id("a"),
            ops.create_batch_item("logs", r#"{"n":2}"#),
        ])
    }

    fn dead_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn the_one_where_frames_get_a_big_endian_length_prefix() {
        let framed = frame_payload(b"hello", 16).unwrap();
        assert_eq!(&framed[..4], &[0, 0, 0, 5]);
        assert_eq!(&framed[4..], b"hello");
        assert!(frame_payload(&[0u8; 17], 16).is_none());
    }

    #[tokio::test]
    async fn the_one_where_an_oversized_announcement_is_refused_before_buffering() {
        let mut wire: &[u8] = &(MAX_FRAME_BYTES as u32 + 1).to_be_bytes();
        let err = read_frame(&mut wire).await.unwrap_err();
        assert!(matches!(err, TransportError::Codec(_)));
    }

    #[tokio::test]
    async fn the_one_where_the_backend_takes_the_whole_batch() {
        let backend = StubBackend::start(vec![ack(true, None)]).await;
        let transport = transport_for(&backend.uri());

        let response = transport.submit_bulk(&two_item_batch()).await.unwrap();
        assert!(response.succeeded);
        assert!(response.items.is_empty());

        let received = backend.received.lock().unwrap().clone();
        match &received[0] {
            Frame::Bulk { auth, items } => {
                assert!(auth.is_none());
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].id.as_deref(), Some("a"));
                assert_eq!(items[1].id, None);
            }
            other => panic!("💀 expected a Bulk frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn the_one_where_the_backend_says_no_to_everything() {
        let backend = StubBackend::start(vec![ack(false, Some("disk full"))]).await;
        let transport = transport_for(&backend.uri());

        let response = transport.submit_bulk(&two_item_batch()).await.unwrap();
        assert!(!response.succeeded);
        assert_eq!(response.error_message.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn the_one_where_the_first_node_is_down_and_the_second_picks_up() {
        let backend = StubBackend::start(vec![ack(true, None)]).await;
        let transport = transport_for(&format!("tcp://127.0.0.1:{};{}", dead_port(), backend.uri()));

        assert!(transport.submit_bulk(&two_item_batch()).await.unwrap().succeeded);
    }

    #[tokio::test]
    async fn the_one_where_every_node_is_down() {
        let transport = transport_for(&format!("tcp://127.0.0.1:{}", dead_port()));
        let err = transport.submit_bulk(&two_item_batch()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }

    #[tokio::test]
    async fn the_one_where_the_backend_goes_quiet_and_the_read_timeout_fires() {
        let backend = StubBackend::start(vec![None]).await;
        let mut settings = ConnectionSettings::new(backend.uri());
        settings.read_timeout_ms = 50;
        let config = ConnectionConfig::from_settings(settings).unwrap();
        let transport = FramedTcpTransport::new(TransportSettings::from_config(&config)).unwrap();

        let err = transport.submit_bulk(&two_item_batch()).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn the_one_where_templates_travel_as_json_text_with_credentials() {
        let backend = StubBackend::start(vec![ack(true, None), ack(false, Some("bad mapping"))]).await;
        let config = ConnectionConfig::new(&backend.uri()).unwrap();
        let mut settings = TransportSettings::from_config(&config);
        settings.credentials = Some(Credentials::ApiKey("c2VjcmV0".to_string()));
        let transport = FramedTcpTransport::new(settings).unwrap();

        let template = IndexTemplate::new("logs", json!({"index_patterns": ["logs-*"]}));
        assert!(transport.put_template(&template).await.unwrap().acknowledged);
        let refused = transport.put_template(&template).await.unwrap();
        assert_eq!(refused.reason.as_deref(), Some("bad mapping"));

        let received = backend.received.lock().unwrap().clone();
        assert_eq!(
            received[0],
            Frame::PutTemplate {
                auth: Some(Credentials::ApiKey("c2VjcmV0".to_string())),
                name: "logs".to_string(),
                source_json: r#"{"index_patterns":["logs-*"]}"#.to_string(),
            }
        );
    }
}
