//! 📡 The HTTP transport: Elasticsearch `_bulk` and `_template` over reqwest.
//!
//! 🧠 Knowledge graph:
//! - One `reqwest::Client`, built once by `HttpClientProvider`, reused for every request.
//! - In-flight requests are capped by a semaphore sized to `max_total_connections`.
//!   The idle pool per host is `max_connections_per_route`. Same knobs, new plumbing.
//! - Endpoints rotate round-robin per request. With discovery on, the cluster's own
//!   `http.publish_address` list joins the rotation at construction time.
//! - Auth: API key beats basic auth. Not a democracy. Never was.
//!
//! 🚰 A non-2xx `_bulk` answer is not an `Err`. It's a `BulkResponse` that says "no".
//! `Err` is reserved for "we never got an answer worth reading". 🦆

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::Method;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};
use url::Url;

use crate::common::{BulkRequest, BulkResponse, IndexTemplate, ItemOutcome};
use crate::connection::endpoints::ServerEndpoint;
use crate::connection::provider::ClientProvider;
use crate::connection::settings::{Credentials, TransportSettings};
use crate::error::{ConfigurationError, TransportError};
use crate::transports::{TemplateAck, Transport};

/// 🏭 Builds `HttpTransport`s. Stateless; the interesting state lives in the settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpClientProvider;

#[async_trait]
impl ClientProvider for HttpClientProvider {
    async fn create_client(
        &self,
        settings: TransportSettings,
    ) -> Result<Arc<dyn Transport>, ConfigurationError> {
        let discovery_enabled = settings.discovery_enabled;
        let mut transport = HttpTransport::new(settings)?;
        if discovery_enabled {
            transport.discover_nodes().await;
        }
        Ok(Arc::new(transport))
    }
}

/// 📡 The reqwest-backed transport. Partial failures are visible per item.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoints: Vec<ServerEndpoint>,
    next_endpoint: AtomicUsize,
    in_flight: Semaphore,
    compression: bool,
    credentials: Option<Credentials>,
    headers: Vec<(String, String)>,
}

impl HttpTransport {
    /// 🚀 Builds the reqwest client from finished settings. No network traffic happens here.
    pub fn new(settings: TransportSettings) -> Result<Self, ConfigurationError> {
        // 🚫 an `Auth` may have emptied the list; round-robin over nothing is a divide by zero
        if settings.endpoints.is_empty() {
            return Err(ConfigurationError::NoServers);
        }
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(settings.max_connections_per_route);
        if let Some(connect_timeout) = settings.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(read_timeout) = settings.read_timeout {
            builder = builder.read_timeout(read_timeout);
        }
        if settings.accept_invalid_certs {
            warn!("🔓 TLS certificate validation is OFF. This had better be a test cluster.");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            // -- 💀 The HTTP client refused to be born. Usually a TLS backend with opinions.
            .map_err(|e| ConfigurationError::ClientConstruction(e.to_string()))?;

        debug!(
            "🔧 HTTP transport ready: {} endpoint(s), {} max in flight, {} idle per host, compression={}",
            settings.endpoints.len(),
            settings.max_total_connections,
            settings.max_connections_per_route,
            settings.compression
        );

        Ok(Self {
            client,
            endpoints: settings.endpoints,
            next_endpoint: AtomicUsize::new(0),
            in_flight: Semaphore::new(settings.max_total_connections),
            compression: settings.compression,
            credentials: settings.credentials,
            headers: settings.headers,
        })
    }

    pub fn endpoints(&self) -> &[ServerEndpoint] {
        &self.endpoints
    }

    /// 🔍 Asks the seeds who else is in the cluster and adds them to the rotation.
    ///
    /// First seed that answers wins. If nobody answers, the seed list stays as-is and we
    /// log a warning instead of refusing to start. Discovery is a nice-to-have, not a gate.
    pub async fn discover_nodes(&mut self) {
        for seed in self.endpoints.clone() {
            let url = format!("{}/_nodes/http", seed.base_url());
            let outcome = async {
                let response = self.request(Method::GET, &url).send().await?;
                let response = response.error_for_status()?;
                let bytes = response.bytes().await?;
                Ok::<_, TransportError>(serde_json::from_slice::<NodesHttpResponse>(&bytes).map_err(
                    |e| TransportError::Protocol(format!("unreadable _nodes/http body: {e}")),
                )?)
            }
            .await;

            match outcome {
                Ok(nodes) => {
                    let before = self.endpoints.len();
                    for address in nodes.publish_addresses() {
                        if let Some(endpoint) = endpoint_from_publish_address(&seed.scheme, address)
                            && !self.endpoints.contains(&endpoint)
                        {
                            self.endpoints.push(endpoint);
                        }
                    }
                    debug!(
                        "🔍 Discovery via {} found {} new node(s), rotation is now {}",
                        seed,
                        self.endpoints.len() - before,
                        self.endpoints.len()
                    );
                    return;
                }
                Err(e) => warn!("🔍 Node discovery via {} failed, trying the next seed: {}", seed, e),
            }
        }
        warn!("🔍 Node discovery found nobody to ask. Sticking with the configured seed list.");
    }

    fn next_base_url(&self) -> String {
        let slot = self.next_endpoint.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        self.endpoints[slot].base_url()
    }

    /// 🔒 Request builder with auth and extra headers applied. API key wins over basic auth.
    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, url);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        match self.credentials {
            Some(Credentials::ApiKey(ref api_key)) => {
                request.header("Authorization", format!("ApiKey {api_key}"))
            }
            Some(Credentials::Basic {
                ref username,
                ref password,
            }) => request.basic_auth(username, password.as_ref()),
            None => request,
        }
    }

    fn encode_body(&self, body: String) -> Result<Vec<u8>, TransportError> {
        if !self.compression {
            return Ok(body.into_bytes());
        }
        let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::default());
        encoder.write_all(body.as_bytes())?;
        Ok(encoder.finish()?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn supports_async(&self) -> bool {
        true
    }

    async fn submit_bulk(&self, request: &BulkRequest) -> Result<BulkResponse, TransportError> {
        if request.is_empty() {
            return Ok(BulkResponse::accepted());
        }

        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| TransportError::Protocol("in-flight limiter closed".to_string()))?;

        let url = format!("{}/_bulk", self.next_base_url());
        let body = self.encode_body(request.to_ndjson())?;
        debug!("📡 POST {} with {} items ({} bytes on the wire)", url, request.len(), body.len());

        // ⚠️ application/x-ndjson, not application/json. The cluster cares. Deeply.
        let mut builder = self
            .request(Method::POST, &url)
            .header("Content-Type", "application/x-ndjson");
        if self.compression {
            builder = builder.header("Content-Encoding", "gzip");
        }
        let response = builder.body(body).send().await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let reason = format!("{}: {}", status, String::from_utf8_lossy(&bytes));
            warn!("💀 _bulk refused the whole batch of {} items: {}", request.len(), reason);
            return Ok(BulkResponse::rejected(reason));
        }

        let parsed: BulkApiResponse = serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::Protocol(format!("unreadable _bulk response: {e}")))?;
        let response = parsed.into_bulk_response();
        trace!(
            "🚀 _bulk answered: succeeded={} items={}",
            response.succeeded,
            response.items.len()
        );
        Ok(response)
    }

    async fn put_template(&self, template: &IndexTemplate) -> Result<TemplateAck, TransportError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|_| TransportError::Protocol("in-flight limiter closed".to_string()))?;

        let url = template_url(&self.next_base_url(), &template.name)?;
        let body = serde_json::to_vec(&template.source)
            .map_err(|e| TransportError::Codec(e.to_string()))?;
        debug!("📐 PUT {} ({} bytes)", url, body.len());

        let response = self
            .request(Method::PUT, &url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Ok(TemplateAck::refused(format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&bytes)
            )));
        }

        // 🔍 An empty or non-JSON 2xx body counts as acknowledged; only an explicit false refuses.
        let acknowledged = serde_json::from_slice::<serde_json::Value>(&bytes)
            .ok()
            .and_then(|body| body.get("acknowledged").and_then(serde_json::Value::as_bool))
            .unwrap_or(true);
        Ok(if acknowledged {
            TemplateAck::acknowledged()
        } else {
            TemplateAck::refused("acknowledged=false")
        })
    }
}

/// 📬 The slice of the `_bulk` response we care about.
#[derive(Debug, Deserialize)]
struct BulkApiResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl BulkApiResponse {
    fn into_bulk_response(self) -> BulkResponse {
        // 🧠 each item is `{"<action>": {...}}` with exactly one key; the action name is noise
        let items: Vec<ItemOutcome> = self
            .items
            .into_iter()
            .map(|mut entry| match entry.drain().next() {
                Some((_, result)) => match result.error {
                    Some(error) => ItemOutcome::failed(result.status, describe_item_error(&error)),
                    None => ItemOutcome::ok(result.status),
                },
                None => ItemOutcome::failed(0, "empty bulk item entry"),
            })
            .collect();
        let failed = items.iter().filter(|item| item.is_failure()).count();
        BulkResponse {
            succeeded: !self.errors && failed == 0,
            error_message: (self.errors || failed > 0)
                .then(|| format!("{failed} of {} items failed", items.len())),
            items,
        }
    }
}

fn describe_item_error(error: &serde_json::Value) -> String {
    match (
        error.get("type").and_then(serde_json::Value::as_str),
        error.get("reason").and_then(serde_json::Value::as_str),
    ) {
        (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
        (None, Some(reason)) => reason.to_string(),
        _ => error.to_string(),
    }
}

/// 🔍 `GET /_nodes/http`, trimmed to the addresses.
#[derive(Debug, Deserialize)]
struct NodesHttpResponse {
    #[serde(default)]
    nodes: HashMap<String, NodeInfo>,
}

#[derive(Debug, Deserialize)]
struct NodeInfo {
    #[serde(default)]
    http: Option<NodeHttp>,
}

#[derive(Debug, Deserialize)]
struct NodeHttp {
    publish_address: String,
}

impl NodesHttpResponse {
    fn publish_addresses(&self) -> Vec<&str> {
        let mut addresses: Vec<&str> = self
            .nodes
            .values()
            .filter_map(|node| node.http.as_ref())
            .map(|http| http.publish_address.as_str())
            .collect();
        // 📋 HashMap order is a coin toss; the rotation shouldn't be
        addresses.sort_unstable();
        addresses
    }
}

/// 📐 `{base}/_template/{name}` with the name percent-encoded as a single path segment.
fn template_url(base_url: &str, name: &str) -> Result<String, TransportError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| TransportError::Protocol(format!("bad endpoint url '{base_url}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| TransportError::Protocol(format!("endpoint '{base_url}' cannot carry a path")))?
        .pop_if_empty()
        .push("_template")
        .push(name);
    Ok(url.into())
}

/// 🔧 `publish_address` is either `ip:port` or `hostname/ip:port`. We want the `ip:port`.
fn endpoint_from_publish_address(scheme: &str, address: &str) -> Option<ServerEndpoint> {
    let address = address.rsplit_once('/').map_or(address, |(_, ip_port)| ip_port);
    let (host, port) = address.rsplit_once(':')?;
    let port = port.parse().ok()?;
    if host.is_empty() {
        return None;
    }
    Some(ServerEndpoint::new(scheme, host, port))
}
