//! 🔌 Transports: where the real I/O happens.
//!
//! 🎭 Two families, one contract:
//! - `http`: Elasticsearch `_bulk` over reqwest. Itemized responses, so partial failures are
//!   visible. Submissions run on a spawned task.
//! - `framed_tcp`: length-prefixed MessagePack frames over a raw socket. The backend only says
//!   "ok" or "not ok" for the whole batch. Submissions run inline on the dispatching task.
//!
//! Each family also ships a `ClientProvider` that knows how to turn `TransportSettings` into
//! a live client. The connection provider calls it exactly once. Exactly. Once. 🦆

use std::fmt;

use async_trait::async_trait;

use crate::common::{BulkRequest, BulkResponse, IndexTemplate};
use crate::error::TransportError;

pub mod framed_tcp;
pub mod http;

pub use framed_tcp::{FramedTcpClientProvider, FramedTcpTransport};
pub use http::{HttpClientProvider, HttpTransport};

/// 📬 The backend's answer to "please store this template".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateAck {
    pub acknowledged: bool,
    pub reason: Option<String>,
}

impl TemplateAck {
    pub fn acknowledged() -> Self {
        Self {
            acknowledged: true,
            reason: None,
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            acknowledged: false,
            reason: Some(reason.into()),
        }
    }
}

/// 📡 A live backend client. Shared read-only by every dispatcher and admin call once created.
///
/// # Contract 📜
/// - `submit_bulk` returns `Err` only for transport-level trouble (refused, timeout, garbled).
///   A backend that answered "no" is an `Ok(BulkResponse { succeeded: false, .. })`.
/// - `supports_async` tells the dispatcher whether to spawn the submission or run it inline.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn supports_async(&self) -> bool;

    async fn submit_bulk(&self, request: &BulkRequest) -> Result<BulkResponse, TransportError>;

    async fn put_template(&self, template: &IndexTemplate) -> Result<TemplateAck, TransportError>;
}
