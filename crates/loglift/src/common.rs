//! 📦 Common data structures: the building blocks of loglift.
//!
//! 🎬 COLD OPEN: INT. LOG PIPELINE, 3:47 AM
//!
//! A `BatchItem` is born. It carries one log line, already serialized, already judged.
//! It knows where it wants to go (`index`). Sometimes it knows who it is (`id`).
//! It does not know that the cluster is currently on fire. Nobody told it. Nobody ever does.
//!
//! These structs ferry documents from producers to the backend and, when the backend
//! says "no thanks", to the failover policy. They don't ask questions. They carry the data. 🦆

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// 🎯 One serialized log document plus where it should land.
///
/// `source` is opaque. We never parse it, never reformat it, never judge it.
/// It leaves exactly as it arrived, byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    /// 📡 Target index.
    pub index: String,
    /// 🪪 Optional document id. `None` lets the cluster pick one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 📦 The raw serialized document.
    pub source: String,
}

impl BatchItem {
    pub fn new(index: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            id: None,
            source: source.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// 📦 A `BulkRequest`: the ordered batch that travels to the backend in one trip.
///
/// Built fresh per delivery cycle by [`crate::batch::BatchBuilder`]. Never resubmitted.
/// Once it leaves, it either lands or its failed items go to failover. No second dates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkRequest {
    pub(crate) items: Vec<BatchItem>,
}

impl BulkRequest {
    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 📊 Total bytes of raw sources. Not the wire size; the wire adds action lines.
    pub fn source_bytes(&self) -> usize {
        self.items.iter().map(|item| item.source.len()).sum()
    }
}

/// ✅/💀 What the backend said about one item of the bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub status: u16,
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn ok(status: u16) -> Self {
        Self { status, error: None }
    }

    pub fn failed(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some() || !(200..300).contains(&self.status)
    }
}

/// 📬 The backend's verdict on a whole bulk request.
///
/// `items` is empty for transports that only report success/failure atomically, and for
/// responses the backend refused before looking at any item (e.g. a 503).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkResponse {
    pub succeeded: bool,
    pub error_message: Option<String>,
    pub items: Vec<ItemOutcome>,
}

impl BulkResponse {
    /// ✅ Everything landed and the backend didn't itemize. Atomic transports live here.
    pub fn accepted() -> Self {
        Self {
            succeeded: true,
            error_message: None,
            items: Vec::new(),
        }
    }

    /// 💀 Rejected as a whole, with the backend's reason.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            error_message: Some(reason.into()),
            items: Vec::new(),
        }
    }

    /// 🔍 Any trouble at all, whole-request or per-item.
    pub fn has_failures(&self) -> bool {
        !self.succeeded || self.items.iter().any(ItemOutcome::is_failure)
    }
}

/// 📐 A named index template. Applied once, synchronously, at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexTemplate {
    pub name: String,
    pub source: serde_json::Value,
}

impl IndexTemplate {
    pub fn new(name: impl Into<String>, source: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    /// 📁 Loads the template body from a JSON file. A file that isn't JSON is a config error,
    /// not a runtime surprise at 10,000 documents deep.
    pub async fn load(name: impl Into<String>, path: &Path) -> Result<Self, ConfigurationError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ConfigurationError::TemplateSource(format!("{}: {}", path.display(), e))
        })?;
        let source = serde_json::from_str(&raw).map_err(|e| {
            ConfigurationError::TemplateSource(format!("{}: {}", path.display(), e))
        })?;
        Ok(Self::new(name, source))
    }
}
