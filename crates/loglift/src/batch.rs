//! 📦 Batch operations: turning a pile of serialized log items into one bulk request.
//!
//! 🧠 Knowledge graph:
//! - `BatchOperations` is the factory-handed toolbox: make items, make builders, build in one go.
//! - `BatchBuilder` accumulates items, skipping malformed ones (empty index, blank source).
//!   Skip, don't fail: one bad log line should not take 499 good ones down with it.
//! - `BulkRequest::to_ndjson` renders the Elasticsearch `_bulk` body. Two lines per document.
//!   Action line, then source line. Always. The trailing newline MATTERS. Three weekends were
//!   lost to that trailing newline in a previous life. We remember them.
//!
//! Pure transformation. No I/O. No network. No feelings. 🦆

use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::common::{BatchItem, BulkRequest};

/// 🧰 The toolbox a factory hands out for building batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOperations;

impl BatchOperations {
    pub fn new() -> Self {
        Self
    }

    pub fn create_batch_item(&self, index: impl Into<String>, source: impl Into<String>) -> BatchItem {
        BatchItem::new(index, source)
    }

    pub fn create_batch_builder(&self) -> BatchBuilder {
        BatchBuilder::default()
    }

    /// 🏗️ One-shot build: items in, bulk request out, order preserved, malformed items skipped.
    pub fn build(&self, items: impl IntoIterator<Item = BatchItem>) -> BulkRequest {
        let mut builder = self.create_batch_builder();
        for item in items {
            builder.add(item);
        }
        builder.build()
    }
}

/// 🏗️ Accumulates items for one delivery cycle.
#[derive(Debug, Default)]
pub struct BatchBuilder {
    items: Vec<BatchItem>,
    skipped: usize,
}

impl BatchBuilder {
    /// 📥 Adds an item. Returns `false` when the item was skipped as malformed.
    pub fn add(&mut self, item: BatchItem) -> bool {
        if item.index.trim().is_empty() || item.source.trim().is_empty() {
            self.skipped += 1;
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn build(self) -> BulkRequest {
        if self.skipped > 0 {
            warn!(
                "🗑️ Skipped {} malformed items (empty index or blank source) while building a batch of {}",
                self.skipped,
                self.items.len()
            );
        }
        trace!("📦 Built bulk request with {} items", self.items.len());
        BulkRequest { items: self.items }
    }
}

impl BulkRequest {
    /// 📡 Renders the `_bulk` NDJSON body: `{"index":{"_index":..,"_id":..}}\n{source}\n` per item.
    ///
    /// `_id` is omitted (not nulled) when absent, so the cluster auto-generates one.
    pub fn to_ndjson(&self) -> String {
        let mut body = String::with_capacity(self.source_bytes() + self.items.len() * 48);
        for item in &self.items {
            let mut metadata = Map::new();
            metadata.insert("_index".to_string(), Value::String(item.index.clone()));
            if let Some(ref id) = item.id {
                metadata.insert("_id".to_string(), Value::String(id.clone()));
            }
            let mut action = Map::new();
            action.insert("index".to_string(), Value::Object(metadata));
            // 🔧 Map<String, Value> always serializes; Display on Value cannot fail.
            body.push_str(&Value::Object(action).to_string());
            body.push('\n');
            body.push_str(item.source.trim_end_matches(['\r', '\n']));
            body.push('\n');
        }
        body
    }
}
