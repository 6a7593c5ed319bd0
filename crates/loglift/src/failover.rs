//! 🛟 Failover policies: where items go when the backend said no.
//!
//! 🧠 Knowledge graph:
//! - `FailoverPolicy` takes one failed item at a time. It may fail; the redirector shrugs and
//!   moves to the next item.
//! - `disk_spill`: append-only NDJSON file with an optional byte cap. Replayable.
//! - `in_mem`: a shared Vec. For tests and for embedders who want to handle it themselves.
//! - `noop`: logs and drops. The default when nobody configured anything, which is brave.
//!
//! 📋 `FailoverSettings` is the `[failover]` config section and knows how to build the policy.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::common::BatchItem;
use crate::error::FailoverError;

pub mod disk_spill;
pub mod in_mem;
pub mod noop;

pub use disk_spill::DiskSpillFailover;
pub use in_mem::InMemoryFailover;
pub use noop::NoopFailover;

/// 🛟 Accepts failed items one at a time.
#[async_trait]
pub trait FailoverPolicy: Send + Sync + fmt::Debug {
    /// 🏷️ Shows up in the "Redirecting to ..." warning.
    fn name(&self) -> &str;

    async fn deliver(&self, item: BatchItem) -> Result<(), FailoverError>;

    /// 🚽 Push buffered items to durable storage. Most policies have nothing to push.
    async fn flush(&self) -> Result<(), FailoverError> {
        Ok(())
    }
}

/// 🎭 Which policy the `[failover]` section asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverKind {
    Disk,
    #[default]
    Noop,
}

/// 📋 The `[failover]` config section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FailoverSettings {
    #[serde(default)]
    pub kind: FailoverKind,
    /// 📁 Required for `disk`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// 📏 Optional cap on the spill file, in bytes.
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

impl FailoverSettings {
    /// 🏗️ Builds the configured policy. A `disk` policy without a directory is a config mistake.
    pub async fn build(&self) -> Result<Arc<dyn FailoverPolicy>> {
        match self.kind {
            FailoverKind::Noop => Ok(Arc::new(NoopFailover)),
            FailoverKind::Disk => {
                let directory = self
                    .directory
                    .as_ref()
                    .context("💀 failover.kind = \"disk\" needs failover.directory. Spill where, exactly?")?;
                let policy = DiskSpillFailover::open(directory, self.max_bytes)
                    .await
                    .with_context(|| format!("💀 Could not open the spill file under {}", directory.display()))?;
                Ok(Arc::new(policy))
            }
        }
    }
}
