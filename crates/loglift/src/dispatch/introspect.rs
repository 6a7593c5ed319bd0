//! 🔍 Failure introspection: given a batch and what happened to it, which items need rescuing?
//!
//! Two answers, picked once per factory:
//! - `PartialFailureIntrospector`: the backend itemized its verdict, so only the failed items
//!   go to failover. If it didn't itemize (a 503, a mismatch, a dropped socket), everything goes.
//! - `AtomicFailureIntrospector`: the backend is all-or-nothing, so the answer is too.
//!
//! Never lose data to ambiguity: when in doubt, the whole batch is the answer. 🦆

use std::fmt;

use tracing::warn;

use crate::common::{BatchItem, BulkRequest, BulkResponse};
use crate::error::TransportError;

/// 🔍 Picks the items to redirect after a submission.
pub trait FailureIntrospector: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// 📋 Failed items in request order. Empty means "nothing to rescue".
    fn failed_items(
        &self,
        batch: &BulkRequest,
        outcome: &Result<BulkResponse, TransportError>,
    ) -> Vec<BatchItem>;
}

/// 🔬 For transports with per-item results.
#[derive(Debug, Clone, Copy, Default)]
pub struct PartialFailureIntrospector;

impl FailureIntrospector for PartialFailureIntrospector {
    fn name(&self) -> &'static str {
        "partial"
    }

    fn failed_items(
        &self,
        batch: &BulkRequest,
        outcome: &Result<BulkResponse, TransportError>,
    ) -> Vec<BatchItem> {
        let response = match outcome {
            Err(_) => return batch.items().to_vec(),
            Ok(response) if !response.has_failures() => return Vec::new(),
            Ok(response) => response,
        };

        if response.items.len() != batch.len() {
            if !response.items.is_empty() {
                warn!(
                    "⚠️ Backend itemized {} results for a batch of {}. Treating the whole batch as failed.",
                    response.items.len(),
                    batch.len()
                );
            }
            return batch.items().to_vec();
        }

        let failed: Vec<BatchItem> = batch
            .items()
            .iter()
            .zip(&response.items)
            .filter(|(_, outcome)| outcome.is_failure())
            .map(|(item, _)| item.clone())
            .collect();
        if failed.is_empty() {
            // 🤷 failed overall, but no item owns up to it
            return batch.items().to_vec();
        }
        failed
    }
}

/// 🧱 For all-or-nothing transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicFailureIntrospector;

impl FailureIntrospector for AtomicFailureIntrospector {
    fn name(&self) -> &'static str {
        "atomic"
    }

    fn failed_items(
        &self,
        batch: &BulkRequest,
        outcome: &Result<BulkResponse, TransportError>,
    ) -> Vec<BatchItem> {
        match outcome {
            Ok(response) if !response.has_failures() => Vec::new(),
            _ => batch.items().to_vec(),
        }
    }
}
