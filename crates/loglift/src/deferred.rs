//! 🎬 *[an operation is enqueued. nobody is waiting for it.]*
//! *[it sits in the queue, patient, until the next batch comes along and drags it out.]*
//!
//! ⏳ The deferred operation queue: work that must happen "before the next batch", enqueued from
//! anywhere, drained by the dispatching task only.
//!
//! 🧠 Knowledge graph:
//! - Unbounded `async_channel`. `enqueue` never blocks, never awaits, never says no.
//! - `drain_and_execute_all` pops until it observes empty. An operation enqueued mid-drain
//!   lands in this drain or the next one. Both are fine. Neither is guaranteed.
//! - A failing operation is logged at error and forgotten. No retries. No tears. The rest
//!   of the queue still runs. One bad apple does not get to cancel the harvest. 🦆

use std::fmt;
use std::sync::Arc;

use async_channel::{Receiver, Sender, TryRecvError};
use async_trait::async_trait;
use tracing::{debug, error};

/// ⚙️ A unit of deferred work.
#[async_trait]
pub trait Operation: Send + Sync + fmt::Debug {
    async fn execute(&self) -> anyhow::Result<()>;

    /// 🏷️ Short label for log lines.
    fn describe(&self) -> String {
        "deferred operation".to_string()
    }
}

/// 📊 What one drain did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub executed: usize,
    pub failed: usize,
}

/// 📬 The queue. Cloning shares it.
#[derive(Debug, Clone)]
pub struct DeferredOperations {
    tx: Sender<Arc<dyn Operation>>,
    rx: Receiver<Arc<dyn Operation>>,
}

impl Default for DeferredOperations {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredOperations {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }

    /// 📥 Non-blocking, callable from any thread, sync or async.
    pub fn enqueue(&self, operation: Arc<dyn Operation>) {
        let label = operation.describe();
        // 🔒 we own the receiver, so the channel cannot be closed while `self` exists
        if self.tx.try_send(operation).is_err() {
            error!("💀 Deferred queue is closed; dropping '{}'", label);
            return;
        }
        debug!("⏳ Deferred '{}' ({} pending)", label, self.rx.len());
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// 🧹 Executes every queued operation, in FIFO order, until the queue is observed empty.
    pub async fn drain_and_execute_all(&self) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            let operation = match self.rx.try_recv() {
                Ok(operation) => operation,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            };
            report.executed += 1;
            if let Err(e) = operation.execute().await {
                report.failed += 1;
                error!("💀 Deferred operation '{}' failed: {:#}", operation.describe(), e);
            }
        }
        if report.executed > 0 {
            debug!(
                "🧹 Drained {} deferred operation(s), {} failed",
                report.executed, report.failed
            );
        }
        report
    }
}
