use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::common::BatchItem;
use crate::error::FailoverError;
use crate::failover::FailoverPolicy;

/// 📦 A failover policy that never forgets. Hoards every failed item in a shared Vec.
///
/// Clone-able because tests need to peek inside after handing a copy to the dispatcher.
/// The `Arc` means every clone shares the same Vec. 🦆
#[derive(Debug, Default, Clone)]
pub struct InMemoryFailover {
    received: Arc<Mutex<Vec<BatchItem>>>,
}

impl InMemoryFailover {
    pub fn new() -> Self {
        Self::default()
    }

    /// 📋 Snapshot of everything delivered so far, in delivery order.
    pub fn items(&self) -> Vec<BatchItem> {
        self.received
            .lock()
            .map(|items| items.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FailoverPolicy for InMemoryFailover {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn deliver(&self, item: BatchItem) -> Result<(), FailoverError> {
        // 🔒 a poisoned lock still holds perfectly good items
        let mut received = self
            .received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        received.push(item);
        Ok(())
    }
}
