use async_trait::async_trait;
use tracing::warn;

use crate::common::BatchItem;
use crate::error::FailoverError;
use crate::failover::FailoverPolicy;

/// 🗑️ Logs the failed item and lets it go. Like a balloon at a birthday party.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFailover;

#[async_trait]
impl FailoverPolicy for NoopFailover {
    fn name(&self) -> &str {
        "noop"
    }

    async fn deliver(&self, item: BatchItem) -> Result<(), FailoverError> {
        warn!(
            "🗑️ Dropping failed item for index '{}' ({} bytes). Configure a disk failover to keep these.",
            item.index,
            item.source.len()
        );
        Ok(())
    }
}
