//! 🛟 The failover redirector: walks failed items to the failover policy, one at a time.
//!
//! Fail-open per item. If the policy refuses item 3, items 4 through N still get their turn.

use tracing::{error, warn};

use crate::common::BatchItem;
use crate::failover::FailoverPolicy;

/// 📊 How the walk went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedirectReport {
    pub attempted: usize,
    pub failed: usize,
}

impl RedirectReport {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FailoverRedirector;

impl FailoverRedirector {
    pub async fn redirect(&self, items: Vec<BatchItem>, policy: &dyn FailoverPolicy) -> RedirectReport {
        let mut report = RedirectReport::default();
        if items.is_empty() {
            return report;
        }
        warn!("Batch of {} items failed. Redirecting to {}", items.len(), policy.name());

        for item in items {
            report.attempted += 1;
            let index = item.index.clone();
            if let Err(e) = policy.deliver(item).await {
                report.failed += 1;
                error!("💀 {} refused a failed item for index '{}': {}", policy.name(), index, e);
            }
        }
        report
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::FailoverError;

    /// 🧪 Refuses every item whose source contains `poison`; records the rest.
    #[derive(Debug, Default)]
    pub(crate) struct PickyFailover {
        pub(crate) poison: &'static str,
        pub(crate) accepted: Mutex<Vec<BatchItem>>,
    }

    #[async_trait]
    impl FailoverPolicy for PickyFailover {
        fn name(&self) -> &str {
            "picky"
        }

        async fn deliver(&self, item: BatchItem) -> Result<(), FailoverError> {
            if item.source.contains(self.poison) {
                return Err(FailoverError::Storage(std::io::Error::other("no room for poison")));
            }
            self.accepted.lock().unwrap().push(item);
            Ok(())
        }
    }
}
