//! 🚀 The batch dispatcher: drain the deferred queue, hand the batch to the transport, and make
//! sure whatever comes back is dealt with exactly once.
//!
//! 🎬 *[a batch of 500 log lines approaches the cluster.]*
//! *[the cluster is having a day.]*
//! *[493 land. 7 bounce. the 7 are caught mid-air and carried to the spill file.]*
//! *[the producer never finds out. the producer is at lunch.]*
//!
//! 🧠 Knowledge graph:
//! - Cycle: `Idle -> DrainingDeferred -> Submitting -> (Completed | Failed)`. The terminal state
//!   stays visible on the `watch` until the next cycle starts.
//! - `Dispatch::accepted` means "handed to the transport". Delivery is only known from the
//!   `DeliveryReport` that arrives on the oneshot. Two different facts. Never conflate them.
//! - Async-capable transports complete on a spawned task. The framed transport completes inline.
//! - No resubmission. A batch gets one shot; whatever misses goes to failover.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tracing::{debug, trace, warn};

use crate::common::{BulkRequest, BulkResponse};
use crate::connection::provider::ConnectionProvider;
use crate::deferred::{DeferredOperations, DrainReport};
use crate::error::TransportError;
use crate::failover::FailoverPolicy;
use crate::transports::Transport;

pub mod introspect;
pub mod redirect;

pub use introspect::{AtomicFailureIntrospector, FailureIntrospector, PartialFailureIntrospector};
pub use redirect::{FailoverRedirector, RedirectReport};

/// 🚦 Where the dispatcher is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchState {
    #[default]
    Idle,
    DrainingDeferred,
    Submitting,
    Completed,
    Failed,
}

/// 📊 Everything one dispatch cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub batch_size: usize,
    /// 💀 Items the introspector flagged.
    pub failed_items: usize,
    /// 🛟 Flagged items the failover policy took.
    pub redirected: usize,
    /// 🗑️ Flagged items the failover policy refused.
    pub failover_errors: usize,
    pub deferred: DrainReport,
    /// 🚦 `Completed` or `Failed`.
    pub state: DispatchState,
    pub cause: Option<String>,
}

impl DeliveryReport {
    fn completed(batch_size: usize, deferred: DrainReport) -> Self {
        Self {
            batch_size,
            failed_items: 0,
            redirected: 0,
            failover_errors: 0,
            deferred,
            state: DispatchState::Completed,
            cause: None,
        }
    }

    fn failed(batch_size: usize, deferred: DrainReport, failure: HandledFailure) -> Self {
        Self {
            batch_size,
            failed_items: failure.failed_items,
            redirected: failure.redirect.delivered(),
            failover_errors: failure.redirect.failed,
            deferred,
            state: DispatchState::Failed,
            cause: Some(failure.cause),
        }
    }

    /// ✅ Every item reached the backend.
    pub fn is_delivered(&self) -> bool {
        self.state == DispatchState::Completed
    }

    pub fn delivered_items(&self) -> usize {
        self.batch_size - self.failed_items
    }
}

/// 📬 The receipt `dispatch` hands back immediately.
#[derive(Debug)]
pub struct Dispatch {
    /// 📤 Handed to the transport. Says nothing about delivery.
    pub accepted: bool,
    pub completion: oneshot::Receiver<DeliveryReport>,
}

impl Dispatch {
    /// ⏳ Waits for the completion handler. `None` only if the completion task died mid-flight.
    pub async fn delivered(self) -> Option<DeliveryReport> {
        self.completion.await.ok()
    }
}

/// 💀 What the failure handler did about one failed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledFailure {
    pub failed_items: usize,
    pub redirect: RedirectReport,
    pub cause: String,
}

/// 🧯 Introspector + redirector bound to one failover policy.
#[derive(Debug, Clone)]
pub struct FailureHandler {
    introspector: Arc<dyn FailureIntrospector>,
    redirector: FailoverRedirector,
    failover: Arc<dyn FailoverPolicy>,
}

impl FailureHandler {
    pub fn new(introspector: Arc<dyn FailureIntrospector>, failover: Arc<dyn FailoverPolicy>) -> Self {
        Self {
            introspector,
            redirector: FailoverRedirector,
            failover,
        }
    }

    /// 🔍 `None` when the submission fully succeeded. Otherwise introspects and redirects.
    pub async fn handle(
        &self,
        batch: &BulkRequest,
        outcome: &Result<BulkResponse, TransportError>,
    ) -> Option<HandledFailure> {
        let cause = match outcome {
            Ok(response) if !response.has_failures() => return None,
            Ok(response) => response
                .error_message
                .clone()
                .unwrap_or_else(|| "backend reported failed items".to_string()),
            Err(e) => e.to_string(),
        };
        warn!("💀 Bulk submission of {} items failed: {}", batch.len(), cause);

        let failed = self.introspector.failed_items(batch, outcome);
        let failed_items = failed.len();
        let redirect = self.redirector.redirect(failed, self.failover.as_ref()).await;
        Some(HandledFailure {
            failed_items,
            redirect,
            cause,
        })
    }

    /// 🧯 The batch never reached a transport. All of it goes to failover.
    pub async fn redirect_whole_batch(&self, batch: &BulkRequest, cause: String) -> HandledFailure {
        warn!("💀 Batch of {} items could not be submitted: {}", batch.len(), cause);
        let redirect = self
            .redirector
            .redirect(batch.items().to_vec(), self.failover.as_ref())
            .await;
        HandledFailure {
            failed_items: batch.len(),
            redirect,
            cause,
        }
    }
}

/// 🚀 Drains, submits, completes. One per factory per failover policy.
#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    connection: Arc<ConnectionProvider>,
    deferred: DeferredOperations,
    failure_handler: FailureHandler,
    state: Arc<watch::Sender<DispatchState>>,
}

impl BatchDispatcher {
    pub fn new(
        connection: Arc<ConnectionProvider>,
        deferred: DeferredOperations,
        failure_handler: FailureHandler,
    ) -> Self {
        let (state, _) = watch::channel(DispatchState::Idle);
        Self {
            connection,
            deferred,
            failure_handler,
            state: Arc::new(state),
        }
    }

    /// 👀 Subscribe to state changes.
    pub fn state(&self) -> watch::Receiver<DispatchState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> DispatchState {
        *self.state.borrow()
    }

    /// 📤 Runs one delivery cycle for `batch`.
    ///
    /// Returns as soon as the batch is handed off (async transports) or done (sync transports).
    /// Never returns an error: backend trouble ends up in the `DeliveryReport`, and the items
    /// end up in failover.
    pub async fn dispatch(&self, batch: BulkRequest) -> Dispatch {
        let (report_tx, report_rx) = oneshot::channel();

        self.state.send_replace(DispatchState::DrainingDeferred);
        let deferred = self.deferred.drain_and_execute_all().await;

        if batch.is_empty() {
            trace!("📦 Empty batch; nothing to submit");
            self.finish(report_tx, DeliveryReport::completed(0, deferred));
            return Dispatch {
                accepted: true,
                completion: report_rx,
            };
        }

        let client = match self.connection.get_or_create_client().await {
            Ok(client) => client,
            Err(e) => {
                let failure = self
                    .failure_handler
                    .redirect_whole_batch(&batch, e.to_string())
                    .await;
                self.finish(report_tx, DeliveryReport::failed(batch.len(), deferred, failure));
                return Dispatch {
                    accepted: false,
                    completion: report_rx,
                };
            }
        };

        self.state.send_replace(DispatchState::Submitting);
        let completion = Completion {
            batch,
            client,
            deferred,
            failure_handler: self.failure_handler.clone(),
            state: self.state.clone(),
            report_tx,
        };
        if completion.client.supports_async() {
            debug!(
                "🚀 Submitting {} items on a background task via {}",
                completion.batch.len(),
                completion.client.name()
            );
            tokio::spawn(completion.run());
        } else {
            debug!(
                "🚀 Submitting {} items inline via {}",
                completion.batch.len(),
                completion.client.name()
            );
            completion.run().await;
        }

        Dispatch {
            accepted: true,
            completion: report_rx,
        }
    }

    fn finish(&self, report_tx: oneshot::Sender<DeliveryReport>, report: DeliveryReport) {
        publish(&self.state, report_tx, report);
    }
}

/// 🎯 One submission plus its completion handler. `run` consumes it, so the handler can only
/// ever run once.
struct Completion {
    batch: BulkRequest,
    client: Arc<dyn Transport>,
    deferred: DrainReport,
    failure_handler: FailureHandler,
    state: Arc<watch::Sender<DispatchState>>,
    report_tx: oneshot::Sender<DeliveryReport>,
}

impl Completion {
    async fn run(self) {
        let outcome = self.client.submit_bulk(&self.batch).await;
        let report = match self.failure_handler.handle(&self.batch, &outcome).await {
            None => DeliveryReport::completed(self.batch.len(), self.deferred),
            Some(failure) => DeliveryReport::failed(self.batch.len(), self.deferred, failure),
        };
        publish(&self.state, self.report_tx, report);
    }
}

fn publish(
    state: &watch::Sender<DispatchState>,
    report_tx: oneshot::Sender<DeliveryReport>,
    report: DeliveryReport,
) {
    state.send_replace(report.state);
    trace!(
        "🏁 Cycle done: {:?}, {} of {} items delivered",
        report.state,
        report.delivered_items(),
        report.batch_size
    );
    // 🤷 the producer may have dropped its receipt; the work is done either way
    let _ = report_tx.send(report);
}
