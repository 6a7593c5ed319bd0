//! 🏭 The client object factory: one transport family, fully assembled.
//!
//! 🧠 Knowledge graph:
//! ```text
//! ClientObjectFactory
//!  ├─ ConnectionProvider  (config + OnceCell<client>)
//!  ├─ DeferredOperations  (shared by every dispatcher it hands out)
//!  ├─ FailureIntrospector (partial for HTTP, atomic for framed TCP; picked here, once)
//!  └─ AdminExecutor       (templates, synchronous)
//! ```
//! The factory doesn't own a failover policy. You bring one when you ask for a batch listener,
//! because different producers may want their leftovers in different places. 🦆

use std::sync::Arc;

use crate::admin::AdminExecutor;
use crate::batch::BatchOperations;
use crate::common::IndexTemplate;
use crate::connection::provider::{ClientProvider, ConnectionProvider};
use crate::connection::settings::{ConnectionConfig, TransportKind};
use crate::deferred::{DeferredOperations, Operation};
use crate::dispatch::{
    AtomicFailureIntrospector, BatchDispatcher, FailureHandler, FailureIntrospector,
    PartialFailureIntrospector,
};
use crate::error::ConfigurationError;
use crate::failover::FailoverPolicy;
use crate::transports::{FramedTcpClientProvider, HttpClientProvider, Transport};

#[derive(Debug, Clone)]
pub struct ClientObjectFactory {
    kind: TransportKind,
    connection: Arc<ConnectionProvider>,
    deferred: DeferredOperations,
    introspector: Arc<dyn FailureIntrospector>,
    batch_operations: BatchOperations,
}

impl ClientObjectFactory {
    /// 🏗️ The factory for whichever family `kind` names.
    pub fn new(kind: TransportKind, config: ConnectionConfig) -> Self {
        match kind {
            TransportKind::Http => Self::http(config),
            TransportKind::FramedTcp => Self::framed_tcp(config),
        }
    }

    /// 📡 Elasticsearch `_bulk` over HTTP, per-item failure reporting.
    pub fn http(config: ConnectionConfig) -> Self {
        Self::assemble(
            TransportKind::Http,
            config,
            Arc::new(HttpClientProvider),
            Arc::new(PartialFailureIntrospector),
        )
    }

    /// 🔌 Framed MessagePack over TCP, all-or-nothing failure reporting.
    pub fn framed_tcp(config: ConnectionConfig) -> Self {
        Self::assemble(
            TransportKind::FramedTcp,
            config,
            Arc::new(FramedTcpClientProvider),
            Arc::new(AtomicFailureIntrospector),
        )
    }

    fn assemble(
        kind: TransportKind,
        config: ConnectionConfig,
        client_provider: Arc<dyn ClientProvider>,
        introspector: Arc<dyn FailureIntrospector>,
    ) -> Self {
        Self {
            kind,
            connection: Arc::new(ConnectionProvider::new(config, client_provider)),
            deferred: DeferredOperations::new(),
            introspector,
            batch_operations: BatchOperations::new(),
        }
    }

    /// 🔧 Same family and config, different client provider. The introspector stays put.
    ///
    /// Only meaningful before the client has been created; the new provider starts with an
    /// empty slot.
    pub fn with_client_provider(mut self, client_provider: Arc<dyn ClientProvider>) -> Self {
        let config = self.connection.config().clone();
        self.connection = Arc::new(ConnectionProvider::new(config, client_provider));
        self
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn config(&self) -> &ConnectionConfig {
        self.connection.config()
    }

    pub fn server_list(&self) -> Vec<String> {
        self.connection.server_list()
    }

    pub async fn get_or_create_client(&self) -> Result<Arc<dyn Transport>, ConfigurationError> {
        self.connection.get_or_create_client().await
    }

    /// 🚀 A dispatcher wired to this factory's client, deferred queue and introspector.
    pub fn create_batch_listener(&self, failover: Arc<dyn FailoverPolicy>) -> BatchDispatcher {
        BatchDispatcher::new(
            self.connection.clone(),
            self.deferred.clone(),
            self.create_failure_handler(failover),
        )
    }

    pub fn create_failure_handler(&self, failover: Arc<dyn FailoverPolicy>) -> FailureHandler {
        FailureHandler::new(self.introspector.clone(), failover)
    }

    pub fn create_batch_operations(&self) -> BatchOperations {
        self.batch_operations
    }

    pub fn admin(&self) -> AdminExecutor {
        AdminExecutor::new(self.connection.clone())
    }

    /// 📐 Applies an index template now. Fails fast.
    pub async fn execute(&self, template: &IndexTemplate) -> Result<(), ConfigurationError> {
        self.admin().apply_index_template(template).await
    }

    /// ⏳ Queues work to run before the next batch from any listener of this factory.
    pub fn add_operation(&self, operation: Arc<dyn Operation>) {
        self.deferred.enqueue(operation);
    }

    pub fn pending_operations(&self) -> usize {
        self.deferred.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::admin::PutTemplateOperation;
    use crate::common::{BulkRequest, BulkResponse, ItemOutcome};
    use crate::connection::provider::test_support::{CountingClientProvider, ScriptedTransport};
    use crate::deferred::test_support::RecordingOperation;
    use crate::error::TransportError;
    use crate::failover::InMemoryFailover;
    use crate::transports::TemplateAck;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("http://a:9200;http://b:9200").unwrap()
    }

    #[tokio::test]
    async fn the_one_where_the_http_factory_rescues_only_item_two() {
        let transport = Arc::new(ScriptedTransport::new(true).then(Ok(BulkResponse {
            succeeded: false,
            error_message: None,
            items: vec![
                ItemOutcome::ok(201),
                ItemOutcome::failed(429, "es_rejected_execution_exception"),
                ItemOutcome::ok(201),
            ],
        })));
        let factory = ClientObjectFactory::http(config())
            .with_client_provider(Arc::new(CountingClientProvider::new(transport)));
        let failover = InMemoryFailover::new();
        let listener = factory.create_batch_listener(Arc::new(failover.clone()));
        let ops = factory.create_batch_operations();
        let items = vec![
            ops.create_batch_item("logs", r#"{"n":1}"#),
            ops.create_batch_item("logs", r#"{"n":2}"#),
            ops.create_batch_item("logs", r#"{"n":3}"#),
        ];

        let report = listener
            .dispatch(ops.build(items.clone()))
            .await
            .delivered()
            .await
            .unwrap();

        assert_eq!(failover.items(), vec![items[1].clone()]);
        assert_eq!(report.redirected, 1);
    }

    #[tokio::test]
    async fn the_one_where_the_framed_factory_rescues_everything() {
        let transport = Arc::new(ScriptedTransport::new(false).then(Err(TransportError::Timeout(250))));
        let factory = ClientObjectFactory::framed_tcp(config())
            .with_client_provider(Arc::new(CountingClientProvider::new(transport)));
        let failover = InMemoryFailover::new();
        let listener = factory.create_batch_listener(Arc::new(failover.clone()));
        let ops = factory.create_batch_operations();

        listener
            .dispatch(ops.build(vec![
                ops.create_batch_item("logs", r#"{"n":1}"#),
                ops.create_batch_item("logs", r#"{"n":2}"#),
                ops.create_batch_item("logs", r#"{"n":3}"#),
            ]))
            .await;

        assert_eq!(failover.len(), 3);
        assert_eq!(factory.kind(), TransportKind::FramedTcp);
    }

    #[tokio::test]
    async fn the_one_where_two_deferred_ops_one_fails_and_the_batch_still_ships() {
        let transport = Arc::new(ScriptedTransport::new(true));
        let factory = ClientObjectFactory::http(config())
            .with_client_provider(Arc::new(CountingClientProvider::new(transport.clone())));
        let log = Arc::new(Mutex::new(Vec::new()));
        factory.add_operation(RecordingOperation::new("first", true, &log));
        factory.add_operation(RecordingOperation::new("second", false, &log));
        assert_eq!(factory.pending_operations(), 2);

        let listener = factory.create_batch_listener(Arc::new(InMemoryFailover::new()));
        let ops = factory.create_batch_operations();
        let report = listener
            .dispatch(ops.build(vec![ops.create_batch_item("logs", "{}")]))
            .await
            .delivered()
            .await
            .unwrap();

        assert_eq!(transport.submitted_count(), 1);
        assert_eq!(report.deferred.failed, 1);
        assert_eq!(report.deferred.executed, 2);
        assert_eq!(factory.pending_operations(), 0);
    }

    #[tokio::test]
    async fn the_one_where_listeners_share_one_client_and_one_queue() {
        let stub = Arc::new(CountingClientProvider::new(Arc::new(ScriptedTransport::new(true))));
        let factory = ClientObjectFactory::http(config()).with_client_provider(stub.clone());
        let first = factory.create_batch_listener(Arc::new(InMemoryFailover::new()));
        let second = factory.create_batch_listener(Arc::new(InMemoryFailover::new()));
        let ops = factory.create_batch_operations();

        let log = Arc::new(Mutex::new(Vec::new()));
        factory.add_operation(RecordingOperation::new("once", false, &log));

        let a = first.dispatch(ops.build(vec![ops.create_batch_item("logs", "{}")])).await;
        let b = second.dispatch(ops.build(vec![ops.create_batch_item("logs", "{}")])).await;
        a.delivered().await.unwrap();
        b.delivered().await.unwrap();

        assert_eq!(stub.constructions(), 1);
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(factory.server_list(), vec!["http://a:9200", "http://b:9200"]);
    }

    #[tokio::test]
    async fn the_one_where_templates_go_now_or_before_the_next_batch() {
        let transport = Arc::new(ScriptedTransport::new(true));
        let factory = ClientObjectFactory::http(config())
            .with_client_provider(Arc::new(CountingClientProvider::new(transport.clone())));
        let template = IndexTemplate::new("logs", json!({"index_patterns": ["logs-*"]}));

        factory.execute(&template).await.unwrap();
        factory.add_operation(Arc::new(PutTemplateOperation::new(factory.admin(), template.clone())));
        let listener = factory.create_batch_listener(Arc::new(InMemoryFailover::new()));
        listener.dispatch(BulkRequest::default()).await;

        assert_eq!(transport.templates.lock().unwrap().len(), 2);

        let refusing = ClientObjectFactory::http(config()).with_client_provider(Arc::new(
            CountingClientProvider::new(Arc::new(
                ScriptedTransport::new(true).with_template_ack(TemplateAck::refused("mapping conflict")),
            )),
        ));
        assert!(matches!(
            refusing.execute(&template).await,
            Err(ConfigurationError::TemplateNotAdded(_))
        ));
    }

    /// 🕳️ An auth plugin with a grudge against the server list.
    #[derive(Debug)]
    struct ForgetsEveryServer;

    impl crate::connection::Auth for ForgetsEveryServer {
        fn configure(&self, settings: &mut crate::connection::settings::TransportSettings) {
            settings.endpoints.clear();
        }
    }

    #[tokio::test]
    async fn the_one_where_auth_empties_the_server_list_and_the_batch_still_lands_in_failover() {
        let factory = ClientObjectFactory::http(
            ConnectionConfig::new("http://127.0.0.1:1")
                .unwrap()
                .with_auth(Arc::new(ForgetsEveryServer)),
        );
        let failover = InMemoryFailover::new();
        let listener = factory.create_batch_listener(Arc::new(failover.clone()));
        let ops = factory.create_batch_operations();

        let dispatch = listener
            .dispatch(ops.build(vec![
                ops.create_batch_item("logs", r#"{"n":1}"#),
                ops.create_batch_item("logs", r#"{"n":2}"#),
            ]))
            .await;
        assert!(!dispatch.accepted);

        let report = dispatch.delivered().await.unwrap();
        assert_eq!(report.failed_items, 2);
        assert_eq!(failover.len(), 2);
        assert!(report.cause.unwrap().contains("No serverUris"));
    }
}
