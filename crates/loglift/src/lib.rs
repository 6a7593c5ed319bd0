//! 🚚 loglift: batched log delivery to a search cluster, with failover when the cluster says no.
//!
//! 🧠 Knowledge graph:
//! ```text
//! producer ─▶ BatchOperations ─▶ BatchDispatcher ─▶ Transport (http | framed_tcp)
//!                                   │   ▲                   │
//!                   DeferredOperations   ConnectionProvider  ▼
//!                                          (OnceCell)   FailureHandler
//!                                                        ├─ FailureIntrospector
//!                                                        └─ FailoverRedirector ─▶ FailoverPolicy
//! ```
//! `ClientObjectFactory` assembles all of it for one transport family. 🦆

pub mod admin;
pub mod app_config;
pub mod batch;
pub mod common;
pub mod connection;
pub mod deferred;
pub mod dispatch;
pub mod error;
pub mod factory;
pub mod failover;
pub mod ndjson;
pub mod transports;

pub use admin::{AdminExecutor, PutTemplateOperation};
pub use app_config::{AppConfig, ShippingSettings, TemplateRef, load_config};
pub use batch::{BatchBuilder, BatchOperations};
pub use common::{BatchItem, BulkRequest, BulkResponse, IndexTemplate, ItemOutcome};
pub use connection::{
    Auth, ConnectionConfig, ConnectionProvider, ConnectionSettings, ServerEndpoint, TransportKind,
};
pub use deferred::{DeferredOperations, DrainReport, Operation};
pub use dispatch::{BatchDispatcher, DeliveryReport, Dispatch, DispatchState, FailureHandler};
pub use error::{ConfigurationError, FailoverError, TransportError};
pub use factory::ClientObjectFactory;
pub use failover::{DiskSpillFailover, FailoverPolicy, FailoverSettings, InMemoryFailover, NoopFailover};
pub use transports::{TemplateAck, Transport};
