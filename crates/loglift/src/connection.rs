//! 🔌 Connection: endpoints, settings, auth, and the lazily built client handle.
//!
//! 🧠 Knowledge graph:
//! - `endpoints`: parses the semicolon-delimited server list.
//! - `settings`: raw config knobs -> validated `ConnectionConfig` -> mutable `TransportSettings`.
//! - `auth`: the `Auth` capability that edits `TransportSettings` once, before the client exists.
//! - `provider`: `ConnectionProvider`, the one-client-per-factory guarantee.

pub mod auth;
pub mod endpoints;
pub mod provider;
pub mod settings;

pub use auth::{AcceptInvalidCerts, ApiKeyAuth, Auth, AuthSettings, BasicAuth, ChainedAuth};
pub use endpoints::{ServerEndpoint, parse_server_list};
pub use provider::{ClientProvider, ConnectionProvider};
pub use settings::{
    ConnectionConfig, ConnectionSettings, Credentials, TransportKind, TransportSettings,
    default_io_thread_count,
};
