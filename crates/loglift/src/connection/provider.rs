//! 🏭 The connection provider: builds the one and only client, lazily, exactly once.
//!
//! 🎬 *[three dispatch tasks reach for the client at the same instant]*
//! *[in the old days, all three would have built one. two would have leaked.]*
//! *[today, a `OnceCell` stands at the door. one gets in. two wait. all three leave with the same handle.]*
//!
//! Construction failure is a configuration error surfaced at first use, not at build time,
//! because some transports don't resolve DNS or open sockets until asked to. If construction
//! fails, the cell stays empty and the next caller gets to try again. 🦆

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::connection::settings::{ConnectionConfig, TransportSettings};
use crate::error::ConfigurationError;
use crate::transports::Transport;

/// 🔧 Knows how to turn finished transport settings into a live client.
///
/// One impl per transport family, plus whatever the tests dream up.
#[async_trait]
pub trait ClientProvider: Send + Sync + fmt::Debug {
    async fn create_client(
        &self,
        settings: TransportSettings,
    ) -> Result<Arc<dyn Transport>, ConfigurationError>;
}

/// 🔒 Owns the connection config and the lazily created client handle.
#[derive(Debug)]
pub struct ConnectionProvider {
    config: ConnectionConfig,
    client_provider: Arc<dyn ClientProvider>,
    client: OnceCell<Arc<dyn Transport>>,
}

impl ConnectionProvider {
    pub fn new(config: ConnectionConfig, client_provider: Arc<dyn ClientProvider>) -> Self {
        Self {
            config,
            client_provider,
            client: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// 📋 The configured servers as `scheme://host:port`, in configuration order.
    pub fn server_list(&self) -> Vec<String> {
        self.config.servers().iter().map(ToString::to_string).collect()
    }

    /// 🚀 Returns the cached client, creating it on the first call.
    ///
    /// Concurrent first calls are serialized by the cell: exactly one runs the construction.
    pub async fn get_or_create_client(&self) -> Result<Arc<dyn Transport>, ConfigurationError> {
        let client = self
            .client
            .get_or_try_init(|| async {
                let mut settings = TransportSettings::from_config(&self.config);
                if let Some(auth) = self.config.auth() {
                    debug!("🔒 Applying auth to transport settings: {:?}", auth);
                    auth.configure(&mut settings);
                }
                info!(
                    "🏗️ Creating backend client for {} endpoint(s): {}",
                    settings.endpoints.len(),
                    self.server_list().join(";")
                );
                self.client_provider.create_client(settings).await
            })
            .await?;
        Ok(Arc::clone(client))
    }

    /// 🔍 Has the client been born yet?
    pub fn is_initialized(&self) -> bool {
        self.client.initialized()
    }
}
