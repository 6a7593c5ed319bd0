//! 📐 Administrative operations: one-time, synchronous, loud on failure.
//!
//! Index templates are applied before the first log line ships. If the cluster refuses the
//! template, we want to hear about it at startup, not discover at 3am that every document
//! landed with a `text` mapping for the timestamp. So: fail fast, with a `ConfigurationError`.
//!
//! 🧠 `PutTemplateOperation` is the deferred flavor: same call, but queued to run right before
//! the next batch, and its failure is logged instead of raised. 🦆

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::common::IndexTemplate;
use crate::connection::provider::ConnectionProvider;
use crate::deferred::Operation;
use crate::error::ConfigurationError;

/// 🛠️ Runs administrative calls through the shared client.
#[derive(Debug, Clone)]
pub struct AdminExecutor {
    connection: Arc<ConnectionProvider>,
}

impl AdminExecutor {
    pub fn new(connection: Arc<ConnectionProvider>) -> Self {
        Self { connection }
    }

    /// 📐 Registers `template`, blocking the caller until the backend answers.
    ///
    /// Idempotent from our side: applying the same template twice asks the backend twice,
    /// and the backend overwrites by name.
    pub async fn apply_index_template(&self, template: &IndexTemplate) -> Result<(), ConfigurationError> {
        let client = self.connection.get_or_create_client().await?;
        let ack = client.put_template(template).await.map_err(|e| {
            warn!("💀 Template '{}' never reached the backend: {}", template.name, e);
            ConfigurationError::TemplateNotAdded(e.to_string())
        })?;

        if !ack.acknowledged {
            let reason = ack
                .reason
                .unwrap_or_else(|| "backend did not acknowledge".to_string());
            warn!("💀 Template '{}' was refused: {}", template.name, reason);
            return Err(ConfigurationError::TemplateNotAdded(reason));
        }
        info!("📐 Index template '{}' applied via {}", template.name, client.name());
        Ok(())
    }
}

/// ⏳ Applies an index template as deferred work, right before the next batch.
#[derive(Debug, Clone)]
pub struct PutTemplateOperation {
    admin: AdminExecutor,
    template: IndexTemplate,
}

impl PutTemplateOperation {
    pub fn new(admin: AdminExecutor, template: IndexTemplate) -> Self {
        Self { admin, template }
    }
}

#[async_trait]
impl Operation for PutTemplateOperation {
    async fn execute(&self) -> anyhow::Result<()> {
        self.admin
            .apply_index_template(&self.template)
            .await
            .with_context(|| format!("deferred registration of template '{}'", self.template.name))
    }

    fn describe(&self) -> String {
        format!("put index template '{}'", self.template.name)
    }
}
