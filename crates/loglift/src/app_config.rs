//! 🔧 App configuration: TOML file + `LOGLIFT_*` env vars, poured through Figment into `AppConfig`.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." said every operator at 3am 🦆
//!
//! 🧠 Nested keys come from env with a double underscore:
//! `LOGLIFT_CONNECTION__SERVER_URIS="http://a:9200;http://b:9200"`.
//! When a file is given, the file wins on conflicts.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::common::IndexTemplate;
use crate::connection::settings::{ConnectionConfig, ConnectionSettings, TransportKind};
use crate::error::ConfigurationError;
use crate::failover::FailoverSettings;

/// 📦 Everything the shipper needs to know about itself.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub failover: FailoverSettings,
    #[serde(default)]
    pub shipping: ShippingSettings,
    #[serde(default)]
    pub index_templates: Vec<TemplateRef>,
}

impl AppConfig {
    /// 🔍 Validates the `[connection]` section into the immutable snapshot.
    pub fn connection_config(&self) -> Result<ConnectionConfig, ConfigurationError> {
        ConnectionConfig::from_settings(self.connection.clone())
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.connection.transport
    }
}

/// 📦 The `[shipping]` section: how producers batch.
#[derive(Debug, Deserialize, Clone)]
pub struct ShippingSettings {
    /// 📡 Index for lines that don't carry their own `_index`.
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_index() -> String {
    "logs".to_string()
}

fn default_batch_size() -> usize {
    500
}

impl Default for ShippingSettings {
    fn default() -> Self {
        Self {
            index: default_index(),
            batch_size: default_batch_size(),
        }
    }
}

/// 📐 One `[[index_templates]]` entry: a name and the JSON file holding its body.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub name: String,
    pub path: PathBuf,
}

impl TemplateRef {
    pub async fn load(&self) -> Result<IndexTemplate, ConfigurationError> {
        IndexTemplate::load(self.name.clone(), &self.path).await
    }
}

/// 🚀 Load the config: env vars as the base layer, TOML file on top when given.
///
/// 💀 Returns an error if the result doesn't parse, with enough context to know which layer
/// to blame.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("LOGLIFT_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (LOGLIFT_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (LOGLIFT_*). \
                 No file was provided, so this one's all on the environment."
            .to_string(),
    };

    config.extract().context(context_msg)
}
