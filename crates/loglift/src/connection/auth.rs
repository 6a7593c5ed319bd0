//! 🔒 Auth: the bouncer at the club, except the club is a search cluster.
//!
//! An `Auth` gets exactly one chance to touch the transport settings: right before the client
//! is created. It adds credentials, maybe relaxes TLS for the staging cluster nobody renewed
//! the certificate on, and then it's done. Forever. Like a wedding officiant. 🦆
//!
//! ⚠️ Priority rule inherited from the sinks: API key beats basic auth. Not a democracy.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::connection::settings::{Credentials, TransportSettings};
use crate::error::ConfigurationError;

/// 🔑 Mutates transport settings in place to add credentials and TLS tweaks.
pub trait Auth: Send + Sync + fmt::Debug {
    fn configure(&self, settings: &mut TransportSettings);
}

/// 🔒 Username + optional password.
#[derive(Clone)]
pub struct BasicAuth {
    pub username: String,
    pub password: Option<String>,
}

// 🙈 hand-rolled Debug so the password never lands in a log line
impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Auth for BasicAuth {
    fn configure(&self, settings: &mut TransportSettings) {
        settings.credentials = Some(Credentials::Basic {
            username: self.username.clone(),
            password: self.password.clone(),
        });
    }
}

/// 🔒 API key auth, the velvet rope variant.
#[derive(Clone)]
pub struct ApiKeyAuth {
    pub api_key: String,
}

impl fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyAuth").field("api_key", &"<redacted>").finish()
    }
}

impl Auth for ApiKeyAuth {
    fn configure(&self, settings: &mut TransportSettings) {
        settings.credentials = Some(Credentials::ApiKey(self.api_key.clone()));
    }
}

/// 🔓 Accepts invalid TLS certificates. For test clusters. Please. Only test clusters.
#[derive(Debug, Clone, Copy)]
pub struct AcceptInvalidCerts;

impl Auth for AcceptInvalidCerts {
    fn configure(&self, settings: &mut TransportSettings) {
        settings.accept_invalid_certs = true;
    }
}

/// 🧩 Several auths applied in order. Later ones win on conflicts.
#[derive(Debug, Clone, Default)]
pub struct ChainedAuth {
    links: Vec<Arc<dyn Auth>>,
}

impl ChainedAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, auth: Arc<dyn Auth>) -> Self {
        self.links.push(auth);
        self
    }
}

impl Auth for ChainedAuth {
    fn configure(&self, settings: &mut TransportSettings) {
        for link in &self.links {
            link.configure(settings);
        }
    }
}

/// 📋 The `[connection.auth]` config section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl AuthSettings {
    /// 🔧 Turns the config section into an `Auth` capability, or explains why it can't.
    pub fn into_auth(self) -> Result<Arc<dyn Auth>, ConfigurationError> {
        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigurationError::InvalidSetting {
                name: "auth.password",
                reason: "a password without a username is just a secret with no friends".to_string(),
            });
        }

        let mut chain = ChainedAuth::new();
        match (self.api_key, self.username) {
            (Some(api_key), username) => {
                if username.is_some() {
                    warn!("🔒 Both api_key and username configured. api_key wins, basic auth is ignored");
                }
                chain = chain.then(Arc::new(ApiKeyAuth { api_key }));
            }
            (None, Some(username)) => {
                chain = chain.then(Arc::new(BasicAuth {
                    username,
                    password: self.password,
                }));
            }
            (None, None) => {}
        }
        if self.accept_invalid_certs {
            chain = chain.then(Arc::new(AcceptInvalidCerts));
        }

        if chain.links.is_empty() {
            return Err(ConfigurationError::InvalidSetting {
                name: "auth",
                reason: "section present but empty; remove it or set credentials".to_string(),
            });
        }
        Ok(Arc::new(chain))
    }
}
