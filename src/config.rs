//! Configuration manager for the relay.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;
use crate::crypto::{CryptoError, SigningKey};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const SIGNING_KEY_REGISTRATION: &str = "SIGNING_KEY_REGISTRATION";
pub const SIGNING_KEY_AUTHENTICATION: &str = "SIGNING_KEY_AUTHENTICATION";
pub const SIGNING_KEY_REFRESH: &str = "SIGNING_KEY_REFRESH";
/// Overrides the configuration file location.
pub const CONFIG_PATH: &str = "CONFIG_PATH";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to token issuance.
    #[serde(default, skip_serializing)]
    pub token: Token,
    /// Related to Argon2 configuration.
    #[serde(skip_serializing)]
    pub argon2: Option<Argon2>,
}

/// Argon2 configuration.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Argon2 {
    /// Memory used while hashing.
    pub memory_cost: u32,
    /// Iterations of hash.
    pub iterations: u32,
    /// Parallelism degree.
    pub parallelism: u32,
    /// Output hash length.
    pub hash_length: usize,
}

impl Default for Argon2 {
    fn default() -> Self {
        Self {
            memory_cost: 1024 * 64, // 64 MiB.
            iterations: 4,
            parallelism: 2,
            hash_length: 32,
        }
    }
}

/// Token managers configuration. Durations are in seconds.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Token {
    pub registration_lifetime: u32,
    pub authentication_lifetime: u32,
    pub refresh_lifetime: u32,
    /// Symmetric clock skew tolerance applied on expiry.
    pub grace: u32,
    /// Encrypt claims with AES-256-GCM. Needs `KEY` and `SALT`.
    pub encryption: bool,
    /// Capacity of the token created events buffer.
    pub event_buffer: usize,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            registration_lifetime: 15 * 60,
            authentication_lifetime: 5 * 60,
            refresh_lifetime: 30 * 24 * 60 * 60,
            grace: 0,
            encryption: true,
            event_buffer: 1024,
        }
    }
}

impl Token {
    pub fn registration_lifetime(&self) -> TimeDelta {
        TimeDelta::seconds(self.registration_lifetime.into())
    }

    pub fn authentication_lifetime(&self) -> TimeDelta {
        TimeDelta::seconds(self.authentication_lifetime.into())
    }

    pub fn refresh_lifetime(&self) -> TimeDelta {
        TimeDelta::seconds(self.refresh_lifetime.into())
    }

    pub fn grace(&self) -> TimeDelta {
        TimeDelta::seconds(self.grace.into())
    }
}

/// Error raised while loading secrets.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("missing `{0}` environnement variable")]
    Missing(&'static str),
    #[error("`{0}` must not be empty")]
    Empty(&'static str),
    #[error("`{0}` and `{1}` must hold distinct keys")]
    Reused(&'static str, &'static str),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// One signing key per token purpose.
#[derive(Debug, Clone)]
pub struct SigningKeys {
    pub registration: SigningKey,
    pub authentication: SigningKey,
    pub refresh: SigningKey,
}

impl SigningKeys {
    /// Build keys, refusing any reuse across purposes.
    pub fn new(
        registration: SigningKey,
        authentication: SigningKey,
        refresh: SigningKey,
    ) -> Result<Self, SecretError> {
        let keys = [
            (SIGNING_KEY_REGISTRATION, &registration),
            (SIGNING_KEY_AUTHENTICATION, &authentication),
            (SIGNING_KEY_REFRESH, &refresh),
        ];
        for (i, (name, key)) in keys.iter().enumerate() {
            for (other_name, other) in &keys[i + 1..] {
                if key.same_as(other) {
                    return Err(SecretError::Reused(*name, *other_name));
                }
            }
        }

        Ok(Self {
            registration,
            authentication,
            refresh,
        })
    }

    /// Read keys from `SIGNING_KEY_*` environnement variables.
    pub fn from_env() -> Result<Self, SecretError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read keys through `lookup`, called with each variable name.
    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SecretError> {
        Self::new(
            read_key(SIGNING_KEY_REGISTRATION, &lookup)?,
            read_key(SIGNING_KEY_AUTHENTICATION, &lookup)?,
            read_key(SIGNING_KEY_REFRESH, &lookup)?,
        )
    }
}

fn read_key(
    name: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<SigningKey, SecretError> {
    let value = lookup(name).ok_or(SecretError::Missing(name))?;
    if value.is_empty() {
        return Err(SecretError::Empty(name));
    }

    Ok(SigningKey::new(value)?)
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    /// Create a configuration without reading any file.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }

    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Use the file named by `CONFIG_PATH`, when set.
    pub fn path_from_env(self) -> Self {
        match std::env::var(CONFIG_PATH) {
            Ok(path) => self.path(PathBuf::from(path)),
            Err(_) => self,
        }
    }

    /// Application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                // set app version.
                config.version = VERSION.to_owned();

                if !config.url.is_empty() {
                    config.url = self.normalize_url(&config.url)?;
                }

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}
