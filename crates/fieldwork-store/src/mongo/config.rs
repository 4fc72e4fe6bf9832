use std::env;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

const USERINFO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Connection settings for a MongoDB deployment.
///
/// Credentials are percent-encoded when the URI is assembled, so they may
/// contain `@`, `:` or `/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    pub user: Option<String>,
    pub password: Option<String>,
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub server_selection_timeout_ms: u64,
    pub max_pool_size: u32,
    pub retry_writes: bool,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            host: "localhost".to_string(),
            port: 27017,
            connect_timeout_ms: 60_000,
            server_selection_timeout_ms: 30_000,
            max_pool_size: 50,
            retry_writes: true,
        }
    }
}

impl MongoConfig {
    /// Read `MONGO_USER`, `MONGO_PASS`, `MONGO_HOST` and `MONGO_PORT`,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StoreError> {
        let mut config = Self::default();
        config.user = lookup("MONGO_USER").filter(|s| !s.is_empty());
        config.password = lookup("MONGO_PASS").filter(|s| !s.is_empty());
        if let Some(host) = lookup("MONGO_HOST").filter(|s| !s.is_empty()) {
            config.host = host;
        }
        if let Some(port) = lookup("MONGO_PORT").filter(|s| !s.is_empty()) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| StoreError::Connection(format!("invalid MONGO_PORT: {port}")))?;
        }
        Ok(config)
    }

    /// Grow the pool so every worker can hold a connection.
    pub fn with_min_pool_size(mut self, workers: usize) -> Self {
        let workers = u32::try_from(workers).unwrap_or(u32::MAX);
        self.max_pool_size = self.max_pool_size.max(workers);
        self
    }

    pub fn uri(&self) -> String {
        self.build_uri(false)
    }

    /// The URI with the password masked, for logs.
    pub fn redacted_uri(&self) -> String {
        self.build_uri(true)
    }

    fn build_uri(&self, redact: bool) -> String {
        let credentials = match (&self.user, &self.password) {
            (Some(user), Some(_)) if redact => {
                format!("{}:****@", utf8_percent_encode(user, USERINFO))
            }
            (Some(user), Some(password)) => format!(
                "{}:{}@",
                utf8_percent_encode(user, USERINFO),
                utf8_percent_encode(password, USERINFO)
            ),
            (Some(user), None) => format!("{}@", utf8_percent_encode(user, USERINFO)),
            _ => String::new(),
        };
        format!(
            "mongodb://{credentials}{}:{}/?connectTimeoutMS={}&serverSelectionTimeoutMS={}&maxPoolSize={}&retryWrites={}",
            self.host,
            self.port,
            self.connect_timeout_ms,
            self.server_selection_timeout_ms,
            self.max_pool_size,
            self.retry_writes
        )
    }
}
