//! Named configuration parameters.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::errors::ScanError;

/// Parameter that switches finding submission on (`"yes"`) or off.
pub const ENABLE_FINDINGS_PARAMETER: &str = "/SCAPTesting/EnableSecurityHub";

/// Source of named parameter values.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Value of `name`, decrypted when `decrypt` is set and the backend
    /// stores it encrypted. A missing name is `ConfigUnavailable`.
    async fn get(&self, name: &str, decrypt: bool) -> Result<String, ScanError>;
}

/// Parameter store kept in Redis, one string key per parameter.
///
/// Values are stored in plaintext, so `decrypt` has nothing to undo.
#[derive(Clone)]
pub struct RedisParameterStore {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisParameterStore {
    pub async fn connect(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ParameterStore for RedisParameterStore {
    async fn get(&self, name: &str, _decrypt: bool) -> Result<String, ScanError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn
            .get(name)
            .await
            .map_err(|e| ScanError::ConfigUnavailable(format!("Redis GET {name}: {e}")))?;
        value.ok_or_else(|| ScanError::ConfigUnavailable(format!("Parameter {name} is not set")))
    }
}
