//! Redis-backed cache of resolved user permissions.

use async_trait::async_trait;
use dmart_application::UserPermissionCache;
use dmart_core::{AppError, AppResult};
use dmart_domain::UserPermissions;
use redis::{AsyncCommands, Script};
use uuid::Uuid;

const PUT_ENTRY_SCRIPT: &str = r#"
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
redis.call('SADD', KEYS[2], KEYS[1])
redis.call('EXPIRE', KEYS[2], ARGV[2])
return 1
"#;

const CLEAR_ENTRIES_SCRIPT: &str = r#"
local keys = redis.call('SMEMBERS', KEYS[1])
for i = 1, #keys, 500 do
  redis.call('DEL', unpack(keys, i, math.min(i + 499, #keys)))
end
redis.call('DEL', KEYS[1])
return #keys
"#;

/// Redis implementation of the user permission cache port.
///
/// Every cached entry is registered in an index set so that clearing never
/// scans the keyspace. Entry keys and the index share one hash tag, which
/// keeps them in a single cluster slot.
#[derive(Clone)]
pub struct RedisUserPermissionCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisUserPermissionCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, revision: Uuid, user_shortname: &str) -> String {
        format!(
            "{{{}}}:users_permissions:{revision}:{user_shortname}",
            self.key_prefix
        )
    }

    fn index_key(&self) -> String {
        format!("{{{}}}:users_permissions_index", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl UserPermissionCache for RedisUserPermissionCache {
    async fn get(
        &self,
        revision: Uuid,
        user_shortname: &str,
    ) -> AppResult<Option<UserPermissions>> {
        let mut connection = self.connection().await?;
        let encoded: Option<String> = connection
            .get(self.key_for(revision, user_shortname))
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to read cached permissions for '{user_shortname}': {error}"
                ))
            })?;

        encoded
            .map(|encoded| {
                serde_json::from_str(encoded.as_str()).map_err(|error| {
                    AppError::Internal(format!(
                        "invalid cached permissions for '{user_shortname}': {error}"
                    ))
                })
            })
            .transpose()
    }

    async fn put(
        &self,
        revision: Uuid,
        user_shortname: &str,
        permissions: &UserPermissions,
        ttl_seconds: u32,
    ) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let encoded = serde_json::to_string(permissions).map_err(|error| {
            AppError::Internal(format!(
                "failed to encode permissions for '{user_shortname}': {error}"
            ))
        })?;
        let mut connection = self.connection().await?;

        Script::new(PUT_ENTRY_SCRIPT)
            .key(self.key_for(revision, user_shortname))
            .key(self.index_key())
            .arg(encoded)
            .arg(i64::from(ttl_seconds))
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!(
                    "failed to cache permissions for '{user_shortname}': {error}"
                ))
            })?;

        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        let mut connection = self.connection().await?;
        Script::new(CLEAR_ENTRIES_SCRIPT)
            .key(self.index_key())
            .invoke_async::<i64>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to clear cached permissions: {error}"))
            })?;

        Ok(())
    }
}
