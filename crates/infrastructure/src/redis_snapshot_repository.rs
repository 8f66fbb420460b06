//! Redis-backed publication of the permission snapshot.

use async_trait::async_trait;
use dmart_application::SnapshotRepository;
use dmart_core::{AppError, AppResult};
use redis::{AsyncCommands, Script};
use serde_json::Value;
use tracing::warn;

const PERSIST_SNAPSHOT_SCRIPT: &str = r#"
redis.call('HSET', KEYS[1], 'name', ARGV[1], 'generation', ARGV[2], 'document', ARGV[3])
local prefix = ARGV[4]
for _, name in ipairs(redis.call('SMEMBERS', KEYS[2])) do
  redis.call('DEL', prefix .. name)
end
redis.call('DEL', KEYS[2])
for i = 5, #ARGV, 2 do
  redis.call('HSET', prefix .. ARGV[i], 'name', ARGV[i], 'document', ARGV[i + 1])
  redis.call('SADD', KEYS[2], ARGV[i])
end
return (#ARGV - 4) / 2
"#;

/// Redis implementation of the snapshot repository port.
///
/// Each snapshot is a hash holding its name, generation and JSON document.
/// The permissions it carries are also written one hash per permission and
/// indexed by name with RediSearch when the search module is loaded.
#[derive(Clone)]
pub struct RedisSnapshotRepository {
    client: redis::Client,
    key_prefix: String,
}

impl RedisSnapshotRepository {
    /// Creates a repository with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, name: &str) -> String {
        format!("{}:snapshots:{name}", self.key_prefix)
    }

    fn permission_key_prefix(&self) -> String {
        format!("{}:permissions:", self.key_prefix)
    }

    fn permission_names_key(&self) -> String {
        format!("{}:permission_names", self.key_prefix)
    }

    fn index_name(&self) -> String {
        format!("{}:permissions_idx", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Unavailable(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl SnapshotRepository for RedisSnapshotRepository {
    async fn prepare_permission_index(&self) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let created: redis::RedisResult<()> = redis::cmd("FT.CREATE")
            .arg(self.index_name())
            .arg("ON")
            .arg("HASH")
            .arg("PREFIX")
            .arg(1)
            .arg(self.permission_key_prefix())
            .arg("SCHEMA")
            .arg("name")
            .arg("TAG")
            .query_async(&mut connection)
            .await;

        match created {
            Ok(()) => Ok(()),
            Err(error) if error.to_string().contains("Index already exists") => Ok(()),
            Err(error) if error.to_string().to_ascii_lowercase().contains("unknown command") => {
                warn!(%error, "redis search module unavailable; permission index skipped");
                Ok(())
            }
            Err(error) => Err(AppError::Unavailable(format!(
                "failed to create permission index: {error}"
            ))),
        }
    }

    async fn persist_snapshot(&self, name: &str, data: &Value) -> AppResult<()> {
        let encoded = serde_json::to_string(data).map_err(|error| {
            AppError::Internal(format!("failed to encode snapshot '{name}': {error}"))
        })?;
        let generation = data.get("generation").and_then(Value::as_u64).unwrap_or(0);

        let script = Script::new(PERSIST_SNAPSHOT_SCRIPT);
        let mut invocation = script.prepare_invoke();
        invocation
            .key(self.key_for(name))
            .key(self.permission_names_key())
            .arg(name)
            .arg(generation)
            .arg(encoded)
            .arg(self.permission_key_prefix());
        for (shortname, document) in permission_documents(data) {
            invocation.arg(shortname).arg(document);
        }

        let mut connection = self.connection().await?;
        invocation
            .invoke_async::<i64>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to persist snapshot '{name}': {error}"))
            })?;

        Ok(())
    }

    async fn fetch_snapshot(&self, name: &str) -> AppResult<Option<Value>> {
        let mut connection = self.connection().await?;
        let encoded: Option<String> = connection
            .hget(self.key_for(name), "document")
            .await
            .map_err(|error| {
                AppError::Unavailable(format!("failed to read snapshot '{name}': {error}"))
            })?;

        encoded
            .map(|encoded| {
                serde_json::from_str(encoded.as_str()).map_err(|error| {
                    AppError::SnapshotLoad(format!("failed to decode snapshot '{name}': {error}"))
                })
            })
            .transpose()
    }
}

/// Pairs each permission shortname in a snapshot document with its JSON.
fn permission_documents(data: &Value) -> Vec<(&str, String)> {
    data.get("permissions")
        .and_then(Value::as_object)
        .map(|permissions| {
            permissions
                .iter()
                .map(|(shortname, permission)| (shortname.as_str(), permission.to_string()))
                .collect()
        })
        .unwrap_or_default()
}
