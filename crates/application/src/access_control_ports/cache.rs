use async_trait::async_trait;
use dmart_core::AppResult;
use dmart_domain::UserPermissions;
use uuid::Uuid;

/// Cache port for resolved per-user permissions.
///
/// Entries are keyed by snapshot revision and user shortname so that a
/// reload never serves permissions resolved from an older snapshot, even when
/// several processes share one cache.
#[async_trait]
pub trait UserPermissionCache: Send + Sync {
    /// Returns cached permissions for one user at one snapshot revision.
    async fn get(&self, revision: Uuid, user_shortname: &str)
    -> AppResult<Option<UserPermissions>>;

    /// Stores permissions for one user with ttl.
    async fn put(
        &self,
        revision: Uuid,
        user_shortname: &str,
        permissions: &UserPermissions,
        ttl_seconds: u32,
    ) -> AppResult<()>;

    /// Drops every cached entry.
    async fn clear(&self) -> AppResult<()>;
}
