use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dmart_application::UserPermissionCache;
use dmart_core::AppResult;
use dmart_domain::UserPermissions;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct PermissionCacheEntry {
    permissions: UserPermissions,
    expires_at: Instant,
}

/// In-memory cache adapter for resolved user permissions.
#[derive(Default)]
pub struct InMemoryUserPermissionCache {
    entries: RwLock<HashMap<(Uuid, String), PermissionCacheEntry>>,
}

impl InMemoryUserPermissionCache {
    /// Creates an empty in-memory permission cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserPermissionCache for InMemoryUserPermissionCache {
    async fn get(
        &self,
        revision: Uuid,
        user_shortname: &str,
    ) -> AppResult<Option<UserPermissions>> {
        let key = (revision, user_shortname.to_owned());
        {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.permissions.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(&key)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(&key);
        }

        Ok(None)
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

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(u64::from(ttl_seconds)))
            .unwrap_or(now);

        self.entries.write().await.insert(
            (revision, user_shortname.to_owned()),
            PermissionCacheEntry {
                permissions: permissions.clone(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        self.entries.write().await.clear();
        Ok(())
    }
}
