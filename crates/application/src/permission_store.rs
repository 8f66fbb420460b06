//! Process-wide snapshot of the active groups, roles and permissions.
//!
//! Readers take an `Arc` to the current snapshot and never observe a
//! partially rebuilt one: a reload decodes every management entry into a new
//! snapshot first and publishes it with a single pointer swap.
//!
//! Every snapshot carries a random revision. Per-user permission caches are
//! shared between processes, so they are keyed by revision rather than by the
//! generation counter, which two processes may reach independently.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dmart_core::{AppError, AppResult, Shortname};
use dmart_domain::{Group, Permission, ResourceType, Role};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{ManagementEntry, ManagementEntryRepository, SnapshotRepository, UserPermissionCache};

/// Name under which the snapshot is published for other processes.
pub const PERMISSION_SNAPSHOT_NAME: &str = "access_control_snapshot";

/// Immutable view of the management entries used for authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSnapshot {
    generation: u64,
    revision: Uuid,
    loaded_at: Option<DateTime<Utc>>,
    groups: BTreeMap<String, Group>,
    roles: BTreeMap<String, Role>,
    permissions: BTreeMap<String, Permission>,
}

impl PermissionSnapshot {
    /// Creates an empty snapshot at generation zero.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            generation: 0,
            revision: Uuid::nil(),
            loaded_at: None,
            groups: BTreeMap::new(),
            roles: BTreeMap::new(),
            permissions: BTreeMap::new(),
        }
    }

    /// Creates a snapshot from already-decoded entries.
    #[must_use]
    pub fn new(
        generation: u64,
        groups: Vec<Group>,
        roles: Vec<Role>,
        permissions: Vec<Permission>,
    ) -> Self {
        Self {
            generation,
            revision: Uuid::new_v4(),
            loaded_at: Some(Utc::now()),
            groups: index_by_shortname(groups, |group| &group.shortname),
            roles: index_by_shortname(roles, |role| &role.shortname),
            permissions: index_by_shortname(permissions, |permission| &permission.shortname),
        }
    }

    /// Reload counter, kept ahead of every snapshot seen so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Identity of this build of the snapshot; versions per-user permission
    /// caches.
    #[must_use]
    pub fn revision(&self) -> Uuid {
        self.revision
    }

    /// Time the snapshot was built.
    #[must_use]
    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    /// Looks up an active group.
    #[must_use]
    pub fn group(&self, shortname: &str) -> Option<&Group> {
        self.groups.get(shortname)
    }

    /// Looks up an active role.
    #[must_use]
    pub fn role(&self, shortname: &str) -> Option<&Role> {
        self.roles.get(shortname)
    }

    /// Looks up an active permission.
    #[must_use]
    pub fn permission(&self, shortname: &str) -> Option<&Permission> {
        self.permissions.get(shortname)
    }

    /// Number of groups, roles and permissions held.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.groups.len(), self.roles.len(), self.permissions.len())
    }
}

impl Default for PermissionSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Holder of the current snapshot and owner of the reload operation.
pub struct PermissionStore {
    management_space: String,
    entries: Arc<dyn ManagementEntryRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    cache: Arc<dyn UserPermissionCache>,
    current: RwLock<Arc<PermissionSnapshot>>,
    reload_lock: Mutex<()>,
}

impl PermissionStore {
    /// Creates a store holding an empty snapshot.
    #[must_use]
    pub fn new(
        management_space: impl Into<String>,
        entries: Arc<dyn ManagementEntryRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        cache: Arc<dyn UserPermissionCache>,
    ) -> Self {
        Self {
            management_space: management_space.into(),
            entries,
            snapshots,
            cache,
            current: RwLock::new(Arc::new(PermissionSnapshot::empty())),
            reload_lock: Mutex::new(()),
        }
    }

    /// Returns the current snapshot.
    pub async fn current(&self) -> Arc<PermissionSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Rebuilds the snapshot from the management space.
    ///
    /// Any entry that fails to decode aborts the reload with
    /// [`AppError::SnapshotLoad`] and leaves the previous snapshot in place.
    /// The new snapshot is published for other processes (index prepared,
    /// document persisted) before it is installed locally, so a failed
    /// publication also keeps the previous snapshot. Cached per-user
    /// permissions are dropped afterwards. Concurrent reloads run one after
    /// another.
    pub async fn load_permissions_and_roles(&self) -> AppResult<Arc<PermissionSnapshot>> {
        let _reload = self.reload_lock.lock().await;
        let generation = self
            .current()
            .await
            .generation
            .max(self.published_generation().await?)
            .saturating_add(1);

        let groups: Vec<Group> = self.load_module(ResourceType::Group).await?;
        let roles: Vec<Role> = self.load_module(ResourceType::Role).await?;
        let permissions: Vec<Permission> = self.load_module(ResourceType::Permission).await?;

        let snapshot = Arc::new(PermissionSnapshot::new(
            generation,
            groups,
            roles,
            permissions,
        ));

        self.snapshots.prepare_permission_index().await?;
        let document = serde_json::to_value(snapshot.as_ref()).map_err(|error| {
            AppError::Internal(format!("failed to encode permission snapshot: {error}"))
        })?;
        self.snapshots
            .persist_snapshot(PERMISSION_SNAPSHOT_NAME, &document)
            .await?;

        *self.current.write().await = Arc::clone(&snapshot);

        let (group_count, role_count, permission_count) = snapshot.counts();
        info!(
            generation,
            revision = %snapshot.revision,
            groups = group_count,
            roles = role_count,
            permissions = permission_count,
            "permission snapshot reloaded"
        );

        if let Err(error) = self.cache.clear().await {
            warn!(
                generation,
                error = %error,
                "failed to clear cached user permissions"
            );
        }

        Ok(snapshot)
    }

    /// Installs the snapshot published by another process.
    ///
    /// Returns `false` when nothing has been published yet, or when the
    /// published snapshot is the current one or older than it.
    pub async fn adopt_published_snapshot(&self) -> AppResult<bool> {
        let Some(document) = self
            .snapshots
            .fetch_snapshot(PERMISSION_SNAPSHOT_NAME)
            .await?
        else {
            return Ok(false);
        };

        let snapshot: PermissionSnapshot = serde_json::from_value(document).map_err(|error| {
            AppError::SnapshotLoad(format!("failed to decode published snapshot: {error}"))
        })?;

        let _reload = self.reload_lock.lock().await;
        let current = self.current().await;
        if snapshot.revision == current.revision {
            return Ok(false);
        }
        if snapshot.generation < current.generation {
            warn!(
                published = snapshot.generation,
                current = current.generation,
                "ignoring published permission snapshot older than the current one"
            );
            return Ok(false);
        }

        info!(
            generation = snapshot.generation,
            revision = %snapshot.revision,
            "adopted published permission snapshot"
        );
        *self.current.write().await = Arc::new(snapshot);

        Ok(true)
    }

    async fn published_generation(&self) -> AppResult<u64> {
        Ok(self
            .snapshots
            .fetch_snapshot(PERMISSION_SNAPSHOT_NAME)
            .await?
            .and_then(|document| document.get("generation").and_then(Value::as_u64))
            .unwrap_or(0))
    }

    async fn load_module<T>(&self, resource_type: ResourceType) -> AppResult<Vec<T>>
    where
        T: ManagementRecord + DeserializeOwned,
    {
        let subpath = resource_type.management_subpath().ok_or_else(|| {
            AppError::Internal(format!(
                "resource type '{resource_type}' has no management subpath"
            ))
        })?;

        let entries = self
            .entries
            .load_active_entries(self.management_space.as_str(), subpath, resource_type)
            .await?;

        let mut records = Vec::with_capacity(entries.len());
        for ManagementEntry {
            shortname,
            document,
        } in entries
        {
            let record: T = serde_json::from_value(document).map_err(|error| {
                AppError::SnapshotLoad(format!(
                    "failed to decode @{}/{subpath}/{shortname}: {error}",
                    self.management_space
                ))
            })?;

            if record.is_active() {
                records.push(record);
            }
        }

        Ok(records)
    }
}

trait ManagementRecord {
    fn is_active(&self) -> bool;
}

impl ManagementRecord for Group {
    fn is_active(&self) -> bool {
        self.is_active
    }
}

impl ManagementRecord for Role {
    fn is_active(&self) -> bool {
        self.is_active
    }
}

impl ManagementRecord for Permission {
    fn is_active(&self) -> bool {
        self.is_active
    }
}

fn index_by_shortname<T>(
    records: Vec<T>,
    shortname: impl Fn(&T) -> &Shortname,
) -> BTreeMap<String, T> {
    records
        .into_iter()
        .map(|record| (shortname(&record).as_str().to_owned(), record))
        .collect()
}

#[cfg(test)]
mod tests;
