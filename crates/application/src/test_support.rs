use std::collections::HashMap;

use async_trait::async_trait;
use dmart_core::{AppError, AppResult};
use dmart_domain::{EntryMeta, ResourceType, User, UserPermissions};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    EntryLocator, EntryRepository, ManagementEntry, ManagementEntryRepository, SnapshotRepository,
    UserPermissionCache,
};

#[derive(Default)]
pub(crate) struct FakeManagementEntryRepository {
    entries: Mutex<HashMap<String, Vec<ManagementEntry>>>,
    calls: Mutex<usize>,
}

impl FakeManagementEntryRepository {
    pub(crate) async fn set_entries(&self, subpath: &str, documents: Vec<Value>) {
        let entries = documents
            .into_iter()
            .map(|document| ManagementEntry {
                shortname: document
                    .get("shortname")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_owned(),
                document,
            })
            .collect();
        self.entries.lock().await.insert(subpath.to_owned(), entries);
    }

    pub(crate) async fn calls(&self) -> usize {
        *self.calls.lock().await
    }
}

#[async_trait]
impl ManagementEntryRepository for FakeManagementEntryRepository {
    async fn load_active_entries(
        &self,
        _space_name: &str,
        subpath: &str,
        _resource_type: ResourceType,
    ) -> AppResult<Vec<ManagementEntry>> {
        *self.calls.lock().await += 1;
        Ok(self
            .entries
            .lock()
            .await
            .get(subpath)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub(crate) struct FakeSnapshotRepository {
    pub(crate) documents: Mutex<HashMap<String, Value>>,
    pub(crate) index_preparations: Mutex<usize>,
    pub(crate) unavailable: Mutex<bool>,
}

#[async_trait]
impl SnapshotRepository for FakeSnapshotRepository {
    async fn prepare_permission_index(&self) -> AppResult<()> {
        *self.index_preparations.lock().await += 1;
        Ok(())
    }

    async fn persist_snapshot(&self, name: &str, data: &Value) -> AppResult<()> {
        if *self.unavailable.lock().await {
            return Err(AppError::Unavailable("snapshot store is down".to_owned()));
        }

        self.documents
            .lock()
            .await
            .insert(name.to_owned(), data.clone());
        Ok(())
    }

    async fn fetch_snapshot(&self, name: &str) -> AppResult<Option<Value>> {
        Ok(self.documents.lock().await.get(name).cloned())
    }
}

#[derive(Default)]
pub(crate) struct FakeUserPermissionCache {
    pub(crate) entries: Mutex<HashMap<(Uuid, String), UserPermissions>>,
    pub(crate) clears: Mutex<usize>,
}

#[async_trait]
impl UserPermissionCache for FakeUserPermissionCache {
    async fn get(
        &self,
        revision: Uuid,
        user_shortname: &str,
    ) -> AppResult<Option<UserPermissions>> {
        Ok(self
            .entries
            .lock()
            .await
            .get(&(revision, user_shortname.to_owned()))
            .cloned())
    }

    async fn put(
        &self,
        revision: Uuid,
        user_shortname: &str,
        permissions: &UserPermissions,
        _ttl_seconds: u32,
    ) -> AppResult<()> {
        self.entries
            .lock()
            .await
            .insert((revision, user_shortname.to_owned()), permissions.clone());
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        self.entries.lock().await.clear();
        *self.clears.lock().await += 1;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeEntryRepository {
    users: Mutex<HashMap<String, User>>,
    entries: Mutex<HashMap<EntryLocator, EntryMeta>>,
    lookups: Mutex<Vec<EntryLocator>>,
    unavailable: Mutex<bool>,
}

impl FakeEntryRepository {
    pub(crate) async fn insert_user(&self, document: Value) -> AppResult<()> {
        let user: User = serde_json::from_value(document)
            .map_err(|error| AppError::Validation(error.to_string()))?;
        self.users
            .lock()
            .await
            .insert(user.shortname.as_str().to_owned(), user);
        Ok(())
    }

    pub(crate) async fn insert_entry(&self, locator: EntryLocator, document: Value) -> AppResult<()> {
        let entry: EntryMeta = serde_json::from_value(document)
            .map_err(|error| AppError::Validation(error.to_string()))?;
        self.entries.lock().await.insert(locator, entry);
        Ok(())
    }

    pub(crate) async fn lookups(&self) -> Vec<EntryLocator> {
        self.lookups.lock().await.clone()
    }

    pub(crate) async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().await = unavailable;
    }
}

#[async_trait]
impl EntryRepository for FakeEntryRepository {
    async fn find_user(&self, locator: &EntryLocator) -> AppResult<Option<User>> {
        Ok(self.users.lock().await.get(&locator.shortname).cloned())
    }

    async fn find_entry(&self, locator: &EntryLocator) -> AppResult<Option<EntryMeta>> {
        if *self.unavailable.lock().await {
            return Err(AppError::Unavailable("entry store is down".to_owned()));
        }

        self.lookups.lock().await.push(locator.clone());
        Ok(self.entries.lock().await.get(locator).cloned())
    }
}

pub(crate) fn permission_document(
    shortname: &str,
    subpaths: Value,
    resource_types: &[&str],
    actions: &[&str],
    conditions: &[&str],
) -> Value {
    json!({
        "shortname": shortname,
        "is_active": true,
        "subpaths": subpaths,
        "resource_types": resource_types,
        "actions": actions,
        "conditions": conditions,
    })
}

pub(crate) fn role_document(shortname: &str, permissions: &[&str]) -> Value {
    json!({
        "shortname": shortname,
        "is_active": true,
        "permissions": permissions,
    })
}

pub(crate) fn group_document(shortname: &str, roles: &[&str]) -> Value {
    json!({
        "shortname": shortname,
        "is_active": true,
        "roles": roles,
    })
}

pub(crate) fn user_document(shortname: &str, roles: &[&str], groups: &[&str]) -> Value {
    json!({
        "shortname": shortname,
        "is_active": true,
        "roles": roles,
        "groups": groups,
    })
}
