use std::collections::HashMap;

use async_trait::async_trait;
use dmart_application::{EntryLocator, EntryRepository, ManagementEntry, ManagementEntryRepository};
use dmart_core::{AppError, AppResult};
use dmart_domain::{EntryMeta, ResourceType, User, normalize_subpath, query_policies_match};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredEntry {
    is_active: bool,
    document: Value,
    query_policies: Vec<String>,
}

/// In-memory entry store stamping query policies on write.
#[derive(Default)]
pub struct InMemoryEntryRepository {
    entries: RwLock<HashMap<EntryLocator, StoredEntry>>,
}

impl InMemoryEntryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves an entry meta document under a space subpath and returns the
    /// query policies stamped on it.
    pub async fn save_entry(
        &self,
        space_name: &str,
        subpath: &str,
        document: Value,
    ) -> AppResult<Vec<String>> {
        let meta: EntryMeta = serde_json::from_value(document.clone())
            .map_err(|error| AppError::Validation(format!("invalid entry meta: {error}")))?;
        let subpath = normalize_subpath(subpath);
        let query_policies = meta.query_policies(space_name, subpath.as_str());

        let locator = EntryLocator::new(
            space_name,
            subpath,
            meta.shortname.as_str(),
            meta.resource_type,
        );
        self.entries.write().await.insert(
            locator,
            StoredEntry {
                is_active: meta.is_active,
                document,
                query_policies: query_policies.clone(),
            },
        );

        Ok(query_policies)
    }

    /// Removes an entry. Returns whether it existed.
    pub async fn delete_entry(&self, locator: &EntryLocator) -> bool {
        self.entries.write().await.remove(locator).is_some()
    }

    /// Returns the query policies stored with an entry.
    pub async fn stored_query_policies(&self, locator: &EntryLocator) -> Option<Vec<String>> {
        self.entries
            .read()
            .await
            .get(locator)
            .map(|entry| entry.query_policies.clone())
    }

    /// Lists the entries of a space whose stored query policies match any of
    /// the filters, ordered by subpath and shortname.
    pub async fn search(&self, space_name: &str, filters: &[String]) -> Vec<EntryLocator> {
        let entries = self.entries.read().await;
        let mut matches: Vec<EntryLocator> = entries
            .iter()
            .filter(|(locator, entry)| {
                locator.space_name == space_name
                    && query_policies_match(filters, &entry.query_policies)
            })
            .map(|(locator, _)| locator.clone())
            .collect();
        matches.sort_by(|left, right| {
            (left.subpath.as_str(), left.shortname.as_str())
                .cmp(&(right.subpath.as_str(), right.shortname.as_str()))
        });

        matches
    }

    async fn decode_at<T: DeserializeOwned>(&self, locator: &EntryLocator) -> AppResult<Option<T>> {
        let normalized = EntryLocator {
            subpath: normalize_subpath(locator.subpath.as_str()),
            ..locator.clone()
        };
        let Some(entry) = self.entries.read().await.get(&normalized).cloned() else {
            return Ok(None);
        };

        serde_json::from_value(entry.document).map(Some).map_err(|error| {
            AppError::Internal(format!(
                "failed to decode @{}/{}/{}: {error}",
                normalized.space_name, normalized.subpath, normalized.shortname
            ))
        })
    }
}

#[async_trait]
impl ManagementEntryRepository for InMemoryEntryRepository {
    async fn load_active_entries(
        &self,
        space_name: &str,
        subpath: &str,
        resource_type: ResourceType,
    ) -> AppResult<Vec<ManagementEntry>> {
        let subpath = normalize_subpath(subpath);
        let entries = self.entries.read().await;
        let mut active: Vec<ManagementEntry> = entries
            .iter()
            .filter(|(locator, entry)| {
                entry.is_active
                    && locator.space_name == space_name
                    && locator.subpath == subpath
                    && locator.resource_type == resource_type
            })
            .map(|(locator, entry)| ManagementEntry {
                shortname: locator.shortname.clone(),
                document: entry.document.clone(),
            })
            .collect();
        active.sort_by(|left, right| left.shortname.cmp(&right.shortname));

        Ok(active)
    }
}

#[async_trait]
impl EntryRepository for InMemoryEntryRepository {
    async fn find_user(&self, locator: &EntryLocator) -> AppResult<Option<User>> {
        self.decode_at(locator).await
    }

    async fn find_entry(&self, locator: &EntryLocator) -> AppResult<Option<EntryMeta>> {
        self.decode_at(locator).await
    }
}
