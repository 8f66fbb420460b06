use async_trait::async_trait;
use dmart_core::AppResult;
use dmart_domain::{EntryMeta, ResourceType, User};
use serde_json::Value;

/// Raw management entry as returned by storage, before decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagementEntry {
    /// Entry shortname as recorded by storage.
    pub shortname: String,
    /// Stored meta document.
    pub document: Value,
}

/// Address of one stored entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryLocator {
    /// Space holding the entry.
    pub space_name: String,
    /// Subpath holding the entry.
    pub subpath: String,
    /// Entry shortname.
    pub shortname: String,
    /// Entry type tag.
    pub resource_type: ResourceType,
}

impl EntryLocator {
    /// Creates a locator.
    #[must_use]
    pub fn new(
        space_name: impl Into<String>,
        subpath: impl Into<String>,
        shortname: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            space_name: space_name.into(),
            subpath: subpath.into(),
            shortname: shortname.into(),
            resource_type,
        }
    }
}

/// Storage port enumerating management entries for the permission snapshot.
#[async_trait]
pub trait ManagementEntryRepository: Send + Sync {
    /// Lists active entries of one type under a space subpath.
    async fn load_active_entries(
        &self,
        space_name: &str,
        subpath: &str,
        resource_type: ResourceType,
    ) -> AppResult<Vec<ManagementEntry>>;
}

/// Storage port for single-entry lookups made while authorizing.
///
/// Absence is reported as `Ok(None)`; errors are reserved for storage
/// failures.
#[async_trait]
pub trait EntryRepository: Send + Sync {
    /// Finds a user record.
    async fn find_user(&self, locator: &EntryLocator) -> AppResult<Option<User>>;

    /// Finds an entry's meta.
    async fn find_entry(&self, locator: &EntryLocator) -> AppResult<Option<EntryMeta>>;
}

/// Port publishing the permission snapshot for other processes.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Creates the supporting permission search index when missing.
    async fn prepare_permission_index(&self) -> AppResult<()>;

    /// Persists a named snapshot document, replacing any previous one.
    async fn persist_snapshot(&self, name: &str, data: &Value) -> AppResult<()>;

    /// Reads a named snapshot document.
    async fn fetch_snapshot(&self, name: &str) -> AppResult<Option<Value>>;
}
