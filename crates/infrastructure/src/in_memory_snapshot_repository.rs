use std::collections::HashMap;

use async_trait::async_trait;
use dmart_application::SnapshotRepository;
use dmart_core::AppResult;
use serde_json::Value;
use tokio::sync::RwLock;

/// In-memory snapshot publication for single-process deployments and tests.
#[derive(Default)]
pub struct InMemorySnapshotRepository {
    documents: RwLock<HashMap<String, Value>>,
    index_prepared: RwLock<bool>,
}

impl InMemorySnapshotRepository {
    /// Creates an empty snapshot repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the permission index has been prepared.
    pub async fn index_prepared(&self) -> bool {
        *self.index_prepared.read().await
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn prepare_permission_index(&self) -> AppResult<()> {
        *self.index_prepared.write().await = true;
        Ok(())
    }

    async fn persist_snapshot(&self, name: &str, data: &Value) -> AppResult<()> {
        self.documents
            .write()
            .await
            .insert(name.to_owned(), data.clone());
        Ok(())
    }

    async fn fetch_snapshot(&self, name: &str) -> AppResult<Option<Value>> {
        Ok(self.documents.read().await.get(name).cloned())
    }
}
