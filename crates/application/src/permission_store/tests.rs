use std::sync::Arc;

use dmart_core::{AppError, AppResult};
use serde_json::json;

use crate::test_support::{
    FakeManagementEntryRepository, FakeSnapshotRepository, FakeUserPermissionCache,
    group_document, permission_document, role_document,
};

use super::{PERMISSION_SNAPSHOT_NAME, PermissionStore};

struct Fixture {
    entries: Arc<FakeManagementEntryRepository>,
    snapshots: Arc<FakeSnapshotRepository>,
    cache: Arc<FakeUserPermissionCache>,
    store: PermissionStore,
}

fn fixture() -> Fixture {
    let entries = Arc::new(FakeManagementEntryRepository::default());
    let snapshots = Arc::new(FakeSnapshotRepository::default());
    let cache = Arc::new(FakeUserPermissionCache::default());
    let store = PermissionStore::new(
        "management",
        entries.clone(),
        snapshots.clone(),
        cache.clone(),
    );

    Fixture {
        entries,
        snapshots,
        cache,
        store,
    }
}

async fn seed_generation(entries: &FakeManagementEntryRepository, version: u64) {
    let permission = format!("perm_{version}");
    let role = format!("role_{version}");
    entries
        .set_entries(
            "permissions",
            vec![permission_document(
                permission.as_str(),
                json!({"acme": ["posts"]}),
                &["content"],
                &["view"],
                &[],
            )],
        )
        .await;
    entries
        .set_entries(
            "roles",
            vec![role_document(role.as_str(), &[permission.as_str()])],
        )
        .await;
}

#[tokio::test]
async fn reload_installs_active_entries_and_publishes() -> AppResult<()> {
    let fixture = fixture();
    fixture
        .entries
        .set_entries(
            "permissions",
            vec![
                permission_document("view_posts", json!({"acme": ["posts"]}), &["content"], &["view"], &[]),
                json!({
                    "shortname": "retired",
                    "is_active": false,
                    "subpaths": {"acme": ["/"]},
                    "resource_types": ["content"],
                    "actions": ["delete"]
                }),
            ],
        )
        .await;
    fixture
        .entries
        .set_entries("roles", vec![role_document("editor", &["view_posts"])])
        .await;
    fixture
        .entries
        .set_entries("groups", vec![group_document("editors", &["editor"])])
        .await;

    let snapshot = fixture.store.load_permissions_and_roles().await?;

    assert_eq!(snapshot.generation(), 1);
    assert_eq!(snapshot.counts(), (1, 1, 1));
    assert!(snapshot.permission("view_posts").is_some());
    assert!(snapshot.permission("retired").is_none());
    assert_eq!(fixture.store.current().await.generation(), 1);
    assert_eq!(*fixture.snapshots.index_preparations.lock().await, 1);
    assert!(
        fixture
            .snapshots
            .documents
            .lock()
            .await
            .contains_key(PERMISSION_SNAPSHOT_NAME)
    );
    assert_eq!(*fixture.cache.clears.lock().await, 1);
    assert_eq!(fixture.entries.calls().await, 3);

    let snapshot = fixture.store.load_permissions_and_roles().await?;
    assert_eq!(snapshot.generation(), 2);
    Ok(())
}

#[tokio::test]
async fn malformed_entry_aborts_reload_and_keeps_previous_snapshot() -> AppResult<()> {
    let fixture = fixture();
    seed_generation(&fixture.entries, 1).await;
    fixture.store.load_permissions_and_roles().await?;

    fixture
        .entries
        .set_entries(
            "permissions",
            vec![json!({
                "shortname": "broken",
                "is_active": true,
                "subpaths": {"acme": ["posts"]},
                "resource_types": ["content"],
                "actions": ["publish"]
            })],
        )
        .await;

    let result = fixture.store.load_permissions_and_roles().await;
    assert!(matches!(result, Err(AppError::SnapshotLoad(_))));

    let current = fixture.store.current().await;
    assert_eq!(current.generation(), 1);
    assert!(current.permission("perm_1").is_some());
    assert_eq!(*fixture.cache.clears.lock().await, 1);
    Ok(())
}

#[tokio::test]
async fn published_snapshot_is_adopted_by_another_store() -> AppResult<()> {
    let publisher = fixture();
    seed_generation(&publisher.entries, 7).await;
    publisher.store.load_permissions_and_roles().await?;

    let follower = PermissionStore::new(
        "management",
        Arc::new(FakeManagementEntryRepository::default()),
        publisher.snapshots.clone(),
        Arc::new(FakeUserPermissionCache::default()),
    );

    assert!(follower.adopt_published_snapshot().await?);
    let adopted = follower.current().await;
    assert_eq!(adopted.generation(), 1);
    assert!(adopted.role("role_7").is_some());
    assert!(adopted.permission("perm_7").is_some());
    Ok(())
}

#[tokio::test]
async fn failed_publication_keeps_previous_snapshot() -> AppResult<()> {
    let fixture = fixture();
    seed_generation(&fixture.entries, 1).await;
    let previous = fixture.store.load_permissions_and_roles().await?;

    seed_generation(&fixture.entries, 2).await;
    *fixture.snapshots.unavailable.lock().await = true;
    let result = fixture.store.load_permissions_and_roles().await;
    assert!(matches!(result, Err(AppError::Unavailable(_))));

    let current = fixture.store.current().await;
    assert_eq!(current.revision(), previous.revision());
    assert!(current.permission("perm_1").is_some());
    assert!(current.permission("perm_2").is_none());
    assert_eq!(*fixture.cache.clears.lock().await, 1);

    *fixture.snapshots.unavailable.lock().await = false;
    let snapshot = fixture.store.load_permissions_and_roles().await?;
    assert_eq!(snapshot.generation(), 2);
    assert!(snapshot.permission("perm_2").is_some());
    Ok(())
}

#[tokio::test]
async fn reload_generation_stays_ahead_of_the_published_one() -> AppResult<()> {
    let publisher = fixture();
    seed_generation(&publisher.entries, 1).await;
    for _ in 0..3 {
        publisher.store.load_permissions_and_roles().await?;
    }

    let entries = Arc::new(FakeManagementEntryRepository::default());
    seed_generation(&entries, 5).await;
    let latecomer = PermissionStore::new(
        "management",
        entries,
        publisher.snapshots.clone(),
        publisher.cache.clone(),
    );

    let snapshot = latecomer.load_permissions_and_roles().await?;
    assert_eq!(snapshot.generation(), 4);
    assert_ne!(
        snapshot.revision(),
        publisher.store.current().await.revision()
    );
    Ok(())
}

#[tokio::test]
async fn adoption_ignores_current_and_older_snapshots() -> AppResult<()> {
    let publisher = fixture();
    seed_generation(&publisher.entries, 1).await;
    publisher.store.load_permissions_and_roles().await?;
    assert!(!publisher.store.adopt_published_snapshot().await?);

    let follower = fixture();
    seed_generation(&follower.entries, 2).await;
    for _ in 0..2 {
        follower.store.load_permissions_and_roles().await?;
    }

    let stale = PermissionStore::new(
        "management",
        follower.entries.clone(),
        publisher.snapshots.clone(),
        follower.cache.clone(),
    );
    stale.load_permissions_and_roles().await?;
    let installed = stale.current().await;
    assert_eq!(installed.generation(), 2);

    publisher.store.load_permissions_and_roles().await?;
    assert!(stale.adopt_published_snapshot().await?);
    assert_eq!(stale.current().await.generation(), 3);
    assert!(stale.current().await.role("role_1").is_some());

    let older = fixture();
    seed_generation(&older.entries, 9).await;
    older.store.load_permissions_and_roles().await?;
    let ahead = PermissionStore::new(
        "management",
        follower.entries.clone(),
        older.snapshots.clone(),
        follower.cache.clone(),
    );
    for _ in 0..2 {
        ahead.load_permissions_and_roles().await?;
    }
    older.snapshots.documents.lock().await.clear();
    older.store.load_permissions_and_roles().await?;
    assert_eq!(older.store.current().await.generation(), 2);
    assert!(!ahead.adopt_published_snapshot().await?);
    assert!(ahead.current().await.role("role_2").is_some());
    Ok(())
}

#[tokio::test]
async fn adopting_without_publication_keeps_empty_snapshot() -> AppResult<()> {
    let fixture = fixture();
    assert!(!fixture.store.adopt_published_snapshot().await?);
    assert_eq!(fixture.store.current().await.generation(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_a_mixed_generation() -> AppResult<()> {
    let fixture = fixture();
    seed_generation(&fixture.entries, 0).await;
    fixture.store.load_permissions_and_roles().await?;

    let store = Arc::new(fixture.store);
    let mut readers = Vec::new();
    for _ in 0..4 {
        let store = Arc::clone(&store);
        readers.push(tokio::spawn(async move {
            for _ in 0..500 {
                let snapshot = store.current().await;
                let (_, role_count, permission_count) = snapshot.counts();
                assert_eq!(role_count, 1);
                assert_eq!(permission_count, 1);

                let version = snapshot.generation() - 1;
                let role = format!("role_{version}");
                let permission = format!("perm_{version}");
                let Some(role) = snapshot.role(role.as_str()) else {
                    panic!("role for generation {version} missing");
                };
                assert_eq!(role.permissions[0].as_str(), permission);
                assert!(snapshot.permission(permission.as_str()).is_some());
                tokio::task::yield_now().await;
            }
        }));
    }

    for version in 1..20 {
        seed_generation(&fixture.entries, version).await;
        store.load_permissions_and_roles().await?;
    }

    for reader in readers {
        if let Err(error) = reader.await {
            panic!("reader task failed: {error}");
        }
    }
    Ok(())
}
