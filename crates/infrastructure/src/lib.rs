//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_entry_repository;
mod in_memory_snapshot_repository;
mod in_memory_user_permission_cache;
mod postgres_entry_repository;
mod redis_snapshot_repository;
mod redis_user_permission_cache;

pub use in_memory_entry_repository::InMemoryEntryRepository;
pub use in_memory_snapshot_repository::InMemorySnapshotRepository;
pub use in_memory_user_permission_cache::InMemoryUserPermissionCache;
pub use postgres_entry_repository::PostgresEntryRepository;
pub use redis_snapshot_repository::RedisSnapshotRepository;
pub use redis_user_permission_cache::RedisUserPermissionCache;
