//! Application services and ports for access control.

#![forbid(unsafe_code)]

mod access_control_ports;
mod access_control_service;
mod permission_resolver;
mod permission_store;
mod settings;

#[cfg(test)]
mod test_support;

pub use access_control_ports::{
    AccessRequest, EntryLocator, EntryRepository, ManagementEntry, ManagementEntryRepository,
    SnapshotRepository, UserPermissionCache,
};
pub use access_control_service::AccessControlService;
pub use permission_resolver::{effective_roles, resolve_user_permissions};
pub use permission_store::{PERMISSION_SNAPSHOT_NAME, PermissionSnapshot, PermissionStore};
pub use settings::{AccessControlSettings, QueryPolicyFormat};
