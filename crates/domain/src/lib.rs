//! Domain entities and invariants for dmart access control.

#![forbid(unsafe_code)]

mod access;
mod attributes;
mod grant;
mod policy;
mod resource;

pub use access::{AclEntry, AllowedValues, EntryMeta, Group, Permission, Role, User};
pub use attributes::flatten_attributes;
pub use grant::{AccessCheck, ResolvedPermission, UserPermissions};
pub use policy::{
    ALL_SPACES, ALL_SUBPATHS, ActiveState, CURRENT_USER, OwnerScope, PermissionKey, PolicyToken,
    ROOT_SUBPATH, generate_query_policies, global_access_subpath, normalize_subpath,
    query_policies_match, query_policy_tokens, resolve_permission_subpath, subpath_prefixes,
    wildcard_subpath,
};
pub use resource::{ActionType, ConditionType, ResourceType};
