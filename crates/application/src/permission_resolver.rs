//! Flattens a user's roles into permission keys against one snapshot.

use std::collections::BTreeSet;

use dmart_domain::{PermissionKey, User, UserPermissions, resolve_permission_subpath};
use tracing::warn;

use crate::PermissionSnapshot;

/// Returns the role shortnames a user holds: direct roles, the default role
/// and the roles of every known group the user belongs to.
#[must_use]
pub fn effective_roles(
    snapshot: &PermissionSnapshot,
    user: &User,
    default_role: Option<&str>,
) -> BTreeSet<String> {
    let mut roles: BTreeSet<String> = user
        .roles
        .iter()
        .map(|role| role.as_str().to_owned())
        .collect();

    if let Some(default_role) = default_role {
        roles.insert(default_role.to_owned());
    }

    for group_name in &user.groups {
        let Some(group) = snapshot.group(group_name.as_str()) else {
            warn!(
                user = %user.shortname,
                group = %group_name,
                "user belongs to an unknown or inactive group"
            );
            continue;
        };
        roles.extend(group.roles.iter().map(|role| role.as_str().to_owned()));
    }

    roles
}

/// Resolves a user's effective permissions keyed by `space:subpath:type`.
///
/// Grants landing on the same key are merged. Unknown roles and the missing
/// default role are skipped; a role naming an unknown permission is skipped
/// with a warning.
#[must_use]
pub fn resolve_user_permissions(
    snapshot: &PermissionSnapshot,
    user: &User,
    default_role: Option<&str>,
) -> UserPermissions {
    let mut resolved = UserPermissions::new();

    for role_name in effective_roles(snapshot, user, default_role) {
        let Some(role) = snapshot.role(role_name.as_str()) else {
            continue;
        };

        for permission_name in &role.permissions {
            let Some(permission) = snapshot.permission(permission_name.as_str()) else {
                warn!(
                    role = %role.shortname,
                    permission = %permission_name,
                    "role references an unknown or inactive permission"
                );
                continue;
            };

            for (space_name, subpaths) in &permission.subpaths {
                for subpath in subpaths {
                    let subpath =
                        resolve_permission_subpath(subpath.as_str(), user.shortname.as_str());
                    for resource_type in &permission.resource_types {
                        let key = PermissionKey::new(
                            space_name.as_str(),
                            subpath.as_str(),
                            *resource_type,
                        );
                        resolved.entry(key).or_default().absorb(permission);
                    }
                }
            }
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use dmart_domain::{
        ALL_SPACES, ActionType, ConditionType, Group, Permission, PermissionKey, ResourceType,
        Role, User,
    };
    use serde_json::{Value, json};

    use super::{effective_roles, resolve_user_permissions};
    use crate::PermissionSnapshot;
    use crate::test_support::{group_document, permission_document, role_document, user_document};

    fn decode<T: serde::de::DeserializeOwned>(document: Value) -> T {
        match serde_json::from_value(document) {
            Ok(value) => value,
            Err(error) => panic!("fixture should decode: {error}"),
        }
    }

    fn snapshot(groups: Vec<Value>, roles: Vec<Value>, permissions: Vec<Value>) -> PermissionSnapshot {
        PermissionSnapshot::new(
            1,
            groups.into_iter().map(decode::<Group>).collect(),
            roles.into_iter().map(decode::<Role>).collect(),
            permissions.into_iter().map(decode::<Permission>).collect(),
        )
    }

    #[test]
    fn roles_come_from_user_default_and_groups() {
        let snapshot = snapshot(
            vec![group_document("editors", &["editor"])],
            vec![],
            vec![],
        );
        let user: User = decode(user_document("alice", &["author"], &["editors", "ghosts"]));

        let roles = effective_roles(&snapshot, &user, Some("logged_in"));
        let roles: Vec<&str> = roles.iter().map(String::as_str).collect();
        assert_eq!(roles, vec!["author", "editor", "logged_in"]);
    }

    #[test]
    fn overlapping_grants_merge_actions_and_keep_stricter_conditions() {
        let snapshot = snapshot(
            vec![],
            vec![
                role_document("reader", &["view_posts"]),
                role_document("owner", &["edit_own_posts", "missing"]),
            ],
            vec![
                permission_document(
                    "view_posts",
                    json!({"acme": ["/posts/"]}),
                    &["content"],
                    &["view", "query"],
                    &["is_active"],
                ),
                permission_document(
                    "edit_own_posts",
                    json!({"acme": ["posts"]}),
                    &["content", "folder"],
                    &["update"],
                    &["is_active", "own"],
                ),
            ],
        );
        let user: User = decode(user_document("alice", &["reader", "owner"], &[]));

        let resolved = resolve_user_permissions(&snapshot, &user, None);
        assert_eq!(resolved.len(), 2);

        let Some(content) = resolved.get(&PermissionKey::new("acme", "posts", ResourceType::Content))
        else {
            panic!("content key should resolve");
        };
        assert!(content.allows_action(ActionType::View));
        assert!(content.allows_action(ActionType::Update));
        assert!(content.conditions.contains(&ConditionType::Own));
        assert_eq!(content.conditions.len(), 2);

        let Some(folder) = resolved.get(&PermissionKey::new("acme", "posts", ResourceType::Folder))
        else {
            panic!("folder key should resolve");
        };
        assert!(!folder.allows_action(ActionType::View));
    }

    #[test]
    fn current_user_marker_and_root_subpaths_are_normalized() {
        let snapshot = snapshot(
            vec![],
            vec![role_document("logged_in", &["own_profile", "everything"])],
            vec![
                permission_document(
                    "own_profile",
                    json!({"management": ["users/__current_user__"]}),
                    &["user"],
                    &["view", "update"],
                    &[],
                ),
                permission_document(
                    "everything",
                    json!({"__all_spaces__": ["", "//"]}),
                    &["content"],
                    &["query"],
                    &[],
                ),
            ],
        );
        let user: User = decode(user_document("alice", &[], &[]));

        let resolved = resolve_user_permissions(&snapshot, &user, Some("logged_in"));
        assert!(resolved.contains_key(&PermissionKey::new(
            "management",
            "users/alice",
            ResourceType::User
        )));
        assert!(resolved.contains_key(&PermissionKey::new(ALL_SPACES, "/", ResourceType::Content)));
        assert_eq!(resolved.len(), 2);
    }

    #[test]
    fn missing_default_role_resolves_nothing() {
        let snapshot = snapshot(vec![], vec![], vec![]);
        let user: User = decode(user_document("alice", &[], &[]));

        assert!(resolve_user_permissions(&snapshot, &user, Some("logged_in")).is_empty());
    }
}
