use std::collections::{BTreeMap, BTreeSet};

use dmart_core::Shortname;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{ActionType, ConditionType, ResourceType, generate_query_policies};

/// Grantable capability bundle stored under `management/permissions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    /// Unique permission name.
    pub shortname: Shortname,
    /// Whether the permission participates in authorization.
    #[serde(default)]
    pub is_active: bool,
    /// Space name to the subpaths the permission applies to.
    pub subpaths: BTreeMap<String, Vec<String>>,
    /// Resource types covered by the permission.
    pub resource_types: BTreeSet<ResourceType>,
    /// Granted verbs.
    pub actions: BTreeSet<ActionType>,
    /// Conditions the target resource must satisfy.
    #[serde(default)]
    pub conditions: BTreeSet<ConditionType>,
    /// Attribute paths whose presence in a write payload forces denial.
    #[serde(default)]
    pub restricted_fields: Vec<String>,
    /// Attribute path to the values a write payload may carry.
    #[serde(default)]
    pub allowed_fields_values: BTreeMap<String, AllowedValues>,
}

/// Values permitted for one attribute path in a write payload.
///
/// Stored either as a flat list (scalar attributes) or as a list of lists
/// (list attributes, where one of the inner lists must cover the payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedValues {
    /// Permitted value sets for list attributes.
    Lists(Vec<Vec<Value>>),
    /// Permitted values for scalar attributes.
    Scalars(Vec<Value>),
}

impl AllowedValues {
    /// Returns whether an attribute value is permitted.
    #[must_use]
    pub fn permits(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Lists(allowed_lists), Value::Array(items)) => allowed_lists
                .iter()
                .any(|allowed| items.iter().all(|item| allowed.contains(item))),
            (Self::Scalars(allowed), Value::Array(items)) => {
                items.iter().all(|item| allowed.contains(item))
            }
            (Self::Scalars(allowed), scalar) => allowed.contains(scalar),
            (Self::Lists(_), _) => false,
        }
    }

    /// Unions another value spec of the same shape into this one.
    ///
    /// Specs of different shapes are not comparable; the existing one is kept.
    pub fn merge(&mut self, other: &Self) {
        match (self, other) {
            (Self::Lists(current), Self::Lists(incoming)) => {
                for list in incoming {
                    if !current.contains(list) {
                        current.push(list.clone());
                    }
                }
            }
            (Self::Scalars(current), Self::Scalars(incoming)) => {
                for value in incoming {
                    if !current.contains(value) {
                        current.push(value.clone());
                    }
                }
            }
            _ => {}
        }
    }
}

/// Named bundle of permission shortnames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role name.
    pub shortname: Shortname,
    /// Whether the role participates in authorization.
    #[serde(default)]
    pub is_active: bool,
    /// Permission shortnames granted by the role.
    #[serde(default)]
    pub permissions: Vec<Shortname>,
}

/// Named collection of roles. Membership is recorded on the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique group name.
    pub shortname: Shortname,
    /// Whether the group participates in authorization.
    #[serde(default)]
    pub is_active: bool,
    /// Roles every member of the group holds.
    #[serde(default)]
    pub roles: Vec<Shortname>,
}

/// The fields of a user record read by access control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique user name.
    pub shortname: Shortname,
    /// Whether the account is active.
    #[serde(default)]
    pub is_active: bool,
    /// Directly assigned roles.
    #[serde(default)]
    pub roles: Vec<Shortname>,
    /// Groups the user belongs to.
    #[serde(default)]
    pub groups: Vec<Shortname>,
}

impl User {
    /// Returns whether the user belongs to the named group.
    #[must_use]
    pub fn is_member_of(&self, group: &str) -> bool {
        self.groups.iter().any(|value| value.as_str() == group)
    }
}

/// Per-entry grant for one user, bypassing the permission hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclEntry {
    /// Grantee.
    pub user_shortname: Shortname,
    /// Actions granted on the entry.
    #[serde(default)]
    pub allowed_actions: BTreeSet<ActionType>,
}

/// Entry metadata fields read by access control and the indexing write path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Stable entry identifier.
    #[serde(default)]
    pub uuid: Option<Uuid>,
    /// Entry name, unique within its subpath.
    pub shortname: Shortname,
    /// Type tag of the entry.
    pub resource_type: ResourceType,
    /// Whether the entry is active.
    #[serde(default)]
    pub is_active: bool,
    /// Owning user.
    pub owner_shortname: Shortname,
    /// Owning group, if any.
    #[serde(default)]
    pub owner_group_shortname: Option<Shortname>,
    /// Explicit per-user grants.
    #[serde(default)]
    pub acl: Vec<AclEntry>,
}

impl EntryMeta {
    /// Returns whether the entry's ACL grants `action` to `user_shortname`.
    #[must_use]
    pub fn acl_grants(&self, user_shortname: &str, action: ActionType) -> bool {
        self.acl.iter().any(|entry| {
            entry.user_shortname.as_str() == user_shortname
                && entry.allowed_actions.contains(&action)
        })
    }

    /// Computes the query-policy tokens stored with this entry.
    #[must_use]
    pub fn query_policies(&self, space_name: &str, subpath: &str) -> Vec<String> {
        generate_query_policies(
            space_name,
            subpath,
            self.resource_type,
            self.is_active,
            self.owner_shortname.as_str(),
            self.owner_group_shortname.as_ref().map(Shortname::as_str),
            Some(self.shortname.as_str()),
        )
    }
}
