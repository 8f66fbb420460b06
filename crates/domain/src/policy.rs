//! Permission keys, query-policy tokens and the subpath walk shared by the
//! token generator and the access-check engine.
//!
//! Both keys and tokens are colon-delimited strings on the wire:
//!
//! ```text
//! permission key:  {space}:{subpath}:{resource_type}
//! policy token:    {space}:{subpath}:{resource_type}:{active}[:{owner}]
//! ```
//!
//! The root subpath is spelled `/`; every other subpath carries no leading
//! or trailing slash.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use dmart_core::AppError;
use serde::{Deserialize, Serialize};

use crate::ResourceType;

/// Space marker matching every space.
pub const ALL_SPACES: &str = "__all_spaces__";

/// Subpath marker matching every subpath at its depth.
pub const ALL_SUBPATHS: &str = "__all_subpaths__";

/// Subpath marker replaced by the requesting user's shortname.
pub const CURRENT_USER: &str = "__current_user__";

/// Spelling of the root subpath in keys and tokens.
pub const ROOT_SUBPATH: &str = "/";

const WILDCARD: &str = "*";

/// Normalizes a request subpath: surrounding slashes are stripped and an
/// empty path becomes the root.
#[must_use]
pub fn normalize_subpath(subpath: &str) -> String {
    let trimmed = subpath.trim_matches('/');
    if trimmed.is_empty() {
        ROOT_SUBPATH.to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Resolves the magic words in a permission's subpath for one user.
#[must_use]
pub fn resolve_permission_subpath(subpath: &str, user_shortname: &str) -> String {
    let substituted = subpath
        .replace(CURRENT_USER, user_shortname)
        .replace("//", "/");
    normalize_subpath(substituted.as_str())
}

/// Returns every subpath prefix from the root down to `subpath`.
///
/// `blog/drafts` yields `["/", "blog", "blog/drafts"]`. A folder's children
/// live under the folder's own path, so for folders the entry shortname is
/// appended as a final segment.
#[must_use]
pub fn subpath_prefixes(
    subpath: &str,
    resource_type: ResourceType,
    entry_shortname: Option<&str>,
) -> Vec<String> {
    let mut segments: Vec<&str> = subpath.split('/').filter(|part| !part.is_empty()).collect();
    if resource_type == ResourceType::Folder
        && let Some(shortname) = entry_shortname
    {
        segments.push(shortname);
    }

    let mut prefixes = Vec::with_capacity(segments.len() + 1);
    prefixes.push(ROOT_SUBPATH.to_owned());
    for depth in 1..=segments.len() {
        prefixes.push(segments[..depth].join("/"));
    }

    prefixes
}

/// Returns the wildcard variant of a prefix with two or more segments: the
/// second segment is replaced by [`ALL_SUBPATHS`] and the rest kept.
///
/// `a/b/c` becomes `a/__all_subpaths__/c`.
#[must_use]
pub fn wildcard_subpath(prefix: &str) -> Option<String> {
    let segments: Vec<&str> = prefix.split('/').filter(|part| !part.is_empty()).collect();
    if segments.len() < 2 {
        return None;
    }

    let mut wildcard = vec![segments[0], ALL_SUBPATHS];
    wildcard.extend_from_slice(&segments[2..]);
    Some(wildcard.join("/"))
}

/// Returns the subpath consulted for "all subpaths" grants at a prefix.
///
/// The root and single-segment prefixes map to the bare marker; deeper
/// prefixes use [`wildcard_subpath`].
#[must_use]
pub fn global_access_subpath(prefix: &str) -> String {
    wildcard_subpath(prefix).unwrap_or_else(|| ALL_SUBPATHS.to_owned())
}

/// Lookup key into a user's resolved permissions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionKey {
    space: String,
    subpath: String,
    resource_type: ResourceType,
}

impl PermissionKey {
    /// Creates a permission key.
    #[must_use]
    pub fn new(
        space: impl Into<String>,
        subpath: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            space: space.into(),
            subpath: subpath.into(),
            resource_type,
        }
    }

    /// Returns the space scope, possibly [`ALL_SPACES`].
    #[must_use]
    pub fn space(&self) -> &str {
        self.space.as_str()
    }

    /// Returns the subpath scope, possibly containing [`ALL_SUBPATHS`].
    #[must_use]
    pub fn subpath(&self) -> &str {
        self.subpath.as_str()
    }

    /// Returns the resource type scope.
    #[must_use]
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Returns whether the key applies to every space.
    #[must_use]
    pub fn is_all_spaces(&self) -> bool {
        self.space == ALL_SPACES
    }

    /// Returns whether the subpath contains the all-subpaths marker.
    #[must_use]
    pub fn has_subpath_wildcard(&self) -> bool {
        self.subpath.contains(ALL_SUBPATHS)
    }

    /// Returns whether the all-subpaths marker sits below a concrete
    /// segment, as in `blog/__all_subpaths__`.
    #[must_use]
    pub fn has_nested_subpath_wildcard(&self) -> bool {
        self.has_subpath_wildcard() && self.subpath != ALL_SUBPATHS
    }

    /// Replaces the wildcard markers with a concrete space and subpath.
    ///
    /// Only a bare [`ALL_SUBPATHS`] subpath is replaced. A nested wildcard
    /// is kept as is, since entries carry tokens under that exact wildcard
    /// subpath.
    #[must_use]
    pub fn concretize(&self, space: &str, subpath: &str) -> Self {
        let space = if self.is_all_spaces() {
            space.to_owned()
        } else {
            self.space.clone()
        };
        let subpath = if self.subpath == ALL_SUBPATHS {
            normalize_subpath(subpath)
        } else {
            self.subpath.clone()
        };

        Self {
            space,
            subpath,
            resource_type: self.resource_type,
        }
    }
}

impl Display for PermissionKey {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}:{}:{}",
            self.space, self.subpath, self.resource_type
        )
    }
}

impl FromStr for PermissionKey {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split(':').collect();
        let [space, subpath, resource_type] = parts.as_slice() else {
            return Err(AppError::Validation(format!(
                "permission key '{value}' must have the form space:subpath:resource_type"
            )));
        };

        Ok(Self::new(*space, *subpath, ResourceType::from_str(resource_type)?))
    }
}

impl TryFrom<String> for PermissionKey {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<PermissionKey> for String {
    fn from(value: PermissionKey) -> Self {
        value.to_string()
    }
}

/// Activity segment of a policy token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActiveState {
    /// `true`
    Active,
    /// `false`
    Inactive,
    /// `*`: any state and any owner.
    Any,
}

impl ActiveState {
    /// Maps an entry's activity flag.
    #[must_use]
    pub fn from_flag(is_active: bool) -> Self {
        if is_active { Self::Active } else { Self::Inactive }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "true",
            Self::Inactive => "false",
            Self::Any => WILDCARD,
        }
    }
}

/// Owner segment of a policy token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerScope {
    /// No owner segment: the token is open to anyone.
    Unscoped,
    /// `*`: any owner.
    Any,
    /// A concrete owner or owner-group shortname.
    Subject(String),
}

/// Structured query-policy token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyToken {
    key: PermissionKey,
    active: ActiveState,
    owner: OwnerScope,
}

impl PolicyToken {
    /// Creates a token from its parts.
    #[must_use]
    pub fn new(key: PermissionKey, active: ActiveState, owner: OwnerScope) -> Self {
        Self { key, active, owner }
    }

    /// Token open to every state and owner under a key: `{key}:*`.
    #[must_use]
    pub fn unrestricted(key: PermissionKey) -> Self {
        Self::new(key, ActiveState::Any, OwnerScope::Unscoped)
    }

    /// Returns whether this token, used as a query filter, admits an entry
    /// carrying `stored`.
    ///
    /// Exact tokens match exactly; `*` in the active segment admits every
    /// token under the key, `*` in the owner segment admits every owner.
    #[must_use]
    pub fn admits(&self, stored: &PolicyToken) -> bool {
        if self.key != stored.key {
            return false;
        }

        if self.active == ActiveState::Any {
            return true;
        }

        if self.active != stored.active {
            return false;
        }

        match (&self.owner, &stored.owner) {
            (OwnerScope::Any, OwnerScope::Subject(_)) => true,
            (OwnerScope::Subject(left), OwnerScope::Subject(right)) => left == right,
            (OwnerScope::Unscoped, OwnerScope::Unscoped) => true,
            _ => false,
        }
    }
}

impl Display for PolicyToken {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}:{}", self.key, self.active.as_str())?;
        match &self.owner {
            OwnerScope::Unscoped => Ok(()),
            OwnerScope::Any => write!(formatter, ":{WILDCARD}"),
            OwnerScope::Subject(owner) => write!(formatter, ":{owner}"),
        }
    }
}

impl FromStr for PolicyToken {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split(':').collect();
        let (key_parts, active, owner) = match parts.as_slice() {
            [space, subpath, resource_type, active] => {
                ([*space, *subpath, *resource_type], *active, None)
            }
            [space, subpath, resource_type, active, owner] => {
                ([*space, *subpath, *resource_type], *active, Some(*owner))
            }
            _ => {
                return Err(AppError::Validation(format!(
                    "query policy '{value}' must have four or five segments"
                )));
            }
        };

        let active = match active {
            "true" => ActiveState::Active,
            "false" => ActiveState::Inactive,
            WILDCARD => ActiveState::Any,
            other => {
                return Err(AppError::Validation(format!(
                    "query policy '{value}' has invalid state '{other}'"
                )));
            }
        };
        let owner = match owner {
            None => OwnerScope::Unscoped,
            Some(WILDCARD) => OwnerScope::Any,
            Some(owner) => OwnerScope::Subject(owner.to_owned()),
        };
        let [space, subpath, resource_type] = key_parts;

        Ok(Self::new(
            PermissionKey::new(space, subpath, ResourceType::from_str(resource_type)?),
            active,
            owner,
        ))
    }
}

/// Builds the query-policy tokens persisted with an entry.
///
/// For each subpath prefix the entry is stamped with an owner token, an
/// owner-group token (or an open token when the entry has no group), and,
/// from depth two on, a token under the wildcard subpath.
#[must_use]
pub fn generate_query_policies(
    space_name: &str,
    subpath: &str,
    resource_type: ResourceType,
    is_active: bool,
    owner_shortname: &str,
    owner_group_shortname: Option<&str>,
    entry_shortname: Option<&str>,
) -> Vec<String> {
    query_policy_tokens(
        space_name,
        subpath,
        resource_type,
        is_active,
        owner_shortname,
        owner_group_shortname,
        entry_shortname,
    )
    .iter()
    .map(PolicyToken::to_string)
    .collect()
}

/// Structured form of [`generate_query_policies`].
#[must_use]
pub fn query_policy_tokens(
    space_name: &str,
    subpath: &str,
    resource_type: ResourceType,
    is_active: bool,
    owner_shortname: &str,
    owner_group_shortname: Option<&str>,
    entry_shortname: Option<&str>,
) -> Vec<PolicyToken> {
    let active = ActiveState::from_flag(is_active);
    let mut tokens = Vec::new();

    for prefix in subpath_prefixes(subpath, resource_type, entry_shortname) {
        let key = PermissionKey::new(space_name, prefix.as_str(), resource_type);
        tokens.push(PolicyToken::new(
            key.clone(),
            active,
            OwnerScope::Subject(owner_shortname.to_owned()),
        ));
        tokens.push(PolicyToken::new(
            key,
            active,
            owner_group_shortname
                .map(|group| OwnerScope::Subject(group.to_owned()))
                .unwrap_or(OwnerScope::Unscoped),
        ));

        if let Some(wildcard) = wildcard_subpath(prefix.as_str()) {
            tokens.push(PolicyToken::new(
                PermissionKey::new(space_name, wildcard, resource_type),
                active,
                OwnerScope::Unscoped,
            ));
        }
    }

    tokens
}

/// Evaluates query-policy filters against an entry's stored tokens.
///
/// A filter may be an `a|b` alternation. The entry matches when any filter
/// alternative admits any stored token. Malformed strings never match.
#[must_use]
pub fn query_policies_match(filters: &[String], stored: &[String]) -> bool {
    let stored_tokens: Vec<PolicyToken> = stored
        .iter()
        .filter_map(|token| PolicyToken::from_str(token).ok())
        .collect();

    filters
        .iter()
        .flat_map(|filter| filter.split('|'))
        .filter_map(|alternative| PolicyToken::from_str(alternative).ok())
        .any(|filter| stored_tokens.iter().any(|token| filter.admits(token)))
}
