use std::collections::HashSet;

use dmart_core::AppResult;
use dmart_domain::{
    ALL_SUBPATHS, ActionType, ActiveState, ConditionType, OwnerScope, PermissionKey, PolicyToken,
    ROOT_SUBPATH, ResolvedPermission, normalize_subpath,
};

use crate::QueryPolicyFormat;

use super::AccessControlService;

impl AccessControlService {
    /// Projects a user's query permissions onto the filter tokens a search
    /// backend ORs against the stored `query_policies` of each entry.
    ///
    /// Only grants allowing `query` and scoped to the requested space (or
    /// every space) contribute. Unless the whole space is queried, a grant
    /// must also sit on the queried subpath, an ancestor or a descendant;
    /// for wildcard subpaths the segments before the marker are compared.
    pub async fn get_user_query_policies(
        &self,
        user_shortname: &str,
        space_name: &str,
        subpath: &str,
        is_space: bool,
    ) -> AppResult<Vec<String>> {
        let principal = self.load_principal(user_shortname).await?;
        let subpath = if is_space {
            ROOT_SUBPATH.to_owned()
        } else {
            normalize_subpath(subpath)
        };

        let mut owners: Vec<String> = principal
            .groups()
            .iter()
            .map(|group| group.as_str().to_owned())
            .collect();
        owners.push(user_shortname.to_owned());

        let mut policies = Vec::new();
        for (key, grant) in &principal.permissions {
            if !grant.allows_action(ActionType::Query) {
                continue;
            }
            if !key.is_all_spaces() && key.space() != space_name {
                continue;
            }
            if !is_space && !applies_to_subpath(key, subpath.as_str()) {
                continue;
            }

            let key = key.concretize(space_name, subpath.as_str());
            if key.has_nested_subpath_wildcard() {
                policies.extend(nested_wildcard_filter(&key, grant));
            } else {
                policies.extend(self.policy_filters(&key, grant, &owners));
            }
        }

        let mut seen = HashSet::new();
        policies.retain(|policy| seen.insert(policy.clone()));
        Ok(policies)
    }

    fn policy_filters(
        &self,
        key: &PermissionKey,
        grant: &ResolvedPermission,
        owners: &[String],
    ) -> Vec<String> {
        let token = |active: ActiveState, owner: &str| {
            PolicyToken::new(key.clone(), active, OwnerScope::Subject(owner.to_owned())).to_string()
        };
        let is_active = grant.conditions.contains(&ConditionType::IsActive);
        let own = grant.conditions.contains(&ConditionType::Own);

        match (is_active, own) {
            (true, true) => owners
                .iter()
                .map(|owner| token(ActiveState::Active, owner))
                .collect(),
            (true, false) => {
                vec![PolicyToken::new(key.clone(), ActiveState::Active, OwnerScope::Any).to_string()]
            }
            (false, true) => owners
                .iter()
                .flat_map(|owner| {
                    let active = token(ActiveState::Active, owner);
                    let inactive = token(ActiveState::Inactive, owner);
                    match self.settings.query_policy_format {
                        QueryPolicyFormat::Separate => vec![active, inactive],
                        QueryPolicyFormat::Alternation => vec![format!("{active}|{inactive}")],
                    }
                })
                .collect(),
            (false, false) => vec![PolicyToken::unrestricted(key.clone()).to_string()],
        }
    }
}

/// Filter for a grant on a nested wildcard subpath such as
/// `blog/__all_subpaths__`.
///
/// Entries carry a single ownerless token under that subpath, so a grant
/// that requires ownership cannot be expressed as a filter and yields none.
fn nested_wildcard_filter(key: &PermissionKey, grant: &ResolvedPermission) -> Option<String> {
    if grant.conditions.contains(&ConditionType::Own) {
        return None;
    }

    let token = if grant.conditions.contains(&ConditionType::IsActive) {
        PolicyToken::new(key.clone(), ActiveState::Active, OwnerScope::Unscoped)
    } else {
        PolicyToken::unrestricted(key.clone())
    };
    Some(token.to_string())
}

fn applies_to_subpath(key: &PermissionKey, subpath: &str) -> bool {
    if !key.has_subpath_wildcard() {
        return subpaths_overlap(key.subpath(), subpath);
    }

    let fixed = key
        .subpath()
        .split(ALL_SUBPATHS)
        .next()
        .unwrap_or_default();
    subpaths_overlap(normalize_subpath(fixed).as_str(), subpath)
}

/// Whether one subpath is the other, or an ancestor of it.
fn subpaths_overlap(left: &str, right: &str) -> bool {
    is_ancestor_or_self(left, right) || is_ancestor_or_self(right, left)
}

fn is_ancestor_or_self(ancestor: &str, subpath: &str) -> bool {
    ancestor == ROOT_SUBPATH
        || ancestor == subpath
        || subpath
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}
