use std::collections::BTreeSet;

use dmart_core::{AppError, AppResult};
use dmart_domain::{
    ALL_SPACES, ConditionType, PermissionKey, ROOT_SUBPATH, ResolvedPermission, ResourceType,
    User, UserPermissions, global_access_subpath, normalize_subpath, subpath_prefixes,
};
use tracing::debug;

use crate::{AccessRequest, EntryLocator};

use super::AccessControlService;

impl AccessControlService {
    /// Decides whether the request is allowed.
    ///
    /// An ACL grant on the addressed entry allows immediately. Otherwise the
    /// subpath is walked from the root down and the first prefix holding a
    /// passing grant allows. `Ok(false)` is a denial; errors are storage
    /// failures only.
    pub async fn check_access(&self, request: &AccessRequest) -> AppResult<bool> {
        if self.acl_grants(request).await? {
            return Ok(true);
        }

        let principal = self.load_principal(request.user_shortname.as_str()).await?;
        let achieved_conditions = achieved_conditions(request, principal.user.as_ref());
        let space_name = effective_space(request);

        for prefix in subpath_prefixes(
            request.subpath.as_str(),
            request.resource_type,
            request.entry_shortname.as_deref(),
        ) {
            if let Some((key, grant)) = global_grant(
                &principal.permissions,
                space_name,
                prefix.as_str(),
                request.resource_type,
            ) && self.grant_passes(key, grant, request, &achieved_conditions)
            {
                return Ok(true);
            }

            let key = PermissionKey::new(space_name, prefix.as_str(), request.resource_type);
            if let Some(grant) = principal.permissions.get(&key)
                && self.grant_passes(&key, grant, request, &achieved_conditions)
            {
                return Ok(true);
            }
        }

        if self.settings.debug_denials {
            debug!(
                user = %request.user_shortname,
                space = %space_name,
                subpath = %request.subpath,
                resource_type = %request.resource_type,
                action = %request.action_type,
                "access denied: no permission key allowed the request"
            );
        }

        Ok(false)
    }

    /// Like [`Self::check_access`], but reports a denial as
    /// [`AppError::Forbidden`] with a generic message.
    pub async fn require_access(&self, request: &AccessRequest) -> AppResult<()> {
        if self.check_access(request).await? {
            Ok(())
        } else {
            Err(AppError::Forbidden("not authorized".to_owned()))
        }
    }

    /// Returns whether the user holds any permission scoped to the space.
    pub async fn check_space_access(&self, user_shortname: &str, space_name: &str) -> AppResult<bool> {
        let principal = self.load_principal(user_shortname).await?;
        Ok(principal
            .permissions
            .keys()
            .any(|key| key.space() == space_name || key.is_all_spaces()))
    }

    async fn acl_grants(&self, request: &AccessRequest) -> AppResult<bool> {
        let Some(entry_shortname) = request.entry_shortname.as_deref() else {
            return Ok(false);
        };

        let subpath = if request.resource_type == ResourceType::Folder {
            ROOT_SUBPATH.to_owned()
        } else {
            normalize_subpath(request.subpath.as_str())
        };
        let locator = EntryLocator::new(
            request.space_name.as_str(),
            subpath,
            entry_shortname,
            request.resource_type,
        );

        Ok(self
            .entries
            .find_entry(&locator)
            .await?
            .is_some_and(|entry| {
                entry.acl_grants(request.user_shortname.as_str(), request.action_type)
            }))
    }

    fn grant_passes(
        &self,
        key: &PermissionKey,
        grant: &ResolvedPermission,
        request: &AccessRequest,
        achieved_conditions: &BTreeSet<ConditionType>,
    ) -> bool {
        match grant.evaluate(
            request.action_type,
            achieved_conditions,
            &request.record_attributes,
        ) {
            Ok(()) => true,
            Err(check) => {
                if self.settings.debug_denials {
                    debug!(
                        user = %request.user_shortname,
                        permission_key = %key,
                        action = %request.action_type,
                        check = check.as_str(),
                        "access sub-check failed"
                    );
                }
                false
            }
        }
    }
}

fn achieved_conditions(request: &AccessRequest, user: Option<&User>) -> BTreeSet<ConditionType> {
    let mut achieved = BTreeSet::new();
    if request.resource_is_active {
        achieved.insert(ConditionType::IsActive);
    }

    let owns = request.resource_owner_shortname.as_deref() == Some(request.user_shortname.as_str());
    let group_owns = request
        .resource_owner_group
        .as_deref()
        .is_some_and(|group| user.is_some_and(|user| user.is_member_of(group)));
    if owns || group_owns {
        achieved.insert(ConditionType::Own);
    }

    achieved
}

/// A space addressed as an entry is its own permission scope.
fn effective_space(request: &AccessRequest) -> &str {
    match request.entry_shortname.as_deref() {
        Some(shortname) if request.resource_type == ResourceType::Space => shortname,
        _ => request.space_name.as_str(),
    }
}

/// Finds the "all subpaths" / "all spaces" grant consulted at a prefix.
///
/// Candidates are looked up in a fixed order and the last one present wins.
fn global_grant<'a>(
    permissions: &'a UserPermissions,
    space_name: &str,
    prefix: &str,
    resource_type: ResourceType,
) -> Option<(&'a PermissionKey, &'a ResolvedPermission)> {
    let wildcard = global_access_subpath(prefix);
    [
        PermissionKey::new(ALL_SPACES, wildcard.as_str(), resource_type),
        PermissionKey::new(space_name, wildcard.as_str(), resource_type),
        PermissionKey::new(ALL_SPACES, prefix, resource_type),
    ]
    .iter()
    .rev()
    .find_map(|key| permissions.get_key_value(key))
}
