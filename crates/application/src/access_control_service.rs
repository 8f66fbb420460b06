use std::sync::Arc;

use dmart_core::{AppResult, Shortname};
use dmart_domain::{ResourceType, User, UserPermissions};

use crate::permission_resolver::resolve_user_permissions;
use crate::{
    AccessControlSettings, EntryLocator, EntryRepository, PermissionStore, UserPermissionCache,
};

mod decision;
mod query_policies;

const USERS_SUBPATH: &str = "users";

/// Application service answering authorization questions against the
/// current permission snapshot.
#[derive(Clone)]
pub struct AccessControlService {
    store: Arc<PermissionStore>,
    entries: Arc<dyn EntryRepository>,
    cache: Arc<dyn UserPermissionCache>,
    settings: AccessControlSettings,
}

/// A user record together with its resolved permissions.
struct Principal {
    user: Option<User>,
    permissions: UserPermissions,
}

impl Principal {
    fn groups(&self) -> &[Shortname] {
        self.user
            .as_ref()
            .map(|user| user.groups.as_slice())
            .unwrap_or_default()
    }
}

impl AccessControlService {
    /// Creates a new access-control service.
    #[must_use]
    pub fn new(
        store: Arc<PermissionStore>,
        entries: Arc<dyn EntryRepository>,
        cache: Arc<dyn UserPermissionCache>,
        settings: AccessControlSettings,
    ) -> Self {
        Self {
            store,
            entries,
            cache,
            settings,
        }
    }

    /// Returns the service settings.
    #[must_use]
    pub fn settings(&self) -> &AccessControlSettings {
        &self.settings
    }

    /// Resolves a user's effective permissions.
    ///
    /// Unknown users resolve to an empty map. Results are cached per snapshot
    /// revision, so a reload never serves permissions computed from an older
    /// snapshot.
    pub async fn get_user_permissions(&self, user_shortname: &str) -> AppResult<UserPermissions> {
        Ok(self.load_principal(user_shortname).await?.permissions)
    }

    async fn load_principal(&self, user_shortname: &str) -> AppResult<Principal> {
        let snapshot = self.store.current().await;
        let locator = EntryLocator::new(
            self.settings.management_space.as_str(),
            USERS_SUBPATH,
            user_shortname,
            ResourceType::User,
        );

        let Some(user) = self.entries.find_user(&locator).await? else {
            return Ok(Principal {
                user: None,
                permissions: UserPermissions::new(),
            });
        };

        let ttl_seconds = self.settings.user_permissions_ttl_seconds;
        if ttl_seconds > 0
            && let Some(permissions) = self
                .cache
                .get(snapshot.revision(), user_shortname)
                .await?
        {
            return Ok(Principal {
                user: Some(user),
                permissions,
            });
        }

        let permissions =
            resolve_user_permissions(&snapshot, &user, self.settings.default_role.as_deref());
        if ttl_seconds > 0 {
            self.cache
                .put(
                    snapshot.revision(),
                    user_shortname,
                    &permissions,
                    ttl_seconds,
                )
                .await?;
        }

        Ok(Principal {
            user: Some(user),
            permissions,
        })
    }
}
