use std::str::FromStr;

use dmart_core::AppError;

/// Shape of the `own`-only query-policy filters handed to search backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryPolicyFormat {
    /// Active and inactive variants are emitted as two filters.
    #[default]
    Separate,
    /// Both variants are joined as one `a|b` alternation filter.
    Alternation,
}

impl FromStr for QueryPolicyFormat {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "separate" => Ok(Self::Separate),
            "alternation" => Ok(Self::Alternation),
            other => Err(AppError::Validation(format!(
                "query policy format must be either 'separate' or 'alternation', got '{other}'"
            ))),
        }
    }
}

/// Runtime settings of the access-control subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControlSettings {
    /// Space holding users, groups, roles and permissions.
    pub management_space: String,
    /// Role implicitly held by every known user.
    pub default_role: Option<String>,
    /// Emits a diagnostic for every failed sub-check.
    pub debug_denials: bool,
    /// Lifetime of cached per-user permissions; zero disables the cache.
    pub user_permissions_ttl_seconds: u32,
    /// Output shape of `own`-only query policies.
    pub query_policy_format: QueryPolicyFormat,
}

impl Default for AccessControlSettings {
    fn default() -> Self {
        Self {
            management_space: "management".to_owned(),
            default_role: Some("logged_in".to_owned()),
            debug_denials: false,
            user_permissions_ttl_seconds: 300,
            query_policy_format: QueryPolicyFormat::Separate,
        }
    }
}
