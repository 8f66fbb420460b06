use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ActionType, AllowedValues, ConditionType, Permission, PermissionKey, flatten_attributes};

/// A user's effective permissions, keyed by scope.
pub type UserPermissions = BTreeMap<PermissionKey, ResolvedPermission>;

/// Merged grant for one permission key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPermission {
    /// Union of the actions granted under the key.
    pub allowed_actions: BTreeSet<ActionType>,
    /// Conditions the target resource must satisfy.
    pub conditions: BTreeSet<ConditionType>,
    /// Attribute paths a write payload may not touch.
    pub restricted_fields: Vec<String>,
    /// Attribute path to the values a write payload may carry.
    pub allowed_fields_values: BTreeMap<String, AllowedValues>,
}

/// Sub-check of an access decision, reported in denial diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessCheck {
    /// The action is not among the allowed actions.
    Action,
    /// The resource does not satisfy the required conditions.
    Condition,
    /// The write payload touches a restricted or constrained field.
    Restriction,
}

impl AccessCheck {
    /// Returns a stable label for diagnostics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Condition => "condition",
            Self::Restriction => "restriction",
        }
    }
}

impl ResolvedPermission {
    /// Folds one permission into the grant.
    ///
    /// Actions are unioned. Conditions are unioned as well, so the stricter
    /// requirement wins when two permissions overlap on a key. Restricted
    /// fields are concatenated and allowed values merged per field.
    pub fn absorb(&mut self, permission: &Permission) {
        self.allowed_actions.extend(permission.actions.iter().copied());
        self.conditions.extend(permission.conditions.iter().copied());

        for field in &permission.restricted_fields {
            if !self.restricted_fields.contains(field) {
                self.restricted_fields.push(field.clone());
            }
        }

        for (field, values) in &permission.allowed_fields_values {
            self.allowed_fields_values
                .entry(field.clone())
                .and_modify(|current| current.merge(values))
                .or_insert_with(|| values.clone());
        }
    }

    /// Returns whether the grant allows `action`.
    #[must_use]
    pub fn allows_action(&self, action: ActionType) -> bool {
        self.allowed_actions.contains(&action)
    }

    /// Returns whether the required conditions are met by the resource.
    ///
    /// Always true for creates and queries.
    #[must_use]
    pub fn conditions_met(
        &self,
        action: ActionType,
        achieved_conditions: &BTreeSet<ConditionType>,
    ) -> bool {
        action.skips_conditions() || self.conditions.is_subset(achieved_conditions)
    }

    /// Returns whether a create or update payload respects the field
    /// restrictions. Always true for other actions.
    #[must_use]
    pub fn restrictions_met(&self, action: ActionType, record_attributes: &Map<String, Value>) -> bool {
        if !action.checks_field_restrictions() {
            return true;
        }

        let flattened = flatten_attributes(record_attributes);

        let touches_restricted = self.restricted_fields.iter().any(|restricted| {
            flattened
                .keys()
                .any(|path| is_same_or_descendant(path.as_str(), restricted.as_str()))
        });
        if touches_restricted {
            return false;
        }

        self.allowed_fields_values
            .iter()
            .all(|(field, allowed)| match flattened.get(field) {
                Some(value) => allowed.permits(value),
                None => true,
            })
    }

    /// Runs all sub-checks in order and reports the first failure.
    pub fn evaluate(
        &self,
        action: ActionType,
        achieved_conditions: &BTreeSet<ConditionType>,
        record_attributes: &Map<String, Value>,
    ) -> Result<(), AccessCheck> {
        if !self.allows_action(action) {
            return Err(AccessCheck::Action);
        }
        if !self.conditions_met(action, achieved_conditions) {
            return Err(AccessCheck::Condition);
        }
        if !self.restrictions_met(action, record_attributes) {
            return Err(AccessCheck::Restriction);
        }

        Ok(())
    }
}

fn is_same_or_descendant(path: &str, restricted: &str) -> bool {
    path == restricted
        || path
            .strip_prefix(restricted)
            .is_some_and(|rest| rest.starts_with('.'))
}
