use std::fmt::{Display, Formatter};
use std::str::FromStr;

use dmart_core::AppError;
use serde::{Deserialize, Serialize};

/// Resource types stored under a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Platform user.
    User,
    /// Group of users sharing roles.
    Group,
    /// Folder holding child entries.
    Folder,
    /// JSON schema definition.
    Schema,
    /// Generic content entry.
    Content,
    /// Access-control list attachment.
    Acl,
    /// Comment attachment.
    Comment,
    /// Media attachment.
    Media,
    /// Locator attachment.
    Locator,
    /// Relationship attachment.
    Relationship,
    /// Alteration request attachment.
    Alteration,
    /// History record.
    History,
    /// Top-level space.
    Space,
    /// Branch of a space.
    Branch,
    /// Permission definition.
    Permission,
    /// Role definition.
    Role,
    /// Workflow ticket.
    Ticket,
    /// Raw JSON attachment.
    Json,
    /// Entry lock.
    Lock,
    /// Plugin wrapper.
    PluginWrapper,
    /// Notification.
    Notification,
}

impl ResourceType {
    /// Returns a stable storage value for this resource type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Folder => "folder",
            Self::Schema => "schema",
            Self::Content => "content",
            Self::Acl => "acl",
            Self::Comment => "comment",
            Self::Media => "media",
            Self::Locator => "locator",
            Self::Relationship => "relationship",
            Self::Alteration => "alteration",
            Self::History => "history",
            Self::Space => "space",
            Self::Branch => "branch",
            Self::Permission => "permission",
            Self::Role => "role",
            Self::Ticket => "ticket",
            Self::Json => "json",
            Self::Lock => "lock",
            Self::PluginWrapper => "plugin_wrapper",
            Self::Notification => "notification",
        }
    }

    /// Returns all known resource types.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[ResourceType] = &[
            ResourceType::User,
            ResourceType::Group,
            ResourceType::Folder,
            ResourceType::Schema,
            ResourceType::Content,
            ResourceType::Acl,
            ResourceType::Comment,
            ResourceType::Media,
            ResourceType::Locator,
            ResourceType::Relationship,
            ResourceType::Alteration,
            ResourceType::History,
            ResourceType::Space,
            ResourceType::Branch,
            ResourceType::Permission,
            ResourceType::Role,
            ResourceType::Ticket,
            ResourceType::Json,
            ResourceType::Lock,
            ResourceType::PluginWrapper,
            ResourceType::Notification,
        ];

        ALL
    }

    /// Returns the management-space subpath holding entries of this type,
    /// for the types that live there.
    #[must_use]
    pub fn management_subpath(&self) -> Option<&'static str> {
        match self {
            Self::User => Some("users"),
            Self::Group => Some("groups"),
            Self::Role => Some("roles"),
            Self::Permission => Some("permissions"),
            _ => None,
        }
    }
}

impl Display for ResourceType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|resource_type| resource_type.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown resource type '{value}'")))
    }
}

/// Verbs a permission can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// List or search entries.
    Query,
    /// Read a single entry.
    View,
    /// Create an entry.
    Create,
    /// Update an entry.
    Update,
    /// Delete an entry.
    Delete,
    /// Attach a child resource.
    Attach,
    /// Move an entry to another subpath.
    Move,
    /// Lock an entry.
    Lock,
    /// Unlock an entry.
    Unlock,
    /// Advance a ticket through its workflow.
    ProgressTicket,
    /// Assign a ticket.
    Assign,
}

impl ActionType {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::View => "view",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Attach => "attach",
            Self::Move => "move",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::ProgressTicket => "progress_ticket",
            Self::Assign => "assign",
        }
    }

    /// Returns all known actions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[ActionType] = &[
            ActionType::Query,
            ActionType::View,
            ActionType::Create,
            ActionType::Update,
            ActionType::Delete,
            ActionType::Attach,
            ActionType::Move,
            ActionType::Lock,
            ActionType::Unlock,
            ActionType::ProgressTicket,
            ActionType::Assign,
        ];

        ALL
    }

    /// Whether permission conditions are skipped for this action.
    ///
    /// Creates are validated against the payload and queries are narrowed by
    /// query policies, so neither is held to the resource's conditions.
    #[must_use]
    pub fn skips_conditions(&self) -> bool {
        matches!(self, Self::Create | Self::Query)
    }

    /// Whether field restrictions apply to this action's payload.
    #[must_use]
    pub fn checks_field_restrictions(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl Display for ActionType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown action type '{value}'")))
    }
}

/// Predicates a resource must satisfy for a conditional permission to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    /// The resource is active.
    IsActive,
    /// The resource is owned by the user or one of the user's groups.
    Own,
}

impl ConditionType {
    /// Returns a stable storage value for this condition.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsActive => "is_active",
            Self::Own => "own",
        }
    }
}

impl Display for ConditionType {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ConditionType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "is_active" => Ok(Self::IsActive),
            "own" => Ok(Self::Own),
            _ => Err(AppError::Validation(format!(
                "unknown condition type '{value}'"
            ))),
        }
    }
}
