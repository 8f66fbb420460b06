use dmart_domain::{ActionType, ResourceType};
use serde_json::{Map, Value};

/// One authorization question: may a user perform an action on a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessRequest {
    /// Authenticated principal.
    pub user_shortname: String,
    /// Space holding the resource.
    pub space_name: String,
    /// Subpath holding the resource.
    pub subpath: String,
    /// Type of the resource.
    pub resource_type: ResourceType,
    /// Requested action.
    pub action_type: ActionType,
    /// Whether the resource is active.
    pub resource_is_active: bool,
    /// Owner of the resource.
    pub resource_owner_shortname: Option<String>,
    /// Owning group of the resource.
    pub resource_owner_group: Option<String>,
    /// Attributes of a create or update payload.
    pub record_attributes: Map<String, Value>,
    /// Shortname of the target entry, when a single entry is addressed.
    pub entry_shortname: Option<String>,
}

impl AccessRequest {
    /// Creates a request for an inactive, unowned resource with no payload.
    #[must_use]
    pub fn new(
        user_shortname: impl Into<String>,
        space_name: impl Into<String>,
        subpath: impl Into<String>,
        resource_type: ResourceType,
        action_type: ActionType,
    ) -> Self {
        Self {
            user_shortname: user_shortname.into(),
            space_name: space_name.into(),
            subpath: subpath.into(),
            resource_type,
            action_type,
            resource_is_active: false,
            resource_owner_shortname: None,
            resource_owner_group: None,
            record_attributes: Map::new(),
            entry_shortname: None,
        }
    }

    /// Sets whether the resource is active.
    #[must_use]
    pub fn active(mut self, is_active: bool) -> Self {
        self.resource_is_active = is_active;
        self
    }

    /// Sets the resource owner.
    #[must_use]
    pub fn owned_by(mut self, owner_shortname: impl Into<String>) -> Self {
        self.resource_owner_shortname = Some(owner_shortname.into());
        self
    }

    /// Sets the resource owner group.
    #[must_use]
    pub fn owner_group(mut self, group_shortname: impl Into<String>) -> Self {
        self.resource_owner_group = Some(group_shortname.into());
        self
    }

    /// Sets the payload attributes of a create or update.
    #[must_use]
    pub fn with_attributes(mut self, record_attributes: Map<String, Value>) -> Self {
        self.record_attributes = record_attributes;
        self
    }

    /// Addresses a single entry, enabling its ACL.
    #[must_use]
    pub fn for_entry(mut self, entry_shortname: impl Into<String>) -> Self {
        self.entry_shortname = Some(entry_shortname.into());
        self
    }
}
