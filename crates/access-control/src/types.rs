//! Permission records and the request bodies that create or replace them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tio_core::ApiError;
use uuid::Uuid;

/// Capability granted by a permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    CanView,
    CanUse,
    CanEdit,
    CanScan,
    CanManage,
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::CanView => "CanView",
            Action::CanUse => "CanUse",
            Action::CanEdit => "CanEdit",
            Action::CanScan => "CanScan",
            Action::CanManage => "CanManage",
            Action::Other(other) => other,
        }
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.as_str() {
            "CanView" => Action::CanView,
            "CanUse" => Action::CanUse,
            "CanEdit" => Action::CanEdit,
            "CanScan" => Action::CanScan,
            "CanManage" => Action::CanManage,
            _ => Action::Other(value),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a permission subject (principal) or object (resource).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    User,
    UserGroup,
    AllUsers,
    Tag,
    Asset,
    AllAssets,
    Other(String),
}

impl EntityType {
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::User => "User",
            EntityType::UserGroup => "UserGroup",
            EntityType::AllUsers => "AllUsers",
            EntityType::Tag => "Tag",
            EntityType::Asset => "Asset",
            EntityType::AllAssets => "AllAssets",
            EntityType::Other(other) => other,
        }
    }
}

impl From<String> for EntityType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "User" => EntityType::User,
            "UserGroup" => EntityType::UserGroup,
            "AllUsers" => EntityType::AllUsers,
            "Tag" => EntityType::Tag,
            "Asset" => EntityType::Asset,
            "AllAssets" => EntityType::AllAssets,
            _ => EntityType::Other(value),
        }
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_string()
    }
}

/// A `{name, type, uuid}` triple naming a subject or an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl PermissionEntity {
    pub fn new(entity_type: EntityType, name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type,
            uuid: Some(uuid.into()),
        }
    }

    pub fn user(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self::new(EntityType::User, name, uuid)
    }

    pub fn user_group(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self::new(EntityType::UserGroup, name, uuid)
    }

    pub fn tag(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self::new(EntityType::Tag, name, uuid)
    }

    pub fn all_users() -> Self {
        Self {
            name: "All Users".to_string(),
            entity_type: EntityType::AllUsers,
            uuid: None,
        }
    }

    pub fn all_assets() -> Self {
        Self {
            name: "All Assets".to_string(),
            entity_type: EntityType::AllAssets,
            uuid: None,
        }
    }

    fn validate(&self, role: &str) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation(format!("{} name must not be empty", role)));
        }
        if let Some(uuid) = &self.uuid {
            require_uuid(&format!("{} uuid", role), uuid)?;
        }
        Ok(())
    }
}

/// Body of a create or update call: a permission without its server-assigned id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionSpec {
    pub name: String,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub objects: Vec<PermissionEntity>,
    #[serde(default)]
    pub subjects: Vec<PermissionEntity>,
}

impl PermissionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an action; actions form a set, so repeats are ignored.
    pub fn action(mut self, action: Action) -> Self {
        if !self.actions.contains(&action) {
            self.actions.push(action);
        }
        self
    }

    pub fn actions(self, actions: impl IntoIterator<Item = Action>) -> Self {
        actions.into_iter().fold(self, Self::action)
    }

    pub fn object(mut self, object: PermissionEntity) -> Self {
        self.objects.push(object);
        self
    }

    pub fn subject(mut self, subject: PermissionEntity) -> Self {
        self.subjects.push(subject);
        self
    }

    /// Checks what the service would otherwise reject.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation(
                "permission name must not be empty".to_string(),
            ));
        }
        if self.actions.is_empty() {
            return Err(ApiError::Validation(
                "permission requires at least one action".to_string(),
            ));
        }
        for object in &self.objects {
            object.validate("object")?;
        }
        for subject in &self.subjects {
            subject.validate("subject")?;
        }
        Ok(())
    }
}

/// A permission record as returned by the service.
///
/// Fields the service adds beyond the known ones are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub permission_uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default)]
    pub objects: Vec<PermissionEntity>,
    #[serde(default)]
    pub subjects: Vec<PermissionEntity>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Permissions held by a user, a user group or the calling user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermissionSummary {
    #[serde(default)]
    pub permissions_available: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub(crate) fn require_uuid(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{} must not be empty", field)));
    }
    let parsed = Uuid::parse_str(value).map_err(|e| {
        ApiError::Validation(format!("{} is not a valid UUID ({}): {}", field, value, e))
    })?;

    // Braced, URN and simple forms parse too, but the service only knows
    // the lowercase hyphenated spelling.
    let canonical = parsed.hyphenated().to_string();
    if value != canonical {
        return Err(ApiError::Validation(format!(
            "{} must be a lowercase hyphenated UUID ({}), got {}",
            field, canonical, value
        )));
    }
    Ok(())
}
