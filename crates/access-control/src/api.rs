//! Access-control endpoints of the v3 API.

use crate::types::{require_uuid, Permission, PermissionSpec, PermissionSummary};
use serde::Deserialize;
use tio_core::{ApiError, ApiSession};
use tracing::debug;

pub const PERMISSIONS_PATH: &str = "/api/v3/access-control/permissions";

/// `list` answers either with an envelope or with a bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum PermissionList {
    Envelope { permissions: Vec<Permission> },
    Bare(Vec<Permission>),
}

#[derive(Clone)]
pub struct AccessControlApi {
    session: ApiSession,
}

impl AccessControlApi {
    pub fn new(session: ApiSession) -> Self {
        Self { session }
    }

    /// Fetch one permission.
    ///
    /// # Errors
    /// `ApiError::Validation` without sending anything if `permission_uuid`
    /// is not a lowercase hyphenated UUID; otherwise whatever the session reports.
    pub async fn details(&self, permission_uuid: &str) -> Result<Permission, ApiError> {
        require_uuid("permission_uuid", permission_uuid)?;
        self.session
            .get(&format!("{}/{}", PERMISSIONS_PATH, permission_uuid))
            .await
    }

    /// Permissions granted to a user.
    pub async fn get_user_permission(&self, user_uuid: &str) -> Result<PermissionSummary, ApiError> {
        require_uuid("user_uuid", user_uuid)?;
        self.session
            .get(&format!("{}/users/{}", PERMISSIONS_PATH, user_uuid))
            .await
    }

    /// Permissions granted to a user group.
    pub async fn get_user_group_permission(
        &self,
        group_uuid: &str,
    ) -> Result<PermissionSummary, ApiError> {
        require_uuid("group_uuid", group_uuid)?;
        self.session
            .get(&format!("{}/user-groups/{}", PERMISSIONS_PATH, group_uuid))
            .await
    }

    /// Permissions of the caller whose API keys sign the session.
    pub async fn get_current_user_permission(&self) -> Result<PermissionSummary, ApiError> {
        self.session
            .get(&format!("{}/users/me", PERMISSIONS_PATH))
            .await
    }

    /// Create a permission; the result carries the server-assigned `permission_uuid`.
    pub async fn create(&self, spec: &PermissionSpec) -> Result<Permission, ApiError> {
        spec.validate()?;
        let created: Permission = self.session.post(PERMISSIONS_PATH, spec).await?;
        debug!("created permission {} ({})", created.permission_uuid, spec.name);
        Ok(created)
    }

    /// Replace a permission with `spec`.
    pub async fn update(&self, permission_uuid: &str, spec: &PermissionSpec) -> Result<(), ApiError> {
        require_uuid("permission_uuid", permission_uuid)?;
        spec.validate()?;
        self.session
            .put(&format!("{}/{}", PERMISSIONS_PATH, permission_uuid), spec)
            .await
    }

    /// Remove a permission.
    pub async fn delete(&self, permission_uuid: &str) -> Result<(), ApiError> {
        require_uuid("permission_uuid", permission_uuid)?;
        self.session
            .delete(&format!("{}/{}", PERMISSIONS_PATH, permission_uuid))
            .await?;
        debug!("deleted permission {}", permission_uuid);
        Ok(())
    }

    /// Every permission visible to the caller; possibly empty.
    pub async fn list(&self) -> Result<Vec<Permission>, ApiError> {
        let permissions = match self.session.get::<PermissionList>(PERMISSIONS_PATH).await? {
            PermissionList::Envelope { permissions } => permissions,
            PermissionList::Bare(permissions) => permissions,
        };
        Ok(permissions)
    }
}
