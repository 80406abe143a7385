//! Typed client for the access-control (permissions) endpoints.

pub mod api;
pub mod types;

pub use api::{AccessControlApi, PERMISSIONS_PATH};
pub use types::{
    Action, EntityType, Permission, PermissionEntity, PermissionSpec, PermissionSummary,
};
