pub mod doctor;
pub mod patient;
pub mod records;

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;

use crate::auth::{AuthUser, Role};
use crate::db::Database;
use crate::error::{ApiError, ApiResult};
use crate::models::{AuditAction, AuditEntity, Doctor};
use crate::AppState;

/// Uniform success envelope: `{"success": true, "count"?, "message"?, "data"}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            count: None,
            message: None,
            data,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            count: None,
            message: Some(message.into()),
            data,
        }
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    pub fn listing(data: Vec<T>) -> Self {
        Self {
            success: true,
            count: Some(data.len()),
            message: None,
            data,
        }
    }
}

/// Doctor-only routes resolve the caller to their directory row first.
pub(crate) async fn doctor_profile(state: &AppState, auth: &AuthUser) -> ApiResult<Doctor> {
    auth.require_role(Role::Doctor)?;
    state
        .db
        .find_doctor_by_user(auth.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Doctor profile not found".to_string()))
}

/// The caller's attributes as the Policy Gate sees them.
pub(crate) fn caller_attributes(auth: &AuthUser) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("hospital".to_string(), auth.hospital_code.clone()),
        ("department".to_string(), auth.department_code.clone()),
    ])
}

/// Emit an audit fact. Failure to record one is logged and swallowed: audit
/// is best-effort and must never fail the request it describes.
pub(crate) async fn emit_audit(
    db: &Database,
    auth: &AuthUser,
    action: AuditAction,
    entity: AuditEntity,
    entity_id: Option<String>,
    description: &str,
) {
    if let Err(e) = db
        .insert_audit(
            auth.id,
            &auth.username,
            action,
            entity,
            entity_id,
            description,
            json!({}),
        )
        .await
    {
        tracing::warn!(error = %e, "audit fact not recorded");
    }
}
