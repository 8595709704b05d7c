use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{Duration, Utc};
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::doctor::{parse_status_filter, RequestListQuery};
use super::{emit_audit, ApiResponse};
use crate::access::resolver::DEFAULT_GRANT_EXPIRY_DAYS;
use crate::auth::{AuthUser, Role};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AccessGrant, AccessLevel, AccessRequest, AuditAction, AuditEntity, GrantWithDoctor,
    MedicalRecord, Patient, RequestStatus, RequestWithDoctor, RevocationStep,
};
use crate::AppState;

async fn patient_profile(state: &AppState, auth: &AuthUser) -> ApiResult<Patient> {
    auth.require_role(Role::Patient)?;
    state
        .db
        .find_patient_by_user(auth.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Patient profile not found".to_string()))
}

/// GET /api/patient/records
///
/// Self-access is unconditional; encrypted rows stay redacted here.
pub async fn my_records(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<MedicalRecord>>>> {
    let patient = patient_profile(&state, &auth).await?;
    let records = state.db.list_records_for_patient(patient.id).await?;
    Ok(Json(ApiResponse::listing(records)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantAccessBody {
    pub doctor_id: Uuid,
    pub access_level: Option<AccessLevel>,
    pub expiry_days: Option<i64>,
}

/// POST /api/patient/access-grants
///
/// Idempotent upsert: a second grant for the same doctor overwrites level
/// and expiry instead of creating another row.
pub async fn grant_access(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<GrantAccessBody>,
) -> ApiResult<Json<ApiResponse<AccessGrant>>> {
    let patient = patient_profile(&state, &auth).await?;

    let doctor = state
        .db
        .find_doctor(body.doctor_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Doctor not found".to_string()))?;

    let access_level = body.access_level.unwrap_or(AccessLevel::ReadWrite);
    let expires_at =
        Utc::now() + Duration::days(body.expiry_days.unwrap_or(DEFAULT_GRANT_EXPIRY_DAYS));

    let grant = state
        .db
        .upsert_grant(patient.id, doctor.id, access_level, expires_at)
        .await?;

    state
        .db
        .mark_history_active(
            doctor.id,
            patient.id,
            &patient.full_name,
            &doctor.hospital_code,
            &doctor.department_code,
        )
        .await?;

    emit_audit(
        &state.db,
        &auth,
        AuditAction::Update,
        AuditEntity::AccessGrant,
        Some(grant.id.to_string()),
        "Doctor access granted",
    )
    .await;

    Ok(Json(ApiResponse::with_message(
        grant,
        format!("Access granted successfully with {} permissions", access_level.as_str()),
    )))
}

/// GET /api/patient/access-grants
pub async fn my_grants(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<GrantWithDoctor>>>> {
    let patient = patient_profile(&state, &auth).await?;
    let grants = state.db.list_active_grants_with_doctors(patient.id).await?;
    Ok(Json(ApiResponse::listing(grants)))
}

/// DELETE /api/patient/access-grants/:doctor_id
///
/// The two-step revoke: readWrite downgrades to read and a later call
/// deactivates. One call never fully revokes a readWrite grant.
pub async fn revoke_access(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(doctor_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let patient = patient_profile(&state, &auth).await?;

    let grant = state
        .db
        .find_grant(patient.id, doctor_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Access grant not found".to_string()))?;

    let doctor = state
        .db
        .find_doctor(doctor_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Doctor not found".to_string()))?;

    let message = match RevocationStep::for_level(grant.access_level) {
        RevocationStep::Downgrade => {
            state.db.downgrade_grant(patient.id, doctor_id).await?;
            state
                .db
                .mark_history_active(
                    doctor_id,
                    patient.id,
                    &patient.full_name,
                    &doctor.hospital_code,
                    &doctor.department_code,
                )
                .await?;
            "Access restricted to read-only successfully"
        }
        RevocationStep::Deactivate => {
            state.db.deactivate_grant(patient.id, doctor_id).await?;
            state
                .db
                .mark_history_revoked(
                    doctor_id,
                    patient.id,
                    &patient.full_name,
                    &doctor.hospital_code,
                    &doctor.department_code,
                )
                .await?;
            "Access completely revoked successfully"
        }
    };

    emit_audit(
        &state.db,
        &auth,
        AuditAction::Update,
        AuditEntity::AccessGrant,
        Some(grant.id.to_string()),
        message,
    )
    .await;

    Ok(Json(ApiResponse::with_message(json!({}), message)))
}

/// GET /api/patient/access-requests?status=pending
pub async fn my_requests(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<RequestListQuery>,
) -> ApiResult<Json<ApiResponse<Vec<RequestWithDoctor>>>> {
    let patient = patient_profile(&state, &auth).await?;
    let status = parse_status_filter(&query)?;
    let mut requests = state.db.list_requests_for_patient(patient.id).await?;
    if let Some(status) = status {
        requests.retain(|entry| entry.request.status == status);
    }
    Ok(Json(ApiResponse::listing(requests)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondBody {
    pub status: String,
    pub response_message: Option<String>,
}

/// PUT /api/patient/access-requests/:id
///
/// Responds to a request still pending; a second response finds nothing and
/// is a 404. Approval upserts the grant at the requested level with a fresh
/// 30-day expiry.
pub async fn respond_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
    Json(body): Json<RespondBody>,
) -> ApiResult<Json<ApiResponse<AccessRequest>>> {
    let patient = patient_profile(&state, &auth).await?;

    let status = match RequestStatus::parse(&body.status) {
        Some(status @ (RequestStatus::Approved | RequestStatus::Rejected)) => status,
        _ => {
            return Err(ApiError::Validation(
                "Status must be either \"approved\" or \"rejected\"".to_string(),
            ))
        }
    };

    let response_message = body.response_message.unwrap_or_default();
    let request = state
        .db
        .respond_to_pending(request_id, patient.id, status, &response_message)
        .await?
        .ok_or_else(|| ApiError::NotFound("Access request not found".to_string()))?;

    if status == RequestStatus::Approved {
        let access_level = request.access_level.unwrap_or(AccessLevel::ReadWrite);
        let expires_at = Utc::now() + Duration::days(DEFAULT_GRANT_EXPIRY_DAYS);
        state
            .db
            .upsert_grant(patient.id, request.doctor_id, access_level, expires_at)
            .await?;

        let doctor = state
            .db
            .find_doctor(request.doctor_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Doctor not found".to_string()))?;
        state
            .db
            .mark_history_active(
                doctor.id,
                patient.id,
                &patient.full_name,
                &doctor.hospital_code,
                &doctor.department_code,
            )
            .await?;
    }

    emit_audit(
        &state.db,
        &auth,
        AuditAction::Update,
        AuditEntity::AccessRequest,
        Some(request.id.to_string()),
        if status == RequestStatus::Approved {
            "Access request approved"
        } else {
            "Access request rejected"
        },
    )
    .await;

    Ok(Json(ApiResponse::with_message(
        request,
        format!("Request {}", status.as_str()),
    )))
}

fn generate_access_code() -> String {
    rand::thread_rng()
        .gen_range(100_000_000_000u64..1_000_000_000_000u64)
        .to_string()
}

/// POST /api/patient/access-code
///
/// Install a fresh unique 12-digit code; the previous one is retained as
/// the legacy code so it keeps matching on explicit verification.
pub async fn regenerate_access_code(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let patient = patient_profile(&state, &auth).await?;

    let mut access_code = generate_access_code();
    while state.db.access_code_in_use(&access_code).await? {
        access_code = generate_access_code();
    }

    let updated = state
        .db
        .rotate_access_code(patient.id, &access_code)
        .await?
        .ok_or_else(|| ApiError::NotFound("Patient profile not found".to_string()))?;

    emit_audit(
        &state.db,
        &auth,
        AuditAction::Update,
        AuditEntity::Patient,
        Some(patient.id.to_string()),
        "Access code regenerated",
    )
    .await;

    Ok(Json(ApiResponse::with_message(
        json!({ "accessCode": updated.access_code }),
        "Access code regenerated successfully",
    )))
}
