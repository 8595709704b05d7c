use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{caller_attributes, doctor_profile, emit_audit, ApiResponse};
use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AccessLevel, AuditAction, AuditEntity, DoctorPatientHistory, MedicalRecord, Patient,
    RequestStatus, RequestWithPatient,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    /// Optional `pending` / `approved` / `rejected` filter.
    pub status: Option<String>,
}

pub(crate) fn parse_status_filter(query: &RequestListQuery) -> ApiResult<Option<RequestStatus>> {
    match query.status.as_deref() {
        None => Ok(None),
        Some(raw) => RequestStatus::parse(raw).map(Some).ok_or_else(|| {
            ApiError::Validation(format!("Unknown request status {raw:?}"))
        }),
    }
}

/// Cross-hospital patient references: `AAAA000`-style special ids stamped on
/// records by partner hospitals.
pub(crate) fn is_special_id(reference: &str) -> bool {
    let bytes = reference.as_bytes();
    bytes.len() == 7
        && bytes[..4].iter().all(|b| b.is_ascii_uppercase())
        && bytes[4..].iter().all(|b| b.is_ascii_digit())
}

/// Resolve a patient reference in priority order: UUID, then current access
/// code, then special id on a record.
async fn resolve_patient_reference(
    state: &AppState,
    reference: &str,
) -> ApiResult<Option<Patient>> {
    if let Ok(id) = Uuid::parse_str(reference) {
        if let Some(patient) = state.db.find_patient(id).await? {
            return Ok(Some(patient));
        }
    }
    if let Some(patient) = state.db.find_patient_by_access_code(reference).await? {
        return Ok(Some(patient));
    }
    if is_special_id(reference) {
        if let Some(patient_id) = state.db.find_patient_id_by_special_id(reference).await? {
            return Ok(state.db.find_patient(patient_id).await?);
        }
    }
    Ok(None)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientAccessBody {
    /// Patient id, access code, or special id.
    pub patient_id: String,
    pub access_code: Option<String>,
}

/// POST /api/doctor/patient-access
///
/// The resolver's front door. Every outcome leaves a history row; the
/// response shape depends on the verdict: full records on a grant, 202 on a
/// soft "request sent", 403 on a bad code, and a limited historical snapshot
/// when the patient is only known from a revoked relationship.
pub async fn patient_access(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<PatientAccessBody>,
) -> Result<Response, ApiError> {
    let doctor = doctor_profile(&state, &auth).await?;

    if body.patient_id.trim().is_empty() {
        return Err(ApiError::Validation("Patient ID is required".to_string()));
    }

    let Some(patient) = resolve_patient_reference(&state, &body.patient_id).await? else {
        if let Ok(reference) = Uuid::parse_str(&body.patient_id) {
            if let Some(history) = state
                .db
                .find_history_by_reference(doctor.id, reference)
                .await?
            {
                return Ok(historical_snapshot_response(&history));
            }
        }
        return Err(ApiError::NotFound(
            "Patient not found. Please check the patient ID.".to_string(),
        ));
    };

    let resolution = state
        .resolver
        .resolve(
            doctor.id,
            &patient,
            &auth.hospital_code,
            &auth.department_code,
            body.access_code.as_deref(),
        )
        .await?;

    if resolution.granted {
        let records = state.db.list_records_for_patient(patient.id).await?;
        emit_audit(
            &state.db,
            &auth,
            AuditAction::Read,
            AuditEntity::Patient,
            Some(patient.id.to_string()),
            "Cross-hospital patient data access",
        )
        .await;

        let body = json!({
            "success": true,
            "count": records.len(),
            "accessMethod": resolution.method.map(|method| method.as_str()),
            "patientDetails": {
                "id": patient.id,
                "fullName": patient.full_name,
                "dateOfBirth": patient.date_of_birth,
                "contactNo": patient.contact_no,
                "address": patient.address,
                "accessCode": patient.access_code,
                "hasFullAccess": true,
            },
            "data": records,
        });
        Ok((StatusCode::OK, Json(body)).into_response())
    } else if resolution.request_sent {
        let body = json!({
            "success": true,
            "message": "Access request has been sent to the patient",
            "patientDetails": {
                "id": patient.id,
                "fullName": patient.full_name,
                "accessRequestSent": true,
            },
        });
        Ok((StatusCode::ACCEPTED, Json(body)).into_response())
    } else {
        Err(ApiError::Forbidden(
            "You do not have access to this patient's data. Please provide a valid \
             access code or request access from the patient."
                .to_string(),
        ))
    }
}

fn historical_snapshot_response(history: &DoctorPatientHistory) -> Response {
    let body = json!({
        "success": true,
        "message": "Limited patient data available from history",
        "patientDetails": {
            "id": history.patient_id,
            "fullName": history.full_name,
            "hospitalCode": history.hospital_code,
            "departmentCode": history.department_code,
            "hasActiveAccess": false,
            "accessRevokedAt": history.access_revoked_at,
            "isHistoricalRecord": true,
        },
        "data": [],
    });
    (StatusCode::OK, Json(body)).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAccessBody {
    pub patient_id: Uuid,
    pub message: Option<String>,
    pub access_level: Option<AccessLevel>,
}

/// POST /api/doctor/access-requests
pub async fn request_access(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<RequestAccessBody>,
) -> Result<Response, ApiError> {
    let doctor = doctor_profile(&state, &auth).await?;

    let patient = state
        .db
        .find_patient(body.patient_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Patient not found".to_string()))?;

    if let Some(grant) = state.db.find_grant(patient.id, doctor.id).await? {
        if grant.is_active {
            return Err(ApiError::Conflict(
                "You already have access to this patient's data".to_string(),
            ));
        }
    }

    let message = body.message.unwrap_or_default();
    let request = state
        .db
        .create_pending_request(
            patient.id,
            doctor.id,
            body.access_level.unwrap_or(AccessLevel::Read),
            &message,
        )
        .await?
        .ok_or_else(|| {
            ApiError::Conflict(
                "You already have a pending access request for this patient".to_string(),
            )
        })?;

    emit_audit(
        &state.db,
        &auth,
        AuditAction::Create,
        AuditEntity::AccessRequest,
        Some(request.id.to_string()),
        "Access request sent",
    )
    .await;

    let body = ApiResponse::with_message(request, "Access request sent successfully");
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

/// GET /api/doctor/access-requests?status=pending
pub async fn my_access_requests(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<RequestListQuery>,
) -> ApiResult<Json<ApiResponse<Vec<RequestWithPatient>>>> {
    let doctor = doctor_profile(&state, &auth).await?;
    let status = parse_status_filter(&query)?;
    let mut requests = state.db.list_requests_for_doctor(doctor.id).await?;
    if let Some(status) = status {
        requests.retain(|entry| entry.request.status == status);
    }
    Ok(Json(ApiResponse::listing(requests)))
}

/// GET /api/doctor/patients
pub async fn my_patients(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<Patient>>>> {
    let doctor = doctor_profile(&state, &auth).await?;
    let patients = state.db.list_patients_with_active_grant(doctor.id).await?;
    Ok(Json(ApiResponse::listing(patients)))
}

/// GET /api/doctor/patients/history
///
/// Every patient this doctor has ever touched, including pairs whose access
/// is now revoked.
pub async fn history(
    State(state): State<AppState>,
    auth: AuthUser,
) -> ApiResult<Json<ApiResponse<Vec<DoctorPatientHistory>>>> {
    let doctor = doctor_profile(&state, &auth).await?;
    let entries = state.db.list_history_for_doctor(doctor.id).await?;
    Ok(Json(ApiResponse::listing(entries)))
}

/// GET /api/doctor/patients/:patient_id/records
///
/// Grant-gated. Encrypted rows are decrypted inline when the caller's
/// attributes satisfy the record policy; otherwise they stay redacted (the
/// list context denies softly).
pub async fn patient_records(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(patient_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<MedicalRecord>>>> {
    let doctor = doctor_profile(&state, &auth).await?;

    if state
        .resolver
        .check_access(doctor.id, patient_id)
        .await?
        .is_none()
    {
        return Err(ApiError::Forbidden(
            "You do not have access to this patient's records".to_string(),
        ));
    }

    let records = state
        .db
        .list_records_authored(patient_id, doctor.id, &auth.hospital_code, &auth.department_code)
        .await?;

    let attributes = caller_attributes(&auth);
    let records: Vec<MedicalRecord> = records
        .into_iter()
        .map(|record| match record.envelope() {
            Some(envelope) => match abe::decrypt(&envelope, &attributes) {
                Ok(Some(payload)) => record.with_decrypted_payload(&payload),
                Ok(None) => record,
                Err(e) => {
                    tracing::warn!(record_id = %record.id, error = %e, "undecryptable envelope");
                    record
                }
            },
            None => record,
        })
        .collect();

    emit_audit(
        &state.db,
        &auth,
        AuditAction::Read,
        AuditEntity::MedicalRecord,
        Some(patient_id.to_string()),
        "Patient records read",
    )
    .await;

    Ok(Json(ApiResponse::listing(records)))
}
