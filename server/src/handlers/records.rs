use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{caller_attributes, doctor_profile, emit_audit, ApiResponse};
use crate::auth::AuthUser;
use crate::db::NewMedicalRecord;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AccessLevel, AuditAction, AuditEntity, MedicalRecord, RecordType, ENCRYPTED_PLACEHOLDER,
};
use crate::AppState;

use abe::EncryptedEnvelope;

fn default_record_type() -> RecordType {
    RecordType::General
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordBody {
    pub patient_id: Uuid,
    #[serde(default = "default_record_type")]
    pub record_type: RecordType,
    pub diagnosis: String,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub vital_signs: Option<Value>,
    pub lab_results: Option<Value>,
    pub treatment_plan: Option<Value>,
    pub medications: Option<Value>,
    pub imaging: Option<Value>,
    pub special_id: Option<String>,
    #[serde(default)]
    pub should_encrypt: bool,
}

/// POST /api/doctor/records
///
/// Requires an active readWrite grant. With `shouldEncrypt` the sensitive
/// payload is sealed under the author's current hospital/department
/// attributes and the plaintext columns hold redaction placeholders.
pub async fn create_record(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateRecordBody>,
) -> Result<Response, ApiError> {
    let doctor = doctor_profile(&state, &auth).await?;

    if state.db.find_patient(body.patient_id).await?.is_none() {
        return Err(ApiError::NotFound("Patient not found".to_string()));
    }
    if body.diagnosis.trim().is_empty() {
        return Err(ApiError::Validation("Diagnosis is required".to_string()));
    }

    state
        .resolver
        .require_write_level(doctor.id, body.patient_id)
        .await?;

    let vital_signs = body.vital_signs.unwrap_or_else(|| json!({}));
    let lab_results = body.lab_results.unwrap_or_else(|| json!([]));
    let treatment_plan = body.treatment_plan.unwrap_or_else(|| json!({}));
    let medications = body.medications.unwrap_or_else(|| json!([]));
    let imaging = body.imaging.unwrap_or_else(|| json!([]));

    let record = if body.should_encrypt {
        let payload = json!({
            "diagnosis": body.diagnosis,
            "prescription": body.prescription,
            "notes": body.notes,
            "vitalSigns": vital_signs,
            "labResults": lab_results,
            "treatmentPlan": treatment_plan,
            "medications": medications,
            "imaging": imaging,
        });
        let envelope = abe::encrypt(&payload, &caller_attributes(&auth))?;

        NewMedicalRecord {
            patient_id: body.patient_id,
            doctor_id: doctor.id,
            hospital_code: auth.hospital_code.clone(),
            department_code: auth.department_code.clone(),
            special_id: body.special_id,
            record_type: body.record_type,
            diagnosis: ENCRYPTED_PLACEHOLDER.to_string(),
            prescription: Some(ENCRYPTED_PLACEHOLDER.to_string()),
            notes: Some(ENCRYPTED_PLACEHOLDER.to_string()),
            vital_signs: json!({}),
            lab_results: json!([]),
            treatment_plan: json!({}),
            medications: json!([]),
            imaging: json!([]),
            is_encrypted: true,
            encrypted_data: Some(envelope.encrypted_data),
            encrypted_key: Some(envelope.encrypted_key),
            policy: Some(envelope.policy),
            encryption_algorithm: Some("ABE".to_string()),
        }
    } else {
        NewMedicalRecord {
            patient_id: body.patient_id,
            doctor_id: doctor.id,
            hospital_code: auth.hospital_code.clone(),
            department_code: auth.department_code.clone(),
            special_id: body.special_id,
            record_type: body.record_type,
            diagnosis: body.diagnosis,
            prescription: body.prescription,
            notes: body.notes,
            vital_signs,
            lab_results,
            treatment_plan,
            medications,
            imaging,
            is_encrypted: false,
            encrypted_data: None,
            encrypted_key: None,
            policy: None,
            encryption_algorithm: None,
        }
    };

    let created = state.db.insert_record(record).await?;

    emit_audit(
        &state.db,
        &auth,
        AuditAction::Create,
        AuditEntity::MedicalRecord,
        Some(created.id.to_string()),
        "Medical record created",
    )
    .await;

    Ok((StatusCode::CREATED, Json(ApiResponse::new(created))).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordBody {
    pub record_type: Option<RecordType>,
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub vital_signs: Option<Value>,
    pub lab_results: Option<Value>,
    pub treatment_plan: Option<Value>,
    pub medications: Option<Value>,
    pub imaging: Option<Value>,
    pub should_encrypt: Option<bool>,
}

fn apply_updates(record: &mut MedicalRecord, body: &UpdateRecordBody) {
    if let Some(record_type) = body.record_type {
        record.record_type = record_type;
    }
    if let Some(diagnosis) = &body.diagnosis {
        record.diagnosis = diagnosis.clone();
    }
    if body.prescription.is_some() {
        record.prescription = body.prescription.clone();
    }
    if body.notes.is_some() {
        record.notes = body.notes.clone();
    }
    if let Some(vital_signs) = &body.vital_signs {
        record.vital_signs = vital_signs.clone();
    }
    if let Some(lab_results) = &body.lab_results {
        record.lab_results = lab_results.clone();
    }
    if let Some(treatment_plan) = &body.treatment_plan {
        record.treatment_plan = treatment_plan.clone();
    }
    if let Some(medications) = &body.medications {
        record.medications = medications.clone();
    }
    if let Some(imaging) = &body.imaging {
        record.imaging = imaging.clone();
    }
}

fn seal_record(record: &mut MedicalRecord, envelope: EncryptedEnvelope) {
    record.diagnosis = ENCRYPTED_PLACEHOLDER.to_string();
    record.prescription = Some(ENCRYPTED_PLACEHOLDER.to_string());
    record.notes = Some(ENCRYPTED_PLACEHOLDER.to_string());
    record.vital_signs = json!({});
    record.lab_results = json!([]);
    record.treatment_plan = json!({});
    record.medications = json!([]);
    record.imaging = json!([]);
    record.is_encrypted = true;
    record.encrypted_data = Some(envelope.encrypted_data);
    record.encrypted_key = Some(envelope.encrypted_key);
    record.policy = Some(envelope.policy);
    record.encryption_algorithm = Some("ABE".to_string());
}

fn unseal_columns(record: &mut MedicalRecord) {
    record.is_encrypted = false;
    record.encrypted_data = None;
    record.encrypted_key = None;
    record.policy = None;
    record.encryption_algorithm = None;
}

/// PUT /api/doctor/records/:id
///
/// Author-only, and the author must still hold readWrite access: a patient
/// may have downgraded or revoked it since the record was written.
/// `shouldEncrypt` transitions the record between plaintext and sealed;
/// unsealing requires the Policy Gate to pass.
pub async fn update_record(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateRecordBody>,
) -> ApiResult<Json<ApiResponse<MedicalRecord>>> {
    let doctor = doctor_profile(&state, &auth).await?;

    let mut record = state
        .db
        .find_record(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Medical record not found".to_string()))?;

    if record.doctor_id != doctor.id {
        return Err(ApiError::Forbidden(
            "Not authorized to update this record".to_string(),
        ));
    }

    match state.resolver.check_access(doctor.id, record.patient_id).await? {
        Some(AccessLevel::ReadWrite) => {}
        Some(AccessLevel::Read) => {
            return Err(ApiError::Forbidden(
                "Your access has been limited to read-only. You cannot modify records anymore."
                    .to_string(),
            ))
        }
        None => {
            return Err(ApiError::Forbidden(
                "You no longer have access to this patient's records".to_string(),
            ))
        }
    }

    let attributes = caller_attributes(&auth);

    // Unseal first so incoming field updates win over the stored payload.
    if body.should_encrypt == Some(false) && record.is_encrypted {
        let envelope = record.envelope().ok_or_else(|| {
            ApiError::Validation("record encryption envelope unusable: missing columns".to_string())
        })?;
        let payload = abe::decrypt(&envelope, &attributes)?.ok_or_else(|| {
            ApiError::PolicyDenied("Cannot decrypt record - access denied".to_string())
        })?;
        record = record.with_decrypted_payload(&payload);
        unseal_columns(&mut record);
    }

    apply_updates(&mut record, &body);

    if body.should_encrypt == Some(true) && !record.is_encrypted {
        let payload = record.sensitive_payload();
        let envelope = abe::encrypt(&payload, &attributes)?;
        seal_record(&mut record, envelope);
    }

    let saved = state.db.save_record(&record).await?;

    emit_audit(
        &state.db,
        &auth,
        AuditAction::Update,
        AuditEntity::MedicalRecord,
        Some(saved.id.to_string()),
        "Medical record updated",
    )
    .await;

    Ok(Json(ApiResponse::new(saved)))
}

/// DELETE /api/doctor/records/:id
pub async fn delete_record(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Value>>> {
    let doctor = doctor_profile(&state, &auth).await?;

    let record = state
        .db
        .find_record(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Medical record not found".to_string()))?;

    if record.doctor_id != doctor.id {
        return Err(ApiError::Forbidden(
            "Not authorized to delete this record".to_string(),
        ));
    }

    state.db.delete_record(id).await?;

    emit_audit(
        &state.db,
        &auth,
        AuditAction::Delete,
        AuditEntity::MedicalRecord,
        Some(id.to_string()),
        "Medical record deleted",
    )
    .await;

    Ok(Json(ApiResponse::new(json!({}))))
}

/// GET /api/doctor/records/:id/decrypted
///
/// The single-record read where a failing Policy Gate is surfaced loudly:
/// the caller may hold a valid grant yet still be refused by the record's
/// encryption-time attributes, and that outcome must stay distinguishable
/// from both "no grant" and "no record".
pub async fn decrypt_record(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<MedicalRecord>>> {
    let doctor = doctor_profile(&state, &auth).await?;

    let record = state
        .db
        .find_record(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Medical record not found".to_string()))?;

    if state
        .resolver
        .check_access(doctor.id, record.patient_id)
        .await?
        .is_none()
    {
        return Err(ApiError::Forbidden(
            "You do not have access to this patient's records".to_string(),
        ));
    }

    if !record.is_encrypted {
        return Ok(Json(ApiResponse::new(record)));
    }

    let envelope = record.envelope().ok_or_else(|| {
        ApiError::Validation("record encryption envelope unusable: missing columns".to_string())
    })?;
    let payload = abe::decrypt(&envelope, &caller_attributes(&auth))?.ok_or_else(|| {
        ApiError::PolicyDenied(
            "Your current attributes do not satisfy this record's policy".to_string(),
        )
    })?;

    emit_audit(
        &state.db,
        &auth,
        AuditAction::Read,
        AuditEntity::MedicalRecord,
        Some(record.id.to_string()),
        "Encrypted record decrypted",
    )
    .await;

    Ok(Json(ApiResponse::new(record.with_decrypted_payload(&payload))))
}
