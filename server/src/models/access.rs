use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::people::{DoctorSummary, PatientSummary};

/// What a grant permits. Stored as text (`read` / `readWrite`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessLevel {
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "readWrite")]
    ReadWrite,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::ReadWrite => "readWrite",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read" => Some(AccessLevel::Read),
            "readWrite" => Some(AccessLevel::ReadWrite),
            _ => None,
        }
    }
}

/// Lifecycle of an access request. Stored as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RequestStatus::Pending),
            "approved" => Some(RequestStatus::Approved),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }
}

/// How the resolver arrived at a positive verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
    AccessCode,
    ExistingGrant,
    SameHospital,
    SameDepartment,
}

impl AccessMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMethod::AccessCode => "access_code",
            AccessMethod::ExistingGrant => "existing_grant",
            AccessMethod::SameHospital => "same_hospital",
            AccessMethod::SameDepartment => "same_department",
        }
    }
}

/// Durable doctor/patient permission. One row per pair; never deleted,
/// mutated in place by grant, downgrade, revoke and code-redemption paths.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessGrant {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub access_level: AccessLevel,
    pub is_active: bool,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Audit-visible ask-and-answer record. Zero or more per pair; at most one
/// pending at a time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_level: Option<AccessLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_message: Option<String>,
    pub requested_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_date: Option<DateTime<Utc>>,
}

/// Permanent relationship ledger entry. Survives full revocation; the only
/// place a doctor can discover patients whose access is now revoked.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorPatientHistory {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub full_name: String,
    pub hospital_code: String,
    pub department_code: String,
    pub has_active_access: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Grant joined with the doctor it names, for patient-facing listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantWithDoctor {
    #[serde(flatten)]
    pub grant: AccessGrant,
    pub doctor: DoctorSummary,
}

/// Request joined with the doctor it names, for patient-facing listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWithDoctor {
    #[serde(flatten)]
    pub request: AccessRequest,
    pub doctor: DoctorSummary,
}

/// Request joined with the patient it names, for doctor-facing listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWithPatient {
    #[serde(flatten)]
    pub request: AccessRequest,
    pub patient: PatientSummary,
}

/// The two-step revoke state machine: a readWrite grant downgrades first and
/// only a read grant fully deactivates. A single call never takes a
/// readWrite grant all the way down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationStep {
    Downgrade,
    Deactivate,
}

impl RevocationStep {
    pub fn for_level(level: AccessLevel) -> Self {
        match level {
            AccessLevel::ReadWrite => RevocationStep::Downgrade,
            AccessLevel::Read => RevocationStep::Deactivate,
        }
    }
}
