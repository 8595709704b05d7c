use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// Patient directory row. Owned by the registration collaborator; this
/// subsystem reads it for identity, access codes and denormalized names.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub contact_no: String,
    pub address: String,
    pub access_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_access_code: Option<String>,
}

impl Patient {
    /// True when `code` matches the current or the retained legacy code.
    pub fn code_matches(&self, code: &str) -> bool {
        self.access_code == code
            || self
                .legacy_access_code
                .as_deref()
                .is_some_and(|legacy| legacy == code)
    }
}

/// The limited identity surfaced before access is granted (soft-accept) and
/// in joined listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: Uuid,
    pub full_name: String,
}

/// Doctor directory row. Hospital/department codes here are the doctor's
/// *current* affiliation, which the heuristic strategies compare against
/// record tags.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub full_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specialization: Option<String>,
    pub hospital_code: String,
    pub department_code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorSummary {
    pub id: Uuid,
    pub full_name: String,
    pub hospital_code: String,
    pub department_code: String,
}
