use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use abe::EncryptedEnvelope;

/// What encrypted records show in their plaintext columns at rest.
pub const ENCRYPTED_PLACEHOLDER: &str = "[Encrypted]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    General,
    Lab,
    Prescription,
    Vitals,
    Treatment,
    Medication,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::General => "general",
            RecordType::Lab => "lab",
            RecordType::Prescription => "prescription",
            RecordType::Vitals => "vitals",
            RecordType::Treatment => "treatment",
            RecordType::Medication => "medication",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "general" => Some(RecordType::General),
            "lab" => Some(RecordType::Lab),
            "prescription" => Some(RecordType::Prescription),
            "vitals" => Some(RecordType::Vitals),
            "treatment" => Some(RecordType::Treatment),
            "medication" => Some(RecordType::Medication),
            _ => None,
        }
    }
}

/// A medical record row. The `hospital_code`/`department_code` tags are
/// frozen at authoring time; the resolver's heuristics compare them against
/// the requesting doctor's *current* affiliation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub hospital_code: String,
    pub department_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_id: Option<String>,
    pub record_type: RecordType,
    pub diagnosis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prescription: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub vital_signs: Value,
    pub lab_results: Value,
    pub treatment_plan: Value,
    pub medications: Value,
    pub imaging: Value,
    pub is_encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_algorithm: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MedicalRecord {
    /// The stored encryption envelope, when this record is encrypted and the
    /// envelope columns are intact.
    pub fn envelope(&self) -> Option<EncryptedEnvelope> {
        if !self.is_encrypted {
            return None;
        }
        match (&self.encrypted_data, &self.encrypted_key, &self.policy) {
            (Some(data), Some(key), Some(policy)) => Some(EncryptedEnvelope {
                encrypted_data: data.clone(),
                encrypted_key: key.clone(),
                policy: policy.clone(),
            }),
            _ => None,
        }
    }

    /// Merge a decrypted sensitive payload back over the redacted columns
    /// for a response. Unknown keys in the payload are ignored.
    pub fn with_decrypted_payload(mut self, payload: &Value) -> Self {
        if let Some(diagnosis) = payload.get("diagnosis").and_then(Value::as_str) {
            self.diagnosis = diagnosis.to_string();
        }
        self.prescription = payload
            .get("prescription")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(self.prescription);
        self.notes = payload
            .get("notes")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(self.notes);
        if let Some(vital_signs) = payload.get("vitalSigns") {
            self.vital_signs = vital_signs.clone();
        }
        if let Some(lab_results) = payload.get("labResults") {
            self.lab_results = lab_results.clone();
        }
        if let Some(treatment_plan) = payload.get("treatmentPlan") {
            self.treatment_plan = treatment_plan.clone();
        }
        if let Some(medications) = payload.get("medications") {
            self.medications = medications.clone();
        }
        if let Some(imaging) = payload.get("imaging") {
            self.imaging = imaging.clone();
        }
        self
    }

    /// The sensitive payload as encrypted-at-rest records carry it, built
    /// from the plaintext columns.
    pub fn sensitive_payload(&self) -> Value {
        serde_json::json!({
            "diagnosis": self.diagnosis,
            "prescription": self.prescription,
            "notes": self.notes,
            "vitalSigns": self.vital_signs,
            "labResults": self.lab_results,
            "treatmentPlan": self.treatment_plan,
            "medications": self.medications,
            "imaging": self.imaging,
        })
    }
}
