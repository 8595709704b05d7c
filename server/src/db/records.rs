use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{bad_column, Database};
use crate::models::{MedicalRecord, RecordType};

const RECORD_COLUMNS: &str = "id, patient_id, doctor_id, hospital_code, department_code, \
                              special_id, record_type, diagnosis, prescription, notes, \
                              vital_signs, lab_results, treatment_plan, medications, imaging, \
                              is_encrypted, encrypted_data, encrypted_key, policy, \
                              encryption_algorithm, created_at, updated_at";

/// Insert payload for a record. Encryption, redaction and tag stamping are
/// decided by the caller; this layer stores what it is given.
#[derive(Debug, Clone)]
pub struct NewMedicalRecord {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub hospital_code: String,
    pub department_code: String,
    pub special_id: Option<String>,
    pub record_type: RecordType,
    pub diagnosis: String,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub vital_signs: Value,
    pub lab_results: Value,
    pub treatment_plan: Value,
    pub medications: Value,
    pub imaging: Value,
    pub is_encrypted: bool,
    pub encrypted_data: Option<String>,
    pub encrypted_key: Option<String>,
    pub policy: Option<String>,
    pub encryption_algorithm: Option<String>,
}

pub(super) fn record_from_row(row: &PgRow) -> Result<MedicalRecord, sqlx::Error> {
    let type_raw: String = row.try_get("record_type")?;
    let record_type =
        RecordType::parse(&type_raw).ok_or_else(|| bad_column("record_type", &type_raw))?;
    Ok(MedicalRecord {
        id: row.try_get("id")?,
        patient_id: row.try_get("patient_id")?,
        doctor_id: row.try_get("doctor_id")?,
        hospital_code: row.try_get("hospital_code")?,
        department_code: row.try_get("department_code")?,
        special_id: row.try_get("special_id")?,
        record_type,
        diagnosis: row.try_get("diagnosis")?,
        prescription: row.try_get("prescription")?,
        notes: row.try_get("notes")?,
        vital_signs: row.try_get("vital_signs")?,
        lab_results: row.try_get("lab_results")?,
        treatment_plan: row.try_get("treatment_plan")?,
        medications: row.try_get("medications")?,
        imaging: row.try_get("imaging")?,
        is_encrypted: row.try_get("is_encrypted")?,
        encrypted_data: row.try_get("encrypted_data")?,
        encrypted_key: row.try_get("encrypted_key")?,
        policy: row.try_get("policy")?,
        encryption_algorithm: row.try_get("encryption_algorithm")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Database {
    pub async fn insert_record(
        &self,
        record: NewMedicalRecord,
    ) -> Result<MedicalRecord, sqlx::Error> {
        let row = sqlx::query(&format!(
            "INSERT INTO medical_records
                 (id, patient_id, doctor_id, hospital_code, department_code, special_id,
                  record_type, diagnosis, prescription, notes, vital_signs, lab_results,
                  treatment_plan, medications, imaging, is_encrypted, encrypted_data,
                  encrypted_key, policy, encryption_algorithm, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                     $16, $17, $18, $19, $20, NOW(), NOW())
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(record.patient_id)
        .bind(record.doctor_id)
        .bind(&record.hospital_code)
        .bind(&record.department_code)
        .bind(&record.special_id)
        .bind(record.record_type.as_str())
        .bind(&record.diagnosis)
        .bind(&record.prescription)
        .bind(&record.notes)
        .bind(&record.vital_signs)
        .bind(&record.lab_results)
        .bind(&record.treatment_plan)
        .bind(&record.medications)
        .bind(&record.imaging)
        .bind(record.is_encrypted)
        .bind(&record.encrypted_data)
        .bind(&record.encrypted_key)
        .bind(&record.policy)
        .bind(&record.encryption_algorithm)
        .fetch_one(self.pool())
        .await?;

        record_from_row(&row)
    }

    /// Persist a fully merged record state. The handler owns the merge; this
    /// writes every mutable column in one statement.
    pub async fn save_record(&self, record: &MedicalRecord) -> Result<MedicalRecord, sqlx::Error> {
        let row = sqlx::query(&format!(
            "UPDATE medical_records
             SET record_type = $2, diagnosis = $3, prescription = $4, notes = $5,
                 vital_signs = $6, lab_results = $7, treatment_plan = $8, medications = $9,
                 imaging = $10, is_encrypted = $11, encrypted_data = $12, encrypted_key = $13,
                 policy = $14, encryption_algorithm = $15, special_id = $16, updated_at = NOW()
             WHERE id = $1
             RETURNING {RECORD_COLUMNS}"
        ))
        .bind(record.id)
        .bind(record.record_type.as_str())
        .bind(&record.diagnosis)
        .bind(&record.prescription)
        .bind(&record.notes)
        .bind(&record.vital_signs)
        .bind(&record.lab_results)
        .bind(&record.treatment_plan)
        .bind(&record.medications)
        .bind(&record.imaging)
        .bind(record.is_encrypted)
        .bind(&record.encrypted_data)
        .bind(&record.encrypted_key)
        .bind(&record.policy)
        .bind(&record.encryption_algorithm)
        .bind(&record.special_id)
        .fetch_one(self.pool())
        .await?;

        record_from_row(&row)
    }

    pub async fn find_record(&self, id: Uuid) -> Result<Option<MedicalRecord>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM medical_records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn delete_record(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM medical_records WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Every record for a patient, across hospitals, newest first.
    pub async fn list_records_for_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<MedicalRecord>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM medical_records
             WHERE patient_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(patient_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// The doctor-view listing: records this doctor authored for the patient
    /// under their current hospital and department tags.
    pub async fn list_records_authored(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        hospital_code: &str,
        department_code: &str,
    ) -> Result<Vec<MedicalRecord>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM medical_records
             WHERE patient_id = $1 AND doctor_id = $2
               AND hospital_code = $3 AND department_code = $4
             ORDER BY created_at DESC"
        ))
        .bind(patient_id)
        .bind(doctor_id)
        .bind(hospital_code)
        .bind(department_code)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Same-hospital heuristic input: has this doctor authored any record
    /// for the patient at the given hospital?
    pub async fn has_record_by_doctor_at_hospital(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        hospital_code: &str,
    ) -> Result<bool, sqlx::Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM medical_records
                 WHERE patient_id = $1 AND doctor_id = $2 AND hospital_code = $3
             )",
        )
        .bind(patient_id)
        .bind(doctor_id)
        .bind(hospital_code)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    /// Cross-hospital department heuristic input: does any record for the
    /// patient, by anyone, carry this department tag?
    pub async fn has_record_in_department(
        &self,
        patient_id: Uuid,
        department_code: &str,
    ) -> Result<bool, sqlx::Error> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM medical_records
                 WHERE patient_id = $1 AND department_code = $2
             )",
        )
        .bind(patient_id)
        .bind(department_code)
        .fetch_one(self.pool())
        .await?;
        Ok(exists)
    }

    pub async fn find_patient_id_by_special_id(
        &self,
        special_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT patient_id FROM medical_records WHERE special_id = $1 LIMIT 1",
        )
        .bind(special_id)
        .fetch_optional(self.pool())
        .await
    }
}
