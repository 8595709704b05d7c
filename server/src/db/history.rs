use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::models::DoctorPatientHistory;

const HISTORY_COLUMNS: &str = "id, doctor_id, patient_id, full_name, hospital_code, \
                               department_code, has_active_access, access_revoked_at, \
                               created_at, updated_at";

pub(super) fn history_from_row(row: &PgRow) -> Result<DoctorPatientHistory, sqlx::Error> {
    Ok(DoctorPatientHistory {
        id: row.try_get("id")?,
        doctor_id: row.try_get("doctor_id")?,
        patient_id: row.try_get("patient_id")?,
        full_name: row.try_get("full_name")?,
        hospital_code: row.try_get("hospital_code")?,
        department_code: row.try_get("department_code")?,
        has_active_access: row.try_get("has_active_access")?,
        access_revoked_at: row.try_get("access_revoked_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Database {
    /// The resolver's history side effect, applied on every resolution
    /// regardless of outcome. Refreshes the contact-time snapshot and the
    /// activity flag; a positive outcome clears any revocation timestamp,
    /// a negative one leaves it in place.
    pub async fn upsert_history_on_resolution(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        full_name: &str,
        hospital_code: &str,
        department_code: &str,
        granted: bool,
    ) -> Result<DoctorPatientHistory, sqlx::Error> {
        let row = sqlx::query(&format!(
            "INSERT INTO doctor_patient_history
                 (id, doctor_id, patient_id, full_name, hospital_code, department_code,
                  has_active_access, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
             ON CONFLICT (doctor_id, patient_id) DO UPDATE
             SET full_name = EXCLUDED.full_name,
                 hospital_code = EXCLUDED.hospital_code,
                 department_code = EXCLUDED.department_code,
                 has_active_access = EXCLUDED.has_active_access,
                 access_revoked_at = CASE
                     WHEN EXCLUDED.has_active_access THEN NULL
                     ELSE doctor_patient_history.access_revoked_at
                 END,
                 updated_at = NOW()
             RETURNING {HISTORY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(doctor_id)
        .bind(patient_id)
        .bind(full_name)
        .bind(hospital_code)
        .bind(department_code)
        .bind(granted)
        .fetch_one(self.pool())
        .await?;

        history_from_row(&row)
    }

    /// Patient-initiated activation (grant or approval). An existing row
    /// keeps its contact-time snapshot; only the flags move.
    pub async fn mark_history_active(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        full_name: &str,
        hospital_code: &str,
        department_code: &str,
    ) -> Result<DoctorPatientHistory, sqlx::Error> {
        let row = sqlx::query(&format!(
            "INSERT INTO doctor_patient_history
                 (id, doctor_id, patient_id, full_name, hospital_code, department_code,
                  has_active_access, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, NOW(), NOW())
             ON CONFLICT (doctor_id, patient_id) DO UPDATE
             SET has_active_access = TRUE,
                 access_revoked_at = NULL,
                 updated_at = NOW()
             RETURNING {HISTORY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(doctor_id)
        .bind(patient_id)
        .bind(full_name)
        .bind(hospital_code)
        .bind(department_code)
        .fetch_one(self.pool())
        .await?;

        history_from_row(&row)
    }

    /// Hard revocation: the row survives, flagged inactive with the
    /// revocation instant.
    pub async fn mark_history_revoked(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        full_name: &str,
        hospital_code: &str,
        department_code: &str,
    ) -> Result<DoctorPatientHistory, sqlx::Error> {
        let row = sqlx::query(&format!(
            "INSERT INTO doctor_patient_history
                 (id, doctor_id, patient_id, full_name, hospital_code, department_code,
                  has_active_access, access_revoked_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, FALSE, NOW(), NOW(), NOW())
             ON CONFLICT (doctor_id, patient_id) DO UPDATE
             SET has_active_access = FALSE,
                 access_revoked_at = NOW(),
                 updated_at = NOW()
             RETURNING {HISTORY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(doctor_id)
        .bind(patient_id)
        .bind(full_name)
        .bind(hospital_code)
        .bind(department_code)
        .fetch_one(self.pool())
        .await?;

        history_from_row(&row)
    }

    pub async fn find_history(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
    ) -> Result<Option<DoctorPatientHistory>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM doctor_patient_history
             WHERE doctor_id = $1 AND patient_id = $2"
        ))
        .bind(doctor_id)
        .bind(patient_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(history_from_row).transpose()
    }

    /// Lookup for the cross-hospital fallback: the reference a doctor holds
    /// may be a patient id or the history row's own id.
    pub async fn find_history_by_reference(
        &self,
        doctor_id: Uuid,
        reference: Uuid,
    ) -> Result<Option<DoctorPatientHistory>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM doctor_patient_history
             WHERE doctor_id = $1 AND (patient_id = $2 OR id = $2)"
        ))
        .bind(doctor_id)
        .bind(reference)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(history_from_row).transpose()
    }

    /// Every patient this doctor has ever touched, revoked pairs included.
    pub async fn list_history_for_doctor(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<DoctorPatientHistory>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            "SELECT {HISTORY_COLUMNS} FROM doctor_patient_history
             WHERE doctor_id = $1
             ORDER BY updated_at DESC"
        ))
        .bind(doctor_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(history_from_row).collect()
    }
}
