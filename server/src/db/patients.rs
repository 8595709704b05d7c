use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::models::Patient;

const PATIENT_COLUMNS: &str = "id, user_id, full_name, date_of_birth, contact_no, address, \
                               access_code, legacy_access_code";

pub(super) fn patient_from_row(row: &PgRow) -> Result<Patient, sqlx::Error> {
    Ok(Patient {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        full_name: row.try_get("full_name")?,
        date_of_birth: row.try_get("date_of_birth")?,
        contact_no: row.try_get("contact_no")?,
        address: row.try_get("address")?,
        access_code: row.try_get("access_code")?,
        legacy_access_code: row.try_get("legacy_access_code")?,
    })
}

impl Database {
    pub async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(patient_from_row).transpose()
    }

    pub async fn find_patient_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Patient>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(patient_from_row).transpose()
    }

    /// Reference resolution only matches the *current* code; the legacy code
    /// counts solely for explicit code verification.
    pub async fn find_patient_by_access_code(
        &self,
        access_code: &str,
    ) -> Result<Option<Patient>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE access_code = $1"
        ))
        .bind(access_code)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(patient_from_row).transpose()
    }

    pub async fn access_code_in_use(&self, access_code: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM patients WHERE access_code = $1)")
            .bind(access_code)
            .fetch_one(self.pool())
            .await
    }

    /// Install a new access code, retaining the old one as the legacy code
    /// so codes on previously issued documents keep working.
    pub async fn rotate_access_code(
        &self,
        patient_id: Uuid,
        new_code: &str,
    ) -> Result<Option<Patient>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "UPDATE patients
             SET legacy_access_code = access_code, access_code = $2
             WHERE id = $1
             RETURNING {PATIENT_COLUMNS}"
        ))
        .bind(patient_id)
        .bind(new_code)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(patient_from_row).transpose()
    }

    /// Patients this doctor currently holds an active, unexpired grant for.
    pub async fn list_patients_with_active_grant(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<Patient>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT p.id, p.user_id, p.full_name, p.date_of_birth, p.contact_no, p.address,
                    p.access_code, p.legacy_access_code
             FROM patients p
             JOIN access_grants g ON g.patient_id = p.id
             WHERE g.doctor_id = $1 AND g.is_active AND g.expires_at > NOW()
             ORDER BY p.full_name",
        )
        .bind(doctor_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(patient_from_row).collect()
    }
}
