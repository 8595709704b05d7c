use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{bad_column, Database};
use crate::models::{AccessGrant, AccessLevel, DoctorSummary, GrantWithDoctor};

const GRANT_COLUMNS: &str =
    "id, patient_id, doctor_id, access_level, is_active, granted_at, expires_at";

pub(super) fn grant_from_row(row: &PgRow) -> Result<AccessGrant, sqlx::Error> {
    let level_raw: String = row.try_get("access_level")?;
    let access_level =
        AccessLevel::parse(&level_raw).ok_or_else(|| bad_column("access_level", &level_raw))?;
    Ok(AccessGrant {
        id: row.try_get("id")?,
        patient_id: row.try_get("patient_id")?,
        doctor_id: row.try_get("doctor_id")?,
        access_level,
        is_active: row.try_get("is_active")?,
        granted_at: row.try_get("granted_at")?,
        expires_at: row.try_get("expires_at")?,
    })
}

impl Database {
    /// Patient-initiated grant: create or fully overwrite level/expiry and
    /// reactivate, atomically on the unique pair index.
    pub async fn upsert_grant(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        access_level: AccessLevel,
        expires_at: DateTime<Utc>,
    ) -> Result<AccessGrant, sqlx::Error> {
        let row = sqlx::query(&format!(
            "INSERT INTO access_grants (id, patient_id, doctor_id, access_level, is_active, granted_at, expires_at)
             VALUES ($1, $2, $3, $4, TRUE, NOW(), $5)
             ON CONFLICT (patient_id, doctor_id) DO UPDATE
             SET access_level = EXCLUDED.access_level,
                 expires_at = EXCLUDED.expires_at,
                 is_active = TRUE
             RETURNING {GRANT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(patient_id)
        .bind(doctor_id)
        .bind(access_level.as_str())
        .bind(expires_at)
        .fetch_one(self.pool())
        .await?;

        grant_from_row(&row)
    }

    /// Access-code redemption: create a fresh readWrite grant, or reactivate
    /// an inactive one at readWrite with a reset expiry. An already-active
    /// grant is left exactly as it is.
    pub async fn redeem_code_grant(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<AccessGrant, sqlx::Error> {
        let row = sqlx::query(&format!(
            "INSERT INTO access_grants (id, patient_id, doctor_id, access_level, is_active, granted_at, expires_at)
             VALUES ($1, $2, $3, 'readWrite', TRUE, NOW(), $4)
             ON CONFLICT (patient_id, doctor_id) DO UPDATE
             SET is_active = TRUE,
                 access_level = 'readWrite',
                 expires_at = EXCLUDED.expires_at
             WHERE access_grants.is_active = FALSE
             RETURNING {GRANT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(patient_id)
        .bind(doctor_id)
        .bind(expires_at)
        .fetch_optional(self.pool())
        .await?;

        match row {
            Some(row) => grant_from_row(&row),
            // The conflict action matched nothing: the grant exists and is
            // active, untouched. Read it back.
            None => {
                let existing = self.find_grant(patient_id, doctor_id).await?;
                existing.ok_or(sqlx::Error::RowNotFound)
            }
        }
    }

    pub async fn find_grant(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<Option<AccessGrant>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {GRANT_COLUMNS} FROM access_grants
             WHERE patient_id = $1 AND doctor_id = $2"
        ))
        .bind(patient_id)
        .bind(doctor_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(grant_from_row).transpose()
    }

    /// The grant that currently authorizes access, if any. Expiry is
    /// evaluated here, at lookup time; there is no background sweep.
    pub async fn find_active_grant(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<Option<AccessGrant>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {GRANT_COLUMNS} FROM access_grants
             WHERE patient_id = $1 AND doctor_id = $2
               AND is_active AND expires_at > NOW()"
        ))
        .bind(patient_id)
        .bind(doctor_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(grant_from_row).transpose()
    }

    /// Revoke step one: readWrite becomes read. `is_active` is untouched.
    pub async fn downgrade_grant(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<Option<AccessGrant>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "UPDATE access_grants SET access_level = 'read'
             WHERE patient_id = $1 AND doctor_id = $2
             RETURNING {GRANT_COLUMNS}"
        ))
        .bind(patient_id)
        .bind(doctor_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(grant_from_row).transpose()
    }

    /// Revoke step two: deactivate. Idempotent; re-running it on an already
    /// inactive grant re-applies the same terminal state.
    pub async fn deactivate_grant(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<Option<AccessGrant>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "UPDATE access_grants SET is_active = FALSE
             WHERE patient_id = $1 AND doctor_id = $2
             RETURNING {GRANT_COLUMNS}"
        ))
        .bind(patient_id)
        .bind(doctor_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(grant_from_row).transpose()
    }

    /// Active, unexpired grants for a patient with the doctor each names.
    pub async fn list_active_grants_with_doctors(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<GrantWithDoctor>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT g.id, g.patient_id, g.doctor_id, g.access_level, g.is_active,
                    g.granted_at, g.expires_at,
                    d.full_name, d.hospital_code, d.department_code
             FROM access_grants g
             JOIN doctors d ON d.id = g.doctor_id
             WHERE g.patient_id = $1 AND g.is_active AND g.expires_at > NOW()
             ORDER BY g.granted_at DESC",
        )
        .bind(patient_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let grant = grant_from_row(row)?;
                let doctor = DoctorSummary {
                    id: grant.doctor_id,
                    full_name: row.try_get("full_name")?,
                    hospital_code: row.try_get("hospital_code")?,
                    department_code: row.try_get("department_code")?,
                };
                Ok(GrantWithDoctor { grant, doctor })
            })
            .collect()
    }
}
