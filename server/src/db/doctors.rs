use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::models::Doctor;

const DOCTOR_COLUMNS: &str =
    "id, user_id, full_name, specialization, hospital_code, department_code";

pub(super) fn doctor_from_row(row: &PgRow) -> Result<Doctor, sqlx::Error> {
    Ok(Doctor {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        full_name: row.try_get("full_name")?,
        specialization: row.try_get("specialization")?,
        hospital_code: row.try_get("hospital_code")?,
        department_code: row.try_get("department_code")?,
    })
}

impl Database {
    pub async fn find_doctor(&self, id: Uuid) -> Result<Option<Doctor>, sqlx::Error> {
        let row = sqlx::query(&format!("SELECT {DOCTOR_COLUMNS} FROM doctors WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        row.as_ref().map(doctor_from_row).transpose()
    }

    pub async fn find_doctor_by_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<Doctor>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {DOCTOR_COLUMNS} FROM doctors WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(doctor_from_row).transpose()
    }
}
