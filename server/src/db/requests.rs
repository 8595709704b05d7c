use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use super::{bad_column, Database};
use crate::models::{
    AccessLevel, AccessRequest, DoctorSummary, PatientSummary, RequestStatus, RequestWithDoctor,
    RequestWithPatient,
};

const REQUEST_COLUMNS: &str = "id, patient_id, doctor_id, status, access_level, message, \
                               response_message, requested_at, response_date";

pub(super) fn request_from_row(row: &PgRow) -> Result<AccessRequest, sqlx::Error> {
    let status_raw: String = row.try_get("status")?;
    let status =
        RequestStatus::parse(&status_raw).ok_or_else(|| bad_column("status", &status_raw))?;
    let access_level = match row.try_get::<Option<String>, _>("access_level")? {
        Some(raw) => {
            Some(AccessLevel::parse(&raw).ok_or_else(|| bad_column("access_level", &raw))?)
        }
        None => None,
    };
    Ok(AccessRequest {
        id: row.try_get("id")?,
        patient_id: row.try_get("patient_id")?,
        doctor_id: row.try_get("doctor_id")?,
        status,
        access_level,
        message: row.try_get("message")?,
        response_message: row.try_get("response_message")?,
        requested_at: row.try_get("requested_at")?,
        response_date: row.try_get("response_date")?,
    })
}

impl Database {
    /// Create a pending request unless one already exists for the pair.
    /// Returns `None` when the partial unique index reports the pair already
    /// has a pending request; callers treat that as success, not failure.
    pub async fn create_pending_request(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        access_level: AccessLevel,
        message: &str,
    ) -> Result<Option<AccessRequest>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "INSERT INTO access_requests
                 (id, patient_id, doctor_id, status, access_level, message, requested_at)
             VALUES ($1, $2, $3, 'pending', $4, $5, NOW())
             ON CONFLICT (patient_id, doctor_id) WHERE status = 'pending' DO NOTHING
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(patient_id)
        .bind(doctor_id)
        .bind(access_level.as_str())
        .bind(message)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    /// The auto-approved ledger entry written when access is obtained by
    /// code: records why the grant exists without a request/approval cycle.
    pub async fn insert_approved_request(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        message: &str,
        response_message: &str,
    ) -> Result<AccessRequest, sqlx::Error> {
        let row = sqlx::query(&format!(
            "INSERT INTO access_requests
                 (id, patient_id, doctor_id, status, access_level, message,
                  response_message, requested_at, response_date)
             VALUES ($1, $2, $3, 'approved', 'readWrite', $4, $5, NOW(), NOW())
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(patient_id)
        .bind(doctor_id)
        .bind(message)
        .bind(response_message)
        .fetch_one(self.pool())
        .await?;

        request_from_row(&row)
    }

    pub async fn find_pending_request(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<Option<AccessRequest>, sqlx::Error> {
        self.find_request_with_status(patient_id, doctor_id, RequestStatus::Pending)
            .await
    }

    pub async fn find_approved_request(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<Option<AccessRequest>, sqlx::Error> {
        self.find_request_with_status(patient_id, doctor_id, RequestStatus::Approved)
            .await
    }

    async fn find_request_with_status(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        status: RequestStatus,
    ) -> Result<Option<AccessRequest>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLUMNS} FROM access_requests
             WHERE patient_id = $1 AND doctor_id = $2 AND status = $3
             ORDER BY requested_at DESC
             LIMIT 1"
        ))
        .bind(patient_id)
        .bind(doctor_id)
        .bind(status.as_str())
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    /// Resolve a request, once. Matches only a row still pending and owned
    /// by the calling patient; a second response finds nothing.
    pub async fn respond_to_pending(
        &self,
        request_id: Uuid,
        patient_id: Uuid,
        status: RequestStatus,
        response_message: &str,
    ) -> Result<Option<AccessRequest>, sqlx::Error> {
        let row = sqlx::query(&format!(
            "UPDATE access_requests
             SET status = $3, response_message = $4, response_date = NOW()
             WHERE id = $1 AND patient_id = $2 AND status = 'pending'
             RETURNING {REQUEST_COLUMNS}"
        ))
        .bind(request_id)
        .bind(patient_id)
        .bind(status.as_str())
        .bind(response_message)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    pub async fn list_requests_for_patient(
        &self,
        patient_id: Uuid,
    ) -> Result<Vec<RequestWithDoctor>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT r.id, r.patient_id, r.doctor_id, r.status, r.access_level, r.message,
                    r.response_message, r.requested_at, r.response_date,
                    d.full_name, d.hospital_code, d.department_code
             FROM access_requests r
             JOIN doctors d ON d.id = r.doctor_id
             WHERE r.patient_id = $1
             ORDER BY r.requested_at DESC",
        )
        .bind(patient_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let request = request_from_row(row)?;
                let doctor = DoctorSummary {
                    id: request.doctor_id,
                    full_name: row.try_get("full_name")?,
                    hospital_code: row.try_get("hospital_code")?,
                    department_code: row.try_get("department_code")?,
                };
                Ok(RequestWithDoctor { request, doctor })
            })
            .collect()
    }

    pub async fn list_requests_for_doctor(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<RequestWithPatient>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT r.id, r.patient_id, r.doctor_id, r.status, r.access_level, r.message,
                    r.response_message, r.requested_at, r.response_date,
                    p.full_name
             FROM access_requests r
             JOIN patients p ON p.id = r.patient_id
             WHERE r.doctor_id = $1
             ORDER BY r.requested_at DESC",
        )
        .bind(doctor_id)
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let request = request_from_row(row)?;
                let patient = PatientSummary {
                    id: request.patient_id,
                    full_name: row.try_get("full_name")?,
                };
                Ok(RequestWithPatient { request, patient })
            })
            .collect()
    }
}
