use std::sync::Arc;

use chrono::{Duration, Utc};

use super::strategy::{self, AccessAttempt, Verdict};
use crate::db::Database;
use crate::error::{ApiError, ApiResult};
use crate::models::{AccessLevel, AccessMethod, Patient};
use uuid::Uuid;

/// Grants issued by redeeming an access code outlive the request/approval
/// kind: the patient handed over a secret, so the grant defaults to a year
/// instead of thirty days.
pub const CODE_GRANT_EXPIRY_DAYS: i64 = 365;
pub const DEFAULT_GRANT_EXPIRY_DAYS: i64 = 30;

/// The resolver's answer, after side effects have been applied.
#[derive(Debug, Clone, Copy)]
pub struct Resolution {
    pub granted: bool,
    pub method: Option<AccessMethod>,
    pub access_level: Option<AccessLevel>,
    /// A pending request now exists for the pair (soft outcome; callers
    /// surface it as an accepted-but-not-authorized response).
    pub request_sent: bool,
}

/// Decides, for a doctor/patient pair, whether access is permitted right
/// now, and applies the durable consequences: history upsert always, and
/// grant/ledger writes depending on the verdict. Stores are injected at
/// construction; the resolver holds no other state.
pub struct AccessResolver {
    db: Arc<Database>,
}

impl AccessResolver {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The hospital/department codes are taken from the *requesting
    /// identity*, not the doctor row: the heuristics key on where the
    /// doctor currently works, and the history snapshot records the contact
    /// context.
    pub async fn resolve(
        &self,
        doctor_id: Uuid,
        patient: &Patient,
        requesting_hospital_code: &str,
        requesting_department_code: &str,
        access_code: Option<&str>,
    ) -> ApiResult<Resolution> {
        let attempt = self
            .load_attempt(
                doctor_id,
                patient,
                requesting_hospital_code,
                requesting_department_code,
                access_code,
            )
            .await?;
        let verdict = strategy::evaluate(&attempt);

        let granted = matches!(verdict, Verdict::Granted(_));

        // Side effect 1, unconditionally: the relationship is remembered,
        // whatever the outcome.
        self.db
            .upsert_history_on_resolution(
                doctor_id,
                patient.id,
                &patient.full_name,
                requesting_hospital_code,
                requesting_department_code,
                granted,
            )
            .await?;

        match verdict {
            Verdict::Granted(access) => {
                if access.method == AccessMethod::AccessCode {
                    self.apply_code_redemption(doctor_id, patient.id).await?;
                }
                tracing::info!(
                    doctor_id = %doctor_id,
                    patient_id = %patient.id,
                    method = access.method.as_str(),
                    level = access.level.as_str(),
                    "access granted"
                );
                Ok(Resolution {
                    granted: true,
                    method: Some(access.method),
                    access_level: Some(access.level),
                    request_sent: false,
                })
            }
            Verdict::RequestAccess => {
                let message = format!(
                    "Access requested on {}",
                    Utc::now().format("%Y-%m-%d")
                );
                let created = self
                    .db
                    .create_pending_request(patient.id, doctor_id, AccessLevel::Read, &message)
                    .await?;
                tracing::info!(
                    doctor_id = %doctor_id,
                    patient_id = %patient.id,
                    already_pending = created.is_none(),
                    "access request recorded"
                );
                Ok(Resolution {
                    granted: false,
                    method: None,
                    access_level: None,
                    request_sent: true,
                })
            }
            Verdict::Denied => {
                tracing::info!(
                    doctor_id = %doctor_id,
                    patient_id = %patient.id,
                    "access denied: supplied code did not match"
                );
                Ok(Resolution {
                    granted: false,
                    method: None,
                    access_level: None,
                    request_sent: false,
                })
            }
        }
    }

    async fn load_attempt(
        &self,
        doctor_id: Uuid,
        patient: &Patient,
        requesting_hospital_code: &str,
        requesting_department_code: &str,
        access_code: Option<&str>,
    ) -> ApiResult<AccessAttempt> {
        let active_grant = self.db.find_active_grant(patient.id, doctor_id).await?;
        let treated_at_current_hospital = self
            .db
            .has_record_by_doctor_at_hospital(patient.id, doctor_id, requesting_hospital_code)
            .await?;
        let department_record_exists = self
            .db
            .has_record_in_department(patient.id, requesting_department_code)
            .await?;

        Ok(AccessAttempt {
            code_supplied: access_code.is_some(),
            code_matches: access_code.is_some_and(|code| patient.code_matches(code)),
            active_grant_level: active_grant.map(|grant| grant.access_level),
            treated_at_current_hospital,
            department_record_exists,
        })
    }

    /// The durable consequences of a code match: a readWrite grant (created,
    /// or reactivated if it was revoked; an active grant is left alone) and
    /// an approved ledger entry recording why the grant exists.
    async fn apply_code_redemption(&self, doctor_id: Uuid, patient_id: Uuid) -> ApiResult<()> {
        let expires_at = Utc::now() + Duration::days(CODE_GRANT_EXPIRY_DAYS);
        self.db
            .redeem_code_grant(patient_id, doctor_id, expires_at)
            .await?;

        if self
            .db
            .find_approved_request(patient_id, doctor_id)
            .await?
            .is_none()
        {
            let message = format!(
                "Access requested using access code on {}",
                Utc::now().format("%Y-%m-%d")
            );
            self.db
                .insert_approved_request(
                    patient_id,
                    doctor_id,
                    &message,
                    "Auto-approved via access code",
                )
                .await?;
        }
        Ok(())
    }

    /// The grant-only lookup used by the record read and write paths: no
    /// codes, no heuristics, no side effects. Revoked or expired means no
    /// access.
    pub async fn check_access(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
    ) -> ApiResult<Option<AccessLevel>> {
        let grant = self.db.find_active_grant(patient_id, doctor_id).await?;
        Ok(grant.map(|grant| grant.access_level))
    }

    /// Gate for mutations: an active, unexpired grant at readWrite.
    pub async fn require_write_level(&self, doctor_id: Uuid, patient_id: Uuid) -> ApiResult<()> {
        match self.check_access(doctor_id, patient_id).await? {
            Some(AccessLevel::ReadWrite) => Ok(()),
            Some(AccessLevel::Read) => Err(ApiError::Forbidden(
                "You only have read access to this patient's records".to_string(),
            )),
            None => Err(ApiError::Forbidden(
                "You do not have access to this patient's records".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{seed_doctor, seed_patient, seed_record, test_database};
    use crate::models::{Doctor, RequestStatus};

    async fn load(db: &Arc<Database>, doctor_id: Uuid, patient_id: Uuid) -> (Doctor, Patient) {
        let doctor = db.find_doctor(doctor_id).await.unwrap().unwrap();
        let patient = db.find_patient(patient_id).await.unwrap().unwrap();
        (doctor, patient)
    }

    #[tokio::test]
    async fn cold_attempt_without_code_sends_a_request_and_writes_history() {
        let Some(db) = test_database().await else { return };
        let db = Arc::new(db);
        let resolver = AccessResolver::new(db.clone());

        let patient_id = seed_patient(&db).await;
        let doctor_id = seed_doctor(&db, "H1", "D1").await;
        let (doctor, patient) = load(&db, doctor_id, patient_id).await;

        let resolution = resolver
            .resolve(
                doctor.id,
                &patient,
                &doctor.hospital_code,
                &doctor.department_code,
                None,
            ).await.unwrap();
        assert!(!resolution.granted);
        assert!(resolution.request_sent);

        let pending = db.find_pending_request(patient_id, doctor_id).await.unwrap();
        assert_eq!(pending.unwrap().status, RequestStatus::Pending);

        let history = db.find_history(doctor_id, patient_id).await.unwrap().unwrap();
        assert!(!history.has_active_access);
    }

    #[tokio::test]
    async fn valid_code_grants_read_write_with_grant_and_approved_request() {
        let Some(db) = test_database().await else { return };
        let db = Arc::new(db);
        let resolver = AccessResolver::new(db.clone());

        let patient_id = seed_patient(&db).await;
        let doctor_id = seed_doctor(&db, "H1", "D1").await;
        let (doctor, patient) = load(&db, doctor_id, patient_id).await;

        let resolution = resolver
            .resolve(
                doctor.id,
                &patient,
                &doctor.hospital_code,
                &doctor.department_code,
                Some(patient.access_code.as_str()),
            )
            .await
            .unwrap();
        assert!(resolution.granted);
        assert_eq!(resolution.method, Some(AccessMethod::AccessCode));
        assert_eq!(resolution.access_level, Some(AccessLevel::ReadWrite));

        let grant = db.find_grant(patient_id, doctor_id).await.unwrap().unwrap();
        assert!(grant.is_active);
        assert_eq!(grant.access_level, AccessLevel::ReadWrite);
        assert!(grant.expires_at > Utc::now() + Duration::days(300));

        assert!(db
            .find_approved_request(patient_id, doctor_id)
            .await
            .unwrap()
            .is_some());

        let history = db.find_history(doctor_id, patient_id).await.unwrap().unwrap();
        assert!(history.has_active_access);
    }

    #[tokio::test]
    async fn legacy_code_still_matches() {
        let Some(db) = test_database().await else { return };
        let db = Arc::new(db);
        let resolver = AccessResolver::new(db.clone());

        let patient_id = seed_patient(&db).await;
        let doctor_id = seed_doctor(&db, "H1", "D1").await;
        let (doctor, patient) = load(&db, doctor_id, patient_id).await;

        let old_code = patient.access_code.clone();
        db.rotate_access_code(patient_id, "123123123123").await.unwrap();
        let (_, patient) = load(&db, doctor_id, patient_id).await;

        let resolution = resolver
            .resolve(
                doctor.id,
                &patient,
                &doctor.hospital_code,
                &doctor.department_code,
                Some(&old_code),
            ).await.unwrap();
        assert!(resolution.granted);
        assert_eq!(resolution.method, Some(AccessMethod::AccessCode));
    }

    #[tokio::test]
    async fn mismatched_code_is_denied_without_creating_a_request() {
        let Some(db) = test_database().await else { return };
        let db = Arc::new(db);
        let resolver = AccessResolver::new(db.clone());

        let patient_id = seed_patient(&db).await;
        let doctor_id = seed_doctor(&db, "H1", "D1").await;
        let (doctor, patient) = load(&db, doctor_id, patient_id).await;

        let resolution = resolver
            .resolve(
                doctor.id,
                &patient,
                &doctor.hospital_code,
                &doctor.department_code,
                Some("000000000000"),
            )
            .await
            .unwrap();
        assert!(!resolution.granted);
        assert!(!resolution.request_sent);

        assert!(db
            .find_pending_request(patient_id, doctor_id)
            .await
            .unwrap()
            .is_none());
        // History is still written on a denial.
        assert!(db.find_history(doctor_id, patient_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn prior_treatment_at_current_hospital_grants_implicit_read() {
        let Some(db) = test_database().await else { return };
        let db = Arc::new(db);
        let resolver = AccessResolver::new(db.clone());

        let patient_id = seed_patient(&db).await;
        let doctor_id = seed_doctor(&db, "H1", "D1").await;
        seed_record(&db, patient_id, doctor_id, "H1", "D1").await;
        let (doctor, patient) = load(&db, doctor_id, patient_id).await;

        let resolution = resolver
            .resolve(
                doctor.id,
                &patient,
                &doctor.hospital_code,
                &doctor.department_code,
                None,
            ).await.unwrap();
        assert!(resolution.granted);
        assert_eq!(resolution.method, Some(AccessMethod::SameHospital));
        assert_eq!(resolution.access_level, Some(AccessLevel::Read));

        // Heuristic access persists no grant.
        assert!(db.find_grant(patient_id, doctor_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn department_match_across_hospitals_grants_implicit_read() {
        let Some(db) = test_database().await else { return };
        let db = Arc::new(db);
        let resolver = AccessResolver::new(db.clone());

        let patient_id = seed_patient(&db).await;
        let author = seed_doctor(&db, "H1", "Cardio").await;
        seed_record(&db, patient_id, author, "H1", "Cardio").await;

        // A different doctor, different hospital, same department.
        let doctor_id = seed_doctor(&db, "H2", "Cardio").await;
        let (doctor, patient) = load(&db, doctor_id, patient_id).await;

        let resolution = resolver
            .resolve(
                doctor.id,
                &patient,
                &doctor.hospital_code,
                &doctor.department_code,
                None,
            ).await.unwrap();
        assert!(resolution.granted);
        assert_eq!(resolution.method, Some(AccessMethod::SameDepartment));
        assert_eq!(resolution.access_level, Some(AccessLevel::Read));
        assert!(db.find_grant(patient_id, doctor_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn revoked_then_code_redemption_reactivates_at_read_write() {
        let Some(db) = test_database().await else { return };
        let db = Arc::new(db);
        let resolver = AccessResolver::new(db.clone());

        let patient_id = seed_patient(&db).await;
        let doctor_id = seed_doctor(&db, "H1", "D1").await;
        let (doctor, patient) = load(&db, doctor_id, patient_id).await;

        // Grant, then walk the two-step revocation down to inactive.
        db.upsert_grant(
            patient_id,
            doctor_id,
            AccessLevel::ReadWrite,
            Utc::now() + Duration::days(30),
        )
        .await
        .unwrap();
        db.downgrade_grant(patient_id, doctor_id).await.unwrap();
        db.deactivate_grant(patient_id, doctor_id).await.unwrap();

        // No code: denied softly, pending request created.
        let resolution = resolver
            .resolve(
                doctor.id,
                &patient,
                &doctor.hospital_code,
                &doctor.department_code,
                None,
            ).await.unwrap();
        assert!(!resolution.granted);
        assert!(resolution.request_sent);

        // Correct code: reactivated at readWrite with a fresh 1-year expiry.
        let resolution = resolver
            .resolve(
                doctor.id,
                &patient,
                &doctor.hospital_code,
                &doctor.department_code,
                Some(patient.access_code.as_str()),
            )
            .await
            .unwrap();
        assert!(resolution.granted);

        let grant = db.find_grant(patient_id, doctor_id).await.unwrap().unwrap();
        assert!(grant.is_active);
        assert_eq!(grant.access_level, AccessLevel::ReadWrite);
        assert!(grant.expires_at > Utc::now() + Duration::days(300));
    }

    #[tokio::test]
    async fn require_write_level_distinguishes_read_only_from_no_access() {
        let Some(db) = test_database().await else { return };
        let db = Arc::new(db);
        let resolver = AccessResolver::new(db.clone());

        let patient_id = seed_patient(&db).await;
        let doctor_id = seed_doctor(&db, "H1", "D1").await;

        assert!(matches!(
            resolver.require_write_level(doctor_id, patient_id).await,
            Err(ApiError::Forbidden(_))
        ));

        db.upsert_grant(patient_id, doctor_id, AccessLevel::Read, Utc::now() + Duration::days(30))
            .await
            .unwrap();
        assert!(matches!(
            resolver.require_write_level(doctor_id, patient_id).await,
            Err(ApiError::Forbidden(_))
        ));

        db.upsert_grant(
            patient_id,
            doctor_id,
            AccessLevel::ReadWrite,
            Utc::now() + Duration::days(30),
        )
        .await
        .unwrap();
        assert!(resolver.require_write_level(doctor_id, patient_id).await.is_ok());
    }
}
