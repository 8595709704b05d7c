//! Shared scaffolding for database-backed tests. These tests run against a
//! live Postgres and are skipped when `DATABASE_URL` is not set, so the pure
//! test suite stays runnable anywhere.

use rand::Rng;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use super::{migrations, Database};

pub(crate) async fn test_database() -> Option<Database> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");

    let db = Database::new(pool);
    migrations::run_migrations(db.pool())
        .await
        .expect("Failed to run migrations");
    Some(db)
}

pub(crate) fn random_access_code() -> String {
    rand::thread_rng()
        .gen_range(100_000_000_000u64..1_000_000_000_000u64)
        .to_string()
}

pub(crate) async fn seed_patient(db: &Database) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO patients
             (id, user_id, full_name, date_of_birth, contact_no, address, access_code)
         VALUES ($1, $2, 'Asha Rao', '1980-04-02', '555-0100', '12 Lake Rd', $3)",
    )
    .bind(id)
    .bind(Uuid::new_v4())
    .bind(random_access_code())
    .execute(db.pool())
    .await
    .expect("Failed to seed patient");
    id
}

pub(crate) async fn seed_doctor(db: &Database, hospital_code: &str, department_code: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO doctors
             (id, user_id, full_name, specialization, hospital_code, department_code)
         VALUES ($1, $2, 'Dr. Meera Iyer', 'Cardiology', $3, $4)",
    )
    .bind(id)
    .bind(Uuid::new_v4())
    .bind(hospital_code)
    .bind(department_code)
    .execute(db.pool())
    .await
    .expect("Failed to seed doctor");
    id
}

pub(crate) async fn seed_record(
    db: &Database,
    patient_id: Uuid,
    doctor_id: Uuid,
    hospital_code: &str,
    department_code: &str,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO medical_records
             (id, patient_id, doctor_id, hospital_code, department_code, diagnosis)
         VALUES ($1, $2, $3, $4, $5, 'Routine checkup')",
    )
    .bind(id)
    .bind(patient_id)
    .bind(doctor_id)
    .bind(hospital_code)
    .bind(department_code)
    .execute(db.pool())
    .await
    .expect("Failed to seed record");
    id
}
