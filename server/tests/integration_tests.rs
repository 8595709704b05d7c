//! End-to-end flows against a running server.
//!
//! These tests need a live service and database:
//!
//! ```sh
//! DATABASE_URL=postgresql://... cargo run &
//! DATABASE_URL=postgresql://... CAREBRIDGE_BASE_URL=http://localhost:3000 cargo test
//! ```
//!
//! They are skipped when `CAREBRIDGE_BASE_URL` or `DATABASE_URL` is unset.

use rand::Rng;
use reqwest::Client;
use serde_json::{json, Value};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

struct TestEnv {
    base_url: String,
    pool: PgPool,
    client: Client,
}

async fn setup() -> Option<TestEnv> {
    let Ok(base_url) = std::env::var("CAREBRIDGE_BASE_URL") else {
        eprintln!("CAREBRIDGE_BASE_URL not set; skipping integration test");
        return None;
    };
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set; skipping integration test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    Some(TestEnv {
        base_url,
        pool,
        client: Client::new(),
    })
}

struct SeededDoctor {
    id: Uuid,
    user_id: Uuid,
    hospital_code: String,
    department_code: String,
}

struct SeededPatient {
    id: Uuid,
    user_id: Uuid,
    access_code: String,
}

fn random_code() -> String {
    rand::thread_rng()
        .gen_range(100_000_000_000u64..1_000_000_000_000u64)
        .to_string()
}

async fn seed_patient(pool: &PgPool) -> SeededPatient {
    let id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let access_code = random_code();
    sqlx::query(
        "INSERT INTO patients
             (id, user_id, full_name, date_of_birth, contact_no, address, access_code)
         VALUES ($1, $2, 'Asha Rao', '1980-04-02', '555-0100', '12 Lake Rd', $3)",
    )
    .bind(id)
    .bind(user_id)
    .bind(&access_code)
    .execute(pool)
    .await
    .expect("Failed to seed patient");
    SeededPatient {
        id,
        user_id,
        access_code,
    }
}

async fn seed_doctor(pool: &PgPool, hospital_code: &str, department_code: &str) -> SeededDoctor {
    let id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO doctors
             (id, user_id, full_name, specialization, hospital_code, department_code)
         VALUES ($1, $2, 'Dr. Meera Iyer', 'Cardiology', $3, $4)",
    )
    .bind(id)
    .bind(user_id)
    .bind(hospital_code)
    .bind(department_code)
    .execute(pool)
    .await
    .expect("Failed to seed doctor");
    SeededDoctor {
        id,
        user_id,
        hospital_code: hospital_code.to_string(),
        department_code: department_code.to_string(),
    }
}

fn doctor_request(env: &TestEnv, doctor: &SeededDoctor, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
    env.client
        .request(method, format!("{}{}", env.base_url, path))
        .header("x-user-id", doctor.user_id.to_string())
        .header("x-user-role", "doctor")
        .header("x-user-name", "dr.iyer")
        .header("x-hospital-code", &doctor.hospital_code)
        .header("x-department-code", &doctor.department_code)
}

fn patient_request(env: &TestEnv, patient: &SeededPatient, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
    env.client
        .request(method, format!("{}{}", env.base_url, path))
        .header("x-user-id", patient.user_id.to_string())
        .header("x-user-role", "patient")
        .header("x-user-name", "asha.rao")
}

#[tokio::test]
async fn request_approval_record_revoke_lifecycle() {
    let Some(env) = setup().await else { return };
    let patient = seed_patient(&env.pool).await;
    let doctor = seed_doctor(&env.pool, "H1", "D1").await;

    // 1. Cold attempt without a code: soft-accepted, request sent.
    let response = doctor_request(&env, &doctor, reqwest::Method::POST, "/api/doctor/patient-access")
        .json(&json!({ "patientId": patient.id }))
        .send()
        .await
        .expect("patient-access request failed");
    assert_eq!(response.status(), 202);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["patientDetails"]["accessRequestSent"], json!(true));

    // 2. The patient sees exactly one pending request and approves it.
    let response = patient_request(&env, &patient, reqwest::Method::GET, "/api/patient/access-requests")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    let pending: Vec<&Value> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|request| request["status"] == "pending")
        .collect();
    assert_eq!(pending.len(), 1);
    let request_id = pending[0]["id"].as_str().unwrap().to_string();

    let response = patient_request(
        &env,
        &patient,
        reqwest::Method::PUT,
        &format!("/api/patient/access-requests/{request_id}"),
    )
    .json(&json!({ "status": "approved", "responseMessage": "ok" }))
    .send()
    .await
    .unwrap();
    assert_eq!(response.status(), 200);

    // Responding a second time finds nothing.
    let response = patient_request(
        &env,
        &patient,
        reqwest::Method::PUT,
        &format!("/api/patient/access-requests/{request_id}"),
    )
    .json(&json!({ "status": "rejected" }))
    .send()
    .await
    .unwrap();
    assert_eq!(response.status(), 404);

    // 3. The approved grant came from a resolver-created request, so it is
    //    read-level; the patient upgrades it to readWrite.
    let response = patient_request(&env, &patient, reqwest::Method::POST, "/api/patient/access-grants")
        .json(&json!({ "doctorId": doctor.id, "accessLevel": "readWrite" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // 4. The doctor writes an encrypted record and reads it back decrypted.
    let response = doctor_request(&env, &doctor, reqwest::Method::POST, "/api/doctor/records")
        .json(&json!({
            "patientId": patient.id,
            "recordType": "general",
            "diagnosis": "Hypertension stage 1",
            "prescription": "Amlodipine 5mg",
            "shouldEncrypt": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["isEncrypted"], json!(true));
    assert_eq!(body["data"]["diagnosis"], json!("[Encrypted]"));
    let record_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = doctor_request(
        &env,
        &doctor,
        reqwest::Method::GET,
        &format!("/api/doctor/records/{record_id}/decrypted"),
    )
    .send()
    .await
    .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["diagnosis"], json!("Hypertension stage 1"));

    // 5. Two-step revoke: first call downgrades, second deactivates.
    let response = patient_request(
        &env,
        &patient,
        reqwest::Method::DELETE,
        &format!("/api/patient/access-grants/{}", doctor.id),
    )
    .send()
    .await
    .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], json!("Access restricted to read-only successfully"));

    // Downgraded: record creation is now rejected.
    let response = doctor_request(&env, &doctor, reqwest::Method::POST, "/api/doctor/records")
        .json(&json!({ "patientId": patient.id, "diagnosis": "follow-up" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = patient_request(
        &env,
        &patient,
        reqwest::Method::DELETE,
        &format!("/api/patient/access-grants/{}", doctor.id),
    )
    .send()
    .await
    .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], json!("Access completely revoked successfully"));

    // 6. History survives the revocation and is flagged inactive.
    let response = doctor_request(&env, &doctor, reqwest::Method::GET, "/api/doctor/patients/history")
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    let entry = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|entry| entry["patientId"] == json!(patient.id))
        .expect("history entry should survive revocation");
    assert_eq!(entry["hasActiveAccess"], json!(false));
    assert!(entry["accessRevokedAt"].is_string());

    // 7. The access code reopens the door at readWrite.
    let response = doctor_request(&env, &doctor, reqwest::Method::POST, "/api/doctor/patient-access")
        .json(&json!({ "patientId": patient.id, "accessCode": patient.access_code }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["accessMethod"], json!("access_code"));
    assert_eq!(body["patientDetails"]["hasFullAccess"], json!(true));
}

#[tokio::test]
async fn wrong_code_is_a_hard_deny_without_a_request() {
    let Some(env) = setup().await else { return };
    let patient = seed_patient(&env.pool).await;
    let doctor = seed_doctor(&env.pool, "H1", "D1").await;

    let response = doctor_request(&env, &doctor, reqwest::Method::POST, "/api/doctor/patient-access")
        .json(&json!({ "patientId": patient.id, "accessCode": "000000000000" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = patient_request(&env, &patient, reqwest::Method::GET, "/api/patient/access-requests")
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], json!(0));
}

#[tokio::test]
async fn policy_gate_refuses_transferred_doctor_despite_grant() {
    let Some(env) = setup().await else { return };
    let patient = seed_patient(&env.pool).await;
    let author = seed_doctor(&env.pool, "H1", "D1").await;

    // Author holds readWrite and seals a record under H1/D1.
    let response = patient_request(&env, &patient, reqwest::Method::POST, "/api/patient/access-grants")
        .json(&json!({ "doctorId": author.id }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = doctor_request(&env, &author, reqwest::Method::POST, "/api/doctor/records")
        .json(&json!({
            "patientId": patient.id,
            "diagnosis": "Asthma",
            "shouldEncrypt": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    let record_id = body["data"]["id"].as_str().unwrap().to_string();

    // The same doctor, after a department transfer, still has the grant but
    // fails the record policy: 412, distinct from 403.
    let transferred = SeededDoctor {
        department_code: "D2".to_string(),
        hospital_code: author.hospital_code.clone(),
        id: author.id,
        user_id: author.user_id,
    };
    let response = doctor_request(
        &env,
        &transferred,
        reqwest::Method::GET,
        &format!("/api/doctor/records/{record_id}/decrypted"),
    )
    .send()
    .await
    .unwrap();
    assert_eq!(response.status(), 412);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], json!("policy_denied"));

    // Back in the original department the payload opens.
    let response = doctor_request(
        &env,
        &author,
        reqwest::Method::GET,
        &format!("/api/doctor/records/{record_id}/decrypted"),
    )
    .send()
    .await
    .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["diagnosis"], json!("Asthma"));
}
