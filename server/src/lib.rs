//! carebridge: the patient-data access control subsystem of a multi-tenant
//! healthcare records platform. Decides, for every doctor/patient pair,
//! whether records may be read or written, remembers every relationship ever
//! established, and gates individual encrypted payloads behind an
//! attribute-matching policy.

pub mod access;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use access::AccessResolver;
use db::Database;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub resolver: Arc<AccessResolver>,
}

impl AppState {
    /// Wire the resolver to its stores. Construction is the only place the
    /// dependency is injected; nothing registers itself lazily.
    pub fn new(db: Arc<Database>) -> Self {
        let resolver = Arc::new(AccessResolver::new(db.clone()));
        Self { db, resolver }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Doctor-facing
        .route("/api/doctor/patient-access", post(handlers::doctor::patient_access))
        .route(
            "/api/doctor/access-requests",
            get(handlers::doctor::my_access_requests).post(handlers::doctor::request_access),
        )
        .route("/api/doctor/patients", get(handlers::doctor::my_patients))
        .route("/api/doctor/patients/history", get(handlers::doctor::history))
        .route(
            "/api/doctor/patients/:patient_id/records",
            get(handlers::doctor::patient_records),
        )
        .route("/api/doctor/records", post(handlers::records::create_record))
        .route(
            "/api/doctor/records/:id",
            put(handlers::records::update_record).delete(handlers::records::delete_record),
        )
        .route(
            "/api/doctor/records/:id/decrypted",
            get(handlers::records::decrypt_record),
        )
        // Patient-facing
        .route("/api/patient/records", get(handlers::patient::my_records))
        .route(
            "/api/patient/access-grants",
            get(handlers::patient::my_grants).post(handlers::patient::grant_access),
        )
        .route(
            "/api/patient/access-grants/:doctor_id",
            delete(handlers::patient::revoke_access),
        )
        .route("/api/patient/access-requests", get(handlers::patient::my_requests))
        .route(
            "/api/patient/access-requests/:id",
            put(handlers::patient::respond_request),
        )
        .route(
            "/api/patient/access-code",
            post(handlers::patient::regenerate_access_code),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}
