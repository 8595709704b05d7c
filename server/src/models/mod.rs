pub mod access;
pub mod audit;
pub mod people;
pub mod record;

pub use access::{
    AccessGrant, AccessLevel, AccessMethod, AccessRequest, DoctorPatientHistory, GrantWithDoctor,
    RequestStatus, RequestWithDoctor, RequestWithPatient, RevocationStep,
};
pub use audit::{AuditAction, AuditEntity};
pub use people::{Doctor, DoctorSummary, Patient, PatientSummary};
pub use record::{MedicalRecord, RecordType, ENCRYPTED_PLACEHOLDER};
