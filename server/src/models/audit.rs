/// Audit facts emitted by the subsystem. Write-only here; a separate
/// service owns the read surface.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
    Other,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Read => "READ",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::Other => "OTHER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEntity {
    Patient,
    MedicalRecord,
    AccessGrant,
    AccessRequest,
    System,
}

impl AuditEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntity::Patient => "PATIENT",
            AuditEntity::MedicalRecord => "MEDICAL_RECORD",
            AuditEntity::AccessGrant => "ACCESS_GRANT",
            AuditEntity::AccessRequest => "ACCESS_REQUEST",
            AuditEntity::System => "SYSTEM",
        }
    }
}
