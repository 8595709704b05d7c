use serde_json::Value;
use uuid::Uuid;

use super::Database;
use crate::models::{AuditAction, AuditEntity};

impl Database {
    /// Append an audit fact. This subsystem only writes them; the audit
    /// service owns the read surface.
    pub async fn insert_audit(
        &self,
        user_id: Uuid,
        username: &str,
        action: AuditAction,
        entity: AuditEntity,
        entity_id: Option<String>,
        description: &str,
        metadata: Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO audit_log
                 (id, user_id, username, action, entity_type, entity_id, description,
                  metadata, recorded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(username)
        .bind(action.as_str())
        .bind(entity.as_str())
        .bind(entity_id)
        .bind(description)
        .bind(metadata)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
