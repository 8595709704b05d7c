//! Identity extraction.
//!
//! Authentication and token issuance live in the gateway; by the time a
//! request reaches this service the gateway has verified the caller and
//! injected trusted identity headers. The extractor here only parses them.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_NAME_HEADER: &str = "x-user-name";
pub const HOSPITAL_CODE_HEADER: &str = "x-hospital-code";
pub const DEPARTMENT_CODE_HEADER: &str = "x-department-code";

/// The closed set of platform roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Doctor,
    Patient,
    Receptionist,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "doctor" => Some(Role::Doctor),
            "patient" => Some(Role::Patient),
            "receptionist" => Some(Role::Receptionist),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Patient => "patient",
            Role::Receptionist => "receptionist",
        }
    }
}

/// The authenticated identity attached to every request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
    pub username: String,
    pub hospital_code: String,
    pub department_code: String,
}

impl AuthUser {
    pub fn require_role(&self, role: Role) -> Result<(), ApiError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Role {} is not authorized for this route",
                self.role.as_str()
            )))
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, ApiError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::Forbidden(format!("Missing identity header {name}")))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, USER_ID_HEADER)?
            .parse::<Uuid>()
            .map_err(|_| ApiError::Forbidden("Malformed identity header x-user-id".to_string()))?;
        let role_raw = header(parts, USER_ROLE_HEADER)?;
        let role = Role::parse(role_raw).ok_or_else(|| {
            ApiError::Forbidden(format!("Unknown role {role_raw:?} in identity headers"))
        })?;
        let username = parts
            .headers
            .get(USER_NAME_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .unwrap_or("unknown")
            .to_string();
        // Hospital/department may legitimately be absent for patients.
        let hospital_code = parts
            .headers
            .get(HOSPITAL_CODE_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let department_code = parts
            .headers
            .get(DEPARTMENT_CODE_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Ok(AuthUser {
            id,
            role,
            username,
            hospital_code,
            department_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parsing_is_closed() {
        assert_eq!(Role::parse("doctor"), Some(Role::Doctor));
        assert_eq!(Role::parse("patient"), Some(Role::Patient));
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("receptionist"), Some(Role::Receptionist));
        assert_eq!(Role::parse("Doctor"), None);
        assert_eq!(Role::parse("superuser"), None);
    }

    #[test]
    fn require_role_rejects_other_roles() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Patient,
            username: "asha".to_string(),
            hospital_code: String::new(),
            department_code: String::new(),
        };
        assert!(user.require_role(Role::Patient).is_ok());
        assert!(matches!(
            user.require_role(Role::Doctor),
            Err(ApiError::Forbidden(_))
        ));
    }
}
