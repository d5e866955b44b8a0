//! User, role and token-session models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What a role is allowed to do. Checked at the boundary, never dispatched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Create and list companies (tenants)
    ManageCompanies,
    /// Scan badges, create employees and attach notes
    CaptureNotes,
    /// Read the company's notes and employees
    ViewNotes,
    /// Download the company's note report
    ExportNotes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

const ADMIN_CAPABILITIES: &[Capability] = &[Capability::ManageCompanies];

const USER_CAPABILITIES: &[Capability] = &[
    Capability::CaptureNotes,
    Capability::ViewNotes,
    Capability::ExportNotes,
];

impl Role {
    /// The fixed capability set of this role
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Admin => ADMIN_CAPABILITIES,
            Role::User => USER_CAPABILITIES,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::User => write!(f, "user"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub company_id: String,
    pub role: String,
    pub created_at: String,
}

impl User {
    /// Get the role as a Role enum. Unknown values get the least privileged role.
    pub fn role_enum(&self) -> Role {
        self.role.parse().unwrap_or(Role::User)
    }
}

/// Public view of a user, as sent over the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub company_id: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            role: user.role_enum(),
            id: user.id,
            email: user.email,
            company_id: user.company_id,
        }
    }
}

/// Server-side record of an issued bearer token
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuthSession {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub company_id: String,
    #[serde(default)]
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: UserResponse,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_capabilities_are_disjoint() {
        assert!(Role::Admin.allows(Capability::ManageCompanies));
        assert!(!Role::Admin.allows(Capability::CaptureNotes));
        assert!(Role::User.allows(Capability::CaptureNotes));
        assert!(Role::User.allows(Capability::ExportNotes));
        assert!(!Role::User.allows(Capability::ManageCompanies));
    }

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::User.to_string(), "user");
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_unknown_stored_role_is_least_privileged() {
        let user = User {
            id: "u1".into(),
            email: "a@b.c".into(),
            password_hash: String::new(),
            company_id: "c1".into(),
            role: "superuser".into(),
            created_at: String::new(),
        };
        assert_eq!(user.role_enum(), Role::User);
        assert_eq!(UserResponse::from(user).role, Role::User);
    }

    #[test]
    fn test_role_wire_format() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
    }
}
