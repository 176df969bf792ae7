//! Login identity model: the credential record keyed by a member's email.

use serde::{Deserialize, Serialize};

/// Role attached to a login identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "MEMBER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "MEMBER" => Some(Role::Member),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Credential/role record for authentication. `user_name` equals the
/// member's email and must be kept in sync when an email change is approved,
/// or the member can no longer sign in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: String,
    pub user_name: String,
    /// Argon2id hash; never serialized into responses.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    /// Forces a password reset on first login after registration.
    pub must_change_password: bool,
    /// Back-reference to the member profile; admins have none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
}
