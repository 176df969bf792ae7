//! Authentication module: JWT bearer auth, Argon2id password hashing, and the
//! constant-time setup-key gate for admin bootstrap.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::errors::AppError;
use crate::models::Role;

/// Header name for the admin bootstrap key.
pub const SETUP_KEY_HEADER: &str = "x-setup-key";

/// JWT claims carried by every authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User account id
    pub sub: String,
    /// Login username (the member's email)
    pub username: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Reject non-admin callers.
    pub fn require_admin(&self) -> Result<(), AppError> {
        match self.role {
            Role::Admin => Ok(()),
            _ => Err(AppError::Forbidden("Admin role required".to_string())),
        }
    }

    /// The login key for self-service operations; admins have no member profile.
    pub fn member_login_key(&self) -> Result<&str, AppError> {
        match self.role {
            Role::Member => Ok(&self.username),
            _ => Err(AppError::Forbidden(
                "Only members have a profile".to_string(),
            )),
        }
    }
}

/// Issue a signed access token for a login identity.
pub fn issue_token(
    secret: &str,
    ttl_minutes: i64,
    user_id: &str,
    username: &str,
    role: Role,
    member_id: Option<String>,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        role,
        member_id,
        iat: now.timestamp(),
        exp: (now + chrono::Duration::minutes(ttl_minutes)).timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Failed to encode token: {}", e)))
}

/// Verify a bearer token and return its claims.
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))
}

/// JWT authentication layer. Extracts the bearer token, verifies it, and
/// stores the claims in request extensions for handlers to pick up.
pub async fn jwt_auth_layer(secret: String, mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string);

    match token {
        Some(token) => match verify_token(&secret, &token) {
            Ok(claims) => {
                request.extensions_mut().insert(claims);
                next.run(request).await
            }
            Err(err) => err.into_response(),
        },
        None => AppError::Unauthorized("Missing bearer token".to_string()).into_response(),
    }
}

/// Hash a plaintext password using Argon2id with a random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))?;

    Ok(hash.to_string())
}

/// Verify a plaintext password against a stored Argon2id hash.
///
/// Returns `Ok(true)` if the password matches, `Ok(false)` if not.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash format: {}", e)))?;

    let argon2 = Argon2::default();
    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AppError::Internal(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}

/// Generate a temporary password for a freshly registered member.
pub fn generate_temp_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

/// Perform constant-time string comparison (setup-key gate).
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    a_bytes.ct_eq(b_bytes).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare_equal() {
        assert!(constant_time_compare("test-key-123", "test-key-123"));
    }

    #[test]
    fn test_constant_time_compare_not_equal() {
        assert!(!constant_time_compare("test-key-123", "test-key-124"));
    }

    #[test]
    fn test_constant_time_compare_different_lengths() {
        assert!(!constant_time_compare("short", "much-longer-key"));
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(verify_password("s3cret-pass", &hash).unwrap());
        assert!(!verify_password("wrong-pass", &hash).unwrap());
    }

    #[test]
    fn token_round_trip_preserves_claims() {
        let token = issue_token(
            "unit-secret",
            30,
            "u-1",
            "alice@example.com",
            Role::Member,
            Some("m-1".to_string()),
        )
        .unwrap();

        let claims = verify_token("unit-secret", &token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.username, "alice@example.com");
        assert_eq!(claims.role, Role::Member);
        assert_eq!(claims.member_id.as_deref(), Some("m-1"));
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let token =
            issue_token("secret-a", 30, "u-1", "alice@example.com", Role::Admin, None).unwrap();
        assert!(verify_token("secret-b", &token).is_err());
    }

    #[test]
    fn temp_password_is_alphanumeric() {
        let pwd = generate_temp_password();
        assert_eq!(pwd.len(), 12);
        assert!(pwd.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
