#![forbid(unsafe_code)]

// Token issue/verify. One claims union covers both token kinds so every
// caller goes through a single verification entry point.

use crate::auth::types::AuthError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Claims carried by a bearer token.
///
/// Account tokens prove a registered identity and expire on the clock.
/// Room tokens prove membership in one room and carry no expiry: they are
/// valid exactly as long as the named participant is still a member, which
/// the authorization middleware re-checks on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Claims {
    #[serde(rename_all = "camelCase")]
    Account {
        id: Uuid,
        name: String,
        role: String,
        exp: u64,
    },
    #[serde(rename_all = "camelCase")]
    Room { name: String, short_code: String },
}

fn unix_now() -> Result<u64, AuthError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| AuthError::Internal("system clock before Unix epoch".to_string()))
}

/// Issues an account-scoped token valid for `lifetime`.
pub fn issue_account_token(
    id: Uuid,
    name: &str,
    role: &str,
    lifetime: Duration,
    secret: &str,
) -> Result<String, AuthError> {
    let claims = Claims::Account {
        id,
        name: name.to_string(),
        role: role.to_string(),
        exp: unix_now()? + lifetime.as_secs(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(format!("token encode error: {e}")))
}

/// Issues a room-scoped token binding `name` to `short_code`.
pub fn issue_room_token(name: &str, short_code: &str, secret: &str) -> Result<String, AuthError> {
    let claims = Claims::Room {
        name: name.to_string(),
        short_code: short_code.to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::Internal(format!("token encode error: {e}")))
}

/// Verifies signature and (for account tokens) expiry, returning the claims.
pub fn verify(token: &str, secret: &str) -> Result<Claims, AuthError> {
    // Room tokens carry no exp claim, so the library-level exp check is off
    // and account expiry is enforced below.
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AuthError::InvalidToken)?;

    if let Claims::Account { exp, .. } = &data.claims {
        if *exp <= unix_now()? {
            return Err(AuthError::TokenExpired);
        }
    }

    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-at-least-32-bytes-long!!";

    #[test]
    fn account_token_round_trip() {
        let id = Uuid::new_v4();
        let token =
            issue_account_token(id, "alice", "user", Duration::from_secs(900), SECRET).unwrap();
        match verify(&token, SECRET).unwrap() {
            Claims::Account { id: got, name, role, .. } => {
                assert_eq!(got, id);
                assert_eq!(name, "alice");
                assert_eq!(role, "user");
            }
            other => panic!("expected account claims, got {other:?}"),
        }
    }

    #[test]
    fn room_token_round_trip() {
        let token = issue_room_token("bob", "ABC123", SECRET).unwrap();
        match verify(&token, SECRET).unwrap() {
            Claims::Room { name, short_code } => {
                assert_eq!(name, "bob");
                assert_eq!(short_code, "ABC123");
            }
            other => panic!("expected room claims, got {other:?}"),
        }
    }

    #[test]
    fn wrong_secret_rejects() {
        let token = issue_room_token("bob", "ABC123", "secret-1").unwrap();
        assert!(matches!(
            verify(&token, "secret-2"),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_token_rejects() {
        assert!(matches!(
            verify("not.a.token", SECRET),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn expired_account_token_rejects() {
        let token =
            issue_account_token(Uuid::new_v4(), "alice", "user", Duration::ZERO, SECRET).unwrap();
        assert!(matches!(verify(&token, SECRET), Err(AuthError::TokenExpired)));
    }

    #[test]
    fn room_token_never_expires_on_the_clock() {
        let token = issue_room_token("bob", "ABC123", SECRET).unwrap();
        // No exp claim at all; verification must not demand one.
        assert!(verify(&token, SECRET).is_ok());
    }
}
