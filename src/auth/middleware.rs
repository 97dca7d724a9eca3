#![forbid(unsafe_code)]

// Authorization middleware. Each route class is gated by the minimum proof
// of identity it requires; resolved identity lands in request extensions so
// handlers never re-parse the token. Streams are authorized once, at
// upgrade time, through the same layer.

use crate::auth::token::{self, Claims};
use crate::auth::types::AuthError;
use crate::room::RoomRegistry;
use crate::server::ChatServer;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Resolved identity of an account-token caller.
#[derive(Debug, Clone)]
pub struct AccountIdentity {
    pub id: Uuid,
    pub name: String,
    pub role: String,
}

/// Resolved identity of a room-token caller: which room, which participant.
#[derive(Debug, Clone)]
pub struct RoomIdentity {
    pub short_code: String,
    pub participant: String,
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AuthError::MissingToken)
}

/// Gate for account-token-required routes (create/join/delete room).
pub async fn require_account_token(
    State(server): State<ChatServer>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers())?;
    let identity = authorize_account_token(token, server.secret())?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Gate for room-token-required routes (member list, chat stream).
pub async fn require_room_token(
    State(server): State<ChatServer>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(req.headers())?;
    let identity = authorize_room_token(server.registry(), token, server.secret())?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

pub(crate) fn authorize_account_token(
    token: &str,
    secret: &str,
) -> Result<AccountIdentity, AuthError> {
    match token::verify(token, secret)? {
        Claims::Account { id, name, role, .. } => Ok(AccountIdentity { id, name, role }),
        Claims::Room { .. } => Err(AuthError::WrongTokenKind),
    }
}

/// Verifies a room token and re-validates the membership it claims: a room
/// token is only meaningful while the named participant is still a member
/// of the named room.
pub(crate) fn authorize_room_token(
    registry: &RoomRegistry,
    token: &str,
    secret: &str,
) -> Result<RoomIdentity, AuthError> {
    let (name, short_code) = match token::verify(token, secret)? {
        Claims::Room { name, short_code } => (name, short_code),
        Claims::Account { .. } => return Err(AuthError::WrongTokenKind),
    };

    if !registry.room_exists(&short_code) {
        return Err(AuthError::RoomNotFound(short_code));
    }

    match registry.is_member(&short_code, &name) {
        Ok(true) => Ok(RoomIdentity {
            short_code,
            participant: name,
        }),
        Ok(false) => Err(AuthError::NotAMember(short_code)),
        // The room vanished between the two checks.
        Err(_) => Err(AuthError::RoomNotFound(short_code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SECRET: &str = "test-secret-at-least-32-bytes-long!!";

    fn registry_with_member() -> RoomRegistry {
        let registry = RoomRegistry::new(16);
        registry
            .create_room("ABC123", "general", "pw123", "alice")
            .unwrap();
        registry.add_member("ABC123", "alice").unwrap();
        registry
    }

    #[test]
    fn member_with_room_token_is_authorized() {
        let registry = registry_with_member();
        let token = token::issue_room_token("alice", "ABC123", SECRET).unwrap();

        let identity = authorize_room_token(&registry, &token, SECRET).unwrap();
        assert_eq!(identity.short_code, "ABC123");
        assert_eq!(identity.participant, "alice");
    }

    #[test]
    fn vanished_room_is_not_found() {
        let registry = registry_with_member();
        let token = token::issue_room_token("alice", "ABC123", SECRET).unwrap();
        registry.delete_room("ABC123", "alice").unwrap();

        assert!(matches!(
            authorize_room_token(&registry, &token, SECRET),
            Err(AuthError::RoomNotFound(_))
        ));
    }

    #[test]
    fn evicted_member_is_denied_not_not_found() {
        let registry = registry_with_member();
        let token = token::issue_room_token("alice", "ABC123", SECRET).unwrap();
        registry.remove_member("ABC123", "alice").unwrap();

        assert!(matches!(
            authorize_room_token(&registry, &token, SECRET),
            Err(AuthError::NotAMember(_))
        ));
    }

    #[test]
    fn account_token_is_rejected_on_room_routes() {
        let registry = registry_with_member();
        let token = token::issue_account_token(
            Uuid::new_v4(),
            "alice",
            "user",
            Duration::from_secs(900),
            SECRET,
        )
        .unwrap();

        assert!(matches!(
            authorize_room_token(&registry, &token, SECRET),
            Err(AuthError::WrongTokenKind)
        ));
    }

    #[test]
    fn room_token_is_rejected_on_account_routes() {
        let token = token::issue_room_token("alice", "ABC123", SECRET).unwrap();
        assert!(matches!(
            authorize_account_token(&token, SECRET),
            Err(AuthError::WrongTokenKind)
        ));
    }
}
