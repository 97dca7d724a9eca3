#![forbid(unsafe_code)]

use crate::auth::{password, token, types::*};
use crate::server::ChatServer;
use axum::{extract::State, Json};
use tracing::{info, warn};

fn validate_credentials(name: &str, pass: &str) -> Result<(), AuthError> {
    if name.is_empty() || name.len() > 64 {
        return Err(AuthError::InvalidCredentials);
    }
    if pass.len() < 8 || pass.len() > 128 {
        return Err(AuthError::InvalidCredentials);
    }
    Ok(())
}

/// POST /api/auth/register
pub async fn register(
    State(server): State<ChatServer>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    validate_credentials(&req.name, &req.password)?;

    let hash = password::hash(&req.password)
        .map_err(|e| AuthError::Internal(format!("hash error: {e}")))?;

    let user = server
        .users()
        .register(&req.name, &hash)
        .ok_or(AuthError::NameTaken)?;

    let token = token::issue_account_token(
        user.id,
        &user.name,
        &user.role,
        server.token_lifetime(),
        server.secret(),
    )?;

    info!("Registered account [{}] ({})", user.name, user.id);

    Ok(Json(AuthResponse {
        token,
        user: UserInfo {
            id: user.id,
            name: user.name,
            role: user.role,
        },
    }))
}

/// POST /api/auth/login
pub async fn login(
    State(server): State<ChatServer>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let user = server
        .users()
        .get(&req.name)
        .ok_or(AuthError::InvalidCredentials)?;

    let valid = password::verify(&req.password, &user.password_hash)
        .map_err(|e| AuthError::Internal(format!("verify error: {e}")))?;
    if !valid {
        warn!("Failed login attempt for [{}]", req.name);
        return Err(AuthError::InvalidCredentials);
    }

    let token = token::issue_account_token(
        user.id,
        &user.name,
        &user.role,
        server.token_lifetime(),
        server.secret(),
    )?;

    info!("Account [{}] logged in", user.name);

    Ok(Json(AuthResponse {
        token,
        user: UserInfo {
            id: user.id,
            name: user.name,
            role: user.role,
        },
    }))
}
