#![forbid(unsafe_code)]

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authentication and authorization failures, mapped to HTTP statuses at
/// the transport edge. Handlers never see an unauthorized call.
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
    TokenExpired,
    WrongTokenKind,
    RoomNotFound(String),
    NotAMember(String),
    InvalidCredentials,
    NameTaken,
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "Missing authorization token".to_string(),
            ),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),
            AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired".to_string()),
            AuthError::WrongTokenKind => (
                StatusCode::UNAUTHORIZED,
                "Token kind not valid for this operation".to_string(),
            ),
            AuthError::RoomNotFound(code) => (
                StatusCode::NOT_FOUND,
                format!("Room with short code [{code}] not found"),
            ),
            AuthError::NotAMember(code) => (
                StatusCode::FORBIDDEN,
                format!("No permission to access room with short code [{code}]"),
            ),
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Invalid name or password".to_string(),
            ),
            AuthError::NameTaken => (StatusCode::CONFLICT, "Name already registered".to_string()),
            AuthError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize, Clone)]
pub struct UserInfo {
    pub id: Uuid,
    pub name: String,
    pub role: String,
}
