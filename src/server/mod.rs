#![forbid(unsafe_code)]

// Server module - HTTP/WS transport front for the room broker

pub mod protocol;
pub mod session;

use crate::auth::middleware::{self, AccountIdentity, RoomIdentity};
use crate::auth::token;
use crate::config::ServerConfig;
use crate::metrics::ServerMetrics;
use crate::room::{RegistryError, RoomRegistry};
use crate::shortcode::ShortCodeGenerator;
use crate::users::UserStore;
use axum::{
    extract::{ws::WebSocketUpgrade, Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Retries for the astronomically-unlikely short code collision.
const SHORT_CODE_ATTEMPTS: usize = 3;

/// Shared server state: registry, accounts, metrics, configuration.
#[derive(Clone)]
pub struct ChatServer {
    registry: Arc<RoomRegistry>,
    users: Arc<UserStore>,
    short_codes: ShortCodeGenerator,
    metrics: ServerMetrics,
    config: Arc<ServerConfig>,
}

impl ChatServer {
    pub fn new(
        registry: Arc<RoomRegistry>,
        users: Arc<UserStore>,
        metrics: ServerMetrics,
        config: ServerConfig,
    ) -> Self {
        Self {
            registry,
            users,
            short_codes: ShortCodeGenerator::new(config.short_code_length),
            metrics,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    pub fn users(&self) -> &UserStore {
        &self.users
    }

    pub fn secret(&self) -> &str {
        &self.config.secret
    }

    pub fn token_lifetime(&self) -> Duration {
        self.config.token_lifetime
    }

    /// Builds the route tree. Each route class carries exactly the
    /// authorization layer it requires; handlers behind a layer never see
    /// an unauthorized call.
    pub fn router(self) -> Router {
        let account_routes = Router::new()
            .route("/api/rooms", post(create_room))
            .route("/api/rooms/{code}/join", post(join_room))
            .route("/api/rooms/{code}", delete(delete_room))
            .route_layer(from_fn_with_state(
                self.clone(),
                middleware::require_account_token,
            ));

        let room_routes = Router::new()
            .route("/api/room/members", get(list_members))
            .route("/ws/chat", get(ws_handler))
            .route_layer(from_fn_with_state(
                self.clone(),
                middleware::require_room_token,
            ));

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/api/auth/register", post(crate::auth::routes::register))
            .route("/api/auth/login", post(crate::auth::routes::login))
            .merge(account_routes)
            .merge(room_routes)
            .with_state(self)
            .layer(CorsLayer::permissive())
    }

    /// Binds the listen port and serves until the process is stopped.
    pub async fn serve(self, port: u16) -> anyhow::Result<()> {
        let addr = format!("0.0.0.0:{port}");
        info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

/// Registry errors translated to transport status codes at the edge.
pub(crate) enum ApiError {
    Registry(RegistryError),
    InvalidRequest(&'static str),
    Internal(String),
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::Registry(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Registry(err) => {
                let status = match &err {
                    RegistryError::RoomNotFound(_) | RegistryError::MemberNotFound(_) => {
                        StatusCode::NOT_FOUND
                    }
                    RegistryError::RoomAlreadyExists(_) | RegistryError::MemberAlreadyExists(_) => {
                        StatusCode::CONFLICT
                    }
                    RegistryError::InvalidPassword | RegistryError::NotOwner => {
                        StatusCode::FORBIDDEN
                    }
                    RegistryError::QueueClosed | RegistryError::Hash(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.to_string())
            }
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
            ApiError::Internal(msg) => {
                warn!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub short_code: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct JoinRoomResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    pub members: Vec<String>,
}

/// POST /api/rooms — account token required; the caller becomes the owner.
async fn create_room(
    State(server): State<ChatServer>,
    Extension(account): Extension<AccountIdentity>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>, ApiError> {
    if req.name.is_empty() || req.name.len() > 128 {
        return Err(ApiError::InvalidRequest("room name must be 1-128 characters"));
    }

    for _ in 0..SHORT_CODE_ATTEMPTS {
        let short_code = server.short_codes.generate();
        match server
            .registry
            .create_room(&short_code, &req.name, &req.password, &account.name)
        {
            Ok(()) => {
                server.metrics.inc_rooms_created();
                return Ok(Json(CreateRoomResponse { short_code }));
            }
            Err(RegistryError::RoomAlreadyExists(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(ApiError::Internal(
        "failed to generate a unique short code".to_string(),
    ))
}

/// POST /api/rooms/{code}/join — account token required. The account name
/// becomes the participant name; success yields a room-scoped token.
async fn join_room(
    State(server): State<ChatServer>,
    Path(short_code): Path<String>,
    Extension(account): Extension<AccountIdentity>,
    Json(req): Json<JoinRoomRequest>,
) -> Result<Json<JoinRoomResponse>, ApiError> {
    server.registry.check_password(&short_code, &req.password)?;
    server.registry.add_member(&short_code, &account.name)?;

    let token = token::issue_room_token(&account.name, &short_code, server.secret())
        .map_err(|e| ApiError::Internal(format!("token issue failed: {e:?}")))?;

    server.metrics.inc_joins();
    Ok(Json(JoinRoomResponse { token }))
}

/// DELETE /api/rooms/{code} — account token required, owner-only.
async fn delete_room(
    State(server): State<ChatServer>,
    Path(short_code): Path<String>,
    Extension(account): Extension<AccountIdentity>,
) -> Result<StatusCode, ApiError> {
    server.registry.delete_room(&short_code, &account.name)?;
    server.metrics.inc_rooms_deleted();
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/room/members — room token required. Lists the other members of
/// the caller's room.
async fn list_members(
    State(server): State<ChatServer>,
    Extension(identity): Extension<RoomIdentity>,
) -> Result<Json<MembersResponse>, ApiError> {
    let members = server
        .registry
        .list_members(&identity.short_code)?
        .into_iter()
        .filter(|name| name != &identity.participant)
        .collect();

    Ok(Json(MembersResponse { members }))
}

/// GET /ws/chat — room token required; authorized once at upgrade time.
async fn ws_handler(
    State(server): State<ChatServer>,
    Extension(identity): Extension<RoomIdentity>,
    ws: WebSocketUpgrade,
) -> Response {
    server.metrics.inc_connections_total();

    let registry = Arc::clone(&server.registry);
    let metrics = server.metrics.clone();

    ws.on_failed_upgrade(|error| {
        warn!("WebSocket upgrade failed: {}", error);
    })
    .on_upgrade(move |socket| session::run(socket, registry, metrics, identity))
}

/// Health check handler
async fn health_handler(State(server): State<ChatServer>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "rooms": server.registry.room_count(),
        "participants": server.registry.total_member_count(),
    }))
}

/// Metrics handler — Prometheus text exposition format.
async fn metrics_handler(State(server): State<ChatServer>) -> Response {
    let body = server.metrics.render_prometheus(
        server.registry.room_count(),
        server.registry.total_member_count(),
    );
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}
