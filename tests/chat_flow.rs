#![forbid(unsafe_code)]

// End-to-end flow against a served ephemeral port: accounts, room
// lifecycle, and the duplex chat stream.

use futures_util::{SinkExt, StreamExt};
use roomcast::config::ServerConfig;
use roomcast::metrics::ServerMetrics;
use roomcast::room::RoomRegistry;
use roomcast::server::ChatServer;
use roomcast::users::UserStore;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const SECRET: &str = "e2e-test-secret-at-least-32-bytes!!!";

async fn spawn_server() -> SocketAddr {
    let config = ServerConfig {
        port: 0,
        secret: SECRET.to_string(),
        short_code_length: 6,
        max_queue_size: 16,
        token_lifetime: Duration::from_secs(900),
    };

    let server = ChatServer::new(
        Arc::new(RoomRegistry::new(config.max_queue_size)),
        Arc::new(UserStore::new()),
        ServerMetrics::new(),
        config,
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, server.router()).await.unwrap();
    });
    addr
}

async fn register(client: &reqwest::Client, addr: SocketAddr, name: &str) -> String {
    let resp = client
        .post(format!("http://{addr}/api/auth/register"))
        .json(&json!({ "name": name, "password": format!("{name}-password") }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["token"].as_str().unwrap().to_string()
}

async fn join(
    client: &reqwest::Client,
    addr: SocketAddr,
    account_token: &str,
    short_code: &str,
    password: &str,
) -> reqwest::Response {
    client
        .post(format!("http://{addr}/api/rooms/{short_code}/join"))
        .bearer_auth(account_token)
        .json(&json!({ "password": password }))
        .send()
        .await
        .unwrap()
}

async fn connect_chat(
    addr: SocketAddr,
    room_token: &str,
) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
    let mut request = format!("ws://{addr}/ws/chat").into_client_request().unwrap();
    request.headers_mut().insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {room_token}")).unwrap(),
    );
    let (stream, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    stream
}

#[tokio::test]
async fn full_chat_flow() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    // Accounts
    let alice_account = register(&client, addr, "alice").await;
    let bob_account = register(&client, addr, "bob").await;

    // Duplicate account name is a conflict
    let resp = client
        .post(format!("http://{addr}/api/auth/register"))
        .json(&json!({ "name": "alice", "password": "irrelevant-pw" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Login works after registration
    let resp = client
        .post(format!("http://{addr}/api/auth/login"))
        .json(&json!({ "name": "alice", "password": "alice-password" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Room creation requires an account token
    let resp = client
        .post(format!("http://{addr}/api/rooms"))
        .json(&json!({ "name": "general", "password": "pw123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(format!("http://{addr}/api/rooms"))
        .bearer_auth(&alice_account)
        .json(&json!({ "name": "general", "password": "pw123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let short_code = body["shortCode"].as_str().unwrap().to_string();
    assert_eq!(short_code.len(), 6);

    // Wrong password is denied; unknown room is not found
    assert_eq!(join(&client, addr, &bob_account, &short_code, "nope").await.status(), 403);
    assert_eq!(join(&client, addr, &bob_account, "ZZZZZZ", "pw123").await.status(), 404);

    // Both join with the right password and get room tokens
    let resp = join(&client, addr, &alice_account, &short_code, "pw123").await;
    assert_eq!(resp.status(), 200);
    let alice_room: String = resp.json::<serde_json::Value>().await.unwrap()["token"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = join(&client, addr, &bob_account, &short_code, "pw123").await;
    assert_eq!(resp.status(), 200);
    let bob_room: String = resp.json::<serde_json::Value>().await.unwrap()["token"]
        .as_str()
        .unwrap()
        .to_string();

    // Joining twice under the same name is a conflict
    assert_eq!(join(&client, addr, &bob_account, &short_code, "pw123").await.status(), 409);

    // Member list excludes the caller
    let resp = client
        .get(format!("http://{addr}/api/room/members"))
        .bearer_auth(&bob_room)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["members"], json!(["alice"]));

    // An account token is not accepted on room-scoped routes
    let resp = client
        .get(format!("http://{addr}/api/room/members"))
        .bearer_auth(&bob_account)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Chat: alice -> bob, and never back to alice herself
    let mut alice_ws = connect_chat(addr, &alice_room).await;
    let mut bob_ws = connect_chat(addr, &bob_room).await;

    alice_ws
        .send(WsMessage::Text(
            json!({ "type": "message", "body": "hi" }).to_string().into(),
        ))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), bob_ws.next())
        .await
        .expect("bob must receive the broadcast")
        .unwrap()
        .unwrap();
    let frame: serde_json::Value = serde_json::from_str(received.to_text().unwrap()).unwrap();
    assert_eq!(frame, json!({ "type": "message", "sender": "alice", "body": "hi" }));

    let echo = tokio::time::timeout(Duration::from_millis(300), alice_ws.next()).await;
    assert!(echo.is_err(), "alice must not receive her own message");

    // Deletion is owner-only
    let resp = client
        .delete(format!("http://{addr}/api/rooms/{short_code}"))
        .bearer_auth(&bob_account)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .delete(format!("http://{addr}/api/rooms/{short_code}"))
        .bearer_auth(&alice_account)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    // Room deletion tears down bob's healthy stream from the registry side.
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(msg) = bob_ws.next().await {
            match msg {
                Ok(WsMessage::Close(_)) | Err(_) => break,
                _ => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "bob's stream must end after room deletion");

    // A room token for a deleted room is rejected with NotFound
    let resp = client
        .get(format!("http://{addr}/api/room/members"))
        .bearer_auth(&bob_room)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
