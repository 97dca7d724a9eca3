#![forbid(unsafe_code)]

// Participant session: the two loops driving one authenticated, joined
// participant's duplex chat stream.
//
// Ingress reads frames off the socket and hands them to the broadcast
// engine; egress drains the participant's queue onto the socket. Either
// loop ending cancels the shared token; the other loop observes it at its
// next suspension point. Both tasks are joined before membership is
// removed, so no task outlives its session.

use super::protocol::{ClientFrame, ServerFrame};
use crate::auth::middleware::RoomIdentity;
use crate::metrics::ServerMetrics;
use crate::room::{Message, RegistryError, RoomRegistry};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Drives one chat stream to completion, then removes the participant.
pub async fn run(
    socket: WebSocket,
    registry: Arc<RoomRegistry>,
    metrics: ServerMetrics,
    identity: RoomIdentity,
) {
    let RoomIdentity {
        short_code,
        participant,
    } = identity;

    info!(
        "Participant [{}] opened chat stream for room [{}]",
        participant, short_code
    );
    let _conn_guard = metrics.connection_active_guard();

    let (ws_tx, ws_rx) = socket.split();
    let stop = CancellationToken::new();

    let ingress = tokio::spawn(ingress_loop(
        ws_rx,
        Arc::clone(&registry),
        short_code.clone(),
        participant.clone(),
        stop.clone(),
        metrics.clone(),
    ));
    let egress = tokio::spawn(egress_loop(
        ws_tx,
        Arc::clone(&registry),
        short_code.clone(),
        participant.clone(),
        stop.clone(),
        metrics.clone(),
    ));

    // Join both loops before touching membership; a loop may still be
    // draining its last frame after the stop signal fires.
    let _ = ingress.await;
    let _ = egress.await;

    // The room may already be gone (concurrent delete) — that is a normal
    // teardown path, not an error.
    if registry.remove_member(&short_code, &participant).is_ok() {
        metrics.inc_leaves();
    }

    info!(
        "Closed chat stream for participant [{}] in room [{}]",
        participant, short_code
    );
}

async fn ingress_loop(
    mut ws_rx: SplitStream<WebSocket>,
    registry: Arc<RoomRegistry>,
    short_code: String,
    participant: String,
    stop: CancellationToken,
    metrics: ServerMetrics,
) {
    loop {
        let frame = tokio::select! {
            _ = stop.cancelled() => break,
            frame = ws_rx.next() => frame,
        };

        match frame {
            Some(Ok(WsMessage::Text(text))) => {
                metrics.inc_messages_received();
                match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::Message { body }) => {
                        let message = Message {
                            sender: participant.clone(),
                            body,
                        };
                        let start = Instant::now();
                        let result = registry.broadcast(&short_code, &message).await;
                        metrics.observe_broadcast(start.elapsed());
                        if let Err(e) = result {
                            // Room vanished mid-session; unwind like a normal stop.
                            info!(
                                "Stopping ingress for [{}]: room [{}] is gone ({})",
                                participant, short_code, e
                            );
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Invalid frame from participant [{}] in room [{}]: {}",
                            participant, short_code, e
                        );
                        metrics.inc_errors();
                    }
                }
            }
            // Client-initiated close is the expected leave path.
            Some(Ok(WsMessage::Close(_))) | None => {
                info!(
                    "Participant [{}] left room [{}]",
                    participant, short_code
                );
                break;
            }
            Some(Ok(_)) => {
                // Ping/pong handled by the transport; binary frames ignored.
            }
            Some(Err(e)) => {
                error!(
                    "Failed to receive from participant [{}] in room [{}]: {}",
                    participant, short_code, e
                );
                metrics.inc_errors();
                break;
            }
        }
    }

    stop.cancel();
    debug!("Ingress loop finished for participant [{}]", participant);
}

async fn egress_loop(
    mut ws_tx: SplitSink<WebSocket, WsMessage>,
    registry: Arc<RoomRegistry>,
    short_code: String,
    participant: String,
    stop: CancellationToken,
    metrics: ServerMetrics,
) {
    loop {
        let next = tokio::select! {
            _ = stop.cancelled() => break,
            next = registry.next_message(&short_code, &participant) => next,
        };

        match next {
            Ok(message) => {
                let frame = ServerFrame::Message {
                    sender: message.sender,
                    body: message.body,
                };
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("Failed to serialize outbound frame: {}", e);
                        metrics.inc_errors();
                        break;
                    }
                };
                if let Err(e) = ws_tx.send(WsMessage::Text(json.into())).await {
                    error!(
                        "Failed to send to participant [{}] in room [{}]: {}",
                        participant, short_code, e
                    );
                    metrics.inc_errors();
                    break;
                }
                metrics.inc_messages_sent();
            }
            // Queue closed or room/membership gone: the session is winding
            // down from the registry side. Same unwind as a normal stop.
            Err(RegistryError::QueueClosed)
            | Err(RegistryError::RoomNotFound(_))
            | Err(RegistryError::MemberNotFound(_)) => {
                debug!(
                    "Stopping egress for participant [{}] in room [{}]: queue closed",
                    participant, short_code
                );
                break;
            }
            Err(e) => {
                error!(
                    "Unexpected dequeue failure for participant [{}] in room [{}]: {}",
                    participant, short_code, e
                );
                metrics.inc_errors();
                break;
            }
        }
    }

    stop.cancel();
    let _ = ws_tx.close().await;
    debug!("Egress loop finished for participant [{}]", participant);
}
