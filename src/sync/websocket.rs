use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::sync::registry::{RegistrationResult, SubscriptionRegistry};
use crate::telemetry::OwnerId;

/// Shared state for real-time channel handling
#[derive(Clone)]
pub struct SyncState {
    pub registry: SubscriptionRegistry,
    /// Per-subscriber queue depth before groups start being dropped
    pub channel_capacity: usize,
}

/// Handle WebSocket upgrade for `/ws/{user_id}`
pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    Path(user_id): Path<OwnerId>,
    State(state): State<SyncState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

/// Split the upgraded socket and serve it as one subscriber
async fn handle_socket(socket: WebSocket, owner: OwnerId, state: SyncState) {
    let (sender, receiver) = socket.split();
    serve_subscriber(state.registry, owner, state.channel_capacity, sender, receiver).await;
}

/// Serve one subscriber until either side goes away.
///
/// Registers a channel for `owner`, forwards every payload from it to `sink`,
/// and watches `stream` only for close or error. The subscriber is
/// unregistered as soon as either direction ends. When the registry is full a
/// policy-violation close frame is sent and nothing is registered.
pub async fn serve_subscriber<S, R, E>(
    registry: SubscriptionRegistry,
    owner: OwnerId,
    channel_capacity: usize,
    mut sink: S,
    mut stream: R,
) where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send,
{
    let (tx, mut rx) = mpsc::channel::<Arc<str>>(channel_capacity.max(1));

    let subscriber_id = match registry.register(owner, tx) {
        RegistrationResult::Registered(id) => id,
        RegistrationResult::AtCapacity => {
            warn!("Subscriber limit reached, rejecting owner {}", owner);
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "Server at capacity".into(),
                })))
                .await;
            return;
        }
    };

    info!("Subscriber {} connected for owner {}", subscriber_id, owner);

    // Registry -> socket
    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = sink.send(Message::Text(payload.as_ref().into())).await {
                debug!("Send to subscriber failed: {}", e);
                break;
            }
        }
    });

    // Client frames only matter for liveness
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("WebSocket error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.unregister(owner, subscriber_id);
    info!("Subscriber {} for owner {} disconnected", subscriber_id, owner);
}
