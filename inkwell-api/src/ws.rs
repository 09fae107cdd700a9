//! WebSocket Transport
//!
//! One socket carries three kinds of traffic:
//!
//! - client requests `{ service, action, params, seq? }`, dispatched through
//!   the same pipeline as REST and answered with
//!   `{ type: "response", seq, requestId, data | error }`;
//! - change notifications `{ type: "notification", service, event, data }`
//!   for every successful mutation, whoever made it;
//! - greeting frames produced by each service's `after_connection` hook
//!   when the socket opens.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use inkwell_core::AuthUser;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::context::RawRequest;
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::ApiError;
use crate::events::Transport;
use crate::middleware::MaybeUser;
use crate::service::Params;
use crate::telemetry::metrics;

/// Outgoing replies buffered per connection.
const REPLY_BUFFER: usize = 64;

/// A request frame sent by the client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    pub service: String,
    pub action: String,
    #[serde(default)]
    pub params: Params,
    /// Echoed back on the reply.
    #[serde(default)]
    pub seq: Option<JsonValue>,
}

/// Reply frame for a dispatched request.
pub fn response_frame(seq: Option<JsonValue>, outcome: DispatchOutcome) -> JsonValue {
    let seq = seq.unwrap_or(JsonValue::Null);
    match outcome.result {
        Ok(data) => json!({
            "type": "response",
            "seq": seq,
            "requestId": outcome.request_id,
            "data": data,
        }),
        Err(error) => json!({
            "type": "response",
            "seq": seq,
            "requestId": outcome.request_id,
            "error": error,
        }),
    }
}

/// Reply frame for input that never reached the dispatcher.
fn rejection_frame(error: ApiError) -> JsonValue {
    json!({ "type": "response", "seq": JsonValue::Null, "error": error })
}

/// Run one client frame through the dispatcher.
pub async fn handle_frame(dispatcher: &Dispatcher, user: Option<AuthUser>, text: &str) -> JsonValue {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => return rejection_frame(ApiError::invalid_input(format!("Malformed frame: {}", e))),
    };

    let raw = RawRequest::with_params(frame.params).user(user);
    let outcome = dispatcher
        .dispatch(Transport::Socket, &frame.service, &frame.action, raw)
        .await;
    response_frame(frame.seq, outcome)
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(dispatcher): State<Dispatcher>,
    MaybeUser(user): MaybeUser,
) -> Response {
    info!(user = ?user.as_ref().map(|u| &u.code), "WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, dispatcher, user))
}

/// Lifetime of one connection.
async fn handle_socket(socket: WebSocket, dispatcher: Dispatcher, user: Option<AuthUser>) {
    let caller = user.as_ref().map_or_else(|| "anonymous".to_string(), |u| u.code.clone());
    info!(caller = %caller, "WebSocket connected");
    if let Some(metrics) = metrics() {
        metrics.ws_connected();
    }

    let (mut sender, mut receiver) = socket.split();
    let mut notifications = dispatcher.bus().subscribe();
    let (reply_tx, mut reply_rx) = mpsc::channel::<JsonValue>(REPLY_BUFFER);

    for service in dispatcher.registry().services() {
        for frame in service.after_connection(user.as_ref()) {
            if let Err(e) = send_frame(&mut sender, &frame).await {
                error!(caller = %caller, service = %service.name, error = %e, "Failed to send greeting");
                return;
            }
        }
    }

    let recv_dispatcher = dispatcher.clone();
    let recv_caller = caller.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let dispatcher = recv_dispatcher.clone();
                    let user = user.clone();
                    let reply_tx = reply_tx.clone();
                    let caller = recv_caller.clone();
                    // frames run concurrently; clients correlate replies by `seq`
                    tokio::spawn(async move {
                        let reply = handle_frame(&dispatcher, user, &text).await;
                        if reply_tx.send(reply).await.is_err() {
                            debug!(caller = %caller, "Connection closed before reply, reply dropped");
                        }
                    });
                }
                Ok(Message::Close(_)) => {
                    debug!(caller = %recv_caller, "Client sent close frame");
                    break;
                }
                Ok(Message::Binary(data)) => {
                    debug!(caller = %recv_caller, len = data.len(), "Binary frame ignored");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(caller = %recv_caller, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            Some(reply) = reply_rx.recv() => {
                if let Err(e) = send_frame(&mut sender, &reply).await {
                    error!(caller = %caller, error = %e, "Failed to send reply, closing connection");
                    break;
                }
            }

            result = notifications.recv() => {
                match result {
                    Ok(event) => {
                        if let Err(e) = send_frame(&mut sender, &event.to_frame()).await {
                            error!(caller = %caller, error = %e, "Failed to send notification, closing connection");
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(caller = %caller, skipped, "Client lagged, notifications dropped");
                        let frame = json!({
                            "type": "error",
                            "error": ApiError::internal_error(format!("Lagged: {} notifications dropped", skipped)),
                        });
                        if send_frame(&mut sender, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(caller = %caller, "Notification channel closed");
                        break;
                    }
                }
            }

            _ = &mut recv_task => {
                debug!(caller = %caller, "Receiver task finished");
                break;
            }
        }
    }

    recv_task.abort();
    if let Some(metrics) = metrics() {
        metrics.ws_disconnected();
    }
    info!(caller = %caller, "WebSocket disconnected");
}

async fn send_frame(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    frame: &JsonValue,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).map_err(|e| {
        error!(error = %e, "Failed to serialize frame");
        axum::Error::new(e)
    })?;
    sender.send(Message::Text(text)).await
}

/// Create the WebSocket router.
pub fn create_router(dispatcher: Dispatcher) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(dispatcher)
}
