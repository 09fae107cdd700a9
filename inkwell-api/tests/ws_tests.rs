//! WebSocket transport over a real listener.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use inkwell_api::ApiResult;
use inkwell_core::AuthUser;
use inkwell_test_utils::fixtures;
use serde_json::{json, Value as JsonValue};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

#[path = "support/app.rs"]
mod test_support;
use test_support::{bearer, test_app};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve() -> ApiResult<SocketAddr> {
    let app = test_app().await?;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app.router).await.expect("server runs");
    });
    Ok(addr)
}

async fn connect(addr: SocketAddr, user: Option<&AuthUser>) -> Socket {
    let mut request = format!("ws://{}/ws", addr)
        .into_client_request()
        .expect("valid ws url");
    if let Some(user) = user {
        let value = HeaderValue::from_str(&bearer(user)).expect("valid header");
        request.headers_mut().insert("authorization", value);
    }
    let (socket, _) = connect_async(request).await.expect("handshake succeeds");
    socket
}

async fn next_frame(socket: &mut Socket) -> JsonValue {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame before timeout")
            .expect("socket open")
            .expect("valid message");
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).expect("frames are JSON");
        }
    }
}

async fn send(socket: &mut Socket, frame: JsonValue) {
    socket
        .send(Message::text(frame.to_string()))
        .await
        .expect("frame sent");
}

#[tokio::test]
async fn test_welcome_frame_for_logged_in_caller() -> ApiResult<()> {
    let addr = serve().await?;
    let author = fixtures::author();
    let mut socket = connect(addr, Some(&author)).await;

    let welcome = next_frame(&mut socket).await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["service"], "persons");
    assert_eq!(welcome["data"]["code"], json!(author.code));
    Ok(())
}

#[tokio::test]
async fn test_request_reply_echoes_seq() -> ApiResult<()> {
    let addr = serve().await?;
    let mut socket = connect(addr, None).await;

    send(&mut socket, json!({ "service": "tags", "action": "find", "seq": 41 })).await;
    let reply = next_frame(&mut socket).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["seq"], 41);
    assert_eq!(reply["data"], json!([]));

    send(&mut socket, json!({ "service": "hexoposts", "action": "find", "seq": 42 })).await;
    let reply = next_frame(&mut socket).await;
    assert_eq!(reply["seq"], 42);
    assert_eq!(reply["error"]["code"], "SERVICE_NOT_FOUND");
    Ok(())
}

#[tokio::test]
async fn test_mutation_is_broadcast_to_other_sockets() -> ApiResult<()> {
    let addr = serve().await?;
    let mut watcher = connect(addr, None).await;
    // a reply proves the watcher's connection is subscribed
    send(&mut watcher, json!({ "service": "tags", "action": "find", "seq": 0 })).await;
    assert_eq!(next_frame(&mut watcher).await["seq"], 0);
    let author = fixtures::author();
    let mut writer = connect(addr, Some(&author)).await;
    assert_eq!(next_frame(&mut writer).await["type"], "welcome");

    send(
        &mut writer,
        json!({
            "service": "posts",
            "action": "create",
            "params": { "title": "Over the wire", "content": "Pushed" },
            "seq": 1,
        }),
    )
    .await;

    let mut reply = None;
    let mut seen_by_writer = None;
    while reply.is_none() || seen_by_writer.is_none() {
        let frame = next_frame(&mut writer).await;
        match frame["type"].as_str() {
            Some("response") => reply = Some(frame),
            Some("notification") => seen_by_writer = Some(frame),
            _ => {}
        }
    }
    let reply = reply.unwrap_or_default();
    assert_eq!(reply["seq"], 1);
    assert_eq!(reply["data"]["slug"], "over-the-wire");

    let notification = next_frame(&mut watcher).await;
    assert_eq!(notification["type"], "notification");
    assert_eq!(notification["service"], "posts");
    assert_eq!(notification["event"], "created");
    assert_eq!(notification["data"]["code"], reply["data"]["code"]);
    Ok(())
}

#[tokio::test]
async fn test_permission_errors_stay_on_the_socket() -> ApiResult<()> {
    let addr = serve().await?;
    let mut socket = connect(addr, None).await;

    send(
        &mut socket,
        json!({ "service": "posts", "action": "create", "params": { "title": "x", "content": "y" } }),
    )
    .await;
    let reply = next_frame(&mut socket).await;
    assert!(reply["seq"].is_null());
    assert_eq!(reply["error"]["code"], "UNAUTHORIZED");

    send(&mut socket, json!({ "service": "tags", "action": "find", "seq": "after" })).await;
    assert_eq!(next_frame(&mut socket).await["seq"], "after");
    Ok(())
}
