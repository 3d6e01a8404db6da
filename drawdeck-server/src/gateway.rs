//! The WebSocket endpoint every real-time client talks through. A
//! connection is authenticated before the upgrade completes, then
//! registered with the collab system for the lifetime of the socket.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use log::warn;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc::unbounded_channel;
use drawdeck_collab::{DrawOperation, SessionConnectionId, SessionData, SessionEvent};

use crate::{errors::ServerError, Router, ServerContext};

/// What clients can send over the gateway
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: i32,
        password: Option<String>,
    },
    /// Clients may send the room id, bare or wrapped in an object. A
    /// connection holds at most one assignment, so the payload is
    /// accepted and ignored.
    LeaveRoom(Option<Value>),
    Draw(DrawOperation),
    SendMessage {
        #[serde(alias = "text")]
        message: String,
    },
}

#[derive(Debug, Deserialize)]
struct GatewayParams {
    token: Option<String>,
}

async fn gateway(
    State(context): State<ServerContext>,
    Query(params): Query<GatewayParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ServerError> {
    // Refused before the upgrade, so an unauthenticated client never
    // holds a socket at all
    let session = context
        .collab
        .auth
        .authenticate(params.token.as_deref())
        .await?;

    Ok(ws.on_upgrade(move |socket| handle_connection(context, session, socket)))
}

async fn handle_connection(context: ServerContext, session: SessionData, socket: WebSocket) {
    let (sender, mut events) = unbounded_channel();

    let connection_id =
        context
            .collab
            .sessions
            .connect(session.user.id, &session.user.username, sender);

    let (mut socket_sink, mut socket_stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };

            if socket_sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = socket_stream.next().await {
        match message {
            Message::Text(text) => {
                let parsed: ClientMessage = match serde_json::from_str(&text) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Ignoring malformed gateway message: {}", e);
                        continue;
                    }
                };

                handle_message(&context, connection_id, parsed).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    context.collab.sessions.disconnect(connection_id).await;
    send_task.abort();
}

async fn handle_message(
    context: &ServerContext,
    connection_id: SessionConnectionId,
    message: ClientMessage,
) {
    let collab = &context.collab;

    match message {
        ClientMessage::JoinRoom { room_id, password } => {
            if let Err(e) = collab.sessions.join_room(connection_id, room_id, password).await {
                collab
                    .registry()
                    .send_to(connection_id, SessionEvent::Error(e.to_string()));
            }
        }
        ClientMessage::LeaveRoom(_) => {
            collab.sessions.leave_room(connection_id).await;
        }
        ClientMessage::Draw(operation) => {
            collab.canvas.relay(connection_id, operation);
        }
        ClientMessage::SendMessage { message } => {
            // The sender already received an error event on failure
            if let Err(e) = collab.chat.send(connection_id, message).await {
                warn!("Dropped a chat message: {}", e);
            }
        }
    }
}

pub fn router() -> Router {
    Router::new().route("/", get(gateway))
}

#[cfg(test)]
mod test {
    use drawdeck_collab::OperationKind;

    use super::*;

    #[test]
    fn join_room_payload_parses() {
        let raw = r#"{"event": "joinRoom", "data": {"roomId": 7, "password": "sekret"}}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();

        assert!(matches!(
            parsed,
            ClientMessage::JoinRoom {
                room_id: 7,
                password: Some(_)
            }
        ));
    }

    #[test]
    fn draw_payload_parses_into_an_operation() {
        let raw = r##"{
            "event": "draw",
            "data": {
                "type": "line",
                "tool": "pen",
                "points": [1.0, 2.0],
                "stroke": "#000000",
                "strokeWidth": 5.0
            }
        }"##;

        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();

        match parsed {
            ClientMessage::Draw(operation) => {
                assert!(matches!(operation.kind, OperationKind::Line { .. }))
            }
            other => panic!("expected draw, got {:?}", other),
        }
    }

    #[test]
    fn leave_room_parses_without_data() {
        let raw = r#"{"event": "leaveRoom"}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();

        assert!(matches!(parsed, ClientMessage::LeaveRoom(None)));
    }

    #[test]
    fn leave_room_accepts_a_room_id_payload() {
        let wrapped = r#"{"event": "leaveRoom", "data": {"roomId": 7}}"#;
        let parsed: ClientMessage = serde_json::from_str(wrapped).unwrap();

        assert!(matches!(parsed, ClientMessage::LeaveRoom(Some(_))));

        // Some clients send the id bare
        let bare = r#"{"event": "leaveRoom", "data": 7}"#;
        let parsed: ClientMessage = serde_json::from_str(bare).unwrap();

        assert!(matches!(parsed, ClientMessage::LeaveRoom(Some(_))));
    }

    #[test]
    fn send_message_payload_parses() {
        let raw = r#"{"event": "sendMessage", "data": {"message": "hello"}}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();

        assert!(matches!(parsed, ClientMessage::SendMessage { .. }));
    }

    #[test]
    fn send_message_accepts_the_text_field_name() {
        let raw = r#"{"event": "sendMessage", "data": {"text": "hello"}}"#;
        let parsed: ClientMessage = serde_json::from_str(raw).unwrap();

        match parsed {
            ClientMessage::SendMessage { message } => assert_eq!(message, "hello"),
            other => panic!("expected sendMessage, got {:?}", other),
        }
    }
}
