use std::sync::Arc;
use axum::{
    extract::{State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::Response,
};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::SessionError;
use crate::models::ClientMessage;
use crate::services::session_service::SessionService;
use crate::websocket::msg_join_handler::{handle_join_message, handle_leave_message};
use crate::websocket::msg_ping_handler::handle_ping_message;
use crate::websocket::msg_relay_handler::{handle_chat_message, handle_typing_message};
use crate::websocket::msg_update_handler::{handle_code_change_message, handle_language_change_message};
use crate::ws::connctx::ConnCtx;

/// WebSocket handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    info!("New WebSocket connection attempt");
    ws.on_upgrade(move |socket| handle_socket(socket, state.sessions))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, service: SessionService) {

    // Generate unique connection ID to identify this client
    let connection_id = Uuid::new_v4().to_string();
    info!(connection_id = %connection_id, "WebSocket connection established");

    // Replies and session broadcasts share the write half
    let (sender, mut receiver) = socket.split();
    let mut ctx = ConnCtx::new(connection_id, Arc::new(Mutex::new(sender)));

    // Frames of one connection are handled in arrival order
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_text(&service, &mut ctx, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => {
                ctx.send_error(&SessionError::InvalidMessage("binary frames are not supported".to_string())).await;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(connection_id = %ctx.connection_id, "WebSocket error: {}", e);
                break;
            }
        }
    }

    debug!(connection_id = %ctx.connection_id, "{}", SessionError::TransportDisconnect);
    ctx.detach(&service).await;
    info!(connection_id = %ctx.connection_id, "WebSocket connection terminated");
}

async fn handle_text(service: &SessionService, ctx: &mut ConnCtx, text: &str) {

    // Parse the incoming message as JSON
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(connection_id = %ctx.connection_id, "Failed to parse message: {}", e);
            ctx.send_error(&SessionError::InvalidMessage(e.to_string())).await;
            return;
        }
    };

    debug!(connection_id = %ctx.connection_id, session_id = ?message.session_id(), "Received message");
    let result = match message {
        ClientMessage::JoinRoom(join_msg) => handle_join_message(service, ctx, join_msg).await,
        ClientMessage::CodeChange(change_msg) => handle_code_change_message(service, ctx, change_msg).await,
        ClientMessage::LanguageChange(change_msg) => handle_language_change_message(service, ctx, change_msg).await,
        ClientMessage::LeaveRoom(leave_msg) => {
            handle_leave_message(service, ctx, leave_msg).await;
            Ok(())
        }
        ClientMessage::ChatMessage(chat_msg) => handle_chat_message(service, ctx, chat_msg).await,
        ClientMessage::Typing(typing_msg) => handle_typing_message(service, ctx, typing_msg).await,
        ClientMessage::Ping => {
            handle_ping_message(ctx).await;
            Ok(())
        }
    };

    if let Err(e) = result {
        if e.is_client_visible() {
            ctx.send_error(&e).await;
        } else {
            warn!(connection_id = %ctx.connection_id, "Message handling failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::db::store::MemorySessionStore;
    use crate::routes::create_app;
    use crate::AppState;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_server(config: Config) -> (String, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let app = create_app(AppState::new(config, store.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("ws://{}/ws", addr), store)
    }

    async fn connect(url: &str) -> Client {
        let (client, _) = connect_async(url).await.unwrap();
        client
    }

    async fn send(client: &mut Client, value: Value) {
        client
            .send(tungstenite::Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    /// Next frame of the given type, skipping everything else
    async fn next_of(client: &mut Client, kind: &str) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(2), client.next())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {}", kind))
                .expect("connection closed")
                .expect("websocket error");
            if let tungstenite::Message::Text(text) = frame {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                if value["type"] == kind {
                    return value;
                }
            }
        }
    }

    /// Round-trip a ping so every earlier frame of this client has been handled
    async fn sync(client: &mut Client) {
        send(client, json!({"type": "ping"})).await;
        next_of(client, "pong").await;
    }

    async fn join(client: &mut Client, session_id: &str, name: &str) -> Value {
        send(client, json!({"type": "join_room", "sessionId": session_id, "displayName": name})).await;
        loop {
            let state = next_of(client, "room_state").await;
            if state["sessionId"] == session_id {
                return state;
            }
        }
    }

    fn edit(session_id: &str, name: &str, buffer: &str, revision: i64) -> Value {
        json!({
            "type": "code_change",
            "sessionId": session_id,
            "buffer": buffer,
            "proposerName": name,
            "revisionStamp": revision
        })
    }

    #[tokio::test]
    async fn late_joiner_converges_and_stale_edit_is_never_broadcast() {
        let (url, _store) = spawn_server(Config::default()).await;

        let mut a = connect(&url).await;
        let state = join(&mut a, "r1", "alice").await;
        assert_eq!(state["buffer"], "");

        send(&mut a, edit("r1", "alice", "x=1", 1000)).await;
        sync(&mut a).await;

        let mut b = connect(&url).await;
        let state = join(&mut b, "r1", "bob").await;
        assert_eq!(state["buffer"], "x=1");
        assert_eq!(state["revisionStamp"], 1000);
        assert_eq!(state["participants"].as_array().unwrap().len(), 2);

        send(&mut b, edit("r1", "bob", "stale", 999)).await;
        send(&mut b, edit("r1", "bob", "x=2", 1500)).await;

        let change = next_of(&mut a, "code_change").await;
        assert_eq!(change["buffer"], "x=2");
        assert_eq!(change["proposerName"], "bob");
        assert_eq!(change["revisionStamp"], 1500);
    }

    #[tokio::test]
    async fn disconnect_notifies_remaining_participant() {
        let (url, _store) = spawn_server(Config::default()).await;

        let mut a = connect(&url).await;
        let state = join(&mut a, "r2", "alice").await;
        let a_id = state["participants"][0]["connectionId"].as_str().unwrap().to_string();

        let mut b = connect(&url).await;
        join(&mut b, "r2", "bob").await;

        a.close(None).await.unwrap();

        let left = next_of(&mut b, "participant_left").await;
        assert_eq!(left["connectionId"], a_id.as_str());
        let roster = left["participants"].as_array().unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0]["username"], "bob");
    }

    #[tokio::test]
    async fn stale_edit_is_reported_when_enabled() {
        let config = Config {
            notify_stale_edits: true,
            ..Config::default()
        };
        let (url, _store) = spawn_server(config).await;

        let mut a = connect(&url).await;
        join(&mut a, "r1", "alice").await;
        send(&mut a, edit("r1", "alice", "x=1", 1000)).await;
        send(&mut a, edit("r1", "alice", "x=0", 900)).await;

        let rejected = next_of(&mut a, "edit_rejected").await;
        assert_eq!(rejected["proposedStamp"], 900);
        assert_eq!(rejected["revisionStamp"], 1000);
    }

    #[tokio::test]
    async fn malformed_and_out_of_scope_frames_get_error_frames() {
        let (url, _store) = spawn_server(Config::default()).await;
        let mut a = connect(&url).await;

        a.send(tungstenite::Message::Text("{not json".into())).await.unwrap();
        let error = next_of(&mut a, "error").await;
        assert_eq!(error["code"], "invalid_message");

        send(&mut a, edit("r1", "alice", "x", 1)).await;
        let error = next_of(&mut a, "error").await;
        assert_eq!(error["code"], "session_not_found");

        // The connection survives both
        join(&mut a, "r1", "alice").await;
        send(&mut a, edit("other", "alice", "x", 1)).await;
        let error = next_of(&mut a, "error").await;
        assert_eq!(error["code"], "session_not_found");
    }

    #[tokio::test]
    async fn join_of_unknown_session_fails_without_auto_create() {
        let config = Config {
            auto_create_sessions: false,
            ..Config::default()
        };
        let (url, _store) = spawn_server(config).await;
        let mut a = connect(&url).await;

        send(&mut a, json!({"type": "join_room", "sessionId": "ghost", "displayName": "alice"})).await;
        let error = next_of(&mut a, "error").await;
        assert_eq!(error["code"], "session_not_found");
    }

    #[tokio::test]
    async fn chat_typing_and_language_reach_the_other_participant() {
        let (url, _store) = spawn_server(Config::default()).await;
        let mut a = connect(&url).await;
        join(&mut a, "r1", "alice").await;
        let mut b = connect(&url).await;
        join(&mut b, "r1", "bob").await;

        send(&mut a, json!({"type": "typing", "sessionId": "r1"})).await;
        let typing = next_of(&mut b, "user_typing").await;
        assert_eq!(typing["displayName"], "alice");

        send(&mut a, json!({"type": "chat_message", "sessionId": "r1", "sender": "alice", "text": "hello", "time": "12:00"})).await;
        let chat = next_of(&mut b, "chat_message").await;
        assert_eq!(chat["text"], "hello");

        send(&mut a, json!({"type": "language_change", "sessionId": "r1", "language": "python", "proposerName": "alice"})).await;
        let language = next_of(&mut b, "language_change").await;
        assert_eq!(language["language"], "python");
        assert_eq!(language["proposerName"], "alice");
        assert!(language["timestamp"].is_string());
    }

    #[tokio::test]
    async fn explicit_leave_then_rejoin_elsewhere() {
        let (url, _store) = spawn_server(Config::default()).await;
        let mut a = connect(&url).await;
        join(&mut a, "r1", "alice").await;
        let mut b = connect(&url).await;
        join(&mut b, "r1", "bob").await;

        send(&mut a, json!({"type": "leave_room", "sessionId": "r1"})).await;
        next_of(&mut b, "participant_left").await;

        // Joining another session also leaves the current one
        join(&mut b, "r3", "bob").await;
        let state = join(&mut a, "r3", "alice").await;
        assert_eq!(state["participants"].as_array().unwrap().len(), 2);
    }
}
