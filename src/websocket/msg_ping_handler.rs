use tracing::debug;
use chrono::Utc;
use crate::models::{PongMessage, ServerMessage};
use crate::ws::connctx::ConnCtx;

/// Handle ping - send a pong message back
pub async fn handle_ping_message(ctx: &ConnCtx) {
    debug!(connection_id = %ctx.connection_id, "Ping message received");
    ctx.send(ServerMessage::Pong(PongMessage { date: Utc::now().to_rfc3339() })).await;
}
