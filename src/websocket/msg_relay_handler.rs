use crate::error::SessionError;
use crate::models::{ChatMessage, TypingMessage};
use crate::services::session_service::SessionService;
use crate::ws::connctx::ConnCtx;

/// Handle chat_message - pass through to the other participants
pub async fn handle_chat_message(service: &SessionService, ctx: &ConnCtx, chat_msg: ChatMessage) -> Result<(), SessionError> {
    ctx.ensure_scope(&chat_msg.session_id)?;
    service.relay_chat(&ctx.connection_id, chat_msg).await
}

pub async fn handle_typing_message(service: &SessionService, ctx: &ConnCtx, typing_msg: TypingMessage) -> Result<(), SessionError> {
    ctx.ensure_scope(&typing_msg.session_id)?;
    service.relay_typing(&ctx.connection_id, typing_msg).await
}
