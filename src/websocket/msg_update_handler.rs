use tracing::debug;
use crate::error::SessionError;
use crate::models::{CodeChangeMessage, EditRejectedMessage, LanguageChangeMessage, ServerMessage};
use crate::services::session_service::SessionService;
use crate::ws::connctx::ConnCtx;

/// Handle code_change - resolve, apply and broadcast
pub async fn handle_code_change_message(
    service: &SessionService,
    ctx: &ConnCtx,
    change_msg: CodeChangeMessage,
) -> Result<(), SessionError> {
    ctx.ensure_scope(&change_msg.session_id)?;
    let session_id = change_msg.session_id.clone();

    match service.apply_edit(&ctx.connection_id, change_msg).await {
        Ok(accepted) => {
            debug!(session_id = %session_id, connection_id = %ctx.connection_id, "Edit accepted at revision {}", accepted.revision);
            Ok(())
        }
        Err(SessionError::StaleProposal { proposed, current }) => {
            if service.notify_stale_edits() {
                ctx.send(ServerMessage::EditRejected(EditRejectedMessage {
                    session_id,
                    proposed_stamp: proposed,
                    revision_stamp: current,
                }))
                .await;
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Handle language_change. Stale changes are dropped without notice.
pub async fn handle_language_change_message(
    service: &SessionService,
    ctx: &ConnCtx,
    change_msg: LanguageChangeMessage,
) -> Result<(), SessionError> {
    ctx.ensure_scope(&change_msg.session_id)?;
    match service.change_language(&ctx.connection_id, change_msg).await {
        Ok(_) | Err(SessionError::StaleProposal { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}
