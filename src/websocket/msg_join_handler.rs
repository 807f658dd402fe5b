use tracing::info;
use crate::error::SessionError;
use crate::models::{JoinRoomMessage, LeaveRoomMessage};
use crate::services::session_service::SessionService;
use crate::ws::connctx::ConnCtx;

/// Handle join_room. A connection is in at most one session, joining another leaves the current one.
pub async fn handle_join_message(
    service: &SessionService,
    ctx: &mut ConnCtx,
    join_msg: JoinRoomMessage,
) -> Result<(), SessionError> {
    info!(
        session_id = %join_msg.session_id,
        connection_id = %ctx.connection_id,
        "Join requested by {}",
        join_msg.display_name
    );
    ctx.detach(service).await;

    let joined = service.join(&ctx.connection_id, join_msg).await?;
    info!(
        session_id = %joined.session.id,
        connection_id = %ctx.connection_id,
        "{} is participant {} of {}",
        joined.participant.username,
        joined.roster.len(),
        joined.session.connection_count()
    );
    ctx.attach(joined.session.id.clone(), joined.receiver);
    Ok(())
}

/// Handle leave_room. Leaving a session the connection is not in is a no-op.
pub async fn handle_leave_message(service: &SessionService, ctx: &mut ConnCtx, leave_msg: LeaveRoomMessage) {
    if ctx.current_session() == Some(leave_msg.session_id.as_str()) {
        ctx.detach(service).await;
    }
}
