use sqlx::postgres::PgPool;
use tracing::{info, warn};

use crate::models::{Language, RoomVisibility};

/// Log pool usage before acquiring a connection
pub fn log_pool_state(pool: &PgPool, action: &str, room_id: &str) {
    let pool_idle = pool.num_idle() as u32;
    let pool_size = pool.size();
    info!(
        "{} room {}. Pool connections: {} idle, {} in use",
        action,
        room_id,
        pool_idle,
        pool_size.saturating_sub(pool_idle)
    );
}

/// Stored language tags are free text; unknown values fall back to the default
pub fn language_or_default(room_id: &str, raw: &str) -> Language {
    raw.parse().unwrap_or_else(|e| {
        warn!("Room {} has unreadable language '{}': {}", room_id, raw, e);
        Language::default()
    })
}

pub fn visibility_from_str(raw: &str) -> RoomVisibility {
    if raw.eq_ignore_ascii_case("private") {
        RoomVisibility::Private
    } else {
        RoomVisibility::Public
    }
}
