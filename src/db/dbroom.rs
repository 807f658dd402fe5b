use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::time::Duration;
use tracing::{error, info};

use crate::db::store::SessionStore;
use crate::db::util::{language_or_default, log_pool_state, visibility_from_str};
use crate::error::StoreError;
use crate::models::{Participant, RoomCheckpoint, RoomRecord};

const SCHEMA_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS rooms (
        room_id TEXT PRIMARY KEY,
        room_name TEXT NOT NULL DEFAULT '',
        admin TEXT NOT NULL DEFAULT '',
        visibility TEXT NOT NULL DEFAULT 'public',
        password TEXT,
        code TEXT NOT NULL DEFAULT '',
        language TEXT NOT NULL DEFAULT 'javascript',
        revision BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    CREATE TABLE IF NOT EXISTS room_participants (
        room_id TEXT NOT NULL REFERENCES rooms(room_id) ON DELETE CASCADE,
        connection_id TEXT NOT NULL,
        username TEXT NOT NULL,
        is_admin BOOLEAN NOT NULL DEFAULT FALSE,
        joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (room_id, connection_id)
    );
"#;

/// Room row from database. The password hash column is never selected.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RoomRow {
    pub room_id: String,
    pub room_name: String,
    pub admin: String,
    pub visibility: String,
    pub code: String,
    pub language: String,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Participant row from database
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ParticipantRow {
    pub connection_id: String,
    pub username: String,
    pub is_admin: bool,
    pub joined_at: DateTime<Utc>,
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Participant {
            connection_id: row.connection_id,
            username: row.username,
            is_admin: row.is_admin,
            joined_at: row.joined_at,
        }
    }
}

/// Postgres backed room store
pub struct DbRoom {
    pool: PgPool,
}

impl DbRoom {
    /// Create a new database connection pool and make sure the schema exists
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        sqlx::raw_sql(SCHEMA_SQL).execute(&pool).await?;
        info!("Room schema verified");

        Ok(Self { pool })
    }
}

#[async_trait]
impl SessionStore for DbRoom {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Load a room and its persisted roster
    async fn fetch_room(&self, room_id: &str) -> Result<Option<RoomRecord>, StoreError> {
        log_pool_state(&self.pool, "Loading", room_id);

        let query_sql = r#"
            SELECT room_id, room_name, admin, visibility, code, language, revision, created_at, updated_at
            FROM rooms
            WHERE room_id = $1;
        "#;
        let row = sqlx::query_as::<_, RoomRow>(query_sql)
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            info!("Room not found: {}", room_id);
            return Ok(None);
        };

        let participants_sql = r#"
            SELECT connection_id, username, is_admin, joined_at
            FROM room_participants
            WHERE room_id = $1
            ORDER BY joined_at ASC;
        "#;
        let participants = sqlx::query_as::<_, ParticipantRow>(participants_sql)
            .bind(room_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Participant::from)
            .collect();

        Ok(Some(RoomRecord {
            language: language_or_default(&row.room_id, &row.language),
            visibility: visibility_from_str(&row.visibility),
            room_id: row.room_id,
            room_name: row.room_name,
            admin: row.admin,
            code: row.code,
            revision: row.revision,
            participants,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn create_room(&self, record: &RoomRecord) -> Result<(), StoreError> {
        log_pool_state(&self.pool, "Creating", &record.room_id);

        let query_sql = r#"
            INSERT INTO rooms(room_id, room_name, admin, visibility, code, language, revision, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (room_id) DO NOTHING;
        "#;
        sqlx::query(query_sql)
            .bind(&record.room_id)
            .bind(&record.room_name)
            .bind(&record.admin)
            .bind(record.visibility.to_string())
            .bind(&record.code)
            .bind(record.language.as_str())
            .bind(record.revision)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_room(&self, checkpoint: &RoomCheckpoint) -> Result<(), StoreError> {
        log_pool_state(&self.pool, "Checkpointing", &checkpoint.room_id);

        let query_sql = r#"
            INSERT INTO rooms(room_id, room_name, code, language, revision, updated_at)
            VALUES ($1, $1, $2, $3, $4, $5)
            ON CONFLICT (room_id) DO UPDATE
            SET code = EXCLUDED.code,
                language = EXCLUDED.language,
                revision = EXCLUDED.revision,
                updated_at = EXCLUDED.updated_at
            WHERE rooms.revision <= EXCLUDED.revision;
        "#;
        sqlx::query(query_sql)
            .bind(&checkpoint.room_id)
            .bind(&checkpoint.code)
            .bind(checkpoint.language.as_str())
            .bind(checkpoint.revision)
            .bind(checkpoint.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to checkpoint room '{}': {}", checkpoint.room_id, e);
                e
            })?;
        Ok(())
    }

    async fn add_participant(&self, room_id: &str, participant: &Participant) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let query_sql = r#"
            INSERT INTO room_participants(room_id, connection_id, username, is_admin, joined_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (room_id, connection_id) DO NOTHING;
        "#;
        sqlx::query(query_sql)
            .bind(room_id)
            .bind(&participant.connection_id)
            .bind(&participant.username)
            .bind(participant.is_admin)
            .bind(participant.joined_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE rooms SET updated_at = NOW() WHERE room_id = $1;")
            .bind(room_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_participant(&self, room_id: &str, connection_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM room_participants WHERE room_id = $1 AND connection_id = $2;")
            .bind(room_id)
            .bind(connection_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_participants(&self, room_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM room_participants WHERE room_id = $1;")
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            info!("Cleared {} stale participants of room {}", result.rows_affected(), room_id);
        }
        Ok(())
    }
}
