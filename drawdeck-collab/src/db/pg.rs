use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{
    postgres::PgPoolOptions, prelude::FromRow, query, query_as, types::Json, Error as SqlxError,
    PgPool,
};

use super::{
    Database, DatabaseError, DatabaseResult, DrawingData, IntoDatabaseError, MessageData,
    NewDrawing, NewMessage, NewRoom, NewSession, NewUser, PrimaryKey, Result, RoomData,
    SessionData, UserData,
};

/// A postgres database implementation for drawdeck
pub struct PgDatabase {
    pool: PgPool,
}

#[derive(FromRow)]
struct UserRow {
    id: PrimaryKey,
    username: String,
    password: String,
}

#[derive(FromRow)]
struct SessionRow {
    id: PrimaryKey,
    token: String,
    expires_at: DateTime<Utc>,
    user_id: PrimaryKey,
    username: String,
    password: String,
}

#[derive(FromRow)]
struct RoomRow {
    id: PrimaryKey,
    name: String,
    is_private: bool,
    password: Option<String>,
    max_users: i32,
    active_users: i32,
    created_by: PrimaryKey,
}

#[derive(FromRow)]
struct MessageRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    user_id: PrimaryKey,
    username: String,
    message: String,
    timestamp: DateTime<Utc>,
}

#[derive(FromRow)]
struct DrawingRow {
    id: PrimaryKey,
    room_id: PrimaryKey,
    lines: Json<Value>,
    shapes: Json<Value>,
    timestamp: DateTime<Utc>,
}

impl PgDatabase {
    pub async fn new(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| DatabaseError::Internal(Box::new(e)))?;

        Ok(Self { pool })
    }
}

impl From<UserRow> for UserData {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            password: row.password,
        }
    }
}

impl From<SessionRow> for SessionData {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            token: row.token,
            expires_at: row.expires_at,
            user: UserData {
                id: row.user_id,
                username: row.username,
                password: row.password,
            },
        }
    }
}

impl From<RoomRow> for RoomData {
    fn from(row: RoomRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            is_private: row.is_private,
            password: row.password,
            max_users: row.max_users,
            active_users: row.active_users,
            created_by: row.created_by,
        }
    }
}

impl From<MessageRow> for MessageData {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            room_id: row.room_id,
            user_id: row.user_id,
            username: row.username,
            message: row.message,
            timestamp: row.timestamp,
        }
    }
}

impl From<DrawingRow> for DrawingData {
    fn from(row: DrawingRow) -> Self {
        Self {
            id: row.id,
            room_id: row.room_id,
            lines: row.lines.0,
            shapes: row.shapes.0,
            timestamp: row.timestamp,
        }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT id, username, password FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "id"))
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        query_as::<_, UserRow>("SELECT id, username, password FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("user", "username"))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        query_as::<_, UserRow>(
            "INSERT INTO users (username, password) VALUES ($1, $2)
             RETURNING id, username, password",
        )
        .bind(&new_user.username)
        .bind(&new_user.password)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.any())
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        query_as::<_, SessionRow>(
            "SELECT
                sessions.id,
                sessions.token,
                sessions.expires_at,
                sessions.user_id,
                users.username,
                users.password
            FROM sessions
                INNER JOIN users ON sessions.user_id = users.id
            WHERE token = $1",
        )
        .bind(token)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("session", "token"))
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        self.session_by_token(&new_session.token)
            .await
            .conflict_or_ok("session", "token", &new_session.token)?;

        let token: (String,) = query_as(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)
             RETURNING token",
        )
        .bind(&new_session.token)
        .bind(new_session.user_id)
        .bind(new_session.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| e.any())?;

        self.session_by_token(&token.0).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        // Ensure session exists
        let _ = self.session_by_token(token).await?;

        query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        query("DELETE FROM sessions WHERE timezone('UTC', now()) > expires_at")
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        query_as::<_, RoomRow>("SELECT * FROM rooms WHERE id = $1")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .map(Into::into)
            .map_err(|e| e.not_found_or("room", "id"))
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        query_as::<_, RoomRow>("SELECT * FROM rooms ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map(|rows| rows.into_iter().map(Into::into).collect())
            .map_err(|e| e.any())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        // Ensure the creator exists
        let user = self.user_by_id(new_room.created_by).await?;

        query_as::<_, RoomRow>(
            "INSERT INTO rooms (name, is_private, password, max_users, created_by)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(&new_room.name)
        .bind(new_room.is_private)
        .bind(&new_room.password)
        .bind(new_room.max_users)
        .bind(user.id)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.any())
    }

    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()> {
        // Ensure room exists
        let _ = self.room_by_id(room_id).await?;

        query("DELETE FROM rooms WHERE id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())
            .map(|_| ())
    }

    async fn update_room_active_users(
        &self,
        room_id: PrimaryKey,
        active_users: i32,
    ) -> Result<()> {
        let result = query("UPDATE rooms SET active_users = $1 WHERE id = $2")
            .bind(active_users)
            .bind(room_id)
            .execute(&self.pool)
            .await
            .map_err(|e| e.any())?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            });
        }

        Ok(())
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData> {
        query_as::<_, MessageRow>(
            "INSERT INTO messages (room_id, user_id, username, message, timestamp)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(new_message.room_id)
        .bind(new_message.user_id)
        .bind(&new_message.username)
        .bind(&new_message.message)
        .bind(new_message.timestamp)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.any())
    }

    async fn messages_by_room(&self, room_id: PrimaryKey, limit: i64) -> Result<Vec<MessageData>> {
        let mut messages: Vec<MessageData> = query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE room_id = $1 ORDER BY timestamp DESC LIMIT $2",
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(Into::into).collect())
        .map_err(|e| e.any())?;

        // Most recent N, returned oldest first
        messages.reverse();
        Ok(messages)
    }

    async fn create_drawing(&self, new_drawing: NewDrawing) -> Result<DrawingData> {
        query_as::<_, DrawingRow>(
            "INSERT INTO drawings (room_id, lines, shapes, timestamp)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(new_drawing.room_id)
        .bind(Json(new_drawing.lines))
        .bind(Json(new_drawing.shapes))
        .bind(new_drawing.timestamp)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.any())
    }

    async fn latest_drawing(&self, room_id: PrimaryKey) -> Result<DrawingData> {
        query_as::<_, DrawingRow>(
            "SELECT * FROM drawings WHERE room_id = $1 ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(room_id)
        .fetch_one(&self.pool)
        .await
        .map(Into::into)
        .map_err(|e| e.not_found_or("drawing", "room_id"))
    }

    async fn drawings_by_room(&self, room_id: PrimaryKey, limit: i64) -> Result<Vec<DrawingData>> {
        query_as::<_, DrawingRow>(
            "SELECT * FROM drawings WHERE room_id = $1 ORDER BY timestamp DESC LIMIT $2",
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map(|rows| rows.into_iter().map(Into::into).collect())
        .map_err(|e| e.any())
    }
}

impl IntoDatabaseError for SqlxError {
    fn any(self) -> DatabaseError {
        DatabaseError::Internal(Box::new(self))
    }

    fn not_found_or(self, resource: &'static str, identifier: &'static str) -> DatabaseError {
        match self {
            SqlxError::RowNotFound => DatabaseError::NotFound {
                resource,
                identifier,
            },
            e => Self::any(e),
        }
    }
}
