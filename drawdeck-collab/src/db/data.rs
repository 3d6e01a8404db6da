use chrono::{DateTime, Utc};
use serde_json::Value;

/// The type used for primary keys in the database.
pub type PrimaryKey = i32;

/// A drawdeck account
#[derive(Debug, Clone)]
pub struct UserData {
    pub id: PrimaryKey,
    pub username: String,
    /// argon2 hash, never the plaintext
    pub password: String,
}

/// Login session data for authentication
#[derive(Debug, Clone)]
pub struct SessionData {
    pub id: PrimaryKey,
    /// The session token, or key if you will
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// The user that is logged in
    pub user: UserData,
}

/// A collaboration room with a shared canvas and chat stream
#[derive(Debug, Clone)]
pub struct RoomData {
    pub id: PrimaryKey,
    pub name: String,
    pub is_private: bool,
    /// argon2 hash of the access secret, set only for private rooms
    pub password: Option<String>,
    /// Maximum amount of simultaneous connections
    pub max_users: i32,
    /// Persisted mirror of the live connection count, overwritten
    /// wholesale on every membership transition
    pub active_users: i32,
    pub created_by: PrimaryKey,
}

/// A chat message, immutable once stored
#[derive(Debug, Clone)]
pub struct MessageData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub username: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// A persisted canvas snapshot for a room
#[derive(Debug, Clone)]
pub struct DrawingData {
    pub id: PrimaryKey,
    pub room_id: PrimaryKey,
    /// Client-shaped line list, stored as-is
    pub lines: Value,
    /// Client-shaped shape list, stored as-is
    pub shapes: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewUser {
    pub username: String,
    pub password: String,
}

#[derive(Debug)]
pub struct NewSession {
    pub token: String,
    pub user_id: PrimaryKey,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewRoom {
    pub name: String,
    pub is_private: bool,
    pub password: Option<String>,
    pub max_users: i32,
    /// The creator of the new room
    pub created_by: PrimaryKey,
}

#[derive(Debug)]
pub struct NewMessage {
    pub room_id: PrimaryKey,
    pub user_id: PrimaryKey,
    pub username: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewDrawing {
    pub room_id: PrimaryKey,
    pub lines: Value,
    pub shapes: Value,
    pub timestamp: DateTime<Utc>,
}
