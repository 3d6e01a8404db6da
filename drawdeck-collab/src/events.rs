use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{DrawOperation, PrimaryKey};

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// One `{userId, username}` pair in a room's member list, deduplicated
/// by user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: PrimaryKey,
    pub username: String,
}

/// Events delivered to individual connections over their outbox channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A user joined the room the receiving connection is in
    #[serde(rename_all = "camelCase")]
    UserJoined {
        user_id: PrimaryKey,
        username: String,
        active_users: Vec<PresenceEntry>,
    },
    /// A user left the room the receiving connection is in
    #[serde(rename_all = "camelCase")]
    UserLeft {
        user_id: PrimaryKey,
        username: String,
        active_users: Vec<PresenceEntry>,
    },
    /// The full current canvas log, sent once to a joining connection
    InitDrawings(Vec<DrawOperation>),
    /// A relayed drawing operation
    Draw(DrawOperation),
    /// A chat message that was durably stored
    #[serde(rename_all = "camelCase")]
    NewMessage {
        user_id: PrimaryKey,
        username: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// A failure scoped to the receiving connection
    Error(String),
}
