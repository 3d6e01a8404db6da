use chrono::Utc;
use thiserror::Error;

use crate::{
    CollabContext, Database, DatabaseError, MessageData, NewMessage, RoomId, SessionConnectionId,
    SessionEvent,
};

/// Durably appends chat messages and fans them out to the sender's room.
/// A message is never broadcast unless its write already succeeded.
pub struct Chat<Db> {
    context: CollabContext<Db>,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Failed to store message")]
    Persistence(#[source] DatabaseError),
}

impl<Db> Chat<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Stores and broadcasts one message from a connection. A connection
    /// without a room assignment is silently ignored. On a failed write
    /// only the sender hears about it, and nothing is broadcast.
    pub async fn send(
        &self,
        connection_id: SessionConnectionId,
        text: String,
    ) -> Result<(), ChatError> {
        let registry = &self.context.registry;

        let Some(room_id) = registry.assignment(connection_id) else {
            return Ok(());
        };

        let Some(identity) = registry.identity(connection_id) else {
            return Ok(());
        };

        let new_message = NewMessage {
            room_id,
            user_id: identity.user_id,
            username: identity.username,
            message: text,
            timestamp: Utc::now(),
        };

        let stored = match self.context.database.create_message(new_message).await {
            Ok(stored) => stored,
            Err(e) => {
                registry.send_to(
                    connection_id,
                    SessionEvent::Error("Failed to send message".to_string()),
                );

                return Err(ChatError::Persistence(e));
            }
        };

        registry.broadcast(
            room_id,
            SessionEvent::NewMessage {
                user_id: stored.user_id,
                username: stored.username,
                message: stored.message,
                timestamp: stored.timestamp,
            },
        );

        Ok(())
    }

    /// The most recent `limit` messages of a room, oldest first
    pub async fn history(
        &self,
        room_id: RoomId,
        limit: i64,
    ) -> Result<Vec<MessageData>, DatabaseError> {
        self.context.database.messages_by_room(room_id, limit).await
    }
}
