mod registry;

use log::{info, warn};
use thiserror::Error;

pub use registry::*;

use crate::{
    util::verify_secret, CollabContext, Database, DatabaseError, EventSender, PresenceEntry,
    PrimaryKey, SessionEvent,
};

/// Orchestrates membership transitions: capacity and access checks,
/// index updates, presence broadcasts, active-count sync, and canvas
/// seeding all happen here, as one unit of work per transition.
pub struct SessionManager<Db> {
    context: CollabContext<Db>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Room is full")]
    RoomFull,
    #[error("Invalid room password")]
    InvalidPassword,
    #[error("Connection is not registered")]
    UnknownConnection,
    /// Something else went wrong with the database
    #[error(transparent)]
    Db(DatabaseError),
}

impl<Db> SessionManager<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Admits an authenticated connection, wiring up its outbox. The
    /// returned id keys every later call for this connection.
    pub fn connect(
        &self,
        user_id: PrimaryKey,
        username: &str,
        sender: EventSender,
    ) -> SessionConnectionId {
        let id = self
            .context
            .registry
            .register(user_id, username.to_string(), sender);

        info!("User {} connected", username);
        id
    }

    /// Moves a connection into a room, leaving its previous room first
    /// if it had one. On success the fresh member list is returned, the
    /// room hears a presence broadcast, and the joining connection is
    /// seeded with the current canvas log.
    pub async fn join_room(
        &self,
        connection_id: SessionConnectionId,
        room_id: RoomId,
        password: Option<String>,
    ) -> Result<Vec<PresenceEntry>, SessionError> {
        let registry = &self.context.registry;

        let identity = registry
            .identity(connection_id)
            .ok_or(SessionError::UnknownConnection)?;

        let room = self
            .context
            .database
            .room_by_id(room_id)
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound { .. } => SessionError::RoomNotFound,
                e => SessionError::Db(e),
            })?;

        // Capacity is checked against the size before admission. A failed
        // join leaves any previous membership untouched, so all checks
        // come before the leave transition below.
        let current_size = registry.room_size(room_id);

        if current_size + 1 > room.max_users as usize {
            return Err(SessionError::RoomFull);
        }

        if room.is_private {
            let supplied = password.unwrap_or_default();
            let stored = room.password.as_deref().unwrap_or_default();

            if !verify_secret(&supplied, stored) {
                return Err(SessionError::InvalidPassword);
            }
        }

        if let Some(previous) = registry.remove_assignment(connection_id) {
            self.finish_leave(previous, &identity).await;
        }

        if !registry.assign(connection_id, room_id) {
            return Err(SessionError::UnknownConnection);
        }

        let members = registry.members(room_id);

        registry.broadcast(
            room_id,
            SessionEvent::UserJoined {
                user_id: identity.user_id,
                username: identity.username.clone(),
                active_users: members.clone(),
            },
        );

        self.sync_active_count(room_id).await;

        registry.send_to(
            connection_id,
            SessionEvent::InitDrawings(self.context.canvases.log(room_id)),
        );

        info!("User {} joined room {}", identity.username, room.name);

        Ok(members)
    }

    /// Removes a connection from its room. Idempotent: a connection
    /// without an assignment triggers nothing.
    pub async fn leave_room(&self, connection_id: SessionConnectionId) {
        let registry = &self.context.registry;

        let Some(identity) = registry.identity(connection_id) else {
            return;
        };

        if let Some(room_id) = registry.remove_assignment(connection_id) {
            self.finish_leave(room_id, &identity).await;
            info!("User {} left room {}", identity.username, room_id);
        }
    }

    /// Runs the leave transition and tears the connection down. Called
    /// exactly once per transport disconnect.
    pub async fn disconnect(&self, connection_id: SessionConnectionId) {
        self.leave_room(connection_id).await;
        self.context.registry.unregister(connection_id);

        info!("Connection {} disconnected", connection_id);
    }

    async fn finish_leave(&self, room_id: RoomId, identity: &ConnectionIdentity) {
        self.context.registry.broadcast(
            room_id,
            SessionEvent::UserLeft {
                user_id: identity.user_id,
                username: identity.username.clone(),
                active_users: self.context.registry.members(room_id),
            },
        );

        self.sync_active_count(room_id).await;
    }

    /// Mirrors the live connection count into the persisted room record.
    /// Best-effort: the membership change is already committed, so a
    /// failed write is logged and not retried.
    async fn sync_active_count(&self, room_id: RoomId) {
        let live_count = self.context.registry.room_size(room_id) as i32;

        if let Err(e) = self
            .context
            .database
            .update_room_active_users(room_id, live_count)
            .await
        {
            warn!("Failed to sync active user count for room {}: {}", room_id, e);
        }
    }
}
