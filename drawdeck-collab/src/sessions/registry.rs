use std::collections::HashMap;

use parking_lot::Mutex;

use crate::{
    util::Id, EventSender, PresenceEntry, PrimaryKey, SessionEvent,
};

pub type RoomId = PrimaryKey;
pub type SessionConnectionId = Id<SessionConnection>;

/// One authenticated real-time connection. The identity is attached at
/// registration and never changes for the connection's lifetime.
#[derive(Debug)]
pub struct SessionConnection {
    pub id: SessionConnectionId,
    pub user_id: PrimaryKey,
    pub username: String,
    room: Option<RoomId>,
    sender: EventSender,
}

/// The acting identity of a connection
#[derive(Debug, Clone)]
pub struct ConnectionIdentity {
    pub user_id: PrimaryKey,
    pub username: String,
}

/// The single source of truth for which connections are in which room.
///
/// Both indices live behind one lock and are only ever mutated together,
/// and only by this type. Event delivery goes through the per-connection
/// senders stored in the same records, so audiences are always computed
/// against the indices' current state.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<SessionConnectionId, SessionConnection>,
    rooms: HashMap<RoomId, Vec<SessionConnectionId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits an authenticated connection with no room assignment yet.
    pub fn register(
        &self,
        user_id: PrimaryKey,
        username: String,
        sender: EventSender,
    ) -> SessionConnectionId {
        let connection = SessionConnection {
            id: SessionConnectionId::new(),
            user_id,
            username,
            room: None,
            sender,
        };

        let id = connection.id;
        self.inner.lock().connections.insert(id, connection);

        id
    }

    /// Removes a connection record entirely. The caller must have run the
    /// leave transition first.
    pub fn unregister(&self, connection_id: SessionConnectionId) {
        let mut inner = self.inner.lock();

        if let Some(connection) = inner.connections.remove(&connection_id) {
            if let Some(room_id) = connection.room {
                inner.remove_from_room(room_id, connection_id);
            }
        }
    }

    pub fn identity(&self, connection_id: SessionConnectionId) -> Option<ConnectionIdentity> {
        self.inner
            .lock()
            .connections
            .get(&connection_id)
            .map(|c| ConnectionIdentity {
                user_id: c.user_id,
                username: c.username.clone(),
            })
    }

    pub fn assignment(&self, connection_id: SessionConnectionId) -> Option<RoomId> {
        self.inner
            .lock()
            .connections
            .get(&connection_id)
            .and_then(|c| c.room)
    }

    /// Assigns a connection to a room, updating both indices together.
    /// The connection must not hold another assignment.
    pub fn assign(&self, connection_id: SessionConnectionId, room_id: RoomId) -> bool {
        let mut inner = self.inner.lock();

        let Some(connection) = inner.connections.get_mut(&connection_id) else {
            return false;
        };

        debug_assert!(connection.room.is_none());
        connection.room = Some(room_id);

        inner.rooms.entry(room_id).or_default().push(connection_id);
        true
    }

    /// Clears a connection's assignment, returning the room it was in.
    /// Calling this for an unassigned connection is a no-op.
    pub fn remove_assignment(&self, connection_id: SessionConnectionId) -> Option<RoomId> {
        let mut inner = self.inner.lock();

        let room_id = inner
            .connections
            .get_mut(&connection_id)
            .and_then(|c| c.room.take())?;

        inner.remove_from_room(room_id, connection_id);
        Some(room_id)
    }

    /// The amount of connections currently assigned to a room
    pub fn room_size(&self, room_id: RoomId) -> usize {
        self.inner
            .lock()
            .rooms
            .get(&room_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    /// The current member list of a room, deduplicated by user id
    pub fn members(&self, room_id: RoomId) -> Vec<PresenceEntry> {
        let inner = self.inner.lock();

        let mut members: Vec<PresenceEntry> = Vec::new();

        for connection_id in inner.rooms.get(&room_id).into_iter().flatten() {
            let Some(connection) = inner.connections.get(connection_id) else {
                continue;
            };

            if members.iter().all(|m| m.user_id != connection.user_id) {
                members.push(PresenceEntry {
                    user_id: connection.user_id,
                    username: connection.username.clone(),
                });
            }
        }

        members
    }

    /// Delivers an event to a single connection
    pub fn send_to(&self, connection_id: SessionConnectionId, event: SessionEvent) {
        let inner = self.inner.lock();

        if let Some(connection) = inner.connections.get(&connection_id) {
            connection.send(event)
        }
    }

    /// Delivers an event to every connection in a room
    pub fn broadcast(&self, room_id: RoomId, event: SessionEvent) {
        self.broadcast_inner(room_id, None, event)
    }

    /// Delivers an event to every connection in a room except one
    pub fn broadcast_except(
        &self,
        room_id: RoomId,
        except: SessionConnectionId,
        event: SessionEvent,
    ) {
        self.broadcast_inner(room_id, Some(except), event)
    }

    fn broadcast_inner(
        &self,
        room_id: RoomId,
        except: Option<SessionConnectionId>,
        event: SessionEvent,
    ) {
        let inner = self.inner.lock();

        for connection_id in inner.rooms.get(&room_id).into_iter().flatten() {
            if Some(*connection_id) == except {
                continue;
            }

            if let Some(connection) = inner.connections.get(connection_id) {
                connection.send(event.clone())
            }
        }
    }
}

impl RegistryInner {
    fn remove_from_room(&mut self, room_id: RoomId, connection_id: SessionConnectionId) {
        if let Some(members) = self.rooms.get_mut(&room_id) {
            members.retain(|id| *id != connection_id);

            if members.is_empty() {
                self.rooms.remove(&room_id);
            }
        }
    }
}

impl SessionConnection {
    fn send(&self, event: SessionEvent) {
        // The receiving half closes when the transport goes away; the
        // disconnect path cleans the record up shortly after
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn registry_with(users: &[(PrimaryKey, &str)]) -> (SessionRegistry, Vec<SessionConnectionId>) {
        let registry = SessionRegistry::new();
        let ids = users
            .iter()
            .map(|(user_id, username)| {
                let (tx, _rx) = unbounded_channel();
                registry.register(*user_id, username.to_string(), tx)
            })
            .collect();

        (registry, ids)
    }

    #[test]
    fn indices_stay_consistent_across_assign_and_remove() {
        let (registry, ids) = registry_with(&[(1, "ada"), (2, "grace")]);

        assert!(registry.assign(ids[0], 10));
        assert!(registry.assign(ids[1], 10));

        assert_eq!(registry.room_size(10), 2);
        assert_eq!(registry.assignment(ids[0]), Some(10));

        assert_eq!(registry.remove_assignment(ids[0]), Some(10));
        assert_eq!(registry.assignment(ids[0]), None);
        assert_eq!(registry.room_size(10), 1);
    }

    #[test]
    fn remove_assignment_is_idempotent() {
        let (registry, ids) = registry_with(&[(1, "ada")]);

        registry.assign(ids[0], 10);

        assert_eq!(registry.remove_assignment(ids[0]), Some(10));
        assert_eq!(registry.remove_assignment(ids[0]), None);
        assert_eq!(registry.remove_assignment(ids[0]), None);
    }

    #[test]
    fn members_deduplicate_by_user_id() {
        let (registry, ids) = registry_with(&[(1, "ada"), (1, "ada"), (2, "grace")]);

        for id in &ids {
            registry.assign(*id, 10);
        }

        let members = registry.members(10);

        assert_eq!(registry.room_size(10), 3);
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn unregister_cleans_up_room_membership() {
        let (registry, ids) = registry_with(&[(1, "ada")]);

        registry.assign(ids[0], 10);
        registry.unregister(ids[0]);

        assert_eq!(registry.room_size(10), 0);
        assert!(registry.identity(ids[0]).is_none());
    }
}
