mod operation;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;

pub use operation::*;

use crate::{CollabContext, Database, RoomId, SessionConnectionId, SessionEvent};

/// The transient, per-room ordered log of drawing operations since the
/// room was last cleared. Only the relay writes to it.
#[derive(Clone, Default)]
pub struct CanvasStore {
    logs: Arc<DashMap<RoomId, Vec<DrawOperation>>>,
}

impl CanvasStore {
    /// Returns a copy of the current log for a room, creating an empty
    /// one if the room has none yet.
    pub fn log(&self, room_id: RoomId) -> Vec<DrawOperation> {
        self.logs.entry(room_id).or_default().clone()
    }

    pub fn len(&self, room_id: RoomId) -> usize {
        self.logs.get(&room_id).map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, room_id: RoomId) -> bool {
        self.len(room_id) == 0
    }

    fn append(&self, room_id: RoomId, operation: DrawOperation) {
        self.logs.entry(room_id).or_default().push(operation)
    }

    fn clear(&self, room_id: RoomId) {
        self.logs.entry(room_id).or_default().clear()
    }
}

/// Fans drawing operations out to the members of the sender's room,
/// applying them to the [CanvasStore] where appropriate.
pub struct CanvasRelay<Db> {
    context: CollabContext<Db>,
}

impl<Db> CanvasRelay<Db>
where
    Db: Database,
{
    pub fn new(context: &CollabContext<Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Dispatches one inbound operation. A connection without a room
    /// assignment is silently ignored.
    pub fn relay(&self, connection_id: SessionConnectionId, mut operation: DrawOperation) {
        let registry = &self.context.registry;

        let Some(room_id) = registry.assignment(connection_id) else {
            return;
        };

        match operation.kind {
            OperationKind::Clear => {
                self.context.canvases.clear(room_id);
                self.stamp(connection_id, &mut operation);

                // Unlike ordinary operations, the sender hears its own clear
                registry.broadcast(room_id, SessionEvent::Draw(operation));
            }
            OperationKind::Undo { .. } | OperationKind::Redo { .. } => {
                // History is client-authoritative; forward the snapshot
                // without touching the server log
                registry.broadcast_except(room_id, connection_id, SessionEvent::Draw(operation));
            }
            _ => {
                self.stamp(connection_id, &mut operation);
                self.context.canvases.append(room_id, operation.clone());

                registry.broadcast_except(room_id, connection_id, SessionEvent::Draw(operation));
            }
        }
    }

    fn stamp(&self, connection_id: SessionConnectionId, operation: &mut DrawOperation) {
        operation.timestamp = Some(Utc::now().timestamp_millis());

        if let Some(identity) = self.context.registry.identity(connection_id) {
            operation.user_id = Some(identity.user_id);
            operation.username = Some(identity.username);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn line() -> DrawOperation {
        DrawOperation::new(OperationKind::Line {
            tool: "pen".to_string(),
            points: vec![0.0, 0.0, 1.0, 1.0],
            stroke: "#000000".to_string(),
            stroke_width: 5.0,
            global_composite_operation: None,
        })
    }

    #[test]
    fn log_starts_empty_and_appends_in_order() {
        let store = CanvasStore::default();

        assert!(store.is_empty(1));

        store.append(1, line());
        store.append(1, line());

        assert_eq!(store.len(1), 2);
        assert!(store.is_empty(2));
    }

    #[test]
    fn clear_truncates_a_single_room() {
        let store = CanvasStore::default();

        store.append(1, line());
        store.append(2, line());
        store.clear(1);

        assert!(store.is_empty(1));
        assert_eq!(store.len(2), 1);
    }
}
