use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;

use super::{
    Database, DatabaseError, DatabaseResult, DrawingData, MessageData, NewDrawing, NewMessage,
    NewRoom, NewSession, NewUser, PrimaryKey, Result, RoomData, SessionData, UserData,
};

/// An in-process database implementation, used by tests and for running
/// drawdeck without a postgres instance.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
    fail_writes: AtomicBool,
}

#[derive(Default)]
struct State {
    next_id: PrimaryKey,
    users: Vec<UserData>,
    sessions: Vec<StoredSession>,
    rooms: Vec<RoomData>,
    messages: Vec<MessageData>,
    drawings: Vec<DrawingData>,
}

struct StoredSession {
    id: PrimaryKey,
    token: String,
    user_id: PrimaryKey,
    expires_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("injected write failure")]
struct WriteFailure;

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes message, drawing, and active-count writes fail until turned
    /// off again. Account and room writes are unaffected so fixtures can
    /// still be set up.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::Internal(Box::new(WriteFailure)));
        }

        Ok(())
    }
}

impl State {
    fn next_id(&mut self) -> PrimaryKey {
        self.next_id += 1;
        self.next_id
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn user_by_id(&self, user_id: PrimaryKey) -> Result<UserData> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "id",
            })
    }

    async fn user_by_username(&self, username: &str) -> Result<UserData> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "user",
                identifier: "username",
            })
    }

    async fn create_user(&self, new_user: NewUser) -> Result<UserData> {
        self.user_by_username(&new_user.username)
            .await
            .conflict_or_ok("user", "username", &new_user.username)?;

        let mut state = self.state.lock();
        let user = UserData {
            id: state.next_id(),
            username: new_user.username,
            password: new_user.password,
        };

        state.users.push(user.clone());
        Ok(user)
    }

    async fn session_by_token(&self, token: &str) -> Result<SessionData> {
        let state = self.state.lock();

        let session = state
            .sessions
            .iter()
            .find(|s| s.token == token)
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        let user = state
            .users
            .iter()
            .find(|u| u.id == session.user_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "session",
                identifier: "token",
            })?;

        Ok(SessionData {
            id: session.id,
            token: session.token.clone(),
            expires_at: session.expires_at,
            user,
        })
    }

    async fn create_session(&self, new_session: NewSession) -> Result<SessionData> {
        let token = {
            let mut state = self.state.lock();
            let id = state.next_id();

            state.sessions.push(StoredSession {
                id,
                token: new_session.token.clone(),
                user_id: new_session.user_id,
                expires_at: new_session.expires_at,
            });

            new_session.token
        };

        self.session_by_token(&token).await
    }

    async fn delete_session_by_token(&self, token: &str) -> Result<()> {
        let _ = self.session_by_token(token).await?;

        self.state.lock().sessions.retain(|s| s.token != token);
        Ok(())
    }

    async fn clear_expired_sessions(&self) -> Result<()> {
        let now = Utc::now();

        self.state.lock().sessions.retain(|s| s.expires_at > now);
        Ok(())
    }

    async fn room_by_id(&self, room_id: PrimaryKey) -> Result<RoomData> {
        self.state
            .lock()
            .rooms
            .iter()
            .find(|r| r.id == room_id)
            .cloned()
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            })
    }

    async fn list_rooms(&self) -> Result<Vec<RoomData>> {
        Ok(self.state.lock().rooms.clone())
    }

    async fn create_room(&self, new_room: NewRoom) -> Result<RoomData> {
        let _ = self.user_by_id(new_room.created_by).await?;

        let mut state = self.state.lock();
        let room = RoomData {
            id: state.next_id(),
            name: new_room.name,
            is_private: new_room.is_private,
            password: new_room.password,
            max_users: new_room.max_users,
            active_users: 0,
            created_by: new_room.created_by,
        };

        state.rooms.push(room.clone());
        Ok(room)
    }

    async fn delete_room(&self, room_id: PrimaryKey) -> Result<()> {
        let _ = self.room_by_id(room_id).await?;

        self.state.lock().rooms.retain(|r| r.id != room_id);
        Ok(())
    }

    async fn update_room_active_users(
        &self,
        room_id: PrimaryKey,
        active_users: i32,
    ) -> Result<()> {
        self.check_writable()?;

        let mut state = self.state.lock();
        let room = state
            .rooms
            .iter_mut()
            .find(|r| r.id == room_id)
            .ok_or(DatabaseError::NotFound {
                resource: "room",
                identifier: "id",
            })?;

        room.active_users = active_users;
        Ok(())
    }

    async fn create_message(&self, new_message: NewMessage) -> Result<MessageData> {
        self.check_writable()?;

        let mut state = self.state.lock();
        let message = MessageData {
            id: state.next_id(),
            room_id: new_message.room_id,
            user_id: new_message.user_id,
            username: new_message.username,
            message: new_message.message,
            timestamp: new_message.timestamp,
        };

        state.messages.push(message.clone());
        Ok(message)
    }

    async fn messages_by_room(&self, room_id: PrimaryKey, limit: i64) -> Result<Vec<MessageData>> {
        let state = self.state.lock();

        let mut messages: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect();

        messages.sort_by_key(|m| m.timestamp);

        // Most recent N, oldest first
        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages.split_off(skip))
    }

    async fn create_drawing(&self, new_drawing: NewDrawing) -> Result<DrawingData> {
        self.check_writable()?;

        let mut state = self.state.lock();
        let drawing = DrawingData {
            id: state.next_id(),
            room_id: new_drawing.room_id,
            lines: new_drawing.lines,
            shapes: new_drawing.shapes,
            timestamp: new_drawing.timestamp,
        };

        state.drawings.push(drawing.clone());
        Ok(drawing)
    }

    async fn latest_drawing(&self, room_id: PrimaryKey) -> Result<DrawingData> {
        self.drawings_by_room(room_id, 1)
            .await?
            .into_iter()
            .next()
            .ok_or(DatabaseError::NotFound {
                resource: "drawing",
                identifier: "room_id",
            })
    }

    async fn drawings_by_room(&self, room_id: PrimaryKey, limit: i64) -> Result<Vec<DrawingData>> {
        let state = self.state.lock();

        let mut drawings: Vec<_> = state
            .drawings
            .iter()
            .filter(|d| d.room_id == room_id)
            .cloned()
            .collect();

        drawings.sort_by_key(|d| std::cmp::Reverse(d.timestamp));
        drawings.truncate(limit as usize);

        Ok(drawings)
    }
}
