use drawdeck_collab::{
    util::hash_secret, ChatError, Collab, Database, DrawOperation, EventReceiver, MemoryDatabase,
    NewRoom, NewUser, OperationKind, PresenceEntry, PrimaryKey, SessionConnectionId, SessionError,
    SessionEvent, ShapeKind,
};
use serde_json::json;
use tokio::sync::mpsc::unbounded_channel;

struct Client {
    id: SessionConnectionId,
    events: EventReceiver,
}

impl Client {
    /// Everything delivered to this connection so far
    fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }

        events
    }

    fn assert_quiet(&mut self) {
        assert!(self.events.try_recv().is_err(), "expected no events");
    }
}

async fn connect(collab: &Collab<MemoryDatabase>, username: &str) -> Client {
    let user = collab
        .database()
        .create_user(NewUser {
            username: username.to_string(),
            password: "irrelevant".to_string(),
        })
        .await
        .unwrap();

    let (tx, rx) = unbounded_channel();
    let id = collab.sessions.connect(user.id, &user.username, tx);

    Client { id, events: rx }
}

async fn create_room(
    collab: &Collab<MemoryDatabase>,
    max_users: i32,
    password: Option<&str>,
) -> PrimaryKey {
    let creator = collab
        .database()
        .create_user(NewUser {
            username: format!("creator-{}", max_users),
            password: "irrelevant".to_string(),
        })
        .await
        .unwrap();

    collab
        .database()
        .create_room(NewRoom {
            name: "test room".to_string(),
            is_private: password.is_some(),
            password: password.map(|p| hash_secret(p).unwrap()),
            max_users,
            created_by: creator.id,
        })
        .await
        .unwrap()
        .id
}

fn line_operation() -> DrawOperation {
    DrawOperation::new(OperationKind::Line {
        tool: "pen".to_string(),
        points: vec![10.0, 10.0, 20.0, 20.0],
        stroke: "#ff0000".to_string(),
        stroke_width: 5.0,
        global_composite_operation: None,
    })
}

fn presence_of(event: &SessionEvent) -> &[PresenceEntry] {
    match event {
        SessionEvent::UserJoined { active_users, .. }
        | SessionEvent::UserLeft { active_users, .. } => active_users,
        other => panic!("expected presence event, got {:?}", other),
    }
}

#[tokio::test]
async fn joining_at_one_below_capacity_succeeds_and_at_capacity_fails() {
    // The reference implementation let one extra member slip past the
    // limit; this build uses the strict bound.
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 2, None).await;

    let a = connect(&collab, "ada").await;
    let b = connect(&collab, "grace").await;
    let c = connect(&collab, "linus").await;

    collab.sessions.join_room(a.id, room, None).await.unwrap();

    // One below capacity: admitted
    collab.sessions.join_room(b.id, room, None).await.unwrap();

    // At capacity: rejected
    let result = collab.sessions.join_room(c.id, room, None).await;
    assert!(matches!(result, Err(SessionError::RoomFull)));
    assert_eq!(collab.registry().room_size(room), 2);
}

#[tokio::test]
async fn joining_a_nonexistent_room_fails() {
    let collab = Collab::new(MemoryDatabase::new());
    let a = connect(&collab, "ada").await;

    let result = collab.sessions.join_room(a.id, 999, None).await;
    assert!(matches!(result, Err(SessionError::RoomNotFound)));
}

#[tokio::test]
async fn private_room_requires_the_correct_password() {
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, Some("sekret")).await;

    let mut a = connect(&collab, "ada").await;

    let wrong = collab
        .sessions
        .join_room(a.id, room, Some("nope".to_string()))
        .await;
    assert!(matches!(wrong, Err(SessionError::InvalidPassword)));

    let missing = collab.sessions.join_room(a.id, room, None).await;
    assert!(matches!(missing, Err(SessionError::InvalidPassword)));

    // Membership is untouched by the failed attempts
    assert_eq!(collab.registry().assignment(a.id), None);
    assert_eq!(collab.registry().room_size(room), 0);
    a.assert_quiet();

    collab
        .sessions
        .join_room(a.id, room, Some("sekret".to_string()))
        .await
        .unwrap();
    assert_eq!(collab.registry().assignment(a.id), Some(room));
}

#[tokio::test]
async fn presence_broadcasts_reach_the_whole_room_with_fresh_lists() {
    // Scenario A from the coordination design
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 2, None).await;

    let mut a = connect(&collab, "ada").await;
    let mut b = connect(&collab, "grace").await;
    let c = connect(&collab, "linus").await;

    collab.sessions.join_room(a.id, room, None).await.unwrap();

    let events = a.drain();
    assert_eq!(presence_of(&events[0]).len(), 1);

    collab.sessions.join_room(b.id, room, None).await.unwrap();

    // Both members hear about B, with a list containing exactly A and B
    let a_events = a.drain();
    let b_events = b.drain();

    let a_list = presence_of(&a_events[0]);
    assert_eq!(a_list.len(), 2);
    assert!(a_list.iter().any(|m| m.username == "ada"));
    assert!(a_list.iter().any(|m| m.username == "grace"));

    assert_eq!(presence_of(&b_events[0]), a_list);

    let result = collab.sessions.join_room(c.id, room, None).await;
    assert!(matches!(result, Err(SessionError::RoomFull)));
}

#[tokio::test]
async fn joining_connection_is_seeded_with_the_current_canvas() {
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, None).await;

    let a = connect(&collab, "ada").await;
    collab.sessions.join_room(a.id, room, None).await.unwrap();

    collab.canvas.relay(a.id, line_operation());
    collab.canvas.relay(a.id, line_operation());

    let mut b = connect(&collab, "grace").await;
    collab.sessions.join_room(b.id, room, None).await.unwrap();

    let seeded = b
        .drain()
        .into_iter()
        .find_map(|event| match event {
            SessionEvent::InitDrawings(log) => Some(log),
            _ => None,
        })
        .expect("joining connection receives initDrawings");

    assert_eq!(seeded.len(), 2);
}

#[tokio::test]
async fn line_operations_are_logged_and_relayed_to_everyone_else() {
    // Scenario B
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, None).await;

    let mut a = connect(&collab, "ada").await;
    let mut b = connect(&collab, "grace").await;

    collab.sessions.join_room(a.id, room, None).await.unwrap();
    collab.sessions.join_room(b.id, room, None).await.unwrap();
    a.drain();
    b.drain();

    collab.canvas.relay(a.id, line_operation());

    assert_eq!(collab.canvases().len(room), 1);

    // The sender hears no echo of its own line
    a.assert_quiet();

    let b_events = b.drain();
    match &b_events[0] {
        SessionEvent::Draw(operation) => {
            assert!(matches!(operation.kind, OperationKind::Line { .. }));
            assert!(operation.timestamp.is_some());
            assert_eq!(operation.username.as_deref(), Some("ada"));
        }
        other => panic!("expected draw event, got {:?}", other),
    }
}

#[tokio::test]
async fn shape_operations_carry_their_kind_through_the_relay() {
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, None).await;

    let a = connect(&collab, "ada").await;
    let mut b = connect(&collab, "grace").await;

    collab.sessions.join_room(a.id, room, None).await.unwrap();
    collab.sessions.join_room(b.id, room, None).await.unwrap();
    b.drain();

    collab.canvas.relay(
        a.id,
        DrawOperation::new(OperationKind::Shape {
            shape_type: ShapeKind::Circle,
            x: 50.0,
            y: 50.0,
            width: 0.0,
            height: 0.0,
            points: None,
            stroke: "#00ff00".to_string(),
            stroke_width: 3.0,
            radius: Some(12.5),
            fill: None,
            text: None,
            pointer_length: None,
            pointer_width: None,
        }),
    );

    let events = b.drain();
    match &events[0] {
        SessionEvent::Draw(operation) => match operation.kind {
            OperationKind::Shape {
                shape_type, radius, ..
            } => {
                assert_eq!(shape_type, ShapeKind::Circle);
                assert_eq!(radius, Some(12.5));
            }
            ref other => panic!("expected shape, got {:?}", other),
        },
        other => panic!("expected draw event, got {:?}", other),
    }
}

#[tokio::test]
async fn clear_truncates_the_log_and_reaches_the_sender_too() {
    // Scenario C
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, None).await;

    let mut a = connect(&collab, "ada").await;
    let mut b = connect(&collab, "grace").await;

    collab.sessions.join_room(a.id, room, None).await.unwrap();
    collab.sessions.join_room(b.id, room, None).await.unwrap();

    collab.canvas.relay(a.id, line_operation());
    assert_eq!(collab.canvases().len(room), 1);
    a.drain();
    b.drain();

    collab
        .canvas
        .relay(a.id, DrawOperation::new(OperationKind::Clear));

    assert!(collab.canvases().is_empty(room));

    for client in [&mut a, &mut b] {
        let events = client.drain();
        assert!(
            matches!(
                events.first(),
                Some(SessionEvent::Draw(op)) if matches!(op.kind, OperationKind::Clear)
            ),
            "both members receive the clear broadcast"
        );
    }
}

#[tokio::test]
async fn undo_is_forwarded_verbatim_and_never_logged() {
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, None).await;

    let mut a = connect(&collab, "ada").await;
    let mut b = connect(&collab, "grace").await;

    collab.sessions.join_room(a.id, room, None).await.unwrap();
    collab.sessions.join_room(b.id, room, None).await.unwrap();
    a.drain();
    b.drain();

    let snapshot = DrawOperation::new(OperationKind::Undo {
        lines: json!([{"tool": "pen"}]),
        shapes: json!([]),
        history_index: 3,
    });

    collab.canvas.relay(a.id, snapshot.clone());

    assert!(collab.canvases().is_empty(room));
    a.assert_quiet();

    let events = b.drain();
    assert_eq!(events, vec![SessionEvent::Draw(snapshot)]);
}

#[tokio::test]
async fn draws_and_chat_from_unassigned_connections_are_ignored() {
    let collab = Collab::new(MemoryDatabase::new());

    let mut a = connect(&collab, "ada").await;

    collab.canvas.relay(a.id, line_operation());
    collab
        .chat
        .send(a.id, "hello?".to_string())
        .await
        .unwrap();

    a.assert_quiet();
}

#[tokio::test]
async fn chat_messages_are_stored_before_reaching_the_whole_room() {
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, None).await;

    let mut a = connect(&collab, "ada").await;
    let mut b = connect(&collab, "grace").await;

    collab.sessions.join_room(a.id, room, None).await.unwrap();
    collab.sessions.join_room(b.id, room, None).await.unwrap();
    a.drain();
    b.drain();

    collab
        .chat
        .send(a.id, "hello world".to_string())
        .await
        .unwrap();

    let stored = collab.chat.history(room, 50).await.unwrap();
    assert_eq!(stored.len(), 1);

    // Both the sender and the rest of the room hear the stored message
    for client in [&mut a, &mut b] {
        let events = client.drain();
        match &events[0] {
            SessionEvent::NewMessage {
                username,
                message,
                timestamp,
                ..
            } => {
                assert_eq!(username, "ada");
                assert_eq!(message, "hello world");
                assert_eq!(*timestamp, stored[0].timestamp);
            }
            other => panic!("expected newMessage, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn failed_chat_writes_reach_only_the_sender() {
    // Scenario D
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, None).await;

    let mut a = connect(&collab, "ada").await;
    let mut b = connect(&collab, "grace").await;

    collab.sessions.join_room(a.id, room, None).await.unwrap();
    collab.sessions.join_room(b.id, room, None).await.unwrap();
    a.drain();
    b.drain();

    collab.database().fail_writes(true);

    let result = collab.chat.send(a.id, "lost message".to_string()).await;
    assert!(matches!(result, Err(ChatError::Persistence(_))));

    let a_events = a.drain();
    assert!(matches!(a_events.as_slice(), [SessionEvent::Error(_)]));

    b.assert_quiet();

    collab.database().fail_writes(false);
    assert!(collab.chat.history(room, 50).await.unwrap().is_empty());
}

#[tokio::test]
async fn chat_history_returns_most_recent_messages_oldest_first() {
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, None).await;

    let a = connect(&collab, "ada").await;
    collab.sessions.join_room(a.id, room, None).await.unwrap();

    for i in 0..5 {
        collab.chat.send(a.id, format!("message {}", i)).await.unwrap();
    }

    let history = collab.chat.history(room, 3).await.unwrap();

    let texts: Vec<_> = history.iter().map(|m| m.message.as_str()).collect();
    assert_eq!(texts, vec!["message 2", "message 3", "message 4"]);
}

#[tokio::test]
async fn persisted_count_tracks_the_registry_after_every_transition() {
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, None).await;

    let a = connect(&collab, "ada").await;
    let b = connect(&collab, "grace").await;

    collab.sessions.join_room(a.id, room, None).await.unwrap();
    assert_eq!(active_users(&collab, room).await, 1);

    collab.sessions.join_room(b.id, room, None).await.unwrap();
    assert_eq!(active_users(&collab, room).await, 2);

    collab.sessions.leave_room(a.id).await;
    assert_eq!(active_users(&collab, room).await, 1);

    collab.sessions.disconnect(b.id).await;
    assert_eq!(active_users(&collab, room).await, 0);
}

#[tokio::test]
async fn count_sync_failures_do_not_block_the_transition() {
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, None).await;

    let a = connect(&collab, "ada").await;

    collab.database().fail_writes(true);

    collab.sessions.join_room(a.id, room, None).await.unwrap();

    // Membership moved even though the counter write failed
    assert_eq!(collab.registry().assignment(a.id), Some(room));
    assert_eq!(active_users(&collab, room).await, 0);
}

#[tokio::test]
async fn leave_followed_by_disconnect_runs_the_transition_once() {
    let collab = Collab::new(MemoryDatabase::new());
    let room = create_room(&collab, 10, None).await;

    let a = connect(&collab, "ada").await;
    let mut b = connect(&collab, "grace").await;

    collab.sessions.join_room(a.id, room, None).await.unwrap();
    collab.sessions.join_room(b.id, room, None).await.unwrap();
    b.drain();

    // Explicit leave immediately followed by the transport teardown
    collab.sessions.leave_room(a.id).await;
    collab.sessions.disconnect(a.id).await;

    let left_events: Vec<_> = b
        .drain()
        .into_iter()
        .filter(|e| matches!(e, SessionEvent::UserLeft { .. }))
        .collect();

    assert_eq!(left_events.len(), 1, "exactly one userLeft broadcast");
    assert_eq!(presence_of(&left_events[0]).len(), 1);
    assert_eq!(active_users(&collab, room).await, 1);
}

#[tokio::test]
async fn switching_rooms_leaves_the_previous_room_first() {
    let collab = Collab::new(MemoryDatabase::new());
    let room_x = create_room(&collab, 10, None).await;
    let room_y = create_room(&collab, 5, None).await;

    let a = connect(&collab, "ada").await;
    let mut b = connect(&collab, "grace").await;

    collab.sessions.join_room(a.id, room_x, None).await.unwrap();
    collab.sessions.join_room(b.id, room_x, None).await.unwrap();
    b.drain();

    collab.sessions.join_room(a.id, room_y, None).await.unwrap();

    // At most one assignment, and it is the new room
    assert_eq!(collab.registry().assignment(a.id), Some(room_y));
    assert_eq!(collab.registry().room_size(room_x), 1);
    assert_eq!(collab.registry().room_size(room_y), 1);

    // The old room heard a full leave transition
    let b_events = b.drain();
    assert!(matches!(b_events[0], SessionEvent::UserLeft { .. }));
    assert_eq!(active_users(&collab, room_x).await, 1);
    assert_eq!(active_users(&collab, room_y).await, 1);
}

async fn active_users(collab: &Collab<MemoryDatabase>, room_id: PrimaryKey) -> i32 {
    collab
        .database()
        .room_by_id(room_id)
        .await
        .unwrap()
        .active_users
}
