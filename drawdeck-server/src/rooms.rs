use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use drawdeck_collab::{util::hash_secret, Database, NewDrawing, NewRoom};

use crate::{
    auth::Session,
    errors::{ServerError, ServerResult},
    schemas::{NewDrawingSchema, NewRoomSchema, ValidatedJson},
    serialized::{Drawing, Message, Room, ToSerialized},
    Router, ServerContext,
};

const DEFAULT_MESSAGE_LIMIT: i64 = 50;
const DEFAULT_DRAWING_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<i64>,
}

async fn list_rooms(
    _session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Room>>> {
    let rooms = context.collab.database().list_rooms().await?;

    Ok(Json(rooms.to_serialized()))
}

async fn room(
    _session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Room>> {
    let room = context.collab.database().room_by_id(room_id).await?;

    Ok(Json(room.to_serialized()))
}

async fn create_room(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewRoomSchema>,
) -> ServerResult<Json<Room>> {
    let password = body
        .password
        .as_deref()
        .map(hash_secret)
        .transpose()
        .map_err(ServerError::Unknown)?;

    let room = context
        .collab
        .database()
        .create_room(NewRoom {
            name: body.name,
            is_private: body.is_private || password.is_some(),
            password,
            max_users: body.max_users.unwrap_or(10),
            created_by: session.user().id,
        })
        .await?;

    Ok(Json(room.to_serialized()))
}

async fn delete_room(
    session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<()> {
    let room = context.collab.database().room_by_id(room_id).await?;

    if room.created_by != session.user().id {
        return Err(ServerError::NotRoomCreator);
    }

    context.collab.database().delete_room(room_id).await?;

    Ok(())
}

/// Fallback for clients whose transport already went away: drops the
/// persisted count by one without going through a live connection.
async fn leave_room(
    _session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Room>> {
    let database = context.collab.database();
    let room = database.room_by_id(room_id).await?;

    if room.active_users > 0 {
        database
            .update_room_active_users(room_id, room.active_users - 1)
            .await?;
    }

    let room = database.room_by_id(room_id).await?;

    Ok(Json(room.to_serialized()))
}

async fn messages(
    _session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    Query(params): Query<HistoryParams>,
) -> ServerResult<Json<Vec<Message>>> {
    let limit = params.limit.unwrap_or(DEFAULT_MESSAGE_LIMIT);
    let messages = context.collab.chat.history(room_id, limit).await?;

    Ok(Json(messages.to_serialized()))
}

async fn create_drawing(
    _session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    ValidatedJson(body): ValidatedJson<NewDrawingSchema>,
) -> ServerResult<Json<Drawing>> {
    let drawing = context
        .collab
        .database()
        .create_drawing(NewDrawing {
            room_id,
            lines: body.lines,
            shapes: body.shapes,
            timestamp: Utc::now(),
        })
        .await?;

    Ok(Json(drawing.to_serialized()))
}

async fn drawings(
    _session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
    Query(params): Query<HistoryParams>,
) -> ServerResult<Json<Vec<Drawing>>> {
    let limit = params.limit.unwrap_or(DEFAULT_DRAWING_LIMIT);
    let drawings = context
        .collab
        .database()
        .drawings_by_room(room_id, limit)
        .await?;

    Ok(Json(drawings.to_serialized()))
}

async fn latest_drawing(
    _session: Session,
    State(context): State<ServerContext>,
    Path(room_id): Path<i32>,
) -> ServerResult<Json<Drawing>> {
    let drawing = context.collab.database().latest_drawing(room_id).await?;

    Ok(Json(drawing.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rooms))
        .route("/", post(create_room))
        .route("/:id", get(room))
        .route("/:id", delete(delete_room))
        .route("/:id/leave", post(leave_room))
        .route("/:id/messages", get(messages))
        .route("/:id/drawings", get(drawings))
        .route("/:id/drawings", post(create_drawing))
        .route("/:id/drawings/latest", get(latest_drawing))
}
