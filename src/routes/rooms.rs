use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderValue, header},
    routing::{get, post},
};
use axum_valid::Valid;
use tower_http::set_header::SetResponseHeaderLayer;
use validator::Validate;

use crate::{
    dto::{
        action::{ActionRequest, ActionResponse, RoomAction},
        room::{CreateRoomRequest, RoomDto, RoomQuery, RoomSnapshotResponse},
        validation::validate_room_code,
    },
    error::AppError,
    services::{
        counter_engine::{self, TapOutcome},
        participant_ledger, room_registry,
    },
    state::SharedState,
};

/// Room routes under `/api`. Every response, errors included, is marked uncacheable.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/create", post(create_room))
        .route("/api/room", get(get_room))
        .route("/api/action", post(room_action))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
}

/// Create a room and zero its counter.
#[utoipa::path(
    post,
    path = "/api/create",
    tag = "rooms",
    request_body = CreateRoomRequest,
    responses(
        (status = 200, description = "Room created", body = RoomDto),
        (status = 400, description = "Invalid room payload"),
        (status = 409, description = "Room code already in use"),
        (status = 503, description = "Counter store unavailable")
    )
)]
pub async fn create_room(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateRoomRequest>>,
) -> Result<Json<RoomDto>, AppError> {
    let room = room_registry::create_room(&state, payload).await?;
    Ok(Json(room))
}

/// Fetch the room with its authoritative total and every participant's count.
#[utoipa::path(
    get,
    path = "/api/room",
    tag = "rooms",
    params(RoomQuery),
    responses(
        (status = 200, description = "Room snapshot", body = RoomSnapshotResponse),
        (status = 400, description = "Missing or malformed room code"),
        (status = 404, description = "Room not found"),
        (status = 500, description = "Stored room is corrupt")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Query(query): Query<RoomQuery>,
) -> Result<Json<RoomSnapshotResponse>, AppError> {
    let code = room_code(&query.code, "Code required")?;
    let snapshot = room_registry::get_snapshot(&state, code).await?;
    Ok(Json(snapshot))
}

/// Apply one member action (join, tap, reset, target update) to a room.
#[utoipa::path(
    post,
    path = "/api/action",
    tag = "rooms",
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Action applied or rejected", body = ActionResponse),
        (status = 400, description = "Malformed action or payload"),
        (status = 404, description = "Room not found"),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn room_action(
    State(state): State<SharedState>,
    Json(request): Json<ActionRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let (code, action) = request
        .into_action()
        .map_err(|err| AppError::BadRequest(format!("invalid payload: {err}")))?;
    let code = room_code(&code, "Room code required")?;

    let response = match action {
        RoomAction::Join(participant) => {
            participant.validate()?;
            let participant = participant_ledger::join(&state, code, participant).await?;
            ActionResponse {
                participant: Some(participant),
                ..ActionResponse::ok()
            }
        }
        RoomAction::Tap { participant_id } => {
            match counter_engine::tap(&state, code, &participant_id).await? {
                TapOutcome::Counted { new_total, .. } => ActionResponse {
                    new_total: Some(new_total),
                    ..ActionResponse::ok()
                },
                TapOutcome::AlreadyCompleted => ActionResponse::rejected("Completed"),
            }
        }
        RoomAction::Reset => {
            room_registry::reset(&state, code).await?;
            ActionResponse::ok()
        }
        RoomAction::UpdateTarget { new_target } => {
            let is_completed = room_registry::update_target(&state, code, new_target).await?;
            ActionResponse {
                is_completed: Some(is_completed),
                ..ActionResponse::ok()
            }
        }
    };

    Ok(Json(response))
}

/// Trim a caller-supplied room code and reject anything but digits.
fn room_code<'a>(raw: &'a str, missing: &str) -> Result<&'a str, AppError> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(AppError::BadRequest(missing.to_string()));
    }
    validate_room_code(code).map_err(|err| {
        AppError::BadRequest(
            err.message
                .map(|message| message.into_owned())
                .unwrap_or_else(|| err.code.into_owned()),
        )
    })?;
    Ok(code)
}
