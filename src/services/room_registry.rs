//! Room lifecycle: creation, snapshot reads, target changes and resets.

use rand::{Rng, rng};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    clock::now_millis,
    dao::{models::RoomEntity, room::RoomRepository},
    dto::room::{CreateRoomRequest, RoomDto, RoomSnapshotResponse},
    error::ServiceError,
    services::counter_engine::target_reached,
    state::SharedState,
};

/// Persist a new room with a zeroed counter.
pub async fn create_room(
    state: &SharedState,
    request: CreateRoomRequest,
) -> Result<RoomDto, ServiceError> {
    let config = state.config();
    let rooms = state.rooms().await?;

    let CreateRoomRequest {
        id,
        code,
        name,
        phrase,
        phrase_image,
        target_count,
        owner_id,
        created_at,
    } = request;

    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput("room name must not be empty".into()));
    }
    if name.chars().count() > config.max_name_length() {
        return Err(ServiceError::InvalidInput(format!(
            "room name must be at most {} characters",
            config.max_name_length()
        )));
    }
    if owner_id.trim().is_empty() {
        return Err(ServiceError::InvalidInput("owner id must not be empty".into()));
    }

    let phrase = if phrase.trim().is_empty() && phrase_image.is_none() {
        config.default_phrase().to_string()
    } else {
        phrase
    };

    let code = match code {
        Some(code) => {
            if rooms.exists(&code).await? {
                return Err(ServiceError::CodeTaken(format!("room code `{code}` is already in use")));
            }
            code
        }
        None => allocate_code(&rooms, config.code_length(), config.code_allocation_attempts()).await?,
    };

    let room = RoomEntity {
        id: id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().simple().to_string()),
        code,
        name,
        phrase,
        phrase_image,
        target_count,
        total_count: 0,
        is_completed: false,
        created_at: created_at.unwrap_or_else(now_millis),
        owner_id,
    };

    rooms.create(&room).await?;
    info!(code = %room.code, target = room.target_count, "room created");

    Ok(room.into())
}

/// Read the room, its atomic total and all participants with their counts.
pub async fn get_snapshot(
    state: &SharedState,
    code: &str,
) -> Result<RoomSnapshotResponse, ServiceError> {
    let rooms = state.rooms().await?;
    rooms
        .snapshot(code)
        .await?
        .map(Into::into)
        .ok_or_else(|| ServiceError::NotFound("Room not found".into()))
}

/// Replace the target and re-evaluate completion against the current total.
///
/// Raising the target above the total reopens a completed room; lowering it to
/// or below the total completes it. Returns the resulting completion flag.
pub async fn update_target(
    state: &SharedState,
    code: &str,
    new_target: u64,
) -> Result<bool, ServiceError> {
    let rooms = state.rooms().await?;
    let Some((mut room, total)) = rooms.find_with_total(code).await? else {
        return Err(ServiceError::NotFound("Room not found".into()));
    };

    let was_completed = room.is_completed;
    room.target_count = new_target;
    room.is_completed = target_reached(new_target, total);
    rooms.save(&room).await?;

    if was_completed != room.is_completed {
        info!(%code, total, target = new_target, completed = room.is_completed, "completion re-evaluated");
    }
    Ok(room.is_completed)
}

/// Zero the total, clear completion and wipe personal counts. Members stay.
pub async fn reset(state: &SharedState, code: &str) -> Result<(), ServiceError> {
    let rooms = state.rooms().await?;
    let Some(mut room) = rooms.find(code).await? else {
        return Err(ServiceError::NotFound("Room not found".into()));
    };

    room.is_completed = false;
    room.total_count = 0;
    rooms.reset(&room).await?;
    info!(%code, "room reset");
    Ok(())
}

async fn allocate_code(
    rooms: &RoomRepository,
    length: u32,
    attempts: u32,
) -> Result<String, ServiceError> {
    for attempt in 1..=attempts {
        let code = generate_code(length);
        if !rooms.exists(&code).await? {
            return Ok(code);
        }
        warn!(%code, attempt, "generated room code already in use; retrying");
    }
    Err(ServiceError::CodeTaken(format!(
        "no free room code found after {attempts} attempts"
    )))
}

/// Random numeric code of `length` digits without a leading zero.
fn generate_code(length: u32) -> String {
    let low = 10u64.pow(length - 1);
    let high = 10u64.pow(length);
    rng().random_range(low..high).to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::counter_store::memory::MemoryCounterStore,
        services::{counter_engine, participant_ledger},
        dto::action::JoinParticipant,
        state::AppState,
    };

    async fn state() -> SharedState {
        AppState::with_store(AppConfig::default(), Arc::new(MemoryCounterStore::new())).await
    }

    fn request(code: Option<&str>, target: u64) -> CreateRoomRequest {
        CreateRoomRequest {
            id: None,
            code: code.map(str::to_string),
            name: "Friday circle".into(),
            phrase: String::new(),
            phrase_image: None,
            target_count: target,
            owner_id: "device-1".into(),
            created_at: Some(42),
        }
    }

    fn joiner(name: &str) -> JoinParticipant {
        JoinParticipant {
            id: None,
            name: name.into(),
            joined_at: None,
        }
    }

    #[test]
    fn generated_codes_have_the_requested_width() {
        for _ in 0..100 {
            let code = generate_code(6);
            assert_eq!(code.len(), 6);
            assert!(!code.starts_with('0'));
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[tokio::test]
    async fn create_fills_defaults_and_zeroes_the_counter() {
        let state = state().await;
        let room = create_room(&state, request(None, 33)).await.unwrap();

        assert_eq!(room.code.len(), 6);
        assert_eq!(room.phrase, "سبحان الله");
        assert_eq!(room.created_at, 42);
        assert!(!room.id.is_empty());
        assert!(!room.is_completed);

        let snapshot = get_snapshot(&state, &room.code).await.unwrap();
        assert_eq!(snapshot.room, room);
        assert!(snapshot.participants.is_empty());
    }

    #[tokio::test]
    async fn create_rejects_a_code_held_by_a_live_room() {
        let state = state().await;
        create_room(&state, request(Some("123456"), 0)).await.unwrap();
        let err = create_room(&state, request(Some("123456"), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::CodeTaken(_)));
    }

    #[tokio::test]
    async fn create_rejects_blank_names() {
        let state = state().await;
        let mut blank = request(None, 0);
        blank.name = "   ".into();
        let err = create_room(&state, blank).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn snapshot_of_unknown_room_is_not_found() {
        let state = state().await;
        let err = get_snapshot(&state, "000001").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn two_participants_reach_the_target() {
        let state = state().await;
        let room = create_room(&state, request(Some("300003"), 3)).await.unwrap();
        let a = participant_ledger::join(&state, &room.code, joiner("A")).await.unwrap();
        let b = participant_ledger::join(&state, &room.code, joiner("B")).await.unwrap();

        counter_engine::tap(&state, &room.code, &a.id).await.unwrap();
        counter_engine::tap(&state, &room.code, &b.id).await.unwrap();
        counter_engine::tap(&state, &room.code, &b.id).await.unwrap();

        let snapshot = get_snapshot(&state, &room.code).await.unwrap();
        assert!(snapshot.room.is_completed);
        assert_eq!(snapshot.room.total_count, 3);
        let counts = snapshot
            .participants
            .iter()
            .map(|p| (p.name.as_str(), p.personal_count))
            .collect::<Vec<_>>();
        assert_eq!(counts, vec![("A", 1), ("B", 2)]);

        let late = counter_engine::tap(&state, &room.code, &a.id).await.unwrap();
        assert_eq!(late, counter_engine::TapOutcome::AlreadyCompleted);
        let snapshot = get_snapshot(&state, &room.code).await.unwrap();
        assert_eq!(snapshot.room.total_count, 3);
    }

    #[tokio::test]
    async fn update_target_re_evaluates_completion_both_ways() {
        let state = state().await;
        let room = create_room(&state, request(Some("700007"), 3)).await.unwrap();
        for _ in 0..7 {
            // Taps after completion are rejected, so raise the target out of the way first.
            update_target(&state, &room.code, 0).await.unwrap();
            counter_engine::tap(&state, &room.code, "p").await.unwrap();
        }
        assert!(update_target(&state, &room.code, 3).await.unwrap());

        assert!(!update_target(&state, &room.code, 10).await.unwrap());
        let snapshot = get_snapshot(&state, &room.code).await.unwrap();
        assert!(!snapshot.room.is_completed);
        assert_eq!(snapshot.room.target_count, 10);

        assert!(update_target(&state, &room.code, 5).await.unwrap());
        assert!(update_target(&state, &room.code, 7).await.unwrap());
        assert!(!update_target(&state, &room.code, 0).await.unwrap());
    }

    #[tokio::test]
    async fn reset_is_idempotent_and_keeps_members() {
        let state = state().await;
        let room = create_room(&state, request(Some("500005"), 2)).await.unwrap();
        let a = participant_ledger::join(&state, &room.code, joiner("A")).await.unwrap();
        counter_engine::tap(&state, &room.code, &a.id).await.unwrap();
        counter_engine::tap(&state, &room.code, &a.id).await.unwrap();
        assert!(get_snapshot(&state, &room.code).await.unwrap().room.is_completed);

        reset(&state, &room.code).await.unwrap();
        let first = get_snapshot(&state, &room.code).await.unwrap();
        reset(&state, &room.code).await.unwrap();
        let second = get_snapshot(&state, &room.code).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.room.total_count, 0);
        assert!(!first.room.is_completed);
        assert_eq!(first.participants.len(), 1);
        assert_eq!(first.participants[0].personal_count, 0);

        let outcome = counter_engine::tap(&state, &room.code, &a.id).await.unwrap();
        assert!(matches!(
            outcome,
            counter_engine::TapOutcome::Counted { new_total: 1, .. }
        ));
    }

    #[tokio::test]
    async fn reset_and_update_target_on_missing_room_are_not_found() {
        let state = state().await;
        assert!(matches!(
            reset(&state, "999999").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            update_target(&state, "999999", 3).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn degraded_state_refuses_room_operations() {
        let state = AppState::new(AppConfig::default());
        let err = create_room(&state, request(None, 0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }
}
