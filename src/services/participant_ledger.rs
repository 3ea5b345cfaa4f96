//! Membership of a room: joining under a unique display name.

use tracing::info;
use uuid::Uuid;

use crate::{
    clock::now_millis,
    dao::models::ParticipantEntity,
    dto::{action::JoinParticipant, room::ParticipantDto},
    error::ServiceError,
    state::SharedState,
};

/// Append a participant to room `code`.
///
/// Names are compared after trimming. The uniqueness check and the append are
/// separate round-trips, so two simultaneous joins with the same name can both
/// succeed.
pub async fn join(
    state: &SharedState,
    code: &str,
    participant: JoinParticipant,
) -> Result<ParticipantDto, ServiceError> {
    let config = state.config();
    let rooms = state.rooms().await?;

    let name = participant.name.trim().to_string();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput("participant name must not be empty".into()));
    }
    if name.chars().count() > config.max_name_length() {
        return Err(ServiceError::InvalidInput(format!(
            "participant name must be at most {} characters",
            config.max_name_length()
        )));
    }

    if !rooms.exists(code).await? {
        return Err(ServiceError::NotFound("Room not found".into()));
    }

    let members = rooms.participants(code).await?;
    if members.iter().any(|member| names_match(&member.name, &name)) {
        return Err(ServiceError::DuplicateName("Name already taken".into()));
    }

    let entity = ParticipantEntity {
        id: participant
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        room_code: code.to_string(),
        name,
        personal_count: 0,
        joined_at: participant
            .joined_at
            .unwrap_or_else(now_millis),
    };
    rooms.append_participant(&entity).await?;
    info!(%code, participant_id = %entity.id, members = members.len() + 1, "participant joined");

    Ok(entity.into())
}

fn names_match(existing: &str, candidate: &str) -> bool {
    existing.trim() == candidate.trim()
}
