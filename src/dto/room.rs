use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dao::models::{ParticipantEntity, RoomEntity, RoomSnapshotEntity},
    dto::validation::validate_room_code,
};

/// Payload used to create a room.
///
/// Identifier, code and creation time may be generated by the caller; any of
/// them left out is generated server-side.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_room_code"))]
    pub code: Option<String>,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub phrase: String,
    /// Encoded image shown with (or instead of) the phrase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase_image: Option<String>,
    /// Completion threshold, 0 for an open-ended room.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    #[schema(value_type = u64)]
    pub target_count: u64,
    #[validate(length(min = 1))]
    pub owner_id: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// Public projection of a room.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomDto {
    pub id: String,
    pub code: String,
    pub name: String,
    pub phrase: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase_image: Option<String>,
    pub target_count: u64,
    /// Authoritative total when served by the snapshot route.
    pub total_count: u64,
    pub is_completed: bool,
    pub created_at: i64,
    pub owner_id: String,
}

/// Public projection of a participant.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDto {
    pub id: String,
    pub room_code: String,
    pub name: String,
    pub personal_count: u64,
    pub joined_at: i64,
}

/// Full room state returned to polling clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct RoomSnapshotResponse {
    pub room: RoomDto,
    /// Participants in join order.
    pub participants: Vec<ParticipantDto>,
}

/// Query string of the snapshot route.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RoomQuery {
    /// Code of the room to read.
    pub code: String,
    /// Cache-busting token, ignored by the server.
    #[serde(default)]
    pub t: Option<String>,
}

impl From<RoomEntity> for RoomDto {
    fn from(room: RoomEntity) -> Self {
        Self {
            id: room.id,
            code: room.code,
            name: room.name,
            phrase: room.phrase,
            phrase_image: room.phrase_image,
            target_count: room.target_count,
            total_count: room.total_count,
            is_completed: room.is_completed,
            created_at: room.created_at,
            owner_id: room.owner_id,
        }
    }
}

impl From<ParticipantEntity> for ParticipantDto {
    fn from(participant: ParticipantEntity) -> Self {
        Self {
            id: participant.id,
            room_code: participant.room_code,
            name: participant.name,
            personal_count: participant.personal_count,
            joined_at: participant.joined_at,
        }
    }
}

impl From<RoomSnapshotEntity> for RoomSnapshotResponse {
    fn from(snapshot: RoomSnapshotEntity) -> Self {
        Self {
            room: snapshot.room.into(),
            participants: snapshot.participants.into_iter().map(Into::into).collect(),
        }
    }
}
