use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

/// Room record as stored under the room key.
///
/// `total_count` is a snapshot copy refreshed on completion and reset; the
/// authoritative value lives under the atomic total key.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntity {
    /// Opaque room identifier.
    pub id: String,
    /// Short numeric code used in URLs and keys.
    pub code: String,
    /// Display name of the room.
    pub name: String,
    /// Text recited by participants.
    #[serde(default)]
    pub phrase: String,
    /// Optional encoded image shown instead of (or alongside) the phrase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase_image: Option<String>,
    /// Count at which the room completes; 0 means unbounded.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub target_count: u64,
    /// Cached total, see the type docs.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[serde(default)]
    pub total_count: u64,
    /// Whether the target has been reached.
    #[serde(default)]
    pub is_completed: bool,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub created_at: i64,
    /// Device identifier of the creator.
    pub owner_id: String,
}

/// Participant entry appended to the participants list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantEntity {
    /// Opaque participant identifier, also the field in the personal-count hash.
    pub id: String,
    /// Code of the room the participant joined.
    #[serde(default)]
    pub room_code: String,
    /// Display name, unique per room after trimming.
    pub name: String,
    /// Denormalized personal count, refreshed from the hash on every read.
    #[serde(default)]
    pub personal_count: u64,
    /// Join time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub joined_at: i64,
}

/// Full state of a room as assembled from its four keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshotEntity {
    /// Room record with `total_count` replaced by the atomic total.
    pub room: RoomEntity,
    /// Participants in join order with their personal counts merged in.
    pub participants: Vec<ParticipantEntity>,
}
