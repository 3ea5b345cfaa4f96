//! Payloads of the multiplexed room action route.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use utoipa::ToSchema;
use validator::Validate;

use crate::dto::room::ParticipantDto;

/// Action tag carried by every action request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Join,
    Tap,
    Reset,
    UpdateTarget,
}

/// Envelope of `POST /api/action`; `payload` depends on `action`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: ActionKind,
    pub room_code: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: Value,
}

/// Outgoing form of [`ActionRequest`] with a typed payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope<'a, P: Serialize> {
    pub action: ActionKind,
    pub room_code: &'a str,
    pub payload: P,
}

/// Participant fields supplied when joining.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinParticipant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct JoinPayload {
    #[validate(nested)]
    pub participant: JoinParticipant,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TapPayload {
    pub participant_id: String,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTargetPayload {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    #[schema(value_type = u64)]
    pub new_target: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EmptyPayload {}

/// Decoded action with its typed payload.
#[derive(Debug, Clone)]
pub enum RoomAction {
    Join(JoinParticipant),
    Tap { participant_id: String },
    Reset,
    UpdateTarget { new_target: u64 },
}

impl ActionRequest {
    /// Decode the payload according to the action tag.
    pub fn into_action(self) -> Result<(String, RoomAction), serde_json::Error> {
        let payload = match self.payload {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let action = match self.action {
            ActionKind::Join => {
                let JoinPayload { participant } = serde_json::from_value(payload)?;
                RoomAction::Join(participant)
            }
            ActionKind::Tap => {
                let TapPayload { participant_id } = serde_json::from_value(payload)?;
                RoomAction::Tap { participant_id }
            }
            ActionKind::Reset => RoomAction::Reset,
            ActionKind::UpdateTarget => {
                let UpdateTargetPayload { new_target } = serde_json::from_value(payload)?;
                RoomAction::UpdateTarget { new_target }
            }
        };
        Ok((self.room_code, action))
    }
}

/// Acknowledgement returned by every action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActionResponse {
    pub success: bool,
    /// Total right after a counted tap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Participant record created by a join.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<ParticipantDto>,
    /// Completion state after a target update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
}

impl ActionResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn request(value: Value) -> ActionRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn join_payload_ignores_client_side_fields() {
        let (code, action) = request(json!({
            "action": "JOIN",
            "roomCode": "123456",
            "payload": {"participant": {"id": "p1", "roomCode": "123456", "name": "Amina", "personalCount": 0, "joinedAt": 5}}
        }))
        .into_action()
        .unwrap();
        assert_eq!(code, "123456");
        let RoomAction::Join(participant) = action else {
            panic!("expected join");
        };
        assert_eq!(participant.id.as_deref(), Some("p1"));
        assert_eq!(participant.joined_at, Some(5));
    }

    #[test]
    fn update_target_accepts_numeric_strings() {
        let (_, action) = request(json!({
            "action": "UPDATE_TARGET",
            "roomCode": "1",
            "payload": {"newTarget": "10"}
        }))
        .into_action()
        .unwrap();
        assert!(matches!(action, RoomAction::UpdateTarget { new_target: 10 }));
    }

    #[test]
    fn reset_needs_no_payload() {
        let (_, action) = request(json!({"action": "RESET", "roomCode": "1"}))
            .into_action()
            .unwrap();
        assert!(matches!(action, RoomAction::Reset));
    }

    #[test]
    fn tap_without_participant_is_rejected() {
        let result = request(json!({"action": "TAP", "roomCode": "1", "payload": {}})).into_action();
        assert!(result.is_err());
    }

    #[test]
    fn unknown_action_fails_to_parse() {
        let result = serde_json::from_value::<ActionRequest>(json!({"action": "DANCE", "roomCode": "1"}));
        assert!(result.is_err());
    }

    #[test]
    fn envelope_serializes_like_the_request() {
        let envelope = ActionEnvelope {
            action: ActionKind::UpdateTarget,
            room_code: "123456",
            payload: UpdateTargetPayload { new_target: 5 },
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"action": "UPDATE_TARGET", "roomCode": "123456", "payload": {"newTarget": 5}})
        );
    }
}
