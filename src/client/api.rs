//! Transport seam of the reconciliation client.

use std::error::Error;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::dto::{
    action::{ActionResponse, JoinParticipant},
    room::{CreateRoomRequest, ParticipantDto, RoomDto, RoomSnapshotResponse},
};

#[cfg(feature = "http-client")]
pub use rest::HttpRoomApi;

/// Result alias for room API calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Failure of a call against the room API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The room does not exist (or has expired).
    #[error("room not found")]
    NotFound,
    /// The chosen display name is already used in the room.
    #[error("{0}")]
    DuplicateName(String),
    /// The server answered with an unexpected status.
    #[error("server answered {status}: {message}")]
    Status { status: u16, message: String },
    /// The request never produced a response.
    #[error("request to `{path}` failed")]
    Transport {
        path: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The response body did not have the expected shape.
    #[error("unexpected response from `{path}`: {message}")]
    Decode { path: String, message: String },
}

/// Calls the reconciliation client makes against the room backend.
pub trait RoomApi: Send + Sync {
    /// Fetch the authoritative snapshot of room `code`.
    fn fetch_snapshot(&self, code: &str) -> BoxFuture<'static, ClientResult<RoomSnapshotResponse>>;
    /// Create a room.
    fn create_room(&self, request: CreateRoomRequest) -> BoxFuture<'static, ClientResult<RoomDto>>;
    /// Join room `code`, failing with [`ClientError::DuplicateName`] on a taken name.
    fn join(
        &self,
        code: &str,
        participant: JoinParticipant,
    ) -> BoxFuture<'static, ClientResult<ParticipantDto>>;
    /// Count one tap.
    fn tap(&self, code: &str, participant_id: &str) -> BoxFuture<'static, ClientResult<ActionResponse>>;
    /// Zero the room.
    fn reset(&self, code: &str) -> BoxFuture<'static, ClientResult<ActionResponse>>;
    /// Replace the room target.
    fn update_target(&self, code: &str, new_target: u64)
    -> BoxFuture<'static, ClientResult<ActionResponse>>;
}

#[cfg(feature = "http-client")]
mod rest {
    use std::sync::Arc;

    use futures::{FutureExt, future::BoxFuture};
    use reqwest::{Client, Response, StatusCode};
    use serde::{Serialize, de::DeserializeOwned};
    use serde_json::Value;

    use super::{ClientError, ClientResult, RoomApi};
    use crate::clock::now_millis;
    use crate::dto::{
        action::{
            ActionEnvelope, ActionKind, ActionResponse, EmptyPayload, JoinParticipant, JoinPayload,
            TapPayload, UpdateTargetPayload,
        },
        room::{CreateRoomRequest, ParticipantDto, RoomDto, RoomSnapshotResponse},
    };

    const CREATE_PATH: &str = "/api/create";
    const ROOM_PATH: &str = "/api/room";
    const ACTION_PATH: &str = "/api/action";

    /// [`RoomApi`] speaking JSON over HTTP to a masbaha backend.
    #[derive(Clone)]
    pub struct HttpRoomApi {
        client: Client,
        base_url: Arc<str>,
    }

    impl HttpRoomApi {
        /// Target the backend rooted at `base_url` (for example `http://localhost:8080`).
        pub fn new(base_url: impl AsRef<str>) -> Self {
            Self::with_client(Client::new(), base_url)
        }

        /// Same as [`HttpRoomApi::new`] with a preconfigured client.
        pub fn with_client(client: Client, base_url: impl AsRef<str>) -> Self {
            Self {
                client,
                base_url: Arc::from(base_url.as_ref().trim_end_matches('/')),
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base_url, path)
        }

        fn post_action<P>(
            &self,
            action: ActionKind,
            code: &str,
            payload: P,
        ) -> BoxFuture<'static, ClientResult<ActionResponse>>
        where
            P: Serialize + Send + 'static,
        {
            let request = self.client.post(self.url(ACTION_PATH));
            let code = code.to_string();
            async move {
                let envelope = ActionEnvelope {
                    action,
                    room_code: &code,
                    payload,
                };
                let response = request
                    .json(&envelope)
                    .send()
                    .await
                    .map_err(|source| transport(ACTION_PATH, source))?;
                decode(ACTION_PATH, response).await
            }
            .boxed()
        }
    }

    impl RoomApi for HttpRoomApi {
        fn fetch_snapshot(&self, code: &str) -> BoxFuture<'static, ClientResult<RoomSnapshotResponse>> {
            let cache_buster = now_millis().to_string();
            let request = self
                .client
                .get(self.url(ROOM_PATH))
                .query(&[("code", code), ("t", cache_buster.as_str())]);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|source| transport(ROOM_PATH, source))?;
                decode(ROOM_PATH, response).await
            }
            .boxed()
        }

        fn create_room(&self, request: CreateRoomRequest) -> BoxFuture<'static, ClientResult<RoomDto>> {
            let request = self.client.post(self.url(CREATE_PATH)).json(&request);
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|source| transport(CREATE_PATH, source))?;
                decode(CREATE_PATH, response).await
            }
            .boxed()
        }

        fn join(
            &self,
            code: &str,
            participant: JoinParticipant,
        ) -> BoxFuture<'static, ClientResult<ParticipantDto>> {
            let call = self.post_action(ActionKind::Join, code, JoinPayload { participant });
            async move {
                call.await?.participant.ok_or_else(|| ClientError::Decode {
                    path: ACTION_PATH.into(),
                    message: "join acknowledged without a participant".into(),
                })
            }
            .boxed()
        }

        fn tap(&self, code: &str, participant_id: &str) -> BoxFuture<'static, ClientResult<ActionResponse>> {
            self.post_action(
                ActionKind::Tap,
                code,
                TapPayload {
                    participant_id: participant_id.to_string(),
                },
            )
        }

        fn reset(&self, code: &str) -> BoxFuture<'static, ClientResult<ActionResponse>> {
            self.post_action(ActionKind::Reset, code, EmptyPayload {})
        }

        fn update_target(
            &self,
            code: &str,
            new_target: u64,
        ) -> BoxFuture<'static, ClientResult<ActionResponse>> {
            self.post_action(ActionKind::UpdateTarget, code, UpdateTargetPayload { new_target })
        }
    }

    fn transport(path: &str, source: reqwest::Error) -> ClientError {
        ClientError::Transport {
            path: path.into(),
            source: Box::new(source),
        }
    }

    async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> ClientResult<T> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|err| ClientError::Decode {
                path: path.into(),
                message: err.to_string(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        Err(match status {
            StatusCode::NOT_FOUND => ClientError::NotFound,
            StatusCode::CONFLICT if path == ACTION_PATH => ClientError::DuplicateName(message),
            other => ClientError::Status {
                status: other.as_u16(),
                message,
            },
        })
    }

    /// Pull `error` out of a JSON error body, falling back to the raw text.
    fn error_message(body: &str) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| value.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string())
    }

}
