use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;

use crate::dao::{
    counter_store::{Batch, BatchMode, Command, CounterStore},
    storage::StorageResult,
};

use super::{
    config::UpstashConfig,
    error::{UpstashDaoError, UpstashResult},
};

const PIPELINE_PATH: &str = "pipeline";
const TRANSACTION_PATH: &str = "multi-exec";

/// Per-command envelope returned by the REST endpoint.
#[derive(Debug, Deserialize)]
struct CommandReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// [`CounterStore`] backed by an Upstash-compatible Redis REST endpoint.
#[derive(Clone)]
pub struct UpstashCounterStore {
    client: Client,
    base_url: Arc<str>,
    token: Arc<str>,
}

impl UpstashCounterStore {
    /// Build the HTTP client and make sure the endpoint answers a `PING`.
    pub async fn connect(config: UpstashConfig) -> UpstashResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| UpstashDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            token: Arc::from(config.token),
        };

        store.ping().await?;
        Ok(store)
    }

    fn request(&self, path: &str) -> RequestBuilder {
        let url = if path.is_empty() {
            self.base_url.to_string()
        } else {
            format!("{}/{}", self.base_url, path)
        };
        self.client.post(url).bearer_auth(self.token.as_ref())
    }

    async fn ping(&self) -> UpstashResult<()> {
        let response = self
            .request("")
            .json(&["PING"])
            .send()
            .await
            .map_err(|source| UpstashDaoError::RequestSend {
                path: "/".into(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(UpstashDaoError::RequestStatus {
                path: "/".into(),
                status: response.status(),
            });
        }

        let reply = response.json::<CommandReply>().await.map_err(|source| {
            UpstashDaoError::DecodeResponse {
                path: "/".into(),
                source,
            }
        })?;

        match reply.error {
            Some(message) => Err(UpstashDaoError::CommandRejected {
                command: "PING",
                message,
            }),
            None => Ok(()),
        }
    }

    async fn send_batch(&self, batch: Batch) -> UpstashResult<Vec<Value>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let path = match batch.mode() {
            BatchMode::Pipeline => PIPELINE_PATH,
            BatchMode::Atomic => TRANSACTION_PATH,
        };
        let names = batch
            .commands()
            .iter()
            .map(Command::name)
            .collect::<Vec<_>>();
        let body = batch
            .commands()
            .iter()
            .map(Command::to_args)
            .collect::<Vec<_>>();

        let response = self
            .request(path)
            .json(&body)
            .send()
            .await
            .map_err(|source| UpstashDaoError::RequestSend {
                path: path.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(UpstashDaoError::RequestStatus {
                path: path.to_string(),
                status: response.status(),
            });
        }

        let replies = response
            .json::<Vec<CommandReply>>()
            .await
            .map_err(|source| UpstashDaoError::DecodeResponse {
                path: path.to_string(),
                source,
            })?;

        if replies.len() != names.len() {
            return Err(UpstashDaoError::ReplyCount {
                path: path.to_string(),
                expected: names.len(),
                actual: replies.len(),
            });
        }

        let mut results = Vec::with_capacity(replies.len());
        for (command, reply) in names.into_iter().zip(replies) {
            if let Some(message) = reply.error {
                return Err(UpstashDaoError::CommandRejected { command, message });
            }
            results.push(reply.result);
        }
        Ok(results)
    }
}

impl CounterStore for UpstashCounterStore {
    fn exec(&self, batch: Batch) -> BoxFuture<'static, StorageResult<Vec<Value>>> {
        let store = self.clone();
        Box::pin(async move { store.send_batch(batch).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        // The REST transport is connectionless; a successful ping is a reconnect.
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}
