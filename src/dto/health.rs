use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Whether the server can currently reach its counter store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    /// No store installed, or the installed one stopped answering.
    Degraded,
}

/// Body of the `/healthcheck` route.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: HealthStatus,
}

impl HealthResponse {
    /// Store installed and answering.
    pub fn ok() -> Self {
        Self {
            status: HealthStatus::Ok,
        }
    }

    /// Room operations will fail with 503 until the store comes back.
    pub fn degraded() -> Self {
        Self {
            status: HealthStatus::Degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&HealthResponse::degraded()).unwrap(),
            r#"{"status":"degraded"}"#
        );
    }
}
