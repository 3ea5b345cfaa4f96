use super::error::{UpstashDaoError, UpstashResult};

const URL_VARS: [&str; 2] = ["KV_REST_API_URL", "UPSTASH_REDIS_REST_URL"];
const TOKEN_VARS: [&str; 2] = ["KV_REST_API_TOKEN", "UPSTASH_REDIS_REST_TOKEN"];

/// Runtime configuration describing how to reach the Redis REST endpoint.
#[derive(Debug, Clone)]
pub struct UpstashConfig {
    pub base_url: String,
    pub token: String,
}

impl UpstashConfig {
    /// Construct a configuration from an explicit endpoint and bearer token.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// Whether any of the endpoint variables is set, without validating the rest.
    pub fn is_configured() -> bool {
        first_env(&URL_VARS).is_some()
    }

    /// Build a configuration by reading the expected environment variables.
    ///
    /// The Vercel KV names take precedence over the plain Upstash ones.
    pub fn from_env() -> UpstashResult<Self> {
        let base_url = first_env(&URL_VARS).ok_or(UpstashDaoError::MissingEnvVar {
            var: URL_VARS[1],
        })?;
        let token = first_env(&TOKEN_VARS).ok_or(UpstashDaoError::MissingEnvVar {
            var: TOKEN_VARS[1],
        })?;
        Ok(Self::new(base_url, token))
    }
}

fn first_env(vars: &[&str]) -> Option<String> {
    vars.iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.trim().is_empty())
}
