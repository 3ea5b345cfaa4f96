pub mod memory;
#[cfg(feature = "upstash-store")]
pub mod upstash;

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::dao::storage::StorageResult;

/// One command understood by the atomic key-value store.
///
/// Replies follow the Redis REST conventions: strings for `GET`, integers for
/// counters, arrays of strings for `LRANGE` and a flat `[field, value, ...]`
/// array for `HGETALL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get {
        key: String,
    },
    /// `keep_ttl` preserves an existing expiry instead of clearing it.
    Set {
        key: String,
        value: String,
        keep_ttl: bool,
    },
    Incr {
        key: String,
    },
    HIncrBy {
        key: String,
        field: String,
        delta: i64,
    },
    HGetAll {
        key: String,
    },
    RPush {
        key: String,
        value: String,
    },
    LRange {
        key: String,
        start: i64,
        stop: i64,
    },
    Del {
        key: String,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
}

impl Command {
    /// Upper-case command name as sent on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Incr { .. } => "INCR",
            Command::HIncrBy { .. } => "HINCRBY",
            Command::HGetAll { .. } => "HGETALL",
            Command::RPush { .. } => "RPUSH",
            Command::LRange { .. } => "LRANGE",
            Command::Del { .. } => "DEL",
            Command::Expire { .. } => "EXPIRE",
        }
    }

    /// Render the command as a Redis argument vector.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.name().to_string()];
        match self {
            Command::Get { key }
            | Command::Incr { key }
            | Command::HGetAll { key }
            | Command::Del { key } => args.push(key.clone()),
            Command::Set {
                key,
                value,
                keep_ttl,
            } => {
                args.push(key.clone());
                args.push(value.clone());
                if *keep_ttl {
                    args.push("KEEPTTL".into());
                }
            }
            Command::HIncrBy { key, field, delta } => {
                args.push(key.clone());
                args.push(field.clone());
                args.push(delta.to_string());
            }
            Command::RPush { key, value } => {
                args.push(key.clone());
                args.push(value.clone());
            }
            Command::LRange { key, start, stop } => {
                args.push(key.clone());
                args.push(start.to_string());
                args.push(stop.to_string());
            }
            Command::Expire { key, ttl } => {
                args.push(key.clone());
                args.push(ttl.as_secs().max(1).to_string());
            }
        }
        args
    }
}

/// How the commands of a batch are executed relative to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Sent in one round-trip; each command is atomic on its own.
    Pipeline,
    /// Executed as one transaction; no other client observes a partial batch.
    Atomic,
}

/// Ordered group of commands sent to the store in a single round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    mode: BatchMode,
    commands: Vec<Command>,
}

impl Batch {
    /// Start an empty pipelined batch.
    pub fn pipeline() -> Self {
        Self {
            mode: BatchMode::Pipeline,
            commands: Vec::new(),
        }
    }

    /// Start an empty transactional batch.
    pub fn atomic() -> Self {
        Self {
            mode: BatchMode::Atomic,
            commands: Vec::new(),
        }
    }

    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(mut self, key: &str) -> Self {
        self.commands.push(Command::Get { key: key.into() });
        self
    }

    pub fn set(mut self, key: &str, value: impl Into<String>) -> Self {
        self.commands.push(Command::Set {
            key: key.into(),
            value: value.into(),
            keep_ttl: false,
        });
        self
    }

    pub fn set_keep_ttl(mut self, key: &str, value: impl Into<String>) -> Self {
        self.commands.push(Command::Set {
            key: key.into(),
            value: value.into(),
            keep_ttl: true,
        });
        self
    }

    pub fn incr(mut self, key: &str) -> Self {
        self.commands.push(Command::Incr { key: key.into() });
        self
    }

    pub fn hincrby(mut self, key: &str, field: &str, delta: i64) -> Self {
        self.commands.push(Command::HIncrBy {
            key: key.into(),
            field: field.into(),
            delta,
        });
        self
    }

    pub fn hgetall(mut self, key: &str) -> Self {
        self.commands.push(Command::HGetAll { key: key.into() });
        self
    }

    pub fn rpush(mut self, key: &str, value: impl Into<String>) -> Self {
        self.commands.push(Command::RPush {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn lrange(mut self, key: &str, start: i64, stop: i64) -> Self {
        self.commands.push(Command::LRange {
            key: key.into(),
            start,
            stop,
        });
        self
    }

    pub fn del(mut self, key: &str) -> Self {
        self.commands.push(Command::Del { key: key.into() });
        self
    }

    pub fn expire(mut self, key: &str, ttl: Duration) -> Self {
        self.commands.push(Command::Expire {
            key: key.into(),
            ttl,
        });
        self
    }

    /// Apply the same expiry to every key in `keys`.
    pub fn expire_all<'a>(self, keys: impl IntoIterator<Item = &'a str>, ttl: Duration) -> Self {
        keys.into_iter().fold(self, |batch, key| batch.expire(key, ttl))
    }
}

/// Abstraction over the single authoritative store holding room state and counters.
///
/// `exec` returns one reply per command, in order. A rejected command fails the
/// whole call after the batch has run; callers must not assume earlier commands
/// were rolled back.
pub trait CounterStore: Send + Sync {
    fn exec(&self, batch: Batch) -> BoxFuture<'static, StorageResult<Vec<Value>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
