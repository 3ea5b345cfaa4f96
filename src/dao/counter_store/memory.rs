//! In-process implementation of [`CounterStore`] mirroring the Redis semantics the
//! rest of the crate relies on: per-key atomic counters, lazy expiry, and
//! transactional batches that exclude every other batch while they run.

use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;

use crate::dao::{
    counter_store::{Batch, BatchMode, Command, CounterStore},
    storage::{StorageError, StorageResult},
};

#[derive(Debug, Error)]
enum MemoryCommandError {
    #[error("WRONGTYPE operation against `{key}` holding the wrong kind of value")]
    WrongType { key: String },
    #[error("value under `{key}` is not an integer or out of range")]
    NotAnInteger { key: String },
    #[error("increment on `{key}` would overflow")]
    Overflow { key: String },
}

#[derive(Debug, Clone)]
enum Stored {
    Text(String),
    List(Vec<String>),
    Hash(IndexMap<String, i64>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Stored) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Volatile store used for local runs and tests.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    keys: DashMap<String, Slot>,
    // Pipelines share the gate, atomic batches hold it exclusively.
    gate: RwLock<()>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of `key`, if it exists and carries an expiry.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.purge_expired(key, now);
        self.inner
            .keys
            .get(key)
            .and_then(|slot| slot.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Whether `key` currently holds a live value.
    pub fn contains(&self, key: &str) -> bool {
        self.purge_expired(key, Instant::now());
        self.inner.keys.contains_key(key)
    }

    fn run(&self, batch: Batch) -> StorageResult<Vec<Value>> {
        match batch.mode() {
            BatchMode::Atomic => {
                let _gate = self
                    .inner
                    .gate
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                self.apply_all(batch.into_commands())
            }
            BatchMode::Pipeline => {
                let _gate = self
                    .inner
                    .gate
                    .read()
                    .unwrap_or_else(PoisonError::into_inner);
                self.apply_all(batch.into_commands())
            }
        }
    }

    fn apply_all(&self, commands: Vec<Command>) -> StorageResult<Vec<Value>> {
        let mut replies = Vec::with_capacity(commands.len());
        let mut first_error = None;

        for command in commands {
            let name = command.name();
            match self.apply(command) {
                Ok(reply) => replies.push(reply),
                Err(err) => {
                    replies.push(Value::Null);
                    first_error.get_or_insert(StorageError::Command {
                        command: name,
                        message: err.to_string(),
                    });
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(replies),
        }
    }

    fn purge_expired(&self, key: &str, now: Instant) {
        self.inner
            .keys
            .remove_if(key, |_, slot| slot.is_expired(now));
    }

    fn apply(&self, command: Command) -> Result<Value, MemoryCommandError> {
        let now = Instant::now();
        let keys = &self.inner.keys;

        match command {
            Command::Get { key } => {
                self.purge_expired(&key, now);
                match keys.get(&key) {
                    None => Ok(Value::Null),
                    Some(slot) => match &slot.value {
                        Stored::Text(text) => Ok(Value::String(text.clone())),
                        _ => Err(MemoryCommandError::WrongType { key: key.clone() }),
                    },
                }
            }
            Command::Set {
                key,
                value,
                keep_ttl,
            } => {
                self.purge_expired(&key, now);
                match keys.entry(key) {
                    Entry::Occupied(mut occupied) => {
                        let expires_at = if keep_ttl {
                            occupied.get().expires_at
                        } else {
                            None
                        };
                        occupied.insert(Slot {
                            value: Stored::Text(value),
                            expires_at,
                        });
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(Slot::new(Stored::Text(value)));
                    }
                }
                Ok(Value::String("OK".into()))
            }
            Command::Incr { key } => {
                self.purge_expired(&key, now);
                match keys.entry(key.clone()) {
                    Entry::Occupied(mut occupied) => {
                        let Stored::Text(text) = &mut occupied.get_mut().value else {
                            return Err(MemoryCommandError::WrongType { key });
                        };
                        let current = text
                            .parse::<i64>()
                            .map_err(|_| MemoryCommandError::NotAnInteger { key: key.clone() })?;
                        let next = current
                            .checked_add(1)
                            .ok_or(MemoryCommandError::Overflow { key })?;
                        *text = next.to_string();
                        Ok(Value::from(next))
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(Slot::new(Stored::Text("1".into())));
                        Ok(Value::from(1))
                    }
                }
            }
            Command::HIncrBy { key, field, delta } => {
                self.purge_expired(&key, now);
                match keys.entry(key.clone()) {
                    Entry::Occupied(mut occupied) => {
                        let Stored::Hash(map) = &mut occupied.get_mut().value else {
                            return Err(MemoryCommandError::WrongType { key });
                        };
                        let count = map.entry(field).or_insert(0);
                        *count = count
                            .checked_add(delta)
                            .ok_or(MemoryCommandError::Overflow { key })?;
                        Ok(Value::from(*count))
                    }
                    Entry::Vacant(vacant) => {
                        let mut map = IndexMap::new();
                        map.insert(field, delta);
                        vacant.insert(Slot::new(Stored::Hash(map)));
                        Ok(Value::from(delta))
                    }
                }
            }
            Command::HGetAll { key } => {
                self.purge_expired(&key, now);
                match keys.get(&key) {
                    None => Ok(Value::Array(Vec::new())),
                    Some(slot) => match &slot.value {
                        Stored::Hash(map) => Ok(Value::Array(
                            map.iter()
                                .flat_map(|(field, count)| {
                                    [Value::String(field.clone()), Value::String(count.to_string())]
                                })
                                .collect(),
                        )),
                        _ => Err(MemoryCommandError::WrongType { key: key.clone() }),
                    },
                }
            }
            Command::RPush { key, value } => {
                self.purge_expired(&key, now);
                match keys.entry(key.clone()) {
                    Entry::Occupied(mut occupied) => {
                        let Stored::List(items) = &mut occupied.get_mut().value else {
                            return Err(MemoryCommandError::WrongType { key });
                        };
                        items.push(value);
                        Ok(Value::from(items.len()))
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(Slot::new(Stored::List(vec![value])));
                        Ok(Value::from(1))
                    }
                }
            }
            Command::LRange { key, start, stop } => {
                self.purge_expired(&key, now);
                match keys.get(&key) {
                    None => Ok(Value::Array(Vec::new())),
                    Some(slot) => match &slot.value {
                        Stored::List(items) => {
                            let selected = list_range(items.len(), start, stop)
                                .map(|(from, to)| {
                                    items[from..=to]
                                        .iter()
                                        .cloned()
                                        .map(Value::String)
                                        .collect()
                                })
                                .unwrap_or_default();
                            Ok(Value::Array(selected))
                        }
                        _ => Err(MemoryCommandError::WrongType { key: key.clone() }),
                    },
                }
            }
            Command::Del { key } => {
                self.purge_expired(&key, now);
                Ok(Value::from(u8::from(keys.remove(&key).is_some())))
            }
            Command::Expire { key, ttl } => {
                self.purge_expired(&key, now);
                match keys.get_mut(&key) {
                    Some(mut slot) => {
                        // An expiry past the clock range means never.
                        slot.expires_at = now.checked_add(ttl);
                        Ok(Value::from(1))
                    }
                    None => Ok(Value::from(0)),
                }
            }
        }
    }
}

/// Resolve Redis-style inclusive `start..=stop` indices (negative counts from the end).
fn list_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

impl CounterStore for MemoryCounterStore {
    fn exec(&self, batch: Batch) -> BoxFuture<'static, StorageResult<Vec<Value>>> {
        let result = self.run(batch);
        Box::pin(async move { result })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
