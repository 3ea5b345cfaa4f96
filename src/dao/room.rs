//! Repository over the four keys of a room. Every method is one round-trip to
//! the store; decoding is lenient wherever the stored shape may vary.

use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::dao::{
    counter_store::{Batch, CounterStore},
    keys::RoomKeys,
    models::{ParticipantEntity, RoomEntity, RoomSnapshotEntity},
    storage::{StorageError, StorageResult},
};

/// Counts observed right after a tap was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncrementResult {
    pub total: u64,
    pub personal: u64,
}

/// Thin repository wrapper around the counter store for room state.
#[derive(Clone)]
pub struct RoomRepository {
    store: Arc<dyn CounterStore>,
    retention: Duration,
}

impl RoomRepository {
    pub fn new(store: Arc<dyn CounterStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    /// Persist a fresh room with a zeroed total in one transaction.
    ///
    /// Leftover participant state under the same code is cleared so a reused
    /// code never inherits members or scores.
    pub async fn create(&self, room: &RoomEntity) -> StorageResult<()> {
        let keys = RoomKeys::new(&room.code);
        let batch = Batch::atomic()
            .set(&keys.room, encode(&keys.room, room)?)
            .set(&keys.total, "0")
            .del(&keys.participants)
            .del(&keys.personal_counts)
            .expire_all(keys.all(), self.retention);
        self.store.exec(batch).await?;
        Ok(())
    }

    /// Whether a live room record exists under `code`.
    pub async fn exists(&self, code: &str) -> StorageResult<bool> {
        Ok(self.find(code).await?.is_some())
    }

    /// Load the room record alone.
    pub async fn find(&self, code: &str) -> StorageResult<Option<RoomEntity>> {
        let keys = RoomKeys::new(code);
        let mut replies = self.store.exec(Batch::pipeline().get(&keys.room)).await?;
        decode_record(&keys.room, take(&mut replies, 0))
    }

    /// Load the room record together with the atomic total.
    pub async fn find_with_total(&self, code: &str) -> StorageResult<Option<(RoomEntity, u64)>> {
        let keys = RoomKeys::new(code);
        let mut replies = self
            .store
            .exec(Batch::pipeline().get(&keys.room).get(&keys.total))
            .await?;
        let Some(room) = decode_record::<RoomEntity>(&keys.room, take(&mut replies, 0))? else {
            return Ok(None);
        };
        let total = decode_count(&keys.total, &take(&mut replies, 1))?;
        Ok(Some((room, total)))
    }

    /// Read record, total, participants and personal counts in one batch.
    pub async fn snapshot(&self, code: &str) -> StorageResult<Option<RoomSnapshotEntity>> {
        let keys = RoomKeys::new(code);
        let batch = Batch::pipeline()
            .get(&keys.room)
            .get(&keys.total)
            .lrange(&keys.participants, 0, -1)
            .hgetall(&keys.personal_counts);
        let mut replies = self.store.exec(batch).await?;

        let Some(mut room) = decode_record::<RoomEntity>(&keys.room, take(&mut replies, 0))? else {
            return Ok(None);
        };
        room.total_count = decode_count(&keys.total, &take(&mut replies, 1))?;

        let scores = decode_counts(&keys.personal_counts, take(&mut replies, 3));
        let participants = decode_entries::<ParticipantEntity>(&keys.participants, take(&mut replies, 2))
            .into_iter()
            .map(|mut participant| {
                participant.personal_count = scores.get(&participant.id).copied().unwrap_or(0);
                participant
            })
            .collect();

        Ok(Some(RoomSnapshotEntity { room, participants }))
    }

    /// Overwrite the room record, keeping its retention window.
    pub async fn save(&self, room: &RoomEntity) -> StorageResult<()> {
        let keys = RoomKeys::new(&room.code);
        self.store
            .exec(Batch::pipeline().set_keep_ttl(&keys.room, encode(&keys.room, room)?))
            .await?;
        Ok(())
    }

    /// Atomically bump the room total and the participant's personal count.
    ///
    /// Both increments travel in one pipeline but are not a transaction.
    pub async fn increment(&self, code: &str, participant_id: &str) -> StorageResult<IncrementResult> {
        let keys = RoomKeys::new(code);
        let batch = Batch::pipeline()
            .incr(&keys.total)
            .hincrby(&keys.personal_counts, participant_id, 1);
        let replies = self.store.exec(batch).await?;
        Ok(IncrementResult {
            total: decode_count(&keys.total, replies.first().unwrap_or(&Value::Null))?,
            personal: decode_count(&keys.personal_counts, replies.get(1).unwrap_or(&Value::Null))?,
        })
    }

    /// Write the cleared record, zero the total and drop all personal counts together.
    pub async fn reset(&self, room: &RoomEntity) -> StorageResult<()> {
        let keys = RoomKeys::new(&room.code);
        let batch = Batch::atomic()
            .set_keep_ttl(&keys.room, encode(&keys.room, room)?)
            .set_keep_ttl(&keys.total, "0")
            .del(&keys.personal_counts);
        self.store.exec(batch).await?;
        Ok(())
    }

    /// Participants in join order, skipping entries that fail to decode.
    pub async fn participants(&self, code: &str) -> StorageResult<Vec<ParticipantEntity>> {
        let keys = RoomKeys::new(code);
        let mut replies = self
            .store
            .exec(Batch::pipeline().lrange(&keys.participants, 0, -1))
            .await?;
        Ok(decode_entries(&keys.participants, take(&mut replies, 0)))
    }

    /// Append a participant and refresh the retention of every room key.
    pub async fn append_participant(&self, participant: &ParticipantEntity) -> StorageResult<()> {
        let keys = RoomKeys::new(&participant.room_code);
        let batch = Batch::pipeline()
            .rpush(&keys.participants, encode(&keys.participants, participant)?)
            .expire_all(keys.all(), self.retention);
        self.store.exec(batch).await?;
        Ok(())
    }
}

fn take(replies: &mut [Value], index: usize) -> Value {
    replies.get_mut(index).map(Value::take).unwrap_or(Value::Null)
}

fn encode<T: serde::Serialize>(key: &str, value: &T) -> StorageResult<String> {
    serde_json::to_string(value).map_err(|err| StorageError::corrupt(key, err.to_string()))
}

/// Decode a record stored either as JSON text or as an already structured value.
fn decode_record<T: DeserializeOwned>(key: &str, value: Value) -> StorageResult<Option<T>> {
    let decoded = match value {
        Value::Null => return Ok(None),
        Value::String(text) => serde_json::from_str(&text),
        other => serde_json::from_value(other),
    };
    decoded
        .map(Some)
        .map_err(|err| StorageError::corrupt(key, err.to_string()))
}

/// Decode a counter reply; a missing key counts as zero.
fn decode_count(key: &str, value: &Value) -> StorageResult<u64> {
    let parsed = match value {
        Value::Null => Some(0),
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_i64().map(|signed| signed.max(0) as u64)),
        Value::String(text) => text
            .trim()
            .parse::<i64>()
            .ok()
            .map(|signed| signed.max(0) as u64),
        _ => None,
    };
    parsed.ok_or_else(|| StorageError::corrupt(key, format!("expected an integer, got {value}")))
}

/// Decode list entries, dropping the ones that do not parse.
fn decode_entries<T: DeserializeOwned>(key: &str, value: Value) -> Vec<T> {
    let Value::Array(items) = value else {
        if !value.is_null() {
            warn!(key, "expected a list reply; treating as empty");
        }
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| match decode_record::<T>(key, item) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, error = %err, "dropping undecodable list entry");
                None
            }
        })
        .collect()
}

/// Decode a hash reply given either as a flat `[field, value, ...]` array or as an object.
fn decode_counts(key: &str, value: Value) -> HashMap<String, u64> {
    let pairs: Vec<(String, Value)> = match value {
        Value::Array(flat) => flat
            .chunks(2)
            .filter_map(|pair| match pair {
                [Value::String(field), count] => Some((field.clone(), count.clone())),
                _ => None,
            })
            .collect(),
        Value::Object(map) => map.into_iter().collect(),
        _ => Vec::new(),
    };

    pairs
        .into_iter()
        .filter_map(|(field, count)| match decode_count(key, &count) {
            Ok(count) => Some((field, count)),
            Err(err) => {
                warn!(key, field = %field, error = %err, "dropping undecodable personal count");
                None
            }
        })
        .collect()
}
